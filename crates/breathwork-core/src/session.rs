//! Canonical snapshot of "where the session is".
//!
//! [`SessionState`] is independent of how time advances: the scheduler feeds
//! it through [`SessionState::update_timer`], commands drive the lifecycle
//! methods. Every mutation assigns the whole snapshot and only then notifies
//! subscribers with a read-only copy, so observers never see partial phase
//! data. Methods take `&self` so a subscriber may call back into the state
//! while a notification is being delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::notifier::{Notifier, SubscriberError, SubscriptionId};
use crate::technique::{Phase, PhaseInfo, Technique, TechniqueId};

/// What caused a [`SessionChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Started,
    Paused,
    Resumed,
    Stopped,
    Reset,
    TechniqueChanged,
    Restored,
    Tick,
}

/// Payload delivered to session subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionChange {
    pub kind: ChangeKind,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_technique_id: Option<TechniqueId>,
    #[serde(skip)]
    pub technique: Option<Arc<Technique>>,
    pub elapsed_seconds: u64,
    pub phase_index: usize,
    pub time_in_phase: u64,
    pub time_left: u64,
    pub current_phase: Option<Phase>,
    pub cycles_completed: u64,
    pub session_start_time: Option<DateTime<Utc>>,
    /// Wall-clock milliseconds since `session_start_time`; reporting only.
    pub session_duration_ms: u64,
}

impl SessionSnapshot {
    pub fn is_idle(&self) -> bool {
        !self.is_running && !self.is_paused
    }

    fn total_duration(&self) -> u64 {
        self.technique
            .as_ref()
            .map(|t| t.total_duration())
            .unwrap_or(0)
    }

    /// 0.0 ..= 100.0, saturating once the first cycle is complete.
    pub fn session_progress(&self) -> f64 {
        let total = self.total_duration();
        if total == 0 {
            return 0.0;
        }
        (self.elapsed_seconds as f64 / total as f64 * 100.0).min(100.0)
    }

    /// 0.0 ..= 100.0 progress within the current cycle.
    pub fn cycle_progress(&self) -> f64 {
        let total = self.total_duration();
        if total == 0 {
            return 0.0;
        }
        ((self.elapsed_seconds % total) as f64 / total as f64 * 100.0).min(100.0)
    }

    /// Check the structural invariants of the snapshot.
    pub fn validate(&self) -> Result<()> {
        if self.is_running && self.is_paused {
            return Err(CoreError::state(
                "is_paused",
                "a session cannot be running and paused at once",
            ));
        }
        if self.is_running && self.technique.is_none() {
            return Err(CoreError::state(
                "technique",
                "a running session requires a technique",
            ));
        }
        if self.is_running && self.current_phase.is_none() {
            return Err(CoreError::state(
                "current_phase",
                "a running session requires a current phase",
            ));
        }
        if self.technique.as_ref().map(|t| t.id) != self.current_technique_id {
            return Err(CoreError::state(
                "current_technique_id",
                "technique id does not match the installed technique",
            ));
        }
        Ok(())
    }

    fn apply_phase(&mut self, info: &PhaseInfo) {
        self.phase_index = info.phase_index;
        self.time_in_phase = info.time_in_phase;
        self.time_left = info.time_left;
        self.current_phase = Some(info.phase.clone());
    }

    fn clear_phase(&mut self) {
        self.phase_index = 0;
        self.time_in_phase = 0;
        self.time_left = 0;
        self.current_phase = None;
    }

    fn recompute_cycles(&mut self) {
        let total = self.total_duration();
        if total > 0 {
            self.cycles_completed = self.elapsed_seconds / total;
        }
    }

    fn recompute_duration(&mut self) {
        self.session_duration_ms = self
            .session_start_time
            .map(|start| (Utc::now() - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
    }
}

#[derive(Debug)]
pub struct SessionState {
    data: RefCell<SessionSnapshot>,
    notifier: Notifier<SessionChange>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            data: RefCell::new(SessionSnapshot::default()),
            notifier: Notifier::new("session"),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.data.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.data.borrow().is_running
    }

    pub fn is_paused(&self) -> bool {
        self.data.borrow().is_paused
    }

    pub fn current_technique_id(&self) -> Option<TechniqueId> {
        self.data.borrow().current_technique_id
    }

    pub fn technique(&self) -> Option<Arc<Technique>> {
        self.data.borrow().technique.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.data.borrow().elapsed_seconds
    }

    pub fn cycles_completed(&self) -> u64 {
        self.data.borrow().cycles_completed
    }

    pub fn session_progress(&self) -> f64 {
        self.data.borrow().session_progress()
    }

    pub fn cycle_progress(&self) -> f64 {
        self.data.borrow().cycle_progress()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&SessionChange) -> Result<(), SubscriberError> + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Fails with `StateUpdateFailed` (and changes nothing) when `technique`
    /// is not the one `technique_id` names.
    pub fn start_session(&self, technique_id: TechniqueId, technique: Arc<Technique>) -> Result<()> {
        let initial = technique.phase_at(0);
        self.commit(ChangeKind::Started, |s| {
            s.is_running = true;
            s.is_paused = false;
            s.current_technique_id = Some(technique_id);
            s.technique = Some(technique);
            s.elapsed_seconds = 0;
            s.cycles_completed = 0;
            s.session_start_time = Some(Utc::now());
            s.session_duration_ms = 0;
            s.apply_phase(&initial);
        })
    }

    /// Returns `Ok(false)` (and changes nothing) unless the session is running.
    pub fn pause_session(&self) -> Result<bool> {
        if !self.data.borrow().is_running {
            return Ok(false);
        }
        self.commit(ChangeKind::Paused, |s| {
            s.is_running = false;
            s.is_paused = true;
            s.recompute_duration();
        })?;
        Ok(true)
    }

    /// Returns `Ok(false)` (and changes nothing) unless the session is paused.
    pub fn resume_session(&self) -> Result<bool> {
        if !self.data.borrow().is_paused {
            return Ok(false);
        }
        self.commit(ChangeKind::Resumed, |s| {
            s.is_running = true;
            s.is_paused = false;
        })?;
        Ok(true)
    }

    /// Stop the session. Phase position is left as last known; use
    /// [`reset_session`](Self::reset_session) to zero it.
    pub fn stop_session(&self) -> Result<()> {
        self.commit(ChangeKind::Stopped, |s| {
            s.is_running = false;
            s.is_paused = false;
            s.elapsed_seconds = 0;
            s.cycles_completed = 0;
            s.session_start_time = None;
            s.session_duration_ms = 0;
        })
    }

    /// Stop and return the phase position to the start of the cycle.
    pub fn reset_session(&self) -> Result<()> {
        self.commit(ChangeKind::Reset, |s| {
            s.is_running = false;
            s.is_paused = false;
            s.elapsed_seconds = 0;
            s.cycles_completed = 0;
            s.session_start_time = None;
            s.session_duration_ms = 0;
            match s.technique.as_ref().map(|t| t.phase_at(0)) {
                Some(initial) => s.apply_phase(&initial),
                None => s.clear_phase(),
            }
        })
    }

    /// Apply one scheduler update. The phase snapshot is checked against the
    /// installed technique and then copied verbatim.
    pub fn update_timer(&self, elapsed_seconds: u64, phase: PhaseInfo) -> Result<()> {
        if let Some(technique) = self.data.borrow().technique.as_ref() {
            check_phase(technique, &phase)?;
        }
        self.commit(ChangeKind::Tick, |s| {
            s.elapsed_seconds = elapsed_seconds;
            s.apply_phase(&phase);
            s.recompute_cycles();
            s.recompute_duration();
        })
    }

    /// Install another technique and restart the cycle from its first phase.
    pub fn change_technique(&self, technique_id: TechniqueId, technique: Arc<Technique>) -> Result<()> {
        let initial = technique.phase_at(0);
        self.commit(ChangeKind::TechniqueChanged, |s| {
            s.current_technique_id = Some(technique_id);
            s.technique = Some(technique);
            s.elapsed_seconds = 0;
            s.cycles_completed = 0;
            s.apply_phase(&initial);
        })
    }

    /// Reinstate a technique together with a time position, re-deriving the
    /// phase from `elapsed_seconds`. Restoring no technique stops the session.
    pub fn restore_position(
        &self,
        technique_id: Option<TechniqueId>,
        technique: Option<Arc<Technique>>,
        elapsed_seconds: u64,
        cycles_completed: u64,
    ) -> Result<()> {
        let phase = technique.as_ref().map(|t| t.phase_at(elapsed_seconds));
        self.commit(ChangeKind::Restored, |s| {
            s.current_technique_id = technique_id;
            s.technique = technique;
            s.elapsed_seconds = elapsed_seconds;
            s.cycles_completed = cycles_completed;
            match phase {
                Some(info) => s.apply_phase(&info),
                None => {
                    s.clear_phase();
                    s.is_running = false;
                    s.is_paused = false;
                }
            }
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Apply `mutate` to a copy and install it only if the copy passes
    /// [`SessionSnapshot::validate`]. Subscribers are notified after the
    /// state borrow is released.
    fn commit(&self, kind: ChangeKind, mutate: impl FnOnce(&mut SessionSnapshot)) -> Result<()> {
        let mut snapshot = self.data.borrow().clone();
        mutate(&mut snapshot);
        if let Err(err) = snapshot.validate() {
            tracing::warn!(?kind, error = %err, "session change rejected");
            return Err(err);
        }
        *self.data.borrow_mut() = snapshot.clone();
        tracing::debug!(
            ?kind,
            elapsed = snapshot.elapsed_seconds,
            phase = snapshot.phase_index,
            time_left = snapshot.time_left,
            "session changed"
        );
        self.notifier.notify(SessionChange { kind, snapshot });
        Ok(())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn check_phase(technique: &Technique, phase: &PhaseInfo) -> Result<()> {
    let Some(expected) = technique.durations_sec().get(phase.phase_index) else {
        return Err(CoreError::state(
            "phase_index",
            format!(
                "index {} out of range for technique '{}' with {} phases",
                phase.phase_index,
                technique.id,
                technique.phases().len()
            ),
        ));
    };
    if u64::from(*expected) != phase.duration {
        return Err(CoreError::state(
            "duration",
            format!(
                "phase {} of '{}' lasts {}s, got {}s",
                phase.phase_index, technique.id, expected, phase.duration
            ),
        ));
    }
    if phase.time_in_phase >= phase.duration
        || phase.time_in_phase + phase.time_left != phase.duration
    {
        return Err(CoreError::state(
            "time_in_phase",
            format!(
                "inconsistent position {}+{} within a {}s phase",
                phase.time_in_phase, phase.time_left, phase.duration
            ),
        ));
    }
    Ok(())
}
