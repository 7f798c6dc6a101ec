//! Phase scheduler implementation.
//!
//! The scheduler is a wall-clock-based state machine. It does not use
//! internal threads - the caller is responsible for calling `tick()`
//! periodically (roughly once per second). Each call converts the wall-clock
//! delta since the previous call into whole elapsed seconds and emits one
//! `Update` per second crossed.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!   ^________|__________|   (stop / reset)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = PhaseScheduler::new();
//! scheduler.set_technique(technique);
//! scheduler.start();
//! // In a loop:
//! for event in scheduler.tick() { /* Update / CycleComplete */ }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::clock::{Clock, SystemClock};
use crate::events::SchedulerEvent;
use crate::technique::{PhaseInfo, Technique};

const MS_PER_SECOND: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Paused,
}

/// Real-time driver for a breathing session.
#[derive(Debug)]
pub struct PhaseScheduler {
    technique: Option<Arc<Technique>>,
    state: SchedulerState,
    elapsed_seconds: u64,
    /// Milliseconds accumulated towards the next whole second.
    carry_ms: u64,
    /// Timestamp (ms since epoch) of the last start/resume/tick.
    last_tick_epoch_ms: Option<u64>,
    clock: Box<dyn Clock>,
}

impl PhaseScheduler {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            technique: None,
            state: SchedulerState::Idle,
            elapsed_seconds: 0,
            carry_ms: 0,
            last_tick_epoch_ms: None,
            clock: Box::new(clock),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == SchedulerState::Paused
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn technique(&self) -> Option<&Arc<Technique>> {
        self.technique.as_ref()
    }

    /// Always derived from the installed technique, never cached.
    pub fn current_phase(&self) -> Option<PhaseInfo> {
        self.technique
            .as_ref()
            .map(|t| t.phase_at(self.elapsed_seconds))
    }

    pub fn cycles_completed(&self) -> u64 {
        match self.technique.as_ref().map(|t| t.total_duration()) {
            Some(total) if total > 0 => self.elapsed_seconds / total,
            _ => 0,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Install a technique without touching the clock or elapsed time.
    pub fn set_technique(&mut self, technique: Arc<Technique>) {
        self.technique = Some(technique);
    }

    /// Stop and forget the installed technique.
    pub fn clear_technique(&mut self) {
        self.stop();
        self.technique = None;
    }

    pub fn start(&mut self) -> Option<SchedulerEvent> {
        match self.state {
            SchedulerState::Running => {
                tracing::debug!("scheduler already running, start ignored");
                None
            }
            SchedulerState::Paused => self.resume(),
            SchedulerState::Idle => {
                let Some(technique_id) = self.technique.as_ref().map(|t| t.id) else {
                    tracing::warn!("scheduler started without a technique, ignored");
                    return None;
                };
                self.elapsed_seconds = 0;
                self.carry_ms = 0;
                self.state = SchedulerState::Running;
                self.last_tick_epoch_ms = Some(self.clock.now_ms());
                Some(SchedulerEvent::Started {
                    technique_id,
                    current_time: 0,
                    at: Utc::now(),
                })
            }
        }
    }

    /// Suspend ticking. The partial second in progress is discarded so a
    /// resumed clock needs a full second before the next update.
    pub fn pause(&mut self) -> Option<SchedulerEvent> {
        if self.state != SchedulerState::Running {
            return None;
        }
        self.state = SchedulerState::Paused;
        self.last_tick_epoch_ms = None;
        self.carry_ms = 0;
        Some(SchedulerEvent::Paused {
            current_time: self.elapsed_seconds,
            at: Utc::now(),
        })
    }

    pub fn resume(&mut self) -> Option<SchedulerEvent> {
        if self.state != SchedulerState::Paused {
            return None;
        }
        self.state = SchedulerState::Running;
        self.carry_ms = 0;
        self.last_tick_epoch_ms = Some(self.clock.now_ms());
        Some(SchedulerEvent::Resumed {
            current_time: self.elapsed_seconds,
            at: Utc::now(),
        })
    }

    /// Halt ticking. Idempotent; elapsed time stays readable until the next
    /// `start` or `reset`.
    pub fn stop(&mut self) -> Option<SchedulerEvent> {
        if self.state == SchedulerState::Idle {
            return None;
        }
        self.state = SchedulerState::Idle;
        self.last_tick_epoch_ms = None;
        self.carry_ms = 0;
        Some(SchedulerEvent::Stopped {
            current_time: self.elapsed_seconds,
            at: Utc::now(),
        })
    }

    pub fn reset(&mut self) -> Option<SchedulerEvent> {
        self.state = SchedulerState::Idle;
        self.elapsed_seconds = 0;
        self.carry_ms = 0;
        self.last_tick_epoch_ms = None;
        Some(SchedulerEvent::Reset { at: Utc::now() })
    }

    /// Swap the technique and reposition at `offset_seconds`.
    ///
    /// A running clock is discarded and restarted from this instant; a
    /// paused scheduler stays paused at the new position.
    pub fn restart_with(
        &mut self,
        technique: Arc<Technique>,
        offset_seconds: u64,
    ) -> Option<SchedulerEvent> {
        let technique_id = technique.id;
        self.technique = Some(technique);
        self.elapsed_seconds = offset_seconds;
        self.carry_ms = 0;

        if self.state != SchedulerState::Running {
            return None;
        }
        self.last_tick_epoch_ms = Some(self.clock.now_ms());
        Some(SchedulerEvent::Started {
            technique_id,
            current_time: offset_seconds,
            at: Utc::now(),
        })
    }

    /// Call periodically. Returns one `Update` per whole second elapsed since
    /// the previous call, each followed by `CycleComplete` when that second
    /// closes a cycle.
    pub fn tick(&mut self) -> Vec<SchedulerEvent> {
        if self.state != SchedulerState::Running {
            return Vec::new();
        }
        let Some(technique) = self.technique.clone() else {
            return Vec::new();
        };

        self.flush_elapsed();

        let total = technique.total_duration();
        let mut events = Vec::new();
        while self.carry_ms >= MS_PER_SECOND {
            self.carry_ms -= MS_PER_SECOND;
            self.elapsed_seconds += 1;

            let at = Utc::now();
            events.push(SchedulerEvent::Update {
                current_time: self.elapsed_seconds,
                current_phase: technique.phase_at(self.elapsed_seconds),
                at,
            });
            if total > 0 && self.elapsed_seconds % total == 0 {
                events.push(SchedulerEvent::CycleComplete {
                    cycles_completed: self.elapsed_seconds / total,
                    current_time: self.elapsed_seconds,
                    at,
                });
            }
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn flush_elapsed(&mut self) {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_tick_epoch_ms {
            self.carry_ms = self.carry_ms.saturating_add(now.saturating_sub(last));
        }
        self.last_tick_epoch_ms = Some(now);
    }
}

impl Default for PhaseScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technique::{TechniqueCatalog, TechniqueId};
    use crate::timer::ManualClock;

    fn scheduler_with(id: TechniqueId) -> (PhaseScheduler, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let mut scheduler = PhaseScheduler::with_clock(clock.clone());
        let catalog = TechniqueCatalog::builtin().unwrap();
        scheduler.set_technique(catalog.get(id).unwrap());
        (scheduler, clock)
    }

    fn updates(events: &[SchedulerEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::Update { current_time, .. } => Some(*current_time),
                _ => None,
            })
            .collect()
    }

    fn tick_secs(scheduler: &mut PhaseScheduler, clock: &ManualClock, n: u64) -> Vec<SchedulerEvent> {
        let mut all = Vec::new();
        for _ in 0..n {
            clock.advance_secs(1);
            all.extend(scheduler.tick());
        }
        all
    }

    #[test]
    fn start_pause_resume() {
        let (mut scheduler, _clock) = scheduler_with(TechniqueId::Box4);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        assert!(scheduler.start().is_some());
        assert_eq!(scheduler.state(), SchedulerState::Running);

        assert!(scheduler.pause().is_some());
        assert_eq!(scheduler.state(), SchedulerState::Paused);

        assert!(scheduler.resume().is_some());
        assert_eq!(scheduler.state(), SchedulerState::Running);
    }

    #[test]
    fn invalid_transitions_are_noops() {
        let (mut scheduler, _clock) = scheduler_with(TechniqueId::Box4);
        assert!(scheduler.pause().is_none());
        assert!(scheduler.resume().is_none());
        assert!(scheduler.stop().is_none());

        scheduler.start();
        assert!(scheduler.start().is_none());
        assert!(scheduler.resume().is_none());
    }

    #[test]
    fn start_without_technique_is_ignored() {
        let mut scheduler = PhaseScheduler::with_clock(ManualClock::new(0));
        assert!(scheduler.start().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn box4_after_five_ticks() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        let events = tick_secs(&mut scheduler, &clock, 5);

        assert_eq!(updates(&events), vec![1, 2, 3, 4, 5]);
        match events.last().unwrap() {
            SchedulerEvent::Update { current_phase, .. } => {
                assert_eq!(current_phase.phase_index, 1);
                assert_eq!(current_phase.time_in_phase, 1);
                assert_eq!(current_phase.time_left, 3);
            }
            other => panic!("Expected Update, got {other:?}"),
        }
    }

    #[test]
    fn cycle_complete_fires_once_per_crossing() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        let events = tick_secs(&mut scheduler, &clock, 20);

        let cycles: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, SchedulerEvent::CycleComplete { .. }))
            .collect();
        assert_eq!(cycles.len(), 1);

        // Follows the update for second 16.
        let (pos, event) = cycles[0];
        assert!(matches!(
            event,
            SchedulerEvent::CycleComplete { cycles_completed: 1, current_time: 16, .. }
        ));
        assert!(matches!(
            events[pos - 1],
            SchedulerEvent::Update { current_time: 16, .. }
        ));
        assert_eq!(scheduler.cycles_completed(), 1);
    }

    #[test]
    fn sub_second_ticks_accumulate() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Coherent);
        scheduler.start();

        clock.advance_ms(400);
        assert!(scheduler.tick().is_empty());
        clock.advance_ms(400);
        assert!(scheduler.tick().is_empty());
        clock.advance_ms(400);
        assert_eq!(updates(&scheduler.tick()), vec![1]);
        clock.advance_ms(800);
        assert_eq!(updates(&scheduler.tick()), vec![2]);
    }

    #[test]
    fn late_tick_catches_up_one_update_per_second() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        clock.advance_secs(3);
        assert_eq!(updates(&scheduler.tick()), vec![1, 2, 3]);
    }

    #[test]
    fn pause_freezes_time_and_resume_needs_a_full_second() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        tick_secs(&mut scheduler, &clock, 7);
        clock.advance_ms(600);
        scheduler.tick();
        assert_eq!(scheduler.elapsed_seconds(), 7);

        scheduler.pause();
        clock.advance_secs(30);
        assert!(scheduler.tick().is_empty());
        assert_eq!(scheduler.elapsed_seconds(), 7);

        scheduler.resume();
        clock.advance_ms(500);
        assert!(scheduler.tick().is_empty());
        clock.advance_ms(500);
        assert_eq!(updates(&scheduler.tick()), vec![8]);
    }

    #[test]
    fn stop_is_idempotent_and_reset_zeroes() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        tick_secs(&mut scheduler, &clock, 3);

        assert!(scheduler.stop().is_some());
        assert!(scheduler.stop().is_none());
        assert_eq!(scheduler.elapsed_seconds(), 3);

        scheduler.reset();
        assert_eq!(scheduler.elapsed_seconds(), 0);
        assert_eq!(scheduler.current_phase().unwrap().phase_index, 0);
    }

    #[test]
    fn start_after_stop_begins_at_zero() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        tick_secs(&mut scheduler, &clock, 6);
        scheduler.stop();
        scheduler.start();
        assert_eq!(scheduler.elapsed_seconds(), 0);
        assert_eq!(updates(&tick_secs(&mut scheduler, &clock, 1)), vec![1]);
    }

    #[test]
    fn restart_with_uses_new_phase_table() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        tick_secs(&mut scheduler, &clock, 9);
        assert_eq!(scheduler.current_phase().unwrap().phase_index, 2);

        let catalog = TechniqueCatalog::builtin().unwrap();
        let relax = catalog.get(TechniqueId::Relax478).unwrap();
        assert!(scheduler.restart_with(relax, 0).is_some());
        assert!(scheduler.is_running());

        let events = tick_secs(&mut scheduler, &clock, 5);
        assert_eq!(updates(&events), vec![1, 2, 3, 4, 5]);
        match events.last().unwrap() {
            SchedulerEvent::Update { current_phase, .. } => {
                // 4-7-8: second 5 is one second into the hold.
                assert_eq!(current_phase.phase_index, 1);
                assert_eq!(current_phase.duration, 7);
                assert_eq!(current_phase.time_left, 6);
            }
            other => panic!("Expected Update, got {other:?}"),
        }
    }

    #[test]
    fn restart_with_keeps_paused_state() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        tick_secs(&mut scheduler, &clock, 4);
        scheduler.pause();

        let catalog = TechniqueCatalog::builtin().unwrap();
        assert!(scheduler
            .restart_with(catalog.get(TechniqueId::Coherent).unwrap(), 0)
            .is_none());
        assert!(scheduler.is_paused());
        assert_eq!(scheduler.elapsed_seconds(), 0);
    }

    #[test]
    fn final_second_is_exact() {
        let (mut scheduler, clock) = scheduler_with(TechniqueId::Box4);
        scheduler.start();
        let events = tick_secs(&mut scheduler, &clock, 16);
        let final_seconds: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::Update {
                    current_time,
                    current_phase,
                    ..
                } if current_phase.is_final_second() => Some(*current_time),
                _ => None,
            })
            .collect();
        assert_eq!(final_seconds, vec![3, 7, 11, 15]);
    }
}
