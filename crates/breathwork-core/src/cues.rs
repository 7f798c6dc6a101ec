//! Per-tick audio and vibration cueing.
//!
//! The dispatcher listens to session ticks and fires at most one cue per
//! elapsed second: the final-second variant when `time_left == 1`, the
//! regular one otherwise. Backends are fire-and-forget.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

use crate::notifier::SubscriptionId;
use crate::preferences::PreferencesState;
use crate::session::{ChangeKind, SessionChange, SessionState};
use crate::storage::{CueConfig, CueToneConfig};

pub trait AudioCue {
    fn play_cue(&self, frequency_hz: f32, duration_ms: u32, gain: f32);
}

pub trait Haptics {
    fn pulse(&self, duration_ms: u32);
}

/// Backend that does nothing, for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AudioCue for Silent {
    fn play_cue(&self, _frequency_hz: f32, _duration_ms: u32, _gain: f32) {}
}

impl Haptics for Silent {
    fn pulse(&self, _duration_ms: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueKind {
    Regular,
    FinalSecond,
}

pub struct CueDispatcher {
    audio: Box<dyn AudioCue>,
    haptics: Box<dyn Haptics>,
    preferences: Rc<PreferencesState>,
    config: CueConfig,
    /// Elapsed second of the last cue, cleared whenever the clock restarts.
    last_cued: Cell<Option<u64>>,
}

impl CueDispatcher {
    pub fn new(
        audio: impl AudioCue + 'static,
        haptics: impl Haptics + 'static,
        preferences: Rc<PreferencesState>,
        config: CueConfig,
    ) -> Self {
        Self {
            audio: Box::new(audio),
            haptics: Box::new(haptics),
            preferences,
            config,
            last_cued: Cell::new(None),
        }
    }

    /// Subscribe this dispatcher to `session`.
    pub fn attach(self: &Rc<Self>, session: &SessionState) -> SubscriptionId {
        let dispatcher = Rc::clone(self);
        session.subscribe(move |change| {
            dispatcher.handle(change);
            Ok(())
        })
    }

    /// React to one session change. Returns the cue variant that was fired,
    /// or `None` when nothing was fired.
    pub fn handle(&self, change: &SessionChange) -> Option<CueKind> {
        match change.kind {
            ChangeKind::Tick => {}
            ChangeKind::Started
            | ChangeKind::Stopped
            | ChangeKind::Reset
            | ChangeKind::TechniqueChanged
            | ChangeKind::Restored => {
                self.last_cued.set(None);
                return None;
            }
            ChangeKind::Paused | ChangeKind::Resumed => return None,
        }

        let snapshot = &change.snapshot;
        if !snapshot.is_running || snapshot.current_phase.is_none() {
            return None;
        }
        if self.last_cued.get() == Some(snapshot.elapsed_seconds) {
            tracing::trace!(elapsed = snapshot.elapsed_seconds, "cue already fired");
            return None;
        }
        self.last_cued.set(Some(snapshot.elapsed_seconds));

        let kind = if snapshot.time_left == 1 {
            CueKind::FinalSecond
        } else {
            CueKind::Regular
        };
        let tone = self.tone(kind);

        let sound = self.preferences.sound_enabled();
        let vibration = self.preferences.vibration_enabled();
        if sound {
            self.audio
                .play_cue(tone.frequency_hz, tone.duration_ms, tone.gain);
        }
        if vibration {
            self.haptics.pulse(tone.vibration_ms);
        }
        tracing::trace!(
            ?kind,
            elapsed = snapshot.elapsed_seconds,
            sound,
            vibration,
            "cue dispatched"
        );

        (sound || vibration).then_some(kind)
    }

    fn tone(&self, kind: CueKind) -> &CueToneConfig {
        match kind {
            CueKind::Regular => &self.config.regular,
            CueKind::FinalSecond => &self.config.final_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::technique::{TechniqueCatalog, TechniqueId};
    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        beeps: Rc<RefCell<Vec<f32>>>,
        pulses: Rc<RefCell<Vec<u32>>>,
    }

    impl AudioCue for Recorder {
        fn play_cue(&self, frequency_hz: f32, _duration_ms: u32, _gain: f32) {
            self.beeps.borrow_mut().push(frequency_hz);
        }
    }

    impl Haptics for Recorder {
        fn pulse(&self, duration_ms: u32) {
            self.pulses.borrow_mut().push(duration_ms);
        }
    }

    fn setup() -> (Rc<SessionState>, Rc<PreferencesState>, Recorder, Rc<CueDispatcher>) {
        let session = Rc::new(SessionState::new());
        let prefs = Rc::new(PreferencesState::load(MemoryStore::new()));
        let recorder = Recorder::default();
        let dispatcher = Rc::new(CueDispatcher::new(
            recorder.clone(),
            recorder.clone(),
            Rc::clone(&prefs),
            CueConfig::default(),
        ));
        dispatcher.attach(&session);
        (session, prefs, recorder, dispatcher)
    }

    #[test]
    fn final_second_gets_strong_cue_once_per_phase() {
        let (session, _prefs, recorder, _d) = setup();
        let t = TechniqueCatalog::builtin()
            .unwrap()
            .get(TechniqueId::Box4)
            .unwrap();
        session.start_session(TechniqueId::Box4, Arc::clone(&t)).unwrap();
        for k in 1..=16 {
            session.update_timer(k, t.phase_at(k)).unwrap();
        }

        let beeps = recorder.beeps.borrow();
        assert_eq!(beeps.len(), 16);
        let strong: Vec<usize> = beeps
            .iter()
            .enumerate()
            .filter(|(_, f)| **f == 880.0)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(strong, vec![3, 7, 11, 15]);
        assert_eq!(recorder.pulses.borrow().len(), 16);
    }

    #[test]
    fn duplicate_tick_does_not_fire_twice() {
        let (session, _prefs, recorder, _d) = setup();
        let t = TechniqueCatalog::builtin()
            .unwrap()
            .get(TechniqueId::Coherent)
            .unwrap();
        session.start_session(TechniqueId::Coherent, Arc::clone(&t)).unwrap();
        session.update_timer(1, t.phase_at(1)).unwrap();
        session.update_timer(1, t.phase_at(1)).unwrap();
        assert_eq!(recorder.beeps.borrow().len(), 1);

        // A new session starts counting again.
        session.start_session(TechniqueId::Coherent, Arc::clone(&t)).unwrap();
        session.update_timer(1, t.phase_at(1)).unwrap();
        assert_eq!(recorder.beeps.borrow().len(), 2);
    }

    #[test]
    fn preferences_gate_backends() {
        let (session, prefs, recorder, _d) = setup();
        prefs.set_sound_enabled(false).unwrap();
        let t = TechniqueCatalog::builtin()
            .unwrap()
            .get(TechniqueId::Triangle)
            .unwrap();
        session.start_session(TechniqueId::Triangle, Arc::clone(&t)).unwrap();
        session.update_timer(1, t.phase_at(1)).unwrap();
        assert!(recorder.beeps.borrow().is_empty());
        assert_eq!(*recorder.pulses.borrow(), vec![30]);

        prefs.set_vibration_enabled(false).unwrap();
        session.update_timer(2, t.phase_at(2)).unwrap();
        assert_eq!(recorder.pulses.borrow().len(), 1);
    }

    #[test]
    fn no_cue_without_phase_or_when_paused() {
        let (session, _prefs, recorder, dispatcher) = setup();
        let idle = SessionChange {
            kind: ChangeKind::Tick,
            snapshot: session.snapshot(),
        };
        assert_eq!(dispatcher.handle(&idle), None);

        let t = TechniqueCatalog::builtin()
            .unwrap()
            .get(TechniqueId::Box4)
            .unwrap();
        session.start_session(TechniqueId::Box4, t).unwrap();
        session.pause_session().unwrap();
        let paused = SessionChange {
            kind: ChangeKind::Tick,
            snapshot: session.snapshot(),
        };
        assert_eq!(dispatcher.handle(&paused), None);
        assert!(recorder.beeps.borrow().is_empty());
    }
}
