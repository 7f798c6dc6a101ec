use std::sync::Arc;

use super::CommandContext;
use crate::error::{CoreError, Result};
use crate::technique::{Technique, TechniqueId};

// ── Start ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StartPrevious {
    is_running: bool,
    is_paused: bool,
    technique_id: Option<TechniqueId>,
}

/// Start a session with the given technique. Undo stops it.
#[derive(Debug, Clone)]
pub struct StartBreathing {
    pub(super) technique_id: TechniqueId,
    technique: Option<Arc<Technique>>,
    previous: Option<StartPrevious>,
}

impl StartBreathing {
    pub const NAME: &'static str = "StartBreathing";

    pub fn new(technique_id: TechniqueId, technique: Option<Arc<Technique>>) -> Self {
        Self {
            technique_id,
            technique,
            previous: None,
        }
    }

    pub(super) fn has_executed(&self) -> bool {
        self.previous.is_some()
    }

    /// The technique to install, once it is known to match `technique_id`.
    pub(super) fn validate(&self) -> Result<Arc<Technique>> {
        let Some(technique) = self.technique.as_ref() else {
            return Err(CoreError::command_failed(
                Self::NAME,
                "validation failed: a technique is required",
                Some(self.technique_id.to_string()),
            ));
        };
        if technique.id != self.technique_id {
            return Err(CoreError::command_failed(
                Self::NAME,
                format!(
                    "validation failed: technique '{}' does not match id '{}'",
                    technique.id, self.technique_id
                ),
                Some(self.technique_id.to_string()),
            ));
        }
        Ok(Arc::clone(technique))
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let technique = self.validate()?;
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;

        let previous = StartPrevious {
            is_running: session.is_running(),
            is_paused: session.is_paused(),
            technique_id: session.current_technique_id(),
        };

        scheduler.reset();
        scheduler.set_technique(Arc::clone(&technique));
        scheduler.start();
        drop(scheduler);

        session.start_session(self.technique_id, technique)?;
        self.previous = Some(previous);
        tracing::info!(
            technique = %self.technique_id,
            was_running = previous.is_running,
            was_paused = previous.is_paused,
            previous_technique = ?previous.technique_id,
            "breathing session started"
        );
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;
        scheduler.stop();
        drop(scheduler);

        session.stop_session()?;
        tracing::info!(technique = %self.technique_id, "start undone, session stopped");
        Ok(())
    }
}

// ── Pause / Resume ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseAction {
    Pause,
    Resume,
}

impl PauseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseAction::Pause => "pause",
            PauseAction::Resume => "resume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PausePrevious {
    is_running: bool,
    is_paused: bool,
}

/// Pause or resume the running session.
#[derive(Debug, Clone)]
pub struct PauseBreathing {
    pub(super) action: PauseAction,
    previous: Option<PausePrevious>,
}

impl PauseBreathing {
    pub const NAME: &'static str = "PauseBreathing";

    pub fn new(action: PauseAction) -> Self {
        Self {
            action,
            previous: None,
        }
    }

    pub(super) fn has_executed(&self) -> bool {
        self.previous.is_some()
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;

        let previous = PausePrevious {
            is_running: session.is_running(),
            is_paused: session.is_paused(),
        };
        let applicable = match self.action {
            PauseAction::Pause => previous.is_running,
            PauseAction::Resume => previous.is_paused,
        };
        if !applicable {
            return Err(CoreError::command_failed(
                Self::NAME,
                match self.action {
                    PauseAction::Pause => "cannot pause: session is not running",
                    PauseAction::Resume => "cannot resume: session is not paused",
                },
                Some(self.action.as_str().to_string()),
            ));
        }

        match self.action {
            PauseAction::Pause => scheduler.pause(),
            PauseAction::Resume => scheduler.resume(),
        };
        drop(scheduler);

        match self.action {
            PauseAction::Pause => session.pause_session()?,
            PauseAction::Resume => session.resume_session()?,
        };
        self.previous = Some(previous);
        tracing::info!(action = self.action.as_str(), "pause state changed");
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let Some(previous) = self.previous else {
            return Err(CoreError::command_failed(
                Self::NAME,
                "cannot undo a command that never executed",
                None,
            ));
        };
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;

        // The session may have moved on since (a stop, say); undo only what
        // can still be reversed.
        let restorable = if previous.is_paused {
            session.is_running()
        } else if previous.is_running {
            session.is_paused()
        } else {
            false
        };
        if !restorable {
            return Err(CoreError::command_failed(
                Self::NAME,
                format!(
                    "cannot restore the state before {}: session is {}",
                    self.action.as_str(),
                    session_status(session.is_running(), session.is_paused())
                ),
                Some(self.action.as_str().to_string()),
            ));
        }

        if previous.is_paused {
            scheduler.pause();
            drop(scheduler);
            session.pause_session()?;
        } else {
            scheduler.resume();
            drop(scheduler);
            session.resume_session()?;
        }
        tracing::info!(action = self.action.as_str(), "pause state change undone");
        Ok(())
    }
}

fn session_status(is_running: bool, is_paused: bool) -> &'static str {
    match (is_running, is_paused) {
        (true, _) => "running",
        (false, true) => "paused",
        (false, false) => "stopped",
    }
}

// ── Change technique ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TechniquePrevious {
    technique_id: Option<TechniqueId>,
    technique: Option<Arc<Technique>>,
    elapsed_seconds: u64,
    cycles_completed: u64,
}

/// Switch technique, restarting the cycle. A running scheduler is restarted
/// on the new phase table rather than swapped in place.
#[derive(Debug, Clone)]
pub struct ChangeTechnique {
    pub(super) technique_id: TechniqueId,
    technique: Option<Arc<Technique>>,
    previous: Option<TechniquePrevious>,
}

impl ChangeTechnique {
    pub const NAME: &'static str = "ChangeTechnique";

    pub fn new(technique_id: TechniqueId, technique: Option<Arc<Technique>>) -> Self {
        Self {
            technique_id,
            technique,
            previous: None,
        }
    }

    pub(super) fn has_executed(&self) -> bool {
        self.previous.is_some()
    }

    pub(super) fn validate(&self) -> Result<Arc<Technique>> {
        match self.technique.as_ref() {
            None => Err(CoreError::command_failed(
                Self::NAME,
                "validation failed: a technique is required",
                Some(self.technique_id.to_string()),
            )),
            Some(t) if t.id != self.technique_id => Err(CoreError::command_failed(
                Self::NAME,
                format!(
                    "validation failed: technique '{}' does not match id '{}'",
                    t.id, self.technique_id
                ),
                Some(self.technique_id.to_string()),
            )),
            Some(t) => Ok(Arc::clone(t)),
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let technique = self.validate()?;
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;

        let snapshot = session.snapshot();
        let previous = TechniquePrevious {
            technique_id: snapshot.current_technique_id,
            technique: snapshot.technique,
            elapsed_seconds: snapshot.elapsed_seconds,
            cycles_completed: snapshot.cycles_completed,
        };

        scheduler.restart_with(Arc::clone(&technique), 0);
        drop(scheduler);

        session.change_technique(self.technique_id, technique)?;
        tracing::info!(
            from = ?previous.technique_id,
            to = %self.technique_id,
            "technique changed"
        );
        self.previous = Some(previous);
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let Some(previous) = self.previous.clone() else {
            return Err(CoreError::command_failed(
                Self::NAME,
                "cannot undo a command that never executed",
                Some(self.technique_id.to_string()),
            ));
        };
        let session = ctx.session(Self::NAME)?;
        let mut scheduler = ctx.scheduler(Self::NAME)?;

        match previous.technique.as_ref() {
            Some(old) => {
                scheduler.restart_with(Arc::clone(old), previous.elapsed_seconds);
            }
            None => scheduler.clear_technique(),
        }
        drop(scheduler);

        session.restore_position(
            previous.technique_id,
            previous.technique,
            previous.elapsed_seconds,
            previous.cycles_completed,
        )?;
        tracing::info!(
            restored = ?previous.technique_id,
            elapsed = previous.elapsed_seconds,
            "technique change undone"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::session::SessionState;
    use crate::technique::TechniqueCatalog;
    use crate::timer::{ManualClock, PhaseScheduler};
    use std::cell::RefCell;

    struct Fixture {
        session: SessionState,
        scheduler: RefCell<PhaseScheduler>,
        clock: ManualClock,
        catalog: TechniqueCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::new(0);
            Self {
                session: SessionState::new(),
                scheduler: RefCell::new(PhaseScheduler::with_clock(clock.clone())),
                clock,
                catalog: TechniqueCatalog::builtin().unwrap(),
            }
        }

        fn ctx(&self) -> CommandContext<'_> {
            CommandContext::new()
                .with_session(&self.session)
                .with_scheduler(&self.scheduler)
        }

        fn advance(&self, secs: u64) {
            for _ in 0..secs {
                self.clock.advance_secs(1);
                let events = self.scheduler.borrow_mut().tick();
                for event in events {
                    if let crate::events::SchedulerEvent::Update {
                        current_time,
                        current_phase,
                        ..
                    } = event
                    {
                        self.session.update_timer(current_time, current_phase).unwrap();
                    }
                }
            }
        }

        fn start(&self, id: TechniqueId) -> Command {
            let mut cmd = Command::start(id, self.catalog.get(id));
            cmd.execute(&self.ctx()).unwrap();
            cmd
        }
    }

    #[test]
    fn start_requires_technique() {
        let cmd = Command::start(TechniqueId::Box4, None);
        assert!(matches!(
            cmd.validate(),
            Err(CoreError::CommandExecutionFailed { .. })
        ));
    }

    #[test]
    fn start_rejects_mismatched_technique() {
        let catalog = TechniqueCatalog::builtin().unwrap();
        let cmd = Command::start(TechniqueId::Box4, catalog.get(TechniqueId::Coherent));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn start_reports_missing_scheduler_without_side_effects() {
        let fx = Fixture::new();
        let mut cmd = Command::start(TechniqueId::Box4, fx.catalog.get(TechniqueId::Box4));
        let ctx = CommandContext::new().with_session(&fx.session);

        let err = cmd.execute(&ctx).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DependencyInjectionFailed { dependency: "scheduler", .. }
        ));
        assert!(!fx.session.is_running());
        assert!(!cmd.is_undoable());
    }

    #[test]
    fn start_then_undo_stops_everything() {
        let fx = Fixture::new();
        let mut cmd = fx.start(TechniqueId::Box4);
        assert!(fx.session.is_running());
        assert!(fx.scheduler.borrow().is_running());

        cmd.undo(&fx.ctx()).unwrap();
        assert!(!fx.session.is_running());
        assert!(!fx.scheduler.borrow().is_running());
    }

    #[test]
    fn pause_fails_when_not_running() {
        let fx = Fixture::new();
        let mut cmd = Command::pause();
        assert!(cmd.execute(&fx.ctx()).is_err());
        assert!(!cmd.is_undoable());
    }

    #[test]
    fn pause_and_undo_restore_flags() {
        let fx = Fixture::new();
        fx.start(TechniqueId::Box4);
        fx.advance(3);

        let mut pause = Command::pause();
        pause.execute(&fx.ctx()).unwrap();
        assert!(fx.session.is_paused());
        assert!(fx.scheduler.borrow().is_paused());

        pause.undo(&fx.ctx()).unwrap();
        assert!(fx.session.is_running());
        assert!(fx.scheduler.borrow().is_running());
        assert_eq!(fx.session.elapsed_seconds(), 3);

        let mut pause = Command::pause();
        pause.execute(&fx.ctx()).unwrap();
        let mut resume = Command::resume();
        resume.execute(&fx.ctx()).unwrap();
        assert!(fx.session.is_running());
        resume.undo(&fx.ctx()).unwrap();
        assert!(fx.session.is_paused());
        assert!(fx.scheduler.borrow().is_paused());
    }

    #[test]
    fn undo_pause_fails_once_session_stopped() {
        let fx = Fixture::new();
        fx.start(TechniqueId::Box4);
        fx.advance(2);

        let mut pause = Command::pause();
        pause.execute(&fx.ctx()).unwrap();
        fx.scheduler.borrow_mut().stop();
        fx.session.stop_session().unwrap();

        let err = pause.undo(&fx.ctx()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CommandExecutionFailed { ref command, ref message, .. }
                if command == PauseBreathing::NAME && message.contains("stopped")
        ));
        assert!(!fx.session.is_running());
        assert!(!fx.session.is_paused());
        assert!(!fx.scheduler.borrow().is_running());

        fx.start(TechniqueId::Box4);
        Command::pause().execute(&fx.ctx()).unwrap();
        let mut resume = Command::resume();
        resume.execute(&fx.ctx()).unwrap();
        Command::pause().execute(&fx.ctx()).unwrap();
        // Already paused again, so there is nothing to put back.
        assert!(resume.undo(&fx.ctx()).is_err());
        assert!(fx.session.is_paused());
    }

    #[test]
    fn mismatched_technique_never_reaches_the_session() {
        let fx = Fixture::new();
        let mut start = Command::start(TechniqueId::Box4, fx.catalog.get(TechniqueId::Triangle));
        assert!(start.execute(&fx.ctx()).is_err());
        assert!(!fx.session.is_running());
        assert!(!fx.scheduler.borrow().is_running());
        assert!(!start.is_undoable());

        let mut change =
            Command::change_technique(TechniqueId::Coherent, fx.catalog.get(TechniqueId::Box4));
        assert!(change.execute(&fx.ctx()).is_err());
        assert_eq!(fx.session.current_technique_id(), None);
        assert!(!change.is_undoable());
    }

    #[test]
    fn change_technique_while_running_restarts_on_new_table() {
        let fx = Fixture::new();
        fx.start(TechniqueId::Box4);
        fx.advance(9);

        let mut change =
            Command::change_technique(TechniqueId::Relax478, fx.catalog.get(TechniqueId::Relax478));
        change.execute(&fx.ctx()).unwrap();

        let snap = fx.session.snapshot();
        assert!(snap.is_running);
        assert_eq!(snap.elapsed_seconds, 0);
        assert_eq!(snap.phase_index, 0);
        assert_eq!(snap.time_left, 4);
        assert_eq!(fx.scheduler.borrow().elapsed_seconds(), 0);

        fx.advance(6);
        let snap = fx.session.snapshot();
        assert_eq!(snap.phase_index, 1);
        assert_eq!(snap.time_in_phase, 2);
        assert_eq!(snap.time_left, 5);
    }

    #[test]
    fn change_technique_undo_restores_position() {
        let fx = Fixture::new();
        fx.start(TechniqueId::Box4);
        fx.advance(9);

        let mut change =
            Command::change_technique(TechniqueId::Coherent, fx.catalog.get(TechniqueId::Coherent));
        change.execute(&fx.ctx()).unwrap();
        fx.advance(2);
        change.undo(&fx.ctx()).unwrap();

        let snap = fx.session.snapshot();
        assert_eq!(snap.current_technique_id, Some(TechniqueId::Box4));
        assert_eq!(snap.elapsed_seconds, 9);
        assert_eq!(snap.phase_index, 2);
        assert_eq!(fx.scheduler.borrow().elapsed_seconds(), 9);

        fx.advance(1);
        assert_eq!(fx.session.elapsed_seconds(), 10);
    }

    #[test]
    fn change_technique_while_paused_stays_paused() {
        let fx = Fixture::new();
        fx.start(TechniqueId::Box4);
        fx.advance(5);
        Command::pause().execute(&fx.ctx()).unwrap();

        Command::change_technique(TechniqueId::Triangle, fx.catalog.get(TechniqueId::Triangle))
            .execute(&fx.ctx())
            .unwrap();
        assert!(fx.session.is_paused());
        assert!(fx.scheduler.borrow().is_paused());
        assert_eq!(fx.scheduler.borrow().elapsed_seconds(), 0);
    }
}
