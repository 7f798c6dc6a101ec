//! Reversible user actions.
//!
//! Every session-mutating action is a [`Command`] variant. Commands capture
//! whatever they need to undo themselves when they execute, and resolve all
//! collaborators from the [`CommandContext`] before touching any state, so a
//! failing command leaves the session exactly as it found it.
//!
//! Commands are run through a [`CommandInvoker`], which validates them,
//! serializes execution and keeps the undo/redo history.

mod breathing;
mod invoker;
mod theme;

pub use breathing::{ChangeTechnique, PauseAction, PauseBreathing, StartBreathing};
pub use invoker::{CommandInvoker, DEFAULT_HISTORY_LIMIT};
pub use theme::{ChangeTheme, ThemeApplier};

use std::cell::{RefCell, RefMut};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::preferences::{PreferencesState, Theme};
use crate::session::SessionState;
use crate::technique::{Technique, TechniqueId};
use crate::timer::PhaseScheduler;

/// Collaborators a command may need. Missing ones are reported as
/// [`CoreError::DependencyInjectionFailed`] by the command that needs them.
#[derive(Clone, Copy, Default)]
pub struct CommandContext<'a> {
    pub session: Option<&'a SessionState>,
    pub scheduler: Option<&'a RefCell<PhaseScheduler>>,
    pub preferences: Option<&'a PreferencesState>,
    pub theme: Option<&'a dyn ThemeApplier>,
}

impl<'a> CommandContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: &'a SessionState) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_scheduler(mut self, scheduler: &'a RefCell<PhaseScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_preferences(mut self, preferences: &'a PreferencesState) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_theme(mut self, theme: &'a dyn ThemeApplier) -> Self {
        self.theme = Some(theme);
        self
    }

    pub(crate) fn session(&self, command: &str) -> Result<&'a SessionState> {
        self.session.ok_or_else(|| missing(command, "session"))
    }

    pub(crate) fn preferences(&self, command: &str) -> Result<&'a PreferencesState> {
        self.preferences.ok_or_else(|| missing(command, "preferences"))
    }

    /// Borrow the scheduler mutably, reporting a busy scheduler as a command
    /// failure instead of panicking.
    pub(crate) fn scheduler(&self, command: &str) -> Result<RefMut<'a, PhaseScheduler>> {
        let cell = self.scheduler.ok_or_else(|| missing(command, "scheduler"))?;
        cell.try_borrow_mut()
            .map_err(|_| CoreError::command_failed(command, "scheduler is busy", None))
    }
}

fn missing(command: &str, dependency: &'static str) -> CoreError {
    CoreError::DependencyInjectionFailed {
        command: command.to_string(),
        dependency,
    }
}

/// The closed set of user actions.
#[derive(Debug, Clone)]
pub enum Command {
    StartBreathing(StartBreathing),
    PauseBreathing(PauseBreathing),
    ChangeTechnique(ChangeTechnique),
    ChangeTheme(ChangeTheme),
}

impl Command {
    pub fn start(technique_id: TechniqueId, technique: Option<Arc<Technique>>) -> Self {
        Command::StartBreathing(StartBreathing::new(technique_id, technique))
    }

    pub fn pause() -> Self {
        Command::PauseBreathing(PauseBreathing::new(PauseAction::Pause))
    }

    pub fn resume() -> Self {
        Command::PauseBreathing(PauseBreathing::new(PauseAction::Resume))
    }

    pub fn change_technique(technique_id: TechniqueId, technique: Option<Arc<Technique>>) -> Self {
        Command::ChangeTechnique(ChangeTechnique::new(technique_id, technique))
    }

    pub fn change_theme(theme: Theme) -> Self {
        Command::ChangeTheme(ChangeTheme::new(theme))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartBreathing(_) => StartBreathing::NAME,
            Command::PauseBreathing(_) => PauseBreathing::NAME,
            Command::ChangeTechnique(_) => ChangeTechnique::NAME,
            Command::ChangeTheme(_) => ChangeTheme::NAME,
        }
    }

    /// Identifier the command acts on, for error reports and logs.
    pub fn subject(&self) -> Option<String> {
        match self {
            Command::StartBreathing(c) => Some(c.technique_id.to_string()),
            Command::PauseBreathing(c) => Some(c.action.as_str().to_string()),
            Command::ChangeTechnique(c) => Some(c.technique_id.to_string()),
            Command::ChangeTheme(c) => Some(c.theme.to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Command::StartBreathing(c) => c.validate().map(drop),
            Command::PauseBreathing(_) | Command::ChangeTheme(_) => Ok(()),
            Command::ChangeTechnique(c) => c.validate().map(drop),
        }
    }

    pub fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        match self {
            Command::StartBreathing(c) => c.execute(ctx),
            Command::PauseBreathing(c) => c.execute(ctx),
            Command::ChangeTechnique(c) => c.execute(ctx),
            Command::ChangeTheme(c) => c.execute(ctx),
        }
    }

    pub fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        match self {
            Command::StartBreathing(c) => c.undo(ctx),
            Command::PauseBreathing(c) => c.undo(ctx),
            Command::ChangeTechnique(c) => c.undo(ctx),
            Command::ChangeTheme(c) => c.undo(ctx),
        }
    }

    /// Only commands that have executed (and so captured their previous
    /// state) can be undone.
    pub fn is_undoable(&self) -> bool {
        match self {
            Command::StartBreathing(c) => c.has_executed(),
            Command::PauseBreathing(c) => c.has_executed(),
            Command::ChangeTechnique(c) => c.has_executed(),
            Command::ChangeTheme(c) => c.has_executed(),
        }
    }
}
