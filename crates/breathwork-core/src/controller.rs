//! Composition root for a breathing session.
//!
//! [`SessionController`] owns every collaborator (catalog, session state,
//! preferences, scheduler, command history) and turns user-level requests
//! into [`Command`]s run through the [`CommandInvoker`]. The driver loop
//! calls [`SessionController::tick`] roughly once per second.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::command::{Command, CommandContext, CommandInvoker, ThemeApplier};
use crate::cues::{AudioCue, CueDispatcher, Haptics};
use crate::error::{CoreError, Result};
use crate::events::SchedulerEvent;
use crate::notifier::{Notifier, SubscriberError, SubscriptionId};
use crate::preferences::{PreferencesState, Theme};
use crate::session::SessionState;
use crate::storage::Config;
use crate::technique::{Technique, TechniqueCatalog, TechniqueId};
use crate::timer::{Clock, PhaseScheduler, SchedulerState, SystemClock};

pub struct SessionController {
    catalog: TechniqueCatalog,
    session: Rc<SessionState>,
    preferences: Rc<PreferencesState>,
    scheduler: RefCell<PhaseScheduler>,
    invoker: CommandInvoker,
    timer_events: Notifier<SchedulerEvent>,
    theme: Option<Rc<dyn ThemeApplier>>,
    config: Config,
}

impl SessionController {
    /// Controller on the wall clock with the built-in techniques.
    pub fn new(config: &Config, preferences: PreferencesState) -> Result<Self> {
        Self::with_clock(config, preferences, SystemClock)
    }

    pub fn with_clock(
        config: &Config,
        preferences: PreferencesState,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        Self::from_parts(config, preferences, clock, TechniqueCatalog::builtin()?)
    }

    /// Assemble a controller from explicit parts. The preferred technique
    /// is installed (idle) so queries have a phase table before the first
    /// start.
    pub fn from_parts(
        config: &Config,
        preferences: PreferencesState,
        clock: impl Clock + 'static,
        catalog: TechniqueCatalog,
    ) -> Result<Self> {
        let preferred = preferences.technique();
        let initial = match catalog.get(preferred) {
            Some(t) => t,
            None => {
                let fallback = catalog
                    .iter()
                    .next()
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownTechnique(preferred.to_string()))?;
                tracing::warn!(
                    preferred = %preferred,
                    fallback = %fallback.id,
                    "preferred technique not in catalog"
                );
                fallback
            }
        };

        let session = Rc::new(SessionState::new());
        session.change_technique(initial.id, Arc::clone(&initial))?;

        let mut scheduler = PhaseScheduler::with_clock(clock);
        scheduler.set_technique(Arc::clone(&initial));

        tracing::info!(
            technique = %initial.id,
            techniques = catalog.len(),
            history_limit = config.session.history_limit,
            "session controller ready"
        );

        Ok(Self {
            catalog,
            session,
            preferences: Rc::new(preferences),
            scheduler: RefCell::new(scheduler),
            invoker: CommandInvoker::with_capacity(config.session.history_limit),
            timer_events: Notifier::new("scheduler"),
            theme: None,
            config: config.clone(),
        })
    }

    pub fn with_theme_applier(mut self, applier: Rc<dyn ThemeApplier>) -> Self {
        self.theme = Some(applier);
        self
    }

    /// Wire a cue dispatcher to the session using the configured tones.
    pub fn attach_cues(
        &self,
        audio: impl AudioCue + 'static,
        haptics: impl Haptics + 'static,
    ) -> Rc<CueDispatcher> {
        let dispatcher = Rc::new(CueDispatcher::new(
            audio,
            haptics,
            Rc::clone(&self.preferences),
            self.config.cues.clone(),
        ));
        dispatcher.attach(&self.session);
        dispatcher
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn session(&self) -> &Rc<SessionState> {
        &self.session
    }

    pub fn preferences(&self) -> &Rc<PreferencesState> {
        &self.preferences
    }

    pub fn invoker(&self) -> &CommandInvoker {
        &self.invoker
    }

    pub fn catalog(&self) -> &TechniqueCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `None` while a command holds the scheduler.
    pub fn scheduler_state(&self) -> Option<SchedulerState> {
        self.scheduler.try_borrow().ok().map(|s| s.state())
    }

    pub fn subscribe_timer<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) -> Result<(), SubscriberError> + 'static,
    {
        self.timer_events.subscribe(callback)
    }

    // ── User operations ──────────────────────────────────────────────

    pub fn start(&self, technique_id: TechniqueId) -> Result<()> {
        let technique = self.catalog.resolve(technique_id)?;
        self.run(Command::start(technique_id, Some(technique)))?;
        self.remember_technique(technique_id);
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.run(Command::pause())
    }

    pub fn resume(&self) -> Result<()> {
        self.run(Command::resume())
    }

    /// Resume a paused session, pause anything else.
    pub fn toggle_pause(&self) -> Result<()> {
        if self.session.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn change_technique(&self, technique_id: TechniqueId) -> Result<()> {
        let technique: Arc<Technique> = self.catalog.resolve(technique_id)?;
        self.run(Command::change_technique(technique_id, Some(technique)))?;
        self.remember_technique(technique_id);
        Ok(())
    }

    pub fn change_theme(&self, theme: Theme) -> Result<()> {
        self.run(Command::change_theme(theme))
    }

    pub fn undo(&self) -> Result<()> {
        self.invoker.undo(&self.context())
    }

    pub fn redo(&self) -> Result<()> {
        self.invoker.redo(&self.context())
    }

    /// End the session and rewind it to zero. Not recorded in the history.
    pub fn stop(&self) -> Result<()> {
        if self.invoker.is_executing() {
            return Err(CoreError::command_failed(
                "Stop",
                "another command is already executing",
                None,
            ));
        }
        let events = {
            let mut scheduler = self.scheduler_mut("Stop")?;
            let mut events: Vec<SchedulerEvent> = scheduler.stop().into_iter().collect();
            events.extend(scheduler.reset());
            events
        };

        self.session.stop_session()?;
        self.session.reset_session()?;
        tracing::info!("session stopped");

        for event in events {
            self.timer_events.notify(event);
        }
        Ok(())
    }

    /// Advance the scheduler to now, fold its updates into the session and
    /// publish every event to timer subscribers.
    ///
    /// An update the session rejects is logged and skipped; it fires no cue.
    pub fn tick(&self) -> Result<Vec<SchedulerEvent>> {
        let events = self.scheduler_mut("Tick")?.tick();

        for event in &events {
            if let SchedulerEvent::Update {
                current_time,
                current_phase,
                ..
            } = event
            {
                if let Err(err) = self
                    .session
                    .update_timer(*current_time, current_phase.clone())
                {
                    tracing::warn!(
                        error = %err,
                        current_time = *current_time,
                        "scheduler update rejected"
                    );
                }
            }
            self.timer_events.notify(event.clone());
        }
        Ok(events)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn context(&self) -> CommandContext<'_> {
        let mut ctx = CommandContext::new()
            .with_session(&self.session)
            .with_scheduler(&self.scheduler)
            .with_preferences(&self.preferences);
        ctx.theme = self.theme.as_deref();
        ctx
    }

    fn run(&self, command: Command) -> Result<()> {
        let name = command.name();
        let result = self.invoker.execute_command(command, &self.context());
        if let Err(err) = &result {
            tracing::warn!(command = name, error = %err, "command failed");
        }
        result
    }

    fn scheduler_mut(&self, operation: &str) -> Result<std::cell::RefMut<'_, PhaseScheduler>> {
        self.scheduler
            .try_borrow_mut()
            .map_err(|_| CoreError::command_failed(operation, "scheduler is busy", None))
    }

    fn remember_technique(&self, technique_id: TechniqueId) {
        if let Err(err) = self.preferences.set_technique(technique_id) {
            tracing::warn!(error = %err, technique = %technique_id, "failed to persist technique");
        }
    }
}
