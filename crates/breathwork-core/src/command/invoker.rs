use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use super::{Command, CommandContext};
use crate::error::{CoreError, Result};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Runs commands one at a time and keeps a bounded, linear undo history.
///
/// `position` counts the commands currently applied: the command at
/// `position - 1` is the next undo target, the one at `position` the next
/// redo target. Executing a new command drops everything from `position`
/// onwards.
#[derive(Debug)]
pub struct CommandInvoker {
    history: RefCell<VecDeque<Command>>,
    position: Cell<usize>,
    capacity: usize,
    in_flight: Cell<bool>,
}

/// Clears the single-flight flag when the operation ends, however it ends.
struct FlightGuard<'a>(&'a Cell<bool>);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl CommandInvoker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_LIMIT)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: RefCell::new(VecDeque::with_capacity(capacity + 1)),
            position: Cell::new(0),
            capacity,
            in_flight: Cell::new(false),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.borrow().is_empty()
    }

    /// Index of the most recently applied command, `None` when nothing is
    /// applied.
    pub fn cursor(&self) -> Option<usize> {
        self.position.get().checked_sub(1)
    }

    pub fn can_undo(&self) -> bool {
        let position = self.position.get();
        position > 0
            && self
                .history
                .borrow()
                .get(position - 1)
                .is_some_and(Command::is_undoable)
    }

    pub fn can_redo(&self) -> bool {
        self.position.get() < self.len()
    }

    pub fn is_executing(&self) -> bool {
        self.in_flight.get()
    }

    pub fn history_names(&self) -> Vec<&'static str> {
        self.history.borrow().iter().map(Command::name).collect()
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Validate and execute `command`, recording it on success.
    pub fn execute_command(&self, mut command: Command, ctx: &CommandContext<'_>) -> Result<()> {
        let name = command.name();
        let _flight = self.begin(name, command.subject())?;

        command.validate()?;
        command
            .execute(ctx)
            .map_err(|err| err.wrap_command(name, command.subject()))?;

        let mut history = self.history.borrow_mut();
        history.truncate(self.position.get());
        history.push_back(command);
        if history.len() > self.capacity {
            history.pop_front();
            tracing::debug!(capacity = self.capacity, "evicted oldest history entry");
        }
        self.position.set(history.len());
        tracing::debug!(command = name, position = history.len(), "command recorded");
        Ok(())
    }

    pub fn undo(&self, ctx: &CommandContext<'_>) -> Result<()> {
        let _flight = self.begin("Undo", None)?;

        let position = self.position.get();
        if position == 0 {
            return Err(CoreError::command_failed("Undo", "nothing to undo", None));
        }
        let index = position - 1;

        let mut command = self.take(index)?;
        if !command.is_undoable() {
            let name = command.name();
            self.put_back(index, command);
            return Err(CoreError::command_failed(
                "Undo",
                format!("'{name}' cannot be undone"),
                None,
            ));
        }

        let result = command
            .undo(ctx)
            .map_err(|err| err.wrap_command(command.name(), command.subject()));
        let name = command.name();
        self.put_back(index, command);
        result?;

        self.position.set(index);
        tracing::debug!(command = name, position = index, "command undone");
        Ok(())
    }

    pub fn redo(&self, ctx: &CommandContext<'_>) -> Result<()> {
        let _flight = self.begin("Redo", None)?;

        let position = self.position.get();
        if position >= self.len() {
            return Err(CoreError::command_failed("Redo", "nothing to redo", None));
        }

        let mut command = self.take(position)?;
        self.position.set(position + 1);
        let result = match command.validate() {
            Ok(()) => command.execute(ctx),
            Err(err) => Err(err),
        };
        let result = result.map_err(|err| err.wrap_command(command.name(), command.subject()));
        let name = command.name();
        self.put_back(position, command);

        if let Err(err) = result {
            self.position.set(position);
            return Err(err);
        }
        tracing::debug!(command = name, position = position + 1, "command redone");
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn begin(&self, name: &str, subject: Option<String>) -> Result<FlightGuard<'_>> {
        if self.in_flight.get() {
            tracing::warn!(command = name, "rejected: another command is executing");
            return Err(CoreError::command_failed(
                name,
                "another command is already executing",
                subject,
            ));
        }
        self.in_flight.set(true);
        Ok(FlightGuard(&self.in_flight))
    }

    /// Commands are taken out of the history while they run so observers
    /// may query the invoker during the resulting notifications.
    fn take(&self, index: usize) -> Result<Command> {
        self.history
            .borrow_mut()
            .remove(index)
            .ok_or_else(|| CoreError::command_failed("History", "history index out of range", None))
    }

    fn put_back(&self, index: usize, command: Command) {
        self.history.borrow_mut().insert(index, command);
    }
}

impl Default for CommandInvoker {
    fn default() -> Self {
        Self::new()
    }
}
