//! # Breathwork Core Library
//!
//! Session control core for guided breathing exercises. All operations are
//! available through the standalone CLI binary; any richer front end is a
//! thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Phase Scheduler**: A wall-clock-based state machine that requires the
//!   caller to periodically invoke `tick()` for per-second updates
//! - **Session State**: Observable snapshot of the running session
//! - **Commands**: Reversible user actions with a bounded undo/redo history
//! - **Cues**: Per-second audio and vibration feedback gated by preferences
//! - **Storage**: TOML configuration and a JSON key-value store for preferences
//!
//! ## Key Components
//!
//! - [`SessionController`]: Composition root exposing user-level operations
//! - [`PhaseScheduler`]: Core timer state machine
//! - [`SessionState`]: Canonical session snapshot and change notifications
//! - [`CommandInvoker`]: Single-flight command execution and history
//! - [`Config`]: Application configuration management

pub mod command;
pub mod controller;
pub mod cues;
pub mod error;
pub mod events;
pub mod notifier;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod technique;
pub mod timer;

pub use command::{Command, CommandContext, CommandInvoker, ThemeApplier};
pub use controller::SessionController;
pub use cues::{AudioCue, CueDispatcher, CueKind, Haptics, Silent};
pub use error::{ConfigError, CoreError};
pub use events::SchedulerEvent;
pub use notifier::{Notifier, SubscriberError, SubscriptionId};
pub use preferences::{Preferences, PreferencesState, Theme, PREFERENCES_KEY};
pub use session::{ChangeKind, SessionChange, SessionSnapshot, SessionState};
pub use storage::{Config, FileStore, KeyValueStore, MemoryStore};
pub use technique::{Phase, PhaseInfo, Technique, TechniqueCatalog, TechniqueId};
pub use timer::{Clock, ManualClock, PhaseScheduler, SchedulerState, SystemClock};
