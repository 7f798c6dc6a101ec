use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::technique::{PhaseInfo, TechniqueId};

/// Every scheduler state change produces an Event.
/// `Update` and `CycleComplete` come from `tick()`; the rest are returned by
/// the lifecycle methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Started {
        technique_id: TechniqueId,
        current_time: u64,
        at: DateTime<Utc>,
    },
    Paused {
        current_time: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        current_time: u64,
        at: DateTime<Utc>,
    },
    Stopped {
        current_time: u64,
        at: DateTime<Utc>,
    },
    Reset {
        at: DateTime<Utc>,
    },
    /// One whole second elapsed.
    Update {
        current_time: u64,
        current_phase: PhaseInfo,
        at: DateTime<Utc>,
    },
    /// `current_time` reached a multiple of the technique's cycle length.
    CycleComplete {
        cycles_completed: u64,
        current_time: u64,
        at: DateTime<Utc>,
    },
}
