use std::time::Duration;

use breathwork_core::{
    AudioCue, Config, Haptics, SessionController, SessionState, Silent, TechniqueId,
};
use clap::Subcommand;
use tokio::time::{self, MissedTickBehavior};

use super::load_preferences;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a guided session, printing scheduler events as JSON lines
    Run {
        /// Technique id (defaults to the saved preference)
        #[arg(long)]
        technique: Option<String>,
        /// Stop after this many completed cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Stop after this many elapsed seconds
        #[arg(long)]
        seconds: Option<u64>,
        /// Disable terminal bell and cue log lines
        #[arg(long)]
        silent: bool,
    },
}

/// Cue backend for a terminal: rings the bell and logs the cue.
#[derive(Debug, Clone, Copy)]
struct TerminalCue;

impl AudioCue for TerminalCue {
    fn play_cue(&self, frequency_hz: f32, duration_ms: u32, gain: f32) {
        eprint!("\x07");
        tracing::info!(frequency_hz, duration_ms, gain, "cue");
    }
}

impl Haptics for TerminalCue {
    fn pulse(&self, duration_ms: u32) {
        tracing::debug!(duration_ms, "vibration cue");
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StopAfter {
    cycles: Option<u64>,
    seconds: Option<u64>,
}

impl StopAfter {
    fn reached(&self, session: &SessionState) -> bool {
        self.cycles.is_some_and(|n| session.cycles_completed() >= n)
            || self.seconds.is_some_and(|n| session.elapsed_seconds() >= n)
    }
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Run {
            technique,
            cycles,
            seconds,
            silent,
        } => {
            let config = Config::load_or_default();
            let prefs = load_preferences(&config)?;
            let controller = SessionController::new(&config, prefs)?;

            let technique = match technique {
                Some(id) => id.parse::<TechniqueId>()?,
                None => controller.preferences().technique(),
            };
            let _cues = if silent {
                controller.attach_cues(Silent, Silent)
            } else {
                controller.attach_cues(TerminalCue, TerminalCue)
            };
            controller.subscribe_timer(|event| {
                println!("{}", serde_json::to_string(event)?);
                Ok(())
            });

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(drive(
                &controller,
                technique,
                StopAfter { cycles, seconds },
                config.session.tick_interval_ms,
            ))
        }
    }
}

async fn drive(
    controller: &SessionController,
    technique: TechniqueId,
    stop_after: StopAfter,
    tick_interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.start(technique)?;

    let mut ticker = time::interval(Duration::from_millis(tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            _ = ticker.tick() => {
                controller.tick()?;
                if stop_after.reached(controller.session()) {
                    break;
                }
            }
        }
    }

    let snapshot = controller.session().snapshot();
    controller.stop()?;
    let summary = serde_json::json!({
        "type": "session_summary",
        "technique_id": snapshot.current_technique_id,
        "elapsed_seconds": snapshot.elapsed_seconds,
        "cycles_completed": snapshot.cycles_completed,
        "session_duration_ms": snapshot.session_duration_ms,
    });
    println!("{summary}");
    Ok(())
}
