mod catalog;

pub use catalog::TechniqueCatalog;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Closed set of techniques the application knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TechniqueId {
    #[serde(rename = "box4")]
    Box4,
    #[serde(rename = "relax-478")]
    Relax478,
    #[serde(rename = "coherent")]
    Coherent,
    #[serde(rename = "triangle")]
    Triangle,
}

impl TechniqueId {
    pub const ALL: [TechniqueId; 4] = [
        TechniqueId::Box4,
        TechniqueId::Relax478,
        TechniqueId::Coherent,
        TechniqueId::Triangle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TechniqueId::Box4 => "box4",
            TechniqueId::Relax478 => "relax-478",
            TechniqueId::Coherent => "coherent",
            TechniqueId::Triangle => "triangle",
        }
    }
}

impl Default for TechniqueId {
    fn default() -> Self {
        TechniqueId::Box4
    }
}

impl fmt::Display for TechniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TechniqueId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        TechniqueId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownTechnique(s.to_string()))
    }
}

/// One named segment of a technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Stable key, e.g. "inhale".
    pub key: String,
    /// Display name, e.g. "Breathe in".
    pub name: String,
}

impl Phase {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// Where in a cycle a given elapsed second falls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub phase_index: usize,
    pub phase: Phase,
    /// Duration of this phase in seconds.
    pub duration: u64,
    /// Seconds already spent in this phase, in `0..duration`.
    pub time_in_phase: u64,
    /// `duration - time_in_phase`; equals 1 on the last second of the phase.
    pub time_left: u64,
}

impl PhaseInfo {
    pub fn is_final_second(&self) -> bool {
        self.time_left == 1
    }
}

/// Immutable description of a breathing pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technique {
    pub id: TechniqueId,
    pub name: String,
    /// Display label such as "4-4-4-4".
    pub pattern: String,
    phases: Vec<Phase>,
    durations_sec: Vec<u32>,
}

impl Technique {
    /// Build a technique, rejecting empty, misaligned, or zero-length phase tables.
    pub fn new(
        id: TechniqueId,
        name: impl Into<String>,
        pattern: impl Into<String>,
        phases: Vec<Phase>,
        durations_sec: Vec<u32>,
    ) -> Result<Self> {
        let invalid = |message: String| CoreError::InvalidTechnique {
            id: id.to_string(),
            message,
        };
        if phases.is_empty() {
            return Err(invalid("a technique needs at least one phase".into()));
        }
        if phases.len() != durations_sec.len() {
            return Err(invalid(format!(
                "{} phases but {} durations",
                phases.len(),
                durations_sec.len()
            )));
        }
        if let Some(pos) = durations_sec.iter().position(|d| *d == 0) {
            return Err(invalid(format!(
                "phase '{}' has a zero duration",
                phases[pos].key
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            pattern: pattern.into(),
            phases,
            durations_sec,
        })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn durations_sec(&self) -> &[u32] {
        &self.durations_sec
    }

    /// Length of one full cycle in seconds.
    pub fn total_duration(&self) -> u64 {
        self.durations_sec.iter().map(|d| u64::from(*d)).sum()
    }

    /// Resolve the phase active at `elapsed_seconds`. Values past the end of
    /// a cycle wrap around.
    pub fn phase_at(&self, elapsed_seconds: u64) -> PhaseInfo {
        let total = self.total_duration();
        let mut offset = if total == 0 { 0 } else { elapsed_seconds % total };

        for (index, duration) in self.durations_sec.iter().enumerate() {
            let duration = u64::from(*duration);
            if offset < duration {
                return PhaseInfo {
                    phase_index: index,
                    phase: self.phases[index].clone(),
                    duration,
                    time_in_phase: offset,
                    time_left: duration - offset,
                };
            }
            offset -= duration;
        }

        // Unreachable for a validated technique; fall back to the first phase.
        let duration = u64::from(self.durations_sec[0]);
        PhaseInfo {
            phase_index: 0,
            phase: self.phases[0].clone(),
            duration,
            time_in_phase: 0,
            time_left: duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn box4() -> Technique {
        Technique::new(
            TechniqueId::Box4,
            "Box",
            "4-4-4-4",
            vec![
                Phase::new("inhale", "Inhale"),
                Phase::new("hold", "Hold"),
                Phase::new("exhale", "Exhale"),
                Phase::new("hold", "Hold"),
            ],
            vec![4, 4, 4, 4],
        )
        .unwrap()
    }

    #[test]
    fn phase_at_start() {
        let info = box4().phase_at(0);
        assert_eq!(info.phase_index, 0);
        assert_eq!(info.time_in_phase, 0);
        assert_eq!(info.time_left, 4);
    }

    #[test]
    fn phase_at_fifth_second() {
        let info = box4().phase_at(5);
        assert_eq!(info.phase_index, 1);
        assert_eq!(info.time_in_phase, 1);
        assert_eq!(info.time_left, 3);
    }

    #[test]
    fn phase_at_wraps_after_cycle() {
        let t = box4();
        assert_eq!(t.phase_at(16), t.phase_at(0));
        assert_eq!(t.phase_at(19).time_left, 1);
    }

    #[test]
    fn rejects_misaligned_durations() {
        let err = Technique::new(
            TechniqueId::Coherent,
            "Coherent",
            "5-5",
            vec![Phase::new("inhale", "Inhale")],
            vec![5, 5],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTechnique { .. }));
    }

    #[test]
    fn rejects_zero_duration() {
        let err = Technique::new(
            TechniqueId::Coherent,
            "Coherent",
            "5-0",
            vec![Phase::new("inhale", "Inhale"), Phase::new("exhale", "Exhale")],
            vec![5, 0],
        )
        .unwrap_err();
        assert!(err.to_string().contains("exhale"));
    }

    #[test]
    fn technique_id_parses_case_insensitively() {
        assert_eq!("BOX4".parse::<TechniqueId>().unwrap(), TechniqueId::Box4);
        assert_eq!(
            "relax-478".parse::<TechniqueId>().unwrap(),
            TechniqueId::Relax478
        );
        assert!("square".parse::<TechniqueId>().is_err());
    }

    #[test]
    fn technique_id_serializes_as_string_form() {
        let json = serde_json::to_string(&TechniqueId::Relax478).unwrap();
        assert_eq!(json, "\"relax-478\"");
    }

    proptest! {
        #[test]
        fn phase_at_is_consistent(
            durations in prop::collection::vec(1u32..20, 1..6),
            elapsed in 0u64..500,
        ) {
            let phases = durations
                .iter()
                .enumerate()
                .map(|(i, _)| Phase::new(format!("p{i}"), format!("Phase {i}")))
                .collect();
            let t = Technique::new(TechniqueId::Box4, "t", "t", phases, durations.clone()).unwrap();

            prop_assert_eq!(
                t.total_duration(),
                durations.iter().map(|d| u64::from(*d)).sum::<u64>()
            );

            let info = t.phase_at(elapsed);
            prop_assert!(info.time_in_phase < info.duration);
            prop_assert_eq!(info.time_in_phase + info.time_left, info.duration);
            prop_assert_eq!(info.duration, u64::from(durations[info.phase_index]));
        }
    }
}
