use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Phase, Technique, TechniqueId};
use crate::error::{CoreError, Result};

/// Typed registry of techniques, resolved once at startup.
#[derive(Debug, Clone)]
pub struct TechniqueCatalog {
    techniques: BTreeMap<TechniqueId, Arc<Technique>>,
}

impl TechniqueCatalog {
    /// The techniques bundled with the application.
    pub fn builtin() -> Result<Self> {
        let inhale = || Phase::new("inhale", "Inhale");
        let hold = || Phase::new("hold", "Hold");
        let exhale = || Phase::new("exhale", "Exhale");

        let techniques = vec![
            Technique::new(
                TechniqueId::Box4,
                "Box Breathing",
                "4-4-4-4",
                vec![inhale(), hold(), exhale(), hold()],
                vec![4, 4, 4, 4],
            )?,
            Technique::new(
                TechniqueId::Relax478,
                "Relaxing Breath",
                "4-7-8",
                vec![inhale(), hold(), exhale()],
                vec![4, 7, 8],
            )?,
            Technique::new(
                TechniqueId::Coherent,
                "Coherent Breathing",
                "5-5",
                vec![inhale(), exhale()],
                vec![5, 5],
            )?,
            Technique::new(
                TechniqueId::Triangle,
                "Triangle Breathing",
                "4-4-4",
                vec![inhale(), hold(), exhale()],
                vec![4, 4, 4],
            )?,
        ];

        Ok(Self::from_techniques(techniques))
    }

    pub fn from_techniques(techniques: impl IntoIterator<Item = Technique>) -> Self {
        Self {
            techniques: techniques
                .into_iter()
                .map(|t| (t.id, Arc::new(t)))
                .collect(),
        }
    }

    pub fn get(&self, id: TechniqueId) -> Option<Arc<Technique>> {
        self.techniques.get(&id).cloned()
    }

    /// Like [`get`](Self::get) but reports a missing id as an error.
    pub fn resolve(&self, id: TechniqueId) -> Result<Arc<Technique>> {
        self.get(id)
            .ok_or_else(|| CoreError::UnknownTechnique(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Technique>> {
        self.techniques.values()
    }

    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }
}
