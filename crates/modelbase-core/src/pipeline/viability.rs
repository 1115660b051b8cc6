//! Viability check: an empty build is degraded, not broken.

use crate::domain::dataset::CanonicalDataset;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viability {
    Viable { providers: usize, models: usize },
    /// Zero models. The dataset is still produced.
    Empty { providers: usize },
}

impl Viability {
    pub fn is_viable(&self) -> bool {
        matches!(self, Viability::Viable { .. })
    }
}

pub fn check_viability(dataset: &CanonicalDataset) -> Viability {
    let providers = dataset.provider_count();
    let models = dataset.model_count();
    if models == 0 {
        obs::emit_build_empty(providers);
        Viability::Empty { providers }
    } else {
        Viability::Viable { providers, models }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_is_not_viable() {
        let verdict = check_viability(&CanonicalDataset::empty());
        assert_eq!(verdict, Viability::Empty { providers: 0 });
        assert!(!verdict.is_viable());
    }
}
