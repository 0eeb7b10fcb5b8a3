//! Usage-flag bookkeeping as an explicit set difference

use serde::{Deserialize, Serialize};

use crate::core::Observation;

/// Observations whose usage flag changed in one estimation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageChanges {
    /// Now in the active set, not used before (flag set)
    pub newly_used: Vec<Observation>,
    /// Used before, no longer in the active set (flag cleared)
    pub newly_unused: Vec<Observation>,
}

impl UsageChanges {
    pub fn is_empty(&self) -> bool {
        self.newly_used.is_empty() && self.newly_unused.is_empty()
    }
}

fn contains(set: &[Observation], observation: &Observation) -> bool {
    set.iter().any(|o| o.same_sighting(observation))
}

/// Build the observation set returned with a new estimate.
///
/// The result holds the active set flagged as used, the previously used
/// observations that dropped out with the flag cleared, and any remaining
/// observation from `to_save` not already present. Inputs are not modified.
pub fn reconcile(
    active: &[Observation],
    previously_used: &[Observation],
    to_save: &[Observation],
) -> (Vec<Observation>, UsageChanges) {
    let mut returned = Vec::with_capacity(active.len() + previously_used.len() + to_save.len());
    let mut changes = UsageChanges::default();

    for observation in active {
        let used = Observation {
            used_for_approximation: true,
            ..observation.clone()
        };
        if !contains(previously_used, observation) {
            changes.newly_used.push(used.clone());
        }
        returned.push(used);
    }

    for observation in previously_used.iter().filter(|o| !contains(active, o)) {
        let unused = Observation {
            used_for_approximation: false,
            ..observation.clone()
        };
        changes.newly_unused.push(unused.clone());
        returned.push(unused);
    }

    for observation in to_save {
        if !contains(&returned, observation) {
            returned.push(observation.clone());
        }
    }

    (returned, changes)
}

/// Observation set returned when no estimate could be formed: only the new
/// observations, usage flags untouched
pub fn unestimated(active: &[Observation], to_save: &[Observation]) -> Vec<Observation> {
    let mut returned: Vec<Observation> = to_save.to_vec();
    for observation in active.iter().filter(|o| o.is_new()) {
        if !contains(&returned, observation) {
            returned.push(observation.clone());
        }
    }
    returned
}
