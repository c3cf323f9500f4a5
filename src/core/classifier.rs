use crate::domain::model::{Reading, Verdict, VerdictStatus};
use crate::domain::rules::{RuleSet, RuleSetHandle};

/// Classifies `reading` against `rules`.
///
/// The value is rounded half-up to the rule set's precision, then rules are tried in order
/// and the first one containing the value (bounds inclusive) decides. No match is
/// `UNKNOWN`, with a negative margin to the closest bound of any rule.
pub fn classify(reading: &Reading, rules: &RuleSet) -> Verdict {
    let value = reading.value.round_half_up(rules.precision());

    if let Some(rule) = rules.rules().iter().find(|rule| rule.contains(value)) {
        return Verdict {
            status: rule.status.into(),
            rule_id: Some(rule.label.clone()),
            margin: rule.distance_to_nearest_bound(value),
        };
    }

    let margin = rules
        .rules()
        .iter()
        .filter_map(|rule| rule.distance_to_nearest_bound(value))
        .min()
        .map(|distance| -distance);

    Verdict {
        status: VerdictStatus::Unknown,
        rule_id: None,
        margin,
    }
}

/// Classifier bound to the live rule set.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSetHandle,
}

impl Classifier {
    pub fn new(rules: RuleSetHandle) -> Self {
        Self { rules }
    }

    /// Takes one snapshot of the active rule set for this reading.
    pub fn classify(&self, reading: &Reading) -> Verdict {
        let rules = self.rules.snapshot();
        classify(reading, &rules)
    }

    pub fn handle(&self) -> &RuleSetHandle {
        &self.rules
    }
}
