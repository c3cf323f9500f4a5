use crate::domain::decimal::{Decimal, MAX_SCALE};
use crate::domain::model::VerdictStatus;
use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Decimal places readings are rounded to before comparison (instrument display resolution).
pub const DEFAULT_PRECISION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOutcome {
    #[default]
    Pass,
    Fail,
}

impl From<RuleOutcome> for VerdictStatus {
    fn from(outcome: RuleOutcome) -> Self {
        match outcome {
            RuleOutcome::Pass => VerdictStatus::Pass,
            RuleOutcome::Fail => VerdictStatus::Fail,
        }
    }
}

/// An inclusive value range. A missing bound leaves that side open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub label: String,
    #[serde(default)]
    pub lower: Option<Decimal>,
    #[serde(default)]
    pub upper: Option<Decimal>,
    #[serde(default)]
    pub status: RuleOutcome,
}

impl Rule {
    pub fn new(label: &str, lower: Option<Decimal>, upper: Option<Decimal>, status: RuleOutcome) -> Self {
        Self {
            label: label.to_string(),
            lower,
            upper,
            status,
        }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        self.lower.map_or(true, |lo| value >= lo) && self.upper.map_or(true, |hi| value <= hi)
    }

    /// Unsigned distance from `value` to the closest finite bound.
    pub fn distance_to_nearest_bound(&self, value: Decimal) -> Option<Decimal> {
        [self.lower, self.upper]
            .into_iter()
            .flatten()
            .filter_map(|bound| value.checked_sub(bound).map(Decimal::abs))
            .min()
    }
}

/// Ordered classification rules. The first rule containing a value wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    precision: u32,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, precision: u32) -> Result<Self, ConfigError> {
        if precision > MAX_SCALE {
            return Err(ConfigError::InvalidValue {
                field: "classification.precision".to_string(),
                value: precision.to_string(),
                reason: format!("must be at most {}", MAX_SCALE),
            });
        }

        let mut labels = HashSet::new();
        for rule in &rules {
            if rule.label.trim().is_empty() {
                return Err(ConfigError::MalformedRule {
                    label: rule.label.clone(),
                    reason: "label cannot be empty".to_string(),
                });
            }
            if !labels.insert(rule.label.as_str()) {
                return Err(ConfigError::MalformedRule {
                    label: rule.label.clone(),
                    reason: "duplicate label".to_string(),
                });
            }
            if let (Some(lo), Some(hi)) = (rule.lower, rule.upper) {
                if lo > hi {
                    return Err(ConfigError::MalformedRule {
                        label: rule.label.clone(),
                        reason: format!("lower bound {} exceeds upper bound {}", lo, hi),
                    });
                }
            }
        }

        Ok(Self { rules, precision })
    }

    /// Six tolerance bands around a nominal size, compared at three decimals:
    /// over upper tolerance, +0.005, nominal ±0.002, -0.005, -0.010, under lower tolerance.
    pub fn tolerance_bands(standard: Decimal) -> Result<Self, ConfigError> {
        let offset = |thousandths: i64| -> Result<Option<Decimal>, ConfigError> {
            standard
                .checked_add(Decimal::new(thousandths, 3))
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "classification.standard".to_string(),
                    value: standard.to_string(),
                    reason: "out of range".to_string(),
                })
        };

        let rules = vec![
            Rule::new("over_upper", offset(8)?, None, RuleOutcome::Fail),
            Rule::new("plus_0.005", offset(3)?, offset(7)?, RuleOutcome::Pass),
            Rule::new("nominal", offset(-2)?, offset(2)?, RuleOutcome::Pass),
            Rule::new("minus_0.005", offset(-7)?, offset(-3)?, RuleOutcome::Pass),
            Rule::new("minus_0.010", offset(-12)?, offset(-8)?, RuleOutcome::Pass),
            Rule::new("under_lower", None, offset(-13)?, RuleOutcome::Fail),
        ];
        Self::new(rules, 3)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Shared reference to the active rule set.
///
/// The acquisition loop takes one snapshot per reading; a reload swaps the whole set, so a
/// classification never observes two different rule sets.
#[derive(Debug, Clone)]
pub struct RuleSetHandle {
    inner: Arc<RwLock<Arc<RuleSet>>>,
}

impl RuleSetHandle {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(rules))),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `rules` and returns the set it replaced.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(rules))
    }
}
