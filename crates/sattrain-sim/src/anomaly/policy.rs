//! Difficulty-derived injection policy.
//!
//! Beginner sessions are not special-cased anywhere: their policy simply has
//! `enabled: false`, so the injector keeps a single code path.

use crate::anomaly::{AnomalyCategory, AnomalyDefinition, Severity};
use crate::core::Difficulty;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionPolicy {
    pub enabled: bool,
    /// Probability of injecting on each check, in [0, 1].
    pub probability: f64,
    pub max_concurrent: usize,
    pub severities: Vec<Severity>,
    pub categories: Vec<AnomalyCategory>,
    pub check_interval_ms: u64,
}

impl InjectionPolicy {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        use AnomalyCategory::*;

        match difficulty {
            Difficulty::Beginner => Self {
                enabled: false,
                probability: 0.0,
                max_concurrent: 0,
                severities: Vec::new(),
                categories: Vec::new(),
                check_interval_ms: 60_000,
            },
            Difficulty::Intermediate => Self {
                enabled: true,
                probability: 0.15,
                max_concurrent: 1,
                severities: vec![Severity::Warning],
                categories: vec![Power, Attitude, Thermal, Communications],
                check_interval_ms: 45_000,
            },
            Difficulty::Advanced => Self {
                enabled: true,
                probability: 0.25,
                max_concurrent: 2,
                severities: vec![Severity::Warning, Severity::Critical],
                categories: AnomalyCategory::ALL.to_vec(),
                check_interval_ms: 30_000,
            },
            Difficulty::Expert => Self {
                enabled: true,
                probability: 0.4,
                max_concurrent: 3,
                severities: vec![Severity::Warning, Severity::Critical],
                categories: AnomalyCategory::ALL.to_vec(),
                check_interval_ms: 20_000,
            },
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    /// Whether a fault type may be injected under this policy.
    pub fn allows(&self, definition: &AnomalyDefinition) -> bool {
        self.severities.contains(&definition.severity)
            && self.categories.contains(&definition.category)
    }
}
