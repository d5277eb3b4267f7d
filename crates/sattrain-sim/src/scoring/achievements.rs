//! Achievement catalog.
//!
//! Process-wide and immutable. Each predicate is a plain function over the
//! metrics and dimension scores; a predicate returning `Err` is logged and
//! skipped without affecting the others.

use crate::core::SessionMetrics;
use crate::engine::physics::CIRCULAR_ECCENTRICITY;
use crate::error::SimError;
use tracing::warn;

/// Inputs available to achievement predicates.
#[derive(Debug, Clone, Copy)]
pub struct AchievementContext<'a> {
    pub metrics: &'a SessionMetrics,
    pub coverage: f64,
    pub efficiency: f64,
    pub safety: f64,
    pub timing: f64,
    pub weighted: f64,
}

pub type AchievementPredicate = fn(&AchievementContext<'_>) -> Result<bool, String>;

#[derive(Clone, Copy)]
pub struct AchievementDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub predicate: AchievementPredicate,
}

/// Weighted total at which a run counts as perfect.
pub const FLAWLESS_THRESHOLD: f64 = 99.5;

pub static ACHIEVEMENTS: [AchievementDefinition; 8] = [
    AchievementDefinition {
        id: "precision_burn",
        name: "Precision Burn",
        description: "Execute a planned burn within 1% of its delta-V target",
        predicate: precision_burn,
    },
    AchievementDefinition {
        id: "fuel_miser",
        name: "Fuel Miser",
        description: "Complete the scenario using under 80% of the delta-V budget",
        predicate: fuel_miser,
    },
    AchievementDefinition {
        id: "cool_head",
        name: "Cool Head",
        description: "Complete the scenario without a critical alert",
        predicate: cool_head,
    },
    AchievementDefinition {
        id: "ahead_of_schedule",
        name: "Ahead of Schedule",
        description: "Complete the scenario in under 80% of the estimated time",
        predicate: ahead_of_schedule,
    },
    AchievementDefinition {
        id: "flawless",
        name: "Flawless",
        description: "Achieve a perfect score",
        predicate: flawless,
    },
    AchievementDefinition {
        id: "hohmann_master",
        name: "Hohmann Master",
        description: "Reach a circular orbit with exactly two burns",
        predicate: hohmann_master,
    },
    AchievementDefinition {
        id: "self_reliant",
        name: "Self Reliant",
        description: "Complete the scenario without requesting a hint",
        predicate: self_reliant,
    },
    AchievementDefinition {
        id: "troubleshooter",
        name: "Troubleshooter",
        description: "Resolve three anomalies in one session",
        predicate: troubleshooter,
    },
];

fn precision_burn(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    Ok(ctx
        .metrics
        .burns
        .iter()
        .filter_map(|b| b.accuracy)
        .any(|accuracy| accuracy >= 0.99))
}

fn fuel_miser(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    let m = ctx.metrics;
    Ok(m.completed && m.delta_v_budget_ms > 0.0 && m.delta_v_used_ms < 0.8 * m.delta_v_budget_ms)
}

fn cool_head(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    Ok(ctx.metrics.completed && ctx.metrics.critical_alerts == 0)
}

fn ahead_of_schedule(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    let m = ctx.metrics;
    if !m.completed {
        return Ok(false);
    }
    if m.estimated_duration_s <= 0.0 {
        return Err(format!(
            "estimated duration must be positive, got {}",
            m.estimated_duration_s
        ));
    }
    Ok(m.elapsed_s < 0.8 * m.estimated_duration_s)
}

fn flawless(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    Ok(ctx.weighted >= FLAWLESS_THRESHOLD)
}

fn hohmann_master(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    let m = ctx.metrics;
    if !m.eccentricity.is_finite() {
        return Err("eccentricity is not finite".to_string());
    }
    Ok(m.burns.len() == 2 && m.eccentricity < CIRCULAR_ECCENTRICITY)
}

fn self_reliant(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    Ok(ctx.metrics.completed && ctx.metrics.hints_used == 0)
}

fn troubleshooter(ctx: &AchievementContext<'_>) -> Result<bool, String> {
    Ok(ctx.metrics.anomalies_resolved >= 3)
}

/// Run every predicate, returning earned ids in catalog order.
pub fn evaluate_achievements(ctx: &AchievementContext<'_>) -> Vec<String> {
    evaluate_with(&ACHIEVEMENTS, ctx)
}

fn evaluate_with(catalog: &[AchievementDefinition], ctx: &AchievementContext<'_>) -> Vec<String> {
    let mut earned = Vec::new();
    for def in catalog {
        match (def.predicate)(ctx) {
            Ok(true) => earned.push(def.id.to_string()),
            Ok(false) => {}
            Err(reason) => {
                let err = SimError::AchievementCheck { id: def.id, reason };
                warn!(error = %err, "skipping achievement");
            }
        }
    }
    earned
}

pub fn achievement(id: &str) -> Option<&'static AchievementDefinition> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BurnRecord;

    fn ctx(metrics: &SessionMetrics) -> AchievementContext<'_> {
        AchievementContext {
            metrics,
            coverage: 100.0,
            efficiency: 100.0,
            safety: 100.0,
            timing: 100.0,
            weighted: 100.0,
        }
    }

    fn burn(accuracy: f64) -> BurnRecord {
        BurnRecord {
            delta_v_ms: 20.0,
            planned_delta_v_ms: Some(20.0),
            accuracy: Some(accuracy),
            sim_time_s: 60.0,
        }
    }

    #[test]
    fn test_failing_predicate_does_not_abort_batch() {
        let metrics = SessionMetrics {
            completed: true,
            estimated_duration_s: 0.0,
            ..Default::default()
        };
        let earned = evaluate_achievements(&ctx(&metrics));

        assert!(!earned.contains(&"ahead_of_schedule".to_string()));
        assert!(earned.contains(&"cool_head".to_string()));
        assert!(earned.contains(&"self_reliant".to_string()));
        assert!(earned.contains(&"flawless".to_string()));
    }

    #[test]
    fn test_custom_catalog_with_broken_entry() {
        fn broken(_: &AchievementContext<'_>) -> Result<bool, String> {
            Err("boom".into())
        }
        fn always(_: &AchievementContext<'_>) -> Result<bool, String> {
            Ok(true)
        }
        let catalog = [
            AchievementDefinition {
                id: "broken",
                name: "Broken",
                description: "",
                predicate: broken,
            },
            AchievementDefinition {
                id: "always",
                name: "Always",
                description: "",
                predicate: always,
            },
        ];
        let metrics = SessionMetrics::default();
        assert_eq!(evaluate_with(&catalog, &ctx(&metrics)), vec!["always".to_string()]);
    }

    #[test]
    fn test_two_burn_circular_transfer() {
        let metrics = SessionMetrics {
            burns: vec![burn(1.0), burn(0.95)],
            eccentricity: 0.0,
            ..Default::default()
        };
        let earned = evaluate_achievements(&ctx(&metrics));
        assert!(earned.contains(&"hohmann_master".to_string()));
        assert!(earned.contains(&"precision_burn".to_string()));

        let metrics = SessionMetrics {
            burns: vec![burn(0.95)],
            eccentricity: 0.0,
            ..Default::default()
        };
        let earned = evaluate_achievements(&ctx(&metrics));
        assert!(!earned.contains(&"hohmann_master".to_string()));
        assert!(!earned.contains(&"precision_burn".to_string()));
    }

    #[test]
    fn test_flawless_tolerates_rounding() {
        let metrics = SessionMetrics::default();
        let mut c = ctx(&metrics);
        c.weighted = 99.6;
        assert!(flawless(&c).unwrap());
        c.weighted = 99.4;
        assert!(!flawless(&c).unwrap());
    }

    #[test]
    fn test_fuel_miser_requires_completion() {
        let mut metrics = SessionMetrics {
            delta_v_used_ms: 40.0,
            delta_v_budget_ms: 100.0,
            ..Default::default()
        };
        assert!(!fuel_miser(&ctx(&metrics)).unwrap());
        metrics.completed = true;
        assert!(fuel_miser(&ctx(&metrics)).unwrap());
        metrics.delta_v_used_ms = 80.0;
        assert!(!fuel_miser(&ctx(&metrics)).unwrap());
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        for (i, a) in ACHIEVEMENTS.iter().enumerate() {
            assert!(ACHIEVEMENTS[i + 1..].iter().all(|b| b.id != a.id));
            assert!(achievement(a.id).is_some());
        }
    }
}
