//! Scoring Engine
//!
//! Stateless, deterministic scoring over `SessionMetrics`:
//!
//! ```text
//!   coverage   = steps_completed / total_steps            × 100
//!   efficiency = max(0, 1 − Δv_used / Δv_budget)           × 100
//!   safety     = e^(−0.2 · violations)                     × 100
//!   timing     = max(0, 1 − mean(|error|) / mean(window))  × 100   (100 if no samples)
//!
//!   total      = round( Σ dimension/100 · weight × 100 )
//! ```
//!
//! Live and final scores go through the same `calculate_score`, so the
//! projected score never jumps at completion.

pub mod achievements;

pub use achievements::{evaluate_achievements, AchievementContext, AchievementDefinition, ACHIEVEMENTS};

use crate::core::{Session, SessionMetrics};
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tolerance on the weight sum.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Safety decay per violation.
pub const SAFETY_DECAY: f64 = 0.2;

// ============================================================================
// Weights
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub coverage: f64,
    pub efficiency: f64,
    pub safety: f64,
    pub timing: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            coverage: 0.4,
            efficiency: 0.3,
            safety: 0.2,
            timing: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn new(coverage: f64, efficiency: f64, safety: f64, timing: f64) -> SimResult<Self> {
        let weights = Self {
            coverage,
            efficiency,
            safety,
            timing,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn sum(&self) -> f64 {
        self.coverage + self.efficiency + self.safety + self.timing
    }

    /// Weights must be non-negative and sum to 1.0.
    pub fn validate(&self) -> SimResult<()> {
        let parts = [self.coverage, self.efficiency, self.safety, self.timing];
        let sum = self.sum();
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) || (sum - 1.0).abs() > WEIGHT_TOLERANCE
        {
            return Err(SimError::InvalidWeights(sum));
        }
        Ok(())
    }
}

// ============================================================================
// Score
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub coverage: f64,
    pub efficiency: f64,
    pub safety: f64,
    pub timing: f64,
    /// Unrounded weighted total.
    pub weighted: f64,
    pub total: u32,
    pub achievements: Vec<String>,
    pub metrics: SessionMetrics,
}

fn clamp_pct(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

pub fn coverage_score(metrics: &SessionMetrics) -> f64 {
    if metrics.total_steps == 0 {
        return if metrics.completed { 100.0 } else { 0.0 };
    }
    clamp_pct(metrics.steps_completed as f64 / metrics.total_steps as f64 * 100.0)
}

pub fn efficiency_score(metrics: &SessionMetrics) -> f64 {
    let used = metrics.delta_v_used_ms;
    let budget = metrics.delta_v_budget_ms;
    if budget <= 0.0 {
        return if used <= 0.0 { 100.0 } else { 0.0 };
    }
    clamp_pct((1.0 - used / budget).max(0.0) * 100.0)
}

pub fn safety_score(metrics: &SessionMetrics) -> f64 {
    clamp_pct((-(metrics.alerts_triggered as f64) * SAFETY_DECAY).exp() * 100.0)
}

pub fn timing_score(metrics: &SessionMetrics) -> f64 {
    let samples = &metrics.timing_samples;
    if samples.is_empty() {
        return 100.0;
    }
    let n = samples.len() as f64;
    let avg_error = samples.iter().map(|s| s.error_s()).sum::<f64>() / n;
    let avg_window = samples.iter().map(|s| s.window_s).sum::<f64>() / n;
    if avg_window <= 0.0 {
        return if avg_error == 0.0 { 100.0 } else { 0.0 };
    }
    clamp_pct((1.0 - avg_error / avg_window).max(0.0) * 100.0)
}

/// Score a set of metrics. Deterministic for identical inputs.
pub fn calculate_score(metrics: &SessionMetrics, weights: &ScoringWeights) -> Score {
    let coverage = coverage_score(metrics);
    let efficiency = efficiency_score(metrics);
    let safety = safety_score(metrics);
    let timing = timing_score(metrics);

    let weighted = clamp_pct(
        (coverage / 100.0 * weights.coverage
            + efficiency / 100.0 * weights.efficiency
            + safety / 100.0 * weights.safety
            + timing / 100.0 * weights.timing)
            * 100.0,
    );

    let ctx = AchievementContext {
        metrics,
        coverage,
        efficiency,
        safety,
        timing,
        weighted,
    };

    Score {
        coverage,
        efficiency,
        safety,
        timing,
        weighted,
        total: weighted.round() as u32,
        achievements: evaluate_achievements(&ctx),
        metrics: metrics.clone(),
    }
}

/// Live projection of a session's score.
pub fn calculate_partial_score(session: &Session, weights: &ScoringWeights) -> Score {
    calculate_score(&session.metrics, weights)
}

/// Leaderboard order: `Less` means `a` ranks above `b`.
///
/// Higher total wins, then more achievements, then higher efficiency.
pub fn compare_scores(a: &Score, b: &Score) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| b.achievements.len().cmp(&a.achievements.len()))
        .then_with(|| b.efficiency.total_cmp(&a.efficiency))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimingSample;

    fn metrics() -> SessionMetrics {
        SessionMetrics {
            total_steps: 5,
            delta_v_budget_ms: 300.0,
            estimated_duration_s: 600.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_efficiency_example() {
        let m = SessionMetrics {
            delta_v_used_ms: 150.0,
            ..metrics()
        };
        assert!((efficiency_score(&m) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_safety_decay() {
        let mut m = metrics();
        assert_eq!(safety_score(&m), 100.0);

        m.alerts_triggered = 5;
        let safety = safety_score(&m);
        assert!((safety - 36.787944).abs() < 1e-4);
        assert_eq!(safety.round(), 37.0);
    }

    #[test]
    fn test_mid_session_weighted_total() {
        let m = SessionMetrics {
            steps_completed: 3,
            delta_v_used_ms: 60.0,
            alerts_triggered: 1,
            ..metrics()
        };
        let score = calculate_score(&m, &ScoringWeights::default());

        assert!((score.coverage - 60.0).abs() < 1e-9);
        assert!((score.efficiency - 80.0).abs() < 1e-9);
        assert!((score.safety - 81.873).abs() < 1e-3);
        assert_eq!(score.timing, 100.0);
        // 0.24 + 0.24 + 0.16375 + 0.10
        assert!((score.weighted - 74.375).abs() < 1e-2);
        assert_eq!(score.total, 74);
    }

    #[test]
    fn test_timing_uses_mean_error_over_mean_window() {
        let mut m = metrics();
        m.timing_samples = vec![
            TimingSample {
                actual_s: 70.0,
                optimal_s: 60.0,
                window_s: 40.0,
            },
            TimingSample {
                actual_s: 170.0,
                optimal_s: 180.0,
                window_s: 40.0,
            },
        ];
        assert!((timing_score(&m) - 75.0).abs() < 1e-9);

        m.timing_samples[0].actual_s = 500.0;
        assert_eq!(timing_score(&m), 0.0);
    }

    #[test]
    fn test_degenerate_budget_and_window() {
        let mut m = SessionMetrics::default();
        assert_eq!(efficiency_score(&m), 100.0);
        m.delta_v_used_ms = 1.0;
        assert_eq!(efficiency_score(&m), 0.0);

        m.timing_samples = vec![TimingSample {
            actual_s: 5.0,
            optimal_s: 5.0,
            window_s: 0.0,
        }];
        assert_eq!(timing_score(&m), 100.0);
        m.timing_samples[0].actual_s = 6.0;
        assert_eq!(timing_score(&m), 0.0);
    }

    #[test]
    fn test_dimensions_stay_in_range() {
        let m = SessionMetrics {
            steps_completed: 9,
            total_steps: 5,
            delta_v_used_ms: 900.0,
            delta_v_budget_ms: 300.0,
            alerts_triggered: 1_000,
            ..Default::default()
        };
        let score = calculate_score(&m, &ScoringWeights::default());
        for dim in [score.coverage, score.efficiency, score.safety, score.timing] {
            assert!((0.0..=100.0).contains(&dim));
        }
        assert!(score.total <= 100);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(ScoringWeights::new(0.25, 0.25, 0.25, 0.25).is_ok());
        assert!(matches!(
            ScoringWeights::new(0.5, 0.5, 0.5, 0.0),
            Err(SimError::InvalidWeights(_))
        ));
        assert!(ScoringWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn test_compare_scores_ordering() {
        let base = calculate_score(&metrics(), &ScoringWeights::default());
        assert_eq!(compare_scores(&base, &base), Ordering::Equal);

        let mut better = base.clone();
        better.total += 1;
        assert_eq!(compare_scores(&better, &base), Ordering::Less);
        assert_eq!(compare_scores(&base, &better), Ordering::Greater);

        let mut decorated = base.clone();
        decorated.achievements.push("troubleshooter".into());
        assert_eq!(compare_scores(&decorated, &base), Ordering::Less);

        let mut thriftier = base.clone();
        thriftier.efficiency += 1.0;
        assert_eq!(compare_scores(&thriftier, &base), Ordering::Less);

        let mut board = vec![base.clone(), better.clone(), decorated.clone()];
        board.sort_by(compare_scores);
        assert_eq!(board[0].total, better.total);
    }

    #[test]
    fn test_partial_matches_final_formula() {
        let seed = crate::core::SessionSeed::new(
            "s-1".into(),
            "u-1".into(),
            crate::core::Difficulty::Beginner,
            crate::scenarios::create_scenario("leo-orbit-raise").unwrap(),
        );
        let engine =
            crate::engine::SimulationEngine::new(seed, &crate::config::SimConfig::default())
                .unwrap();
        let mut session = engine.session().clone();
        session.metrics.steps_completed = 2;
        let weights = ScoringWeights::default();

        let partial = calculate_partial_score(&session, &weights);
        let full = calculate_score(&session.metrics, &weights);
        assert_eq!(partial, full);
    }
}
