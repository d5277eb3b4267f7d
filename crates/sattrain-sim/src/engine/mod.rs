//! Simulation Engine
//!
//! Owns and evolves one session's spacecraft state. The engine is the only
//! mutator of that state; everything else (the injector, the session actor)
//! goes through it.
//!
//! ```text
//!              ┌──────────── apply_command ────────────┐
//!              │ parse → resolve anomalies → execute    │
//!   operator ──┤ → step progress → history → score Δ    ├──► CommandOutcome
//!              └────────────────────────────────────────┘
//!   clock ────► tick → integrate → limit alerts → failure checks
//!   injector ─► apply/remove_anomaly_effects (AnomalyTarget)
//! ```
//!
//! - **command**: command registry and payload parsing
//! - **physics**: continuous-state integration and burn mechanics
//! - **state**: subsystem records and limits

pub mod command;
pub mod physics;
pub mod state;

use crate::anomaly::{AnomalyDefinition, AnomalyInjector, AnomalyState, AnomalyTarget, ResolutionCause, Severity};
use crate::config::SimConfig;
use crate::core::*;
use crate::error::{SimError, SimResult};
use crate::events::{AchievementUnlocked, LimitAlert, SessionEvent};
use crate::metrics;
use crate::scenarios::ScenarioDefinition;
use crate::scoring::{achievements, calculate_partial_score, Score, ScoringWeights};
use chrono::Utc;
use command::{Command, CommandKind};
use serde::Serialize;
use serde_json::Value;
use state::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Percentage points above `BATTERY_LOW_PCT` before the low-battery alert re-arms.
const BATTERY_HYSTERESIS_PCT: f64 = 5.0;
const THERMAL_HYSTERESIS_C: f64 = 2.0;
const SIGNAL_HYSTERESIS_DB: f64 = 1.0;

/// What the operator gets back from `apply_command`, plus the side effects
/// the session actor needs to act on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub result: CommandResult,
    pub status: SessionStatus,
    pub resolved: Vec<AnomalyState>,
    pub completed_step: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sim_time_ms: u64,
    /// Subsystems clamped to their bounds during this tick.
    pub clamped: Vec<Subsystem>,
    pub status: SessionStatus,
}

/// Edge-triggered limit monitoring.
#[derive(Debug, Clone, Default)]
struct LimitTracker {
    battery_low: bool,
    thermal_out_of_range: bool,
    signal_lost: bool,
    battery_empty_s: f64,
    thermal_limit_s: f64,
}

pub struct SimulationEngine {
    session: Session,
    scenario: ScenarioDefinition,
    weights: ScoringWeights,
    earned: BTreeSet<String>,
    limits: LimitTracker,
    battery_grace_s: f64,
    thermal_grace_s: f64,
}

impl SimulationEngine {
    pub fn new(seed: SessionSeed, config: &SimConfig) -> SimResult<Self> {
        let weights = seed.scenario.weights();
        weights.validate()?;

        let scenario = seed.scenario;
        let state = scenario.initial_state.clone();
        let metrics = SessionMetrics {
            total_steps: scenario.steps.len() as u32,
            delta_v_budget_ms: scenario.delta_v_budget_ms,
            estimated_duration_s: scenario.estimated_duration_s,
            eccentricity: state.orbit.eccentricity(),
            ..Default::default()
        };

        let session = Session {
            id: seed.session_id,
            user_id: seed.user_id,
            scenario_id: scenario.id.clone(),
            difficulty: seed.difficulty,
            status: SessionStatus::NotStarted,
            state,
            progress: StepProgress {
                current_step: 0,
                completed_steps: Vec::new(),
                step_order: scenario.step_order(),
            },
            metrics,
            history: Vec::new(),
            version: 0,
            sim_time_ms: 0,
            started_at: None,
            ended_at: None,
            failure_reason: None,
        };

        Ok(Self {
            session,
            scenario,
            weights,
            earned: BTreeSet::new(),
            limits: LimitTracker::default(),
            battery_grace_s: config.battery_failure_grace_s,
            thermal_grace_s: config.thermal_failure_grace_s,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scenario(&self) -> &ScenarioDefinition {
        &self.scenario
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn require(&self, required: SessionStatus) -> SimResult<()> {
        if self.session.status != required {
            return Err(SimError::InvalidSessionState {
                session_id: self.session.id.clone(),
                status: self.session.status,
                required,
            });
        }
        Ok(())
    }

    fn set_status(&mut self, status: SessionStatus) {
        debug!(
            session_id = %self.session.id,
            from = ?self.session.status,
            to = ?status,
            "session status changed"
        );
        self.session.status = status;
        self.session.version += 1;
    }

    pub fn start(&mut self) -> SimResult<()> {
        self.require(SessionStatus::NotStarted)?;
        self.session.started_at = Some(Utc::now());
        self.set_status(SessionStatus::InProgress);
        Ok(())
    }

    pub fn pause(&mut self) -> SimResult<()> {
        self.require(SessionStatus::InProgress)?;
        self.set_status(SessionStatus::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> SimResult<()> {
        self.require(SessionStatus::Paused)?;
        self.set_status(SessionStatus::InProgress);
        Ok(())
    }

    /// Operator gave up or the session was deleted.
    pub fn abandon(&mut self) -> SimResult<()> {
        if self.session.status.is_terminal() {
            return Err(SimError::InvalidSessionState {
                session_id: self.session.id.clone(),
                status: self.session.status,
                required: SessionStatus::InProgress,
            });
        }
        self.finish(SessionStatus::Abandoned, None);
        Ok(())
    }

    fn finish(&mut self, status: SessionStatus, reason: Option<String>) {
        self.session.ended_at = Some(Utc::now());
        self.session.metrics.completed = status == SessionStatus::Completed;
        self.session.failure_reason = reason;
        self.set_status(status);
        info!(
            session_id = %self.session.id,
            status = ?status,
            reason = self.session.failure_reason.as_deref().unwrap_or(""),
            "session finished"
        );
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Apply one operator command.
    ///
    /// Malformed or illegal commands come back as an `ERROR` result with the
    /// spacecraft state untouched. Only a session that is not in progress
    /// fails the call.
    pub fn apply_command(
        &mut self,
        injector: &mut AnomalyInjector,
        name: &str,
        payload: &Value,
        events: &mut Vec<SessionEvent>,
    ) -> SimResult<CommandOutcome> {
        self.require(SessionStatus::InProgress)?;
        let before = self.score().total;

        let parsed = name
            .parse::<CommandKind>()
            .and_then(|kind| Command::parse(kind, payload));
        let command = match parsed {
            Ok(command) => command,
            Err(err) => {
                let result = CommandResult::new(CommandStatus::Error, err.to_string());
                return Ok(self.record(name, payload, result, Vec::new(), None, before, events));
            }
        };
        let kind = command.kind();

        // Corrective action reverses the fault before the command itself runs.
        let resolved = injector.resolve_matching(kind, self, events);

        let mut result = match self.execute(&command) {
            Ok(result) => result,
            Err(SimError::CommandValidation(msg)) => CommandResult::new(CommandStatus::Error, msg),
            Err(other) => return Err(other),
        };

        if !resolved.is_empty() && result.status == CommandStatus::NoEffect {
            result.status = CommandStatus::Ok;
        }
        if !resolved.is_empty() {
            let names: Vec<&str> = resolved.iter().map(|a| a.definition().name).collect();
            result.message = format!("{} (resolved: {})", result.message, names.join(", "));
        }

        let completed_step = if result.status == CommandStatus::Ok {
            self.advance_step(kind)
        } else {
            None
        };

        Ok(self.record(
            kind.as_str(),
            payload,
            result,
            resolved,
            completed_step,
            before,
            events,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        name: &str,
        payload: &Value,
        mut result: CommandResult,
        resolved: Vec<AnomalyState>,
        completed_step: Option<String>,
        score_before: u32,
        events: &mut Vec<SessionEvent>,
    ) -> CommandOutcome {
        if result.status == CommandStatus::Error {
            self.session.metrics.errors += 1;
        }

        self.session.history.push(CommandRecord {
            sequence: self.session.history.len() as u64 + 1,
            command: name.to_string(),
            payload: payload.clone(),
            status: result.status,
            message: result.message.clone(),
            issued_at: Utc::now(),
            sim_time_ms: self.session.sim_time_ms,
            resolved: resolved.iter().map(|a| a.kind.as_str().to_string()).collect(),
        });
        self.session.version += 1;
        metrics::COMMANDS_TOTAL
            .with_label_values(&[result.status.as_str()])
            .inc();

        let score = self.score();
        result.score_delta = Some(score.total as i32 - score_before as i32);
        self.unlock_achievements(&score, events);

        debug!(
            session_id = %self.session.id,
            command = name,
            status = result.status.as_str(),
            score_delta = result.score_delta,
            "command applied"
        );

        CommandOutcome {
            result,
            status: self.session.status,
            resolved,
            completed_step,
        }
    }

    fn advance_step(&mut self, kind: CommandKind) -> Option<String> {
        let step = self.scenario.step(self.session.progress.current_step)?;
        if step.expected_command != kind {
            return None;
        }
        let step_id = step.id.clone();
        let sample = TimingSample {
            actual_s: self.session.sim_time_ms as f64 / 1_000.0,
            optimal_s: step.optimal_time_s,
            window_s: step.window_s,
        };

        let metrics = &mut self.session.metrics;
        metrics.timing_samples.push(sample);
        metrics.steps_completed += 1;
        self.session.progress.completed_steps.push(step_id.clone());
        self.session.progress.current_step += 1;

        if self.session.progress.is_finished() {
            self.finish(SessionStatus::Completed, None);
        }
        Some(step_id)
    }

    fn execute(&mut self, command: &Command) -> SimResult<CommandResult> {
        use CommandStatus::{NoEffect, Ok as Done};

        let ok = |msg: &str| Ok(CommandResult::new(Done, msg));
        let no_effect = |msg: &str| Ok(CommandResult::new(NoEffect, msg));

        let state = &mut self.session.state;
        match command {
            Command::ArmPropulsion => {
                if state.propulsion.armed {
                    return no_effect("propulsion already armed");
                }
                state.propulsion.armed = true;
                ok("propulsion armed")
            }
            Command::DisarmPropulsion => {
                if !state.propulsion.armed {
                    return no_effect("propulsion already disarmed");
                }
                state.propulsion.armed = false;
                ok("propulsion disarmed")
            }
            Command::ExecuteBurn {
                delta_v_ms,
                direction,
            } => self.execute_burn(*delta_v_ms, *direction),
            Command::SetAttitudeMode { mode } => {
                if state.attitude.mode == *mode {
                    return no_effect("attitude mode unchanged");
                }
                state.attitude.mode = *mode;
                Ok(CommandResult::new(Done, format!("attitude mode set to {:?}", mode)))
            }
            Command::EnterSafeMode => {
                if state.attitude.mode == AttitudeMode::Safe {
                    return no_effect("already in safe mode");
                }
                state.attitude.mode = AttitudeMode::Safe;
                state.propulsion.armed = false;
                ok("safe mode entered; propulsion disarmed")
            }
            Command::ResetReactionWheels => {
                state.attitude.wheel_speed_rpm = 0.0;
                ok("reaction wheel momentum dumped")
            }
            Command::DeploySolarArrays => {
                if state.power.arrays_deployed {
                    return no_effect("solar arrays already deployed");
                }
                state.power.arrays_deployed = true;
                ok("solar arrays deployed")
            }
            Command::SwitchPowerBus { bus } => {
                let target = bus.unwrap_or(match state.power.bus {
                    PowerBus::Primary => PowerBus::Backup,
                    PowerBus::Backup => PowerBus::Primary,
                });
                if target == state.power.bus {
                    return no_effect("already on requested bus");
                }
                state.power.bus = target;
                Ok(CommandResult::new(Done, format!("switched to {:?} bus", target)))
            }
            Command::ShedLoad => {
                if state.power.load_shed {
                    return no_effect("non-essential loads already shed");
                }
                state.power.load_shed = true;
                ok("non-essential loads shed")
            }
            Command::CycleHeaters => {
                state.thermal.heaters_on = !state.thermal.heaters_on;
                ok(if state.thermal.heaters_on {
                    "heaters on"
                } else {
                    "heaters off"
                })
            }
            Command::DeployRadiator => {
                if state.thermal.radiator_deployed {
                    return no_effect("radiator already deployed");
                }
                state.thermal.radiator_deployed = true;
                ok("auxiliary radiator deployed")
            }
            Command::ResetTransponder => ok("transponder reset"),
            Command::SwitchAntenna => {
                state.comms.antenna = match state.comms.antenna {
                    Antenna::HighGain => Antenna::LowGain,
                    Antenna::LowGain => Antenna::HighGain,
                };
                Ok(CommandResult::new(
                    Done,
                    format!("switched to {:?} antenna", state.comms.antenna),
                ))
            }
            Command::IsolateThruster => {
                if state.propulsion.thruster_isolated {
                    return no_effect("thruster branch A already isolated");
                }
                // Redundant branch B has lower performance.
                state.propulsion.thruster_isolated = true;
                state.propulsion.isp_s *= 0.95;
                ok("thruster branch A isolated; firing on branch B")
            }
            Command::PayloadOn => {
                if state.payload.powered {
                    return no_effect("payload already powered");
                }
                if state.attitude.mode == AttitudeMode::Safe {
                    return Err(SimError::invalid_command(
                        "payload cannot be powered in SAFE mode",
                    ));
                }
                state.payload.powered = true;
                ok("payload powered on")
            }
            Command::PayloadOff => {
                if !state.payload.powered {
                    return no_effect("payload already off");
                }
                state.payload.powered = false;
                ok("payload powered off")
            }
            Command::RebootPayload => {
                if !state.payload.powered {
                    return no_effect("payload is off");
                }
                ok("payload rebooted")
            }
            Command::RequestHint => {
                self.session.metrics.hints_used += 1;
                let hint = self
                    .scenario
                    .step(self.session.progress.current_step)
                    .map(|s| s.hint.clone())
                    .unwrap_or_else(|| "All steps complete".to_string());
                Ok(CommandResult::new(Done, hint))
            }
        }
    }

    fn execute_burn(
        &mut self,
        delta_v_ms: f64,
        direction: command::BurnDirection,
    ) -> SimResult<CommandResult> {
        let state = &mut self.session.state;
        if !state.propulsion.armed {
            return Err(SimError::invalid_command("propulsion is not armed"));
        }
        if state.attitude.mode == AttitudeMode::Safe {
            return Err(SimError::invalid_command("cannot burn in SAFE attitude mode"));
        }
        let needed_kg = physics::propellant_for_burn(&state.propulsion, delta_v_ms);
        if needed_kg > state.propulsion.propellant_kg {
            return Err(SimError::invalid_command(format!(
                "insufficient propellant: need {:.2} kg, have {:.2} kg",
                needed_kg, state.propulsion.propellant_kg
            )));
        }

        state.propulsion.propellant_kg -= needed_kg;
        physics::apply_burn(&mut state.orbit, direction, delta_v_ms);
        let orbit = state.orbit.clone();

        let planned = self
            .scenario
            .step(self.session.progress.current_step)
            .filter(|s| s.expected_command == CommandKind::ExecuteBurn)
            .and_then(|s| s.planned_delta_v_ms)
            .filter(|p| *p > 0.0);
        let accuracy = planned.map(|p| (1.0 - (delta_v_ms - p).abs() / p).max(0.0));

        let metrics = &mut self.session.metrics;
        metrics.delta_v_used_ms += delta_v_ms;
        metrics.eccentricity = orbit.eccentricity();
        metrics.burns.push(BurnRecord {
            delta_v_ms,
            planned_delta_v_ms: planned,
            accuracy,
            sim_time_s: self.session.sim_time_ms as f64 / 1_000.0,
        });

        Ok(CommandResult::new(
            CommandStatus::Ok,
            format!(
                "{:.1} m/s {:?} burn complete; orbit {:.0} x {:.0} km",
                delta_v_ms, direction, orbit.periapsis_km, orbit.apoapsis_km
            ),
        ))
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Advance continuous state by `elapsed_ms`.
    ///
    /// Out-of-range values are clamped and reported, never raised. Sustained
    /// empty battery or a hard thermal limit fails the session.
    pub fn tick(&mut self, elapsed_ms: u64, events: &mut Vec<SessionEvent>) -> SimResult<TickReport> {
        self.require(SessionStatus::InProgress)?;

        let dt_s = elapsed_ms as f64 / 1_000.0;
        let clamped = physics::integrate(&mut self.session.state, dt_s);
        self.session.sim_time_ms += elapsed_ms;

        let metrics = &mut self.session.metrics;
        metrics.elapsed_s = self.session.sim_time_ms as f64 / 1_000.0;
        metrics.eccentricity = self.session.state.orbit.eccentricity();

        self.check_limits(events);
        self.check_failures(dt_s);
        self.session.version += 1;

        let score = self.score();
        self.unlock_achievements(&score, events);

        if !clamped.is_empty() {
            debug!(session_id = %self.session.id, ?clamped, "state clamped");
        }

        Ok(TickReport {
            sim_time_ms: self.session.sim_time_ms,
            clamped,
            status: self.session.status,
        })
    }

    fn limit_alert(&mut self, alert_type: &str, subsystem: Subsystem, message: String) -> SessionEvent {
        self.session.metrics.alerts_triggered += 1;
        warn!(session_id = %self.session.id, alert_type, %message, "limit alert");
        SessionEvent::LimitAlert(LimitAlert {
            alert_type: alert_type.to_string(),
            subsystem,
            message,
        })
    }

    fn check_limits(&mut self, events: &mut Vec<SessionEvent>) {
        let battery = self.session.state.power.battery_pct;
        if !self.limits.battery_low && battery < BATTERY_LOW_PCT {
            self.limits.battery_low = true;
            let event = self.limit_alert(
                "battery_low",
                Subsystem::Power,
                format!("battery at {:.1}%", battery),
            );
            events.push(event);
        } else if self.limits.battery_low && battery >= BATTERY_LOW_PCT + BATTERY_HYSTERESIS_PCT {
            self.limits.battery_low = false;
        }

        let temp = self.session.state.thermal.temperature_c;
        let outside = !(TEMP_OPERATING_MIN_C..=TEMP_OPERATING_MAX_C).contains(&temp);
        let inside_margin = (TEMP_OPERATING_MIN_C + THERMAL_HYSTERESIS_C
            ..=TEMP_OPERATING_MAX_C - THERMAL_HYSTERESIS_C)
            .contains(&temp);
        if !self.limits.thermal_out_of_range && outside {
            self.limits.thermal_out_of_range = true;
            let event = self.limit_alert(
                "temperature_out_of_range",
                Subsystem::Thermal,
                format!("bus temperature {:.1} °C", temp),
            );
            events.push(event);
        } else if self.limits.thermal_out_of_range && inside_margin {
            self.limits.thermal_out_of_range = false;
        }

        let margin = self.session.state.comms.signal_margin_db;
        if !self.limits.signal_lost && margin < 0.0 {
            self.limits.signal_lost = true;
            let event = self.limit_alert(
                "signal_lost",
                Subsystem::Communications,
                format!("link margin {:.1} dB", margin),
            );
            events.push(event);
        } else if self.limits.signal_lost && margin >= SIGNAL_HYSTERESIS_DB {
            self.limits.signal_lost = false;
        }
    }

    fn check_failures(&mut self, dt_s: f64) {
        let state = &self.session.state;

        if state.power.battery_pct <= BATTERY_MIN_PCT {
            self.limits.battery_empty_s += dt_s;
        } else {
            self.limits.battery_empty_s = 0.0;
        }

        let temp = state.thermal.temperature_c;
        if temp <= TEMP_MIN_C || temp >= TEMP_MAX_C {
            self.limits.thermal_limit_s += dt_s;
        } else {
            self.limits.thermal_limit_s = 0.0;
        }

        if self.limits.battery_empty_s >= self.battery_grace_s {
            self.finish(SessionStatus::Failed, Some("battery depleted".to_string()));
        } else if self.limits.thermal_limit_s >= self.thermal_grace_s {
            self.finish(
                SessionStatus::Failed,
                Some(format!("temperature held at survival limit ({:.0} °C)", temp)),
            );
        }
    }

    // ========================================================================
    // Scoring & views
    // ========================================================================

    pub fn score(&self) -> Score {
        calculate_partial_score(&self.session, &self.weights)
    }

    fn unlock_achievements(&mut self, score: &Score, events: &mut Vec<SessionEvent>) {
        for id in &score.achievements {
            if !self.earned.insert(id.clone()) {
                continue;
            }
            if let Some(def) = achievements::achievement(id) {
                info!(session_id = %self.session.id, achievement = def.id, "achievement unlocked");
                events.push(SessionEvent::AchievementUnlocked(AchievementUnlocked {
                    id: def.id.to_string(),
                    name: def.name.to_string(),
                    description: def.description.to_string(),
                }));
            }
        }
    }

    pub fn earned_achievements(&self) -> impl Iterator<Item = &str> {
        self.earned.iter().map(String::as_str)
    }

    pub fn snapshot(&self, active_anomalies: &[AnomalyState]) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.id.clone(),
            user_id: self.session.user_id.clone(),
            scenario_id: self.session.scenario_id.clone(),
            status: self.session.status,
            version: self.session.version,
            sim_time_ms: self.session.sim_time_ms,
            state: self.session.state.clone(),
            progress: self.session.progress.clone(),
            score: self.score(),
            active_anomalies: active_anomalies.to_vec(),
            failure_reason: self.session.failure_reason.clone(),
            captured_at: Utc::now(),
        }
    }
}

// ============================================================================
// Anomaly effects
// ============================================================================

impl AnomalyTarget for SimulationEngine {
    fn status(&self) -> SessionStatus {
        self.session.status
    }

    fn apply_anomaly_effects(&mut self, definition: &AnomalyDefinition) {
        let e = &definition.effects;
        let s = &mut self.session.state;
        s.power.solar_multiplier += e.solar_multiplier;
        s.power.drain_multiplier += e.drain_multiplier;
        s.attitude.drift_rate_deg_s += e.attitude_drift_deg_s;
        s.thermal.drift_c_per_s += e.thermal_drift_c_s;
        s.propulsion.leak_kg_per_s += e.propellant_leak_kg_s;
        s.comms.margin_offset_db += e.signal_margin_db;
        s.payload.fault_count += e.payload_faults;
        self.session.version += 1;
    }

    fn remove_anomaly_effects(&mut self, definition: &AnomalyDefinition) {
        let e = &definition.effects;
        let s = &mut self.session.state;
        s.power.solar_multiplier -= e.solar_multiplier;
        s.power.drain_multiplier -= e.drain_multiplier;
        s.attitude.drift_rate_deg_s -= e.attitude_drift_deg_s;
        s.thermal.drift_c_per_s -= e.thermal_drift_c_s;
        s.propulsion.leak_kg_per_s -= e.propellant_leak_kg_s;
        s.comms.margin_offset_db -= e.signal_margin_db;
        s.payload.fault_count -= e.payload_faults;
        self.session.version += 1;
    }

    fn record_anomaly_outcome(&mut self, anomaly: &AnomalyState) {
        let metrics = &mut self.session.metrics;
        match anomaly.resolution.as_ref().map(|r| &r.cause) {
            Some(ResolutionCause::Command { .. }) => metrics.anomalies_resolved += 1,
            Some(ResolutionCause::Expired) => {
                metrics.anomalies_expired += 1;
                metrics.alerts_triggered += 1;
                if anomaly.severity == Severity::Critical {
                    metrics.critical_alerts += 1;
                }
            }
            Some(ResolutionCause::SessionEnded) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyKind, ManualTimers};
    use crate::scenarios::create_scenario;
    use serde_json::json;

    fn engine(scenario: &str, difficulty: Difficulty) -> SimulationEngine {
        let seed = SessionSeed::new(
            "s-1".to_string(),
            "u-1".to_string(),
            difficulty,
            create_scenario(scenario).unwrap(),
        );
        SimulationEngine::new(seed, &SimConfig::default()).unwrap()
    }

    fn started(scenario: &str, difficulty: Difficulty) -> (SimulationEngine, AnomalyInjector) {
        let mut engine = engine(scenario, difficulty);
        engine.start().unwrap();
        let mut injector =
            AnomalyInjector::new("s-1".to_string(), Some(1), Box::new(ManualTimers::default()));
        injector.start_injection(difficulty);
        (engine, injector)
    }

    fn send(
        engine: &mut SimulationEngine,
        injector: &mut AnomalyInjector,
        name: &str,
        payload: Value,
    ) -> CommandOutcome {
        let mut events = Vec::new();
        engine
            .apply_command(injector, name, &payload, &mut events)
            .unwrap()
    }

    fn advance(engine: &mut SimulationEngine, seconds: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for _ in 0..seconds {
            if engine.status() != SessionStatus::InProgress {
                break;
            }
            engine.tick(1_000, &mut events).unwrap();
        }
        events
    }

    #[test]
    fn test_commands_require_in_progress() {
        let mut engine = engine("leo-orbit-raise", Difficulty::Beginner);
        let mut injector =
            AnomalyInjector::new("s-1".to_string(), Some(1), Box::new(ManualTimers::default()));
        let mut events = Vec::new();

        let err = engine
            .apply_command(&mut injector, "ARM_PROPULSION", &Value::Null, &mut events)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidSessionState { .. }));

        engine.start().unwrap();
        engine.pause().unwrap();
        let err = engine
            .apply_command(&mut injector, "ARM_PROPULSION", &Value::Null, &mut events)
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidSessionState {
                status: SessionStatus::Paused,
                ..
            }
        ));
        assert!(engine.tick(1_000, &mut events).is_err());
    }

    #[test]
    fn test_invalid_commands_return_error_status() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Beginner);
        let state_before = engine.session().state.clone();

        let outcome = send(&mut engine, &mut injector, "SELF_DESTRUCT", Value::Null);
        assert_eq!(outcome.result.status, CommandStatus::Error);

        let outcome = send(&mut engine, &mut injector, "EXECUTE_BURN", json!({"deltaVMs": 20}));
        assert_eq!(outcome.result.status, CommandStatus::Error);
        assert!(outcome.result.message.contains("not armed"));

        assert_eq!(engine.session().state, state_before);
        assert_eq!(engine.session().metrics.errors, 2);
        assert_eq!(engine.session().history.len(), 2);
        assert_eq!(engine.session().history[0].command, "SELF_DESTRUCT");
    }

    #[test]
    fn test_repeated_command_has_no_effect() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Beginner);
        let first = send(&mut engine, &mut injector, "ARM_PROPULSION", Value::Null);
        let second = send(&mut engine, &mut injector, "ARM_PROPULSION", Value::Null);
        assert_eq!(first.result.status, CommandStatus::Ok);
        assert_eq!(first.completed_step.as_deref(), Some("arm-propulsion"));
        assert_eq!(second.result.status, CommandStatus::NoEffect);
        assert!(second.completed_step.is_none());
    }

    #[test]
    fn test_full_orbit_raise_completes_with_achievements() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Beginner);

        advance(&mut engine, 20);
        send(&mut engine, &mut injector, "ARM_PROPULSION", Value::Null);
        advance(&mut engine, 20);
        send(
            &mut engine,
            &mut injector,
            "SET_ATTITUDE_MODE",
            json!({"mode": "INERTIAL"}),
        );
        advance(&mut engine, 20);
        let burn = send(&mut engine, &mut injector, "EXECUTE_BURN", json!({"deltaVMs": 20.0}));
        assert_eq!(burn.result.status, CommandStatus::Ok);
        assert!(burn.result.score_delta.is_some());

        advance(&mut engine, 120);
        send(&mut engine, &mut injector, "EXECUTE_BURN", json!({"deltaVMs": 20.0}));
        advance(&mut engine, 30);
        let last = send(&mut engine, &mut injector, "DISARM_PROPULSION", Value::Null);

        assert_eq!(last.status, SessionStatus::Completed);
        let session = engine.session();
        assert!(session.metrics.completed);
        assert!(session.ended_at.is_some());
        assert_eq!(session.metrics.steps_completed, 5);
        assert_eq!(session.state.orbit.periapsis_km, 470.0);
        assert!((session.metrics.delta_v_used_ms - 40.0).abs() < 1e-9);

        let earned: Vec<&str> = engine.earned_achievements().collect();
        for id in ["precision_burn", "hohmann_master", "cool_head", "self_reliant"] {
            assert!(earned.contains(&id), "missing {id}: {earned:?}");
        }

        let score = engine.score();
        assert_eq!(score.coverage, 100.0);
        assert!(score.total >= 80);
    }

    #[test]
    fn test_corrective_resolves_before_command_effects() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Expert);
        let mut events = Vec::new();
        injector
            .inject(AnomalyKind::TransponderLockLoss, &mut engine, &mut events)
            .unwrap();
        assert_eq!(engine.session().state.comms.margin_offset_db, -8.0);

        let outcome = send(&mut engine, &mut injector, "RESET_TRANSPONDER", Value::Null);
        assert_eq!(outcome.result.status, CommandStatus::Ok);
        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(engine.session().state.comms.margin_offset_db, 0.0);
        assert_eq!(engine.session().metrics.anomalies_resolved, 1);
        assert_eq!(
            engine.session().history.last().unwrap().resolved,
            vec!["transponder_lock_loss".to_string()]
        );
    }

    #[test]
    fn test_resolution_upgrades_no_effect() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Expert);
        send(&mut engine, &mut injector, "SHED_LOAD", Value::Null);

        let mut events = Vec::new();
        injector
            .inject(AnomalyKind::SolarArrayDegradation, &mut engine, &mut events)
            .unwrap();
        let outcome = send(&mut engine, &mut injector, "SHED_LOAD", Value::Null);
        assert_eq!(outcome.result.status, CommandStatus::Ok);
        assert!((engine.session().state.power.solar_multiplier - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_expired_anomaly_counts_as_violation() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Expert);
        let mut events = Vec::new();
        let anomaly = injector
            .inject(AnomalyKind::ThermalRunaway, &mut engine, &mut events)
            .unwrap();
        injector.on_expiry(&anomaly.id, &mut engine, &mut events);

        let m = &engine.session().metrics;
        assert_eq!(m.anomalies_expired, 1);
        assert_eq!(m.alerts_triggered, 1);
        assert_eq!(m.critical_alerts, 1);
        assert_eq!(engine.session().state.thermal.drift_c_per_s, 0.0);
    }

    #[test]
    fn test_limit_alerts_are_edge_triggered() {
        let (mut engine, _) = started("leo-orbit-raise", Difficulty::Beginner);
        engine.session.state.power.battery_pct = 19.0;

        let events = advance(&mut engine, 5);
        let alerts = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::LimitAlert(a) if a.alert_type == "battery_low"))
            .count();
        assert_eq!(alerts, 1);
        assert_eq!(engine.session().metrics.alerts_triggered, 1);
    }

    #[test]
    fn test_sustained_empty_battery_fails_session() {
        let (mut engine, _) = started("leo-orbit-raise", Difficulty::Beginner);
        engine.session.state.power.battery_pct = 0.5;
        engine.session.state.power.solar_multiplier = 0.0;

        advance(&mut engine, 120);
        assert_eq!(engine.status(), SessionStatus::Failed);
        assert_eq!(
            engine.session().failure_reason.as_deref(),
            Some("battery depleted")
        );
        assert!(!engine.session().metrics.completed);
    }

    #[test]
    fn test_hint_counts_and_returns_step_hint() {
        let (mut engine, mut injector) = started("leo-orbit-raise", Difficulty::Beginner);
        let outcome = send(&mut engine, &mut injector, "REQUEST_HINT", Value::Null);
        assert_eq!(outcome.result.status, CommandStatus::Ok);
        assert!(outcome.result.message.contains("ARM_PROPULSION"));
        assert_eq!(engine.session().metrics.hints_used, 1);
        assert!(outcome.completed_step.is_none());
    }

    #[test]
    fn test_abandon_is_terminal() {
        let (mut engine, _) = started("payload-campaign", Difficulty::Beginner);
        engine.abandon().unwrap();
        assert_eq!(engine.status(), SessionStatus::Abandoned);
        assert!(engine.abandon().is_err());
        assert!(engine.resume().is_err());
    }

    #[test]
    fn test_version_is_monotonic() {
        let (mut engine, mut injector) = started("power-recovery", Difficulty::Beginner);
        let mut last = engine.session().version;
        send(&mut engine, &mut injector, "DEPLOY_SOLAR_ARRAYS", Value::Null);
        assert!(engine.session().version > last);
        last = engine.session().version;
        advance(&mut engine, 1);
        assert!(engine.session().version > last);
    }

    #[test]
    fn test_invalid_scenario_weights_are_rejected() {
        let mut scenario = create_scenario("leo-orbit-raise").unwrap();
        scenario.weights = Some(ScoringWeights {
            coverage: 0.9,
            efficiency: 0.9,
            safety: 0.0,
            timing: 0.0,
        });
        let seed = SessionSeed::new("s".into(), "u".into(), Difficulty::Beginner, scenario);
        assert!(matches!(
            SimulationEngine::new(seed, &SimConfig::default()),
            Err(SimError::InvalidWeights(_))
        ));
    }
}
