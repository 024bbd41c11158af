//! Post-tick invariant checks and the entropy-based completion rule.
//!
//! The monitor owns an [`Engine`]. After every tick it:
//!
//! 1. re-checks worker conservation and timer consistency (fatal on failure)
//! 2. credits one bit of information per failed verification
//! 3. declares success once every bug is `Done` and the gained bits cover the
//!    initial entropy of the search space
//! 4. fails the run when the tick budget is spent with bugs unfinished, or
//!    when every bug has settled without meeting the success condition

use tracing::{info, warn};

use super::engine::{Engine, TickReport, Verdicts, VerificationDue};
use crate::domain::errors::{InvariantViolation, SchedulerError, SchedulerResult};
use crate::domain::models::{
    BugStatus, EngineState, GlobalProgress, MonitorState, MonitorVerdict, Phase, SchedulerConfig,
};

/// Result of one monitored tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredTick {
    pub report: TickReport,
    pub verdict: MonitorVerdict,
    /// Bits credited during this tick.
    pub bits_gained: f64,
}

/// Engine wrapper enforcing system-wide invariants.
#[derive(Debug, Clone)]
pub struct Monitor {
    engine: Engine,
    state: MonitorState,
}

impl Monitor {
    pub fn new(engine: Engine, state: MonitorState) -> Self {
        Self { engine, state }
    }

    /// Monitor whose search space is the bug array itself (`log2(max_bugs)`).
    pub fn for_engine(engine: Engine) -> Self {
        let state = MonitorState::for_candidates(engine.config().max_bugs);
        Self::new(engine, state)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.done
    }

    pub fn verifications_due(&self) -> Vec<VerificationDue> {
        self.engine.verifications_due()
    }

    /// Read-only view of one bug.
    pub fn status(&self, bug_index: usize) -> Option<BugStatus> {
        self.engine.bug(bug_index).map(BugStatus::from)
    }

    pub fn global_progress(&self) -> GlobalProgress {
        GlobalProgress {
            ticks_used: self.engine.state().tick_no,
            bits_gained: self.state.gained_bits,
            bits_total: self.state.initial_entropy_bits,
        }
    }

    /// Escalate a bug whose context was abandoned; see [`Engine::escalate`].
    pub fn escalate(&mut self, bug_index: usize) -> Option<BugStatus> {
        self.engine.escalate(bug_index).map(BugStatus::from)
    }

    /// Tick the engine and run the post-tick checks.
    pub fn tick(&mut self, verdicts: &Verdicts) -> SchedulerResult<MonitoredTick> {
        let report = self.engine.tick(verdicts)?;
        let engine_state = self.engine.state();
        let config = self.engine.config();

        check_invariants(engine_state, config)?;

        let failures = report
            .changes
            .iter()
            .filter(|change| change.is_verification_failure())
            .count();
        #[allow(clippy::cast_precision_loss)]
        let bits_gained = failures as f64;
        self.state.gained_bits += bits_gained;

        let tick_no = report.tick_no;
        if engine_state.all_done() && self.state.bound_reached() {
            self.state.done = true;
            info!(
                tick_no,
                gained_bits = self.state.gained_bits,
                initial_bits = self.state.initial_entropy_bits,
                "all bugs resolved"
            );
            return Ok(MonitoredTick {
                report,
                verdict: MonitorVerdict::Success,
                bits_gained,
            });
        }

        if tick_no >= config.max_ticks && !engine_state.all_done() {
            warn!(tick_no, max_ticks = config.max_ticks, "tick budget exhausted");
            return Err(SchedulerError::TickBudgetExceeded {
                tick_no,
                max_ticks: config.max_ticks,
                unfinished: engine_state.unfinished(),
            });
        }

        if engine_state.all_terminal() {
            return Err(SchedulerError::Unresolved {
                tick_no,
                reason: self.unresolved_reason(engine_state),
            });
        }

        Ok(MonitoredTick {
            report,
            verdict: MonitorVerdict::Continue,
            bits_gained,
        })
    }

    fn unresolved_reason(&self, engine_state: &EngineState) -> String {
        let escalated: Vec<String> = engine_state
            .bugs
            .iter()
            .enumerate()
            .filter(|(_, bug)| bug.phase == Phase::Escalate)
            .map(|(index, _)| format!("#{index}"))
            .collect();
        if escalated.is_empty() {
            format!(
                "gained {:.2} of {:.2} entropy bits",
                self.state.gained_bits, self.state.initial_entropy_bits
            )
        } else {
            format!(
                "bugs [{}] escalated after exhausting verification retries",
                escalated.join(", ")
            )
        }
    }
}

/// Worker conservation and timer consistency for a whole engine state.
pub fn check_invariants(
    state: &EngineState,
    config: &SchedulerConfig,
) -> Result<(), InvariantViolation> {
    let active = state.active_count();
    #[allow(clippy::cast_possible_wrap)]
    let computed =
        i64::from(state.free_workers) + i64::from(config.workers_per_bug) * active as i64;
    let expected = i64::from(config.total_workers);
    if computed != expected {
        return Err(InvariantViolation::Capacity {
            tick_no: state.tick_no,
            free_workers: state.free_workers,
            workers_per_bug: config.workers_per_bug,
            active,
            computed,
            expected,
        });
    }

    if let Some((bug_index, bug)) = state
        .bugs
        .iter()
        .enumerate()
        .find(|(_, bug)| !bug.is_well_formed())
    {
        return Err(InvariantViolation::Timer {
            tick_no: state.tick_no,
            bug_index,
            phase: bug.phase,
            timer: bug.timer,
            attempts: bug.attempts,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BugState, Verdict};

    fn single_bug_monitor() -> Monitor {
        let engine = Engine::new(SchedulerConfig {
            max_bugs: 1,
            ..SchedulerConfig::default()
        });
        Monitor::for_engine(engine)
    }

    /// Tick until done, answering verdicts from `script` in order.
    fn drive(monitor: &mut Monitor, script: &[Verdict]) -> SchedulerResult<u32> {
        let mut script = script.iter().copied();
        loop {
            let verdicts: Verdicts = monitor
                .verifications_due()
                .into_iter()
                .map(|due| (due.bug_index, script.next().unwrap_or(Verdict::Pass)))
                .collect();
            let tick = monitor.tick(&verdicts)?;
            if tick.verdict == MonitorVerdict::Success {
                return Ok(tick.report.tick_no);
            }
        }
    }

    #[test]
    fn test_single_bug_pass_first_time() {
        let mut monitor = single_bug_monitor();
        let finished = drive(&mut monitor, &[Verdict::Pass]).unwrap();
        assert_eq!(finished, 9);
        assert!(monitor.is_done());
        assert_eq!(monitor.engine().state().free_workers, 9);
    }

    #[test]
    fn test_failure_credits_one_bit() {
        let mut monitor = single_bug_monitor();
        let finished = drive(&mut monitor, &[Verdict::Fail, Verdict::Pass]).unwrap();
        assert_eq!(finished, 15);
        let progress = monitor.global_progress();
        assert_eq!(progress.ticks_used, 15);
        assert!((progress.bits_gained - 1.0).abs() < f64::EPSILON);
        assert!(progress.bits_total.abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_bug_fail_then_pass_timeline() {
        let mut monitor = single_bug_monitor();
        let mut script = [Verdict::Fail, Verdict::Pass].into_iter();
        let mut trace = vec![(0, BugState::waiting(), 9)];
        loop {
            let verdicts: Verdicts = monitor
                .verifications_due()
                .into_iter()
                .map(|due| (due.bug_index, script.next().unwrap()))
                .collect();
            let tick = monitor.tick(&verdicts).unwrap();
            let state = monitor.engine().state();
            trace.push((tick.report.tick_no, state.bugs[0], state.free_workers));
            if tick.verdict == MonitorVerdict::Success {
                break;
            }
        }

        let at = |tick: usize| (trace[tick].1, trace[tick].2);
        assert_eq!(trace.len(), 16);
        assert_eq!(at(1), (BugState::new(Phase::Reproduce, 2, 0), 6));
        assert_eq!(at(2), (BugState::new(Phase::Reproduce, 1, 0), 6));
        assert_eq!(at(3), (BugState::new(Phase::Patch, 3, 0), 6));
        assert_eq!(at(6), (BugState::new(Phase::Verify, 3, 0), 6));
        assert_eq!(at(8), (BugState::new(Phase::Verify, 1, 0), 6));
        assert_eq!(at(9), (BugState::new(Phase::Patch, 3, 1), 6));
        assert_eq!(at(12), (BugState::new(Phase::Verify, 3, 1), 6));
        assert_eq!(at(15), (BugState::new(Phase::Done, 0, 1), 9));
        assert!(trace[1..15].iter().all(|(_, bug, free)| bug.is_active() && *free == 6));
        assert!(trace.iter().enumerate().all(|(i, (tick, _, _))| *tick as usize == i));
    }

    #[test]
    fn test_escalated_bug_is_unresolved() {
        let mut monitor = single_bug_monitor();
        let err = drive(&mut monitor, &[Verdict::Fail, Verdict::Fail]).unwrap_err();
        assert!(matches!(err, SchedulerError::Unresolved { tick_no: 15, .. }));
        assert!(err.to_string().contains("#0"));
        assert_eq!(monitor.status(0).unwrap().phase, Phase::Escalate);
        assert_eq!(monitor.engine().state().free_workers, 9);
    }

    #[test]
    fn test_entropy_shortfall_is_unresolved() {
        let engine = Engine::new(SchedulerConfig {
            max_bugs: 2,
            ..SchedulerConfig::default()
        });
        let mut monitor = Monitor::for_engine(engine);
        let err = drive(&mut monitor, &[Verdict::Pass, Verdict::Pass]).unwrap_err();
        assert!(matches!(err, SchedulerError::Unresolved { .. }));
        assert!(err.to_string().contains("gained 0.00 of 1.00"));
    }

    #[test]
    fn test_tick_budget_exceeded_is_fatal() {
        let engine = Engine::new(SchedulerConfig {
            max_bugs: 1,
            max_ticks: 5,
            ..SchedulerConfig::default()
        });
        let mut monitor = Monitor::for_engine(engine);
        let err = drive(&mut monitor, &[]).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::TickBudgetExceeded {
                tick_no: 5,
                max_ticks: 5,
                unfinished: vec![0],
            }
        );
    }

    #[test]
    fn test_check_invariants_detects_leaked_workers() {
        let config = SchedulerConfig::default();
        let state = EngineState {
            bugs: vec![BugState::new(Phase::Patch, 2, 0)],
            free_workers: 9,
            tick_no: 3,
        };
        let err = check_invariants(&state, &config).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::Capacity {
                tick_no: 3,
                free_workers: 9,
                workers_per_bug: 3,
                active: 1,
                computed: 12,
                expected: 9,
            }
        );
    }

    #[test]
    fn test_check_invariants_detects_stale_timer() {
        let config = SchedulerConfig {
            total_workers: 3,
            ..SchedulerConfig::default()
        };
        let state = EngineState {
            bugs: vec![BugState::new(Phase::Done, 2, 0)],
            free_workers: 3,
            tick_no: 4,
        };
        assert!(matches!(
            check_invariants(&state, &config),
            Err(InvariantViolation::Timer { bug_index: 0, timer: 2, .. })
        ));
    }
}
