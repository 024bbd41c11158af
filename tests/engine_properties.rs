//! Property tests for the tick engine: worker conservation, well-formed
//! timers, determinism and the worst-case tick bound.

use fixloop::domain::models::{
    EngineState, MonitorVerdict, Phase, SchedulerConfig, Verdict, MAX_ATTEMPTS,
};
use fixloop::services::{check_invariants, Engine, Monitor, Verdicts};
use proptest::prelude::*;
use test_strategy::proptest;

fn sized(bugs: usize, concurrency: u32, phase_timer: u8) -> SchedulerConfig {
    let mut config = SchedulerConfig {
        max_bugs: bugs,
        total_workers: 3 * concurrency,
        phase_timer,
        ..SchedulerConfig::default()
    };
    config.max_ticks = config.worst_case_ticks(bugs).unwrap_or(u32::MAX);
    config
}

/// Answer every due verification from `answers` in order; pass once exhausted.
fn verdicts_for(engine: &Engine, answers: &[bool], used: &mut usize) -> Verdicts {
    engine
        .verifications_due()
        .into_iter()
        .map(|due| {
            let pass = answers.get(*used).copied().unwrap_or(true);
            *used += 1;
            let verdict = if pass { Verdict::Pass } else { Verdict::Fail };
            (due.bug_index, verdict)
        })
        .collect()
}

/// Tick until every bug has settled, returning the state after each tick.
fn drive(config: SchedulerConfig, answers: &[bool]) -> Result<Vec<EngineState>, TestCaseError> {
    let mut engine = Engine::new(config);
    let mut used = 0;
    let mut states = Vec::new();
    while !engine.state().all_terminal() {
        let verdicts = verdicts_for(&engine, answers, &mut used);
        engine
            .tick(&verdicts)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        states.push(engine.state().clone());
    }
    Ok(states)
}

#[proptest]
fn workers_are_conserved_every_tick(
    #[strategy(1usize..=10)] bugs: usize,
    #[strategy(1u32..=3)] concurrency: u32,
    #[strategy(1u8..=4)] phase_timer: u8,
    #[strategy(prop::collection::vec(any::<bool>(), 0..24))] answers: Vec<bool>,
) {
    let config = sized(bugs, concurrency, phase_timer);
    for state in drive(config.clone(), &answers)? {
        prop_assert!(check_invariants(&state, &config).is_ok());
        prop_assert!(state.free_workers <= config.total_workers);
        prop_assert!(state.active_count() <= concurrency as usize);
        for bug in &state.bugs {
            prop_assert!(bug.attempts <= MAX_ATTEMPTS);
        }
    }
}

#[proptest]
fn every_bug_settles_within_the_worst_case_bound(
    #[strategy(1usize..=10)] bugs: usize,
    #[strategy(1u32..=3)] concurrency: u32,
    #[strategy(1u8..=4)] phase_timer: u8,
    #[strategy(prop::collection::vec(any::<bool>(), 0..24))] answers: Vec<bool>,
) {
    let config = sized(bugs, concurrency, phase_timer);
    let bound = config.max_ticks;
    let states = drive(config, &answers)?;
    let last = states.last().expect("at least one tick");
    prop_assert!(last.tick_no <= bound, "settled at {} > {}", last.tick_no, bound);
    prop_assert_eq!(last.free_workers, 3 * concurrency);
}

#[proptest]
fn settled_bugs_never_move_again(
    #[strategy(1usize..=6)] bugs: usize,
    #[strategy(prop::collection::vec(any::<bool>(), 0..12))] answers: Vec<bool>,
) {
    let states = drive(sized(bugs, 3, 3), &answers)?;
    for pair in states.windows(2) {
        for (before, after) in pair[0].bugs.iter().zip(&pair[1].bugs) {
            if before.phase.is_terminal() {
                prop_assert_eq!(before, after);
            }
            prop_assert!(after.attempts >= before.attempts);
        }
    }
}

#[proptest]
fn identical_inputs_give_identical_runs(
    #[strategy(1usize..=10)] bugs: usize,
    #[strategy(prop::collection::vec(any::<bool>(), 0..24))] answers: Vec<bool>,
) {
    let first = drive(sized(bugs, 3, 3), &answers)?;
    let second = drive(sized(bugs, 3, 3), &answers)?;
    prop_assert_eq!(first, second);
}

#[test]
fn ten_bugs_failing_once_settle_at_the_bound() {
    let config = SchedulerConfig::default();
    let mut monitor = Monitor::for_engine(Engine::new(config));
    let mut failed = std::collections::HashSet::new();

    let outcome = loop {
        let verdicts: Verdicts = monitor
            .verifications_due()
            .into_iter()
            .map(|due| {
                let verdict = if failed.insert(due.bug_index) {
                    Verdict::Fail
                } else {
                    Verdict::Pass
                };
                (due.bug_index, verdict)
            })
            .collect();
        let tick = monitor.tick(&verdicts).unwrap();
        if tick.verdict == MonitorVerdict::Success {
            break tick;
        }
    };

    assert_eq!(outcome.report.tick_no, 57);
    assert!(monitor
        .engine()
        .state()
        .bugs
        .iter()
        .all(|bug| bug.phase == Phase::Done && bug.attempts == 1));
    let progress = monitor.global_progress();
    assert!((progress.bits_gained - 10.0).abs() < f64::EPSILON);
    assert!(progress.bits_gained >= progress.bits_total);
}
