//! Parallel Executor
//!
//! Runs up to `max_parallel` bug contexts side by side. Each context owns a
//! single-bug [`Monitor`] whose worker pool is `total_workers / max_parallel`,
//! so the executor as a whole never holds more than `total_workers`.
//!
//! Every [`ParallelExecutor::step`] is one round: refill from the backlog,
//! then tick each active context once in insertion order. A context only
//! awaits collaborators at two points: gathering verdicts right before its
//! tick, and producing and applying a patch right after a bug enters
//! `Patch`. A failing context is removed and reported; the others carry on.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::engine::{Engine, Verdicts};
use super::monitor::Monitor;
use super::rollback_manager::RollbackManager;
use crate::domain::errors::ExecutorError;
use crate::domain::models::{
    BugId, BugState, BugStatus, BugTask, ExecutorConfig, GlobalProgress, MonitorVerdict,
    PatchBundle, Phase, SchedulerConfig,
};
use crate::domain::ports::{PatchGenerator, PatchRequest, Verifier};

/// How a context ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextOutcome {
    Resolved,
    Escalated { reason: String },
}

/// Summary of a finished context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextReport {
    pub bug_id: BugId,
    pub outcome: ContextOutcome,
    pub final_status: BugStatus,
    pub ticks_used: u32,
    pub bits_gained: f64,
    /// Entropy the context's monitor had to cover.
    pub bits_total: f64,
}

/// A context removed because of an error.
#[derive(Debug)]
pub struct ContextFailure {
    pub bug_id: BugId,
    /// Context tick the failure was detected at.
    pub tick_no: u32,
    pub error: ExecutorError,
}

/// What happened during one executor round.
#[derive(Debug, Default)]
pub struct StepReport {
    pub round: u32,
    pub admitted: Vec<BugId>,
    pub completed: Vec<ContextReport>,
    pub failures: Vec<ContextFailure>,
    /// Contexts still active after the round.
    pub active: usize,
    pub workers_in_use: u32,
}

/// Point-in-time view of every known bug, written by `fixloop run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub round: u32,
    pub progress: GlobalProgress,
    pub bugs: Vec<BugSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugSnapshot {
    pub bug_id: BugId,
    pub status: BugStatus,
    /// Set once the context has finished.
    pub outcome: Option<ContextOutcome>,
    /// Last tick of an active context.
    pub last_activity: Option<DateTime<Utc>>,
}

struct BugContext {
    task: BugTask,
    monitor: Monitor,
    /// A bundle for this bug is currently on the working tree.
    patch_applied: bool,
    last_activity: DateTime<Utc>,
}

impl BugContext {
    fn new(task: BugTask, config: &SchedulerConfig) -> Self {
        Self {
            task,
            monitor: Monitor::for_engine(Engine::new(config.clone())),
            patch_applied: false,
            last_activity: Utc::now(),
        }
    }

    fn status(&self) -> BugStatus {
        self.monitor
            .status(0)
            .unwrap_or_else(|| BugStatus::from(BugState::waiting()))
    }

    fn report(&self, outcome: ContextOutcome) -> ContextReport {
        let progress = self.monitor.global_progress();
        ContextReport {
            bug_id: self.task.bug_id.clone(),
            outcome,
            final_status: self.status(),
            ticks_used: progress.ticks_used,
            bits_gained: progress.bits_gained,
            bits_total: progress.bits_total,
        }
    }
}

pub struct ParallelExecutor {
    config: ExecutorConfig,
    context_config: SchedulerConfig,
    verifier: Arc<dyn Verifier>,
    generator: Arc<dyn PatchGenerator>,
    rollback: Arc<RollbackManager>,
    backlog: VecDeque<BugTask>,
    active: Vec<BugContext>,
    finished: Vec<ContextReport>,
    round: u32,
}

impl ParallelExecutor {
    pub fn new(
        scheduler: &SchedulerConfig,
        config: ExecutorConfig,
        verifier: Arc<dyn Verifier>,
        generator: Arc<dyn PatchGenerator>,
        rollback: Arc<RollbackManager>,
    ) -> Self {
        let context_config = scheduler.context_slice(config.max_parallel);
        Self {
            config,
            context_config,
            verifier,
            generator,
            rollback,
            backlog: VecDeque::new(),
            active: Vec::new(),
            finished: Vec::new(),
            round: 0,
        }
    }

    pub fn enqueue(&mut self, task: BugTask) {
        self.backlog.push_back(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = BugTask>) {
        self.backlog.extend(tasks);
    }

    /// Nothing queued and nothing running.
    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.active.is_empty()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn finished(&self) -> &[ContextReport] {
        &self.finished
    }

    /// Workers held across all active contexts.
    pub fn workers_in_use(&self) -> u32 {
        self.active
            .iter()
            .map(|ctx| ctx.monitor.engine().workers_in_use())
            .sum()
    }

    /// Current status of a bug, wherever it is.
    pub fn status(&self, bug_id: &BugId) -> Option<BugStatus> {
        if let Some(ctx) = self.active.iter().find(|ctx| &ctx.task.bug_id == bug_id) {
            return Some(ctx.status());
        }
        if let Some(report) = self.finished.iter().rev().find(|r| &r.bug_id == bug_id) {
            return Some(report.final_status);
        }
        self.backlog
            .iter()
            .any(|task| &task.bug_id == bug_id)
            .then(|| BugStatus::from(BugState::waiting()))
    }

    /// Progress summed over active and finished contexts.
    pub fn global_progress(&self) -> GlobalProgress {
        let active = self
            .active
            .iter()
            .map(|ctx| ctx.monitor.global_progress());
        let finished = self.finished.iter().map(|report| GlobalProgress {
            ticks_used: report.ticks_used,
            bits_gained: report.bits_gained,
            bits_total: report.bits_total,
        });
        active
            .chain(finished)
            .fold(GlobalProgress::default(), |acc, p| acc + p)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let finished = self.finished.iter().map(|report| BugSnapshot {
            bug_id: report.bug_id.clone(),
            status: report.final_status,
            outcome: Some(report.outcome.clone()),
            last_activity: None,
        });
        let active = self.active.iter().map(|ctx| BugSnapshot {
            bug_id: ctx.task.bug_id.clone(),
            status: ctx.status(),
            outcome: None,
            last_activity: Some(ctx.last_activity),
        });
        let queued = self.backlog.iter().map(|task| BugSnapshot {
            bug_id: task.bug_id.clone(),
            status: BugStatus::from(BugState::waiting()),
            outcome: None,
            last_activity: None,
        });
        StatusSnapshot {
            generated_at: Utc::now(),
            round: self.round,
            progress: self.global_progress(),
            bugs: finished.chain(active).chain(queued).collect(),
        }
    }

    /// Run one round.
    #[instrument(skip(self), fields(round = self.round + 1))]
    pub async fn step(&mut self) -> StepReport {
        self.round += 1;
        let mut report = StepReport {
            round: self.round,
            ..StepReport::default()
        };

        while self.active.len() < self.config.max_parallel {
            let Some(task) = self.backlog.pop_front() else {
                break;
            };
            info!(bug_id = %task.bug_id, round = self.round, "context admitted");
            report.admitted.push(task.bug_id.clone());
            self.active.push(BugContext::new(task, &self.context_config));
        }

        let contexts = std::mem::take(&mut self.active);
        let mut still_active = Vec::with_capacity(contexts.len());
        for mut ctx in contexts {
            match self.advance(&mut ctx).await {
                Ok(MonitorVerdict::Continue) => still_active.push(ctx),
                Ok(MonitorVerdict::Success) => {
                    let summary = ctx.report(ContextOutcome::Resolved);
                    info!(
                        bug_id = %summary.bug_id,
                        ticks_used = summary.ticks_used,
                        attempts = summary.final_status.attempts,
                        "bug resolved"
                    );
                    report.completed.push(summary.clone());
                    self.finished.push(summary);
                }
                Err(err) => {
                    let tick_no = ctx.monitor.engine().state().tick_no;
                    error!(
                        bug_id = %ctx.task.bug_id,
                        tick_no,
                        error = %err,
                        "context failed"
                    );
                    self.unwind(&mut ctx).await;
                    ctx.monitor.escalate(0);
                    let summary = ctx.report(ContextOutcome::Escalated {
                        reason: err.to_string(),
                    });
                    report.completed.push(summary.clone());
                    self.finished.push(summary);
                    report.failures.push(ContextFailure {
                        bug_id: ctx.task.bug_id,
                        tick_no,
                        error: err,
                    });
                }
            }
        }
        self.active = still_active;

        report.active = self.active.len();
        report.workers_in_use = self.workers_in_use();
        debug!(
            round = report.round,
            active = report.active,
            queued = self.backlog.len(),
            workers_in_use = report.workers_in_use,
            "round finished"
        );
        report
    }

    /// Step until the backlog is drained and every context has finished.
    pub async fn run(&mut self) -> Vec<ContextReport> {
        while !self.is_idle() {
            self.step().await;
        }
        self.finished.clone()
    }

    /// Verdicts, one tick, then patch work for bugs that entered `Patch`.
    async fn advance(&self, ctx: &mut BugContext) -> Result<MonitorVerdict, ExecutorError> {
        let due = ctx.monitor.verifications_due();
        let bug_id = &ctx.task.bug_id;
        let answers = try_join_all(
            due.iter()
                .map(|d| self.verifier.verify(bug_id, d.attempt)),
        )
        .await?;
        let verdicts: Verdicts = due.iter().map(|d| d.bug_index).zip(answers).collect();

        let tick = ctx.monitor.tick(&verdicts)?;
        ctx.last_activity = Utc::now();

        for change in tick.report.changes.iter().filter(|c| c.entered(Phase::Patch)) {
            if ctx.patch_applied {
                self.rollback.rollback(&ctx.task.bug_id).await?;
                ctx.patch_applied = false;
            }
            let request = PatchRequest {
                attempt: change.to.attempts,
                tick_no: tick.report.tick_no,
            };
            self.install_patch(&ctx.task, &request).await?;
            ctx.patch_applied = true;
        }

        Ok(tick.verdict)
    }

    /// Generate, record and apply a patch, retrying with backoff while the
    /// failure is one a fresh patch could fix.
    #[instrument(skip(self, task), fields(bug_id = %task.bug_id, attempt = request.attempt))]
    async fn install_patch(
        &self,
        task: &BugTask,
        request: &PatchRequest,
    ) -> Result<PatchBundle, ExecutorError> {
        let max_tries = self.config.patch_attempts.max(1);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let mut tries = 0u32;
        backoff::future::retry(policy, || {
            tries += 1;
            let try_no = tries;
            async move {
                match self.generate_and_apply(task, request, try_no).await {
                    Ok(bundle) => Ok(bundle),
                    Err(err) if err.is_retryable() && try_no < max_tries => {
                        warn!(
                            bug_id = %task.bug_id,
                            try_no,
                            max_tries,
                            error = %err,
                            "patch attempt failed, retrying"
                        );
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }

    async fn generate_and_apply(
        &self,
        task: &BugTask,
        request: &PatchRequest,
        try_no: u32,
    ) -> Result<PatchBundle, ExecutorError> {
        let diff = self.generator.generate_patch(task, request).await?;
        let label = format!(
            "attempt {} try {try_no} tick {}",
            request.attempt, request.tick_no
        );
        let bundle = self
            .rollback
            .create_bundle(&task.bug_id, diff, &label)
            .await?;
        if let Err(err) = self.rollback.apply(&bundle).await {
            self.rollback.discard(&task.bug_id).await?;
            return Err(err.into());
        }
        Ok(bundle)
    }

    /// Take a failed context's patch back off the tree.
    async fn unwind(&self, ctx: &mut BugContext) {
        if !ctx.patch_applied {
            return;
        }
        match self.rollback.rollback(&ctx.task.bug_id).await {
            Ok(outcome) => {
                ctx.patch_applied = false;
                debug!(bug_id = %ctx.task.bug_id, ?outcome, "failed context unwound");
            }
            Err(err) => {
                error!(bug_id = %ctx.task.bug_id, error = %err, "could not roll back failed context");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryBundleStore, InMemoryPatchLedger, InMemoryWorkingTree, ScriptedVerifier,
        StaticPatchGenerator,
    };
    use crate::domain::errors::{CollaboratorError, SchedulerError};
    use crate::domain::models::{MonitorState, Verdict};

    struct Harness {
        executor: ParallelExecutor,
        tree: Arc<InMemoryWorkingTree>,
        generator: Arc<StaticPatchGenerator>,
        rollback: Arc<RollbackManager>,
    }

    fn harness(verifier: ScriptedVerifier, generator: StaticPatchGenerator) -> Harness {
        harness_with(&SchedulerConfig::default(), verifier, generator)
    }

    fn harness_with(
        scheduler: &SchedulerConfig,
        verifier: ScriptedVerifier,
        generator: StaticPatchGenerator,
    ) -> Harness {
        let tree = Arc::new(InMemoryWorkingTree::new());
        let generator = Arc::new(generator);
        let rollback = Arc::new(RollbackManager::new(
            Arc::new(InMemoryPatchLedger::new()),
            Arc::new(InMemoryBundleStore::new()),
            tree.clone(),
        ));
        let config = ExecutorConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..ExecutorConfig::default()
        };
        let executor = ParallelExecutor::new(
            scheduler,
            config,
            Arc::new(verifier),
            generator.clone(),
            rollback.clone(),
        );
        Harness {
            executor,
            tree,
            generator,
            rollback,
        }
    }

    fn task(id: &str) -> BugTask {
        BugTask::new(id, "src/lib.rs", "panics on empty input")
    }

    #[tokio::test]
    async fn test_single_bug_resolves_and_keeps_patch() {
        let mut h = harness(ScriptedVerifier::default(), StaticPatchGenerator::new("fix"));
        h.executor.enqueue(task("BUG-1"));

        let reports = h.executor.run().await;
        assert_eq!(h.executor.round(), 9);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, ContextOutcome::Resolved);
        assert_eq!(reports[0].final_status.phase, Phase::Done);
        assert_eq!(h.tree.applied(), vec![b"fix".to_vec()]);
        assert!(h
            .rollback
            .ledger()
            .get(&BugId::new("BUG-1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_verification_replaces_patch() {
        let verifier = ScriptedVerifier::default().with_script("BUG-1", &[Verdict::Fail]);
        let mut h = harness(verifier, StaticPatchGenerator::new("fix"));
        h.executor.enqueue(task("BUG-1"));

        let reports = h.executor.run().await;
        assert_eq!(h.executor.round(), 15);
        assert_eq!(reports[0].outcome, ContextOutcome::Resolved);
        assert_eq!(reports[0].final_status.attempts, 1);
        assert!((reports[0].bits_gained - 1.0).abs() < f64::EPSILON);
        assert_eq!(h.generator.calls(), 2);
        assert_eq!(h.tree.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_escalated_bug_is_unwound() {
        let verifier =
            ScriptedVerifier::default().with_script("BUG-1", &[Verdict::Fail, Verdict::Fail]);
        let mut h = harness(verifier, StaticPatchGenerator::new("fix"));
        h.executor.enqueue(task("BUG-1"));

        let reports = h.executor.run().await;
        assert!(matches!(
            reports[0].outcome,
            ContextOutcome::Escalated { .. }
        ));
        assert_eq!(reports[0].final_status.phase, Phase::Escalate);
        assert!(h.tree.applied().is_empty());
        assert!(h
            .rollback
            .ledger()
            .get(&BugId::new("BUG-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_parallel_cap_and_worker_bound() {
        let mut h = harness(ScriptedVerifier::default(), StaticPatchGenerator::new("fix"));
        h.executor
            .extend((0..5).map(|i| task(&format!("BUG-{i}"))));

        let first = h.executor.step().await;
        assert_eq!(first.admitted.len(), 3);
        assert_eq!(first.active, 3);
        assert_eq!(first.workers_in_use, 9);
        assert_eq!(h.executor.backlog_len(), 2);
        assert_eq!(
            h.executor.status(&BugId::new("BUG-4")),
            Some(BugStatus::from(BugState::waiting()))
        );

        while !h.executor.is_idle() {
            let report = h.executor.step().await;
            assert!(report.active <= 3);
            assert!(report.workers_in_use <= 9);
        }
        assert_eq!(h.executor.round(), 18);
        assert_eq!(h.executor.finished().len(), 5);
    }

    #[tokio::test]
    async fn test_generator_failures_are_retried() {
        let mut h = harness(
            ScriptedVerifier::default(),
            StaticPatchGenerator::new("fix").failing_first(1),
        );
        h.executor.enqueue(task("BUG-1"));
        let reports = h.executor.run().await;
        assert_eq!(reports[0].outcome, ContextOutcome::Resolved);
        assert_eq!(h.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_generator_fails_only_its_context() {
        let mut h = harness(
            ScriptedVerifier::default(),
            StaticPatchGenerator::new("fix").failing_first(2),
        );
        h.executor.enqueue(task("BUG-1"));
        h.executor.enqueue(task("BUG-2"));

        let mut failures = Vec::new();
        while !h.executor.is_idle() {
            failures.extend(h.executor.step().await.failures);
        }

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].bug_id, BugId::new("BUG-1"));
        assert_eq!(failures[0].tick_no, 3);
        assert!(matches!(
            failures[0].error,
            ExecutorError::Collaborator(CollaboratorError::PatchGeneration { .. })
        ));
        assert_eq!(
            h.executor.status(&BugId::new("BUG-2")).map(|s| s.phase),
            Some(Phase::Done)
        );
        assert_eq!(
            h.executor.status(&BugId::new("BUG-1")),
            Some(BugStatus::from(BugState::new(Phase::Escalate, 0, 0)))
        );
        let bug1 = &h.executor.finished()[0];
        assert_eq!(bug1.bug_id, BugId::new("BUG-1"));
        assert_eq!(bug1.final_status.phase, Phase::Escalate);
    }

    #[tokio::test]
    async fn test_tick_budget_failure_reports_escalate() {
        let scheduler = SchedulerConfig {
            max_ticks: 5,
            ..SchedulerConfig::default()
        };
        let mut h = harness_with(
            &scheduler,
            ScriptedVerifier::default(),
            StaticPatchGenerator::new("fix"),
        );
        h.executor.enqueue(task("BUG-1"));

        let mut failures = Vec::new();
        while !h.executor.is_idle() {
            failures.extend(h.executor.step().await.failures);
        }

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].error,
            ExecutorError::Scheduler(SchedulerError::TickBudgetExceeded { tick_no: 5, .. })
        ));
        let status = h.executor.status(&BugId::new("BUG-1")).unwrap();
        assert_eq!(status.phase, Phase::Escalate);
        assert_eq!(status.timer, 0);
        assert_eq!(h.executor.finished()[0].final_status, status);
        assert_eq!(h.executor.workers_in_use(), 0);
        assert!(h.tree.applied().is_empty(), "patch applied at tick 3 is unwound");
    }

    #[tokio::test]
    async fn test_global_progress_sums_contexts() {
        let verifier = ScriptedVerifier::default()
            .with_script("A", &[Verdict::Fail])
            .with_script("B", &[Verdict::Fail]);
        let mut h = harness(verifier, StaticPatchGenerator::new("fix"));
        h.executor.extend([task("A"), task("B")]);
        h.executor.run().await;

        let progress = h.executor.global_progress();
        assert_eq!(progress.ticks_used, 30);

        assert!((progress.bits_gained - 2.0).abs() < f64::EPSILON);

        let snapshot = h.executor.snapshot();
        assert_eq!(snapshot.bugs.len(), 2);
        assert!(snapshot
            .bugs
            .iter()
            .all(|b| b.outcome == Some(ContextOutcome::Resolved)));
    }

    #[test]
    fn test_report_carries_monitor_entropy() {
        let ctx = BugContext {
            task: task("BUG-1"),
            monitor: Monitor::new(
                Engine::new(SchedulerConfig::default().context_slice(3)),
                MonitorState::new(2.0),
            ),
            patch_applied: false,
            last_activity: Utc::now(),
        };
        let report = ctx.report(ContextOutcome::Resolved);
        assert!((report.bits_total - 2.0).abs() < f64::EPSILON);

        let mut h = harness(ScriptedVerifier::default(), StaticPatchGenerator::new("fix"));
        h.executor.finished.push(report);
        assert!((h.executor.global_progress().bits_total - 2.0).abs() < f64::EPSILON);
    }
}
