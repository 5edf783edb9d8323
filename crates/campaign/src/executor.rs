//! Campaign executor.
//!
//! Drives a [`CampaignPlan`]'s shots through the [`ExecutionEngine`] with a
//! bounded number of generations in flight. Every shot status change goes
//! through [`Shot::apply`] under the plan lock, so a shot can never be
//! claimed by two workers at once. Generation and storage failures are
//! recorded on the shot; they never abort the run.
//!
//! Shot tasks are spawned detached. Dropping a `run_plan` future stops
//! issuing new shots, but every shot already claimed still runs to `DONE`
//! or `FAILED`, and the concurrency cap is shared across runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::generation::GenerationRequest;
use atelier_core::types::ShotId;
use atelier_engine::ExecutionEngine;
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::CampaignError;
use crate::events::{CampaignEvent, CampaignEvents, RunSummary};
use crate::plan::{CampaignBrief, CampaignPlan};
use crate::request_builder::RequestBuilder;
use crate::shot::{Shot, ShotAction, ShotStatus};
use crate::store::ArtifactStore;

/// Generations allowed in flight at once when not configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub concurrency: usize,
    /// Run each prompt through best-effort enhancement before generating.
    pub enhance_prompts: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            enhance_prompts: false,
        }
    }
}

/// Per-status counts over the whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProgress {
    pub total: usize,
    pub pending: usize,
    pub generating: usize,
    pub done: usize,
    pub failed: usize,
}

impl PlanProgress {
    /// Fraction of shots in a terminal state.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done + self.failed) as f64 / self.total as f64
    }
}

/// How a single shot pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShotOutcome {
    Done,
    Failed,
    Skipped,
}

/// Why a shot is being moved into `GENERATING`.
enum Claim<'a> {
    Start,
    Regenerate { feedback: &'a str },
}

/// Clears the running flag when a run ends, including when the
/// `run_plan` future is dropped before completion.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cheaply cloneable handle; clones share the same plan and engine.
#[derive(Clone)]
pub struct CampaignExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<ExecutionEngine>,
    builder: Arc<dyn RequestBuilder>,
    store: Arc<dyn ArtifactStore>,
    events: CampaignEvents,
    options: ExecutorOptions,
    /// Bulk-run slots; held by shot tasks, not by the run itself.
    permits: Arc<Semaphore>,
    plan: Mutex<Option<CampaignPlan>>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
}

impl CampaignExecutor {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        builder: Arc<dyn RequestBuilder>,
        store: Arc<dyn ArtifactStore>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                builder,
                store,
                events: CampaignEvents::default(),
                permits: Arc::new(Semaphore::new(options.concurrency.max(1))),
                options,
                plan: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    // ---- plan management ----

    /// Validate and install `plan`, replacing any previous one. Refused
    /// while a run is active or any shot is still generating.
    pub fn load_plan(&self, plan: CampaignPlan) -> Result<(), CampaignError> {
        plan.validate()?;
        let mut guard = self.lock_plan();
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(CampaignError::RunInProgress);
        }
        if let Some(busy) = guard
            .as_ref()
            .and_then(|p| p.shots.iter().find(|s| s.status == ShotStatus::Generating))
        {
            return Err(CampaignError::ShotBusy(busy.id.clone()));
        }
        tracing::info!(
            campaign = %plan.brief.name,
            shots = plan.shots.len(),
            "Campaign plan loaded",
        );
        *guard = Some(plan);
        Ok(())
    }

    /// Copy of the live plan.
    pub fn snapshot(&self) -> Option<CampaignPlan> {
        self.lock_plan().clone()
    }

    pub fn shot(&self, id: &str) -> Result<Shot, CampaignError> {
        let guard = self.lock_plan();
        let plan = guard.as_ref().ok_or(CampaignError::NoActiveCampaign)?;
        plan.shot(id)
            .cloned()
            .ok_or_else(|| CampaignError::ShotNotFound(id.to_string()))
    }

    pub fn progress(&self) -> Result<PlanProgress, CampaignError> {
        let guard = self.lock_plan();
        let plan = guard.as_ref().ok_or(CampaignError::NoActiveCampaign)?;
        let mut progress = PlanProgress {
            total: plan.shots.len(),
            ..PlanProgress::default()
        };
        for shot in &plan.shots {
            match shot.status {
                ShotStatus::Pending => progress.pending += 1,
                ShotStatus::Generating => progress.generating += 1,
                ShotStatus::Done => progress.done += 1,
                ShotStatus::Failed => progress.failed += 1,
            }
        }
        Ok(progress)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.inner.events.subscribe()
    }

    /// Stop issuing new shots in the active run. In-flight shots run to
    /// completion. Has no effect when no run is active; it does not carry
    /// over to a later `run_plan`.
    pub fn stop(&self) {
        let token = self.lock_cancel();
        if !self.inner.running.load(Ordering::SeqCst) {
            tracing::debug!("Campaign stop requested with no active run");
            return;
        }
        tracing::info!("Campaign stop requested");
        token.cancel();
    }

    // ---- execution ----

    /// Run every `PENDING` shot through the engine, at most
    /// `options.concurrency` at a time.
    ///
    /// Fails only when no plan is loaded or another run is active; shot
    /// failures are reported in the summary.
    pub async fn run_plan(&self) -> Result<RunSummary, CampaignError> {
        // Flag and token change together under the cancel lock.
        let cancel = {
            let mut token = self.lock_cancel();
            if self.inner.running.swap(true, Ordering::SeqCst) {
                return Err(CampaignError::RunInProgress);
            }
            *token = CancellationToken::new();
            token.clone()
        };
        let _running = RunGuard(&self.inner.running);

        let pending: Vec<ShotId> = {
            let guard = self.lock_plan();
            let plan = guard.as_ref().ok_or(CampaignError::NoActiveCampaign)?;
            plan.shots
                .iter()
                .filter(|s| s.status == ShotStatus::Pending)
                .map(|s| s.id.clone())
                .collect()
        };

        let total = pending.len();
        tracing::info!(
            total,
            concurrency = self.inner.options.concurrency.max(1),
            "Campaign run started",
        );

        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks: Vec<JoinHandle<ShotOutcome>> = Vec::with_capacity(total);
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        for shot_id in pending {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&self.inner.permits).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::info!(shot_id = %shot_id, "Shot not started, run stopped");
                summary.skipped += 1;
                continue;
            };

            let this = self.clone();
            let completed = Arc::clone(&completed);
            tasks.push(tokio::spawn(async move {
                let outcome = this.execute_shot(&shot_id, Claim::Start).await;
                drop(permit);
                if outcome != ShotOutcome::Skipped {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    this.inner.events.publish(CampaignEvent::Progress {
                        completed: done,
                        total,
                    });
                }
                outcome
            }));
        }

        for task in tasks {
            match task.await {
                Ok(ShotOutcome::Done) => summary.succeeded += 1,
                Ok(ShotOutcome::Failed) => summary.failed += 1,
                Ok(ShotOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Shot task panicked");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Campaign run completed",
        );
        self.inner.events.publish(CampaignEvent::run_completed(summary));
        Ok(summary)
    }

    /// Regenerate one `DONE` or `FAILED` shot with `feedback` folded into
    /// its prompt. Runs outside the bulk pool and returns the shot as it
    /// stands afterwards (`DONE` or `FAILED`).
    pub async fn regenerate_shot(&self, id: &str, feedback: &str) -> Result<Shot, CampaignError> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(CampaignError::Validation(
                "Feedback must not be empty".to_string(),
            ));
        }
        let (brief, shot) = self.claim(id, Claim::Regenerate { feedback })?;
        self.generate_claimed(brief, shot).await;
        self.shot(id)
    }

    /// Move a `FAILED` shot back to `PENDING` so the next run picks it up.
    pub fn reset_shot(&self, id: &str) -> Result<(), CampaignError> {
        let mut guard = self.lock_plan();
        let plan = guard.as_mut().ok_or(CampaignError::NoActiveCampaign)?;
        let shot = plan
            .shot_mut(id)
            .ok_or_else(|| CampaignError::ShotNotFound(id.to_string()))?;
        if shot.status == ShotStatus::Generating {
            return Err(CampaignError::ShotBusy(id.to_string()));
        }
        shot.apply(ShotAction::Reset)?;
        tracing::info!(shot_id = %id, "Shot reset to pending");
        Ok(())
    }

    // ---- private helpers ----

    async fn execute_shot(&self, id: &str, claim: Claim<'_>) -> ShotOutcome {
        match self.claim(id, claim) {
            Ok((brief, shot)) => self.generate_claimed(brief, shot).await,
            Err(e) => {
                tracing::warn!(shot_id = %id, error = %e, "Shot skipped");
                ShotOutcome::Skipped
            }
        }
    }

    /// Atomically move the shot into `GENERATING` and copy out what the
    /// request needs.
    fn claim(&self, id: &str, claim: Claim<'_>) -> Result<(CampaignBrief, Shot), CampaignError> {
        let mut guard = self.lock_plan();
        let plan = guard.as_mut().ok_or(CampaignError::NoActiveCampaign)?;
        let brief = plan.brief.clone();
        let shot = plan
            .shot_mut(id)
            .ok_or_else(|| CampaignError::ShotNotFound(id.to_string()))?;

        if shot.status == ShotStatus::Generating {
            return Err(CampaignError::ShotBusy(id.to_string()));
        }

        match claim {
            Claim::Start => shot.apply(ShotAction::Start)?,
            Claim::Regenerate { feedback } => {
                let action = match shot.status {
                    ShotStatus::Failed => ShotAction::RetryWithFeedback,
                    _ => ShotAction::Reject,
                };
                shot.apply(action)?;
                shot.feedback = Some(feedback.to_string());
            }
        }

        Ok((brief, shot.clone()))
    }

    async fn generate_claimed(&self, brief: CampaignBrief, shot: Shot) -> ShotOutcome {
        let inner = &self.inner;
        tracing::info!(shot_id = %shot.id, "Shot generating");
        inner.events.publish(CampaignEvent::started(&shot.id));

        let request = match inner.builder.build(&brief, &shot) {
            Ok(request) => request,
            Err(e) => return self.fail(&shot.id, &e.to_string()),
        };
        let request = if inner.options.enhance_prompts {
            let prompt = inner.engine.enhance_prompt(&request.prompt, request.tier).await;
            GenerationRequest { prompt, ..request }
        } else {
            request
        };

        let result = match inner.engine.generate(&request).await {
            Ok(result) => result,
            Err(e) => return self.fail(&shot.id, &e.to_string()),
        };

        let artifact = match inner.store.put(&shot.id, &request, &result).await {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(&shot.id, &e.to_string()),
        };

        self.transition(&shot.id, ShotAction::Succeed, |s| {
            s.result_ref = Some(artifact.id);
            s.last_error = None;
        });
        tracing::info!(
            shot_id = %shot.id,
            artifact_id = %artifact.id,
            model = %result.model_actually_used,
            fallback = result.is_fallback(),
            "Shot done",
        );
        inner.events.publish(CampaignEvent::completed(
            &shot.id,
            artifact.id,
            &result.model_actually_used,
            result.is_fallback(),
        ));
        ShotOutcome::Done
    }

    fn fail(&self, id: &str, error: &str) -> ShotOutcome {
        self.transition(id, ShotAction::Fail, |s| {
            s.last_error = Some(error.to_string());
        });
        tracing::warn!(shot_id = %id, error, "Shot failed");
        self.inner.events.publish(CampaignEvent::failed(id, error));
        ShotOutcome::Failed
    }

    /// Apply a completion transition. The shot was claimed by this task, so
    /// a rejected transition means the plan was swapped underneath us.
    fn transition(&self, id: &str, action: ShotAction, update: impl FnOnce(&mut Shot)) {
        let mut guard = self.lock_plan();
        let Some(shot) = guard.as_mut().and_then(|p| p.shot_mut(id)) else {
            tracing::warn!(shot_id = %id, %action, "Shot vanished before completion");
            return;
        };
        match shot.apply(action) {
            Ok(()) => update(shot),
            Err(e) => tracing::warn!(shot_id = %id, error = %e, "Completion transition rejected"),
        }
    }

    fn lock_plan(&self) -> MutexGuard<'_, Option<CampaignPlan>> {
        self.inner
            .plan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
