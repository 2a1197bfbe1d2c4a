use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chime_core::types::{ExecutionId, Job, JobId};
use chime_store::{ExecutionStore, JobStore};

use crate::alerts::AlertLog;
use crate::dispatch::HttpDispatcher;
use crate::error::Result;
use crate::schedule;

/// Everything one execution needs, cloned into each spawned task.
#[derive(Clone)]
struct ExecutionContext {
    jobs: JobStore,
    executions: ExecutionStore,
    dispatcher: HttpDispatcher,
    alerts: AlertLog,
}

/// Owns one live trigger task per scheduled job.
///
/// Scheduling is idempotent: a second `schedule_job` for the same ID
/// replaces the previous trigger. Aborting a trigger never touches
/// executions already in flight.
pub struct Scheduler {
    ctx: ExecutionContext,
    triggers: DashMap<JobId, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        jobs: JobStore,
        executions: ExecutionStore,
        dispatcher: HttpDispatcher,
        alerts: AlertLog,
    ) -> Self {
        Self {
            ctx: ExecutionContext {
                jobs,
                executions,
                dispatcher,
                alerts,
            },
            triggers: DashMap::new(),
        }
    }

    /// Start (or replace) the trigger task for a job.
    ///
    /// Inactive jobs only have their existing trigger removed; that is a
    /// success, not an error. Must run inside a tokio runtime.
    pub fn schedule_job(&self, job: &Job) -> Result<()> {
        self.unschedule_job(&job.id);

        if !job.active {
            debug!(job_id = %job.id, "job inactive, no trigger started");
            return Ok(());
        }

        let parsed = schedule::parse(&job.schedule)?;
        let handle = tokio::spawn(trigger_loop(self.ctx.clone(), job.id.clone(), parsed));
        self.triggers.insert(job.id.clone(), handle);
        info!(job_id = %job.id, schedule = %job.schedule, "job scheduled");
        Ok(())
    }

    /// Stop a job's trigger task. No-op when the job has none.
    pub fn unschedule_job(&self, job_id: &JobId) {
        if let Some((_, handle)) = self.triggers.remove(job_id) {
            handle.abort();
            info!(%job_id, "job unscheduled");
        }
    }

    /// Schedule every active job in the store, returning how many took.
    ///
    /// A job whose stored schedule no longer parses is logged and skipped;
    /// the rest still load.
    pub fn load_active_jobs(&self) -> Result<usize> {
        let jobs = self.ctx.jobs.list_active()?;
        let total = jobs.len();
        let mut scheduled = 0usize;
        for job in &jobs {
            match self.schedule_job(job) {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to schedule stored job")
                }
            }
        }
        info!(scheduled, total, "active jobs loaded");
        Ok(scheduled)
    }

    /// Run one execution of a job outside its schedule.
    ///
    /// With `wait` the call returns after the execution reaches a terminal
    /// state; without it the execution is spawned and the call returns
    /// immediately.
    pub async fn execute_job(&self, job: &Job, wait: bool) -> Result<()> {
        if wait {
            return run_execution(&self.ctx, &job.id).await;
        }

        let ctx = self.ctx.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            if let Err(e) = run_execution(&ctx, &job_id).await {
                error!(%job_id, error = %e, "unhandled error in job execution");
            }
        });
        Ok(())
    }

    /// Abort all trigger tasks. In-flight executions run to completion.
    pub fn shutdown(&self) {
        let mut stopped = 0usize;
        self.triggers.retain(|job_id, handle| {
            handle.abort();
            debug!(%job_id, "trigger stopped");
            stopped += 1;
            false
        });
        if stopped > 0 {
            info!(count = stopped, "scheduler shut down");
        }
    }

    pub fn is_scheduled(&self, job_id: &JobId) -> bool {
        self.triggers.contains_key(job_id)
    }

    /// Number of live trigger tasks.
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }
}

/// Sleep until each upcoming fire time and spawn the execution.
///
/// Firings run detached so a slow target cannot push back the next fire.
async fn trigger_loop(ctx: ExecutionContext, job_id: JobId, schedule: cron::Schedule) {
    loop {
        let Some(next) = schedule::next_fire(&schedule) else {
            warn!(%job_id, "schedule has no future firings, trigger exiting");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let ctx = ctx.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if let Err(e) = run_execution(&ctx, &job_id).await {
                error!(%job_id, error = %e, "scheduled execution failed");
            }
        });
    }
}

/// One full execution: re-read the job, record the firing, dispatch, settle.
///
/// The job is re-read at fire time so deletions and deactivations that
/// raced the trigger are honoured silently, with no record and no alert.
/// Once the pending record exists, any internal fault is contained here:
/// the record is marked failed and the alert still fires.
async fn run_execution(ctx: &ExecutionContext, job_id: &JobId) -> Result<()> {
    let Some(job) = ctx.jobs.get(job_id)? else {
        debug!(%job_id, "job vanished before execution, skipping");
        return Ok(());
    };
    if !job.active {
        debug!(%job_id, "job deactivated before execution, skipping");
        return Ok(());
    }

    let execution = ctx.executions.create(&job.id)?;

    if let Err(e) = drive_execution(ctx, &job, &execution.id).await {
        let msg = e.to_string();
        if let Err(mark_err) = ctx.executions.mark_failed(&execution.id, None, &msg, 0) {
            error!(
                execution_id = %execution.id,
                error = %mark_err,
                "could not record aborted execution as failed"
            );
        }
        ctx.alerts.record(&job, &execution.id, &msg);
    }
    Ok(())
}

/// Drive one recorded execution from pending to a terminal state.
async fn drive_execution(
    ctx: &ExecutionContext,
    job: &Job,
    execution_id: &ExecutionId,
) -> Result<()> {
    ctx.executions.mark_running(execution_id)?;

    let outcome = ctx.dispatcher.execute(&job.target, job.delivery_mode).await;

    if outcome.success {
        ctx.executions
            .mark_success(execution_id, outcome.http_status, outcome.retries)?;
        info!(
            job_id = %job.id,
            execution_id = %execution_id,
            http_status = outcome.http_status.unwrap_or_default(),
            duration_ms = outcome.duration.as_millis() as u64,
            retries = outcome.retries,
            "job executed"
        );
    } else {
        let error_msg = outcome.error.unwrap_or_else(|| "unknown error".to_string());
        ctx.executions
            .mark_failed(execution_id, outcome.http_status, &error_msg, outcome.retries)?;
        ctx.alerts.record(job, execution_id, &error_msg);
    }
    Ok(())
}
