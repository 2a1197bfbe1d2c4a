use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chime_core::config::DispatchConfig;
use chime_core::types::{CreateJobRequest, DeliveryMode, ExecutionStatus, Job, UpdateJobRequest};
use chime_scheduler::{AlertLog, HttpDispatcher, Scheduler, SchedulerError};
use chime_store::{ExecutionStore, JobStore};

fn open_stores() -> (JobStore, ExecutionStore) {
    let jobs_conn = rusqlite::Connection::open_in_memory().expect("open jobs db");
    chime_store::db::init_db(&jobs_conn).expect("init jobs schema");
    let executions_conn = rusqlite::Connection::open_in_memory().expect("open executions db");
    chime_store::db::init_db(&executions_conn).expect("init executions schema");
    (JobStore::new(jobs_conn), ExecutionStore::new(executions_conn))
}

fn scheduler_with(jobs: JobStore, executions: ExecutionStore, alerts: AlertLog) -> Scheduler {
    let dispatcher = HttpDispatcher::new(&DispatchConfig {
        timeout_secs: 5,
        max_attempts: 3,
        retry_delay_ms: 50,
    });
    Scheduler::new(jobs, executions, dispatcher, alerts)
}

fn create_job(jobs: &JobStore, schedule: &str, target: &str) -> Job {
    jobs.create(&CreateJobRequest {
        schedule: schedule.to_string(),
        target: target.to_string(),
        delivery_mode: DeliveryMode::AtLeastOnce,
    })
    .expect("create job")
}

fn deactivate(jobs: &JobStore, job: &Job) {
    jobs.update(
        &job.id,
        &UpdateJobRequest {
            active: Some(false),
            ..Default::default()
        },
    )
    .expect("update job")
    .expect("job exists");
}

#[tokio::test]
async fn manual_execution_records_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "0 0 0 1 1 *", &format!("{}/hook", server.uri()));
    let alerts = AlertLog::new();
    let scheduler = scheduler_with(jobs, executions.clone(), alerts.clone());

    scheduler.execute_job(&job, true).await.expect("execution");

    let history = executions.last_for_job(&job.id, 5).expect("history");
    assert_eq!(history.len(), 1);
    let execution = &history[0];
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.status.is_terminal());
    assert_eq!(execution.http_status, Some(200));
    assert_eq!(execution.retry_count, 0);
    assert!(execution.duration_ms.is_some());
    assert!(execution.error.is_none());
    assert!(alerts.recent(10).is_empty());
}

#[tokio::test]
async fn failed_execution_records_failure_and_alerts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (jobs, executions) = open_stores();
    let alerts = AlertLog::new();
    let job = create_job(&jobs, "0 0 0 1 1 *", &format!("{}/hook", server.uri()));
    let scheduler = scheduler_with(jobs, executions.clone(), alerts.clone());

    scheduler.execute_job(&job, true).await.expect("execution");

    let history = executions.last_for_job(&job.id, 5).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Failed);
    assert_eq!(history[0].http_status, Some(404));
    assert_eq!(history[0].retry_count, 0);
    assert_eq!(history[0].error.as_deref(), Some("HTTP 404: Not Found"));

    let recorded = alerts.for_job(&job.id);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].execution_id, history[0].id);
    assert_eq!(recorded[0].error, "HTTP 404: Not Found");
}

#[tokio::test]
async fn execution_for_missing_job_is_skipped() {
    let (jobs, executions) = open_stores();
    let alerts = AlertLog::new();
    let job = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/hook");
    assert!(jobs.delete(&job.id).expect("delete job"));

    let scheduler = scheduler_with(jobs, executions.clone(), alerts.clone());
    scheduler.execute_job(&job, true).await.expect("skip is ok");

    assert!(executions.last_for_job(&job.id, 5).expect("history").is_empty());
    assert!(alerts.recent(10).is_empty());
}

#[tokio::test]
async fn execution_for_deactivated_job_is_skipped() {
    let (jobs, executions) = open_stores();
    let alerts = AlertLog::new();
    let job = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/hook");
    deactivate(&jobs, &job);

    let scheduler = scheduler_with(jobs, executions.clone(), alerts.clone());
    // The handle still says active; the fresh read at execution time wins.
    scheduler.execute_job(&job, true).await.expect("skip is ok");

    assert!(executions.last_for_job(&job.id, 5).expect("history").is_empty());
    assert!(alerts.recent(10).is_empty());
}

#[tokio::test]
async fn invalid_schedule_is_rejected() {
    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "*/5 * * * *", "http://127.0.0.1:1/hook");
    let scheduler = scheduler_with(jobs, executions, AlertLog::new());

    let result = scheduler.schedule_job(&job);
    assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));
    assert!(!scheduler.is_scheduled(&job.id));
}

#[tokio::test]
async fn schedule_then_unschedule_leaves_no_trigger() {
    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/hook");
    let scheduler = scheduler_with(jobs, executions, AlertLog::new());

    scheduler.schedule_job(&job).expect("schedule");
    assert!(scheduler.is_scheduled(&job.id));

    scheduler.unschedule_job(&job.id);
    assert!(!scheduler.is_scheduled(&job.id));

    // Unscheduling a job with no trigger is a no-op.
    scheduler.unschedule_job(&job.id);
    assert_eq!(scheduler.trigger_count(), 0);
}

#[tokio::test]
async fn scheduling_inactive_job_removes_existing_trigger() {
    let (jobs, executions) = open_stores();
    let mut job = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/hook");
    let scheduler = scheduler_with(jobs, executions, AlertLog::new());

    scheduler.schedule_job(&job).expect("schedule");
    assert!(scheduler.is_scheduled(&job.id));

    job.active = false;
    scheduler.schedule_job(&job).expect("inactive is ok");
    assert!(!scheduler.is_scheduled(&job.id));
}

#[tokio::test]
async fn rescheduling_replaces_the_existing_trigger() {
    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/hook");
    let scheduler = scheduler_with(jobs, executions, AlertLog::new());

    scheduler.schedule_job(&job).expect("first schedule");
    scheduler.schedule_job(&job).expect("second schedule");
    assert_eq!(scheduler.trigger_count(), 1);
}

#[tokio::test]
async fn trigger_fires_execution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "* * * * * *", &format!("{}/hook", server.uri()));
    let scheduler = scheduler_with(jobs, executions.clone(), AlertLog::new());

    scheduler.schedule_job(&job).expect("schedule");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown();

    let history = executions.last_for_job(&job.id, 10).expect("history");
    assert!(!history.is_empty(), "every-second job should have fired");
    assert!(history.iter().any(|e| e.status == ExecutionStatus::Success));
}

#[tokio::test]
async fn slow_target_does_not_delay_next_fire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "* * * * * *", &format!("{}/hook", server.uri()));
    let scheduler = scheduler_with(jobs, executions.clone(), AlertLog::new());

    scheduler.schedule_job(&job).expect("schedule");
    tokio::time::sleep(Duration::from_millis(3200)).await;
    scheduler.shutdown();

    // A 2s response against a 1s cadence still produces overlapping firings.
    let history = executions.last_for_job(&job.id, 10).expect("history");
    assert!(
        history.len() >= 2,
        "expected overlapping firings, got {}",
        history.len()
    );
}

#[tokio::test]
async fn shutdown_stops_triggers_and_is_idempotent() {
    let (jobs, executions) = open_stores();
    let first = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/a");
    let second = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/b");
    let scheduler = scheduler_with(jobs, executions, AlertLog::new());

    scheduler.schedule_job(&first).expect("schedule");
    scheduler.schedule_job(&second).expect("schedule");
    assert_eq!(scheduler.trigger_count(), 2);

    scheduler.shutdown();
    assert_eq!(scheduler.trigger_count(), 0);

    scheduler.shutdown();
    assert_eq!(scheduler.trigger_count(), 0);
}

#[tokio::test]
async fn load_active_jobs_schedules_only_valid_active_jobs() {
    let (jobs, executions) = open_stores();
    let first = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/a");
    let second = create_job(&jobs, "0 30 2 * * *", "http://127.0.0.1:1/b");
    create_job(&jobs, "bad schedule", "http://127.0.0.1:1/c");
    let inactive = create_job(&jobs, "0 0 0 1 1 *", "http://127.0.0.1:1/d");
    deactivate(&jobs, &inactive);

    let scheduler = scheduler_with(jobs, executions, AlertLog::new());
    let scheduled = scheduler.load_active_jobs().expect("load");

    assert_eq!(scheduled, 2);
    assert_eq!(scheduler.trigger_count(), 2);
    assert!(scheduler.is_scheduled(&first.id));
    assert!(scheduler.is_scheduled(&second.id));
    assert!(!scheduler.is_scheduled(&inactive.id));
}

#[tokio::test]
async fn detached_execution_completes_in_background() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (jobs, executions) = open_stores();
    let job = create_job(&jobs, "0 0 0 1 1 *", &format!("{}/hook", server.uri()));
    let scheduler = scheduler_with(jobs, executions.clone(), AlertLog::new());

    scheduler.execute_job(&job, false).await.expect("spawn");

    let mut history = Vec::new();
    for _ in 0..40 {
        history = executions.last_for_job(&job.id, 5).expect("history");
        if history.iter().any(|e| e.status.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Success);
}
