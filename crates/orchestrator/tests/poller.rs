mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{done, harness, harness_with, status, Harness, MockAdapter, Scripted};
use gen3d_core::task::TaskStatus;
use gen3d_core::types::DbId;
use gen3d_orchestrator::{PollerConfig, SweepReport, TaskPoller};

fn poller(h: &Harness, interval: Duration, concurrency: usize) -> TaskPoller {
    TaskPoller::new(
        Arc::clone(&h.service),
        PollerConfig {
            interval,
            concurrency,
        },
    )
}

async fn wait_for_status(h: &Harness, id: DbId, expected: TaskStatus) {
    for _ in 0..200 {
        if h.service.get_task(id).await.unwrap().status == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {expected}");
}

#[tokio::test]
async fn sweep_caps_concurrency() {
    let h = harness(MockAdapter::new().with_query_delay(Duration::from_millis(50)));
    for i in 0..12 {
        h.submit(&format!("chair {i}")).await;
    }

    let report = poller(&h, Duration::from_secs(3600), 3)
        .sweep()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 12);
    assert_eq!(report.unchanged, 12);
    assert_eq!(h.adapter.queries(), 12);
    assert!(h.adapter.max_in_flight() <= 3, "{}", h.adapter.max_in_flight());
    assert!(h.adapter.max_in_flight() >= 2);
}

#[tokio::test]
async fn sweep_tallies_outcomes() {
    let h = harness(MockAdapter::new());
    let running = h.submit("running").await;
    let finished = h.submit("finished").await;
    let broken = h.submit("broken").await;
    h.submit("waiting").await;
    h.adapter
        .script(&running.provider_task_id, vec![status(TaskStatus::Run, 20)]);
    h.adapter
        .script(&finished.provider_task_id, vec![done("https://cdn.example/m.glb")]);
    h.adapter
        .script(&broken.provider_task_id, vec![Scripted::Unavailable]);

    let report = poller(&h, Duration::from_secs(3600), 2)
        .sweep()
        .await
        .unwrap();

    assert_eq!(
        report,
        SweepReport {
            dispatched: 4,
            updated: 2,
            unchanged: 1,
            skipped: 0,
            failed: 1,
            timed_out: 0,
        }
    );
    assert_eq!(h.service.pending_count().await.unwrap(), 3);
    assert_eq!(h.adapter.downloads(), 1);
}

#[tokio::test]
async fn slow_queries_time_out_and_stay_pending() {
    let h = harness_with(
        MockAdapter::new().with_query_delay(Duration::from_millis(500)),
        |service| service.with_query_timeout(Duration::from_millis(50)),
    );
    let task = h.submit("slow").await;
    h.adapter
        .script(&task.provider_task_id, vec![status(TaskStatus::Run, 50)]);

    let report = poller(&h, Duration::from_secs(3600), 1)
        .sweep()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        h.service.get_task(task.id).await.unwrap().status,
        TaskStatus::Wait
    );
}

#[tokio::test]
async fn download_longer_than_query_deadline_still_completes() {
    let h = harness_with(
        MockAdapter::new().with_download_delay(Duration::from_millis(200)),
        |service| service.with_query_timeout(Duration::from_millis(50)),
    );
    let task = h.submit("big mesh").await;
    h.adapter
        .script(&task.provider_task_id, vec![done("https://cdn.example/m.glb")]);

    let report = poller(&h, Duration::from_secs(3600), 1)
        .sweep()
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.timed_out, 0);
    let finished = h.service.get_task(task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Done);
    assert!(finished.has_artifacts());
    assert_eq!(h.adapter.downloads(), 1);

    // Nothing left for the next sweep to download again.
    let again = poller(&h, Duration::from_secs(3600), 1)
        .sweep()
        .await
        .unwrap();
    assert_eq!(again.dispatched, 0);
    assert_eq!(h.adapter.downloads(), 1);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let h = harness(MockAdapter::new());
    let poller = poller(&h, Duration::from_secs(3600), 2);

    assert!(!poller.is_running().await);
    assert!(poller.start().await);
    assert!(!poller.start().await);
    assert!(poller.is_running().await);

    assert!(poller.stop().await);
    assert!(!poller.stop().await);
    assert!(!poller.is_running().await);

    assert!(poller.start().await);
    assert!(poller.stop().await);
}

#[tokio::test]
async fn stop_waits_for_in_flight_sweep() {
    let h = harness(MockAdapter::new().with_query_delay(Duration::from_millis(200)));
    let task = h.submit("a chair").await;
    h.adapter
        .script(&task.provider_task_id, vec![status(TaskStatus::Run, 50)]);

    let poller = poller(&h, Duration::from_secs(3600), 2);
    assert!(poller.start().await);
    // Let the first sweep reach the provider.
    for _ in 0..100 {
        if h.adapter.queries() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.adapter.queries(), 1);
    assert!(poller.stop().await);

    let stored = h.service.get_task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Run);
    assert_eq!(stored.progress, 50);
    assert!(!poller.is_running().await);
}

#[tokio::test]
async fn first_sweep_runs_on_start() {
    let h = harness(MockAdapter::new());
    let task = h.submit("a chair").await;
    h.adapter
        .script(&task.provider_task_id, vec![status(TaskStatus::Run, 30)]);

    let poller = poller(&h, Duration::from_secs(3600), 2);
    poller.start().await;
    wait_for_status(&h, task.id, TaskStatus::Run).await;
    poller.stop().await;

    assert_eq!(h.service.get_task(task.id).await.unwrap().progress, 30);
}

#[tokio::test]
async fn loop_drives_tasks_to_completion() {
    let h = harness(MockAdapter::new());
    let task = h.submit("a red chair").await;
    h.adapter.script(
        &task.provider_task_id,
        vec![
            status(TaskStatus::Run, 10),
            status(TaskStatus::Run, 60),
            done("https://cdn.example/m.glb"),
        ],
    );

    let poller = poller(&h, Duration::from_millis(20), 2);
    poller.start().await;
    wait_for_status(&h, task.id, TaskStatus::Done).await;
    poller.stop().await;

    let finished = h.service.get_task(task.id).await.unwrap();
    assert!(finished.has_artifacts());
    assert_eq!(h.adapter.downloads(), 1);
    assert_eq!(h.service.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn status_reports_pending_count() {
    let h = harness(MockAdapter::new());
    h.submit("one").await;
    h.submit("two").await;

    let poller = poller(&h, Duration::from_secs(7), 2);
    let status = poller.status().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.interval, Duration::from_secs(7));
    assert_eq!(status.pending_count, 2);
}
