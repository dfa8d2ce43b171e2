//! Poll loop against a scripted HTTP API

mod common;

use common::{Reply, ScriptedApi};
use fengshui_client::poller::BackoffConfig;
use fengshui_client::{
    poll_job, ApiClient, PollEvent, PollOutcome, PollUpdate, PollerConfig, PollerSupervisor,
};
use fengshui_core::JobStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(10),
        backoff: None,
    }
}

async fn client_for(api: &ScriptedApi) -> ApiClient {
    let base = api.start().await;
    ApiClient::new(base, Some(Duration::from_secs(5))).unwrap()
}

async fn poll_until_done(client: &ApiClient, job_id: &str, config: &PollerConfig) -> PollOutcome {
    let cancel = CancellationToken::new();
    poll_job(client, client.base_url(), job_id, config, &cancel, |_| {}).await
}

#[tokio::test]
async fn test_completed_exposes_download_url() {
    let api = ScriptedApi::default();
    let script = vec![Reply::processing(), Reply::completed("room_1.glb")];
    api.script_job("job-1", script);
    let client = client_for(&api).await;

    let mut updates = Vec::new();
    let outcome = poll_job(
        &client,
        client.base_url(),
        "job-1",
        &fast(),
        &CancellationToken::new(),
        |e| updates.push(e.update),
    )
    .await;

    let expected_url = format!("{}/models/room_1.glb", client.base_url());
    assert_eq!(
        outcome,
        PollOutcome::Completed {
            filename: "room_1.glb".into(),
            url: expected_url.clone(),
        }
    );
    assert_eq!(
        updates,
        vec![
            PollUpdate::Status(JobStatus::Processing),
            PollUpdate::Completed {
                filename: "room_1.glb".into(),
                url: expected_url,
            },
        ]
    );
    assert_eq!(api.hits("job-1"), 2);
}

#[tokio::test]
async fn test_failed_surfaces_server_error() {
    let api = ScriptedApi::default();
    let script = vec![Reply::failed(Some("Mesh reconstruction diverged"))];
    api.script_job("job-2", script);
    let client = client_for(&api).await;

    let outcome = poll_until_done(&client, "job-2", &fast()).await;
    assert_eq!(
        outcome,
        PollOutcome::Failed {
            message: "Mesh reconstruction diverged".into()
        }
    );
}

#[tokio::test]
async fn test_failed_without_error_uses_fallback() {
    let api = ScriptedApi::default();
    api.script_job("job-3", vec![Reply::failed(None)]);
    let client = client_for(&api).await;

    let outcome = poll_until_done(&client, "job-3", &fast()).await;
    assert_eq!(
        outcome,
        PollOutcome::Failed {
            message: "Model generation failed".into()
        }
    );
}

#[tokio::test]
async fn test_server_errors_do_not_stop_polling() {
    let api = ScriptedApi::default();
    api.script_job(
        "job-4",
        vec![
            Reply::Error(500),
            Reply::Error(502),
            Reply::processing(),
            Reply::completed("late.glb"),
        ],
    );
    let client = client_for(&api).await;

    let config = PollerConfig {
        interval: Duration::from_millis(10),
        backoff: Some(BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }),
    };
    match poll_until_done(&client, "job-4", &config).await {
        PollOutcome::Completed { filename, .. } => assert_eq!(filename, "late.glb"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(api.hits("job-4"), 4);
}

#[tokio::test]
async fn test_unreachable_api_retries_until_cancelled() {
    // nothing listens on this port once the listener is dropped
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = ApiClient::new(base, None).unwrap();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    let base = client.base_url();
    let outcome = poll_job(&client, base, "job-5", &fast(), &cancel, |_| {}).await;
    assert_eq!(outcome, PollOutcome::Cancelled);
}

#[tokio::test]
async fn test_switching_jobs_stops_previous_loop() {
    let api = ScriptedApi::default();
    api.script_job("old", vec![Reply::processing()]);
    api.script_job("new", vec![Reply::processing()]);
    let client = Arc::new(client_for(&api).await);

    let events: Arc<Mutex<Vec<PollEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut supervisor = PollerSupervisor::new(
        client.clone(),
        client.base_url(),
        fast(),
        Arc::new(move |e| sink.lock().unwrap().push(e)),
    );

    supervisor.watch(Some("old"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(api.hits("old") >= 2);

    supervisor.watch(Some("new"));
    // let any request already in flight land
    tokio::time::sleep(Duration::from_millis(30)).await;
    let old_hits = api.hits("old");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(api.hits("old"), old_hits);
    assert!(api.hits("new") >= 2);

    let events = events.lock().unwrap().clone();
    assert!(events.iter().any(|e| e.job_id == "old"));
    for event in &events {
        assert_eq!(supervisor.accept(event), event.job_id == "new");
    }
}

#[tokio::test]
async fn test_dropping_supervisor_stops_polling() {
    let api = ScriptedApi::default();
    api.script_job("job-6", vec![Reply::processing()]);
    let client = Arc::new(client_for(&api).await);

    let mut supervisor =
        PollerSupervisor::new(client.clone(), client.base_url(), fast(), Arc::new(|_| {}));
    supervisor.watch(Some("job-6"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    drop(supervisor);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let hits = api.hits("job-6");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.hits("job-6"), hits);
}
