//! Remote job state machine against a scripted server.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use forecast_common::RetrieveRequest;
use remote_client::{
    Body, JobState, MetadataQuery, Method, RemoteApi, RemoteError, RemoteJobClient, Reply,
    Result, Transport,
};
use reqwest::Url;
use serde_json::{json, Value};

// ============================================================================
// Scripted transport
// ============================================================================

/// Answers requests from a fixed script and records what was asked.
#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<(u16, String)>>,
    sent: Mutex<Vec<(&'static str, Method, String)>>,
    downloads: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: &[(u16, Value)]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|(code, body)| (*code, body.to_string()))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    /// Replies given as raw bodies, which need not be JSON.
    fn raw(replies: &[(u16, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|(code, body)| (*code, body.to_string()))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    fn sent(&self) -> Vec<(&'static str, Method, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, action: &'static str, method: Method, url: &Url, _body: Body) -> Result<Reply> {
        self.sent
            .lock()
            .unwrap()
            .push((action, method, url.to_string()));
        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        Ok(Reply {
            status,
            url: url.to_string(),
            body: Bytes::from(body),
        })
    }

    async fn download(&self, url: &Url, target: &Path) -> Result<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        std::fs::write(target, b"result")?;
        Ok(6)
    }
}

fn base() -> Url {
    Url::parse("https://remote.example/api/v1/").unwrap()
}

fn client(transport: Arc<Scripted>) -> RemoteJobClient {
    RemoteJobClient::new(RemoteApi::new(base(), transport))
        .with_poll_interval(Duration::ZERO)
        .with_progress(false)
}

fn input() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.grib");
    std::fs::write(&input, b"fields").unwrap();
    let output = dir.path().join("output.grib");
    (dir, input, output)
}

// ============================================================================
// Job lifecycle
// ============================================================================

#[tokio::test]
async fn test_queued_running_ready_downloads_once() {
    let transport = Scripted::new(&[
        (200, json!({"status": "success", "href": "jobs/new"})),
        (202, json!({"status": "QUEUED", "href": "jobs/42", "id": 42})),
        (200, json!({"status": "queued", "href": "jobs/42"})),
        (200, json!({"status": "running", "href": "jobs/42",
                     "progress": {"total": 10, "step": 3, "eta": "2m", "status": "running"}})),
        (200, json!({"status": "Running", "href": "jobs/42"})),
        (200, json!({"status": "ready", "href": "results/42.grib"})),
    ]);
    let (_dir, input, output) = input();

    let outcome = client(transport.clone())
        .run(&input, &output, &json!({"model": "test"}))
        .await
        .unwrap();

    assert_eq!(outcome.id.as_deref(), Some("42"));
    assert_eq!(outcome.bytes, 6);
    assert_eq!(std::fs::read(&output).unwrap(), b"result");
    assert_eq!(
        transport.downloads(),
        vec!["https://remote.example/api/v1/results/42.grib"]
    );
    assert_eq!(
        outcome.transitions,
        vec![
            JobState::Idle,
            JobState::Uploaded {
                href: "jobs/new".into()
            },
            JobState::Queued,
            JobState::Running,
            JobState::Ready,
        ]
    );

    let sent = transport.sent();
    assert_eq!(sent[0], ("upload", Method::Post, "https://remote.example/api/v1/upload".to_string()));
    assert_eq!(sent[1], ("submit", Method::Post, "https://remote.example/api/v1/jobs/new".to_string()));
    assert!(sent[2..].iter().all(|(action, method, _)| *action == "poll" && *method == Method::Get));
}

#[tokio::test]
async fn test_failed_job_never_downloads() {
    let transport = Scripted::new(&[
        (200, json!({"status": "success", "href": "jobs/new"})),
        (200, json!({"status": "queued", "href": "jobs/7", "id": "7"})),
        (200, json!({"status": "FAILED", "reason": "out of memory"})),
    ]);
    let (_dir, input, output) = input();

    let err = client(transport.clone())
        .run(&input, &output, &json!({}))
        .await
        .unwrap_err();

    match err {
        RemoteError::JobFailed { reason } => assert_eq!(reason.as_deref(), Some("out of memory")),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(transport.downloads().is_empty());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_upload_rejected_with_reason() {
    let transport = Scripted::new(&[(200, json!({"status": "error", "reason": "quota exceeded"}))]);
    let (_dir, input, output) = input();

    let err = client(transport.clone())
        .run(&input, &output, &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "upload rejected: error (quota exceeded)");
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_upload_needs_2xx_even_with_success_body() {
    let transport = Scripted::new(&[(503, json!({"status": "success", "href": "jobs/new"}))]);
    let (_dir, input, output) = input();

    let err = client(transport.clone())
        .run(&input, &output, &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Rejected { action: "upload", ref status, .. } if status == "HTTP 503"));
    assert_eq!(transport.sent().len(), 1);
    assert!(transport.downloads().is_empty());
}

#[tokio::test]
async fn test_bad_gateway_mid_poll_keeps_polling() {
    let transport = Scripted::raw(&[
        (200, r#"{"status": "success", "href": "jobs/new"}"#),
        (200, r#"{"status": "queued", "href": "jobs/9", "id": 9}"#),
        (200, r#"{"status": "queued", "href": "jobs/9"}"#),
        (502, "Bad Gateway"),
        (200, r#"{"status": "ready", "href": "results/9.grib"}"#),
    ]);
    let (_dir, input, output) = input();

    let outcome = client(transport.clone())
        .run(&input, &output, &json!({}))
        .await
        .unwrap();

    assert_eq!(
        transport.downloads(),
        vec!["https://remote.example/api/v1/results/9.grib"]
    );
    assert_eq!(transport.sent().len(), 5);
    assert_eq!(
        outcome.transitions[3],
        JobState::Other("https://remote.example/api/v1/jobs/9 502 bad gateway".into())
    );
    assert_eq!(outcome.transitions.last(), Some(&JobState::Ready));
}

#[tokio::test]
async fn test_submit_must_be_queued() {
    let transport = Scripted::new(&[
        (200, json!({"status": "success", "href": "jobs/new"})),
        (200, json!({"status": "rejected"})),
    ]);
    let (_dir, input, output) = input();

    let err = client(transport).run(&input, &output, &json!({})).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { action: "submit", .. }));
}

#[tokio::test]
async fn test_unauthorized_mid_poll_is_distinct_from_failure() {
    let transport = Scripted::new(&[
        (200, json!({"status": "success", "href": "jobs/new"})),
        (200, json!({"status": "queued", "href": "jobs/1"})),
        (401, json!({"status": "failed"})),
    ]);
    let (_dir, input, output) = input();

    let err = client(transport).run(&input, &output, &json!({})).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized));
    assert_eq!(err.to_string(), "Unauthorized Access. Check your token.");
}

// ============================================================================
// Other endpoints
// ============================================================================

#[tokio::test]
async fn test_models_and_metadata() {
    let transport = Scripted::new(&[
        (200, json!(["panguweather", "fourcastnet"])),
        (200, json!({"status": "error"})),
        (200, json!({"grid": [0.25, 0.25], "lagged": [-6, 0]})),
    ]);
    let api = RemoteApi::new(base(), transport.clone());

    assert_eq!(api.models().await.unwrap(), vec!["panguweather", "fourcastnet"]);
    assert!(api.models().await.unwrap().is_empty());

    let query = MetadataQuery::Many(vec!["grid".into(), "lagged".into()]);
    let meta = api.metadata("panguweather", "latest", &query).await.unwrap();
    assert_eq!(meta["lagged"], json!([-6, 0]));
    assert_eq!(
        transport.sent()[2].2,
        "https://remote.example/api/v1/metadata/panguweather/latest"
    );
}

#[tokio::test]
async fn test_patch_retrieve_request() {
    let transport = Scripted::new(&[
        (200, json!({"param": ["2t", "msl"], "levtype": "sfc"})),
        (200, json!({"status": "Error"})),
    ]);
    let api = RemoteApi::new(base(), transport);
    let request = RetrieveRequest::new().with("levtype", "sfc").with("param", vec!["2t"]);

    let patched = api.patch_retrieve_request(&json!({"model": "m"}), &request).await.unwrap();
    assert_eq!(patched.strings("param"), vec!["2t", "msl"]);

    let err = api.patch_retrieve_request(&json!({}), &request).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { action: "patch", ref status, .. } if status == "error"));
}
