//! End-to-end job lifecycle against a mock service.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use pcats_client::{
    AnalysisRequest, CateRequest, ClientConfig, ClientError, DynamicRequest, Job, JobClient, JobId,
    JobKind, JobStatus, PollPolicy, StageParams, StaticRequest,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{any, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, JobClient) {
    let server = MockServer::start().await;
    let client = JobClient::new(ClientConfig::default().with_url(format!("{}/api", server.uri())))
        .unwrap();
    (server, client)
}

fn data_file() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example1.csv");
    std::fs::write(&path, "Y,A,X\n1.2,0,3\n2.5,1,4\n0.7,0,1\n").unwrap();
    (dir, path)
}

fn simple_request(datafile: PathBuf) -> StaticRequest {
    StaticRequest::new(datafile, StageParams::new("Y", "A", "X", "X"))
}

fn fast_policy() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(50), Duration::from_secs(10))
}

fn status_body(state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": state }))
}

async fn status_requests(server: &MockServer, job: &str) -> usize {
    let status_path = format!("/api/job/{}/status", job);
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == status_path)
        .count()
}

#[tokio::test]
async fn test_static_job_submit_wait_fetch() {
    let (server, client) = setup().await;
    let (_dir, datafile) = data_file();

    Mock::given(method("POST"))
        .and(path("/api/staticgp"))
        .and(body_string_contains("name=\"outcome\""))
        .and(body_string_contains("name=\"data\"; filename=\"example1.csv\""))
        .and(body_string_contains("GP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobid": "j-100" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/job/j-100/status"))
        .respond_with(status_body("Pending"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job/j-100/status"))
        .respond_with(status_body("Done"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/job/j-100/print"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ATE: 1.05 (0.21, 1.88)\n"))
        .expect(1)
        .mount(&server)
        .await;

    let mut job = client.submit_static(&simple_request(datafile)).await.unwrap();
    assert_eq!(job.id().as_str(), "j-100");
    assert_eq!(job.kind(), Some(JobKind::Static));

    let status = client.wait_for_result(&mut job, &fast_policy()).await.unwrap();
    assert_eq!(status, JobStatus::Done);
    assert!(job.is_settled());
    assert_eq!(status_requests(&server, "j-100").await, 3);

    let result = client.fetch_result(&mut job).await.unwrap();
    assert_eq!(result.text, "ATE: 1.05 (0.21, 1.88)\n");
    assert_eq!(result.job_id, *job.id());

    // fetch_result on a settled job does not re-check the status
    assert_eq!(status_requests(&server, "j-100").await, 3);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_any_request() {
    let (server, client) = setup().await;
    let (_dir, datafile) = data_file();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut request = simple_request(datafile);
    request.run.burn_num = 0;

    let err = client.submit_static(&request).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref field, .. } if field == "burn_num"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_data_file_is_rejected_before_any_request() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .submit_static(&simple_request(dir.path().join("missing.csv")))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref field, .. } if field == "datafile"));
}

#[tokio::test]
async fn test_wait_times_out_and_stops_polling() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/slow/status"))
        .respond_with(status_body("Running"))
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("slow").unwrap());
    let policy = PollPolicy::fixed(Duration::from_millis(200), Duration::from_secs(2));

    let started = Instant::now();
    let err = client.wait_for_result(&mut job, &policy).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ClientError::Timeout { ref job_id, .. } if job_id == "slow"));
    assert!(elapsed >= Duration::from_millis(1900), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
    assert!(!job.is_settled());

    let polls = status_requests(&server, "slow").await;
    assert!((2..=11).contains(&polls), "polled {} times", polls);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(status_requests(&server, "slow").await, polls);
}

#[tokio::test]
async fn test_failed_job_reports_raw_state() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/bad/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Error",
            "message": "outcome column Y not found"
        })))
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("bad").unwrap());
    let err = client.wait_for_result(&mut job, &fast_policy()).await.unwrap_err();

    match err {
        ClientError::Job {
            job_id,
            state,
            message,
        } => {
            assert_eq!(job_id, "bad");
            assert_eq!(state, "Error");
            assert_eq!(message.as_deref(), Some("outcome column Y not found"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // A settled failure is reported again without another status request
    let again = client.wait_for_result(&mut job, &fast_policy()).await.unwrap_err();
    assert_eq!(again.exit_code(), 2);
    assert_eq!(status_requests(&server, "bad").await, 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried_while_polling() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/flaky/status"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job/flaky/status"))
        .respond_with(status_body("Done"))
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("flaky").unwrap());
    let status = client.wait_for_result(&mut job, &fast_policy()).await.unwrap();
    assert!(status.is_done());
    assert_eq!(status_requests(&server, "flaky").await, 3);
}

#[tokio::test]
async fn test_submission_failure_is_not_retried() {
    let (server, client) = setup().await;
    let (_dir, datafile) = data_file();

    Mock::given(method("POST"))
        .and(path("/api/staticgp"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker pool unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .submit_static(&simple_request(datafile))
        .await
        .unwrap_err();
    match err {
        ClientError::Submission { message } => {
            assert!(message.contains("500"), "{}", message);
            assert!(message.contains("worker pool unavailable"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_wait_is_idempotent_once_settled() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/j-7/status"))
        .respond_with(status_body("Done"))
        .expect(1)
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("j-7").unwrap());
    let first = client.wait_for_result(&mut job, &fast_policy()).await.unwrap();
    let second = client.wait_for_result(&mut job, &fast_policy()).await.unwrap();
    assert_eq!(first, second);

    let status = client.status(&mut job).await.unwrap();
    assert!(status.is_done());
}

#[tokio::test]
async fn test_fetch_result_before_done_is_not_ready() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/j-8/status"))
        .respond_with(status_body("Pending"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job/j-8/print"))
        .respond_with(ResponseTemplate::new(200).set_body_string("too early"))
        .expect(0)
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("j-8").unwrap());
    let err = client.fetch_result(&mut job).await.unwrap_err();
    assert!(matches!(err, ClientError::NotReady { ref state, .. } if state == "Pending"));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_cate_requires_done_parent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/p-1/status"))
        .respond_with(status_body("Running"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/job/p-1/staticgp_cate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobid": "c-1" })))
        .expect(0)
        .mount(&server)
        .await;

    let mut parent = Job::attach(JobId::new("p-1").unwrap());
    let contrast = CateRequest::new("X", "0", "1");
    let err = client.submit_cate(&mut parent, &contrast).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { .. }));
}

#[tokio::test]
async fn test_cate_on_done_parent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/p-2/status"))
        .respond_with(status_body("Done"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/job/p-2/staticgp_cate"))
        .and(body_string_contains("name=\"x\""))
        .and(body_string_contains("name=\"control_tr\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobid": "c-2" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut parent = Job::attach(JobId::new("p-2").unwrap());
    let contrast = CateRequest::new("X", "0", "1").with_pr_values("1,2,3");
    let child = client.submit_cate(&mut parent, &contrast).await.unwrap();

    assert_eq!(child.id().as_str(), "c-2");
    assert_eq!(child.kind(), Some(JobKind::Cate));
    assert!(parent.is_settled());
}

#[tokio::test]
async fn test_unknown_job() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/nope/status"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("nope").unwrap());
    let err = client.wait_for_result(&mut job, &fast_policy()).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownJob { ref job_id } if job_id == "nope"));
    assert_eq!(status_requests(&server, "nope").await, 1);
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let client = JobClient::new(
        ClientConfig::default()
            .with_url(format!("{}/api", server.uri()))
            .with_token("s3cret"),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/job/t-1/status"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(status_body("Queued"))
        .expect(1)
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("t-1").unwrap());
    let status = client.status(&mut job).await.unwrap();
    assert_eq!(
        status,
        JobStatus::Pending {
            state: "Queued".to_string()
        }
    );
}

#[tokio::test]
async fn test_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/t-2/status"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let mut job = Job::attach(JobId::new("t-2").unwrap());
    let err = client.status(&mut job).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized { ref message } if message == "token expired"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_dynamic_job_uses_stage_prefixes() {
    let (server, client) = setup().await;
    let (_dir, datafile) = data_file();

    Mock::given(method("POST"))
        .and(path("/api/dynamicgp"))
        .and(body_string_contains("name=\"stg1_outcome\""))
        .and(body_string_contains("name=\"stg2_treatment\""))
        .and(body_string_contains("name=\"stg2_x_confounding\""))
        .and(body_string_contains("name=\"data\"; filename=\"example1.csv\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobid": "d-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let stg1 = StageParams::new("Y1", "A0", "X", "X");
    let stg2 = StageParams::new("Y2", "A1", "X,Y1", "X,Y1");
    let request = AnalysisRequest::Dynamic(DynamicRequest::new(datafile, stg1, stg2));

    let job = client.submit(&request).await.unwrap();
    assert_eq!(job.id().as_str(), "d-1");
    assert_eq!(job.kind(), Some(JobKind::Dynamic));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains("name=\"outcome\""), "unprefixed stage field sent");
    assert!(body.contains("name=\"burn_num\""));
}

#[tokio::test]
async fn test_cate_conflict_is_validation() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/job/p-3/status"))
        .respond_with(status_body("Done"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/job/p-3/staticgp_cate"))
        .respond_with(ResponseTemplate::new(409).set_body_string("parent results expired"))
        .expect(1)
        .mount(&server)
        .await;

    let mut parent = Job::attach(JobId::new("p-3").unwrap());
    let contrast = CateRequest::new("X", "0", "1");
    let err = client.submit_cate(&mut parent, &contrast).await.unwrap_err();

    match err {
        ClientError::Validation { field, reason } => {
            assert_eq!(field, "jobid");
            assert!(reason.contains("parent results expired"), "{}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
