use std::net::SocketAddr;
use std::time::Duration;

use greetd::shutdown::{DrainOutcome, DrainState, ShutdownError};
use greetd::{inflight, server, shutdown};
use tokio::io::AsyncWriteExt;

struct TestServer {
    addr: SocketAddr,
    server: server::Server,
    drain: shutdown::Drain,
    signal: shutdown::ShutdownSignal,
}

impl TestServer {
    async fn start(grace: Duration, close: Duration) -> Self {
        let tracker = inflight::InflightTracker::new();
        let signal = shutdown::ShutdownSignal::new();
        let drain = shutdown::Drain::new(signal.clone(), tracker.clone(), grace, close);
        let deps = server::Dependencies::new(tracker, signal.clone(), drain.state());
        let server = server::Server::new("127.0.0.1:0".to_string(), deps);

        let listener = server.bind().await.expect("fail bind listener");
        let addr = listener.local_addr().expect("fail get local addr");
        {
            let server = server.clone();
            tokio::spawn(async move {
                server.serve(listener).await;
            });
        }

        Self {
            addr,
            server,
            drain,
            signal,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn spawn_wait_request(
        &self,
        wait_time: u64,
    ) -> tokio::task::JoinHandle<(reqwest::StatusCode, serde_json::Value)> {
        let url = self.url("/wait");
        tokio::spawn(async move {
            let resp = reqwest::Client::new()
                .post(url)
                .json(&serde_json::json!({ "wait_time": wait_time }))
                .send()
                .await
                .expect("wait request failed");
            let status = resp.status();
            let body = resp.json().await.expect("wait response not json");
            (status, body)
        })
    }
}

#[tokio::test]
async fn test_ping_and_ready() {
    let ts = TestServer::start(Duration::from_secs(5), Duration::from_secs(5)).await;

    let resp = reqwest::get(ts.url("/ping")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "pong");

    let resp = reqwest::get(ts.url("/ready")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ready");
}

#[tokio::test]
async fn test_greet_endpoint() {
    let ts = TestServer::start(Duration::from_secs(5), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .post(ts.url("/greet"))
        .json(&serde_json::json!({ "name": "Ada", "entity_type": "human" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Greetings, Ada, earthling");

    let body: serde_json::Value = client
        .post(ts.url("/greet"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Greetings, mysterious being...");
}

#[tokio::test]
async fn test_record_auth_and_field_mask() {
    let ts = TestServer::start(Duration::from_secs(5), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    // no auth header at all is rejected by the middleware
    let resp = client.get(ts.url("/record")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // any header passes auth but gets the masked record: only record.public
    // survives, id and private are absent
    let body: serde_json::Value = client
        .get(ts.url("/record"))
        .header("Authorization", "guest")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["public"], "public value");
    assert!(body["record"].get("private").is_none());
    assert!(body.get("id").is_none());

    // the admin value sees the full record
    let body: serde_json::Value = client
        .get(ts.url("/record"))
        .header("Authorization", "valid")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], "some_id_value");
    assert_eq!(body["record"]["private"], "private value");
}

#[tokio::test]
async fn test_wait_completes_normally() {
    let ts = TestServer::start(Duration::from_secs(5), Duration::from_secs(5)).await;
    let (status, body) = ts.spawn_wait_request(0).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["message"], "waited 0 seconds");
}

// scenario: all inflight requests finish inside the grace period
#[tokio::test]
async fn test_drain_completes_when_requests_finish() {
    let ts = TestServer::start(Duration::from_secs(3), Duration::from_secs(5)).await;

    let request = ts.spawn_wait_request(1);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = ts.drain.run(&ts.server).await.unwrap();
    assert_eq!(outcome, Some(DrainOutcome::Completed));
    assert!(!ts.signal.is_fired());

    let (status, body) = request.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["message"], "waited 1 seconds");
    assert_eq!(*ts.drain.state().borrow(), DrainState::Closed);
}

// scenario: a request outlasting the grace period is aborted with progress
#[tokio::test]
async fn test_drain_aborts_slow_request() {
    let ts = TestServer::start(Duration::from_secs(1), Duration::from_secs(5)).await;

    let request = ts.spawn_wait_request(30);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = ts.drain.run(&ts.server).await.unwrap();
    assert_eq!(outcome, Some(DrainOutcome::ForcedAbort));
    assert!(ts.signal.is_fired());

    let (status, body) = request.await.unwrap();
    assert_eq!(status, 409);
    assert_eq!(body["requested_secs"], 30);
    let elapsed = body["elapsed_secs"].as_u64().unwrap();
    assert!(elapsed <= 2, "progress {elapsed}s should be near the grace period");
    assert_eq!(*ts.drain.state().borrow(), DrainState::Closed);
}

// scenario: overlapping fast and slow requests; only the slow one aborts and
// the listener closes after both resolved
#[tokio::test]
async fn test_drain_mixed_requests_and_listener_close() {
    let ts = TestServer::start(Duration::from_secs(2), Duration::from_secs(5)).await;

    let fast = ts.spawn_wait_request(1);
    let slow = ts.spawn_wait_request(30);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = ts.drain.run(&ts.server).await.unwrap();
    assert_eq!(outcome, Some(DrainOutcome::ForcedAbort));

    let (fast_status, fast_body) = fast.await.unwrap();
    assert_eq!(fast_status, 200);
    assert_eq!(fast_body["message"], "waited 1 seconds");

    let (slow_status, slow_body) = slow.await.unwrap();
    assert_eq!(slow_status, 409);
    assert_eq!(slow_body["requested_secs"], 30);

    // listener is closed, new connections are refused
    assert_eq!(*ts.drain.state().borrow(), DrainState::Closed);
    assert!(reqwest::get(ts.url("/ping")).await.is_err());
}

// scenario: duplicate termination trigger is swallowed
#[tokio::test]
async fn test_double_trigger_runs_single_episode() {
    let ts = TestServer::start(Duration::from_secs(2), Duration::from_secs(5)).await;

    let (first, second) = tokio::join!(ts.drain.run(&ts.server), ts.drain.run(&ts.server));
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&Some(DrainOutcome::Completed)));
    assert!(outcomes.contains(&None));
    assert!(!ts.signal.is_fired());
}

// a connection that never finishes its request outlives the close deadline;
// the bounded close fails and the episode reports the fatal error
#[tokio::test]
async fn test_listener_close_timeout_is_fatal() {
    let ts = TestServer::start(Duration::from_millis(200), Duration::from_millis(500)).await;

    // half-sent request body: the connection is mid-request, so the graceful
    // close has to wait for it and the bound elapses
    let mut stalled = tokio::net::TcpStream::connect(ts.addr)
        .await
        .expect("fail connect");
    stalled
        .write_all(
            b"POST /wait HTTP/1.1\r\n\
              host: localhost\r\n\
              content-type: application/json\r\n\
              content-length: 64\r\n\r\n\
              {\"wait_",
        )
        .await
        .expect("fail write");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = ts
        .drain
        .run(&ts.server)
        .await
        .expect_err("bounded close should time out");
    assert!(matches!(err, ShutdownError::ListenerClose(_)));

    // the episode never reached Closed
    assert_eq!(*ts.drain.state().borrow(), DrainState::ListenerClosing);
    drop(stalled);
}

#[tokio::test]
async fn test_ready_reports_draining() {
    let ts = TestServer::start(Duration::from_secs(2), Duration::from_secs(5)).await;

    let request = ts.spawn_wait_request(30);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let episode = {
        let drain = ts.drain.clone();
        let server = ts.server.clone();
        tokio::spawn(async move { drain.run(&server).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resp = reqwest::get(ts.url("/ready")).await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.text().await.unwrap(), "draining");

    let outcome = episode.await.unwrap().unwrap();
    assert_eq!(outcome, Some(DrainOutcome::ForcedAbort));
    let (status, _) = request.await.unwrap();
    assert_eq!(status, 409);
}
