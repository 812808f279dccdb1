use async_trait::async_trait;
use axum::http::HeaderValue;
use clap::Parser;
use serde_json::{json, Value};
use snailmail::config::Config;
use snailmail::location::LocationInput;
use snailmail::mailer::{Letter, MailError, Mailer};
use snailmail::resolver::{DistanceProvider, DistanceResult, ProviderError, Resolver};
use snailmail::server::{self, AppState};
use snailmail::TransportMode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const FRONTEND: &str = "http://localhost:5173";

struct Route {
    meters: f64,
}

#[async_trait]
impl DistanceProvider for Route {
    fn name(&self) -> &'static str {
        "route"
    }

    async fn distance(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<DistanceResult, ProviderError> {
        Ok(DistanceResult {
            distance_meters: self.meters,
            distance_text: format!("{} km", self.meters / 1000.0),
            duration_seconds: self.meters / 1000.0 / mode.speed_kmh() * 3600.0,
            origin: origin.label(),
            destination: destination.label(),
        })
    }
}

struct Offline;

#[async_trait]
impl DistanceProvider for Offline {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn distance(
        &self,
        _origin: &LocationInput,
        _destination: &LocationInput,
        _mode: TransportMode,
    ) -> Result<DistanceResult, ProviderError> {
        Err(ProviderError::Status("UNAVAILABLE".into()))
    }
}

#[derive(Default)]
struct Outbox {
    letters: Mutex<Vec<Letter>>,
}

#[async_trait]
impl Mailer for Outbox {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn send(&self, letter: &Letter) -> Result<(), MailError> {
        self.letters.lock().unwrap().push(letter.clone());
        Ok(())
    }

    async fn verify(&self) -> Result<bool, MailError> {
        Ok(true)
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    outbox: Arc<Outbox>,
    cancel: CancellationToken,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    async fn start(primary: Arc<dyn DistanceProvider>, fallback: Arc<dyn DistanceProvider>) -> Self {
        let config = Config::try_parse_from(["snailmail", "--tick-millis", "50"]).unwrap();
        let outbox = Arc::new(Outbox::default());
        let state = AppState::new(Resolver::new(primary, fallback), outbox.clone(), &config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        let server = tokio::spawn(server::serve_on(
            listener,
            state,
            HeaderValue::from_static(FRONTEND),
            cancel.clone(),
        ));

        Harness {
            base,
            client: reqwest::Client::new(),
            outbox,
            cancel,
            server,
        }
    }

    async fn routed() -> Self {
        Self::start(Arc::new(Route { meters: 10_000.0 }), Arc::new(Offline)).await
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.server.await.unwrap().unwrap();
    }
}

fn trip() -> Value {
    json!({
        "origin": {"address": "New York, NY"},
        "destination": {"lat": 34.0522, "lng": -118.2437},
    })
}

fn letter(seconds: f64, multiplier: f64) -> Value {
    json!({
        "from": "snail@example.com",
        "to": "friend@example.com",
        "subject": "Greetings",
        "message": "Sent the slow way.",
        "transportMode": "pigeon",
        "deliveryTimeSeconds": seconds,
        "speedMultiplier": multiplier,
    })
}

#[tokio::test]
async fn calculate_converts_distance_to_delivery_time() {
    let harness = Harness::routed().await;
    let mut body = trip();
    body["mode"] = json!("walking");

    let (status, body) = harness.post("/api/distance/calculate", body).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["distanceMeters"], 10_000.0);
    assert_eq!(data["deliveryTimeSeconds"], 7_200.0);
    assert_eq!(data["deliveryTimeText"], "2 hours");
    assert_eq!(data["transportMode"], "walking");
    assert_eq!(data["speedKmH"], 5.0);
    assert_eq!(data["isEstimate"], false);
    assert_eq!(data["method"], "google-maps");
    assert_eq!(data["origin"], "New York, NY");
    assert_eq!(data["destination"], "34.0522, -118.2437");

    harness.stop().await;
}

#[tokio::test]
async fn unknown_mode_is_rejected_with_valid_modes() {
    let harness = Harness::routed().await;
    let mut body = trip();
    body["mode"] = json!("flying");

    let (status, body) = harness.post("/api/distance/calculate", body).await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid transport mode");
    assert_eq!(
        body["message"],
        "mode must be one of: walking, swimming, pigeon, rock-climbing"
    );

    harness.stop().await;
}

#[tokio::test]
async fn calculate_requires_a_mode() {
    let harness = Harness::routed().await;

    let (status, body) = harness.post("/api/distance/calculate", trip()).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Missing transport mode");

    let mut empty = trip();
    empty["mode"] = json!("");
    let (status, body) = harness.post("/api/distance/calculate", empty).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing transport mode");

    harness.stop().await;
}

#[tokio::test]
async fn instant_letter_is_delivered() {
    let harness = Harness::routed().await;

    let (status, sent) = harness.post("/api/email/send", letter(0.0, 1.0)).await;
    assert_eq!(status, 200);
    let job_id = sent["data"]["jobId"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = harness.get(&format!("/api/email/status/{job_id}")).await;
        last = body;
        if last["data"]["status"] != "in-transit" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(last["data"]["status"], "delivered");
    assert_eq!(last["data"]["progress"], 100.0);
    assert_eq!(last["data"]["totalDeliverySeconds"], 0);
    assert_eq!(harness.outbox.letters.lock().unwrap().len(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn locations_without_address_or_coordinates_are_rejected() {
    let harness = Harness::routed().await;

    let (status, body) = harness
        .post(
            "/api/distance/calculate",
            json!({"origin": {}, "destination": {"address": "Paris"}, "mode": "walking"}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid location format");

    let (status, body) = harness
        .post(
            "/api/distance/calculate-all",
            json!({"origin": {"lat": 120.0, "lng": 0.0}, "destination": {"address": "Paris"}}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid location format");

    let (status, body) = harness
        .post("/api/distance/calculate-all", json!({"origin": {"address": "Paris"}}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing required fields");

    harness.stop().await;
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let harness = Harness::routed().await;

    let response = harness
        .client
        .post(format!("{}/api/distance/calculate", harness.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid request body");

    harness.stop().await;
}

#[tokio::test]
async fn fallback_estimate_is_flagged() {
    let harness =
        Harness::start(Arc::new(Offline), Arc::new(Route { meters: 3_000.0 })).await;
    let mut body = trip();
    body["mode"] = json!("swimming");

    let (status, body) = harness.post("/api/distance/calculate", body).await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["method"], "claude-estimate");
    assert_eq!(body["data"]["isEstimate"], true);
    assert_eq!(body["data"]["deliveryTimeText"], "1 hour");

    harness.stop().await;
}

#[tokio::test]
async fn exhausted_providers_are_a_server_error() {
    let harness = Harness::start(Arc::new(Offline), Arc::new(Offline)).await;
    let mut body = trip();
    body["mode"] = json!("pigeon");

    let (status, body) = harness.post("/api/distance/calculate", body).await;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Calculation failed");

    harness.stop().await;
}

#[tokio::test]
async fn calculate_all_matches_single_calculations() {
    let harness = Harness::routed().await;

    let (status, all) = harness.post("/api/distance/calculate-all", trip()).await;
    assert_eq!(status, 200);

    let modes = all["data"].as_object().unwrap();
    let mut keys: Vec<_> = modes.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["pigeon", "rock-climbing", "swimming", "walking"]);

    for (mode, estimate) in modes {
        let mut body = trip();
        body["mode"] = json!(mode);
        let (status, single) = harness.post("/api/distance/calculate", body).await;
        assert_eq!(status, 200);
        assert_eq!(&single["data"], estimate);
    }

    harness.stop().await;
}

#[tokio::test]
async fn health_and_index_respond() {
    let harness = Harness::routed().await;

    let (status, body) = harness.get("/api/distance/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].as_str().is_some());

    let (status, body) = harness.get("/api/email/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, body) = harness.get("/").await;
    assert_eq!(status, 200);
    assert_eq!(body["endpoints"]["emailStatus"], "GET /api/email/status/:jobId");

    harness.stop().await;
}

#[tokio::test]
async fn letter_travels_to_delivery() {
    let harness = Harness::routed().await;

    let (status, sent) = harness.post("/api/email/send", letter(2.0, 4.0)).await;
    assert_eq!(status, 200);
    let data = &sent["data"];
    assert_eq!(data["status"], "in-transit");
    assert_eq!(data["transportMode"], "pigeon");
    assert_eq!(data["estimatedDeliveryTime"], 0.5);
    assert_eq!(data["originalDeliveryTime"], 2.0);
    assert_eq!(data["speedMultiplier"], 4.0);
    let job_id = data["jobId"].as_str().unwrap().to_string();

    let (status, first) = harness.get(&format!("/api/email/status/{job_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(first["data"]["status"], "in-transit");
    assert_eq!(first["data"]["from"], "snail@example.com");

    let mut last = first;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_, body) = harness.get(&format!("/api/email/status/{job_id}")).await;
        let progress = body["data"]["progress"].as_f64().unwrap();
        assert!(progress >= last["data"]["progress"].as_f64().unwrap());
        last = body;
        if last["data"]["status"] != "in-transit" {
            break;
        }
    }

    assert_eq!(last["data"]["status"], "delivered");
    assert_eq!(last["data"]["progress"], 100.0);
    assert_eq!(last["data"]["remainingSeconds"], 0);

    let letters = harness.outbox.letters.lock().unwrap().clone();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].subject, "[SnailMail via pigeon] Greetings");
    assert_eq!(letters[0].to, "friend@example.com");

    let (status, jobs) = harness.get("/api/email/jobs").await;
    assert_eq!(status, 200);
    assert_eq!(jobs["data"].as_array().unwrap().len(), 1);
    assert_eq!(jobs["data"][0]["id"], job_id.as_str());

    harness.stop().await;
}

#[tokio::test]
async fn send_validation_errors() {
    let harness = Harness::routed().await;

    let mut bad_address = letter(10.0, 1.0);
    bad_address["to"] = json!("friend-at-example");
    let (status, body) = harness.post("/api/email/send", bad_address).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid email format");

    let (status, body) = harness
        .post("/api/email/send", json!({"from": "snail@example.com"}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing required fields");

    let mut bad_mode = letter(10.0, 1.0);
    bad_mode["transportMode"] = json!("teleport");
    let (status, body) = harness.post("/api/email/send", bad_mode).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid transport mode");

    let (status, _) = harness.post("/api/email/send", letter(10.0, 0.0)).await;
    assert_eq!(status, 400);

    let (_, jobs) = harness.get("/api/email/jobs").await;
    assert!(jobs["data"].as_array().unwrap().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let harness = Harness::routed().await;

    let (status, body) = harness.get("/api/email/status/no-such-job").await;

    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Job not found");

    harness.stop().await;
}

#[tokio::test]
async fn preflight_allows_the_frontend() {
    let harness = Harness::routed().await;

    let response = harness
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/email/send", harness.base),
        )
        .header("origin", FRONTEND)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 204);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], FRONTEND);
    assert_eq!(headers["access-control-allow-credentials"], "true");

    let (status, _) = harness.get("/api/distance/health").await;
    assert_eq!(status, 200);

    harness.stop().await;
}

#[tokio::test]
async fn shutdown_with_letters_in_transit() {
    let harness = Harness::routed().await;

    let (status, _) = harness.post("/api/email/send", letter(3_600.0, 1.0)).await;
    assert_eq!(status, 200);

    harness.stop().await;
}
