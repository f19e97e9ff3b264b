//! End-to-end scenarios: a real gateway in front of a stand-in data service.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use careline_core::{Access, ActivityRecord, AuditError, AuditSink, Claims, IdentityContext};
use careline_server::audit::AuditDispatcher;
use careline_server::auth::TokenVerifier;
use careline_server::relay::with_request_identity;
use careline_server::{
    AuthConfig, DownstreamConfig, NetworkModule, PipelineContext, ProtectedRoutes, RelayClient,
    ServerConfig,
};
use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<ActivityRecord>>,
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, record: ActivityRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Authorization headers seen by the stand-in data service, one per call.
type SeenCalls = Arc<Mutex<Vec<Option<String>>>>;

async fn spawn_data_service() -> (SocketAddr, SeenCalls) {
    let seen: SeenCalls = Arc::default();
    let recorder = Arc::clone(&seen);
    let app = Router::new().fallback(move |headers: HeaderMap| {
        let recorder = Arc::clone(&recorder);
        async move {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            recorder.lock().unwrap().push(auth);
            axum::Json(json!({ "items": [] }))
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn token(sub: &str, roles: &[&str]) -> String {
    let config = AuthConfig::default();
    let claims = json!({
        "sub": sub,
        "roles": roles,
        "exp": get_current_timestamp() + 3600,
        "iss": config.issuer,
        "aud": config.audience,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .unwrap()
}

fn downstream(addr: SocketAddr) -> DownstreamConfig {
    DownstreamConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(5),
    }
}

// ---------------------------------------------------------------------------
// Served gateway
// ---------------------------------------------------------------------------

#[tokio::test]
async fn served_gateway_relays_credential_and_audits_every_request() {
    let (data_addr, seen) = spawn_data_service().await;
    let sink = Arc::new(MemorySink::default());

    let config = ServerConfig {
        downstream: downstream(data_addr),
        ..ServerConfig::default()
    };
    let mut module = NetworkModule::new(config, Arc::clone(&sink) as Arc<dyn AuditSink>).unwrap();
    let port = module.start().await.unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(module.serve(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{port}");

    // Doctor searching patients: allowed, credential relayed verbatim.
    let doctor = token("11", &["Doctor"]);
    let response = client
        .get(format!("{base}/api/patients/search?q=smith"))
        .bearer_auth(&doctor)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<serde_json::Value>().await.unwrap()["items"], json!([]));

    // Nurse on an admin route: forbidden before any outbound call.
    let nurse = token("12", &["Nurse"]);
    let response = client
        .get(format!("{base}/api/admin/employees"))
        .bearer_auth(&nurse)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Health checks are not audited.
    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), [Some(format!("Bearer {doctor}"))]);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action(), "/api/patients/search");
    assert_eq!(records[0].details(), "Request from 127.0.0.1; status 200");
    assert_eq!(records[1].action(), "/api/admin/employees");
    assert_eq!(
        records[1].details(),
        "Request from 127.0.0.1; denied: forbidden"
    );
    assert!(records.iter().all(|r| r.service() == "HealthcareAPI"));
}

// ---------------------------------------------------------------------------
// Custom routes on the public registration surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nurse_denied_on_admin_only_route_makes_no_outbound_call() {
    let (data_addr, seen) = spawn_data_service().await;
    let relay = RelayClient::new(&downstream(data_addr)).unwrap();
    let (audit, mut records) = AuditDispatcher::channel(8);
    let ctx = PipelineContext::new(
        "HealthcareAPI",
        TokenVerifier::new(&AuthConfig::default()),
        audit,
    );

    let router = ProtectedRoutes::new(ctx)
        .route(
            "/api/reports/{id}",
            get(move || {
                let relay = relay.clone();
                async move {
                    relay
                        .request(Method::GET, "/api/reports/raw")
                        .send()
                        .await
                        .map(|r| r.status().as_u16().to_string())
                        .unwrap_or_default()
                }
            }),
            Access::roles(["admin"]).unwrap(),
        )
        .into_router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/reports/9?full=true")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("4", &["nurse"])))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(seen.lock().unwrap().is_empty());

    let record = records.recv().await.unwrap();
    assert_eq!(record.action(), "/api/reports/9");
    assert!(record.details().ends_with("denied: forbidden"));
    assert!(records.try_recv().is_err());
}

#[tokio::test]
async fn outbound_call_carries_caller_credential_verbatim() {
    let (data_addr, seen) = spawn_data_service().await;
    let relay = RelayClient::new(&downstream(data_addr)).unwrap();
    let identity = IdentityContext::new(
        "abc123",
        Claims {
            sub: "1".to_string(),
            exp: 0,
            roles: vec![],
        },
    );

    let status = with_request_identity(Some(Arc::new(identity)), async {
        relay
            .request(Method::GET, "/api/patients/search")
            .send()
            .await
            .unwrap()
            .status()
    })
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [Some("Bearer abc123".to_string())]
    );
}

#[tokio::test]
async fn public_route_relays_no_credential_for_anonymous_caller() {
    let (data_addr, seen) = spawn_data_service().await;
    let relay = RelayClient::new(&downstream(data_addr)).unwrap();
    let (audit, mut records) = AuditDispatcher::channel(8);
    let ctx = PipelineContext::new("svc", TokenVerifier::new(&AuthConfig::default()), audit);

    let router = ProtectedRoutes::new(ctx)
        .route(
            "/api/catalog",
            get(move || {
                let relay = relay.clone();
                async move {
                    relay
                        .request(Method::GET, "/api/catalog")
                        .send()
                        .await
                        .map(|r| r.status().as_u16().to_string())
                        .unwrap_or_default()
                }
            }),
            Access::Public,
        )
        .into_router();

    let response = router
        .oneshot(Request::builder().uri("/api/catalog").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(seen.lock().unwrap().as_slice(), [None]);
    assert_eq!(records.recv().await.unwrap().action(), "/api/catalog");
}
