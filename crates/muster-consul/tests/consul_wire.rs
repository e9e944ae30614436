use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
};
use muster::{LockSnowflakeGenerator, SnowflakeId, SystemClock};
use muster_consul::{
    CheckTiming, ConsulCatalog, Error, Lifecycle, Registrar, ServiceDescriptor, TOKEN_HEADER,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Just enough of the Consul agent API to observe what goes over the wire.
#[derive(Default)]
struct FakeAgent {
    services: Vec<Value>,
    registrations: Vec<Value>,
    deregistrations: Vec<String>,
    tokens: Vec<Option<String>>,
    reject_registrations: bool,
}

type Shared = Arc<Mutex<FakeAgent>>;

fn record_token(agent: &Shared, headers: &HeaderMap) {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    agent.lock().tokens.push(token);
}

async fn health_service(
    State(agent): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    record_token(&agent, &headers);
    let agent = agent.lock();
    let entries: Vec<Value> = agent
        .services
        .iter()
        .filter(|s| s["Service"] == name.as_str())
        .map(|s| json!({ "Node": { "Node": "agent-1" }, "Service": s, "Checks": [] }))
        .collect();
    Json(Value::Array(entries))
}

async fn register(
    State(agent): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    record_token(&agent, &headers);
    let mut agent = agent.lock();
    if agent.reject_registrations {
        return (StatusCode::FORBIDDEN, "Permission denied".into());
    }
    agent.services.push(json!({
        "ID": body["ID"],
        "Service": body["Name"],
        "Address": body["Address"],
        "Port": body["Port"],
        "Tags": body["Tags"],
        "Meta": body["Meta"],
    }));
    agent.registrations.push(body);
    (StatusCode::OK, String::new())
}

async fn deregister(
    State(agent): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    record_token(&agent, &headers);
    let mut agent = agent.lock();
    agent.services.retain(|s| s["ID"] != id.as_str());
    agent.deregistrations.push(id);
    StatusCode::OK
}

async fn spawn_agent(agent: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/v1/health/service/{name}", get(health_service))
        .route("/v1/agent/service/register", put(register))
        .route("/v1/agent/service/deregister/{id}", put(deregister))
        .with_state(agent);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn catalog(addr: SocketAddr, token: Option<&str>) -> ConsulCatalog {
    ConsulCatalog::new(
        &format!("http://{addr}"),
        token.map(str::to_owned),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn registrar(catalog: ConsulCatalog) -> Registrar<ConsulCatalog, SystemClock> {
    let generator = LockSnowflakeGenerator::new(42, SystemClock::default()).unwrap();
    Registrar::new(catalog, Arc::new(generator))
}

#[tokio::test]
async fn registers_exact_payload_for_grpc_service() {
    let agent = Shared::default();
    let addr = spawn_agent(agent.clone()).await;
    let registrar = registrar(catalog(addr, Some("acl-token")));

    let descriptor = ServiceDescriptor::builder("orders", "http://10.0.0.5:8080")
        .grpc(true)
        .grpc_weight(0)
        .health_check("10.0.0.5:5001")
        .check_timing(CheckTiming {
            timeout: Duration::from_millis(1500),
            interval: Duration::from_secs(10),
            deregister_critical_after: Duration::from_secs(90),
        })
        .build()
        .unwrap();

    let id = registrar.reconcile(&descriptor).await.unwrap();

    let resolved = id.parse::<SnowflakeId>().unwrap().resolve();
    assert_eq!(resolved.machine_id, 42);

    let agent = agent.lock();
    assert_eq!(
        agent.registrations,
        [json!({
            "ID": id,
            "Name": "orders",
            "Address": "10.0.0.5",
            "Port": 8080,
            "Tags": ["Api", "gRPC"],
            "Meta": { "Scheme": "http", "GrpcWeight": "1" },
            "Check": {
                "GRPC": "10.0.0.5:5001",
                "GRPCUseTLS": true,
                "TLSSkipVerify": true,
                "Timeout": "1.5s",
                "Interval": "10s",
                "DeregisterCriticalServiceAfter": "1m30s",
            },
        })]
    );
    assert_eq!(agent.tokens.len(), 2);
    assert!(agent.tokens.iter().all(|t| t.as_deref() == Some("acl-token")));
}

#[tokio::test]
async fn reuses_registration_reported_by_agent() {
    let agent = Shared::default();
    agent.lock().services.push(json!({
        "ID": "orders-legacy",
        "Service": "orders",
        "Address": "svc",
        "Port": 8080,
        "Tags": null,
        "Meta": null,
    }));
    let addr = spawn_agent(agent.clone()).await;
    let registrar = registrar(catalog(addr, None));

    let descriptor = ServiceDescriptor::builder("orders", "http://svc:8080")
        .health_check("/healthz")
        .build()
        .unwrap();

    let id = registrar.reconcile(&descriptor).await.unwrap();

    assert_eq!(id, "orders-legacy");
    let agent = agent.lock();
    assert!(agent.registrations.is_empty());
    assert_eq!(agent.tokens, [None]);
}

#[tokio::test]
async fn http_check_is_expanded_from_bare_path() {
    let agent = Shared::default();
    let addr = spawn_agent(agent.clone()).await;
    let registrar = registrar(catalog(addr, None));

    let descriptor = ServiceDescriptor::builder("billing", "https://billing.internal:9443")
        .health_check("/healthz")
        .build()
        .unwrap();
    registrar.reconcile(&descriptor).await.unwrap();

    let agent = agent.lock();
    let body = &agent.registrations[0];
    assert_eq!(body["Tags"], json!(["Api"]));
    assert_eq!(body["Meta"], json!({ "Scheme": "https" }));
    assert_eq!(
        body["Check"],
        json!({
            "HTTP": "https://billing.internal:9443/healthz",
            "Timeout": "5s",
            "Interval": "5s",
            "DeregisterCriticalServiceAfter": "5s",
        })
    );
}

#[tokio::test]
async fn rejected_registration_surfaces_status_and_body() {
    let agent = Shared::default();
    agent.lock().reject_registrations = true;
    let addr = spawn_agent(agent.clone()).await;
    let registrar = registrar(catalog(addr, None));

    let descriptor = ServiceDescriptor::builder("orders", "http://svc:8080")
        .health_check("/healthz")
        .build()
        .unwrap();
    let err = registrar.reconcile(&descriptor).await.unwrap_err();

    match err {
        Error::Rejected { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Permission denied");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_agent_is_backend_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let registrar = registrar(catalog(addr, None));

    let descriptor = ServiceDescriptor::builder("orders", "http://svc:8080")
        .health_check("/healthz")
        .build()
        .unwrap();
    let err = registrar.reconcile(&descriptor).await.unwrap_err();

    assert!(matches!(err, Error::BackendUnavailable(_)), "{err}");
}

#[tokio::test]
async fn lifecycle_deregisters_on_stop() {
    let agent = Shared::default();
    let addr = spawn_agent(agent.clone()).await;
    let lifecycle = Lifecycle::new(registrar(catalog(addr, Some("acl-token"))));

    let descriptor = ServiceDescriptor::builder("orders", "http://svc:8080")
        .health_check("/healthz")
        .build()
        .unwrap();
    let id = lifecycle.on_start(&descriptor).await.unwrap();
    lifecycle.on_stop().await;

    let agent = agent.lock();
    assert_eq!(agent.deregistrations, [id]);
    assert!(agent.services.is_empty());
    assert_eq!(agent.tokens.last().cloned().flatten().as_deref(), Some("acl-token"));
}
