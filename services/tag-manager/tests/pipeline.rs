//! End-to-end tests for the event endpoints.
//!
//! Each test spawns the router on an ephemeral port and delivers audit
//! events over HTTP, backed either by the in-memory tagging API or by a
//! wiremock server standing in for the zonal Resource Manager endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use securetag_audit::AUDIT_LOG_TYPE_URL;
use securetag_manager::{
    api,
    auth::StaticTokenSource,
    binder::TagBinder,
    crm::{mock::MockZoneClientFactory, HttpZoneClientFactory, TagApiError, ZoneClientFactory},
    driver::ReconciliationDriver,
    state::AppState,
    zones::ZoneClientCache,
};
use securetag_reconcile::{NetworkTagResolver, ResourceName, TagValue};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_app(factory: Arc<dyn ZoneClientFactory>) -> SocketAddr {
    let zones = Arc::new(ZoneClientCache::new(factory));
    let driver = ReconciliationDriver::new(
        Arc::new(NetworkTagResolver::default()),
        TagBinder::new(Arc::clone(&zones)),
    );
    let app = api::create_router(AppState::new(driver, zones));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn insert_entry(first: bool, tags: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "insertId": "-h2k9x1e3abcd",
        "timestamp": "2022-03-01T18:22:31.123456Z",
        "operation": {
            "id": "operation-1646158950-5d9a3c",
            "producer": "compute.googleapis.com",
            "first": first,
            "last": !first
        },
        "resource": {
            "type": "gce_instance",
            "labels": {
                "instance_id": "689579460943534750",
                "project_id": "my-project",
                "zone": "us-west1-a"
            }
        },
        "protoPayload": {
            "@type": AUDIT_LOG_TYPE_URL,
            "methodName": "v1.compute.instances.insert",
            "resourceName": "projects/my-project/zones/us-west1-a/instances/vm-1",
            "request": {
                "name": "vm-1",
                "tags": {"items": tags}
            },
            "response": {
                "targetLink": "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-west1-a/instances/vm-1"
            }
        }
    })
}

fn resource_name() -> ResourceName {
    ResourceName::for_instance("my-project", "us-west1-a", "689579460943534750")
}

async fn post_json(
    client: &reqwest::Client,
    url: String,
    body: &serde_json::Value,
) -> (reqwest::StatusCode, serde_json::Value) {
    let resp = client
        .post(url)
        .header("ce-id", "evt-1")
        .header("ce-time", "2022-03-01T18:22:31Z")
        .json(body)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn test_direct_event_binds_tags() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        format!("http://{addr}/v1/compute/instances"),
        &insert_entry(true, serde_json::json!(["stv-642676120853", "env-prod"])),
    )
    .await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["insert_id"], "-h2k9x1e3abcd");
    assert_eq!(body["resource_name"], resource_name().as_str());
    assert_eq!(body["bindings"][0]["tag_value"], "tagValues/642676120853");
    assert_eq!(body["bindings"][0]["outcome"], "bound");

    let bound = factory.client("us-west1-a").await.bound(&resource_name()).await;
    assert_eq!(
        bound.into_iter().collect::<Vec<_>>(),
        vec![TagValue::from_id("642676120853")]
    );
}

#[tokio::test]
async fn test_pubsub_event_binds_tags() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();

    let entry = insert_entry(true, serde_json::json!(["stv-1", "stv-2"]));
    let envelope = serde_json::json!({
        "message": {
            "data": STANDARD.encode(serde_json::to_vec(&entry).unwrap()),
            "messageId": "4042"
        },
        "subscription": "projects/my-project/subscriptions/eventarc-us-west1-sub"
    });

    let (status, body) = post_json(
        &client,
        format!("http://{addr}/v1/compute/instances_pubsub"),
        &envelope,
    )
    .await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["bindings"].as_array().unwrap().len(), 2);
    assert_eq!(factory.client("us-west1-a").await.create_calls(), 2);
}

#[tokio::test]
async fn test_non_first_record_is_acknowledged_without_calls() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        format!("http://{addr}/v1/compute/instances"),
        &insert_entry(false, serde_json::json!(["stv-1"])),
    )
    .await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["detail"], "not first of operation");
    assert_eq!(factory.connects(), 0);
}

#[tokio::test]
async fn test_no_matching_tags_makes_no_calls() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();

    let mut entry = insert_entry(true, serde_json::json!([]));
    entry["protoPayload"]["request"]
        .as_object_mut()
        .unwrap()
        .remove("tags");

    let (status, body) = post_json(&client, format!("http://{addr}/v1/compute/instances"), &entry).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert!(body.get("bindings").is_none());
    assert_eq!(factory.connects(), 0);
}

#[tokio::test]
async fn test_undecodable_body_is_client_error() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/v1/compute/instances"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers()["content-type"],
        "application/problem+json"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_log_entry");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_partial_failure_is_acknowledged() {
    let factory = Arc::new(MockZoneClientFactory::new());
    factory
        .client("us-west1-a")
        .await
        .fail_tag(
            TagValue::from_id("2"),
            TagApiError::Api {
                status: 403,
                message: "permission denied".to_string(),
            },
        )
        .await;
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        format!("http://{addr}/v1/compute/instances"),
        &insert_entry(true, serde_json::json!(["stv-1", "stv-2", "stv-3"])),
    )
    .await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert!(body["detail"].as_str().unwrap().contains("permission denied"));
    assert_eq!(factory.client("us-west1-a").await.create_calls(), 3);

    let outcomes: Vec<_> = body["bindings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["outcome"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(outcomes, vec!["bound", "failed", "bound"]);
}

#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let factory = Arc::new(MockZoneClientFactory::new());
    let addr = spawn_app(factory.clone()).await;
    let client = reqwest::Client::new();
    let entry = insert_entry(true, serde_json::json!(["stv-642676120853"]));
    let url = format!("http://{addr}/v1/compute/instances");

    let (_, first) = post_json(&client, url.clone(), &entry).await;
    let (status, second) = post_json(&client, url, &entry).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(second["status"], "accepted");
    assert_eq!(first["resource_name"], second["resource_name"]);
    assert_eq!(second["bindings"][0]["outcome"], "already_bound");
    assert_eq!(factory.connects(), 1);
}

#[tokio::test]
async fn test_http_client_against_zonal_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/us-west1-a/v3/tagBindings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "operations/rctb.us-west1-a.7889478677166923103"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/us-west1-a/v3/effectiveTags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "effectiveTags": [{
                "tagValue": "tagValues/642676120853",
                "namespacedTagValue": "my-project/env/prod"
            }]
        })))
        .mount(&server)
        .await;

    let factory = Arc::new(HttpZoneClientFactory::new(
        format!("{}/{{zone}}", server.uri()),
        Arc::new(StaticTokenSource::new("test-token")),
        Duration::from_secs(5),
    ));
    let addr = spawn_app(factory).await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        format!("http://{addr}/v1/compute/instances"),
        &insert_entry(true, serde_json::json!(["stv-642676120853"])),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(
        body["bindings"][0]["operation"],
        "operations/rctb.us-west1-a.7889478677166923103"
    );

    let resp = client
        .get(format!("http://{addr}/v1/instances/effective-tags"))
        .query(&[
            ("project", "my-project"),
            ("zone", "us-west1-a"),
            ("instance", "689579460943534750"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["resource_name"], resource_name().as_str());
    assert_eq!(
        body["effective_tags"][0]["tagValue"],
        "tagValues/642676120853"
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let addr = spawn_app(Arc::new(MockZoneClientFactory::new())).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "server 200 OK");

    let resp = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["zone_clients"], 0);
}
