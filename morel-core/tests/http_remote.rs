//! HttpRemote against an in-process server.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use morel_core::sync::{Deletion, Submission};
use morel_core::{
    BackendConfig, Credentials, HttpRemote, Manager, ManagerOptions, Occurrence, Remote, Sample,
    SyncError,
};
use serde_json::{json, Map, Value};

#[derive(Clone, Default)]
struct ServerState {
    next_id: Arc<AtomicI64>,
    received: Arc<Mutex<Vec<Value>>>,
}

/// Accepts submissions that carry a `date` attribute.
async fn submit(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.received.lock().unwrap().push(body.clone());

    let submission = &body["submission"];
    if submission["attributes"].get("date").is_none() {
        return Err((StatusCode::BAD_REQUEST, "date is required".to_string()));
    }

    let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 500;
    let children: Vec<Value> = submission["children"]
        .as_array()
        .map(|children| {
            children
                .iter()
                .enumerate()
                .map(|(i, child)| json!({"cid": child["cid"], "id": id * 10 + i as i64}))
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(json!({"id": id, "children": children})))
}

async fn delete(State(state): State<ServerState>, Json(body): Json<Value>) -> StatusCode {
    state.received.lock().unwrap().push(body.clone());
    if body["deletion"]["id"] == json!(404) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn broken() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "database offline".to_string())
}

async fn garbage() -> String {
    "<html>maintenance</html>".to_string()
}

async fn spawn_server(state: ServerState) -> String {
    let app = Router::new()
        .route("/mobile/submit", post(submit).delete(delete))
        .route("/broken", post(broken).delete(broken))
        .route("/garbage", post(garbage))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn credentials() -> Credentials {
    Credentials {
        appname: "test".to_string(),
        appsecret: "mytest".to_string(),
        website_id: 23,
        survey_id: 42,
    }
}

fn remote(url: String) -> HttpRemote {
    HttpRemote::new(url, credentials(), Duration::from_secs(5)).unwrap()
}

fn submission(attributes: Value) -> Submission {
    let attributes: Map<String, Value> = serde_json::from_value(attributes).unwrap();
    Submission {
        collection: "samples".to_string(),
        cid: "abc".to_string(),
        id: None,
        attributes,
        children: vec![Submission {
            collection: "occurrences".to_string(),
            cid: "child".to_string(),
            id: None,
            attributes: Map::new(),
            children: Vec::new(),
        }],
    }
}

#[tokio::test]
async fn test_submit_returns_receipt() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let remote = remote(format!("{}/mobile/submit", base));

    let receipt = remote
        .submit(&submission(json!({"date": "2024-05-01"})))
        .await
        .unwrap();

    assert_eq!(receipt.id, json!(500));
    assert_eq!(receipt.children.len(), 1);
    assert_eq!(receipt.children[0].cid, "child");
    assert_eq!(receipt.children[0].id, json!(5000));

    let received = state.received.lock().unwrap();
    assert_eq!(received[0]["appname"], json!("test"));
    assert_eq!(received[0]["appsecret"], json!("mytest"));
    assert_eq!(received[0]["website_id"], json!(23));
    assert_eq!(received[0]["survey_id"], json!(42));
    assert_eq!(received[0]["submission"]["cid"], json!("abc"));
}

#[tokio::test]
async fn test_rejection_is_record_level() {
    let base = spawn_server(ServerState::default()).await;
    let remote = remote(format!("{}/mobile/submit", base));

    let err = remote.submit(&submission(json!({}))).await.unwrap_err();

    match &err {
        SyncError::Rejected { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "date is required");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let base = spawn_server(ServerState::default()).await;
    let remote = remote(format!("{}/broken", base));

    let err = remote
        .submit(&submission(json!({"date": "2024-05-01"})))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Server { status: 500, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unparseable_response() {
    let base = spawn_server(ServerState::default()).await;
    let remote = remote(format!("{}/garbage", base));

    let err = remote
        .submit(&submission(json!({"date": "2024-05-01"})))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = remote(format!("http://{}/mobile/submit", addr));
    let err = remote
        .submit(&submission(json!({"date": "2024-05-01"})))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transport(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_delete() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let remote = remote(format!("{}/mobile/submit", base));

    let deletion = Deletion {
        collection: "samples".to_string(),
        id: json!(7),
        cid: Some("abc".to_string()),
    };
    remote.delete(&deletion).await.unwrap();

    // Already gone on the server.
    let missing = Deletion {
        id: json!(404),
        ..deletion
    };
    remote.delete(&missing).await.unwrap();

    let received = state.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0]["deletion"]["cid"], json!("abc"));
    assert_eq!(received[0]["survey_id"], json!(42));
}

#[tokio::test]
async fn test_delete_server_error() {
    let base = spawn_server(ServerState::default()).await;
    let remote = remote(format!("{}/broken", base));

    let err = remote
        .delete(&Deletion {
            collection: "samples".to_string(),
            id: json!(7),
            cid: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_manager_sync_all_over_http() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let manager = Manager::new(ManagerOptions {
        url: format!("{}/mobile/submit", base),
        appname: "test".to_string(),
        appsecret: "mytest".to_string(),
        website_id: 23,
        survey_id: 42,
        storage: BackendConfig::Memory,
        timeout_secs: 5,
    })
    .unwrap();
    manager.ready().await.unwrap();

    let valid = Sample::new()
        .with_attribute("date", "2024-05-01")
        .with_occurrence(Occurrence::new().with_attribute("taxon", 42));
    let invalid = Sample::new();
    manager.set(&valid).await.unwrap();
    manager.set(&invalid).await.unwrap();

    let report = manager.sync_all().await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, invalid.cid.to_string());
    assert!(report.aborted.is_none());

    let synced: Sample = manager.get::<Sample>(&valid.cid.to_string()).await.unwrap();
    assert_eq!(synced.id, Some(500));
    assert_eq!(synced.occurrences[0].id, Some(5000));

    let unsynced: Sample = manager.get::<Sample>(&invalid).await.unwrap();
    assert_eq!(unsynced.id, None);
    assert!(unsynced.metadata.synced_on.is_none());
}
