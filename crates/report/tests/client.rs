//! Integration tests for `ReportClient` against a local axum server
//! standing in for the records API.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use emission_core::aggregate::summarize;
use emission_core::metadata::TestMetadata;
use emission_core::persistence::SessionSink;
use emission_core::reading::{DisplaySample, SensorReading};
use emission_core::session::FinalizedSession;
use emission_report::{ReportClient, ReportError};

type Captured = Arc<Mutex<Vec<Value>>>;

async fn serve(api: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().nest("/api", api);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn finalized() -> FinalizedSession {
    let observed_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let samples: Vec<DisplaySample> = [(10.0, 20.0), (30.0, 40.0)]
        .into_iter()
        .map(|(a, b)| {
            DisplaySample::from_reading(&SensorReading {
                channel_a: a,
                channel_b: b,
                observed_at,
            })
        })
        .collect();
    let aggregate = summarize(&samples, 65).unwrap();

    FinalizedSession {
        session_id: Uuid::now_v7(),
        started_at: observed_at,
        metadata: TestMetadata {
            owner_name: "Budi".into(),
            vehicle_brand: "Honda".into(),
            vehicle_model: "Beat".into(),
            engine_cc: "110".into(),
            whatsapp_number: "08123456789".into(),
        },
        samples,
        aggregate,
    }
}

// ---------------------------------------------------------------------------
// Test: submit posts the flat record and returns id + recommendation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_posts_flat_record() {
    async fn create(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        captured.lock().unwrap().push(body);
        Json(json!({
            "success": true,
            "id": 42,
            "recommendation": {"status": "ok"}
        }))
    }

    let captured = Captured::default();
    let api = Router::new()
        .route("/tests", post(create))
        .with_state(Arc::clone(&captured));
    let client = ReportClient::new(serve(api).await);

    let receipt = client.submit(&finalized()).await.unwrap();
    assert_eq!(receipt.id, 42);
    assert_eq!(receipt.recommendation, Some(json!({"status": "ok"})));

    let bodies = captured.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["nama"], "Budi");
    assert_eq!(body["merk_motor"], "Honda");
    assert_eq!(body["nama_motor"], "Beat");
    assert_eq!(body["cc_motor"], "110");
    assert_eq!(body["nomor_wa"], "08123456789");
    assert_eq!(body["avg_mq135"], 20.0);
    assert_eq!(body["avg_mq7"], 30.0);
    assert_eq!(body["max_mq135"], 30.0);
    assert_eq!(body["max_mq7"], 40.0);
    assert_eq!(body["test_duration"], 65);

    let test_data = body["test_data"].as_array().unwrap();
    assert_eq!(test_data.len(), 2);
    assert_eq!(test_data[1]["MQ135"], 30.0);
    assert_eq!(test_data[1]["MQ7"], 40.0);
    assert!(test_data[0]["time"].is_string());
    assert!(body.get("session_id").is_none());
}

// ---------------------------------------------------------------------------
// Test: success=false surfaces as a rejection through the sink seam
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_submit_maps_to_persistence_error() {
    let api = Router::new().route(
        "/tests",
        post(|| async { Json(json!({"success": false, "error": "database offline"})) }),
    );
    let client = ReportClient::new(serve(api).await);

    assert_matches!(
        client.submit(&finalized()).await,
        Err(ReportError::Rejected(msg)) if msg == "database offline"
    );

    let err = SessionSink::submit(&client, &finalized()).await.unwrap_err();
    assert!(err.0.contains("database offline"));
}

// ---------------------------------------------------------------------------
// Test: non-2xx responses carry status and body
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_is_api_error() {
    let api = Router::new().route(
        "/tests",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "kaboom") }),
    );
    let client = ReportClient::new(serve(api).await);

    assert_matches!(
        client.list_tests().await,
        Err(ReportError::ApiError { status: 500, body }) if body == "kaboom"
    );
}

// ---------------------------------------------------------------------------
// Test: history, pdf, delete and recommendations pass through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pass_through_routes() {
    async fn list() -> Json<Value> {
        Json(json!({
            "success": true,
            "data": [
                {"id": 2, "nama": "Ani", "merk_motor": "Yamaha", "nama_motor": "Mio",
                 "cc_motor": "125", "nomor_wa": "0857", "avg_mq135": "310.50",
                 "avg_mq7": "80.00", "max_mq135": "400.00", "max_mq7": "99.10",
                 "test_duration": 120, "timestamp": "2024-05-01T10:00:00.000Z"},
                {"id": 1, "nama": "Budi", "avg_mq135": 12, "avg_mq7": 3, "test_duration": 30}
            ]
        }))
    }

    async fn pdf(Path(id): Path<i64>) -> impl IntoResponse {
        (
            [(header::CONTENT_TYPE, "application/pdf")],
            format!("%PDF-1.4 test {id}").into_bytes(),
        )
    }

    async fn remove(State(captured): State<Captured>, Path(id): Path<i64>) -> Json<Value> {
        captured.lock().unwrap().push(json!(id));
        Json(json!({"success": true}))
    }

    async fn recommend(Path(id): Path<i64>) -> Json<Value> {
        Json(json!({"success": true, "data": {"test_id": id, "items": ["check air filter"]}}))
    }

    let deleted = Captured::default();
    let api = Router::new()
        .route("/tests", get(list))
        .route("/tests/{id}", axum::routing::delete(remove))
        .route("/tests/{id}/pdf", get(pdf))
        .route("/tests/{id}/recommendations", get(recommend))
        .with_state(Arc::clone(&deleted));
    let client = ReportClient::new(serve(api).await);

    let history = client.list_tests().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, 2);
    assert_eq!(history[0].metadata.vehicle_brand, "Yamaha");
    assert_eq!(history[0].mean_a, 310.5);
    assert_eq!(history[0].duration_seconds, 120);
    assert_eq!(history[1].mean_a, 12.0);
    assert_eq!(history[1].metadata.engine_cc, "");

    let bytes = client.fetch_pdf(2).await.unwrap();
    assert_eq!(bytes, b"%PDF-1.4 test 2".to_vec());

    client.delete_test(7).await.unwrap();
    assert_eq!(*deleted.lock().unwrap(), vec![json!(7)]);

    let rec = client.recommendations(2).await.unwrap();
    assert_eq!(rec["test_id"], 2);
    assert_eq!(rec["items"][0], "check air filter");
}

// ---------------------------------------------------------------------------
// Test: missing pdf is an API error, not an empty document
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_pdf_is_api_error() {
    let api = Router::new().route(
        "/tests/{id}/pdf",
        get(|| async { (StatusCode::NOT_FOUND, "Test not found") }),
    );
    let client = ReportClient::new(serve(api).await);

    assert_matches!(
        client.fetch_pdf(99).await,
        Err(ReportError::ApiError { status: 404, .. })
    );
}
