//! HTTP client tests against a local stub of the record service.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Serialize;

use ehr_sync_core::api::{ApiError, ApiOperation, ApiResult, HttpRecordsApi, MockRecordsApi, RecordsApi};
use ehr_sync_core::config::ClientConfig;
use ehr_sync_core::gateway::SyncGateway;
use ehr_sync_core::models::{Diagnosis, DiagnosisId, Patient, PatientId};

type Backend = Arc<MockRecordsApi>;

fn reply<T: Serialize>(result: ApiResult<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(ApiError::Server { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn unprocessable(detail: &str) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, detail.to_string()).into_response()
}

async fn list_patients(State(api): State<Backend>) -> Response {
    reply(api.list_patients().await)
}

async fn create_patient(State(api): State<Backend>, Json(patient): Json<Patient>) -> Response {
    if patient.id.is_assigned() {
        return unprocessable("id must be null on create");
    }
    reply(api.create_patient(&patient).await)
}

async fn get_patient(State(api): State<Backend>, Path(id): Path<i64>) -> Response {
    reply(api.get_patient(PatientId(id)).await)
}

async fn update_patient(
    State(api): State<Backend>,
    Path(id): Path<i64>,
    Json(patient): Json<Patient>,
) -> Response {
    if patient.id() != Some(PatientId(id)) {
        return unprocessable("body id must match path");
    }
    reply(api.update_patient(PatientId(id), &patient).await)
}

async fn delete_patient(State(api): State<Backend>, Path(id): Path<i64>) -> Response {
    reply(
        api.delete_patient(PatientId(id))
            .await
            .map(|()| serde_json::json!({ "ok": true })),
    )
}

async fn list_diagnoses(State(api): State<Backend>, Path(id): Path<i64>) -> Response {
    reply(api.list_diagnoses(PatientId(id)).await)
}

async fn create_diagnosis(
    State(api): State<Backend>,
    Path(id): Path<i64>,
    Json(diagnosis): Json<Diagnosis>,
) -> Response {
    if diagnosis.id.is_assigned() {
        return unprocessable("id must be null on create");
    }
    reply(api.create_diagnosis(PatientId(id), &diagnosis).await)
}

async fn delete_diagnosis(
    State(api): State<Backend>,
    Path((id, diagnosis_id)): Path<(i64, i64)>,
) -> Response {
    reply(
        api.delete_diagnosis(PatientId(id), DiagnosisId(diagnosis_id))
            .await
            .map(|()| serde_json::json!({ "ok": true })),
    )
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn start_stub() -> (Backend, HttpRecordsApi) {
    let backend: Backend = Arc::new(MockRecordsApi::new());
    let app = Router::new()
        .route("/patients/", get(list_patients).post(create_patient))
        .route(
            "/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route(
            "/patients/:id/diagnoses/",
            get(list_diagnoses).post(create_diagnosis),
        )
        .route("/patients/:id/diagnoses/:diagnosis_id", delete(delete_diagnosis))
        .with_state(Arc::clone(&backend));

    let base_url = serve(app).await;
    let config = ClientConfig::new(&base_url, Duration::from_secs(5)).unwrap();
    (backend, HttpRecordsApi::new(config).unwrap())
}

#[tokio::test]
async fn test_patient_crud_over_http() {
    let (backend, api) = start_stub().await;

    let created = api
        .create_patient(&Patient::new("Jane Doe", Some(40), "000-00-0000"))
        .await
        .unwrap();
    let id = created.id().unwrap();

    let mut edited = created.clone();
    edited.age = Some(41);
    let updated = api.update_patient(id, &edited).await.unwrap();
    assert_eq!(updated.age, Some(41));

    assert_eq!(api.get_patient(id).await.unwrap().age, Some(41));
    assert_eq!(api.list_patients().await.unwrap().len(), 1);

    api.delete_patient(id).await.unwrap();
    assert!(backend.patients().is_empty());
}

#[tokio::test]
async fn test_diagnosis_routes_over_http() {
    let (backend, api) = start_stub().await;
    let p = backend
        .seed_patient(Patient::new("P", None, "1"))
        .id()
        .unwrap();

    let created = api
        .create_diagnosis(p, &Diagnosis::new(p, "J45 Asthma"))
        .await
        .unwrap();
    assert_eq!(created.patient_id, Some(p));

    let listed = api.list_diagnoses(p).await.unwrap();
    assert_eq!(listed, vec![created.clone()]);

    api.delete_diagnosis(p, created.id().unwrap()).await.unwrap();
    assert!(api.list_diagnoses(p).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_success_status_is_server_error() {
    let (backend, api) = start_stub().await;
    backend.fail_next(
        ApiOperation::DeletePatient,
        ApiError::Server {
            status: 500,
            body: "boom".into(),
        },
    );

    let err = api.delete_patient(PatientId(1)).await.unwrap_err();
    assert_eq!(err.status(), Some(500));

    let err = api.delete_patient(PatientId(99)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_unexpected_body_is_decode_error() {
    let app = Router::new().route("/patients/", get(|| async { "<html>not json</html>" }));
    let base_url = serve(app).await;
    let api = HttpRecordsApi::new(ClientConfig::new(&base_url, Duration::from_secs(5)).unwrap())
        .unwrap();

    let err = api.list_patients().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
    let api = HttpRecordsApi::new(config).unwrap();
    assert_eq!(api.config().base_url(), format!("http://{}", addr));
    assert_eq!(api.config().request_timeout(), Duration::from_secs(2));

    let err = api.list_patients().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test]
async fn test_gateway_over_http() {
    let (backend, api) = start_stub().await;
    let p = backend
        .seed_patient(Patient::new("P", None, "1"))
        .id()
        .unwrap();
    backend.set_diagnoses(p, &["J45 Asthma"]);

    let gateway = SyncGateway::spawn(api);
    gateway.refresh_all().wait().await.unwrap();
    gateway
        .create_patient("Jane Doe", Some(40), "000-00-0000")
        .wait()
        .await
        .unwrap();

    assert_eq!(gateway.patients().len(), 2);
    assert_eq!(gateway.diagnoses_for(p).len(), 1);
}
