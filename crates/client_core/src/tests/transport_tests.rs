use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::{
    codes::{AppointmentStatus, BillStatus},
    domain::{AppointmentId, BillId, PageRequest, PatientId, ServiceId},
};
use tokio::net::TcpListener;

use super::*;
use crate::{
    backend::{HospitalBackend, HttpBackend},
    config::ClientSettings,
    error::user_message,
};

#[derive(Debug, Clone)]
struct Seen {
    path: String,
    authorization: Option<String>,
    language: Option<String>,
    query: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    fn record(&self, uri: &Uri, headers: &HeaderMap, query: HashMap<String, String>) {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.seen.lock().expect("recorder").push(Seen {
            path: uri.path().to_string(),
            authorization: text(header::AUTHORIZATION),
            language: text(header::ACCEPT_LANGUAGE),
            query,
        });
    }

    fn last(&self) -> Seen {
        self.seen
            .lock()
            .expect("recorder")
            .last()
            .cloned()
            .expect("at least one request")
    }
}

async fn bills(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    recorder.record(&uri, &headers, query);
    Json(json!({
        "content": [
            {"id": 1, "appointment": 10, "patient": 1, "total_cost": "200000.00",
             "amount": 200000, "service_fee": 100000, "status": "U"},
            {"bill_id": 2, "appointment": {"appointment_id": 11}, "status": "BOOKING_PAID"},
            {"status": "P"}
        ],
        "totalElements": 3
    }))
}

async fn appointments(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    recorder.record(&uri, &headers, query);
    Json(json!({
        "results": [
            {"id": 3, "status": "C", "doctor_info": {"full_name": "BS. Hòa"}},
            {"appointmentId": 4, "appointmentStatus": "??"}
        ],
        "count": 42
    }))
}

async fn patients(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    recorder.record(&uri, &headers, query);
    Json(json!([
        {"id": 1, "full_name": "Nguyễn Văn An", "phone": "0901", "gender": "F"},
        {"patientId": 2, "fullName": "Trần Thị Bình"}
    ]))
}

async fn transactions(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    recorder.record(&uri, &headers, query);
    Json(json!({"data": [], "total": 0}))
}

async fn missing_service() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Không tìm thấy dịch vụ"})),
    )
}

async fn broken_gateway() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream down")
}

async fn server_error_page() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/html")],
        "<!DOCTYPE html>\n<html><body><h1>Server Error (500)</h1></body></html>\n",
    )
}

async fn missing_prescription() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn booking_payment() -> Json<serde_json::Value> {
    Json(json!({"data": {"checkoutUrl": "https://pay.example/checkout/3", "orderCode": 123}}))
}

async fn service_payment() -> Json<serde_json::Value> {
    Json(json!({"message": "ok"}))
}

async fn cash_payment() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn spawn_backend_server() -> Result<(String, Recorder)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/api/v1/bills/patient/1/", get(bills))
        .route("/api/v1/appointments/patient/1/", get(appointments))
        .route("/api/v1/patients/", get(patients))
        .route("/api/v1/transactions/", get(transactions))
        .route("/api/v1/services/7/", get(missing_service))
        .route("/api/v1/services/8/", get(broken_gateway))
        .route("/api/v1/services/9/", get(server_error_page))
        .route(
            "/api/v1/pharmacy/prescriptions/appointment/5/",
            get(missing_prescription),
        )
        .route("/api/v1/transactions/create-payment/3/", post(booking_payment))
        .route(
            "/api/v1/transactions/create-service-payment/3/",
            post(service_payment),
        )
        .route("/api/v1/transactions/cash-payment/3/", post(cash_payment))
        .with_state(recorder.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), recorder))
}

fn settings_for(base_url: &str) -> ClientSettings {
    ClientSettings {
        api_base_url: base_url.to_string(),
        language: "vi".into(),
        ..ClientSettings::default()
    }
}

fn backend_for(base_url: &str, token: Option<&str>) -> HttpBackend {
    let client = ApiClient::new(
        &settings_for(base_url),
        Arc::new(StaticToken::new(token.map(str::to_string))),
    )
    .expect("client");
    HttpBackend::new(client)
}

#[test]
fn bearer_keeps_existing_scheme() {
    assert_eq!(bearer("abc"), "Bearer abc");
    assert_eq!(bearer("Bearer abc"), "Bearer abc");
    assert_eq!(bearer("  abc "), "Bearer abc");
}

#[test]
fn blank_static_token_is_no_token() {
    assert_eq!(StaticToken::new(Some("   ".into())).access_token(), None);
    assert_eq!(
        StaticToken::new(Some("t".into())).access_token().as_deref(),
        Some("t")
    );
}

#[test]
fn unparsable_base_url_is_rejected() {
    let result = ApiClient::new(&settings_for("not a url"), Arc::new(StaticToken::default()));
    assert!(matches!(result, Err(RequestError::InvalidUrl(_))));
}

#[tokio::test]
async fn requests_carry_token_language_and_prefix() {
    let (url, recorder) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, Some("secret-token"));

    let bills = backend
        .bills_for_patient(PatientId(1))
        .await
        .expect("bills");

    let seen = recorder.last();
    assert_eq!(seen.path, "/api/v1/bills/patient/1/");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer secret-token"));
    assert_eq!(seen.language.as_deref(), Some("vi"));

    // The third record has no id and is skipped.
    assert_eq!(bills.len(), 2);
    assert_eq!(bills[0].bill_id, BillId(1));
    assert_eq!(bills[0].status, BillStatus::Unpaid);
    assert_eq!(bills[0].total_cost, 200_000.0);
    assert_eq!(bills[0].appointment_id(), Some(AppointmentId(10)));
    assert_eq!(bills[1].status, BillStatus::BookingPaid);
    assert_eq!(bills[1].appointment_id(), Some(AppointmentId(11)));
}

#[tokio::test]
async fn missing_token_sends_no_authorization() {
    let (url, recorder) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, None);

    backend
        .transactions_for_patient(PatientId(1))
        .await
        .expect("transactions");

    let seen = recorder.last();
    assert_eq!(seen.authorization, None);
    assert_eq!(seen.query.get("patient_id").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn list_endpoints_send_paging_and_read_any_envelope() {
    let (url, recorder) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, Some("Bearer already-prefixed"));

    let page = backend
        .appointments_for_patient(PatientId(1), PageRequest::first(50))
        .await
        .expect("appointments");
    let seen = recorder.last();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer already-prefixed"));
    assert_eq!(seen.query.get("page").map(String::as_str), Some("1"));
    assert_eq!(seen.query.get("pageSize").map(String::as_str), Some("50"));
    assert_eq!(page.total, 42);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].doctor_name(), Some("BS. Hòa"));
    assert_eq!(page.items[0].appointment_status, AppointmentStatus::Confirmed);
    assert_eq!(page.items[1].appointment_status, AppointmentStatus::Pending);

    let patients = backend
        .patients(PageRequest::first(100))
        .await
        .expect("patients");
    let seen = recorder.last();
    assert_eq!(seen.query.get("page_size").map(String::as_str), Some("100"));
    assert_eq!(patients.total, 2);
    assert_eq!(patients.items[1].full_name, "Trần Thị Bình");
}

#[tokio::test]
async fn error_status_keeps_body_for_messages() {
    let (url, _) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, None);

    let err = backend
        .service(ServiceId(7))
        .await
        .expect_err("404 expected");
    assert!(err.is_not_found());
    assert_eq!(user_message(&err), "Không tìm thấy dịch vụ");

    let err = backend
        .service(ServiceId(8))
        .await
        .expect_err("502 expected");
    match &err {
        RequestError::Status { status, data, .. } => {
            assert_eq!(*status, 502);
            assert_eq!(data, &json!("upstream down"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(user_message(&err), "upstream down");
}

#[tokio::test]
async fn html_error_page_never_reaches_the_message() {
    let (url, _) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, None);

    let err = backend
        .service(ServiceId(9))
        .await
        .expect_err("500 expected");
    match &err {
        RequestError::Status { status, data, .. } => {
            assert_eq!(*status, 500);
            assert_eq!(data, &serde_json::Value::Null);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let message = user_message(&err);
    assert_eq!(message, "Đã xảy ra lỗi máy chủ. Vui lòng thử lại sau.");
    assert!(!message.contains('<'));
}

#[tokio::test]
async fn absent_prescription_is_none() {
    let (url, _) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, None);

    let prescription = backend
        .prescription_for_appointment(AppointmentId(5))
        .await
        .expect("404 maps to none");
    assert_eq!(prescription, None);
}

#[tokio::test]
async fn payment_endpoints_parse_links_and_empty_bodies() {
    let (url, _) = spawn_backend_server().await.expect("spawn server");
    let backend = backend_for(&url, None);

    let link = backend
        .create_booking_payment(BillId(3))
        .await
        .expect("checkout link");
    assert_eq!(link.checkout_url, "https://pay.example/checkout/3");
    assert_eq!(link.order_code.as_deref(), Some("123"));

    let err = backend
        .create_service_payment(BillId(3))
        .await
        .expect_err("no url in response");
    assert!(matches!(err, RequestError::Unexpected { .. }));

    backend
        .cash_payment(BillId(3))
        .await
        .expect("empty body is fine");
}
