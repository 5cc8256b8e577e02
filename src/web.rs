//! HTTP surface for the signing form.
//!
//! The server keeps no session: the browser posts the whole form with every
//! action and each request is evaluated on its own.

use crate::error::AgreementError;
use crate::notifier::Notifier;
use crate::pipeline::{self, FinalizedAgreement};
use crate::session::{AgreementSession, FieldError, FlowStage};
use crate::signature::DataUrl;
use crate::template::{AGENCY_NAME, AGREEMENT_TEMPLATE, DOCUMENT_TITLE};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const RENDER_FAILED: &str = "An error occurred while generating the PDF. Please try again.";

#[derive(Clone, Default)]
pub struct AppState {
    notifier: Option<Arc<Notifier>>,
}

impl AppState {
    pub fn new(notifier: Option<Notifier>) -> Self {
        AppState {
            notifier: notifier.map(Arc::new),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgreementPreview {
    pub title: &'static str,
    pub agency: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub stage: FlowStage,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub session: AgreementSession,
    #[serde(default)]
    pub client_signature: String,
    #[serde(default)]
    pub agency_signature: String,
}

impl AgreementError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgreementError::NotAccepted
            | AgreementError::InvalidRequest(_)
            | AgreementError::Validation(_)
            | AgreementError::MissingSignature { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AgreementError::Signature(_) => StatusCode::BAD_REQUEST,
            AgreementError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgreementError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AgreementError::NotAccepted => json!({ "error": "not_accepted", "message": self.to_string() }),
            AgreementError::InvalidRequest(_) => json!({ "error": "invalid_request", "message": self.to_string() }),
            AgreementError::Validation(errors) => {
                json!({ "error": "validation", "message": self.to_string(), "errors": errors })
            }
            AgreementError::MissingSignature { client, agency } => json!({
                "error": "missing_signature",
                "message": self.to_string(),
                "missing": { "client": client, "agency": agency },
            }),
            AgreementError::Signature(e) => json!({ "error": "signature", "message": e.to_string() }),
            // Render details stay in the log.
            AgreementError::Render(_) => json!({ "error": "render", "message": RENDER_FAILED }),
        };
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/agreement", get(agreement_handler))
        .route("/api/validate", post(validate_handler))
        .route("/api/generate", post(generate_handler))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Agreement form listening on http://{}", addr);
    axum::serve(listener, build_router(state)).await
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn agreement_handler() -> Json<AgreementPreview> {
    Json(AgreementPreview {
        title: DOCUMENT_TITLE,
        agency: AGENCY_NAME,
        text: AGREEMENT_TEMPLATE.trim(),
    })
}

impl From<JsonRejection> for AgreementError {
    fn from(rejection: JsonRejection) -> Self {
        AgreementError::InvalidRequest(rejection.body_text())
    }
}

async fn validate_handler(
    payload: Result<Json<AgreementSession>, JsonRejection>,
) -> Result<Json<ValidationReport>, AgreementError> {
    let Json(session) = payload?;
    let errors = if session.accepted { session.field_errors() } else { Vec::new() };
    Ok(Json(ValidationReport {
        stage: session.stage(),
        errors,
    }))
}

async fn generate_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return AgreementError::from(rejection).into_response(),
    };
    let notifier = state.notifier.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline::finalize(
            &request.session,
            &DataUrl(&request.client_signature),
            &DataUrl(&request.agency_signature),
            notifier.as_deref(),
            Local::now().naive_local(),
        )
    })
    .await;

    match outcome {
        Ok(Ok(finalized)) => pdf_response(finalized),
        Ok(Err(e)) => e.into_response(),
        Err(join_error) => {
            error!("Generation task failed: {}", join_error);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "render", "message": RENDER_FAILED })))
                .into_response()
        }
    }
}

/// Header-safe copy of a filename: printable ASCII only, no quotes.
fn header_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect()
}

fn pdf_response(finalized: FinalizedAgreement) -> Response {
    let FinalizedAgreement { agreement, notification } = finalized;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    let disposition = format!("attachment; filename=\"{}\"", header_filename(agreement.filename()));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert("x-notification-status", HeaderValue::from_static(notification.status()));
    if let Some(message) = notification.message() {
        headers.insert("x-notification-message", HeaderValue::from_static(message));
    }
    (StatusCode::OK, headers, agreement.into_bytes()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::extract::FromRequest;
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::NaiveDate;
    use image::codecs::png::PngEncoder;
    use image::{ImageBuffer, ImageEncoder, Rgba, RgbaImage};

    fn signature_url(drawn: bool) -> String {
        let mut pixels: RgbaImage = ImageBuffer::from_pixel(700, 180, Rgba([0, 0, 0, 0]));
        if drawn {
            pixels.put_pixel(20, 20, Rgba([0, 0, 0, 255]));
        }
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(pixels.as_raw(), 700, 180, image::ColorType::Rgba8)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(png))
    }

    fn session() -> AgreementSession {
        AgreementSession {
            accepted: true,
            client_name: "Acme LLC".to_string(),
            client_rep_name: "Jane Doe".to_string(),
            client_email: "jane@acme.com".to_string(),
            governing_state: "Delaware".to_string(),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            ..AgreementSession::default()
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validate_reports_stage_and_field_errors() {
        let session = AgreementSession { client_email: "not-an-email".to_string(), ..session() };
        let Json(report) = validate_handler(Ok(Json(session))).await.unwrap();
        assert_eq!(report.stage, FlowStage::FormIncomplete);
        assert_eq!(report.errors.len(), 1);

        let Json(report) = validate_handler(Ok(Json(AgreementSession::default()))).await.unwrap();
        assert_eq!(report.stage, FlowStage::Unaccepted);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn generate_returns_pdf_attachment_without_mail() {
        let request = GenerateRequest {
            session: session(),
            client_signature: signature_url(true),
            agency_signature: signature_url(true),
        };
        let response = generate_handler(State(AppState::default()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/pdf");
        let today = Local::now().format("%Y%m%d").to_string();
        assert_eq!(
            headers[CONTENT_DISPOSITION].to_str().unwrap(),
            format!("attachment; filename=\"Ad_Agreement_Acme_LLC_{today}.pdf\"")
        );
        assert_eq!(headers["x-notification-status"], "skipped");
        assert!(headers.get("x-notification-message").is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn generate_refuses_a_blank_signature() {
        let request = GenerateRequest {
            session: session(),
            client_signature: signature_url(true),
            agency_signature: signature_url(false),
        };
        let response = generate_handler(State(AppState::default()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "missing_signature");
        assert_eq!(body["missing"]["agency"], true);
        assert_eq!(body["missing"]["client"], false);
    }

    #[tokio::test]
    async fn generate_refuses_invalid_email() {
        let request = GenerateRequest {
            session: AgreementSession { client_email: "not-an-email".to_string(), ..session() },
            client_signature: signature_url(true),
            agency_signature: signature_url(true),
        };
        let response = generate_handler(State(AppState::default()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation");
        assert_eq!(body["errors"][0]["field"], "client_email");
    }

    #[tokio::test]
    async fn undecodable_signature_is_a_bad_request() {
        let request = GenerateRequest {
            session: session(),
            client_signature: "data:image/png;base64,AAAA".to_string(),
            agency_signature: signature_url(true),
        };
        let response = generate_handler(State(AppState::default()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn preview_serves_the_template() {
        let Json(preview) = agreement_handler().await;
        assert!(preview.text.starts_with("AD MANAGER & PARTNERSHIP AGREEMENT"));
        assert!(preview.text.contains("[Client Name]"));
    }

    async fn extract<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<Json<T>, JsonRejection> {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        Json::<T>::from_request(request, &()).await
    }

    #[tokio::test]
    async fn cleared_effective_date_is_reported_as_json() {
        let mut session = serde_json::to_value(session()).unwrap();
        session["effective_date"] = json!("");

        let report = validate_handler(extract::<AgreementSession>(session.clone()).await).await;
        let response = report.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert!(body["message"].as_str().unwrap().contains("effective_date"));

        let payload = extract::<GenerateRequest>(json!({
            "session": session,
            "client_signature": signature_url(true),
            "agency_signature": signature_url(true),
        }))
        .await;
        let response = generate_handler(State(AppState::default()), payload).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_request");
    }

    #[test]
    fn index_page_uses_the_local_calendar_date() {
        assert!(INDEX_HTML.contains("getFullYear()"));
        assert!(!INDEX_HTML.contains("toISOString"));
        assert!(INDEX_HTML.contains("readProblem(response)"));
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            AgreementError::InvalidRequest("bad date".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AgreementError::NotAccepted.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AgreementError::MissingSignature { client: true, agency: true }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AgreementError::from(crate::error::SignatureError::NotDataUrl).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AgreementError::from(crate::error::RenderError::Layout("empty".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn header_filename_strips_quotes_and_non_ascii() {
        assert_eq!(header_filename("Ad_Agreement_\"Café\"_20240115.pdf"), "Ad_Agreement__Caf___20240115.pdf");
    }
}
