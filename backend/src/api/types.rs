//! REST API types.
//!
//! The upload body mirrors [`BatchRequest`] with rows as JSON objects; the
//! response is the batch [`Report`] plus a job identifier.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::batch::{BatchRequest, Report};
use crate::error::ServerError;
use crate::models::row_from_json;

/// Body of `POST /api/upload` and `POST /api/bots/process`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRequest {
    /// One object per input line.
    pub data: Vec<Map<String, Value>>,
    pub dryrun: bool,
    pub submit: bool,
    pub timezone: Option<String>,
    /// Overrides for custom input fields, keyed `custom_<field>`.
    pub custom: Map<String, Value>,
    pub validate_with_bots: bool,
}

impl From<UploadRequest> for BatchRequest {
    fn from(body: UploadRequest) -> Self {
        BatchRequest {
            rows: body.data.iter().map(row_from_json).collect(),
            dryrun: body.dryrun,
            submit: body.submit,
            timezone: body.timezone.filter(|tz| !tz.trim().is_empty()),
            custom: row_from_json(&body.custom),
            validate_with_bots: body.validate_with_bots,
        }
    }
}

/// Response of `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Unique job identifier
    pub job_id: String,
    #[serde(flatten)]
    pub report: Report,
}

impl From<Report> for UploadResponse {
    fn from(report: Report) -> Self {
        UploadResponse {
            job_id: Uuid::new_v4().to_string(),
            report,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "job_id": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Batch(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(error_response(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BatchError, RegistryError};

    #[test]
    fn test_upload_request_to_batch_request() {
        let body: UploadRequest = serde_json::from_value(json!({
            "data": [{ "source.ip": "127.0.0.1", "source.port": 80 }, {}],
            "submit": true,
            "timezone": "",
            "custom": { "custom_classification.identifier": "abc" }
        }))
        .unwrap();

        let request = BatchRequest::from(body);
        assert_eq!(request.rows.len(), 2);
        assert_eq!(request.rows[0]["source.port"], "80");
        assert!(request.submit);
        assert!(!request.dryrun);
        assert!(!request.validate_with_bots);
        assert_eq!(request.timezone, None);
        assert_eq!(request.custom["custom_classification.identifier"], "abc");
    }

    #[test]
    fn test_upload_response_flattens_report() {
        let response = UploadResponse::from(Report {
            input_lines: 3,
            ..Report::default()
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["input_lines"], 3);
        assert!(json["job_id"].is_string());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ServerError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServerError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let batch = ServerError::from(BatchError::from(RegistryError::UnknownKind {
            id: "a".into(),
            kind: "b".into(),
        }));
        assert_eq!(batch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
