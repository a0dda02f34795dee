//! The frozen HTTP error envelope (SPEC_FULL §AMBIENT.4), extended past
//! the teacher's set with `forbidden`/`unauthorized` for `ErrNotAuthorized`
//! and `ErrSignature`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use core_model::NodeError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub type HttpResponse = Response;
pub type HttpResult<T = Json<serde_json::Value>> = Result<T, HttpResponse>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn conflict(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::CONFLICT, "CONFLICT", message)
}

pub fn gateway_timeout(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message)
}

pub fn forbidden(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message)
}

pub fn unauthorized(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

/// Maps the core error taxonomy (SPEC_FULL §7) onto the frozen envelope.
pub fn node_error_response(err: NodeError) -> HttpResponse {
    match err {
        NodeError::InvalidDocument(msg) => bad_request(msg),
        NodeError::Signature => unauthorized("signature verification failed"),
        NodeError::NotAuthorized(reason) => forbidden(reason),
        NodeError::NotFound(what) => not_found(what),
        NodeError::WrongDimension => conflict("peer belongs to a different dimension"),
        NodeError::RemoteNotSupported => {
            bad_request("remote timeline is not writable through the local post path")
        }
        NodeError::Transient(msg) => internal_error(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(
        response: Response,
        expected_status: StatusCode,
        expected_code: &str,
    ) {
        assert_eq!(response.status(), expected_status);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: HttpErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, expected_code);
    }

    #[tokio::test]
    async fn not_authorized_maps_to_forbidden() {
        let response = node_error_response(NodeError::NotAuthorized("not owner".to_owned()));
        assert_error_response(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
    }

    #[tokio::test]
    async fn signature_maps_to_unauthorized() {
        let response = node_error_response(NodeError::Signature);
        assert_error_response(response, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
    }

    #[tokio::test]
    async fn wrong_dimension_maps_to_conflict() {
        let response = node_error_response(NodeError::WrongDimension);
        assert_error_response(response, StatusCode::CONFLICT, "CONFLICT").await;
    }
}
