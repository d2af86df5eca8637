//! RFC-7807 problem payloads and the mapping from store failures.
//!
//! Keep the domain free of transport concerns: handlers and the store speak
//! [`StoreError`]; this module translates into HTTP responses. Policy-gate
//! rejections are data (`changed=false` plus alerts), never problems.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::ports::StoreError;

/// Problem-details payload returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    fn new(status: StatusCode, title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: "about:blank".to_owned(),
            title: title.into(),
            status: status.as_u16(),
            detail,
            instance: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            Some(detail.into()),
        )
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden", Some(detail.into()))
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found", None)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "Conflict", Some(detail.into()))
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Not Ready",
            Some(detail.into()),
        )
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error", None)
    }

    /// Attach the request path as the problem instance.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.title),
            None => f.write_str(&self.title),
        }
    }
}

impl ResponseError for Problem {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/problem+json")
            .json(self)
    }
}

impl From<StoreError> for Problem {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Problem::not_found(),
            StoreError::Conflict { message } => Problem::conflict(message),
            StoreError::Backend { message } => {
                // Persistence details stay in the logs, not in the payload.
                error!(%message, "store backend failure");
                Problem::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn store_errors_map_to_statuses() {
        assert_eq!(Problem::from(StoreError::NotFound).status, 404);
        assert_eq!(Problem::from(StoreError::conflict("stale")).status, 409);
        assert_eq!(Problem::from(StoreError::backend("boom")).status, 500);
    }

    #[rstest]
    fn internal_problems_hide_details() {
        let problem = Problem::from(StoreError::backend("connection string leaked"));
        assert!(problem.detail.is_none());
    }

    #[rstest]
    fn serialises_the_rfc7807_shape() {
        let problem = Problem::bad_request("missing planDate").with_instance("/v1/optimize");
        let json = serde_json::to_value(&problem).expect("serialise");
        assert_eq!(json["type"], "about:blank");
        assert_eq!(json["title"], "Invalid request");
        assert_eq!(json["status"], 400);
        assert_eq!(json["instance"], "/v1/optimize");
    }
}
