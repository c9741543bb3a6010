use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::LeadflowError;
use crate::model::{Role, Session};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const TEAM_ID_HEADER: &str = "x-team-id";

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Error wrapper that renders as `{ "success": false, "error": ... }`.
#[derive(Debug)]
pub struct ApiError(pub LeadflowError);

impl From<LeadflowError> for ApiError {
    fn from(e: LeadflowError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            LeadflowError::LeadNotFound(_)
            | LeadflowError::CloserNotFound(_)
            | LeadflowError::TeamNotFound(_) => StatusCode::NOT_FOUND,
            LeadflowError::Conflict { .. } => StatusCode::CONFLICT,
            LeadflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            LeadflowError::Validation(_) | LeadflowError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            LeadflowError::Io(_) | LeadflowError::Serialization(_) | LeadflowError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (
            status,
            Json(ErrorBody {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller identity from `x-user-*` / `x-team-id` headers, set by the
/// authenticating proxy in front of this service.
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let missing = |name: &str| {
            ApiError(LeadflowError::Forbidden(format!("missing {} header", name)))
        };

        let uid = header(parts, USER_ID_HEADER).ok_or_else(|| missing(USER_ID_HEADER))?;
        let role: Role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| missing(USER_ROLE_HEADER))?
            .parse()
            .map_err(|e: String| ApiError(LeadflowError::Forbidden(e)))?;
        let team_id = header(parts, TEAM_ID_HEADER).ok_or_else(|| missing(TEAM_ID_HEADER))?;
        let name = header(parts, USER_NAME_HEADER).unwrap_or(uid);

        Ok(Session::new(uid, name, role, team_id))
    }
}
