use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// The login route answers bad credentials with 400 (missing fields)
    /// or 401 (wrong password); everything else maps like any other call.
    pub fn from_login_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 401 => ApiError::InvalidCredentials,
            _ => Self::from_status(status, body),
        }
    }

    /// Whether the error means the session token is no longer accepted
    pub fn is_session_rejected(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "no"), ApiError::AccessDenied(b) if b == "no"));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_REQUEST, "x"), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_login_status_mapping() {
        assert!(matches!(ApiError::from_login_status(StatusCode::UNAUTHORIZED, ""), ApiError::InvalidCredentials));
        assert!(matches!(ApiError::from_login_status(StatusCode::BAD_REQUEST, "missing"), ApiError::InvalidCredentials));
        assert!(matches!(ApiError::from_login_status(StatusCode::FORBIDDEN, "locked"), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_login_status(StatusCode::INTERNAL_SERVER_ERROR, ""), ApiError::ServerError(_)));
    }

    #[test]
    fn test_session_rejected_only_for_unauthorized() {
        assert!(ApiError::Unauthorized.is_session_rejected());
        assert!(!ApiError::InvalidCredentials.is_session_rejected());
        assert!(!ApiError::NotAuthenticated.is_session_rejected());
    }

    #[test]
    fn test_long_body_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert!(truncated.len() < body.len());
    }
}
