use handoff_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend error {status}: {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("delivery webhook returned {status}: {message}")]
    Delivery { status: u16, message: String },
    #[error("auth error: {0}")]
    Auth(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("realtime channel is closed")]
    ChannelClosed,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::WebSocket(Box::new(value))
    }
}

impl GatewayError {
    /// Duplicate-key violation (postgres 23505 or HTTP 409).
    pub fn is_conflict(&self) -> bool {
        match self {
            GatewayError::Backend { status, code, .. } => {
                *status == 409 || code.as_deref() == Some("23505")
            }
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            GatewayError::Backend {
                status: 401 | 403,
                ..
            }
        )
    }

    /// Transport failures and 5xx answers; the backend may be fine again later.
    pub fn is_unavailable(&self) -> bool {
        match self {
            GatewayError::Http(err) => err.is_connect() || err.is_timeout(),
            GatewayError::Backend { status, .. } => *status >= 500,
            GatewayError::WebSocket(_) | GatewayError::ChannelClosed => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::GatewayError;

    fn backend(status: u16, code: Option<&str>) -> GatewayError {
        GatewayError::Backend {
            status,
            code: code.map(str::to_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn conflict_detection_uses_status_or_code() {
        assert!(backend(409, None).is_conflict());
        assert!(backend(400, Some("23505")).is_conflict());
        assert!(!backend(400, Some("22P02")).is_conflict());
        assert!(backend(401, None).is_unauthorized());
        assert!(backend(503, None).is_unavailable());
    }
}
