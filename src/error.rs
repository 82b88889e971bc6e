use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The server refused the session token (HTTP 401).
    #[error("session expired or invalid, please sign in again")]
    Unauthorized,

    #[error("not signed in")]
    NotSignedIn,

    #[error("HTTP {0}")]
    Http(reqwest::StatusCode),

    /// The server answered with a readable rejection (bad credentials, validation).
    #[error("{0}")]
    Rejected(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("hub handshake failed: {0}")]
    Handshake(String),

    #[error("hub protocol error: {0}")]
    Protocol(String),

    /// A hub invocation completed with an error.
    #[error("hub invocation failed: {0}")]
    Invocation(String),

    #[error("real-time channel is not connected")]
    NotConnected,

    #[error("message is empty")]
    EmptyMessage,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e.to_string())
    }
}
