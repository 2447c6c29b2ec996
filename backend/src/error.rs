use livedesk_frontend::RecordError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server rejected request with HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<RecordError> for ClientError {
    fn from(err: RecordError) -> Self {
        ClientError::InvalidResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("initial blog load failed after {attempts} attempts: {source}")]
    InitialLoad {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
