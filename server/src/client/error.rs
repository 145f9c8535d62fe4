use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("model request failed: {0}")]
    Model(String),

    #[error("timed out after {0:?} waiting for authorization")]
    AuthTimeout(std::time::Duration),
}
