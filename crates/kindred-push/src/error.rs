use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("push gateway rejected the batch: {0}")]
    Rejected(String),

    #[error("unreadable push gateway response: {0}")]
    Decode(String),
}
