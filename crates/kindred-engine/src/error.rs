use thiserror::Error;

use kindred_types::lifecycle::TransitionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("not a participant of this match")]
    NotParticipant,

    #[error("a rejected match cannot be accepted again")]
    DecisionFinal,

    #[error("message is empty or too long")]
    EmptyMessage,

    #[error("match is not confirmed")]
    MatchNotConfirmed,

    #[error("no scenario responses recorded")]
    NoResponses,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Lost a race against a concurrent writer. Callers drop the write.
    #[error("conflicting concurrent write")]
    Conflict,

    #[error("dependency unavailable: {0}")]
    Dependency(#[from] anyhow::Error),
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::DecisionFinal => Self::DecisionFinal,
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Dependency(anyhow::anyhow!("blocking task failed: {}", err))
    }
}
