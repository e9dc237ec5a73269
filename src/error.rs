use thiserror::Error;

/// Failure kinds for the decision core.
///
/// None of these are fatal. A failed source degrades to a Hold vote and a
/// failed price fetch degrades to "no exit"; the engine logs the kind at its
/// single reporting boundary instead of each call site printing ad hoc.
#[derive(Debug, Error)]
pub enum BotError {
    /// Price series too short for the requested indicator, or the fetch
    /// itself failed.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// Classifier missing or unreadable. AI voting stays disabled for the
    /// rest of the session.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A third-party call failed (news scrape, quote endpoint).
    #[error("external service error: {0}")]
    ExternalService(String),
}

impl BotError {
    pub fn data<S: Into<String>>(msg: S) -> Self {
        BotError::DataUnavailable(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        BotError::ModelUnavailable(msg.into())
    }

    pub fn external<S: Into<String>>(msg: S) -> Self {
        BotError::ExternalService(msg.into())
    }
}
