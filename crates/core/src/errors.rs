use thiserror::Error;

/// Failures that cross a component boundary. Dialogue validation problems are
/// not errors: the engine answers them with a re-prompt instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("record store failure: {0}")]
    Store(String),
    #[error("chat transport failure: {0}")]
    Transport(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Safe one-liner shown to the end user; details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Store(_) => "Something went wrong while saving or reading data. Please try again later.",
            Self::Transport(_) => "The chat service is temporarily unavailable. Please retry shortly.",
            Self::Configuration(_) => "An unexpected internal error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApplicationError;

    #[test]
    fn store_failure_maps_to_generic_retry_message() {
        let error = ApplicationError::Store("insert returned 503".to_owned());
        assert_eq!(
            error.user_message(),
            "Something went wrong while saving or reading data. Please try again later."
        );
    }

    #[test]
    fn details_are_kept_in_the_display_form_only() {
        let error = ApplicationError::Transport("connection reset".to_owned());
        assert!(error.to_string().contains("connection reset"));
        assert!(!error.user_message().contains("connection reset"));
    }
}
