use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Enhancement error: {0}")]
    Enhancement(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
