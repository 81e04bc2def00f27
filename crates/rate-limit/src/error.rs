use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AdmissionError {
    #[error("refill rate must be a positive, finite number of tokens per second (got {0})")]
    InvalidRate(f64),

    #[error("burst must be at least 1")]
    InvalidBurst,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} must not exceed {1:?}")]
    DurationTooLarge(&'static str, std::time::Duration),

    #[error("the admission reaper needs a running Tokio runtime")]
    NoRuntime,

    #[error("the admission reaper is already running")]
    AlreadyStarted,
}
