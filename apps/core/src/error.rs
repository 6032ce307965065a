use chrono::NaiveDate;
use thiserror::Error;

/// Bad user input. Always recovered inside the turn by re-prompting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("phone number must consist of digits only")]
    NonDigitPhone,
    #[error("name must not be empty")]
    EmptyName,
    #[error("day {day} does not exist in {year}-{month:02}")]
    DayOutOfRange { year: i32, month: u32, day: u32 },
    #[error("{0} is in the past")]
    PastDate(NaiveDate),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// A value the current step depends on is no longer in the session store.
    #[error("session data expired")]
    SessionExpired,
    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::StorageUnavailable(err)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
