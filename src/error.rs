use thiserror::Error;

/// The error taxonomy for the core computational pipeline (dosage algebra,
/// intake extraction, PK calculation). Leaves validate and fail fast;
/// composites never attempt recovery.
#[derive(Error, Debug)]
pub enum PkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid precondition: {0}")]
    InvalidPrecondition(String),

    #[error("intake extraction error: {0}")]
    IntakeExtractionError(String),

    #[error("unit conversion error: no known conversion from {from} to {to}")]
    UnitConversionError { from: String, to: String },

    #[error("calculation error: {0}")]
    CalculationError(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type PkResult<T> = Result<T, PkError>;

/// Maps the error taxonomy to a process exit code, for the CLI entry point.
/// Ok is implicitly 0; this only covers the error path.
pub fn exit_code(error: &PkError) -> i32 {
    match error {
        PkError::Io(_) => 1,
        PkError::Json(_) => 2,
        PkError::InvalidPrecondition(_) => 10,
        PkError::IntakeExtractionError(_) => 11,
        PkError::UnitConversionError { .. } => 12,
        PkError::CalculationError(_) => 13,
        PkError::InvariantViolation(_) => 14,
    }
}
