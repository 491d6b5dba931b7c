//! Staffing error types.

use thiserror::Error;

use u_metaheur::cp::SolverStatus;
use crate::validation::ValidationError;

/// Errors that can occur while preparing or solving a staffing problem.
#[derive(Debug, Error)]
pub enum StaffingError {
    #[error("invalid input: {}", join_errors(.0))]
    InvalidInput(Vec<ValidationError>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("no schedule found (solver status: {status:?})")]
    NoSolution { status: SolverStatus },
}

pub type StaffingResult<T> = Result<T, StaffingError>;

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
