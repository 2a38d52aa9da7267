//! Convenience result type alias for CaseLink.

use crate::error::AppError;

/// A specialized `Result` type for CaseLink operations.
pub type AppResult<T> = Result<T, AppError>;
