//! Error handling for the scheduler core.
//!
//! - Structured error codes matching the taxonomy described for the scheduler
//! - Error chaining with context
//! - User-friendly vs internal messages
//! - Tracing integration

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// A specialized Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes, one family per kind named in the error
/// handling design: general scheduler invariant violations, store failures,
/// duplicate-without-replace, job execution failures, interrupt failures,
/// and configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// General scheduler invariant violation.
    SchedulerError,
    /// The store could not read or write.
    JobPersistenceError,
    /// A store mutation without `replace` collided with an existing record.
    ObjectAlreadyExists,
    /// A user job raised an execution error.
    JobExecutionError,
    /// A non-interruptible job was asked to interrupt.
    UnableToInterruptJob,
    /// A configuration value was invalid or missing.
    ConfigurationError,
    /// Caller passed invalid arguments.
    InvalidArgument,
    /// Requested key does not exist in the store.
    NotFound,
    /// Unexpected internal condition.
    InternalError,
}

impl ErrorCode {
    /// Whether an error of this kind is generally worth retrying.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::JobPersistenceError)
    }

    /// Coarse category, used for log grouping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::SchedulerError => "scheduler",
            Self::JobPersistenceError => "store",
            Self::ObjectAlreadyExists => "store",
            Self::JobExecutionError => "job",
            Self::UnableToInterruptJob => "job",
            Self::ConfigurationError => "config",
            Self::InvalidArgument => "validation",
            Self::NotFound => "store",
            Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity id (job key, trigger key, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type ("job", "trigger", "calendar", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The scheduler's error type.
#[derive(Error, Debug)]
pub struct SchedulerError {
    /// Machine-readable error code.
    code: ErrorCode,

    /// User-facing message.
    message: Cow<'static, str>,

    /// Additional internal detail, logged but not necessarily surfaced.
    internal_message: Option<String>,

    /// Structured details.
    details: ErrorDetails,

    /// The source error that caused this one.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl SchedulerError {
    /// Create a new error with a code and user message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        }
    }

    /// Create an error with both a user and an internal message.
    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Scheduler invariant violation.
    pub fn scheduler(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::SchedulerError, message)
    }

    /// Store read/write failure.
    pub fn persistence(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_internal(ErrorCode::JobPersistenceError, "job store operation failed", message)
    }

    /// Duplicate key without `replace`.
    pub fn already_exists(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::ObjectAlreadyExists,
            format!("{} already exists: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    /// Job body raised an execution error.
    pub fn job_execution(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_internal(ErrorCode::JobExecutionError, "job execution failed", message)
    }

    /// A non-interruptible job was asked to interrupt.
    pub fn unable_to_interrupt(entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::UnableToInterruptJob,
            format!("job does not support interruption: {}", entity_id),
        )
        .with_details(ErrorDetails::new().with_entity("job", entity_id))
    }

    /// Configuration problem, fatal to scheduler construction.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Caller passed a null/invalid argument.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Key not found in the store.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    /// Unexpected internal condition.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_internal(ErrorCode::InternalError, "internal scheduler error", message)
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Log this error at a severity appropriate to its code.
    pub fn log(&self) {
        match self.code {
            ErrorCode::InternalError | ErrorCode::SchedulerError => {
                error!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.message,
                    internal_message = ?self.internal_message,
                    "scheduler error"
                );
            }
            _ => {
                warn!(
                    error_code = %self.code,
                    category = self.code.category(),
                    message = %self.message,
                    "scheduler error"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to fallible results.
pub trait ErrorContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| SchedulerError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| SchedulerError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| SchedulerError::new(ErrorCode::NotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| SchedulerError::new(code, "resource not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_carries_entity() {
        let err = SchedulerError::already_exists("trigger", "DEFAULT.t1");
        assert_eq!(err.code(), ErrorCode::ObjectAlreadyExists);
        assert_eq!(err.details().entity_id.as_deref(), Some("DEFAULT.t1"));
    }

    #[test]
    fn context_wraps_std_error() {
        let res: std::result::Result<(), std::num::ParseIntError> = "x".parse::<i32>().map(|_| ());
        let wrapped = res.context("parsing failed");
        assert!(wrapped.is_err());
        assert_eq!(wrapped.unwrap_err().code(), ErrorCode::InternalError);
    }

    #[test]
    fn option_context_not_found() {
        let opt: Option<i32> = None;
        let err = opt.context("missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
