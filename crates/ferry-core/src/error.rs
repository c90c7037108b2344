//! Error types for ferry-core
//!
//! Every failure that can happen while binding, marshaling or invoking is a
//! [`BridgeError`]. At the call boundary these are folded into a
//! [`CallResult`](crate::dispatch::CallResult) carrying a non-zero exception code.

use std::num::NonZeroI32;
use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failure raised by the foreign (JavaScript) side of a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error_type}: {message}")]
pub struct ForeignError {
    /// Error constructor name on the foreign side (e.g. `TypeError`)
    pub error_type: String,
    /// Error message, possibly empty
    pub message: String,
}

impl ForeignError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// A plain `Error` thrown by foreign code
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }
}

/// Errors that can occur while crossing the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed signature text
    #[error("Invalid signature {text:?}: unknown tag {tag:?} at position {position}")]
    Signature {
        text: String,
        tag: char,
        position: usize,
    },

    /// Qualified name could not be resolved by the method table
    #[error("Method not found: {name}{}", format_reason(reason))]
    MethodNotFound {
        name: String,
        reason: Option<String>,
    },

    /// Argument count does not match the bound signature
    #[error("Arity mismatch calling {method}: expected {expected} arguments, got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// Value's runtime type is incompatible with the declared tag
    #[error("Marshal type mismatch: expected {expected}, got {actual}")]
    MarshalTypeMismatch { expected: String, actual: String },

    /// A different marshaler is already registered for the type
    #[error("A different custom marshaler is already registered for {0}")]
    DuplicateMarshaler(String),

    /// No marshaler is registered for the type
    #[error("No custom marshaler registered for {0}")]
    UnknownType(String),

    /// Interned string reference that is not resident in the table
    #[error("Interned string #{0} is not resident")]
    InvalidInternedString(u32),

    /// Exception thrown on the foreign side
    #[error(transparent)]
    Foreign(#[from] ForeignError),

    /// Managed target returned an error or panicked
    #[error("Managed exception: {0}")]
    Managed(String),
}

fn format_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({})", reason),
        None => String::new(),
    }
}

const fn exception_code(code: i32) -> NonZeroI32 {
    match NonZeroI32::new(code) {
        Some(code) => code,
        None => panic!("exception codes must be non-zero"),
    }
}

impl BridgeError {
    pub fn method_not_found(name: impl Into<String>) -> Self {
        Self::MethodNotFound {
            name: name.into(),
            reason: None,
        }
    }

    pub fn malformed_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MethodNotFound {
            name: name.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::MarshalTypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn managed(message: impl Into<String>) -> Self {
        Self::Managed(message.into())
    }

    /// Exception code reported through the call protocol.
    ///
    /// Codes are stable per variant; `1` is reserved for foreign exceptions.
    pub fn code(&self) -> NonZeroI32 {
        match self {
            Self::Foreign(_) => exception_code(1),
            Self::Managed(_) => exception_code(2),
            Self::Signature { .. } => exception_code(3),
            Self::MethodNotFound { .. } => exception_code(4),
            Self::ArityMismatch { .. } => exception_code(5),
            Self::MarshalTypeMismatch { .. } => exception_code(6),
            Self::DuplicateMarshaler(_) => exception_code(7),
            Self::UnknownType(_) => exception_code(8),
            Self::InvalidInternedString(_) => exception_code(9),
        }
    }

    /// Short name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Foreign(_) => "ForeignError",
            Self::Managed(_) => "ManagedError",
            Self::Signature { .. } => "SignatureError",
            Self::MethodNotFound { .. } => "MethodNotFoundError",
            Self::ArityMismatch { .. } => "ArityMismatchError",
            Self::MarshalTypeMismatch { .. } => "MarshalTypeMismatchError",
            Self::DuplicateMarshaler(_) => "DuplicateMarshalerError",
            Self::UnknownType(_) => "UnknownTypeError",
            Self::InvalidInternedString(_) => "InvalidInternedStringError",
        }
    }

    /// Whether a later retry can succeed after external registration
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MethodNotFound { .. } | Self::UnknownType(_))
    }
}
