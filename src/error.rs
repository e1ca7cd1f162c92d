use thiserror::Error;

/// Main error type for building and running universal functions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UfuncError {
    /// Argument count does not match the scalar function's arity
    #[error("Arity error in {context}: expected {expected} argument(s), got {got}")]
    Arity {
        expected: usize,
        got: usize,
        context: String,
    },

    /// A specialization with an identical signature is already registered
    #[error("Duplicate signature: {0} is already registered")]
    DuplicateSignature(String),

    /// The kernel compiler could not produce a kernel for a signature
    #[error("Compilation error for {signature}: {message}")]
    Compilation {
        signature: String,
        message: String,
    },

    /// No specialization is reachable by exact match or safe upcast
    #[error("Type mismatch: no specialization accepts ({requested}); registered: [{available}]")]
    TypeMismatch {
        requested: String,
        available: String,
    },

    /// Input shapes cannot be broadcast together
    #[error("Shape broadcast error at axis {axis}: shapes {shapes} are not compatible")]
    ShapeBroadcast {
        axis: usize,
        shapes: String,
    },

    /// A named core dimension was bound to two different sizes
    #[error("Core dimension '{name}' mismatch: expected {expected}, got {got}")]
    CoreDimension {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Device transfer or launch failure
    #[error("Device error: {0}")]
    Device(String),

    #[error("Axis {axis} is out of bounds for array of dimension {ndim}")]
    AxisOutOfBounds {
        axis: usize,
        ndim: usize,
    },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Unsupported operation errors
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UfuncError {
    /// Create an arity error with the operation it was raised from
    pub fn arity(context: &str, expected: usize, got: usize) -> Self {
        UfuncError::Arity {
            expected,
            got,
            context: context.to_string(),
        }
    }

    /// Create a compilation error for a signature
    pub fn compilation(signature: impl ToString, message: impl ToString) -> Self {
        UfuncError::Compilation {
            signature: signature.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a broadcast error naming the offending axis and every input shape
    pub fn shape_broadcast(axis: usize, shapes: &[&[usize]]) -> Self {
        let rendered = shapes
            .iter()
            .map(|s| format!("{:?}", s))
            .collect::<Vec<_>>()
            .join(", ");
        UfuncError::ShapeBroadcast {
            axis,
            shapes: rendered,
        }
    }

    /// Create a device error with the device it came from
    pub fn device(device: &str, message: &str) -> Self {
        UfuncError::Device(format!("Device '{}': {}", device, message))
    }
}

impl From<std::io::Error> for UfuncError {
    fn from(err: std::io::Error) -> Self {
        UfuncError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UfuncError {
    fn from(err: serde_json::Error) -> Self {
        UfuncError::Serialization(err.to_string())
    }
}

/// Result type for ufunc operations
pub type UfuncResult<T> = Result<T, UfuncError>;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ArityMismatch,
    DuplicateSignature,
    CompilationFailed,
    TypeMismatch,
    ShapeMismatch,
    DeviceFailure,
    InvalidOperation,
    ConfigInvalid,
    InternalError,
}

impl UfuncError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            UfuncError::Arity { .. } => ErrorCode::ArityMismatch,
            UfuncError::DuplicateSignature(_) => ErrorCode::DuplicateSignature,
            UfuncError::Compilation { .. } => ErrorCode::CompilationFailed,
            UfuncError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            UfuncError::ShapeBroadcast { .. } => ErrorCode::ShapeMismatch,
            UfuncError::CoreDimension { .. } => ErrorCode::ShapeMismatch,
            UfuncError::AxisOutOfBounds { .. } => ErrorCode::ShapeMismatch,
            UfuncError::Device(_) => ErrorCode::DeviceFailure,
            UfuncError::InvalidInput(_) => ErrorCode::InvalidOperation,
            UfuncError::InvalidState(_) => ErrorCode::InvalidOperation,
            UfuncError::UnsupportedOperation(_) => ErrorCode::InvalidOperation,
            UfuncError::Configuration(_) => ErrorCode::ConfigInvalid,
            UfuncError::Io(_) => ErrorCode::ConfigInvalid,
            UfuncError::Serialization(_) => ErrorCode::ConfigInvalid,
            UfuncError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if this is a recoverable error.
    ///
    /// Only device failures are: the host loop can always redo the work.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.code(), ErrorCode::DeviceFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_broadcast_message_names_axis_and_shapes() {
        let error = UfuncError::shape_broadcast(0, &[&[8, 10], &[7, 10]]);
        let message = error.to_string();
        assert!(message.contains("axis 0"));
        assert!(message.contains("[8, 10]"));
        assert!(message.contains("[7, 10]"));
    }

    #[test]
    fn test_arity_message() {
        let error = UfuncError::arity("call", 2, 3);
        assert_eq!(
            error.to_string(),
            "Arity error in call: expected 2 argument(s), got 3"
        );
    }

    #[test]
    fn test_error_codes() {
        let shape_error = UfuncError::shape_broadcast(1, &[&[2, 3], &[2, 4]]);
        assert_eq!(shape_error.code(), ErrorCode::ShapeMismatch);
        assert!(!shape_error.is_recoverable());

        let device_error = UfuncError::device("cuda:0", "launch failed");
        assert_eq!(device_error.code(), ErrorCode::DeviceFailure);
        assert!(device_error.is_recoverable());
        assert!(device_error.to_string().contains("cuda:0"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: UfuncError = io.into();
        assert_eq!(error.code(), ErrorCode::ConfigInvalid);
    }
}
