use thiserror::Error;

pub type BindResult<T> = Result<T, BindError>;

/// Which index of an element access was out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Col => write!(f, "column"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("invalid element type '{given}'; must be one of {supported}")]
    InvalidType { given: String, supported: String },

    #[error("failed to construct native matrix '{symbol}': null handle returned")]
    ConstructionFailure { symbol: String },

    #[error("native operation '{operation}' failed (code {code}): {message}")]
    NativeOperation {
        operation: String,
        code: i32,
        message: String,
    },

    #[error("cannot derive a {expected} matrix view from {found}")]
    IncompatibleSource { expected: String, found: String },

    #[error("{axis} index {index} out of range for extent {bound}")]
    Range { axis: Axis, index: isize, bound: usize },

    #[error("'{operation}' on a null native matrix handle")]
    NullHandle { operation: String },

    #[error("symbol '{symbol}' not found in '{library}': {message}")]
    SymbolNotFound {
        symbol: String,
        library: String,
        message: String,
    },

    #[error("failed to load native library '{library}': {message}")]
    LibraryLoad { library: String, message: String },
}

impl BindError {
    pub(crate) fn native(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BindError::NativeOperation {
            operation: operation.into(),
            code: -1,
            message: message.into(),
        }
    }

    pub(crate) fn null_handle(operation: impl Into<String>) -> Self {
        BindError::NullHandle {
            operation: operation.into(),
        }
    }
}
