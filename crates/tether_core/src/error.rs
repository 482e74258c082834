use thiserror::Error;

/// Failure of a host function invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("argument {index} cannot be converted to {expected}")]
    Argument { index: usize, expected: String },

    /// The host function returned `Err`.
    #[error("{message}")]
    Failed { message: String },

    #[error("receiver is not a '{expected}'")]
    Receiver { expected: &'static str },

    #[error("function value was never assigned")]
    Unset,

    #[error("script function threw: {message}")]
    Script { message: String },

    #[error("script runtime has been dropped")]
    RuntimeGone,
}
