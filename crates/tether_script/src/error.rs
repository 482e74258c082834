use rquickjs::{Ctx, Exception, Value};
use std::fmt;
use thiserror::Error;

/// Errors returned by `ScriptRuntime::bind`. They never reach script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("type '{type_name}' is already bound (requested as '{name}')")]
    DuplicateBinding { name: String, type_name: String },

    #[error("cannot bind '{name}': {kind} is neither a struct nor a function")]
    UnsupportedTarget { name: String, kind: String },

    #[error("cannot install '{name}' on the global object: {message}")]
    Install { name: String, message: String },
}

/// Failures inside bridge callbacks. Always raised into script as an
/// exception, never returned to the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("property '{class}.{property}' not found")]
    PropertyNotFound { class: String, property: String },

    #[error("'{function}' expects {expected} argument(s), got {actual}")]
    ArgumentCountMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("cannot convert value for '{target}' to {expected}")]
    CoercionFailed { target: String, expected: String },

    #[error("'{function}' failed: {message}")]
    HostCall { function: String, message: String },

    #[error("class constructor '{class}' cannot be invoked without 'new'")]
    ConstructorCall { class: String },

    #[error("bridge is not installed on runtime {runtime}")]
    NotInstalled { runtime: u64 },
}

impl BridgeError {
    /// Raise as a script exception.
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        let message = self.to_string();
        match self {
            BridgeError::PropertyNotFound { .. } => Exception::throw_reference(ctx, &message),
            BridgeError::ArgumentCountMismatch { .. }
            | BridgeError::CoercionFailed { .. }
            | BridgeError::ConstructorCall { .. } => Exception::throw_type(ctx, &message),
            BridgeError::HostCall { .. } | BridgeError::NotInstalled { .. } => {
                Exception::throw_message(ctx, &message)
            }
        }
    }
}

/// An exception script threw and nothing caught.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptException {
    /// Error class name, empty when script threw a non-error value.
    pub name: String,
    pub message: String,
    pub line: Option<u32>,
    pub stack: Option<String>,
}

impl ScriptException {
    pub fn from_value(value: &Value<'_>) -> Self {
        let Some(object) = value.as_object() else {
            let message = value
                .get::<rquickjs::Coerced<String>>()
                .map(|text| text.0)
                .unwrap_or_default();
            return Self {
                message,
                ..Self::default()
            };
        };
        let text = |key: &str| object.get::<_, Option<String>>(key).ok().flatten();
        let stack = text("stack").filter(|stack| !stack.is_empty());
        let line = object
            .get::<_, Option<i32>>("lineNumber")
            .ok()
            .flatten()
            .and_then(|line| u32::try_from(line).ok())
            .or_else(|| stack.as_deref().and_then(line_from_stack));
        Self {
            name: text("name").unwrap_or_default(),
            message: text("message").unwrap_or_default(),
            line,
            stack,
        }
    }

    /// Take the pending exception of `ctx`.
    pub fn catch(ctx: &Ctx<'_>) -> Self {
        Self::from_value(&ctx.catch())
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for ScriptException {}

/// Line of the innermost frame, from `at fn (file:line)` or
/// `at fn (file:line:column)`.
fn line_from_stack(stack: &str) -> Option<u32> {
    stack.lines().find_map(|frame| {
        let start = frame.find('(')?;
        let end = frame[start..].find(')')? + start;
        let numbers: Vec<u32> = frame[start + 1..end]
            .rsplit(':')
            .map_while(|part| part.parse().ok())
            .collect();
        match numbers.as_slice() {
            [_, line, ..] => Some(*line),
            [line] => Some(*line),
            [] => None,
        }
    })
}

/// Host-side description of an engine error. A pending exception is taken
/// off the context.
pub(crate) fn describe(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    match error {
        rquickjs::Error::Exception => ScriptException::catch(ctx).to_string(),
        other => other.to_string(),
    }
}

/// Facade-level failures of `ScriptRuntime`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid runtime settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("uncaught {0}")]
    Script(#[from] ScriptException),

    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("cannot read script file: {0}")]
    Io(#[from] std::io::Error),

    #[error("global '{name}' is not a function")]
    NotAFunction { name: String },

    #[error("global '{name}' cannot be read as {expected}")]
    Conversion { name: String, expected: String },
}

impl RuntimeError {
    /// Turn an engine error into a `RuntimeError`, taking the pending
    /// exception when there is one.
    pub(crate) fn from_engine(ctx: &Ctx<'_>, error: rquickjs::Error) -> Self {
        match error {
            rquickjs::Error::Exception => RuntimeError::Script(ScriptException::catch(ctx)),
            other => RuntimeError::Engine(other),
        }
    }
}
