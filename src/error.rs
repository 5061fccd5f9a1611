use crate::core::{ErrorObject, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PromiseError {
    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("Chaining cycle detected for promise #{id}")]
    ChainingCycle { id: usize },

    #[error("Can't {action} a non-pending promise (state: {state})")]
    AlreadySettled { action: &'static str, state: &'static str },

    #[error("Task budget exceeded (executed {executed} tasks)")]
    TaskBudgetExceeded { executed: usize },

    #[error("Timer delay {delay:?} is out of range")]
    DelayOutOfRange { delay: std::time::Duration },

    #[error("Timer thread unavailable: {message}")]
    TimerThread { message: String },

    #[error("Thrown value: {value}")]
    Throw { value: Value },
}

impl PromiseError {
    /// Wrap an arbitrary value as a thrown error.
    pub fn throw(value: impl Into<Value>) -> Self {
        PromiseError::Throw { value: value.into() }
    }

    /// The value a promise is rejected with when this error reaches it.
    ///
    /// Thrown values pass through untouched; engine errors become error
    /// objects carrying the error name and message.
    pub fn into_reason(self) -> Value {
        match self {
            PromiseError::Throw { value } => value,
            PromiseError::TypeError { message } => Value::Error(ErrorObject::new("TypeError", message)),
            other @ PromiseError::ChainingCycle { .. } => Value::Error(ErrorObject::new("TypeError", other.to_string())),
            other => Value::Error(ErrorObject::new("Error", other.to_string())),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PromiseError::Throw { value } => format!("Uncaught {value}"),
            other => other.to_string(),
        }
    }
}

impl From<Value> for PromiseError {
    fn from(value: Value) -> Self {
        PromiseError::Throw { value }
    }
}

// Builds a TypeError from a format string. A macro keeps call sites as
// terse as the `format!` they wrap.
#[macro_export]
macro_rules! raise_type_error {
    ($($arg:tt)*) => {
        $crate::PromiseError::TypeError {
            message: format!($($arg)*),
        }
    };
}
