//! Fault barrier for plugin-authored code
//!
//! Everything a plugin hands to the host (activation entry points, IPC
//! handlers, event subscribers, web-request listeners, menu contributors) runs
//! through [`run_isolated`]. Both returned errors and panics are folded into a
//! [`Fault`] so the caller can log it and carry on.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A failure raised by plugin code
#[derive(Debug)]
pub enum Fault {
    /// The callback returned an error
    Error(anyhow::Error),
    /// The callback panicked
    Panic(String),
}

impl Fault {
    /// Whether the fault came from a panic rather than a returned error
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e:#}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// Run a plugin callback, catching both errors and panics
///
/// # Errors
///
/// Returns a [`Fault`] if the callback returned an error or panicked
pub fn run_isolated<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Fault> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Fault::Error(e)),
        Err(payload) => Err(Fault::Panic(panic_message(payload.as_ref()))),
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
