//! Context helpers for attaching a message to foreign errors.

use super::{Result, TransferError};

/// Attach context to any standard error, producing [`TransferError::WithContext`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|err| TransferError::WithContext {
            context: context.into(),
            source: Box::new(err),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| TransferError::WithContext {
            context: f(),
            source: Box::new(err),
        })
    }
}

/// Turn a missing setting into [`TransferError::Config`].
pub trait OptionExt<T> {
    fn required(self, key: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, key: &str) -> Result<T> {
        self.ok_or_else(|| TransferError::Config(format!("missing required setting '{key}'")))
    }
}
