use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::UntypedHandle;

/// Error produced by a load routine.
///
/// Cheap to clone: the same error is handed to every waiter of the resource
/// and stays stored on it afterwards.
#[derive(Clone)]
pub struct LoadError(Arc<anyhow::Error>);

impl LoadError {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        LoadError(Arc::new(error.into()))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        LoadError(Arc::new(anyhow::Error::msg(message)))
    }

    /// The underlying error, with its context chain.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for LoadError {
    fn from(error: anyhow::Error) -> Self {
        LoadError(Arc::new(error))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors reported by the registry and the resource managers.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("{0:?} is not a registered resource handle")]
    UnknownHandle(UntypedHandle),

    #[error("{0:?} is not loaded in this resource manager")]
    NotLoaded(UntypedHandle),

    #[error("{0:?} has not finished loading yet")]
    NotDone(UntypedHandle),

    #[error("resource {0:?} belongs to another resource manager")]
    ForeignResource(UntypedHandle),

    #[error("data of {0:?} does not have the requested type")]
    WrongType(UntypedHandle),

    #[error("resource failed to load: {0}")]
    LoadFailure(#[source] LoadError),

    #[error("resource manager went away before {0:?} finished loading")]
    Abandoned(UntypedHandle),
}

impl ResourceError {
    /// The load error, when this is a `LoadFailure`.
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            ResourceError::LoadFailure(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn load_error_keeps_context_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        let error: anyhow::Error = Err::<(), _>(io)
            .context("failed to read image")
            .unwrap_err();
        let error = LoadError::from(error);

        assert_eq!(error.to_string(), "failed to read image");
        assert_eq!(error.inner().chain().count(), 2);

        let copy = error.clone();
        assert_eq!(format!("{copy}"), format!("{error}"));
    }

    #[test]
    fn load_failure_exposes_error() {
        let error = ResourceError::LoadFailure(LoadError::msg("boom"));
        assert_eq!(error.load_error().map(|e| e.to_string()), Some("boom".into()));
        assert!(ResourceError::NotDone(UntypedHandle::new()).load_error().is_none());
    }
}
