// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Remote key, property or cluster object is absent.
    #[error("{0}")]
    NotFound(String),

    /// Credentials were rejected by the backend.
    #[error("{0}")]
    AuthError(String),

    /// Network, rate-limit or deadline failure; retried with backoff.
    #[error("{0}")]
    Transient(String),

    /// Malformed resource spec or provider configuration.
    #[error("{0}")]
    ValidationError(String),

    /// Merge rule collision under the `Error` conflict policy.
    #[error("{0}")]
    ConflictError(String),

    #[error("{0}")]
    TemplateError(String),

    #[error("{0}")]
    GeneratorError(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FerryError>,
    },

    #[error("Finalizer error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<FerryError>>),
}

/// Classification of the innermost error, used to pick log levels and
/// to decide how deletion policies react to missing remote data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Kube,
    NotFound,
    Auth,
    Transient,
    Validation,
    Conflict,
    Template,
    Generator,
    Finalizer,
}

impl FerryError {
    /// Wrap the error with a prefix naming the failing store, key or stage.
    pub fn context(self, context: impl Into<String>) -> Self {
        FerryError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FerryError::KubeError(kube::Error::Api(resp)) if resp.code == 404 => {
                ErrorKind::NotFound
            }
            FerryError::KubeError(_) => ErrorKind::Kube,
            FerryError::NotFound(_) => ErrorKind::NotFound,
            FerryError::AuthError(_) => ErrorKind::Auth,
            FerryError::Transient(_) => ErrorKind::Transient,
            FerryError::ValidationError(_) => ErrorKind::Validation,
            FerryError::ConflictError(_) => ErrorKind::Conflict,
            FerryError::TemplateError(_) => ErrorKind::Template,
            FerryError::GeneratorError(_) => ErrorKind::Generator,
            FerryError::Context { source, .. } => source.kind(),
            FerryError::FinalizerError(_) => ErrorKind::Finalizer,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Attach context to the error side of a result.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;
