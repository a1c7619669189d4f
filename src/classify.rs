//! Error kinds used to decide whether an error-level event should wake the
//! registered error hooks.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DoesNotExist,
    AlreadyExist,
    Inconsistent,
    Validation,
    General,
    Forbidden,
    Business,
}

/// Kinds that describe handled domain conditions rather than faults.
pub fn is_expected(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::DoesNotExist
            | ErrorKind::AlreadyExist
            | ErrorKind::Inconsistent
            | ErrorKind::Validation
            | ErrorKind::Forbidden
    )
}

/// Whether any error in the `source()` chain of `err` is a
/// [`KindedError`] of an expected kind.
pub fn is_expected_chain(err: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e: &&(dyn Error + 'static)| (*e).source()).any(|e| {
        e.downcast_ref::<KindedError>()
            .is_some_and(|kinded| is_expected(kinded.kind))
    })
}

/// Anything that can report its [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    /// Whether the error is a handled domain condition. Errors that wrap
    /// other errors should also look at what they wrap.
    fn expected(&self) -> bool {
        is_expected(self.kind())
    }
}

/// An error value tagged with its kind.
#[derive(Debug)]
pub struct KindedError {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl KindedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        KindedError {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Tag an existing error; its text becomes the message.
    pub fn wrap(kind: ErrorKind, err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        let source = err.into();
        KindedError {
            kind,
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn general(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::wrap(ErrorKind::General, err)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn does_not_exist(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DoesNotExist, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for KindedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for KindedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

impl Classify for KindedError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn expected(&self) -> bool {
        is_expected_chain(self)
    }
}
