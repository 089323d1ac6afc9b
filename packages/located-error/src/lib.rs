//! This crate provides a wrapper around an error that includes the location of
//! the error.
//!
//! ```rust
//! use hxe_located_error::{Located, LocatedError};
//!
//! #[derive(thiserror::Error, Debug)]
//! enum TestError {
//!     #[error("Test")]
//!     Test,
//! }
//!
//! let e = TestError::Test;
//!
//! let b: LocatedError<TestError> = Located(e).into();
//!
//! assert!(b.to_string().starts_with("Test, "));
//! ```
//!
//! # Credits
//!
//! <https://stackoverflow.com/questions/74336993/getting-line-numbers-with-when-using-boxdyn-stderrorerror>
use std::error::Error;
use std::panic::Location;
use std::sync::Arc;

/// A shared, type-erased error.
pub type DynError = Arc<dyn std::error::Error + Send + Sync>;

/// A generic wrapper around an error.
///
/// Where `E` is the inner error (source error).
pub struct Located<E>(pub E);

/// A wrapper around an error that includes the location of the error.
#[derive(Debug)]
pub struct LocatedError<'a, E>
where
    E: Error + ?Sized + Send + Sync,
{
    source: Arc<E>,
    location: Box<Location<'a>>,
}

impl<'a, E> std::fmt::Display for LocatedError<'a, E>
where
    E: Error + ?Sized + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.source, self.location)
    }
}

impl<'a, E> Error for LocatedError<'a, E>
where
    E: Error + ?Sized + Send + Sync + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

impl<'a, E> Clone for LocatedError<'a, E>
where
    E: Error + ?Sized + Send + Sync,
{
    fn clone(&self) -> Self {
        LocatedError {
            source: self.source.clone(),
            location: self.location.clone(),
        }
    }
}

#[allow(clippy::from_over_into)]
impl<'a, E> From<Located<E>> for LocatedError<'a, E>
where
    E: Error + Send + Sync,
    Arc<E>: Clone,
{
    #[track_caller]
    fn from(error: Located<E>) -> Self {
        let e = LocatedError {
            source: Arc::new(error.0),
            location: Box::new(*std::panic::Location::caller()),
        };
        tracing::debug!("{e}");
        e
    }
}

#[allow(clippy::from_over_into)]
impl<'a> From<DynError> for LocatedError<'a, dyn std::error::Error + Send + Sync> {
    #[track_caller]
    fn from(source: DynError) -> Self {
        LocatedError {
            source,
            location: Box::new(*std::panic::Location::caller()),
        }
    }
}

impl<'a, E> LocatedError<'a, E>
where
    E: Error + ?Sized + Send + Sync,
{
    #[must_use]
    pub fn location(&self) -> &Location<'a> {
        &self.location
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use std::panic::Location;
    use std::sync::Arc;

    use super::{DynError, LocatedError};
    use crate::Located;

    #[derive(thiserror::Error, Debug)]
    enum TestError {
        #[error("Test")]
        Test,
    }

    #[track_caller]
    fn get_caller_line() -> u32 {
        Location::caller().line()
    }

    #[test]
    fn error_should_include_location() {
        let e = TestError::Test;

        let b: LocatedError<'_, TestError> = Located(e).into();
        let l = get_caller_line();

        assert!(b.location().file().ends_with("src/lib.rs"));
        assert_eq!(b.location().line(), l - 1);
    }

    #[test]
    fn it_should_wrap_a_shared_dynamic_error() {
        let source: DynError = Arc::new(TestError::Test);

        let e: LocatedError<'_, dyn std::error::Error + Send + Sync> = source.into();

        assert!(e.to_string().starts_with("Test, "));
        assert_eq!(e.inner().to_string(), "Test");
    }
}
