//! Common error types.
//!
//! Only constructing a run loop can fail. Once a [`RunLoop`] exists, scheduling anomalies such as
//! adding an entity twice or removing one that was never added are silently absorbed.
//!
//! [`RunLoop`]: crate::run_loop::RunLoop

use std::{error, fmt, io};

/// A general error that may occur while creating a run loop.
#[derive(Debug)]
pub enum RunLoopError {
    /// The requested wait backend is not available on this platform.
    NotSupported(NotSupportedError),
    /// The OS could not allocate the waitable primitive backing the run loop.
    Os(OsError),
}

impl From<OsError> for RunLoopError {
    fn from(value: OsError) -> Self {
        Self::Os(value)
    }
}

impl From<NotSupportedError> for RunLoopError {
    fn from(value: NotSupportedError) -> Self {
        Self::NotSupported(value)
    }
}

impl fmt::Display for RunLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            RunLoopError::NotSupported(e) => e.fmt(f),
            RunLoopError::Os(e) => e.fmt(f),
        }
    }
}

impl error::Error for RunLoopError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RunLoopError::NotSupported(e) => Some(e),
            RunLoopError::Os(e) => Some(e),
        }
    }
}

/// The error type for when the requested operation is not supported by the backend.
#[derive(Clone)]
pub struct NotSupportedError {
    what: &'static str,
}

impl NotSupportedError {
    /// Create a new [`NotSupportedError`] describing the unsupported feature.
    #[inline]
    pub fn new(what: &'static str) -> NotSupportedError {
        NotSupportedError { what }
    }
}

impl fmt::Debug for NotSupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("NotSupportedError").field("what", &self.what).finish()
    }
}

impl fmt::Display for NotSupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} is not supported on this platform", self.what)
    }
}

impl error::Error for NotSupportedError {}

/// The error type for when the OS cannot perform the requested operation.
///
/// Records the location in the backend that raised it, see [`os_error!`].
///
/// [`os_error!`]: crate::os_error
#[derive(Debug)]
pub struct OsError {
    line: u32,
    file: &'static str,
    error: io::Error,
}

impl OsError {
    #[doc(hidden)]
    pub fn new(line: u32, file: &'static str, error: io::Error) -> OsError {
        OsError { line, file, error }
    }

    /// The underlying I/O error.
    pub fn io_error(&self) -> &io::Error {
        &self.error
    }
}

/// Build an [`OsError`] tagged with the current file and line.
///
/// [`OsError`]: crate::error::OsError
#[macro_export]
macro_rules! os_error {
    ($error:expr) => {{
        $crate::error::OsError::new(line!(), file!(), ::std::io::Error::from($error))
    }};
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&format!("os error at {}:{}: {}", self.file, self.line, self.error))
    }
}

impl error::Error for OsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}
