use crate::ioctl::IoctlCode;
use crate::modeset::ConnectorId;

/// A raw error number returned by the kernel.
pub type Errno = linux_io::result::Error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The kernel rejected a request. `errno` is exactly what the kernel
    /// returned; use [`Error::kind`] for a coarse classification.
    #[error("ioctl {request} failed with errno {}", .errno.0)]
    IoctlFailed { request: IoctlCode, errno: Errno },

    #[error("no unclaimed CRTC can drive connector {}", .0.0)]
    NoSuitableCrtc(ConnectorId),

    #[error("connector {} reports no display modes", .0.0)]
    NoValidMode(ConnectorId),

    /// The second call of a probe-then-fill pair reported more items than
    /// the first one, usually because of a hot-plug in between.
    #[error("kernel reported {reported} items but only {allocated} were allocated")]
    TopologyChanged { reported: usize, allocated: usize },

    #[error("framebuffer has {0} planes, expected between 1 and 4")]
    InvalidPlaneCount(usize),

    #[error("blob of {0} bytes is too large for a property")]
    BlobTooLarge(usize),

    #[error("session has no output {0}")]
    NoSuchOutput(usize),

    #[error("failed to map buffer into memory")]
    Map(#[source] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IoctlFailed { errno, .. } => ErrorKind::from(*errno),
            Error::OutOfMemory => ErrorKind::SystemMem,
            Error::TopologyChanged { .. } => ErrorKind::RemoteFailure,
            Error::InvalidPlaneCount(_) | Error::BlobTooLarge(_) | Error::NoSuchOutput(_) => {
                ErrorKind::Invalid
            }
            Error::NoSuitableCrtc(_) | Error::NoValidMode(_) | Error::Map(_) => ErrorKind::Other,
        }
    }

    /// The kernel error number, if this error came from a failed request.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::IoctlFailed { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    #[inline(always)]
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Coarse classification of kernel error numbers, following the meaning
/// the DRM subsystem gives to each of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NonExist,
    SystemMem,
    Permission,
    Disconnected,
    NotSupported,
    RemoteFailure,
    Died,
    Other,
}

impl From<Errno> for ErrorKind {
    fn from(value: Errno) -> Self {
        match value {
            linux_io::result::EINVAL => Self::Invalid,
            linux_io::result::ENOENT => Self::NonExist,
            linux_io::result::ENOMEM => Self::SystemMem,
            linux_io::result::ENOSPC => Self::SystemMem,
            linux_io::result::EPERM | linux_io::result::EACCES => Self::Permission,
            linux_io::result::ENODEV => Self::Disconnected,
            linux_io::result::EOPNOTSUPP => Self::NotSupported,
            linux_io::result::ENXIO => Self::RemoteFailure,
            linux_io::result::EIO => Self::Died,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The file does not answer the version request, so presumably isn't
    /// a DRM device node.
    #[error("not a DRM device")]
    NotDrmCard,

    #[error("failed to open device node {path}: errno {}", .errno.0)]
    Open { path: String, errno: Errno },

    #[error(transparent)]
    Other(#[from] Error),
}

impl InitError {
    /// Classifies a failure of the initial version probe.
    pub(crate) fn from_probe(err: Error) -> Self {
        match err.errno() {
            Some(linux_io::result::ENOTTY) => InitError::NotDrmCard,
            _ => InitError::Other(err),
        }
    }
}
