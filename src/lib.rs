//! Client for the Linux Direct Rendering Manager (DRM) and its Kernel
//! Modesetting (KMS) interface.
//!
//! [`Card`] wraps an open device node and exposes the kernel's requests as
//! methods: querying capabilities, enumerating connectors, encoders, CRTCs,
//! planes and properties, allocating dumb buffers and changing what each
//! CRTC displays. [`modeset::ModesetSession`] builds the usual "light up
//! every connected output" flow on top of those.

use std::ffi::c_void;
use std::path::Path;

use tracing::trace;

pub mod cap;
pub mod device;
/// Low-level `ioctl`-based access to DRM devices.
pub mod ioctl;
pub mod modeset;
mod probe;
pub mod result;
mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use cap::{ClientCap, DeviceCap};
pub use device::{CardFile, RawDevice};
pub use result::{Errno, Error, ErrorKind, InitError};

use crate::ioctl::Request;
use crate::probe::{probe_then_fill, trim_nul, ProbeFill, Scratch};

/// An open DRM device.
///
/// `D` is the system call backend; it is [`CardFile`] for real device nodes.
pub struct Card<D: RawDevice = CardFile> {
    dev: D,
}

impl Card<CardFile> {
    /// Opens the device node at `path` and checks that it is a DRM device.
    pub fn open(path: &Path) -> Result<Self, InitError> {
        Self::from_device(CardFile::open(path)?)
    }

    pub fn from_file<F>(f: linux_io::File<F>) -> Result<Self, InitError> {
        Self::from_device(CardFile::from_file(f))
    }

    pub fn close(self) -> linux_io::result::Result<()> {
        self.dev.close()
    }
}

impl<D: RawDevice> Card<D> {
    /// Wraps a device backend, using the version request to decide whether
    /// it is really a DRM device.
    pub fn from_device(dev: D) -> Result<Self, InitError> {
        let card = Self { dev };
        let mut v = ioctl::DrmVersion::zeroed();
        card.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v)
            .map_err(InitError::from_probe)?;
        Ok(card)
    }

    /// Wraps a device backend without probing it.
    pub fn from_device_unchecked(dev: D) -> Self {
        Self { dev }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn into_device(self) -> D {
        self.dev
    }

    /// Issues a typed request.
    ///
    /// Any address embedded in `arg` must refer to a buffer that stays alive
    /// for the duration of the call.
    pub(crate) fn ioctl<T>(&self, req: Request<T>, arg: &mut T) -> Result<(), Error> {
        let code = req.code();
        trace!(
            request = %code,
            dir = ?code.direction(),
            size = code.size(),
            "ioctl"
        );
        // Safety: Request<T> can only be constructed for a T that has the
        // layout the kernel expects for that request number.
        unsafe { self.dev.ioctl_raw(code, arg as *mut T as *mut c_void) }
            .map_err(|errno| Error::IoctlFailed {
                request: code,
                errno,
            })
    }

    /// Queries the driver name, version and description.
    pub fn version(&self) -> Result<Version, Error> {
        probe_then_fill(self, ioctl::DRM_IOCTL_VERSION, ioctl::DrmVersion::zeroed())
    }

    pub fn driver_name(&self) -> Result<String, Error> {
        Ok(self.version()?.name)
    }

    /// Makes this open file the DRM master of the device, which is required
    /// for mode-setting through a primary node.
    pub fn become_master(&self) -> Result<(), Error> {
        self.ioctl(ioctl::DRM_IOCTL_SET_MASTER, &mut ())
    }

    pub fn drop_master(&self) -> Result<(), Error> {
        self.ioctl(ioctl::DRM_IOCTL_DROP_MASTER, &mut ())
    }
}

/// Driver identification reported by the version request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patchlevel: i32,
    pub name: String,
    pub date: String,
    pub desc: String,
}

impl ProbeFill for ioctl::DrmVersion {
    type Scratch = [Scratch<u8>; 3];
    type Output = Version;

    fn attach(&mut self) -> Result<Self::Scratch, Error> {
        let mut name = Scratch::<u8>::for_count(self.name_len)?;
        let mut date = Scratch::<u8>::for_count(self.date_len)?;
        let mut desc = Scratch::<u8>::for_count(self.desc_len)?;
        self.name = name.as_mut_ptr().cast();
        self.date = date.as_mut_ptr().cast();
        self.desc = desc.as_mut_ptr().cast();
        Ok([name, date, desc])
    }

    fn decode(mut self, scratch: Self::Scratch) -> Result<Version, Error> {
        self.clear_ptrs();
        let [name, date, desc] = scratch;
        let text = |scratch: Scratch<u8>, reported: usize| -> Result<String, Error> {
            let bytes = scratch.finish(reported)?;
            Ok(String::from_utf8_lossy(trim_nul(&bytes)).into_owned())
        };
        Ok(Version {
            major: self.version_major,
            minor: self.version_minor,
            patchlevel: self.version_patchlevel,
            name: text(name, self.name_len())?,
            date: text(date, self.date_len())?,
            desc: text(desc, self.desc_len())?,
        })
    }
}
