//! Device nodes and the system call boundary.
//!
//! Everything above this module talks to the kernel only through
//! [`RawDevice`], which has exactly two entry points: issuing an `ioctl`
//! request and mapping a range of the device into memory.

use std::ffi::{c_void, CString};
use std::ops::DerefMut;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::ioctl::IoctlCode;
use crate::result::{Errno, Error, InitError};
use crate::{Card, Version};

/// Directory where the kernel publishes DRM device nodes.
pub const DRI_DIR: &str = "/dev/dri";

/// The system call seam used by [`Card`].
pub trait RawDevice {
    /// A read/write shared mapping of part of the device. Dropping the
    /// mapping unmaps it.
    type Mapping: DerefMut<Target = [u8]>;

    /// Issues `ioctl(fd, code, arg)`.
    ///
    /// # Safety
    ///
    /// `arg` must point to a live, writable object of exactly `code.size()`
    /// bytes with the layout the kernel expects for `code`, and every
    /// user-space address embedded in that object must refer to a live
    /// buffer of the size given by its companion count field.
    unsafe fn ioctl_raw(&self, code: IoctlCode, arg: *mut c_void) -> Result<(), Errno>;

    /// Maps `len` bytes of the device starting at the fake offset `offset`
    /// returned by the kernel for a dumb buffer.
    fn map(&self, offset: u64, len: usize) -> Result<Self::Mapping, Error>;
}

/// Marker device type for files known to be DRM device nodes.
#[derive(Clone, Copy, Debug)]
pub struct DrmCardDevice;

impl linux_io::fd::ioctl::IoDevice for DrmCardDevice {}

/// An open DRM device node.
pub struct CardFile {
    f: linux_io::File<DrmCardDevice>,
}

impl CardFile {
    /// Opens a device node read-write.
    pub fn open(path: &Path) -> Result<Self, InitError> {
        let display = path.display().to_string();
        let raw = CString::new(path.as_os_str().as_bytes()).map_err(|_| InitError::Open {
            path: display.clone(),
            errno: linux_io::result::EINVAL,
        })?;
        let f = linux_io::File::open(&raw, linux_io::OpenOptions::read_write())
            .map_err(|errno| InitError::Open { path: display, errno })?;
        Ok(Self::from_file(f))
    }

    /// Wraps an already-open file without checking what it refers to.
    pub fn from_file<D>(f: linux_io::File<D>) -> Self {
        // Safety: DrmCardDevice only tags the file, it does not enable any
        // typed requests, so retagging can't make an ioctl call unsound.
        let f = unsafe { f.to_device(DrmCardDevice) };
        Self { f }
    }

    pub fn close(self) -> linux_io::result::Result<()> {
        self.f.close()
    }

    pub fn take_file(self) -> linux_io::File<DrmCardDevice> {
        self.f
    }

    pub fn borrow_file(&self) -> &linux_io::File<DrmCardDevice> {
        &self.f
    }
}

impl RawDevice for CardFile {
    type Mapping = memmap2::MmapMut;

    unsafe fn ioctl_raw(&self, code: IoctlCode, arg: *mut c_void) -> Result<(), Errno> {
        // Issued exactly once. Even EINTR goes back to the caller, since a
        // repeated mode-set request isn't guaranteed to be harmless.
        let ret = libc::ioctl(self.f.fd(), code.raw() as _, arg);
        if ret != -1 {
            return Ok(());
        }
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        trace!(request = %code, errno, "ioctl failed");
        Err(linux_io::result::Error(errno as _))
    }

    fn map(&self, offset: u64, len: usize) -> Result<memmap2::MmapMut, Error> {
        let fd: std::os::unix::io::RawFd = self.f.fd();
        // Safety: the range belongs to a dumb buffer owned by this process,
        // and nothing else in this process maps it with a different type.
        unsafe {
            memmap2::MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(fd)
        }
        .map_err(Error::Map)
    }
}

/// The three kinds of device node the kernel creates per card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// `cardN`, the node that can become DRM master and perform mode-setting.
    Primary,
    /// `controlDN`, a legacy node only present on old kernels.
    Control,
    /// `renderDN`, unprivileged rendering only.
    Render,
}

impl NodeKind {
    pub fn file_name(self, index: u32) -> String {
        match self {
            NodeKind::Primary => format!("card{index}"),
            NodeKind::Control => format!("controlD{index}"),
            NodeKind::Render => format!("renderD{index}"),
        }
    }

    /// Path of node `index` of this kind under `dir`.
    pub fn path_in(self, dir: &Path, index: u32) -> PathBuf {
        dir.join(self.file_name(index))
    }

    pub fn path(self, index: u32) -> PathBuf {
        self.path_in(Path::new(DRI_DIR), index)
    }
}

/// Opens `/dev/dri/card{index}`.
pub fn open_card(index: u32) -> Result<Card, InitError> {
    Card::open(&NodeKind::Primary.path(index))
}

/// Opens `/dev/dri/controlD{index}`.
pub fn open_control(index: u32) -> Result<Card, InitError> {
    Card::open(&NodeKind::Control.path(index))
}

/// Opens `/dev/dri/renderD{index}`.
pub fn open_render(index: u32) -> Result<Card, InitError> {
    Card::open(&NodeKind::Render.path(index))
}

/// Reports the driver version of card 0, which also tells whether DRM is
/// usable at all on this system.
pub fn available() -> Result<Version, InitError> {
    let card = open_card(0)?;
    Ok(card.version()?)
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: PathBuf,
    pub version: Version,
}

/// Lists every primary node under [`DRI_DIR`] that answers a version query.
pub fn list_devices() -> std::io::Result<Vec<DeviceInfo>> {
    list_devices_in(Path::new(DRI_DIR))
}

/// Lists every `cardN` entry of `dir` that can be opened and answers a
/// version query, ordered by card index. Entries that fail are skipped.
pub fn list_devices_in(dir: &Path) -> std::io::Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(parse_card_index) else {
            continue;
        };
        let path = entry.path();
        let version = match Card::open(&path).and_then(|card| Ok(card.version()?)) {
            Ok(v) => v,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping device node");
                continue;
            }
        };
        devices.push(DeviceInfo {
            index,
            path,
            version,
        });
    }
    devices.sort_by_key(|d| d.index);
    Ok(devices)
}

/// Parses the `N` out of a `cardN` file name.
fn parse_card_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("card")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
