//! Device and client capabilities.
//!
//! Capability ids are an open set: newer kernels add ids without any change
//! here, and [`Card::get_device_cap`] passes any id through to the kernel.

use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl;
use crate::result::Error;
use crate::Card;

/// A capability of the device, queried with [`Card::get_device_cap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DeviceCap(pub u64);

impl DeviceCap {
    /// Nonzero if the driver supports creating dumb buffers.
    pub const DUMB_BUFFER: Self = Self(0x1);
    /// Nonzero if a CRTC index can be given in the high bits of a vblank wait.
    pub const VBLANK_HIGH_CRTC: Self = Self(0x2);
    /// The preferred bit depth for dumb buffers.
    ///
    /// The bit depth excludes padding, so XRGB8888 has a depth of 24 but 32
    /// bits per pixel.
    pub const DUMB_PREFERRED_DEPTH: Self = Self(0x3);
    /// Nonzero if the driver prefers rendering to a shadow buffer followed
    /// by streaming copies into the dumb buffer.
    pub const DUMB_PREFER_SHADOW: Self = Self(0x4);
    /// Bitfield of supported PRIME sharing capabilities.
    pub const PRIME: Self = Self(0x5);
    /// Nonzero if event timestamps use `CLOCK_MONOTONIC`.
    pub const TIMESTAMP_MONOTONIC: Self = Self(0x6);
    pub const ASYNC_PAGE_FLIP: Self = Self(0x7);
    /// A width that is valid for a cursor plane.
    pub const CURSOR_WIDTH: Self = Self(0x8);
    /// A height that is valid for a cursor plane.
    pub const CURSOR_HEIGHT: Self = Self(0x9);
    /// Nonzero if framebuffers can be created with explicit format modifiers.
    pub const ADDFB2_MODIFIERS: Self = Self(0x10);
    pub const PAGE_FLIP_TARGET: Self = Self(0x11);
    pub const CRTC_IN_VBLANK_EVENT: Self = Self(0x12);
    pub const SYNCOBJ: Self = Self(0x13);
    pub const SYNCOBJ_TIMELINE: Self = Self(0x14);
    pub const ATOMIC_ASYNC_PAGE_FLIP: Self = Self(0x15);
}

/// Bits of the [`DeviceCap::PRIME`] value.
pub const PRIME_CAP_IMPORT: u64 = 0x1;
pub const PRIME_CAP_EXPORT: u64 = 0x2;

/// An opt-in feature of the client, enabled with [`Card::set_client_cap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ClientCap(pub u64);

impl ClientCap {
    /// Advertise stereo 3D layouts in mode flags.
    pub const STEREO_3D: Self = Self(1);
    /// Expose overlay, primary and cursor planes, not only overlays.
    pub const UNIVERSAL_PLANES: Self = Self(2);
    /// Expose atomic properties. Implies [`Self::UNIVERSAL_PLANES`].
    pub const ATOMIC: Self = Self(3);
    /// Report aspect ratio information in modes.
    pub const ASPECT_RATIO: Self = Self(4);
    /// Expose writeback connectors. Requires [`Self::ATOMIC`].
    pub const WRITEBACK_CONNECTORS: Self = Self(5);
    /// Show cursor planes on para-virtualized drivers to clients that set
    /// cursor hotspot properties. Requires [`Self::ATOMIC`].
    pub const CURSOR_PLANE_HOTSPOT: Self = Self(6);
}

impl<D: RawDevice> Card<D> {
    /// Reads the value of a device capability.
    ///
    /// Unknown ids are not rejected here; the kernel decides.
    pub fn get_device_cap(&self, cap: DeviceCap) -> Result<u64, Error> {
        let mut s = ioctl::DrmGetCap {
            capability: cap.0,
            value: 0,
        };
        self.ioctl(ioctl::DRM_IOCTL_GET_CAP, &mut s)?;
        Ok(s.value)
    }

    /// Reports whether the device supports dumb buffers.
    ///
    /// A failed query counts as "not supported". Use [`Self::get_device_cap`]
    /// with [`DeviceCap::DUMB_BUFFER`] to tell the two apart.
    pub fn has_dumb_buffer(&self) -> bool {
        match self.get_device_cap(DeviceCap::DUMB_BUFFER) {
            Ok(v) => v != 0,
            Err(err) => {
                debug!(error = %err, "dumb buffer capability query failed");
                false
            }
        }
    }

    /// Turns on an optional client feature.
    pub fn set_client_cap(&self, cap: ClientCap, value: u64) -> Result<(), Error> {
        let mut s = ioctl::DrmSetClientCap {
            capability: cap.0,
            value,
        };
        self.ioctl(ioctl::DRM_IOCTL_SET_CLIENT_CAP, &mut s)
    }
}
