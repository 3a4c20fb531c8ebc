//! Kernel wire structures and request numbers for the DRM ioctl interface.
//!
//! Every struct in this module is `#[repr(C)]` and must match the layout in
//! the kernel's `drm.h`/`drm_mode.h` byte for byte, including padding. The
//! tests at the bottom of this file pin both the sizes and the request
//! numbers.
//!
//! Fields that carry a user-space address are declared as [`UserPtr`], which
//! is a `u64` on the wire regardless of the pointer width of the process.

use core::ffi::c_char;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::null_mut;

use linux_unsafe::int;

pub mod code;

pub use code::{Direction, InvalidIoctlCode, IoctlCode};

/// Device class character for all DRM requests.
pub const DRM_IOCTL_BASE: u8 = b'd';

/// A typed DRM request: an [`IoctlCode`] together with the argument type the
/// kernel expects for it.
pub struct Request<T> {
    code: IoctlCode,
    _arg: PhantomData<fn(&mut T)>,
}

impl<T> Request<T> {
    /// # Safety
    ///
    /// `T` must have exactly the layout the kernel expects for request `nr`.
    const unsafe fn new(dir: Direction, nr: u8) -> Self {
        Self {
            code: IoctlCode::new(dir, core::mem::size_of::<T>(), DRM_IOCTL_BASE, nr),
            _arg: PhantomData,
        }
    }

    /// `DRM_IOWR(nr, T)`
    pub const unsafe fn readwrite(nr: u8) -> Self {
        Self::new(Direction::READ_WRITE, nr)
    }

    /// `DRM_IOW(nr, T)`
    pub const unsafe fn write(nr: u8) -> Self {
        Self::new(Direction::WRITE, nr)
    }

    #[inline(always)]
    pub const fn code(&self) -> IoctlCode {
        self.code
    }
}

impl Request<()> {
    /// `DRM_IO(nr)`
    pub const unsafe fn none(nr: u8) -> Self {
        Self {
            code: IoctlCode::new(Direction::NONE, 0, DRM_IOCTL_BASE, nr),
            _arg: PhantomData,
        }
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Request<T> {}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Request").field(&self.code).finish()
    }
}

/// A user-space address embedded in a kernel struct as a 64-bit integer.
///
/// The only way to make a non-null `UserPtr` is to take the address of a
/// live slice, and the only consumer is the kernel (or the fake kernel used
/// in tests). The slice must outlive every request that carries the address.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct UserPtr(u64);

impl UserPtr {
    pub const NULL: Self = Self(0);

    /// Address of the first element of `buf`, or null for an empty slice.
    #[inline]
    pub(crate) fn from_mut_slice<T>(buf: &mut [T]) -> Self {
        if buf.is_empty() {
            return Self::NULL;
        }
        Self(buf.as_mut_ptr() as usize as u64)
    }

    #[inline]
    pub(crate) fn from_slice<T>(buf: &[T]) -> Self {
        if buf.is_empty() {
            return Self::NULL;
        }
        Self(buf.as_ptr() as usize as u64)
    }

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[cfg(test)]
    pub(crate) fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl fmt::Debug for UserPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserPtr({:#x})", self.0)
    }
}

/// Fixed-point unsigned 16.16-bit number type, represented as [`u32`].
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct fixedu16_16(u32);

impl fixedu16_16 {
    #[inline(always)]
    pub const fn from_u16(v: u16) -> Self {
        Self((v as u32) << 16)
    }

    #[inline(always)]
    pub const fn from_u16_frac(w: u16, f: u16) -> Self {
        Self(((w as u32) << 16) | (f as u32))
    }

    #[inline(always)]
    pub const fn as_raw_u32(self) -> u32 {
        self.0
    }
}

impl From<u16> for fixedu16_16 {
    #[inline(always)]
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

macro_rules! impl_zeroed {
    ($t:ty) => {
        impl $t {
            #[inline(always)]
            pub const fn zeroed() -> Self {
                // Safety: All of the field types in $t must
                // treat all-zeroes as a valid bit pattern.
                unsafe { ::core::mem::zeroed() }
            }
        }

        /// The default value is the result of [`Self::zeroed`].
        impl ::core::default::Default for $t {
            #[inline(always)]
            fn default() -> Self {
                Self::zeroed()
            }
        }
    };
}

/// `struct drm_version`. Unlike the mode-setting structs this one carries
/// native pointers and `size_t` lengths.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmVersion {
    pub version_major: int,
    pub version_minor: int,
    pub version_patchlevel: int,
    pub(crate) name_len: usize,
    pub(crate) name: *mut c_char,
    pub(crate) date_len: usize,
    pub(crate) date: *mut c_char,
    pub(crate) desc_len: usize,
    pub(crate) desc: *mut c_char,
}

impl_zeroed!(DrmVersion);

impl DrmVersion {
    #[inline(always)]
    pub fn clear_ptrs(&mut self) {
        self.name = null_mut();
        self.date = null_mut();
        self.desc = null_mut();
    }

    #[inline(always)]
    pub fn name_len(&self) -> usize {
        self.name_len
    }

    #[inline(always)]
    pub fn date_len(&self) -> usize {
        self.date_len
    }

    #[inline(always)]
    pub fn desc_len(&self) -> usize {
        self.desc_len
    }
}

pub const DRM_IOCTL_VERSION: Request<DrmVersion> = unsafe { Request::readwrite(0x00) };

pub const DRM_IOCTL_SET_MASTER: Request<()> = unsafe { Request::none(0x1e) };

pub const DRM_IOCTL_DROP_MASTER: Request<()> = unsafe { Request::none(0x1f) };

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmGetCap {
    pub capability: u64,
    pub value: u64,
}

impl_zeroed!(DrmGetCap);

pub const DRM_IOCTL_GET_CAP: Request<DrmGetCap> = unsafe { Request::readwrite(0x0c) };

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmSetClientCap {
    pub capability: u64,
    pub value: u64,
}

impl_zeroed!(DrmSetClientCap);

pub const DRM_IOCTL_SET_CLIENT_CAP: Request<DrmSetClientCap> = unsafe { Request::write(0x0d) };

/// `struct drm_mode_card_res`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeCardRes {
    pub(crate) fb_id_ptr: UserPtr,
    pub(crate) crtc_id_ptr: UserPtr,
    pub(crate) connector_id_ptr: UserPtr,
    pub(crate) encoder_id_ptr: UserPtr,
    pub(crate) count_fbs: u32,
    pub(crate) count_crtcs: u32,
    pub(crate) count_connectors: u32,
    pub(crate) count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl_zeroed!(DrmModeCardRes);

pub const DRM_IOCTL_MODE_GETRESOURCES: Request<DrmModeCardRes> =
    unsafe { Request::readwrite(0xa0) };

pub const DRM_DISPLAY_MODE_LEN: usize = 32;

/// `struct drm_mode_modeinfo`
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrmModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub typ: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

impl_zeroed!(DrmModeInfo);

pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;
pub const DRM_MODE_TYPE_USERDEF: u32 = 1 << 5;
pub const DRM_MODE_TYPE_DRIVER: u32 = 1 << 6;

/// `struct drm_mode_get_connector`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetConnector {
    pub(crate) encoders_ptr: UserPtr,
    pub(crate) modes_ptr: UserPtr,
    pub(crate) props_ptr: UserPtr,
    pub(crate) prop_values_ptr: UserPtr,
    pub(crate) count_modes: u32,
    pub(crate) count_props: u32,
    pub(crate) count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    #[doc(hidden)]
    pub _pad: u32,
}

impl_zeroed!(DrmModeGetConnector);

pub const DRM_IOCTL_MODE_GETCONNECTOR: Request<DrmModeGetConnector> =
    unsafe { Request::readwrite(0xa7) };

/// `struct drm_mode_get_encoder`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

impl_zeroed!(DrmModeGetEncoder);

pub const DRM_IOCTL_MODE_GETENCODER: Request<DrmModeGetEncoder> =
    unsafe { Request::readwrite(0xa6) };

/// `struct drm_mode_crtc`, shared by the get and set requests.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeCrtc {
    pub(crate) set_connectors_ptr: UserPtr,
    pub(crate) count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeInfo,
}

impl_zeroed!(DrmModeCrtc);

pub const DRM_IOCTL_MODE_GETCRTC: Request<DrmModeCrtc> = unsafe { Request::readwrite(0xa1) };

pub const DRM_IOCTL_MODE_SETCRTC: Request<DrmModeCrtc> = unsafe { Request::readwrite(0xa2) };

/// `struct drm_mode_create_dumb`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

impl_zeroed!(DrmModeCreateDumb);

pub const DRM_IOCTL_MODE_CREATE_DUMB: Request<DrmModeCreateDumb> =
    unsafe { Request::readwrite(0xb2) };

/// `struct drm_mode_map_dumb`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeMapDumb {
    pub handle: u32,
    pub pad: u32,
    /// Fake offset to pass to a subsequent `mmap` of the device file.
    pub offset: u64,
}

impl_zeroed!(DrmModeMapDumb);

pub const DRM_IOCTL_MODE_MAP_DUMB: Request<DrmModeMapDumb> = unsafe { Request::readwrite(0xb3) };

/// `struct drm_mode_destroy_dumb`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeDestroyDumb {
    pub handle: u32,
}

impl_zeroed!(DrmModeDestroyDumb);

pub const DRM_IOCTL_MODE_DESTROY_DUMB: Request<DrmModeDestroyDumb> =
    unsafe { Request::readwrite(0xb4) };

/// `struct drm_mode_fb_cmd`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

impl_zeroed!(DrmModeFbCmd);

pub const DRM_IOCTL_MODE_ADDFB: Request<DrmModeFbCmd> = unsafe { Request::readwrite(0xae) };

pub const DRM_IOCTL_MODE_RMFB: Request<u32> = unsafe { Request::readwrite(0xaf) };

/// `struct drm_mode_fb_cmd2`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeFbCmd2 {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub flags: u32,
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
    pub modifier: [u64; 4],
}

impl_zeroed!(DrmModeFbCmd2);

pub const DRM_IOCTL_MODE_ADDFB2: Request<DrmModeFbCmd2> = unsafe { Request::readwrite(0xb8) };

/// Set in [`DrmModeFbCmd2::flags`] when [`DrmModeFbCmd2::modifier`] is meaningful.
pub const DRM_MODE_FB_MODIFIERS: u32 = 1 << 1;

/// Little-endian `[B, G, R, X]` with 8 bits per channel.
pub const DRM_FORMAT_XRGB8888: u32 = fourcc(b'X', b'R', b'2', b'4');
/// Little-endian `[B, G, R, A]` with 8 bits per channel.
pub const DRM_FORMAT_ARGB8888: u32 = fourcc(b'A', b'R', b'2', b'4');

pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// `struct drm_mode_atomic`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeAtomic {
    pub flags: u32,
    pub(crate) count_objs: u32,
    pub(crate) objs_ptr: UserPtr,
    pub(crate) count_props_ptr: UserPtr,
    pub(crate) props_ptr: UserPtr,
    pub(crate) prop_values_ptr: UserPtr,
    pub reserved: u64,
    pub user_data: u64,
}

impl_zeroed!(DrmModeAtomic);

pub const DRM_IOCTL_MODE_ATOMIC: Request<DrmModeAtomic> = unsafe { Request::readwrite(0xbc) };

/// Request that the kernel sends back a vblank event with the
/// flip-complete type when the page-flip is done.
pub const DRM_MODE_PAGE_FLIP_EVENT: u32 = 0x01;
/// Request that the page-flip is performed as soon as possible, ie. with no
/// delay due to waiting for vblank.
pub const DRM_MODE_PAGE_FLIP_ASYNC: u32 = 0x02;

/// Do not apply the atomic commit, and instead check whether the hardware supports
/// this configuration.
pub const DRM_MODE_ATOMIC_TEST_ONLY: u32 = 0x0100;

/// Do not block while applying the atomic commit. The driver still checks
/// whether the update can be applied before returning.
pub const DRM_MODE_ATOMIC_NONBLOCK: u32 = 0x0200;

/// Allow the update to result in temporary or transient visible artifacts
/// while it is being applied. A commit that needs a full mode-set fails with
/// `EINVAL` unless this is set.
pub const DRM_MODE_ATOMIC_ALLOW_MODESET: u32 = 0x0400;

/// Bitfield of flags accepted by [`DRM_IOCTL_MODE_ATOMIC`] in
/// [`DrmModeAtomic::flags`].
pub const DRM_MODE_ATOMIC_FLAGS: u32 = DRM_MODE_PAGE_FLIP_EVENT
    | DRM_MODE_PAGE_FLIP_ASYNC
    | DRM_MODE_ATOMIC_TEST_ONLY
    | DRM_MODE_ATOMIC_NONBLOCK
    | DRM_MODE_ATOMIC_ALLOW_MODESET;

/// `struct drm_mode_obj_get_properties`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeObjGetProperties {
    pub(crate) props_ptr: UserPtr,
    pub(crate) prop_values_ptr: UserPtr,
    pub(crate) count_props: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

impl_zeroed!(DrmModeObjGetProperties);

pub const DRM_IOCTL_MODE_OBJ_GETPROPERTIES: Request<DrmModeObjGetProperties> =
    unsafe { Request::readwrite(0xb9) };

pub const DRM_MODE_OBJECT_CRTC: u32 = 0xcccccccc;
pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0c0c0;
pub const DRM_MODE_OBJECT_ENCODER: u32 = 0xe0e0e0e0;
pub const DRM_MODE_OBJECT_MODE: u32 = 0xdededede;
pub const DRM_MODE_OBJECT_PROPERTY: u32 = 0xb0b0b0b0;
pub const DRM_MODE_OBJECT_FB: u32 = 0xfbfbfbfb;
pub const DRM_MODE_OBJECT_BLOB: u32 = 0xbbbbbbbb;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeeeeeee;
pub const DRM_MODE_OBJECT_ANY: u32 = 0;

/// `struct drm_mode_get_plane_res`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetPlaneRes {
    pub(crate) plane_id_ptr: UserPtr,
    pub(crate) count_planes: u32,
}

impl_zeroed!(DrmModeGetPlaneRes);

pub const DRM_IOCTL_MODE_GETPLANERESOURCES: Request<DrmModeGetPlaneRes> =
    unsafe { Request::readwrite(0xb5) };

/// `struct drm_mode_get_plane`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetPlane {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
    pub(crate) count_format_types: u32,
    pub(crate) format_type_ptr: UserPtr,
}

impl_zeroed!(DrmModeGetPlane);

pub const DRM_IOCTL_MODE_GETPLANE: Request<DrmModeGetPlane> = unsafe { Request::readwrite(0xb6) };

/// `struct drm_mode_set_plane`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeSetPlane {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32, // fb object contains surface format type
    pub flags: u32, // DRM_MODE_PRESENT_ flags

    pub crtc_x: i32,
    pub crtc_y: i32,
    pub crtc_w: u32,
    pub crtc_h: u32,

    pub src_x: fixedu16_16,
    pub src_y: fixedu16_16,
    pub src_h: fixedu16_16,
    pub src_w: fixedu16_16,
}

impl_zeroed!(DrmModeSetPlane);

pub const DRM_IOCTL_MODE_SETPLANE: Request<DrmModeSetPlane> = unsafe { Request::readwrite(0xb7) };

pub const DRM_PROP_NAME_LEN: usize = 32;

/// `struct drm_mode_get_property`
///
/// The meaning of the values array depends on the property type. The enum
/// array is only filled for [`DRM_MODE_PROP_ENUM`] and
/// [`DRM_MODE_PROP_BITMASK`] properties; for blob properties the kernel
/// always reports zero enum entries.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetProperty {
    pub(crate) values_ptr: UserPtr,
    pub(crate) enum_blob_ptr: UserPtr,
    pub prop_id: u32,
    pub flags: u32,
    pub name: [u8; DRM_PROP_NAME_LEN],
    pub(crate) count_values: u32,
    pub(crate) count_enum_blobs: u32,
}

impl_zeroed!(DrmModeGetProperty);

/// `struct drm_mode_property_enum`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModePropertyEnum {
    pub value: u64,
    pub name: [u8; DRM_PROP_NAME_LEN],
}

impl_zeroed!(DrmModePropertyEnum);

pub const DRM_IOCTL_MODE_GETPROPERTY: Request<DrmModeGetProperty> =
    unsafe { Request::readwrite(0xaa) };

pub const DRM_MODE_PROP_PENDING: u32 = 1 << 0;
pub const DRM_MODE_PROP_RANGE: u32 = 1 << 1;
pub const DRM_MODE_PROP_IMMUTABLE: u32 = 1 << 2;
pub const DRM_MODE_PROP_ENUM: u32 = 1 << 3;
pub const DRM_MODE_PROP_BLOB: u32 = 1 << 4;
pub const DRM_MODE_PROP_BITMASK: u32 = 1 << 5;
pub const DRM_MODE_PROP_LEGACY_TYPE: u32 =
    DRM_MODE_PROP_RANGE | DRM_MODE_PROP_ENUM | DRM_MODE_PROP_BLOB | DRM_MODE_PROP_BITMASK;
pub const DRM_MODE_PROP_EXTENDED_TYPE: u32 = 0x0000ffc0;
pub const DRM_MODE_PROP_OBJECT: u32 = DRM_MODE_PROP_TYPE(1);
pub const DRM_MODE_PROP_SIGNED_RANGE: u32 = DRM_MODE_PROP_TYPE(2);
/// Property is only visible to clients that enabled the atomic client cap.
pub const DRM_MODE_PROP_ATOMIC: u32 = 0x80000000;

#[allow(non_snake_case)]
#[inline(always)]
pub const fn DRM_MODE_PROP_TYPE(n: u32) -> u32 {
    n << 6
}

/// `struct drm_mode_get_blob`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeGetBlob {
    pub blob_id: u32,
    pub(crate) length: u32,
    pub(crate) data: UserPtr,
}

impl_zeroed!(DrmModeGetBlob);

pub const DRM_IOCTL_MODE_GETPROPBLOB: Request<DrmModeGetBlob> =
    unsafe { Request::readwrite(0xac) };

/// `struct drm_mode_create_blob`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeCreateBlob {
    pub(crate) data: UserPtr,
    pub(crate) length: u32,
    pub blob_id: u32,
}

impl_zeroed!(DrmModeCreateBlob);

pub const DRM_IOCTL_MODE_CREATEPROPBLOB: Request<DrmModeCreateBlob> =
    unsafe { Request::readwrite(0xbd) };

/// `struct drm_mode_destroy_blob`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmModeDestroyBlob {
    pub blob_id: u32,
}

impl_zeroed!(DrmModeDestroyBlob);

pub const DRM_IOCTL_MODE_DESTROYPROPBLOB: Request<DrmModeDestroyBlob> =
    unsafe { Request::readwrite(0xbe) };
