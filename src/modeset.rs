use std::borrow::Cow;
use std::cmp::max;

use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl::{self, fixedu16_16, UserPtr};
use crate::probe::{probe_then_fill, trim_nul, ProbeFill, Scratch};
use crate::result::Error;
use crate::Card;

mod atomic;
mod buffer;
mod props;
mod session;

pub use atomic::*;
pub use buffer::*;
pub use props::*;
pub use session::*;

macro_rules! object_id {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u32);
    };
}

object_id!(FramebufferId);
object_id!(CrtcId);
object_id!(ConnectorId);
object_id!(EncoderId);
object_id!(PlaneId);
object_id!(PropertyId);
object_id!(BlobId);
object_id!(
    /// Handle of a dumb buffer, local to the open file that created it.
    BufferObjectId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectId {
    Crtc(CrtcId),
    Connector(ConnectorId),
    Encoder(EncoderId),
    Mode(u32),
    Property(PropertyId),
    Framebuffer(FramebufferId),
    Blob(BlobId),
    Plane(PlaneId),
}

impl ObjectId {
    pub fn as_raw_type_and_id(self) -> (u32, u32) {
        match self {
            ObjectId::Crtc(id) => (ioctl::DRM_MODE_OBJECT_CRTC, id.0),
            ObjectId::Connector(id) => (ioctl::DRM_MODE_OBJECT_CONNECTOR, id.0),
            ObjectId::Encoder(id) => (ioctl::DRM_MODE_OBJECT_ENCODER, id.0),
            ObjectId::Mode(id) => (ioctl::DRM_MODE_OBJECT_MODE, id),
            ObjectId::Property(id) => (ioctl::DRM_MODE_OBJECT_PROPERTY, id.0),
            ObjectId::Framebuffer(id) => (ioctl::DRM_MODE_OBJECT_FB, id.0),
            ObjectId::Blob(id) => (ioctl::DRM_MODE_OBJECT_BLOB, id.0),
            ObjectId::Plane(id) => (ioctl::DRM_MODE_OBJECT_PLANE, id.0),
        }
    }

    #[inline]
    pub fn raw_id(self) -> u32 {
        self.as_raw_type_and_id().1
    }
}

macro_rules! object_id_from {
    ($t:ident, $variant:ident) => {
        impl From<$t> for ObjectId {
            fn from(value: $t) -> Self {
                Self::$variant(value)
            }
        }
    };
}

object_id_from!(CrtcId, Crtc);
object_id_from!(ConnectorId, Connector);
object_id_from!(EncoderId, Encoder);
object_id_from!(PropertyId, Property);
object_id_from!(FramebufferId, Framebuffer);
object_id_from!(BlobId, Blob);
object_id_from!(PlaneId, Plane);

/// Ids of every mode object of a card, in the order the kernel lists them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardResources {
    pub fb_ids: Vec<FramebufferId>,
    pub crtc_ids: Vec<CrtcId>,
    pub connector_ids: Vec<ConnectorId>,
    pub encoder_ids: Vec<EncoderId>,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorState {
    pub id: ConnectorId,
    pub current_encoder_id: EncoderId,
    pub connector_type: ConnectorType,
    pub connector_type_id: u32,
    pub connection_state: ConnectionState,
    pub width_mm: u32,
    pub height_mm: u32,
    pub subpixel_type: SubpixelType,
    pub modes: Vec<ModeInfo>,
    pub props: Vec<ModeProp>,
    pub available_encoder_ids: Vec<EncoderId>,
}

impl ConnectorState {
    pub fn preferred_mode(&self) -> Option<&ModeInfo> {
        self.modes.iter().find(|mode| mode.is_preferred())
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u32)]
pub enum ConnectionState {
    Connected = 1,
    Disconnected = 2,
    Unknown = 3,
}

impl From<u32> for ConnectionState {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum ConnectorType {
    Unknown = 0,
    Vga = 1,
    DviI = 2,
    DviD = 3,
    DviA = 4,
    Composite = 5,
    SVideo = 6,
    Lvds = 7,
    Component = 8,
    NinePinDin = 9,
    DisplayPort = 10,
    HdmiA = 11,
    HdmiB = 12,
    Tv = 13,
    Edp = 14,
    Virtual = 15,
    Dsi = 16,
    Dpi = 17,
    Writeback = 18,
    Spi = 19,
    Usb = 20,
    Other = !0, // Not used by kernel, but used by us if kernel returns something we don't know
}

impl From<u32> for ConnectorType {
    #[inline]
    fn from(value: u32) -> Self {
        if value < 21 {
            // Safety: all values in this range are valid representations
            // of this enum, as described above.
            unsafe { core::mem::transmute(value) }
        } else {
            Self::Other
        }
    }
}

/// How the subpixels of a panel are laid out.
///
/// The kernel numbers these from zero; this type numbers them from one,
/// so decoding adds one to the kernel's value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum SubpixelType {
    Unknown = 1,
    HorizontalRgb = 2,
    HorizontalBgr = 3,
    VerticalRgb = 4,
    VerticalBgr = 5,
    None = 6,
}

impl SubpixelType {
    pub fn from_kernel(raw: u32) -> Self {
        Self::from(raw.saturating_add(1))
    }
}

impl From<u32> for SubpixelType {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::HorizontalRgb,
            3 => Self::HorizontalBgr,
            4 => Self::VerticalRgb,
            5 => Self::VerticalBgr,
            6 => Self::None,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderState {
    pub encoder_id: EncoderId,
    pub encoder_type: u32,
    /// Zero when the encoder isn't driven by any CRTC.
    pub current_crtc_id: CrtcId,
    /// Bit `j` is set if CRTC number `j` of [`CardResources::crtc_ids`]
    /// can drive this encoder.
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

impl EncoderState {
    #[inline]
    pub fn can_use_crtc_index(&self, index: usize) -> bool {
        index < 32 && (self.possible_crtcs & (1 << index)) != 0
    }
}

impl From<ioctl::DrmModeGetEncoder> for EncoderState {
    fn from(value: ioctl::DrmModeGetEncoder) -> Self {
        Self {
            encoder_id: EncoderId(value.encoder_id),
            encoder_type: value.encoder_type,
            current_crtc_id: CrtcId(value.crtc_id),
            possible_crtcs: value.possible_crtcs,
            possible_clones: value.possible_clones,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcState {
    pub crtc_id: CrtcId,
    /// Zero when the CRTC isn't scanning out anything.
    pub fb_id: FramebufferId,
    pub x: u32,
    pub y: u32,
    /// Size of the active mode, or zero if there is none.
    pub width: u32,
    pub height: u32,
    pub gamma_size: u32,
    pub mode_valid: bool,
    pub mode: ModeInfo,
}

impl From<ioctl::DrmModeCrtc> for CrtcState {
    fn from(value: ioctl::DrmModeCrtc) -> Self {
        let mode_valid = value.mode_valid != 0;
        let (width, height) = if mode_valid {
            (value.mode.hdisplay as u32, value.mode.vdisplay as u32)
        } else {
            (0, 0)
        };
        Self {
            crtc_id: CrtcId(value.crtc_id),
            fb_id: FramebufferId(value.fb_id),
            x: value.x,
            y: value.y,
            width,
            height,
            gamma_size: value.gamma_size,
            mode_valid,
            mode: value.mode.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneState {
    pub id: PlaneId,
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
    /// Supported pixel formats, as fourcc codes.
    pub formats: Vec<u32>,
}

/// Legacy plane update, see [`Card::set_plane`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneConfig {
    pub plane_id: PlaneId,
    pub crtc_id: CrtcId,
    /// Zero disables the plane.
    pub fb_id: FramebufferId,
    pub crtc_x: i32,
    pub crtc_y: i32,
    pub crtc_w: u32,
    pub crtc_h: u32,
    /// Source rectangle within the framebuffer, in 16.16 fixed point.
    pub src_x: fixedu16_16,
    pub src_y: fixedu16_16,
    pub src_w: fixedu16_16,
    pub src_h: fixedu16_16,
}

/// A property value attached to a mode object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProp {
    pub prop_id: PropertyId,
    pub value: u64,
}

/// Display timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub name: Vec<u8>,
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
}

impl ModeInfo {
    #[inline]
    pub fn is_preferred(&self) -> bool {
        (self.typ & ioctl::DRM_MODE_TYPE_PREFERRED) != 0
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Visible size in pixels.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.hdisplay as u32, self.vdisplay as u32)
    }
}

impl From<ioctl::DrmModeInfo> for ModeInfo {
    fn from(value: ioctl::DrmModeInfo) -> Self {
        Self {
            name: trim_nul(&value.name).to_vec(),
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
        }
    }
}

impl From<&ModeInfo> for ioctl::DrmModeInfo {
    fn from(value: &ModeInfo) -> Self {
        let mut name = [0_u8; ioctl::DRM_DISPLAY_MODE_LEN];
        // Always leave room for the terminator.
        let name_len = core::cmp::min(name.len() - 1, value.name.len());
        name[..name_len].copy_from_slice(&value.name[..name_len]);
        Self {
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
            name,
        }
    }
}

impl ProbeFill for ioctl::DrmModeCardRes {
    type Scratch = [Scratch<u32>; 4];
    type Output = CardResources;

    fn attach(&mut self) -> Result<Self::Scratch, Error> {
        let mut fbs = Scratch::for_count(self.count_fbs as usize)?;
        let mut crtcs = Scratch::for_count(self.count_crtcs as usize)?;
        let mut connectors = Scratch::for_count(self.count_connectors as usize)?;
        let mut encoders = Scratch::for_count(self.count_encoders as usize)?;
        self.fb_id_ptr = fbs.user_ptr();
        self.crtc_id_ptr = crtcs.user_ptr();
        self.connector_id_ptr = connectors.user_ptr();
        self.encoder_id_ptr = encoders.user_ptr();
        debug!(
            fbs = fbs.count(),
            crtcs = crtcs.count(),
            connectors = connectors.count(),
            encoders = encoders.count(),
            "card resources probed"
        );
        Ok([fbs, crtcs, connectors, encoders])
    }

    fn decode(self, scratch: Self::Scratch) -> Result<CardResources, Error> {
        let [fbs, crtcs, connectors, encoders] = scratch;
        Ok(CardResources {
            fb_ids: ids(fbs.finish(self.count_fbs as usize)?, FramebufferId),
            crtc_ids: ids(crtcs.finish(self.count_crtcs as usize)?, CrtcId),
            connector_ids: ids(
                connectors.finish(self.count_connectors as usize)?,
                ConnectorId,
            ),
            encoder_ids: ids(encoders.finish(self.count_encoders as usize)?, EncoderId),
            min_width: self.min_width,
            max_width: self.max_width,
            min_height: self.min_height,
            max_height: self.max_height,
        })
    }
}

pub(crate) struct ConnectorScratch {
    encoders: Scratch<u32>,
    modes: Scratch<ioctl::DrmModeInfo>,
    props: Scratch<u32>,
    prop_values: Scratch<u64>,
}

impl ProbeFill for ioctl::DrmModeGetConnector {
    type Scratch = ConnectorScratch;
    type Output = ConnectorState;

    fn attach(&mut self) -> Result<ConnectorScratch, Error> {
        let mut encoders = Scratch::for_count(self.count_encoders as usize)?;
        // Some drivers report no modes on the probe call and still produce
        // one when asked, so there is always room for at least one.
        let mut modes = Scratch::for_count(max(self.count_modes, 1) as usize)?;
        let mut props = Scratch::for_count(self.count_props as usize)?;
        let mut prop_values = Scratch::for_count(self.count_props as usize)?;

        self.encoders_ptr = encoders.user_ptr();
        self.modes_ptr = modes.user_ptr();
        self.count_modes = modes.count();
        self.props_ptr = props.user_ptr();
        self.prop_values_ptr = prop_values.user_ptr();
        debug!(
            connector_id = self.connector_id,
            modes = modes.count(),
            encoders = encoders.count(),
            props = props.count(),
            "connector probed"
        );
        Ok(ConnectorScratch {
            encoders,
            modes,
            props,
            prop_values,
        })
    }

    fn decode(self, scratch: ConnectorScratch) -> Result<ConnectorState, Error> {
        let encoders = scratch.encoders.finish(self.count_encoders as usize)?;
        let modes = scratch.modes.finish(self.count_modes as usize)?;
        let props = scratch.props.finish(self.count_props as usize)?;
        let prop_values = scratch.prop_values.finish(self.count_props as usize)?;
        Ok(ConnectorState {
            id: ConnectorId(self.connector_id),
            current_encoder_id: EncoderId(self.encoder_id),
            connector_type: self.connector_type.into(),
            connector_type_id: self.connector_type_id,
            connection_state: self.connection.into(),
            width_mm: self.mm_width,
            height_mm: self.mm_height,
            subpixel_type: SubpixelType::from_kernel(self.subpixel),
            modes: modes.into_iter().map(ModeInfo::from).collect(),
            props: zip_props(props, prop_values),
            available_encoder_ids: ids(encoders, EncoderId),
        })
    }
}

impl ProbeFill for ioctl::DrmModeGetPlaneRes {
    type Scratch = Scratch<u32>;
    type Output = Vec<PlaneId>;

    fn attach(&mut self) -> Result<Scratch<u32>, Error> {
        let mut planes = Scratch::for_count(self.count_planes as usize)?;
        self.plane_id_ptr = planes.user_ptr();
        Ok(planes)
    }

    fn decode(self, scratch: Scratch<u32>) -> Result<Vec<PlaneId>, Error> {
        Ok(ids(scratch.finish(self.count_planes as usize)?, PlaneId))
    }
}

impl ProbeFill for ioctl::DrmModeGetPlane {
    type Scratch = Scratch<u32>;
    type Output = PlaneState;

    fn attach(&mut self) -> Result<Scratch<u32>, Error> {
        let mut formats = Scratch::for_count(self.count_format_types as usize)?;
        self.format_type_ptr = formats.user_ptr();
        Ok(formats)
    }

    fn decode(self, scratch: Scratch<u32>) -> Result<PlaneState, Error> {
        Ok(PlaneState {
            id: PlaneId(self.plane_id),
            crtc_id: CrtcId(self.crtc_id),
            fb_id: FramebufferId(self.fb_id),
            possible_crtcs: self.possible_crtcs,
            gamma_size: self.gamma_size,
            formats: scratch.finish(self.count_format_types as usize)?,
        })
    }
}

impl ProbeFill for ioctl::DrmModeObjGetProperties {
    type Scratch = (Scratch<u32>, Scratch<u64>);
    type Output = Vec<ModeProp>;

    fn attach(&mut self) -> Result<Self::Scratch, Error> {
        let mut props = Scratch::for_count(self.count_props as usize)?;
        let mut values = Scratch::for_count(self.count_props as usize)?;
        self.props_ptr = props.user_ptr();
        self.prop_values_ptr = values.user_ptr();
        Ok((props, values))
    }

    fn decode(self, (props, values): Self::Scratch) -> Result<Vec<ModeProp>, Error> {
        let count = self.count_props as usize;
        Ok(zip_props(props.finish(count)?, values.finish(count)?))
    }
}

fn ids<T>(raw: Vec<u32>, f: impl Fn(u32) -> T) -> Vec<T> {
    raw.into_iter().map(f).collect()
}

fn zip_props(ids: Vec<u32>, values: Vec<u64>) -> Vec<ModeProp> {
    ids.into_iter()
        .zip(values)
        .map(|(id, value)| ModeProp {
            prop_id: PropertyId(id),
            value,
        })
        .collect()
}

impl<D: RawDevice> Card<D> {
    /// Lists the framebuffers, CRTCs, connectors and encoders of the card.
    pub fn resources(&self) -> Result<CardResources, Error> {
        probe_then_fill(
            self,
            ioctl::DRM_IOCTL_MODE_GETRESOURCES,
            ioctl::DrmModeCardRes::zeroed(),
        )
    }

    pub fn connector_state(&self, id: ConnectorId) -> Result<ConnectorState, Error> {
        let mut tmp = ioctl::DrmModeGetConnector::zeroed();
        tmp.connector_id = id.0;
        probe_then_fill(self, ioctl::DRM_IOCTL_MODE_GETCONNECTOR, tmp)
    }

    pub fn encoder_state(&self, id: EncoderId) -> Result<EncoderState, Error> {
        let mut tmp = ioctl::DrmModeGetEncoder::zeroed();
        tmp.encoder_id = id.0;
        self.ioctl(ioctl::DRM_IOCTL_MODE_GETENCODER, &mut tmp)?;
        Ok(tmp.into())
    }

    pub fn crtc_state(&self, id: CrtcId) -> Result<CrtcState, Error> {
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = id.0;
        self.ioctl(ioctl::DRM_IOCTL_MODE_GETCRTC, &mut tmp)?;
        Ok(tmp.into())
    }

    /// Makes `crtc_id` scan out `fb_id` at offset (`x`, `y`) with `mode` on
    /// all of `connectors`.
    ///
    /// Passing no mode and no connectors turns the CRTC off.
    pub fn set_crtc(
        &self,
        crtc_id: CrtcId,
        fb_id: FramebufferId,
        x: u32,
        y: u32,
        connectors: &[ConnectorId],
        mode: Option<&ModeInfo>,
    ) -> Result<(), Error> {
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = crtc_id.0;
        tmp.fb_id = fb_id.0;
        tmp.x = x;
        tmp.y = y;
        // ConnectorId is a transparent u32, so the slice already has the
        // layout the kernel expects.
        tmp.set_connectors_ptr = UserPtr::from_slice(connectors);
        tmp.count_connectors = connectors.len() as u32;
        if let Some(mode) = mode {
            tmp.mode = mode.into();
            tmp.mode_valid = 1;
        }
        self.ioctl(ioctl::DRM_IOCTL_MODE_SETCRTC, &mut tmp)
    }

    /// Puts a CRTC back into a previously captured state.
    ///
    /// `connectors` is only used when `saved` had an active mode.
    pub fn restore_crtc(&self, saved: &CrtcState, connectors: &[ConnectorId]) -> Result<(), Error> {
        if saved.mode_valid {
            self.set_crtc(
                saved.crtc_id,
                saved.fb_id,
                saved.x,
                saved.y,
                connectors,
                Some(&saved.mode),
            )
        } else {
            self.set_crtc(saved.crtc_id, FramebufferId(0), 0, 0, &[], None)
        }
    }

    /// Lists the planes of the card. Only overlay planes are included
    /// unless [`crate::ClientCap::UNIVERSAL_PLANES`] was enabled.
    pub fn plane_resources(&self) -> Result<Vec<PlaneId>, Error> {
        probe_then_fill(
            self,
            ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES,
            ioctl::DrmModeGetPlaneRes::zeroed(),
        )
    }

    pub fn plane_state(&self, id: PlaneId) -> Result<PlaneState, Error> {
        let mut tmp = ioctl::DrmModeGetPlane::zeroed();
        tmp.plane_id = id.0;
        probe_then_fill(self, ioctl::DRM_IOCTL_MODE_GETPLANE, tmp)
    }

    pub fn set_plane(&self, config: &PlaneConfig) -> Result<(), Error> {
        let mut tmp = ioctl::DrmModeSetPlane {
            plane_id: config.plane_id.0,
            crtc_id: config.crtc_id.0,
            fb_id: config.fb_id.0,
            flags: 0,
            crtc_x: config.crtc_x,
            crtc_y: config.crtc_y,
            crtc_w: config.crtc_w,
            crtc_h: config.crtc_h,
            src_x: config.src_x,
            src_y: config.src_y,
            src_h: config.src_h,
            src_w: config.src_w,
        };
        self.ioctl(ioctl::DRM_IOCTL_MODE_SETPLANE, &mut tmp)
    }

    /// Current values of every property attached to an object.
    pub fn object_properties(&self, obj: impl Into<ObjectId>) -> Result<Vec<ModeProp>, Error> {
        let (obj_type, obj_id) = obj.into().as_raw_type_and_id();
        let mut tmp = ioctl::DrmModeObjGetProperties::zeroed();
        tmp.obj_id = obj_id;
        tmp.obj_type = obj_type;
        probe_then_fill(self, ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES, tmp)
    }
}
