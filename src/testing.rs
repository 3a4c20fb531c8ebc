//! An in-memory stand-in for a DRM device, used by the unit tests.
//!
//! [`FakeCard`] answers requests the way the kernel does, including the
//! copy rules of the probe-then-fill protocol: an array is only copied out
//! when the caller's count covers every item, and the real count is always
//! written back.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use linux_io::result::{EINVAL, ENOENT};

use crate::device::RawDevice;
use crate::ioctl::{self, DrmModeInfo, IoctlCode, UserPtr};
use crate::result::{Errno, Error};

const FOREIGN_FB: u32 = 7;

pub(crate) fn mode(name: &str, width: u16, height: u16) -> DrmModeInfo {
    let mut raw = DrmModeInfo::zeroed();
    raw.name[..name.len()].copy_from_slice(name.as_bytes());
    raw.clock = 65000;
    raw.hdisplay = width;
    raw.hsync_start = width + 24;
    raw.hsync_end = width + 160;
    raw.htotal = width + 320;
    raw.vdisplay = height;
    raw.vsync_start = height + 3;
    raw.vsync_end = height + 9;
    raw.vtotal = height + 38;
    raw.vrefresh = 60;
    raw.typ = ioctl::DRM_MODE_TYPE_DRIVER;
    raw
}

#[derive(Debug, Clone)]
pub(crate) struct FakeConnector {
    pub(crate) id: u32,
    pub(crate) connector_type: u32,
    pub(crate) connection: u32,
    pub(crate) current_encoder: u32,
    pub(crate) encoders: Vec<u32>,
    pub(crate) modes: Vec<DrmModeInfo>,
    pub(crate) props: Vec<(u32, u64)>,
    pub(crate) subpixel: u32,
    /// Report no modes to the probe call but produce them on the fill
    /// call, as some drivers do.
    pub(crate) hide_modes_on_probe: bool,
}

impl FakeConnector {
    pub(crate) fn connected(id: u32, encoders: Vec<u32>) -> Self {
        Self {
            id,
            connector_type: 11,
            connection: 1,
            current_encoder: 0,
            encoders,
            modes: vec![mode("1024x768", 1024, 768)],
            props: vec![(100, 2)],
            subpixel: 1,
            hide_modes_on_probe: false,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeCrtc {
    raw: ioctl::DrmModeCrtc,
    connectors: Vec<u32>,
}

#[derive(Debug, Clone)]
struct FakePlane {
    raw: ioctl::DrmModeGetPlane,
    formats: Vec<u32>,
}

#[derive(Debug, Clone)]
struct FakeProperty {
    id: u32,
    name: &'static str,
    flags: u32,
    values: Vec<u64>,
    enums: Vec<(u64, &'static str)>,
}

#[derive(Debug, Clone, Copy)]
struct FakeDumb {
    size: u64,
}

/// The arrays of one atomic commit, as the kernel received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeAtomicCommit {
    pub(crate) flags: u32,
    pub(crate) objs: Vec<u32>,
    pub(crate) count_props: Vec<u32>,
    pub(crate) props: Vec<u32>,
    pub(crate) values: Vec<u64>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<u8>,
    faults: HashMap<u8, Errno>,
    caps: HashMap<u64, u64>,
    client_caps: HashMap<u64, u64>,
    connectors: Vec<FakeConnector>,
    encoders: Vec<ioctl::DrmModeGetEncoder>,
    crtcs: Vec<FakeCrtc>,
    planes: Vec<FakePlane>,
    props: Vec<FakeProperty>,
    blobs: BTreeMap<u32, Vec<u8>>,
    dumbs: BTreeMap<u32, FakeDumb>,
    fbs: BTreeMap<u32, u32>,
    next_handle: u32,
    next_object: u32,
    hotplug: Option<FakeConnector>,
    requested_mode_slots: Vec<u32>,
    mapped_offsets: Vec<u64>,
    atomic_commits: Vec<FakeAtomicCommit>,
}

pub(crate) struct FakeCard {
    state: RefCell<FakeState>,
    unmapped: Rc<Cell<usize>>,
}

impl FakeCard {
    /// A device with no mode objects at all.
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(FakeState {
                next_handle: 1,
                next_object: 1000,
                ..FakeState::default()
            }),
            unmapped: Rc::new(Cell::new(0)),
        }
    }

    /// A device with `outputs` connected connectors, each with its own
    /// encoder and CRTC, and `planes` overlay planes.
    ///
    /// Connector `10 + i` is wired to encoder `20 + i`, and every encoder
    /// can drive every CRTC `30 + i`. The first output is already lit:
    /// encoder 20 is driven by CRTC 30, which shows a 640x480 mode from a
    /// framebuffer owned by some other client.
    pub(crate) fn with_outputs(outputs: u32, planes: u32) -> Self {
        let card = Self::new();
        {
            let mut st = card.state.borrow_mut();
            st.caps.insert(crate::DeviceCap::DUMB_BUFFER.0, 1);
            st.caps.insert(crate::DeviceCap::DUMB_PREFERRED_DEPTH.0, 24);
            let all_crtcs = (1_u32 << outputs) - 1;
            for i in 0..outputs {
                let mut conn = FakeConnector::connected(10 + i, vec![20 + i]);
                if i == 0 {
                    conn.current_encoder = 20;
                }
                st.connectors.push(conn);

                st.encoders.push(ioctl::DrmModeGetEncoder {
                    encoder_id: 20 + i,
                    encoder_type: 2,
                    crtc_id: if i == 0 { 30 } else { 0 },
                    possible_crtcs: all_crtcs,
                    possible_clones: 0,
                });

                let mut raw = ioctl::DrmModeCrtc::zeroed();
                raw.crtc_id = 30 + i;
                raw.gamma_size = 256;
                let mut connectors = Vec::new();
                if i == 0 {
                    raw.fb_id = FOREIGN_FB;
                    raw.mode_valid = 1;
                    raw.mode = mode("640x480", 640, 480);
                    connectors.push(10);
                }
                st.crtcs.push(FakeCrtc { raw, connectors });
            }
            for i in 0..planes {
                let mut raw = ioctl::DrmModeGetPlane::zeroed();
                raw.plane_id = 40 + i;
                raw.possible_crtcs = 1 << i;
                st.planes.push(FakePlane {
                    raw,
                    formats: vec![ioctl::DRM_FORMAT_XRGB8888],
                });
            }
            st.props.push(FakeProperty {
                id: 100,
                name: "DPMS",
                flags: ioctl::DRM_MODE_PROP_ENUM,
                values: vec![0, 1, 2, 3],
                enums: vec![(0, "On"), (1, "Standby"), (2, "Suspend"), (3, "Off")],
            });
            st.props.push(FakeProperty {
                id: 101,
                name: "max_width",
                flags: ioctl::DRM_MODE_PROP_RANGE | ioctl::DRM_MODE_PROP_IMMUTABLE,
                values: vec![0, 8192],
                enums: Vec::new(),
            });
        }
        card
    }

    /// Request numbers of every call so far, including failed ones.
    pub(crate) fn calls(&self) -> Vec<u8> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Makes every later request `nr` fail with `errno`.
    pub(crate) fn fail(&self, nr: u8, errno: Errno) {
        self.state.borrow_mut().faults.insert(nr, errno);
    }

    pub(crate) fn clear_faults(&self) {
        self.state.borrow_mut().faults.clear();
    }

    pub(crate) fn set_cap(&self, id: u64, value: u64) {
        self.state.borrow_mut().caps.insert(id, value);
    }

    pub(crate) fn client_cap(&self, id: u64) -> Option<u64> {
        self.state.borrow().client_caps.get(&id).copied()
    }

    /// Adds `conn` right after the next resources request is answered.
    pub(crate) fn hotplug_on_next_probe(&self, conn: FakeConnector) {
        self.state.borrow_mut().hotplug = Some(conn);
    }

    pub(crate) fn with_connector(&self, id: u32, f: impl FnOnce(&mut FakeConnector)) {
        let mut st = self.state.borrow_mut();
        if let Some(conn) = st.connectors.iter_mut().find(|c| c.id == id) {
            f(conn);
        }
    }

    pub(crate) fn with_encoder(&self, id: u32, f: impl FnOnce(&mut ioctl::DrmModeGetEncoder)) {
        let mut st = self.state.borrow_mut();
        if let Some(enc) = st.encoders.iter_mut().find(|e| e.encoder_id == id) {
            f(enc);
        }
    }

    /// Mode counts supplied by connector fill calls.
    pub(crate) fn requested_mode_slots(&self) -> Vec<u32> {
        self.state.borrow().requested_mode_slots.clone()
    }

    pub(crate) fn crtc_connectors(&self, crtc_id: u32) -> Vec<u32> {
        let st = self.state.borrow();
        st.crtcs
            .iter()
            .find(|c| c.raw.crtc_id == crtc_id)
            .map(|c| c.connectors.clone())
            .unwrap_or_default()
    }

    pub(crate) fn framebuffer_handle(&self, fb_id: u32) -> Option<u32> {
        self.state.borrow().fbs.get(&fb_id).copied()
    }

    pub(crate) fn live_dumb_buffers(&self) -> usize {
        self.state.borrow().dumbs.len()
    }

    pub(crate) fn mapped_offsets(&self) -> Vec<u64> {
        self.state.borrow().mapped_offsets.clone()
    }

    pub(crate) fn atomic_commits(&self) -> Vec<FakeAtomicCommit> {
        self.state.borrow().atomic_commits.clone()
    }

    /// How many mappings have been dropped.
    pub(crate) fn unmapped(&self) -> usize {
        self.unmapped.get()
    }
}

fn map_offset(handle: u32) -> u64 {
    0x1_0000_0000 + ((handle as u64) << 24)
}

unsafe fn arg_mut<'a, T>(code: IoctlCode, arg: *mut c_void) -> &'a mut T {
    assert_eq!(code.size(), size_of::<T>(), "wrong argument size for {code}");
    &mut *(arg as *mut T)
}

/// Kernel-style copy out: nothing is written unless `cap` covers every
/// item. Returns the real count.
unsafe fn copy_out<T: Copy>(dst: UserPtr, cap: u32, items: &[T]) -> u32 {
    if !dst.is_null() && !items.is_empty() && cap as usize >= items.len() {
        core::ptr::copy_nonoverlapping(items.as_ptr(), dst.as_mut_ptr::<T>(), items.len());
    }
    items.len() as u32
}

unsafe fn copy_in<T: Copy>(src: UserPtr, count: usize) -> Vec<T> {
    if src.is_null() || count == 0 {
        return Vec::new();
    }
    core::slice::from_raw_parts(src.as_mut_ptr::<T>() as *const T, count).to_vec()
}

/// `drm_copy_field`: copies as much as fits and reports the full length.
unsafe fn copy_field(dst: *mut core::ffi::c_char, len: &mut usize, value: &str) {
    let n = core::cmp::min(*len, value.len());
    if !dst.is_null() && n > 0 {
        core::ptr::copy_nonoverlapping(value.as_ptr(), dst as *mut u8, n);
    }
    *len = value.len();
}

impl FakeState {
    fn new_object_id(&mut self) -> u32 {
        self.next_object += 1;
        self.next_object
    }

    fn fb_exists(&self, fb_id: u32) -> bool {
        fb_id == FOREIGN_FB || self.fbs.contains_key(&fb_id)
    }

    unsafe fn dispatch(&mut self, code: IoctlCode, arg: *mut c_void) -> Result<(), Errno> {
        match code.number() {
            0x00 => {
                let v: &mut ioctl::DrmVersion = arg_mut(code, arg);
                v.version_major = 1;
                v.version_minor = 2;
                v.version_patchlevel = 3;
                copy_field(v.name, &mut v.name_len, "fakedrm");
                copy_field(v.date, &mut v.date_len, "20240101");
                copy_field(v.desc, &mut v.desc_len, "Simulated DRM device");
                Ok(())
            }
            0x0c => {
                let cap: &mut ioctl::DrmGetCap = arg_mut(code, arg);
                cap.value = *self.caps.get(&cap.capability).ok_or(EINVAL)?;
                Ok(())
            }
            0x0d => {
                let cap: &mut ioctl::DrmSetClientCap = arg_mut(code, arg);
                if !(1..=6).contains(&cap.capability) {
                    return Err(EINVAL);
                }
                self.client_caps.insert(cap.capability, cap.value);
                Ok(())
            }
            0x1e | 0x1f => {
                assert_eq!(code.size(), 0);
                Ok(())
            }
            0xa0 => self.get_resources(arg_mut(code, arg)),
            0xa1 => {
                let req: &mut ioctl::DrmModeCrtc = arg_mut(code, arg);
                let crtc = self
                    .crtcs
                    .iter()
                    .find(|c| c.raw.crtc_id == req.crtc_id)
                    .ok_or(ENOENT)?;
                req.fb_id = crtc.raw.fb_id;
                req.x = crtc.raw.x;
                req.y = crtc.raw.y;
                req.gamma_size = crtc.raw.gamma_size;
                req.mode_valid = crtc.raw.mode_valid;
                req.mode = crtc.raw.mode;
                Ok(())
            }
            0xa2 => self.set_crtc(arg_mut(code, arg)),
            0xa6 => {
                let req: &mut ioctl::DrmModeGetEncoder = arg_mut(code, arg);
                let id = req.encoder_id;
                *req = *self
                    .encoders
                    .iter()
                    .find(|e| e.encoder_id == id)
                    .ok_or(ENOENT)?;
                Ok(())
            }
            0xa7 => self.get_connector(arg_mut(code, arg)),
            0xaa => self.get_property(arg_mut(code, arg)),
            0xac => {
                let req: &mut ioctl::DrmModeGetBlob = arg_mut(code, arg);
                let data = self.blobs.get(&req.blob_id).ok_or(ENOENT)?;
                req.length = copy_out(req.data, req.length, data);
                Ok(())
            }
            0xae => {
                let req: &mut ioctl::DrmModeFbCmd = arg_mut(code, arg);
                if !self.dumbs.contains_key(&req.handle) {
                    return Err(ENOENT);
                }
                let id = self.new_object_id();
                self.fbs.insert(id, req.handle);
                req.fb_id = id;
                Ok(())
            }
            0xaf => {
                let fb_id = *arg_mut::<u32>(code, arg);
                self.fbs.remove(&fb_id).ok_or(ENOENT)?;
                // Removing a framebuffer that is being scanned out turns
                // the CRTC off.
                for crtc in self.crtcs.iter_mut().filter(|c| c.raw.fb_id == fb_id) {
                    crtc.raw.fb_id = 0;
                    crtc.raw.mode_valid = 0;
                    crtc.raw.mode = DrmModeInfo::zeroed();
                    crtc.connectors.clear();
                }
                Ok(())
            }
            0xb2 => {
                let req: &mut ioctl::DrmModeCreateDumb = arg_mut(code, arg);
                if req.width == 0 || req.height == 0 || req.bpp == 0 {
                    return Err(EINVAL);
                }
                let row = req.width * req.bpp.div_ceil(8);
                req.pitch = row.next_multiple_of(64);
                req.size = req.pitch as u64 * req.height as u64;
                req.handle = self.next_handle;
                self.next_handle += 1;
                self.dumbs.insert(req.handle, FakeDumb { size: req.size });
                Ok(())
            }
            0xb3 => {
                let req: &mut ioctl::DrmModeMapDumb = arg_mut(code, arg);
                if !self.dumbs.contains_key(&req.handle) {
                    return Err(ENOENT);
                }
                req.offset = map_offset(req.handle);
                Ok(())
            }
            0xb4 => {
                let req: &mut ioctl::DrmModeDestroyDumb = arg_mut(code, arg);
                self.dumbs.remove(&req.handle).ok_or(ENOENT)?;
                Ok(())
            }
            0xb5 => {
                let req: &mut ioctl::DrmModeGetPlaneRes = arg_mut(code, arg);
                let ids: Vec<u32> = self.planes.iter().map(|p| p.raw.plane_id).collect();
                req.count_planes = copy_out(req.plane_id_ptr, req.count_planes, &ids);
                Ok(())
            }
            0xb6 => {
                let req: &mut ioctl::DrmModeGetPlane = arg_mut(code, arg);
                let plane = self
                    .planes
                    .iter()
                    .find(|p| p.raw.plane_id == req.plane_id)
                    .ok_or(ENOENT)?;
                req.crtc_id = plane.raw.crtc_id;
                req.fb_id = plane.raw.fb_id;
                req.possible_crtcs = plane.raw.possible_crtcs;
                req.gamma_size = plane.raw.gamma_size;
                req.count_format_types =
                    copy_out(req.format_type_ptr, req.count_format_types, &plane.formats);
                Ok(())
            }
            0xb7 => {
                let req: &mut ioctl::DrmModeSetPlane = arg_mut(code, arg);
                if req.fb_id != 0 && !self.fb_exists(req.fb_id) {
                    return Err(ENOENT);
                }
                let plane = self
                    .planes
                    .iter_mut()
                    .find(|p| p.raw.plane_id == req.plane_id)
                    .ok_or(ENOENT)?;
                plane.raw.crtc_id = req.crtc_id;
                plane.raw.fb_id = req.fb_id;
                Ok(())
            }
            0xb8 => {
                let req: &mut ioctl::DrmModeFbCmd2 = arg_mut(code, arg);
                if !self.dumbs.contains_key(&req.handles[0]) {
                    return Err(ENOENT);
                }
                let id = self.new_object_id();
                self.fbs.insert(id, req.handles[0]);
                req.fb_id = id;
                Ok(())
            }
            0xb9 => {
                let req: &mut ioctl::DrmModeObjGetProperties = arg_mut(code, arg);
                let props: Vec<(u32, u64)> = match req.obj_type {
                    ioctl::DRM_MODE_OBJECT_CONNECTOR => self
                        .connectors
                        .iter()
                        .find(|c| c.id == req.obj_id)
                        .ok_or(ENOENT)?
                        .props
                        .clone(),
                    ioctl::DRM_MODE_OBJECT_CRTC
                        if self.crtcs.iter().any(|c| c.raw.crtc_id == req.obj_id) =>
                    {
                        Vec::new()
                    }
                    ioctl::DRM_MODE_OBJECT_PLANE
                        if self.planes.iter().any(|p| p.raw.plane_id == req.obj_id) =>
                    {
                        Vec::new()
                    }
                    _ => return Err(ENOENT),
                };
                let ids: Vec<u32> = props.iter().map(|p| p.0).collect();
                let values: Vec<u64> = props.iter().map(|p| p.1).collect();
                copy_out(req.prop_values_ptr, req.count_props, &values);
                req.count_props = copy_out(req.props_ptr, req.count_props, &ids);
                Ok(())
            }
            0xbc => {
                let req: &mut ioctl::DrmModeAtomic = arg_mut(code, arg);
                if req.flags & !ioctl::DRM_MODE_ATOMIC_FLAGS != 0 {
                    return Err(EINVAL);
                }
                let objs: Vec<u32> = copy_in(req.objs_ptr, req.count_objs as usize);
                let count_props: Vec<u32> = copy_in(req.count_props_ptr, req.count_objs as usize);
                let total = count_props.iter().sum::<u32>() as usize;
                self.atomic_commits.push(FakeAtomicCommit {
                    flags: req.flags,
                    objs,
                    count_props,
                    props: copy_in(req.props_ptr, total),
                    values: copy_in(req.prop_values_ptr, total),
                });
                Ok(())
            }
            0xbd => {
                let req: &mut ioctl::DrmModeCreateBlob = arg_mut(code, arg);
                if req.length == 0 {
                    return Err(EINVAL);
                }
                let data: Vec<u8> = copy_in(req.data, req.length as usize);
                let id = self.new_object_id();
                self.blobs.insert(id, data);
                req.blob_id = id;
                Ok(())
            }
            0xbe => {
                let req: &mut ioctl::DrmModeDestroyBlob = arg_mut(code, arg);
                self.blobs.remove(&req.blob_id).ok_or(ENOENT)?;
                Ok(())
            }
            _ => Err(EINVAL),
        }
    }

    unsafe fn get_resources(&mut self, req: &mut ioctl::DrmModeCardRes) -> Result<(), Errno> {
        let fbs: Vec<u32> = self.fbs.keys().copied().collect();
        let crtcs: Vec<u32> = self.crtcs.iter().map(|c| c.raw.crtc_id).collect();
        let connectors: Vec<u32> = self.connectors.iter().map(|c| c.id).collect();
        let encoders: Vec<u32> = self.encoders.iter().map(|e| e.encoder_id).collect();
        req.count_fbs = copy_out(req.fb_id_ptr, req.count_fbs, &fbs);
        req.count_crtcs = copy_out(req.crtc_id_ptr, req.count_crtcs, &crtcs);
        req.count_connectors = copy_out(req.connector_id_ptr, req.count_connectors, &connectors);
        req.count_encoders = copy_out(req.encoder_id_ptr, req.count_encoders, &encoders);
        req.min_width = 0;
        req.max_width = 8192;
        req.min_height = 0;
        req.max_height = 8192;
        if let Some(conn) = self.hotplug.take() {
            self.connectors.push(conn);
        }
        Ok(())
    }

    unsafe fn get_connector(&mut self, req: &mut ioctl::DrmModeGetConnector) -> Result<(), Errno> {
        if !req.modes_ptr.is_null() {
            self.requested_mode_slots.push(req.count_modes);
        }
        let conn = self
            .connectors
            .iter()
            .find(|c| c.id == req.connector_id)
            .ok_or(ENOENT)?;

        req.encoder_id = conn.current_encoder;
        req.connector_type = conn.connector_type;
        req.connector_type_id = conn.id.saturating_sub(9);
        req.connection = conn.connection;
        req.mm_width = 340;
        req.mm_height = 190;
        req.subpixel = conn.subpixel;

        req.count_modes = if conn.hide_modes_on_probe && req.count_modes == 0 {
            0
        } else {
            copy_out(req.modes_ptr, req.count_modes, &conn.modes)
        };
        req.count_encoders = copy_out(req.encoders_ptr, req.count_encoders, &conn.encoders);
        let ids: Vec<u32> = conn.props.iter().map(|p| p.0).collect();
        let values: Vec<u64> = conn.props.iter().map(|p| p.1).collect();
        copy_out(req.prop_values_ptr, req.count_props, &values);
        req.count_props = copy_out(req.props_ptr, req.count_props, &ids);
        Ok(())
    }

    unsafe fn set_crtc(&mut self, req: &mut ioctl::DrmModeCrtc) -> Result<(), Errno> {
        if req.fb_id != 0 && !self.fb_exists(req.fb_id) {
            return Err(ENOENT);
        }
        let connectors: Vec<u32> = copy_in(req.set_connectors_ptr, req.count_connectors as usize);
        if connectors
            .iter()
            .any(|id| !self.connectors.iter().any(|c| c.id == *id))
        {
            return Err(ENOENT);
        }
        if req.mode_valid != 0 && connectors.is_empty() {
            return Err(EINVAL);
        }
        let crtc = self
            .crtcs
            .iter_mut()
            .find(|c| c.raw.crtc_id == req.crtc_id)
            .ok_or(ENOENT)?;
        if req.mode_valid != 0 {
            crtc.raw.fb_id = req.fb_id;
            crtc.raw.x = req.x;
            crtc.raw.y = req.y;
            crtc.raw.mode = req.mode;
            crtc.raw.mode_valid = 1;
            crtc.connectors = connectors;
        } else {
            crtc.raw.fb_id = 0;
            crtc.raw.x = 0;
            crtc.raw.y = 0;
            crtc.raw.mode = DrmModeInfo::zeroed();
            crtc.raw.mode_valid = 0;
            crtc.connectors.clear();
        }
        Ok(())
    }

    unsafe fn get_property(&mut self, req: &mut ioctl::DrmModeGetProperty) -> Result<(), Errno> {
        let prop = self
            .props
            .iter()
            .find(|p| p.id == req.prop_id)
            .ok_or(ENOENT)?;
        req.flags = prop.flags;
        req.name = [0; ioctl::DRM_PROP_NAME_LEN];
        req.name[..prop.name.len()].copy_from_slice(prop.name.as_bytes());
        req.count_values = copy_out(req.values_ptr, req.count_values, &prop.values);
        let enums: Vec<ioctl::DrmModePropertyEnum> = prop
            .enums
            .iter()
            .map(|(value, name)| {
                let mut raw = ioctl::DrmModePropertyEnum::zeroed();
                raw.value = *value;
                raw.name[..name.len()].copy_from_slice(name.as_bytes());
                raw
            })
            .collect();
        req.count_enum_blobs = copy_out(req.enum_blob_ptr, req.count_enum_blobs, &enums);
        Ok(())
    }
}

impl RawDevice for FakeCard {
    type Mapping = FakeMapping;

    unsafe fn ioctl_raw(&self, code: IoctlCode, arg: *mut c_void) -> Result<(), Errno> {
        assert_eq!(code.class(), ioctl::DRM_IOCTL_BASE);
        let mut st = self.state.borrow_mut();
        st.calls.push(code.number());
        if let Some(errno) = st.faults.get(&code.number()) {
            return Err(*errno);
        }
        st.dispatch(code, arg)
    }

    fn map(&self, offset: u64, len: usize) -> Result<FakeMapping, Error> {
        let mut st = self.state.borrow_mut();
        let known = st
            .dumbs
            .iter()
            .any(|(handle, dumb)| map_offset(*handle) == offset && len as u64 <= dumb.size);
        if !known {
            return Err(Error::Map(std::io::Error::from_raw_os_error(libc::EINVAL)));
        }
        st.mapped_offsets.push(offset);
        Ok(FakeMapping {
            // The kernel doesn't clear dumb buffers; neither does this.
            data: vec![0xaa; len],
            unmapped: Rc::clone(&self.unmapped),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeMapping {
    data: Vec<u8>,
    unmapped: Rc<Cell<usize>>,
}

impl Deref for FakeMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for FakeMapping {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for FakeMapping {
    fn drop(&mut self) {
        self.unmapped.set(self.unmapped.get() + 1);
    }
}
