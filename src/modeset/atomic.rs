use core::iter;
use core::ops::BitOr;

use std::collections::BTreeMap;

use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl::{self, UserPtr};
use crate::result::Error;
use crate::Card;

use super::{AsRawPropertyValue, ObjectId, PropertyId};

/// One property write of an atomic commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicProperty {
    pub object_id: u32,
    pub prop_id: PropertyId,
    pub value: u64,
}

impl AtomicProperty {
    pub fn new(obj: impl Into<ObjectId>, prop_id: PropertyId, value: impl AsRawPropertyValue) -> Self {
        Self {
            object_id: obj.into().raw_id(),
            prop_id,
            value: value.as_raw_property_value(),
        }
    }
}

/// An atomic modesetting commit request.
///
/// The kernel wants all of the properties of one object next to each other,
/// so writes are grouped by object id as they are added. Objects end up in
/// ascending id order and the properties of each object keep the order they
/// were set in.
#[derive(Debug, Default)]
pub struct AtomicRequest {
    objs: BTreeMap<u32, AtomicRequestObj>,
    total_props: usize,
}

#[derive(Debug, Default)]
struct AtomicRequestObj {
    prop_ids: Vec<u32>,
    prop_values: Vec<u64>,
}

impl AtomicRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(
        &mut self,
        obj: impl Into<ObjectId>,
        prop_id: PropertyId,
        value: impl AsRawPropertyValue,
    ) {
        self.push(AtomicProperty::new(obj, prop_id, value));
    }

    pub fn push(&mut self, prop: AtomicProperty) {
        let obj = self.objs.entry(prop.object_id).or_default();
        obj.prop_ids.push(prop.prop_id.0);
        obj.prop_values.push(prop.value);
        self.total_props += 1;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_props == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.total_props
    }

    pub(crate) fn for_ioctl_req(&self) -> AtomicRequestRawParts {
        let obj_count = self.objs.len();
        let mut obj_ids = Vec::<u32>::with_capacity(obj_count);
        let mut obj_prop_counts = Vec::<u32>::with_capacity(obj_count);
        let mut prop_ids = Vec::<u32>::with_capacity(self.total_props);
        let mut prop_values = Vec::<u64>::with_capacity(self.total_props);

        for (obj_id, obj) in self.objs.iter() {
            obj_ids.push(*obj_id);
            obj_prop_counts.push(obj.prop_ids.len() as u32);

            for (prop_id, value) in iter::zip(
                obj.prop_ids.iter().copied(),
                obj.prop_values.iter().copied(),
            ) {
                prop_ids.push(prop_id);
                prop_values.push(value);
            }
        }

        AtomicRequestRawParts {
            obj_ids,
            obj_prop_counts,
            prop_ids,
            prop_values,
        }
    }
}

impl FromIterator<AtomicProperty> for AtomicRequest {
    fn from_iter<I: IntoIterator<Item = AtomicProperty>>(iter: I) -> Self {
        let mut req = Self::new();
        for prop in iter {
            req.push(prop);
        }
        req
    }
}

impl Extend<AtomicProperty> for AtomicRequest {
    fn extend<I: IntoIterator<Item = AtomicProperty>>(&mut self, iter: I) {
        for prop in iter {
            self.push(prop);
        }
    }
}

/// The four parallel arrays of an atomic commit.
#[derive(Debug)]
pub(crate) struct AtomicRequestRawParts {
    pub(crate) obj_ids: Vec<u32>,
    pub(crate) obj_prop_counts: Vec<u32>,
    pub(crate) prop_ids: Vec<u32>,
    pub(crate) prop_values: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicCommitFlags(pub(crate) u32);

impl AtomicCommitFlags {
    pub const NONE: Self = Self(0);
    /// Only check whether the hardware supports the configuration.
    pub const TEST_ONLY: Self = Self(ioctl::DRM_MODE_ATOMIC_TEST_ONLY);
    pub const NONBLOCK: Self = Self(ioctl::DRM_MODE_ATOMIC_NONBLOCK);
    /// Allow changes that need a full mode-set.
    pub const ALLOW_MODESET: Self = Self(ioctl::DRM_MODE_ATOMIC_ALLOW_MODESET);
    pub const PAGE_FLIP_EVENT: Self = Self(ioctl::DRM_MODE_PAGE_FLIP_EVENT);
    pub const ASYNC: Self = Self(ioctl::DRM_MODE_PAGE_FLIP_ASYNC);

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for AtomicCommitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl<D: RawDevice> Card<D> {
    /// Applies (or with [`AtomicCommitFlags::TEST_ONLY`], checks) every
    /// property write of `req` as a single update.
    ///
    /// An empty request succeeds without calling into the kernel.
    /// `user_data` is returned in the page-flip event, if one was requested.
    pub fn atomic_commit(
        &self,
        req: &AtomicRequest,
        flags: AtomicCommitFlags,
        user_data: u64,
    ) -> Result<(), Error> {
        if req.is_empty() {
            return Ok(());
        }

        let raw = req.for_ioctl_req();
        debug!(
            objects = raw.obj_ids.len(),
            props = raw.prop_ids.len(),
            flags = flags.0,
            "atomic commit"
        );
        let mut tmp = ioctl::DrmModeAtomic::zeroed();
        tmp.flags = flags.0;
        tmp.count_objs = raw.obj_ids.len() as u32;
        tmp.objs_ptr = UserPtr::from_slice(&raw.obj_ids);
        tmp.count_props_ptr = UserPtr::from_slice(&raw.obj_prop_counts);
        tmp.props_ptr = UserPtr::from_slice(&raw.prop_ids);
        tmp.prop_values_ptr = UserPtr::from_slice(&raw.prop_values);
        tmp.user_data = user_data;
        self.ioctl(ioctl::DRM_IOCTL_MODE_ATOMIC, &mut tmp)
    }
}
