use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl::{self, UserPtr};
use crate::probe::{probe_then_fill, trim_nul, ProbeFill, Scratch};
use crate::result::Error;
use crate::Card;

use super::{BlobId, CrtcId, FramebufferId, ModeInfo, PropertyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u32)]
pub enum PropertyType {
    Unknown = 0,
    Range = ioctl::DRM_MODE_PROP_RANGE,
    Enum = ioctl::DRM_MODE_PROP_ENUM,
    Blob = ioctl::DRM_MODE_PROP_BLOB,
    Bitmask = ioctl::DRM_MODE_PROP_BITMASK,
    Object = ioctl::DRM_MODE_PROP_OBJECT,
    SignedRange = ioctl::DRM_MODE_PROP_SIGNED_RANGE,
}

impl PropertyType {
    pub fn from_raw_flags(flags: u32) -> (Self, bool) {
        let immutable = (flags & ioctl::DRM_MODE_PROP_IMMUTABLE) != 0;
        let type_raw =
            flags & (ioctl::DRM_MODE_PROP_LEGACY_TYPE | ioctl::DRM_MODE_PROP_EXTENDED_TYPE);
        let typ = match type_raw {
            ioctl::DRM_MODE_PROP_RANGE => Self::Range,
            ioctl::DRM_MODE_PROP_ENUM => Self::Enum,
            ioctl::DRM_MODE_PROP_BLOB => Self::Blob,
            ioctl::DRM_MODE_PROP_BITMASK => Self::Bitmask,
            ioctl::DRM_MODE_PROP_OBJECT => Self::Object,
            ioctl::DRM_MODE_PROP_SIGNED_RANGE => Self::SignedRange,
            _ => Self::Unknown,
        };
        (typ, immutable)
    }
}

/// Description of a property: its name, type and acceptable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMeta {
    pub id: PropertyId,
    pub name: String,
    pub typ: PropertyType,
    pub immutable: bool,
    /// Raw `DRM_MODE_PROP_*` flags.
    pub flags: u32,
    /// For range types, the minimum and maximum. For enums and bitmasks,
    /// the member values. Empty for blobs.
    pub values: Vec<u64>,
    /// Named members of an enum or bitmask property.
    pub enum_members: Vec<EnumMember>,
}

impl PropertyMeta {
    /// Minimum and maximum of a range-typed property.
    pub fn range(&self) -> Option<(u64, u64)> {
        match (self.typ, self.values.as_slice()) {
            (PropertyType::Range | PropertyType::SignedRange, [min, max]) => Some((*min, *max)),
            _ => None,
        }
    }

    /// Value of the enum member called `name`.
    pub fn enum_value(&self, name: &str) -> Option<u64> {
        self.enum_members
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }

    #[inline]
    pub fn is_atomic(&self) -> bool {
        (self.flags & ioctl::DRM_MODE_PROP_ATOMIC) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub value: u64,
    pub name: String,
}

impl From<ioctl::DrmModePropertyEnum> for EnumMember {
    fn from(raw: ioctl::DrmModePropertyEnum) -> Self {
        Self {
            value: raw.value,
            name: String::from_utf8_lossy(trim_nul(&raw.name)).into_owned(),
        }
    }
}

impl ProbeFill for ioctl::DrmModeGetProperty {
    type Scratch = (Scratch<u64>, Scratch<ioctl::DrmModePropertyEnum>);
    type Output = PropertyMeta;

    fn attach(&mut self) -> Result<Self::Scratch, Error> {
        let mut values = Scratch::for_count(self.count_values as usize)?;
        let mut enums = Scratch::for_count(self.count_enum_blobs as usize)?;
        self.values_ptr = values.user_ptr();
        self.enum_blob_ptr = enums.user_ptr();
        Ok((values, enums))
    }

    fn decode(self, (values, enums): Self::Scratch) -> Result<PropertyMeta, Error> {
        let (typ, immutable) = PropertyType::from_raw_flags(self.flags);
        Ok(PropertyMeta {
            id: PropertyId(self.prop_id),
            name: String::from_utf8_lossy(trim_nul(&self.name)).into_owned(),
            typ,
            immutable,
            flags: self.flags,
            values: values.finish(self.count_values as usize)?,
            enum_members: enums
                .finish(self.count_enum_blobs as usize)?
                .into_iter()
                .map(EnumMember::from)
                .collect(),
        })
    }
}

impl ProbeFill for ioctl::DrmModeGetBlob {
    type Scratch = Scratch<u8>;
    type Output = Vec<u8>;

    fn attach(&mut self) -> Result<Scratch<u8>, Error> {
        let mut data = Scratch::for_count(self.length as usize)?;
        self.data = data.user_ptr();
        Ok(data)
    }

    fn decode(self, data: Scratch<u8>) -> Result<Vec<u8>, Error> {
        data.finish(self.length as usize)
    }
}

impl<D: RawDevice> Card<D> {
    pub fn property_meta(&self, id: PropertyId) -> Result<PropertyMeta, Error> {
        let mut tmp = ioctl::DrmModeGetProperty::zeroed();
        tmp.prop_id = id.0;
        probe_then_fill(self, ioctl::DRM_IOCTL_MODE_GETPROPERTY, tmp)
    }

    /// Raw contents of a property blob.
    pub fn property_blob(&self, id: BlobId) -> Result<Vec<u8>, Error> {
        let mut tmp = ioctl::DrmModeGetBlob::zeroed();
        tmp.blob_id = id.0;
        probe_then_fill(self, ioctl::DRM_IOCTL_MODE_GETPROPBLOB, tmp)
    }

    /// Copies `data` into a new blob owned by this open file.
    ///
    /// The kernel frees the blob when the file is closed if
    /// [`Self::destroy_property_blob`] wasn't called first.
    pub fn create_property_blob(&self, data: &[u8]) -> Result<BlobId, Error> {
        let mut tmp = ioctl::DrmModeCreateBlob::zeroed();
        tmp.data = UserPtr::from_slice(data);
        tmp.length = blob_length(data.len())?;
        self.ioctl(ioctl::DRM_IOCTL_MODE_CREATEPROPBLOB, &mut tmp)?;
        debug!(blob_id = tmp.blob_id, len = data.len(), "created property blob");
        Ok(BlobId(tmp.blob_id))
    }

    /// Creates a blob holding `mode` in the kernel's layout, suitable as
    /// the value of a CRTC's `MODE_ID` property.
    pub fn create_mode_blob(&self, mode: &ModeInfo) -> Result<BlobId, Error> {
        let raw = ioctl::DrmModeInfo::from(mode);
        // Safety: DrmModeInfo is a repr(C) struct of integers without
        // padding, so all of its bytes are initialized.
        let bytes = unsafe {
            core::slice::from_raw_parts(
                &raw as *const ioctl::DrmModeInfo as *const u8,
                core::mem::size_of::<ioctl::DrmModeInfo>(),
            )
        };
        self.create_property_blob(bytes)
    }

    pub fn destroy_property_blob(&self, id: BlobId) -> Result<(), Error> {
        let mut tmp = ioctl::DrmModeDestroyBlob { blob_id: id.0 };
        self.ioctl(ioctl::DRM_IOCTL_MODE_DESTROYPROPBLOB, &mut tmp)
    }

    /// Looks up a property of `obj` by name, returning its id and current
    /// value.
    pub fn find_property(
        &self,
        obj: impl Into<super::ObjectId>,
        name: &str,
    ) -> Result<Option<(PropertyMeta, u64)>, Error> {
        for prop in self.object_properties(obj)? {
            let meta = self.property_meta(prop.prop_id)?;
            if meta.name == name {
                return Ok(Some((meta, prop.value)));
            }
        }
        Ok(None)
    }
}

/// Trait implemented by types that can be used directly as raw property
/// values.
///
/// For types that refer to other objects known by the kernel, such as
/// property blobs, the object must stay alive for as long as the value is
/// used in requests.
pub trait AsRawPropertyValue {
    fn as_raw_property_value(&self) -> u64;
}

macro_rules! trivial_as_property_value {
    ($t:ty) => {
        impl AsRawPropertyValue for $t {
            #[inline(always)]
            fn as_raw_property_value(&self) -> u64 {
                *self as u64
            }
        }
    };
}

trivial_as_property_value!(u64);
trivial_as_property_value!(u32);
trivial_as_property_value!(u16);
trivial_as_property_value!(u8);
trivial_as_property_value!(usize);
trivial_as_property_value!(i64);
trivial_as_property_value!(i32);
trivial_as_property_value!(i16);
trivial_as_property_value!(i8);
trivial_as_property_value!(isize);
trivial_as_property_value!(bool);

macro_rules! id_as_property_value {
    ($t:ty) => {
        impl AsRawPropertyValue for $t {
            #[inline(always)]
            fn as_raw_property_value(&self) -> u64 {
                self.0 as u64
            }
        }
    };
}

id_as_property_value!(BlobId);
id_as_property_value!(CrtcId);
id_as_property_value!(FramebufferId);

/// The kernel describes blob sizes with 32 bits.
fn blob_length(len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| Error::BlobTooLarge(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCard;

    fn card() -> Card<FakeCard> {
        Card::from_device_unchecked(FakeCard::with_outputs(1, 1))
    }

    #[test]
    fn enum_property() {
        let card = card();
        let meta = card.property_meta(PropertyId(100)).unwrap();
        assert_eq!(meta.name, "DPMS");
        assert_eq!(meta.typ, PropertyType::Enum);
        assert!(!meta.immutable);
        assert_eq!(meta.values, vec![0, 1, 2, 3]);
        assert_eq!(meta.enum_members.len(), 4);
        assert_eq!(meta.enum_value("Off"), Some(3));
        assert_eq!(meta.range(), None);
    }

    #[test]
    fn range_property() {
        let card = card();
        let meta = card.property_meta(PropertyId(101)).unwrap();
        assert_eq!(meta.typ, PropertyType::Range);
        assert!(meta.immutable);
        assert_eq!(meta.range(), Some((0, 8192)));
        assert!(meta.enum_members.is_empty());
    }

    #[test]
    fn unknown_property() {
        let card = card();
        let err = card.property_meta(PropertyId(999)).unwrap_err();
        assert_eq!(err.errno(), Some(linux_io::result::ENOENT));
    }

    #[test]
    fn blob_lifecycle() {
        let card = card();
        let id = card.create_property_blob(b"edid bytes").unwrap();
        assert_eq!(card.property_blob(id).unwrap(), b"edid bytes");
        card.destroy_property_blob(id).unwrap();
        assert!(card.property_blob(id).is_err());
    }

    #[test]
    fn empty_blob_is_rejected() {
        let card = card();
        let err = card.create_property_blob(&[]).unwrap_err();
        assert_eq!(err.errno(), Some(linux_io::result::EINVAL));
    }

    #[test]
    fn oversized_blob_length() {
        assert_eq!(blob_length(16).unwrap(), 16);
        assert_eq!(blob_length(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            blob_length(u32::MAX as usize + 1),
            Err(Error::BlobTooLarge(len)) if len == u32::MAX as usize + 1
        ));
    }

    #[test]
    fn mode_blob_has_kernel_layout() {
        let card = card();
        let conn = card.connector_state(super::super::ConnectorId(10)).unwrap();
        let mode = &conn.modes[0];
        let id = card.create_mode_blob(mode).unwrap();

        let bytes = card.property_blob(id).unwrap();
        assert_eq!(bytes.len(), 68);
        assert_eq!(&bytes[4..6], &mode.hdisplay.to_ne_bytes());
        assert_eq!(&bytes[36..44], b"1024x768");
    }

    #[test]
    fn find_property_by_name() {
        let card = card();
        let (meta, value) = card
            .find_property(super::super::ConnectorId(10), "DPMS")
            .unwrap()
            .unwrap();
        assert_eq!(meta.id, PropertyId(100));
        assert_eq!(value, 2);
        assert!(card
            .find_property(super::super::ConnectorId(10), "CRTC_ID")
            .unwrap()
            .is_none());
    }
}
