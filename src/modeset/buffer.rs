use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl;
use crate::result::Error;
use crate::util::Cleanup;
use crate::Card;

use super::{BufferObjectId, FramebufferId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBufferRequest {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bpp: u32,
}

/// A dumb buffer registered as a framebuffer.
///
/// This is only a description of kernel objects; dropping it releases
/// nothing. Use [`Card::remove_framebuffer`] and then
/// [`Card::destroy_dumb_buffer`], or let a
/// [`ModesetSession`](super::ModesetSession) do it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumbBuffer {
    pub(crate) handle: BufferObjectId,
    pub(crate) fb_id: FramebufferId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bpp: u32,
    pub(crate) pitch: u32,
    pub(crate) size: u64,
}

impl DumbBuffer {
    pub fn handle(&self) -> BufferObjectId {
        self.handle
    }

    pub fn framebuffer_id(&self) -> FramebufferId {
        self.fb_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, including any padding the driver added.
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn bpp(&self) -> u32 {
        self.bpp
    }

    /// Total size in bytes, which is also the length to map.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn pixel_idx(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.pitch as usize) + (x as usize * (self.bpp / 8) as usize))
    }
}

/// One plane of a framebuffer created with [`Card::add_framebuffer2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferPlane {
    pub handle: BufferObjectId,
    pub pitch: u32,
    pub offset: u32,
    /// Explicit format modifier. Requires
    /// [`DeviceCap::ADDFB2_MODIFIERS`](crate::DeviceCap::ADDFB2_MODIFIERS).
    pub modifier: Option<u64>,
}

impl<D: RawDevice> Card<D> {
    /// Allocates a dumb buffer and registers it as a framebuffer.
    ///
    /// If registering fails the buffer is destroyed again, so on error
    /// nothing is left allocated.
    pub fn create_dumb_buffer(&self, req: &DumbBufferRequest) -> Result<DumbBuffer, Error> {
        let mut create = ioctl::DrmModeCreateDumb {
            height: req.height,
            width: req.width,
            bpp: req.bpp,
            ..ioctl::DrmModeCreateDumb::zeroed()
        };
        self.ioctl(ioctl::DRM_IOCTL_MODE_CREATE_DUMB, &mut create)?;
        let handle = BufferObjectId(create.handle);

        let mut cleanup = Cleanup::new(|| {
            let _ = self.destroy_dumb_buffer(handle);
        });
        let fb_id = self.add_framebuffer(
            req.width,
            req.height,
            create.pitch,
            req.bpp,
            req.depth,
            handle,
        )?;
        cleanup.cancel();

        debug!(
            handle = handle.0,
            fb_id = fb_id.0,
            pitch = create.pitch,
            size = create.size,
            "created dumb buffer"
        );
        Ok(DumbBuffer {
            handle,
            fb_id,
            width: req.width,
            height: req.height,
            bpp: req.bpp,
            pitch: create.pitch,
            size: create.size,
        })
    }

    /// Registers a buffer object as a framebuffer using the legacy
    /// depth/bpp description of its format.
    pub fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        pitch: u32,
        bpp: u32,
        depth: u32,
        handle: BufferObjectId,
    ) -> Result<FramebufferId, Error> {
        let mut tmp = ioctl::DrmModeFbCmd {
            fb_id: 0,
            width,
            height,
            pitch,
            bpp,
            depth,
            handle: handle.0,
        };
        self.ioctl(ioctl::DRM_IOCTL_MODE_ADDFB, &mut tmp)?;
        Ok(FramebufferId(tmp.fb_id))
    }

    /// Registers between one and four buffer planes as a framebuffer of the
    /// given fourcc pixel format.
    pub fn add_framebuffer2(
        &self,
        width: u32,
        height: u32,
        pixel_format: u32,
        planes: &[FramebufferPlane],
    ) -> Result<FramebufferId, Error> {
        if planes.is_empty() || planes.len() > 4 {
            return Err(Error::InvalidPlaneCount(planes.len()));
        }
        let mut tmp = ioctl::DrmModeFbCmd2 {
            width,
            height,
            pixel_format,
            ..ioctl::DrmModeFbCmd2::zeroed()
        };
        for (i, plane) in planes.iter().enumerate() {
            tmp.handles[i] = plane.handle.0;
            tmp.pitches[i] = plane.pitch;
            tmp.offsets[i] = plane.offset;
            if let Some(modifier) = plane.modifier {
                tmp.modifier[i] = modifier;
                tmp.flags |= ioctl::DRM_MODE_FB_MODIFIERS;
            }
        }
        self.ioctl(ioctl::DRM_IOCTL_MODE_ADDFB2, &mut tmp)?;
        Ok(FramebufferId(tmp.fb_id))
    }

    pub fn remove_framebuffer(&self, id: FramebufferId) -> Result<(), Error> {
        let mut raw = id.0;
        self.ioctl(ioctl::DRM_IOCTL_MODE_RMFB, &mut raw)
    }

    /// Asks the kernel for the offset at which the buffer can be mapped
    /// through the device file.
    pub fn map_dumb_buffer_offset(&self, handle: BufferObjectId) -> Result<u64, Error> {
        let mut tmp = ioctl::DrmModeMapDumb {
            handle: handle.0,
            ..ioctl::DrmModeMapDumb::zeroed()
        };
        self.ioctl(ioctl::DRM_IOCTL_MODE_MAP_DUMB, &mut tmp)?;
        Ok(tmp.offset)
    }

    /// Maps the whole buffer read/write. The kernel does not clear dumb
    /// buffers, so the contents start out undefined.
    pub fn map_dumb_buffer(&self, buf: &DumbBuffer) -> Result<D::Mapping, Error> {
        let offset = self.map_dumb_buffer_offset(buf.handle)?;
        let len = usize::try_from(buf.size).map_err(|_| Error::OutOfMemory)?;
        self.dev.map(offset, len)
    }

    pub fn destroy_dumb_buffer(&self, handle: BufferObjectId) -> Result<(), Error> {
        let mut tmp = ioctl::DrmModeDestroyDumb { handle: handle.0 };
        self.ioctl(ioctl::DRM_IOCTL_MODE_DESTROY_DUMB, &mut tmp)
    }
}

/// Pixel writer over a mapped XRGB8888 buffer.
///
/// Pixel (`x`, `y`) lives at byte `pitch * y + 4 * x`, stored little-endian
/// so the bytes in memory are blue, green, red, unused.
#[derive(Debug)]
pub struct Canvas<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    pitch: u32,
}

impl<'a> Canvas<'a> {
    /// Returns `None` if `data` is too small for the given geometry.
    pub fn new(data: &'a mut [u8], width: u32, height: u32, pitch: u32) -> Option<Self> {
        let row = (width as usize).checked_mul(4)?;
        if height > 0 {
            let needed = (pitch as usize)
                .checked_mul(height as usize - 1)?
                .checked_add(row)?;
            if (pitch as usize) < row || data.len() < needed {
                return None;
            }
        }
        Some(Self {
            data,
            width,
            height,
            pitch,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pitch as usize * y as usize + 4 * x as usize)
    }

    /// Writes one pixel given as `0x00RRGGBB`. Out-of-range coordinates are
    /// ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, xrgb: u32) {
        if let Some(off) = self.offset(x, y) {
            self.data[off..off + 4].copy_from_slice(&xrgb.to_le_bytes());
        }
    }

    pub fn fill(&mut self, xrgb: u32) {
        self.fill_rect(0, 0, self.width, self.height, xrgb);
    }

    /// Fills the intersection of the rectangle with the canvas.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, xrgb: u32) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        let px = xrgb.to_le_bytes();
        for row in y..y_end {
            for col in x..x_end {
                let off = self.pitch as usize * row as usize + 4 * col as usize;
                self.data[off..off + 4].copy_from_slice(&px);
            }
        }
    }

    pub fn clear_to_zero(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCard;

    fn card() -> Card<FakeCard> {
        Card::from_device_unchecked(FakeCard::with_outputs(1, 1))
    }

    fn request() -> DumbBufferRequest {
        DumbBufferRequest {
            width: 100,
            height: 10,
            depth: 24,
            bpp: 32,
        }
    }

    #[test]
    fn create_registers_framebuffer() {
        let card = card();
        let buf = card.create_dumb_buffer(&request()).unwrap();
        // The fake driver aligns rows to 64 bytes.
        assert_eq!(buf.pitch(), 448);
        assert_eq!(buf.size(), 4480);
        assert_eq!(card.device().framebuffer_handle(buf.framebuffer_id().0), Some(buf.handle().0));
        assert_eq!(
            card.resources().unwrap().fb_ids,
            vec![buf.framebuffer_id()]
        );
        assert_eq!(buf.pixel_idx(2, 1), Some(456));
        assert_eq!(buf.pixel_idx(100, 0), None);
    }

    #[test]
    fn failed_registration_destroys_buffer() {
        let card = card();
        card.device().fail(0xae, linux_io::result::EINVAL);
        let err = card.create_dumb_buffer(&request()).unwrap_err();
        assert_eq!(err.errno(), Some(linux_io::result::EINVAL));
        assert_eq!(card.device().live_dumb_buffers(), 0);
        assert_eq!(card.device().calls(), vec![0xb2, 0xae, 0xb4]);
    }

    #[test]
    fn map_covers_whole_buffer() {
        let card = card();
        let buf = card.create_dumb_buffer(&request()).unwrap();
        let map = card.map_dumb_buffer(&buf).unwrap();
        assert_eq!(map.len(), 4480);
        assert_eq!(
            card.device().mapped_offsets(),
            vec![card.map_dumb_buffer_offset(buf.handle()).unwrap()]
        );
    }

    #[test]
    fn release_order() {
        let card = card();
        let buf = card.create_dumb_buffer(&request()).unwrap();
        card.remove_framebuffer(buf.framebuffer_id()).unwrap();
        card.destroy_dumb_buffer(buf.handle()).unwrap();
        assert_eq!(card.device().live_dumb_buffers(), 0);
        assert!(card.resources().unwrap().fb_ids.is_empty());

        let err = card.remove_framebuffer(buf.framebuffer_id()).unwrap_err();
        assert_eq!(err.errno(), Some(linux_io::result::ENOENT));
    }

    #[test]
    fn framebuffer2_planes() {
        let card = card();
        let buf = card.create_dumb_buffer(&request()).unwrap();
        let plane = FramebufferPlane {
            handle: buf.handle(),
            pitch: buf.pitch(),
            offset: 0,
            modifier: None,
        };
        let fb = card
            .add_framebuffer2(100, 10, ioctl::DRM_FORMAT_XRGB8888, &[plane])
            .unwrap();
        assert_ne!(fb, buf.framebuffer_id());
        assert_eq!(card.device().framebuffer_handle(fb.0), Some(buf.handle().0));

        assert!(matches!(
            card.add_framebuffer2(100, 10, ioctl::DRM_FORMAT_XRGB8888, &[plane; 5]),
            Err(Error::InvalidPlaneCount(5))
        ));
        assert!(matches!(
            card.add_framebuffer2(100, 10, ioctl::DRM_FORMAT_XRGB8888, &[]),
            Err(Error::InvalidPlaneCount(0))
        ));
    }

    #[test]
    fn canvas_pixel_layout() {
        let mut data = vec![0_u8; 16 * 3];
        let mut canvas = Canvas::new(&mut data, 3, 3, 16).unwrap();
        canvas.put_pixel(2, 1, 0x00112233);
        canvas.put_pixel(3, 1, 0x00ffffff);
        assert_eq!(canvas.offset(2, 1), Some(24));
        assert_eq!(canvas.offset(3, 0), None);
        assert_eq!(&data[24..28], &[0x33, 0x22, 0x11, 0x00]);
        // Padding at the end of each row is left alone.
        assert!(data[12..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn canvas_rejects_short_buffer() {
        let mut data = vec![0_u8; 40];
        assert!(Canvas::new(&mut data, 4, 3, 16).is_none());
        assert!(Canvas::new(&mut data, 5, 1, 16).is_none());
        assert!(Canvas::new(&mut data, 4, 2, 16).is_some());
    }

    #[test]
    fn fill_rect_clips() {
        let mut data = vec![0_u8; 8 * 2];
        let mut canvas = Canvas::new(&mut data, 2, 2, 8).unwrap();
        canvas.fill_rect(1, 1, 10, 10, 0x00abcdef);
        assert_eq!(&data[12..16], &[0xef, 0xcd, 0xab, 0x00]);
        assert!(data[..12].iter().all(|b| *b == 0));
    }
}
