//! The two-phase "probe then fill" protocol.
//!
//! Kernel requests that return variable-length arrays are issued twice. The
//! first call carries zero counts and null addresses, and the kernel answers
//! with how many items of each kind exist. The caller then allocates arrays
//! of those sizes, stores their addresses in the request and issues it again
//! so the kernel can fill them in.
//!
//! The kernel only copies an array out when the supplied count is at least
//! the number of items it has, and always writes back the real count. A
//! count that grew between the two calls is therefore visible after the
//! fill call, and is reported as [`Error::TopologyChanged`].

use tracing::debug;

use crate::device::RawDevice;
use crate::ioctl::{Request, UserPtr};
use crate::result::Error;
use crate::Card;

/// A kernel request struct with one or more variable-length outputs.
pub(crate) trait ProbeFill: Sized {
    /// Buffers the kernel fills in during the second call.
    type Scratch;
    type Output;

    /// Allocates buffers for the counts reported by the probe call and
    /// points the request's address fields at them.
    fn attach(&mut self) -> Result<Self::Scratch, Error>;

    /// Converts the filled request and buffers into the owned result.
    fn decode(self, scratch: Self::Scratch) -> Result<Self::Output, Error>;
}

/// Runs both calls of the protocol for `arg`, which must have all of its
/// counts zeroed and all of its addresses null.
pub(crate) fn probe_then_fill<D, T>(card: &Card<D>, req: Request<T>, mut arg: T) -> Result<T::Output, Error>
where
    D: RawDevice,
    T: ProbeFill,
{
    card.ioctl(req, &mut arg)?;
    let scratch = arg.attach()?;
    debug!(request = %req.code(), "probe complete, filling");
    card.ioctl(req, &mut arg)?;
    arg.decode(scratch)
}

/// A heap array sized for one variable-length output of a request.
///
/// The backing storage never moves while the `Scratch` is alive, so its
/// address can be handed to the kernel and the `Scratch` itself moved
/// around freely in between.
#[derive(Debug)]
pub(crate) struct Scratch<T> {
    buf: Vec<T>,
}

impl<T: Copy + Default> Scratch<T> {
    pub(crate) fn for_count(count: usize) -> Result<Self, Error> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(count)?;
        buf.resize(count, T::default());
        Ok(Self { buf })
    }

    /// The allocated count, in the width the kernel structs use.
    #[inline(always)]
    pub(crate) fn count(&self) -> u32 {
        self.buf.len() as u32
    }

    #[inline(always)]
    pub(crate) fn user_ptr(&mut self) -> UserPtr {
        UserPtr::from_mut_slice(&mut self.buf)
    }

    #[inline(always)]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        if self.buf.is_empty() {
            return core::ptr::null_mut();
        }
        self.buf.as_mut_ptr()
    }

    /// Finishes a fill call whose response reported `reported` items.
    pub(crate) fn finish(mut self, reported: usize) -> Result<Vec<T>, Error> {
        if reported > self.buf.len() {
            return Err(Error::TopologyChanged {
                reported,
                allocated: self.buf.len(),
            });
        }
        self.buf.truncate(reported);
        Ok(self.buf)
    }
}

/// Bytes up to the first NUL, or all of them if there is none.
pub(crate) fn trim_nul(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|b| *b == 0) {
        Some(end) => &raw[..end],
        None => raw,
    }
}
