//! Lighting up connected outputs with dumb buffers through the legacy
//! `SetCrtc` path, and putting everything back afterwards.
//!
//! Each output moves through [`Stage::Unconfigured`], [`Stage::Allocated`],
//! [`Stage::Mapped`] and [`Stage::Bound`], and ends in [`Stage::Restored`]
//! once [`ModesetSession::teardown`] has released it.

use std::ops::DerefMut;

use tracing::{debug, info, warn};

use crate::device::RawDevice;
use crate::result::Error;
use crate::Card;

use super::{
    Canvas, CardResources, ConnectorId, ConnectorState, CrtcId, CrtcState, DumbBuffer,
    DumbBufferRequest, EncoderState, FramebufferId, ModeInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModesetConfig {
    /// Color depth passed when registering framebuffers.
    pub depth: u32,
    pub bpp: u32,
    /// Use the connector's preferred mode instead of the first one listed.
    pub prefer_preferred_mode: bool,
}

impl Default for ModesetConfig {
    fn default() -> Self {
        Self {
            depth: 24,
            bpp: 32,
            prefer_preferred_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unconfigured,
    Allocated,
    Mapped,
    Bound,
    Restored,
}

/// One connector being driven by this session.
#[derive(Debug)]
pub struct Output<M> {
    connector_id: ConnectorId,
    crtc_id: CrtcId,
    mode: ModeInfo,
    buffer: Option<DumbBuffer>,
    framebuffer: Option<FramebufferId>,
    mapping: Option<M>,
    saved_crtc: Option<CrtcState>,
    stage: Stage,
}

impl<M: DerefMut<Target = [u8]>> Output<M> {
    pub fn connector_id(&self) -> ConnectorId {
        self.connector_id
    }

    pub fn crtc_id(&self) -> CrtcId {
        self.crtc_id
    }

    pub fn mode(&self) -> &ModeInfo {
        &self.mode
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn buffer(&self) -> Option<&DumbBuffer> {
        self.buffer.as_ref()
    }

    /// State of the CRTC before this session first changed it.
    pub fn saved_crtc(&self) -> Option<&CrtcState> {
        self.saved_crtc.as_ref()
    }

    pub fn mapping(&self) -> Option<&[u8]> {
        self.mapping.as_deref()
    }

    /// A pixel writer over the mapped buffer, if the output is mapped and
    /// uses 32 bits per pixel.
    pub fn canvas(&mut self) -> Option<Canvas<'_>> {
        let buf = self.buffer.as_ref()?;
        if buf.bpp != 32 {
            return None;
        }
        let (width, height, pitch) = (buf.width, buf.height, buf.pitch);
        let map = self.mapping.as_mut()?;
        Canvas::new(map.deref_mut(), width, height, pitch)
    }
}

/// Picks a CRTC for a connector.
///
/// The CRTC currently driving the connector's encoder wins if nobody has
/// claimed it. Otherwise each candidate encoder is tried in turn against
/// every CRTC in `crtc_ids` order, and the first CRTC whose bit is set in
/// the encoder's `possible_crtcs` and which isn't claimed is chosen.
pub fn select_crtc(
    current: Option<&EncoderState>,
    candidates: &[EncoderState],
    crtc_ids: &[CrtcId],
    claimed: &[CrtcId],
) -> Option<CrtcId> {
    if let Some(enc) = current {
        let crtc = enc.current_crtc_id;
        if crtc.0 != 0 && !claimed.contains(&crtc) {
            return Some(crtc);
        }
    }
    for enc in candidates {
        for (j, crtc) in crtc_ids.iter().enumerate() {
            if enc.can_use_crtc_index(j) && !claimed.contains(crtc) {
                return Some(*crtc);
            }
        }
    }
    None
}

/// Bookkeeping for one mode-setting pass over a card.
///
/// Dropping the session tears down every output that hasn't been torn
/// down yet.
pub struct ModesetSession<'card, D: RawDevice> {
    card: &'card Card<D>,
    config: ModesetConfig,
    claimed: Vec<CrtcId>,
    outputs: Vec<Output<D::Mapping>>,
}

impl<'card, D: RawDevice> ModesetSession<'card, D> {
    pub fn new(card: &'card Card<D>, config: ModesetConfig) -> Self {
        Self {
            card,
            config,
            claimed: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn config(&self) -> &ModesetConfig {
        &self.config
    }

    pub fn outputs(&self) -> &[Output<D::Mapping>] {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut [Output<D::Mapping>] {
        &mut self.outputs
    }

    pub fn claimed_crtcs(&self) -> &[CrtcId] {
        &self.claimed
    }

    /// Chooses a CRTC for `conn` that no other output of this session uses.
    pub fn find_crtc(&self, res: &CardResources, conn: &ConnectorState) -> Result<CrtcId, Error> {
        let current = match conn.current_encoder_id.0 {
            0 => None,
            _ => Some(self.card.encoder_state(conn.current_encoder_id)?),
        };
        let candidates = conn
            .available_encoder_ids
            .iter()
            .map(|&id| self.card.encoder_state(id))
            .collect::<Result<Vec<_>, _>>()?;

        select_crtc(current.as_ref(), &candidates, &res.crtc_ids, &self.claimed)
            .ok_or(Error::NoSuitableCrtc(conn.id))
    }

    fn choose_mode<'a>(&self, conn: &'a ConnectorState) -> Option<&'a ModeInfo> {
        if self.config.prefer_preferred_mode {
            if let Some(mode) = conn.preferred_mode() {
                return Some(mode);
            }
        }
        conn.modes.first()
    }

    /// Picks a mode and a CRTC for a connected connector and claims the
    /// CRTC. Returns the index of the new output.
    pub fn prepare(&mut self, res: &CardResources, conn: &ConnectorState) -> Result<usize, Error> {
        let mode = self
            .choose_mode(conn)
            .ok_or(Error::NoValidMode(conn.id))?
            .clone();
        let crtc_id = self.find_crtc(res, conn)?;
        info!(
            connector_id = conn.id.0,
            crtc_id = crtc_id.0,
            mode = %mode.name_lossy(),
            width = mode.hdisplay,
            height = mode.vdisplay,
            "prepared output"
        );
        self.claimed.push(crtc_id);
        self.outputs.push(Output {
            connector_id: conn.id,
            crtc_id,
            mode,
            buffer: None,
            framebuffer: None,
            mapping: None,
            saved_crtc: None,
            stage: Stage::Unconfigured,
        });
        Ok(self.outputs.len() - 1)
    }

    /// Creates a dumb buffer the size of the output's mode.
    pub fn allocate(&mut self, idx: usize) -> Result<(), Error> {
        let card = self.card;
        let config = self.config;
        let out = self.outputs.get_mut(idx).ok_or(Error::NoSuchOutput(idx))?;
        if out.stage >= Stage::Allocated {
            return Ok(());
        }
        let (width, height) = out.mode.size();
        let buf = card.create_dumb_buffer(&DumbBufferRequest {
            width,
            height,
            depth: config.depth,
            bpp: config.bpp,
        })?;
        out.framebuffer = Some(buf.framebuffer_id());
        out.buffer = Some(buf);
        out.stage = Stage::Allocated;
        Ok(())
    }

    /// Maps the output's buffer and clears it to zero.
    pub fn map(&mut self, idx: usize) -> Result<(), Error> {
        self.allocate(idx)?;
        let card = self.card;
        let out = self.outputs.get_mut(idx).ok_or(Error::NoSuchOutput(idx))?;
        if out.stage >= Stage::Mapped {
            return Ok(());
        }
        let Some(buf) = out.buffer.as_ref() else {
            return Ok(());
        };
        let mut mapping = card.map_dumb_buffer(buf)?;
        mapping.fill(0);
        out.mapping = Some(mapping);
        out.stage = Stage::Mapped;
        Ok(())
    }

    /// Shows the output's buffer, first saving the CRTC's current state if
    /// this session hasn't done so yet.
    pub fn bind(&mut self, idx: usize) -> Result<(), Error> {
        self.map(idx)?;
        let card = self.card;
        let out = self.outputs.get_mut(idx).ok_or(Error::NoSuchOutput(idx))?;
        if out.stage >= Stage::Restored {
            return Ok(());
        }
        let Some(fb_id) = out.framebuffer else {
            return Ok(());
        };
        if out.saved_crtc.is_none() {
            out.saved_crtc = Some(card.crtc_state(out.crtc_id)?);
        }
        card.set_crtc(
            out.crtc_id,
            fb_id,
            0,
            0,
            &[out.connector_id],
            Some(&out.mode),
        )?;
        out.stage = Stage::Bound;
        Ok(())
    }

    /// Prepares, allocates and maps an output for every connected connector.
    ///
    /// Disconnected connectors are skipped. Any other failure is returned;
    /// the connector being set up is released first, and outputs finished
    /// before it stay in the session. Returns the number of outputs ready
    /// to bind.
    pub fn setup_all(&mut self) -> Result<usize, Error> {
        let res = self.card.resources()?;
        for &conn_id in &res.connector_ids {
            let conn = self.card.connector_state(conn_id)?;
            if !conn.is_connected() {
                debug!(connector_id = conn_id.0, "ignoring unused connector");
                continue;
            }
            let idx = self.prepare(&res, &conn)?;
            if let Err(err) = self.map(idx) {
                self.abandon(idx);
                return Err(err);
            }
        }
        Ok(self.outputs.len())
    }

    /// Binds every output, stopping at the first failure.
    pub fn bind_all(&mut self) -> Result<(), Error> {
        for idx in 0..self.outputs.len() {
            self.bind(idx)?;
        }
        Ok(())
    }

    /// Releases an output that never got far enough to be useful.
    fn abandon(&mut self, idx: usize) {
        let mut out = self.outputs.remove(idx);
        if let Err(err) = release(self.card, &mut out) {
            warn!(connector_id = out.connector_id.0, error = %err, "cannot release abandoned output");
        }
        self.claimed.retain(|c| *c != out.crtc_id);
    }

    /// Releases every output: unmaps its buffer, removes the framebuffer,
    /// destroys the dumb buffer and restores the saved CRTC state, in that
    /// order.
    ///
    /// A failing step stops work on that output only. Its remaining steps
    /// are retried by the next call, and steps that already succeeded are
    /// not repeated. Returns the failures.
    pub fn teardown(&mut self) -> Vec<(ConnectorId, Error)> {
        let mut failures = Vec::new();
        let Self {
            card,
            claimed,
            outputs,
            ..
        } = self;
        for out in outputs.iter_mut() {
            if out.stage == Stage::Restored {
                continue;
            }
            match release(*card, out) {
                Ok(()) => {
                    claimed.retain(|c| *c != out.crtc_id);
                    debug!(connector_id = out.connector_id.0, "output restored");
                }
                Err(err) => {
                    warn!(
                        connector_id = out.connector_id.0,
                        error = %err,
                        "teardown step failed, continuing with next output"
                    );
                    failures.push((out.connector_id, err));
                }
            }
        }
        failures
    }
}

impl<D: RawDevice> Drop for ModesetSession<'_, D> {
    fn drop(&mut self) {
        if self.outputs.iter().any(|out| out.stage != Stage::Restored) {
            let _ = self.teardown();
        }
    }
}

fn release<D: RawDevice>(card: &Card<D>, out: &mut Output<D::Mapping>) -> Result<(), Error> {
    // Unmapping can't fail and is never repeated: the mapping is gone
    // after the first attempt regardless of what follows.
    drop(out.mapping.take());
    if let Some(fb_id) = out.framebuffer {
        card.remove_framebuffer(fb_id)?;
        out.framebuffer = None;
    }
    if let Some(handle) = out.buffer.as_ref().map(|b| b.handle()) {
        card.destroy_dumb_buffer(handle)?;
        out.buffer = None;
    }
    if let Some(saved) = out.saved_crtc.as_ref() {
        card.restore_crtc(saved, &[out.connector_id])?;
        out.saved_crtc = None;
    }
    out.stage = Stage::Restored;
    Ok(())
}
