use std::time::Duration;

use linux_kms::modeset::{
    Canvas, DumbBuffer, DumbBufferRequest, ModesetConfig, ModesetSession,
};
use linux_kms::{device, Card, CardFile};

const FRAMES: u32 = 50;

/// A second buffer per output, drawn into while the session's buffer is on
/// screen and the other way around.
struct BackBuffer {
    buf: DumbBuffer,
    map: memmap2::MmapMut,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let card = device::open_card(0)?;
    if let Err(err) = card.become_master() {
        tracing::warn!(error = %err, "cannot become DRM master");
    }
    if !card.has_dumb_buffer() {
        return Err("device does not support dumb buffers".into());
    }

    let mut session = ModesetSession::new(&card, ModesetConfig::default());
    if session.setup_all()? == 0 {
        return Err("no connected outputs".into());
    }
    session.bind_all()?;

    let mut backs = Vec::with_capacity(session.outputs().len());
    for output in session.outputs() {
        let (width, height) = output.mode().size();
        let buf = card.create_dumb_buffer(&DumbBufferRequest {
            width,
            height,
            depth: 24,
            bpp: 32,
        })?;
        let map = match card.map_dumb_buffer(&buf) {
            Ok(map) => map,
            Err(err) => {
                release(&card, &buf);
                return Err(err.into());
            }
        };
        backs.push(BackBuffer { buf, map });
    }

    let result = animate(&card, &mut session, &mut backs);

    for back in backs {
        let BackBuffer { buf, map } = back;
        drop(map);
        release(&card, &buf);
    }
    for (conn, err) in session.teardown() {
        eprintln!("failed to restore connector {}: {err}", conn.0);
    }
    result
}

/// Alternates between the two buffers of each output, always drawing into
/// the one that isn't being scanned out. Ends on the session's buffer.
fn animate(
    card: &Card,
    session: &mut ModesetSession<'_, CardFile>,
    backs: &mut [BackBuffer],
) -> Result<(), Box<dyn std::error::Error>> {
    for frame in 0..FRAMES * 2 {
        let color = frame_color(frame);
        let show_back = frame % 2 == 0;
        for (output, back) in session.outputs_mut().iter_mut().zip(backs.iter_mut()) {
            let fb_id = if show_back {
                let (w, h, pitch) = (back.buf.width(), back.buf.height(), back.buf.pitch());
                if let Some(mut canvas) = Canvas::new(&mut back.map, w, h, pitch) {
                    canvas.fill(color);
                }
                back.buf.framebuffer_id()
            } else {
                if let Some(mut canvas) = output.canvas() {
                    canvas.fill(color);
                }
                match output.buffer() {
                    Some(buf) => buf.framebuffer_id(),
                    None => continue,
                }
            };
            let mode = output.mode().clone();
            card.set_crtc(
                output.crtc_id(),
                fb_id,
                0,
                0,
                &[output.connector_id()],
                Some(&mode),
            )?;
        }
        std::thread::sleep(Duration::from_millis(75));
    }
    Ok(())
}

fn frame_color(frame: u32) -> u32 {
    let r = (frame * 5) % 256;
    let g = (frame * 3 + 85) % 256;
    let b = (255 + 256 - (frame * 7) % 256) % 256;
    (r << 16) | (g << 8) | b
}

fn release(card: &Card, buf: &DumbBuffer) {
    if let Err(err) = card.remove_framebuffer(buf.framebuffer_id()) {
        eprintln!("failed to remove framebuffer {}: {err}", buf.framebuffer_id().0);
    }
    if let Err(err) = card.destroy_dumb_buffer(buf.handle()) {
        eprintln!("failed to destroy dumb buffer {}: {err}", buf.handle().0);
    }
}
