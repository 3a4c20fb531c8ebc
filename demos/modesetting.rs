use std::path::PathBuf;
use std::time::Duration;

use linux_kms::modeset::{ModesetConfig, ModesetSession};
use linux_kms::{device, Card};

const COLORS: [u32; 4] = [0x00ff0000, 0x0000ff00, 0x000000ff, 0x00ffff00];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| device::NodeKind::Primary.path(0));
    let card = Card::open(&path)?;
    println!("Driver name: {}", card.driver_name()?);

    if let Err(err) = card.become_master() {
        // Still works when nothing else is holding the device, e.g. from a
        // text console.
        tracing::warn!(error = %err, "cannot become DRM master");
    }
    if !card.has_dumb_buffer() {
        return Err("device does not support dumb buffers".into());
    }

    let mut session = ModesetSession::new(&card, ModesetConfig::default());
    let count = session.setup_all()?;
    if count == 0 {
        return Err("no connected outputs".into());
    }

    for (i, output) in session.outputs_mut().iter_mut().enumerate() {
        let mode = output.mode().clone();
        println!(
            "connector {} on CRTC {}: {} ({}x{}@{}Hz)",
            output.connector_id().0,
            output.crtc_id().0,
            mode.name_lossy(),
            mode.hdisplay,
            mode.vdisplay,
            mode.vrefresh,
        );
        let Some(mut canvas) = output.canvas() else {
            continue;
        };
        canvas.fill(COLORS[i % COLORS.len()]);
        // A white stripe every 64 rows, so tearing is easy to spot.
        let (w, h) = (canvas.width(), canvas.height());
        for y in (0..h).step_by(64) {
            canvas.fill_rect(0, y, w, 8, 0x00ffffff);
        }
    }

    session.bind_all()?;
    std::thread::sleep(Duration::from_secs(5));

    for (conn, err) in session.teardown() {
        eprintln!("failed to restore connector {}: {err}", conn.0);
    }
    Ok(())
}
