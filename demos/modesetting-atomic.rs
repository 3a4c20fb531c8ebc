use std::time::Duration;

use linux_kms::modeset::{
    AtomicCommitFlags, AtomicRequest, CardResources, ConnectorState, CrtcId, ModesetConfig,
    ModesetSession, ObjectId, PlaneId, PropertyId,
};
use linux_kms::result::Error;
use linux_kms::{device, Card, ClientCap};

/// Value of a plane's `type` property for primary planes.
const PLANE_TYPE_PRIMARY: u64 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let card = device::open_card(0)?;
    println!("Driver name: {}", card.driver_name()?);
    card.become_master()?;
    if !card.has_dumb_buffer() {
        return Err("device does not support dumb buffers".into());
    }
    card.set_client_cap(ClientCap::UNIVERSAL_PLANES, 1)?;
    card.set_client_cap(ClientCap::ATOMIC, 1)?;

    let res = card.resources()?;
    let Some(conn) = first_connected(&card, &res)? else {
        return Err("no connected outputs".into());
    };

    let mut session = ModesetSession::new(&card, ModesetConfig::default());
    let idx = session.prepare(&res, &conn)?;
    session.map(idx)?;

    let output = &mut session.outputs_mut()[idx];
    let crtc_id = output.crtc_id();
    let mode = output.mode().clone();
    let Some(buf) = output.buffer().cloned() else {
        return Err("output has no buffer".into());
    };
    if let Some(mut canvas) = output.canvas() {
        canvas.fill(0x00203040);
        canvas.fill_rect(buf.width() / 4, buf.height() / 4, buf.width() / 2, buf.height() / 2, 0x00e0a020);
    }

    let saved = card.crtc_state(crtc_id)?;
    let Some(plane_id) = primary_plane_for(&card, &res, crtc_id)? else {
        return Err("no primary plane for CRTC".into());
    };
    let mode_blob = card.create_mode_blob(&mode)?;

    let mut req = AtomicRequest::new();
    req.set_property(conn.id, prop(&card, conn.id, "CRTC_ID")?, crtc_id);
    req.set_property(crtc_id, prop(&card, crtc_id, "MODE_ID")?, mode_blob);
    req.set_property(crtc_id, prop(&card, crtc_id, "ACTIVE")?, true);
    let (w, h) = (buf.width(), buf.height());
    let plane_props: [(&str, u64); 10] = [
        ("FB_ID", buf.framebuffer_id().0 as u64),
        ("CRTC_ID", crtc_id.0 as u64),
        ("CRTC_X", 0),
        ("CRTC_Y", 0),
        ("CRTC_W", w as u64),
        ("CRTC_H", h as u64),
        ("SRC_X", 0),
        ("SRC_Y", 0),
        ("SRC_W", (w as u64) << 16),
        ("SRC_H", (h as u64) << 16),
    ];
    for (name, value) in plane_props {
        req.set_property(plane_id, prop(&card, plane_id, name)?, value);
    }

    card.atomic_commit(
        &req,
        AtomicCommitFlags::TEST_ONLY | AtomicCommitFlags::ALLOW_MODESET,
        0,
    )?;
    card.atomic_commit(&req, AtomicCommitFlags::ALLOW_MODESET, 0)?;
    println!(
        "showing {}x{} on connector {} via CRTC {} and plane {}",
        w, h, conn.id.0, crtc_id.0, plane_id.0
    );
    std::thread::sleep(Duration::from_secs(5));

    for (conn, err) in session.teardown() {
        eprintln!("failed to release connector {}: {err}", conn.0);
    }
    card.restore_crtc(&saved, &[conn.id])?;
    card.destroy_property_blob(mode_blob)?;
    Ok(())
}

fn first_connected(card: &Card, res: &CardResources) -> Result<Option<ConnectorState>, Error> {
    for id in res.connector_ids.iter().copied() {
        let conn = card.connector_state(id)?;
        if conn.is_connected() && !conn.modes.is_empty() {
            return Ok(Some(conn));
        }
        println!("ignoring connector {}", id.0);
    }
    Ok(None)
}

fn primary_plane_for(card: &Card, res: &CardResources, crtc_id: CrtcId) -> Result<Option<PlaneId>, Error> {
    let Some(crtc_idx) = res.crtc_ids.iter().position(|id| *id == crtc_id) else {
        return Ok(None);
    };
    for plane_id in card.plane_resources()? {
        let plane = card.plane_state(plane_id)?;
        if plane.possible_crtcs & (1 << crtc_idx) == 0 {
            continue;
        }
        if let Some((_, typ)) = card.find_property(plane_id, "type")? {
            if typ == PLANE_TYPE_PRIMARY {
                return Ok(Some(plane_id));
            }
        }
    }
    Ok(None)
}

fn prop(
    card: &Card,
    obj: impl Into<ObjectId> + Copy,
    name: &str,
) -> Result<PropertyId, Box<dyn std::error::Error>> {
    match card.find_property(obj, name)? {
        Some((meta, _)) => Ok(meta.id),
        None => Err(format!("object {:?} has no {name} property", obj.into()).into()),
    }
}
