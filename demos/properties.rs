use std::collections::HashMap;

use linux_kms::modeset::{ModeProp, ObjectId, PropertyId, PropertyMeta, PropertyType};
use linux_kms::result::Error;
use linux_kms::{device, Card, ClientCap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let devices = device::list_devices()?;
    if devices.is_empty() {
        return Err("no DRM devices found".into());
    }
    for dev in &devices {
        println!(
            "{}: {} {}.{}.{} ({})",
            dev.path.display(),
            dev.version.name,
            dev.version.major,
            dev.version.minor,
            dev.version.patchlevel,
            dev.version.desc,
        );
    }

    let card = Card::open(&devices[0].path)?;
    card.set_client_cap(ClientCap::UNIVERSAL_PLANES, 1)?;
    show_properties(&card)?;
    Ok(())
}

fn show_properties(card: &Card) -> Result<(), Error> {
    let res = card.resources()?;
    let mut cache = HashMap::<PropertyId, PropertyMeta>::new();

    for conn_id in res.connector_ids.iter().copied() {
        let conn = card.connector_state(conn_id)?;
        println!(
            "\nConnector #{} ({:?}-{}, {:?}):",
            conn_id.0, conn.connector_type, conn.connector_type_id, conn.connection_state
        );
        for mode in &conn.modes {
            println!("  mode {} @ {}Hz", mode.name_lossy(), mode.vrefresh);
        }
        show_property_list(card, &conn.props, &mut cache)?;
    }

    for crtc_id in res.crtc_ids.iter().copied() {
        let crtc = card.crtc_state(crtc_id)?;
        println!(
            "\nCRTC #{} (fb {}, {}x{}):",
            crtc_id.0, crtc.fb_id.0, crtc.width, crtc.height
        );
        let props = card.object_properties(ObjectId::Crtc(crtc_id))?;
        show_property_list(card, &props, &mut cache)?;
    }

    for plane_id in card.plane_resources()? {
        let plane = card.plane_state(plane_id)?;
        println!(
            "\nPlane #{} (CRTC {}, {} formats):",
            plane_id.0,
            plane.crtc_id.0,
            plane.formats.len()
        );
        let props = card.object_properties(plane_id)?;
        show_property_list(card, &props, &mut cache)?;
    }

    Ok(())
}

fn show_property_list(
    card: &Card,
    props: &[ModeProp],
    cache: &mut HashMap<PropertyId, PropertyMeta>,
) -> Result<(), Error> {
    for prop in props {
        if !cache.contains_key(&prop.prop_id) {
            let meta = card.property_meta(prop.prop_id)?;
            cache.insert(prop.prop_id, meta);
        }
        let meta = &cache[&prop.prop_id];
        let ro = if meta.immutable { " (immutable)" } else { "" };
        print!("  {}{ro}: ", meta.name);
        match meta.typ {
            PropertyType::Enum => match meta.enum_members.iter().find(|m| m.value == prop.value) {
                Some(member) => println!("{}", member.name),
                None => println!("out-of-range value {}", prop.value),
            },
            PropertyType::Bitmask => {
                let names: Vec<&str> = meta
                    .enum_members
                    .iter()
                    .filter(|m| m.value < 64 && prop.value & (1 << m.value) != 0)
                    .map(|m| m.name.as_str())
                    .collect();
                println!("{} ({:#x})", names.join(" | "), prop.value);
            }
            PropertyType::Blob if prop.value != 0 => {
                let len = card
                    .property_blob(linux_kms::modeset::BlobId(prop.value as u32))
                    .map(|data| data.len())
                    .unwrap_or(0);
                println!("blob #{} ({len} bytes)", prop.value);
            }
            PropertyType::Range => match meta.range() {
                Some((min, max)) => println!("{} [{min}..={max}]", prop.value),
                None => println!("{}", prop.value),
            },
            PropertyType::SignedRange => println!("{}", prop.value as i64),
            _ => println!("{}", prop.value),
        }
    }
    Ok(())
}
