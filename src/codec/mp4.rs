//! Atom codec for QuickTime/MP4.
//!
//! Capture metadata goes into the classic user-data atoms:
//! `moov/udta/©day` (ISO 8601 text) and `moov/udta/©xyz` (ISO 6709
//! coordinate string), the form QuickTime players and Apple devices read.
//! The `mvhd` creation_time is patched in place as well (same size, 1904
//! epoch). Growing `moov` shifts every box after it, so all `stco`/`co64`
//! chunk-offset entries are re-based through the top-level shift table —
//! one stale entry silently breaks playback.

use chrono::{DateTime, Utc};

use super::bmff::{self, BoxNode, FourCC, NodeKind};
use crate::error::{RestoreError, Result};
use crate::sidecar::{GpsPosition, MetadataRecord};

const ATOM_DAY: FourCC = *b"\xa9day";
const ATOM_XYZ: FourCC = *b"\xa9xyz";

/// Seconds between the QuickTime epoch (1904-01-01) and the unix epoch.
const QT_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Packed ISO-639 language code (`eng`) used in user-data text atoms.
const LANG_ENG: u16 = 0x15C7;

/// Top-level atoms that mark a recognizable QuickTime/MP4 stream.
const KNOWN_LEADING: &[&FourCC] = &[b"ftyp", b"moov", b"free", b"wide", b"mdat", b"skip"];

/// Produce the full replacement byte stream for an MP4/MOV file with the
/// record's timestamp/GPS written into its user-data atoms.
pub fn embed(bytes: &[u8], record: &MetadataRecord) -> Result<Vec<u8>> {
    let mut boxes = bmff::parse_boxes(bytes)?;

    match boxes.first() {
        Some(first) if KNOWN_LEADING.iter().any(|t| **t == first.typ) => {}
        Some(first) => {
            return Err(RestoreError::UnsupportedEncoding(format!(
                "leading atom `{}` is not a QuickTime/MP4 stream",
                bmff::fourcc_display(&first.typ)
            )));
        }
        None => return Err(RestoreError::MalformedContainer("empty stream".into())),
    }

    let moov = boxes
        .iter_mut()
        .find(|b| &b.typ == b"moov")
        .ok_or_else(|| RestoreError::MalformedContainer("no moov atom".into()))?;

    if let Some(taken_at) = &record.taken_at {
        if let Some(mvhd) = moov.child_mut(b"mvhd") {
            patch_mvhd_creation_time(mvhd, taken_at)?;
        }
        upsert_user_data(moov, ATOM_DAY, &format_qt_date(taken_at));
    }
    if let Some(gps) = &record.gps {
        upsert_user_data(moov, ATOM_XYZ, &format_iso6709(gps));
    }

    // moov may have grown ahead of mdat; re-base every chunk offset.
    let shifts = bmff::top_level_shifts(&boxes);
    if let Some(moov) = boxes.iter_mut().find(|b| &b.typ == b"moov") {
        rebase_chunk_offsets(moov, &shifts)?;
    }

    Ok(bmff::serialize_boxes(&boxes))
}

fn format_qt_date(taken_at: &DateTime<Utc>) -> String {
    taken_at.format("%Y-%m-%dT%H:%M:%S+0000").to_string()
}

/// ISO 6709 point form: `+DD.DDDD+DDD.DDDD+AAA.AAA/`.
fn format_iso6709(gps: &GpsPosition) -> String {
    format!(
        "{:+08.4}{:+09.4}{:+.3}/",
        gps.latitude, gps.longitude, gps.altitude_meters
    )
}

/// User-data text atoms carry `[u16 length][u16 language][text]`.
fn text_atom_payload(text: &str) -> Vec<u8> {
    let mut payload = (text.len() as u16).to_be_bytes().to_vec();
    payload.extend_from_slice(&LANG_ENG.to_be_bytes());
    payload.extend_from_slice(text.as_bytes());
    payload
}

fn upsert_user_data(moov: &mut BoxNode, typ: FourCC, text: &str) {
    let payload = text_atom_payload(text);

    if moov.child(b"udta").is_none() {
        if let Some(children) = moov.children_mut() {
            insert_before_trailer(children, BoxNode::container(*b"udta", Vec::new()));
        }
    }
    let Some(udta) = moov.child_mut(b"udta") else { return };

    match udta.child_mut(&typ) {
        Some(existing) => existing.kind = NodeKind::Leaf { payload },
        None => {
            if let Some(children) = udta.children_mut() {
                insert_before_trailer(children, BoxNode::leaf(typ, payload));
            }
        }
    }
}

/// Insert keeping any raw zero-terminator trailer last.
fn insert_before_trailer(children: &mut Vec<BoxNode>, node: BoxNode) {
    let at = children
        .iter()
        .position(|c| matches!(c.kind, NodeKind::Raw { .. }))
        .unwrap_or(children.len());
    children.insert(at, node);
}

/// Set `mvhd` creation_time in place (version 0: 32-bit, version 1:
/// 64-bit; both in seconds since 1904).
fn patch_mvhd_creation_time(mvhd: &mut BoxNode, taken_at: &DateTime<Utc>) -> Result<()> {
    let NodeKind::Leaf { payload } = &mut mvhd.kind else {
        return Err(RestoreError::MalformedContainer("mvhd is not a leaf".into()));
    };
    let qt_time = (taken_at.timestamp() + QT_EPOCH_OFFSET).max(0);

    match payload.first() {
        Some(0) if payload.len() >= 8 => {
            payload[4..8].copy_from_slice(&(qt_time.min(u32::MAX as i64) as u32).to_be_bytes());
        }
        Some(1) if payload.len() >= 12 => {
            payload[4..12].copy_from_slice(&(qt_time as u64).to_be_bytes());
        }
        _ => {
            return Err(RestoreError::MalformedContainer(
                "mvhd too short for its version".into(),
            ));
        }
    }
    Ok(())
}

/// Walk a container for `stco`/`co64` leaves and map every entry through
/// the shift table.
fn rebase_chunk_offsets(node: &mut BoxNode, shifts: &[(Option<(u64, u64)>, u64)]) -> Result<()> {
    match &mut node.kind {
        NodeKind::Container { children, .. } => {
            for child in children {
                rebase_chunk_offsets(child, shifts)?;
            }
            Ok(())
        }
        NodeKind::Leaf { payload } => {
            match &node.typ {
                b"stco" => rebase_table::<4>(payload, shifts),
                b"co64" => rebase_table::<8>(payload, shifts),
                _ => Ok(()),
            }
        }
        NodeKind::Raw { .. } => Ok(()),
    }
}

fn rebase_table<const W: usize>(
    payload: &mut [u8],
    shifts: &[(Option<(u64, u64)>, u64)],
) -> Result<()> {
    if payload.len() < 8 {
        return Err(RestoreError::MalformedContainer("chunk offset table too short".into()));
    }
    let count = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
    let table = payload
        .get_mut(8..8 + count * W)
        .ok_or_else(|| RestoreError::MalformedContainer("chunk offset table truncated".into()))?;

    for entry in table.chunks_exact_mut(W) {
        let old = match W {
            4 => u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as u64,
            _ => u64::from_be_bytes([
                entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6], entry[7],
            ]),
        };
        let new = bmff::rebase_offset(shifts, old);
        match W {
            4 => entry.copy_from_slice(&(new as u32).to_be_bytes()),
            _ => entry.copy_from_slice(&new.to_be_bytes()),
        }
    }
    Ok(())
}

// ── read-back helpers (round-trip verification) ──────────────────────

/// Read the text of a `moov/udta` atom, if present.
pub fn user_data_text(bytes: &[u8], typ: &FourCC) -> Result<Option<String>> {
    let boxes = bmff::parse_boxes(bytes)?;
    let Some(atom) = boxes
        .iter()
        .find(|b| &b.typ == b"moov")
        .and_then(|m| m.child(b"udta"))
        .and_then(|u| u.child(typ))
    else {
        return Ok(None);
    };
    let Some(payload) = atom.payload() else { return Ok(None) };
    if payload.len() < 4 {
        return Ok(None);
    }
    let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let text = payload
        .get(4..4 + len)
        .ok_or_else(|| RestoreError::MalformedContainer("text atom truncated".into()))?;
    Ok(Some(String::from_utf8_lossy(text).to_string()))
}

/// Read `mvhd` creation_time as unix seconds.
pub fn movie_creation_time(bytes: &[u8]) -> Result<Option<i64>> {
    let boxes = bmff::parse_boxes(bytes)?;
    let Some(mvhd) = boxes
        .iter()
        .find(|b| &b.typ == b"moov")
        .and_then(|m| m.child(b"mvhd"))
        .and_then(|m| m.payload())
    else {
        return Ok(None);
    };
    let qt_time = match mvhd.first() {
        Some(0) if mvhd.len() >= 8 => {
            u32::from_be_bytes([mvhd[4], mvhd[5], mvhd[6], mvhd[7]]) as i64
        }
        Some(1) if mvhd.len() >= 12 => i64::from_be_bytes([
            mvhd[4], mvhd[5], mvhd[6], mvhd[7], mvhd[8], mvhd[9], mvhd[10], mvhd[11],
        ]),
        _ => return Ok(None),
    };
    Ok(Some(qt_time - QT_EPOCH_OFFSET))
}
