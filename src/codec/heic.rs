//! ISOBMFF codec for HEIC.
//!
//! HEIC stores metadata as items indexed by the `meta` box machinery:
//! `iinf`/`infe` name the items, `iloc` locates their bytes, `iref` links
//! them to the primary picture (`pitm`). This codec upserts the
//! interoperable `Exif` item — payload `[u32 tiff-offset]["Exif\0\0"]
//! [TIFF]` with the TIFF built by [`TiffDocument`]. A same-size payload is
//! replaced in place; anything else is relocated to the end of `mdat` and
//! its `iloc` extent rewritten. When `meta` grows, every other item's
//! file-absolute extent is re-based through the top-level shift table.

use super::bmff::{self, BoxNode, NodeKind};
use super::tiff::TiffDocument;
use crate::error::{RestoreError, Result};
use crate::sidecar::MetadataRecord;

const HEIC_BRANDS: [&[u8; 4]; 4] = [b"heic", b"heix", b"mif1", b"msf1"];
const EXIF_ITEM_TYPE: &[u8; 4] = b"Exif";
const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

/// Produce the full replacement byte stream for a HEIC file with the
/// record's timestamp/GPS upserted into its `Exif` item.
pub fn embed(bytes: &[u8], record: &MetadataRecord) -> Result<Vec<u8>> {
    let mut boxes = bmff::parse_boxes(bytes)?;
    check_brand(&boxes)?;

    let meta = boxes
        .iter()
        .find(|b| &b.typ == b"meta")
        .ok_or_else(|| RestoreError::MalformedContainer("no meta box".into()))?;

    // Locate an existing Exif item and build the replacement TIFF.
    let existing = find_exif_item(meta)?;
    let mut doc = match &existing {
        Some(item) => {
            let old_payload = read_extents(bytes, &item.extents)?;
            TiffDocument::parse(exif_item_tiff(&old_payload)?)?
        }
        None => TiffDocument::new(),
    };
    if let Some(taken_at) = &record.taken_at {
        doc.set_date_time_original(taken_at);
    }
    if let Some(gps) = &record.gps {
        doc.set_gps(gps);
    }

    let mut new_payload = 6u32.to_be_bytes().to_vec();
    new_payload.extend_from_slice(EXIF_SIGNATURE);
    new_payload.extend_from_slice(&doc.to_bytes());

    // Same-size single-extent payloads are overwritten where they sit; no
    // structure changes, no offsets move.
    if let Some(item) = &existing {
        if item.extents.len() == 1
            && item.extents[0].1 == new_payload.len() as u64
            && patch_in_place(&mut boxes, item.extents[0].0, &new_payload)
        {
            return Ok(bmff::serialize_boxes(&boxes));
        }
    }

    relocate_exif_item(&mut boxes, existing.map(|i| i.id), new_payload)?;
    Ok(bmff::serialize_boxes(&boxes))
}

/// Extract the TIFF payload of the `Exif` item, if any.
pub fn extract_exif_tiff(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let boxes = bmff::parse_boxes(bytes)?;
    let Some(meta) = boxes.iter().find(|b| &b.typ == b"meta") else {
        return Ok(None);
    };
    let Some(item) = find_exif_item(meta)? else {
        return Ok(None);
    };
    let payload = read_extents(bytes, &item.extents)?;
    Ok(Some(exif_item_tiff(&payload)?.to_vec()))
}

fn check_brand(boxes: &[BoxNode]) -> Result<()> {
    let ftyp = boxes
        .iter()
        .find(|b| &b.typ == b"ftyp")
        .and_then(|b| b.payload())
        .ok_or_else(|| RestoreError::UnsupportedEncoding("no ftyp box".into()))?;
    if ftyp.len() < 8 {
        return Err(RestoreError::UnsupportedEncoding("ftyp too short".into()));
    }
    let major_ok = HEIC_BRANDS.iter().any(|b| &ftyp[0..4] == *b);
    let compatible_ok = ftyp[8..]
        .chunks_exact(4)
        .any(|c| HEIC_BRANDS.iter().any(|b| c == *b));
    if major_ok || compatible_ok {
        Ok(())
    } else {
        Err(RestoreError::UnsupportedEncoding(format!(
            "ftyp brand `{}` is not a HEIC-family brand",
            bmff::fourcc_display(&[ftyp[0], ftyp[1], ftyp[2], ftyp[3]])
        )))
    }
}

/// Strip the ExifDataBlock framing: `u32 tiff_offset` then the payload,
/// with the TIFF header at `4 + tiff_offset`.
fn exif_item_tiff(payload: &[u8]) -> Result<&[u8]> {
    if payload.len() < 4 {
        return Err(RestoreError::UnsupportedEncoding("Exif item too short".into()));
    }
    let off = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    payload
        .get(4 + off..)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| {
            RestoreError::UnsupportedEncoding("Exif item TIFF offset out of bounds".into())
        })
}

// ── item info (iinf/infe) ────────────────────────────────────────────

struct ExifItem {
    id: u32,
    /// Resolved `(absolute_offset, length)` extents, construction method 0.
    extents: Vec<(u64, u64)>,
}

/// Parsed `iinf` payload: version/flags, entry count, child `infe` boxes.
struct ItemInfo {
    version_flags: [u8; 4],
    entries: Vec<BoxNode>,
}

fn parse_iinf(payload: &[u8]) -> Result<ItemInfo> {
    if payload.len() < 6 {
        return Err(RestoreError::MalformedContainer("iinf too short".into()));
    }
    let version = payload[0];
    let count_end = if version == 0 { 6 } else { 8 };
    if payload.len() < count_end {
        return Err(RestoreError::MalformedContainer("iinf too short".into()));
    }
    let entries = bmff::parse_boxes(&payload[count_end..])?;
    Ok(ItemInfo {
        version_flags: [payload[0], payload[1], payload[2], payload[3]],
        entries,
    })
}

fn serialize_iinf(info: &ItemInfo) -> Vec<u8> {
    let mut out = info.version_flags.to_vec();
    if info.version_flags[0] == 0 {
        out.extend_from_slice(&(info.entries.len() as u16).to_be_bytes());
    } else {
        out.extend_from_slice(&(info.entries.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(&bmff::serialize_boxes(&info.entries));
    out
}

/// Item ID and type from an `infe` box payload (version 2/3).
fn infe_id_and_type(payload: &[u8]) -> Option<(u32, [u8; 4])> {
    match payload.first()? {
        2 if payload.len() >= 12 => Some((
            u16::from_be_bytes([payload[4], payload[5]]) as u32,
            [payload[8], payload[9], payload[10], payload[11]],
        )),
        3 if payload.len() >= 14 => Some((
            u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
            [payload[10], payload[11], payload[12], payload[13]],
        )),
        _ => None,
    }
}

fn new_infe(id: u32) -> BoxNode {
    let mut payload = vec![2, 0, 0, 0];
    payload.extend_from_slice(&(id as u16).to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes()); // item_protection_index
    payload.extend_from_slice(EXIF_ITEM_TYPE);
    payload.push(0); // empty item_name
    BoxNode::leaf(*b"infe", payload)
}

fn find_exif_item(meta: &BoxNode) -> Result<Option<ExifItem>> {
    let Some(iinf) = meta.child(b"iinf").and_then(|b| b.payload()) else {
        return Ok(None);
    };
    let info = parse_iinf(iinf)?;
    let exif_id = info.entries.iter().find_map(|e| {
        let payload = e.payload()?;
        let (id, typ) = infe_id_and_type(payload)?;
        (&typ == EXIF_ITEM_TYPE).then_some(id)
    });
    let Some(exif_id) = exif_id else { return Ok(None) };

    let iloc_payload = meta
        .child(b"iloc")
        .and_then(|b| b.payload())
        .ok_or_else(|| RestoreError::MalformedContainer("iinf without iloc".into()))?;
    let iloc = parse_iloc(iloc_payload)?;
    let Some(item) = iloc.items.iter().find(|i| i.id == exif_id) else {
        return Ok(None);
    };
    if item.construction_method != 0 {
        return Err(RestoreError::UnsupportedEncoding(
            "Exif item is not stored by file offset".into(),
        ));
    }
    let extents = item
        .extents
        .iter()
        .map(|e| (item.base_offset + e.offset, e.length))
        .collect();
    Ok(Some(ExifItem { id: exif_id, extents }))
}

fn read_extents(bytes: &[u8], extents: &[(u64, u64)]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for &(off, len) in extents {
        let (off, len) = (off as usize, len as usize);
        let chunk = bytes
            .get(off..off + len)
            .ok_or_else(|| RestoreError::MalformedContainer("iloc extent out of bounds".into()))?;
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

// ── item location (iloc) ─────────────────────────────────────────────

struct Iloc {
    version: u8,
    flags: [u8; 3],
    offset_size: u8,
    length_size: u8,
    base_offset_size: u8,
    index_size: u8,
    items: Vec<IlocItem>,
}

struct IlocItem {
    id: u32,
    construction_method: u8,
    data_reference_index: u16,
    base_offset: u64,
    extents: Vec<IlocExtent>,
}

struct IlocExtent {
    index: u64,
    offset: u64,
    length: u64,
}

struct Reader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .data
            .get(self.at..self.at + n)
            .ok_or_else(|| RestoreError::MalformedContainer("iloc truncated".into()))?;
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn sized(&mut self, size: u8) -> Result<u64> {
        let b = self.take(size as usize)?;
        Ok(b.iter().fold(0u64, |acc, &x| (acc << 8) | x as u64))
    }
}

fn parse_iloc(payload: &[u8]) -> Result<Iloc> {
    let mut r = Reader { data: payload, at: 0 };
    let version = r.u8()?;
    let flags = {
        let b = r.take(3)?;
        [b[0], b[1], b[2]]
    };
    let sizes = r.u8()?;
    let (offset_size, length_size) = (sizes >> 4, sizes & 0x0F);
    let sizes = r.u8()?;
    let base_offset_size = sizes >> 4;
    let index_size = if version == 1 || version == 2 { sizes & 0x0F } else { 0 };

    let item_count = if version < 2 { r.u16()? as u32 } else { r.u32()? };
    let mut items = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        let id = if version < 2 { r.u16()? as u32 } else { r.u32()? };
        let construction_method = if version == 1 || version == 2 {
            (r.u16()? & 0x000F) as u8
        } else {
            0
        };
        let data_reference_index = r.u16()?;
        let base_offset = r.sized(base_offset_size)?;
        let extent_count = r.u16()?;
        let mut extents = Vec::with_capacity(extent_count as usize);
        for _ in 0..extent_count {
            let index = if (version == 1 || version == 2) && index_size > 0 {
                r.sized(index_size)?
            } else {
                0
            };
            let offset = r.sized(offset_size)?;
            let length = r.sized(length_size)?;
            extents.push(IlocExtent { index, offset, length });
        }
        items.push(IlocItem { id, construction_method, data_reference_index, base_offset, extents });
    }
    Ok(Iloc {
        version,
        flags,
        offset_size,
        length_size,
        base_offset_size,
        index_size,
        items,
    })
}

fn put_sized(out: &mut Vec<u8>, value: u64, size: u8) {
    for i in (0..size).rev() {
        out.push((value >> (8 * i)) as u8);
    }
}

fn serialize_iloc(iloc: &Iloc) -> Vec<u8> {
    let mut out = vec![iloc.version, iloc.flags[0], iloc.flags[1], iloc.flags[2]];
    out.push((iloc.offset_size << 4) | iloc.length_size);
    out.push((iloc.base_offset_size << 4) | iloc.index_size);
    if iloc.version < 2 {
        out.extend_from_slice(&(iloc.items.len() as u16).to_be_bytes());
    } else {
        out.extend_from_slice(&(iloc.items.len() as u32).to_be_bytes());
    }
    for item in &iloc.items {
        if iloc.version < 2 {
            out.extend_from_slice(&(item.id as u16).to_be_bytes());
        } else {
            out.extend_from_slice(&item.id.to_be_bytes());
        }
        if iloc.version == 1 || iloc.version == 2 {
            out.extend_from_slice(&(item.construction_method as u16).to_be_bytes());
        }
        out.extend_from_slice(&item.data_reference_index.to_be_bytes());
        put_sized(&mut out, item.base_offset, iloc.base_offset_size);
        out.extend_from_slice(&(item.extents.len() as u16).to_be_bytes());
        for e in &item.extents {
            if (iloc.version == 1 || iloc.version == 2) && iloc.index_size > 0 {
                put_sized(&mut out, e.index, iloc.index_size);
            }
            put_sized(&mut out, e.offset, iloc.offset_size);
            put_sized(&mut out, e.length, iloc.length_size);
        }
    }
    out
}

// ── mutation ─────────────────────────────────────────────────────────

/// Overwrite `len(data)` bytes at original absolute offset `abs` inside
/// whichever top-level leaf holds them. Returns false when no leaf covers
/// the span (e.g. data lives inside `meta`'s `idat`).
fn patch_in_place(boxes: &mut [BoxNode], abs: u64, data: &[u8]) -> bool {
    for b in boxes.iter_mut() {
        let Some((start, size)) = b.orig_span else { continue };
        let header = if b.large { 16u64 } else { 8u64 };
        let payload_start = start + header;
        if abs < payload_start || abs + data.len() as u64 > start + size {
            continue;
        }
        if let NodeKind::Leaf { payload } = &mut b.kind {
            let rel = (abs - payload_start) as usize;
            payload[rel..rel + data.len()].copy_from_slice(data);
            return true;
        }
    }
    false
}

/// Insert or rewrite the Exif item with its payload appended to `mdat`,
/// updating `iinf`/`iloc`/`iref` and re-basing every other item's
/// file-absolute extents.
fn relocate_exif_item(
    boxes: &mut Vec<BoxNode>,
    existing_id: Option<u32>,
    payload: Vec<u8>,
) -> Result<()> {
    // 1. Update the item tables inside meta so every box size is final.
    let meta = boxes
        .iter_mut()
        .find(|b| &b.typ == b"meta")
        .ok_or_else(|| RestoreError::MalformedContainer("no meta box".into()))?;

    let iinf_leaf = meta
        .child_mut(b"iinf")
        .ok_or_else(|| RestoreError::MalformedContainer("meta without iinf".into()))?;
    let NodeKind::Leaf { payload: iinf_payload } = &mut iinf_leaf.kind else {
        return Err(RestoreError::MalformedContainer("iinf is not a leaf".into()));
    };
    let mut info = parse_iinf(iinf_payload)?;

    let iloc_leaf = meta
        .child(b"iloc")
        .ok_or_else(|| RestoreError::MalformedContainer("meta without iloc".into()))?;
    let mut iloc = parse_iloc(iloc_leaf.payload().unwrap_or_default())?;

    // Zero-width offset/length fields cannot hold the relocated extent.
    if iloc.offset_size == 0 {
        iloc.offset_size = 4;
    }
    if iloc.length_size == 0 {
        iloc.length_size = 4;
    }

    let exif_id = match existing_id {
        Some(id) => id,
        None => {
            let max_known = info
                .entries
                .iter()
                .filter_map(|e| e.payload().and_then(infe_id_and_type))
                .map(|(id, _)| id)
                .chain(iloc.items.iter().map(|i| i.id))
                .max()
                .unwrap_or(0);
            let id = max_known + 1;
            info.entries.push(new_infe(id));
            add_cdsc_reference(meta, id)?;
            id
        }
    };

    let payload_len = payload.len() as u64;
    match iloc.items.iter_mut().find(|i| i.id == exif_id) {
        Some(item) => {
            item.construction_method = 0;
            item.base_offset = 0;
            item.extents = vec![IlocExtent { index: 0, offset: 0, length: payload_len }];
        }
        None => iloc.items.push(IlocItem {
            id: exif_id,
            construction_method: 0,
            data_reference_index: 0,
            base_offset: 0,
            extents: vec![IlocExtent { index: 0, offset: 0, length: payload_len }],
        }),
    }

    let new_iinf = serialize_iinf(&info);
    if let Some(leaf) = meta.child_mut(b"iinf") {
        leaf.kind = NodeKind::Leaf { payload: new_iinf };
    }
    let placeholder = serialize_iloc(&iloc);
    if let Some(leaf) = meta.child_mut(b"iloc") {
        leaf.kind = NodeKind::Leaf { payload: placeholder };
    }

    // 2. Append the payload to the last mdat (created if missing).
    let mdat_index = match boxes.iter().rposition(|b| &b.typ == b"mdat") {
        Some(i) => i,
        None => {
            boxes.push(BoxNode::leaf(*b"mdat", Vec::new()));
            boxes.len() - 1
        }
    };
    let rel = {
        let NodeKind::Leaf { payload: mdat_payload } = &mut boxes[mdat_index].kind else {
            return Err(RestoreError::MalformedContainer("mdat is not a leaf".into()));
        };
        let rel = mdat_payload.len() as u64;
        mdat_payload.extend_from_slice(&payload);
        rel
    };

    // 3. Layout is final; compute where everything lands.
    let shifts = bmff::top_level_shifts(boxes);
    let mdat_header = if boxes[mdat_index].large { 16u64 } else { 8u64 };
    let exif_abs = shifts[mdat_index].1 + mdat_header + rel;

    // 4. Re-base every other construction-0 extent and pin the Exif one.
    for item in &mut iloc.items {
        if item.construction_method != 0 {
            continue;
        }
        if item.id == exif_id {
            item.extents[0].offset = exif_abs;
            continue;
        }
        if item.base_offset != 0 {
            // Extents are relative to the base; moving the base moves all.
            item.base_offset = bmff::rebase_offset(&shifts, item.base_offset);
        } else {
            for e in &mut item.extents {
                e.offset = bmff::rebase_offset(&shifts, e.offset);
            }
        }
    }

    let final_iloc = serialize_iloc(&iloc);
    let meta = boxes
        .iter_mut()
        .find(|b| &b.typ == b"meta")
        .ok_or_else(|| RestoreError::MalformedContainer("no meta box".into()))?;
    if let Some(leaf) = meta.child_mut(b"iloc") {
        leaf.kind = NodeKind::Leaf { payload: final_iloc };
    }
    Ok(())
}

/// Link the Exif item to the primary picture with a `cdsc` reference.
fn add_cdsc_reference(meta: &mut BoxNode, exif_id: u32) -> Result<()> {
    let primary = meta
        .child(b"pitm")
        .and_then(|b| b.payload())
        .and_then(|p| match p.first()? {
            0 if p.len() >= 6 => Some(u16::from_be_bytes([p[4], p[5]]) as u32),
            _ if p.len() >= 8 => Some(u32::from_be_bytes([p[4], p[5], p[6], p[7]])),
            _ => None,
        });
    let Some(primary) = primary else {
        log::debug!("HEIC: no pitm box, skipping cdsc reference");
        return Ok(());
    };

    let mut cdsc = Vec::new();
    match meta.child_mut(b"iref") {
        Some(iref) => {
            let NodeKind::Leaf { payload } = &mut iref.kind else {
                return Err(RestoreError::MalformedContainer("iref is not a leaf".into()));
            };
            let wide = payload.first().copied().unwrap_or(0) != 0;
            cdsc_box(&mut cdsc, exif_id, primary, wide);
            payload.extend_from_slice(&cdsc);
        }
        None => {
            let mut payload = vec![0, 0, 0, 0];
            cdsc_box(&mut cdsc, exif_id, primary, false);
            payload.extend_from_slice(&cdsc);
            let iref = BoxNode::leaf(*b"iref", payload);
            if let Some(children) = meta.children_mut() {
                children.push(iref);
            }
        }
    }
    Ok(())
}

fn cdsc_box(out: &mut Vec<u8>, from: u32, to: u32, wide: bool) {
    let body_len = if wide { 4 + 2 + 4 } else { 2 + 2 + 2 };
    out.extend_from_slice(&((8 + body_len) as u32).to_be_bytes());
    out.extend_from_slice(b"cdsc");
    if wide {
        out.extend_from_slice(&from.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&to.to_be_bytes());
    } else {
        out.extend_from_slice(&(from as u16).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(to as u16).to_be_bytes());
    }
}
