//! TIFF/IFD document handling — the EXIF payload shared by the JPEG and
//! HEIC codecs.
//!
//! An EXIF blob is a little TIFF file: a byte-order header followed by
//! linked Image File Directories (IFD0, the Exif sub-IFD, the GPS sub-IFD,
//! the Interop sub-IFD hanging off Exif, and optionally a thumbnail IFD1).
//! [`TiffDocument`] parses that structure with every entry's value
//! materialized, upserts the capture-time and GPS tags, and re-serializes
//! canonically: entries sorted by tag, deterministic layout, all offsets
//! recomputed. Canonical output makes a second identical run byte-stable.
//!
//! Offset-bearing thumbnail tags in IFD1 (JPEGInterchangeFormat, strip
//! tables) are carried as blobs and re-based on serialization so existing
//! thumbnails survive the rewrite.

use chrono::{DateTime, Utc};

use crate::error::{RestoreError, Result};
use crate::sidecar::GpsPosition;

// IFD0 / Exif IFD tags
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;

// Thumbnail (IFD1) offset-bearing tag pairs
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
const TAG_JPEG_INTERCHANGE: u16 = 0x0201;
const TAG_JPEG_INTERCHANGE_LEN: u16 = 0x0202;

// GPS IFD tags
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;
const TAG_GPS_ALTITUDE_REF: u16 = 0x0005;
const TAG_GPS_ALTITUDE: u16 = 0x0006;

// TIFF field types
const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

/// TIFF byte order, from the `II`/`MM` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(&self, data: &[u8], offset: usize) -> Result<u16> {
        let b = data
            .get(offset..offset + 2)
            .ok_or_else(|| truncated("u16", offset))?;
        Ok(match self {
            Self::Big => u16::from_be_bytes([b[0], b[1]]),
            Self::Little => u16::from_le_bytes([b[0], b[1]]),
        })
    }

    fn read_u32(&self, data: &[u8], offset: usize) -> Result<u32> {
        let b = data
            .get(offset..offset + 4)
            .ok_or_else(|| truncated("u32", offset))?;
        Ok(match self {
            Self::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            Self::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        match self {
            Self::Big => v.to_be_bytes(),
            Self::Little => v.to_le_bytes(),
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        match self {
            Self::Big => v.to_be_bytes(),
            Self::Little => v.to_le_bytes(),
        }
    }
}

fn truncated(what: &str, offset: usize) -> RestoreError {
    RestoreError::UnsupportedEncoding(format!("TIFF: {what} at offset {offset} out of bounds"))
}

/// Byte size of one value of a TIFF field type; `None` for unknown types.
fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// One IFD entry with its value fully materialized (never an offset).
#[derive(Debug, Clone)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    /// Value bytes in the document's byte order. For entries of unknown
    /// field type this holds the raw 4 inline bytes.
    pub value: Vec<u8>,
}

/// Referenced data carried by offset-bearing IFD1 tags (thumbnails).
#[derive(Debug, Clone)]
struct BlobData {
    offset_tag: u16,
    segments: Vec<Vec<u8>>,
}

/// One directory: materialized entries plus any referenced blobs.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    blobs: Vec<BlobData>,
}

impl Ifd {
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Replace the entry with the same tag, or insert it.
    pub fn upsert(&mut self, entry: IfdEntry) {
        match self.entries.iter_mut().find(|e| e.tag == entry.tag) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed EXIF/TIFF blob with all directories materialized.
#[derive(Debug, Clone)]
pub struct TiffDocument {
    pub byte_order: ByteOrder,
    pub ifd0: Ifd,
    pub exif: Ifd,
    pub gps: Ifd,
    pub interop: Ifd,
    pub ifd1: Option<Ifd>,
}

impl TiffDocument {
    /// An empty document, big-endian (the conventional order for fresh
    /// EXIF payloads).
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            ifd0: Ifd::default(),
            exif: Ifd::default(),
            gps: Ifd::default(),
            interop: Ifd::default(),
            ifd1: None,
        }
    }

    /// Parse a TIFF blob. Fails with
    /// [`RestoreError::UnsupportedEncoding`] when the bytes are not a
    /// decodable TIFF structure, so callers can preserve the original
    /// payload unmodified.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(RestoreError::UnsupportedEncoding("TIFF: header too short".into()));
        }
        let byte_order = match &data[0..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => {
                return Err(RestoreError::UnsupportedEncoding(
                    "TIFF: bad byte-order mark".into(),
                ));
            }
        };
        if byte_order.read_u16(data, 2)? != 42 {
            return Err(RestoreError::UnsupportedEncoding("TIFF: bad magic".into()));
        }

        let ifd0_offset = byte_order.read_u32(data, 4)? as usize;
        let (mut ifd0, next) = parse_ifd(data, ifd0_offset, byte_order)?;

        let mut exif = Ifd::default();
        let mut gps = Ifd::default();
        let mut interop = Ifd::default();

        if let Some(off) = take_pointer(&mut ifd0, TAG_EXIF_IFD, byte_order) {
            exif = parse_ifd(data, off, byte_order)?.0;
        }
        if let Some(off) = take_pointer(&mut ifd0, TAG_GPS_IFD, byte_order) {
            gps = parse_ifd(data, off, byte_order)?.0;
        }
        if let Some(off) = take_pointer(&mut exif, TAG_INTEROP_IFD, byte_order) {
            interop = parse_ifd(data, off, byte_order)?.0;
        }
        // Some writers hang the Interop pointer off IFD0; never leave the
        // stale offset entry behind.
        if let Some(off) = take_pointer(&mut ifd0, TAG_INTEROP_IFD, byte_order) {
            if interop.is_empty() {
                interop = parse_ifd(data, off, byte_order)?.0;
            }
        }

        let ifd1 = if next != 0 {
            let (mut dir, after) = parse_ifd(data, next as usize, byte_order)?;
            if after != 0 {
                log::debug!("TIFF: dropping directories beyond IFD1");
            }
            extract_blobs(&mut dir, data, byte_order)?;
            Some(dir)
        } else {
            None
        };

        Ok(Self { byte_order, ifd0, exif, gps, interop, ifd1 })
    }

    /// Upsert DateTimeOriginal (`YYYY:MM:DD HH:MM:SS`) into the Exif
    /// sub-IFD.
    pub fn set_date_time_original(&mut self, taken_at: &DateTime<Utc>) {
        let text = taken_at.format("%Y:%m:%d %H:%M:%S").to_string();
        self.exif.upsert(ascii_entry(TAG_DATETIME_ORIGINAL, &text));
    }

    /// Upsert the GPS tag set (latitude, longitude, altitude and their
    /// reference/sign tags) into the GPS sub-IFD.
    pub fn set_gps(&mut self, gps: &GpsPosition) {
        let order = self.byte_order;

        let lat_ref = if gps.latitude >= 0.0 { "N" } else { "S" };
        let lon_ref = if gps.longitude >= 0.0 { "E" } else { "W" };

        self.gps.upsert(ascii_entry(TAG_GPS_LATITUDE_REF, lat_ref));
        self.gps.upsert(rational_entry(
            TAG_GPS_LATITUDE,
            &degrees_to_rationals(gps.latitude.abs()),
            order,
        ));
        self.gps.upsert(ascii_entry(TAG_GPS_LONGITUDE_REF, lon_ref));
        self.gps.upsert(rational_entry(
            TAG_GPS_LONGITUDE,
            &degrees_to_rationals(gps.longitude.abs()),
            order,
        ));

        let alt_ref: u8 = if gps.altitude_meters < 0.0 { 1 } else { 0 };
        self.gps.upsert(IfdEntry {
            tag: TAG_GPS_ALTITUDE_REF,
            field_type: TYPE_BYTE,
            count: 1,
            value: vec![alt_ref],
        });
        let alt_mm = (gps.altitude_meters.abs() * 1000.0).round() as u32;
        self.gps.upsert(rational_entry(TAG_GPS_ALTITUDE, &[(alt_mm, 1000)], order));
    }

    /// Serialize canonically. Entries are sorted by tag, sub-IFD pointers
    /// and thumbnail offsets recomputed, out-of-line values placed in a
    /// deterministic order, so equal documents produce equal bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let order = self.byte_order;

        // Assemble final entry lists, with pointer entries re-synthesized.
        let mut ifd0_entries = sorted(&self.ifd0.entries);
        let exif_entries = {
            let mut v = sorted(&self.exif.entries);
            if !self.interop.is_empty() {
                v.push(pointer_placeholder(TAG_INTEROP_IFD, order));
                v.sort_by_key(|e| e.tag);
            }
            v
        };
        let gps_entries = sorted(&self.gps.entries);
        if !exif_entries.is_empty() {
            ifd0_entries.push(pointer_placeholder(TAG_EXIF_IFD, order));
        }
        if !gps_entries.is_empty() {
            ifd0_entries.push(pointer_placeholder(TAG_GPS_IFD, order));
        }
        ifd0_entries.sort_by_key(|e| e.tag);
        let interop_entries = sorted(&self.interop.entries);
        let ifd1_entries = self
            .ifd1
            .as_ref()
            .map(|d| sorted(&d.entries))
            .filter(|v| !v.is_empty());

        // Lay the directories out in a fixed order, each table followed by
        // its out-of-line data.
        let ifd0_at = 8usize;
        let mut cursor = table_end(ifd0_at, &ifd0_entries);
        let exif_at = place(&mut cursor, &exif_entries);
        let interop_at = place(&mut cursor, &interop_entries);
        let gps_at = place(&mut cursor, &gps_entries);
        let ifd1_at = match &ifd1_entries {
            Some(entries) => place(&mut cursor, entries),
            None => 0,
        };

        // Thumbnail blobs land after everything else.
        let mut ifd1_entries = ifd1_entries;
        if let (Some(entries), Some(dir)) = (ifd1_entries.as_mut(), self.ifd1.as_ref()) {
            rebase_blobs(entries, &dir.blobs, &mut cursor, order);
        }

        let mut out = Vec::with_capacity(cursor);
        match order {
            ByteOrder::Little => out.extend_from_slice(b"II"),
            ByteOrder::Big => out.extend_from_slice(b"MM"),
        }
        out.extend_from_slice(&order.u16_bytes(42));
        out.extend_from_slice(&order.u32_bytes(ifd0_at as u32));

        let pointer_of = |tag: u16| -> u32 {
            match tag {
                TAG_EXIF_IFD => exif_at as u32,
                TAG_GPS_IFD => gps_at as u32,
                TAG_INTEROP_IFD => interop_at as u32,
                _ => 0,
            }
        };

        emit_ifd(&mut out, &ifd0_entries, ifd0_at, ifd1_at as u32, order, &pointer_of);
        if exif_at != 0 {
            emit_ifd(&mut out, &exif_entries, exif_at, 0, order, &pointer_of);
        }
        if interop_at != 0 {
            emit_ifd(&mut out, &interop_entries, interop_at, 0, order, &pointer_of);
        }
        if gps_at != 0 {
            emit_ifd(&mut out, &gps_entries, gps_at, 0, order, &pointer_of);
        }
        if let Some(entries) = &ifd1_entries {
            emit_ifd(&mut out, entries, ifd1_at, 0, order, &pointer_of);
        }
        if let Some(dir) = &self.ifd1 {
            for blob in &dir.blobs {
                for segment in &blob.segments {
                    if out.len() % 2 != 0 {
                        out.push(0);
                    }
                    out.extend_from_slice(segment);
                }
            }
        }

        out
    }

    // ── read-back accessors (round-trip verification) ────────────────

    /// The DateTimeOriginal value, if present.
    pub fn date_time_original(&self) -> Option<String> {
        let entry = self.exif.get(TAG_DATETIME_ORIGINAL)?;
        Some(
            String::from_utf8_lossy(&entry.value)
                .trim_end_matches('\0')
                .to_string(),
        )
    }

    /// Decoded GPS fix as (latitude, longitude, altitude meters).
    pub fn gps_position(&self) -> Option<(f64, f64, f64)> {
        let order = self.byte_order;
        let lat = rationals_to_degrees(self.gps.get(TAG_GPS_LATITUDE)?, order)?;
        let lon = rationals_to_degrees(self.gps.get(TAG_GPS_LONGITUDE)?, order)?;
        let lat_sign = match self.gps.get(TAG_GPS_LATITUDE_REF)?.value.first() {
            Some(b'S') => -1.0,
            _ => 1.0,
        };
        let lon_sign = match self.gps.get(TAG_GPS_LONGITUDE_REF)?.value.first() {
            Some(b'W') => -1.0,
            _ => 1.0,
        };
        let alt = self
            .gps
            .get(TAG_GPS_ALTITUDE)
            .and_then(|e| read_rational(&e.value, 0, order))
            .unwrap_or(0.0);
        let alt_sign = match self.gps.get(TAG_GPS_ALTITUDE_REF).map(|e| e.value.first()) {
            Some(Some(1)) => -1.0,
            _ => 1.0,
        };
        Some((lat * lat_sign, lon * lon_sign, alt * alt_sign))
    }
}

impl Default for TiffDocument {
    fn default() -> Self {
        Self::new()
    }
}

// ── parsing helpers ──────────────────────────────────────────────────

fn parse_ifd(data: &[u8], offset: usize, order: ByteOrder) -> Result<(Ifd, u32)> {
    let count = order.read_u16(data, offset)? as usize;
    let entries_start = offset + 2;
    let next_at = entries_start + count * 12;
    let next = order.read_u32(data, next_at)?;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = entries_start + i * 12;
        let tag = order.read_u16(data, at)?;
        let field_type = order.read_u16(data, at + 2)?;
        let entry_count = order.read_u32(data, at + 4)?;

        let value = match type_size(field_type) {
            Some(size) => {
                let byte_len = size
                    .checked_mul(entry_count as usize)
                    .filter(|&l| l <= data.len())
                    .ok_or_else(|| {
                        RestoreError::UnsupportedEncoding(format!(
                            "TIFF: tag {tag:#06x} value length overflows"
                        ))
                    })?;
                if byte_len <= 4 {
                    data[at + 8..at + 8 + byte_len].to_vec()
                } else {
                    let value_at = order.read_u32(data, at + 8)? as usize;
                    data.get(value_at..value_at + byte_len)
                        .ok_or_else(|| truncated("entry value", value_at))?
                        .to_vec()
                }
            }
            None => {
                log::debug!("TIFF: tag {tag:#06x} has unknown type {field_type}, kept inline");
                data[at + 8..at + 12].to_vec()
            }
        };

        entries.push(IfdEntry { tag, field_type, count: entry_count, value });
    }

    Ok((Ifd { entries, blobs: Vec::new() }, next))
}

/// Remove a sub-IFD pointer entry and return the offset it held.
fn take_pointer(ifd: &mut Ifd, tag: u16, order: ByteOrder) -> Option<usize> {
    let idx = ifd.entries.iter().position(|e| e.tag == tag)?;
    let entry = ifd.entries.remove(idx);
    let off = order.read_u32(&entry.value, 0).ok()?;
    if off == 0 { None } else { Some(off as usize) }
}

/// Pull thumbnail data referenced by IFD1's offset-bearing tag pairs into
/// blobs, normalizing the offset entries to LONG so relocation on
/// serialize cannot overflow a SHORT.
fn extract_blobs(ifd: &mut Ifd, data: &[u8], order: ByteOrder) -> Result<()> {
    const PAIRS: [(u16, u16); 2] = [
        (TAG_JPEG_INTERCHANGE, TAG_JPEG_INTERCHANGE_LEN),
        (TAG_STRIP_OFFSETS, TAG_STRIP_BYTE_COUNTS),
    ];

    for (offset_tag, length_tag) in PAIRS {
        let Some(offsets_entry) = ifd.get(offset_tag).cloned() else { continue };
        let Some(lengths_entry) = ifd.get(length_tag).cloned() else { continue };
        if offsets_entry.count != lengths_entry.count {
            return Err(RestoreError::UnsupportedEncoding(
                "TIFF: thumbnail offset/length counts disagree".into(),
            ));
        }

        let offsets = read_int_array(&offsets_entry, order)?;
        let lengths = read_int_array(&lengths_entry, order)?;
        let mut segments = Vec::with_capacity(offsets.len());
        for (&off, &len) in offsets.iter().zip(&lengths) {
            let (off, len) = (off as usize, len as usize);
            let segment = data
                .get(off..off + len)
                .ok_or_else(|| truncated("thumbnail data", off))?;
            segments.push(segment.to_vec());
        }

        // Placeholder offsets; patched during serialization.
        ifd.upsert(IfdEntry {
            tag: offset_tag,
            field_type: TYPE_LONG,
            count: offsets_entry.count,
            value: vec![0u8; 4 * offsets_entry.count as usize],
        });
        ifd.blobs.push(BlobData { offset_tag, segments });
    }
    Ok(())
}

/// Read a SHORT or LONG array entry as u32s.
fn read_int_array(entry: &IfdEntry, order: ByteOrder) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(entry.count as usize);
    for i in 0..entry.count as usize {
        let v = match entry.field_type {
            TYPE_SHORT => order.read_u16(&entry.value, i * 2)? as u32,
            TYPE_LONG => order.read_u32(&entry.value, i * 4)?,
            other => {
                return Err(RestoreError::UnsupportedEncoding(format!(
                    "TIFF: unexpected type {other} for offset array"
                )));
            }
        };
        out.push(v);
    }
    Ok(out)
}

// ── serialization helpers ────────────────────────────────────────────

fn sorted(entries: &[IfdEntry]) -> Vec<IfdEntry> {
    let mut v = entries.to_vec();
    v.sort_by_key(|e| e.tag);
    v
}

fn pointer_placeholder(tag: u16, order: ByteOrder) -> IfdEntry {
    IfdEntry {
        tag,
        field_type: TYPE_LONG,
        count: 1,
        value: order.u32_bytes(0).to_vec(),
    }
}

/// End offset of a directory table (and its out-of-line values) laid out
/// at absolute offset `at`.
fn table_end(at: usize, entries: &[IfdEntry]) -> usize {
    let mut pos = at + 2 + entries.len() * 12 + 4;
    for e in entries {
        if e.value.len() > 4 {
            if pos % 2 != 0 {
                pos += 1;
            }
            pos += e.value.len();
        }
    }
    pos
}

fn place(cursor: &mut usize, entries: &[IfdEntry]) -> usize {
    if entries.is_empty() {
        return 0;
    }
    let at = *cursor;
    *cursor = table_end(at, entries);
    at
}

/// Rewrite thumbnail offset entries now that the blob area's position is
/// known.
fn rebase_blobs(
    entries: &mut [IfdEntry],
    blobs: &[BlobData],
    cursor: &mut usize,
    order: ByteOrder,
) {
    for blob in blobs {
        let mut offsets = Vec::with_capacity(blob.segments.len());
        for segment in &blob.segments {
            if *cursor % 2 != 0 {
                *cursor += 1;
            }
            offsets.push(*cursor as u32);
            *cursor += segment.len();
        }
        if let Some(entry) = entries.iter_mut().find(|e| e.tag == blob.offset_tag) {
            let mut value = Vec::with_capacity(4 * offsets.len());
            for off in offsets {
                value.extend_from_slice(&order.u32_bytes(off));
            }
            entry.value = value;
        }
    }
}

fn emit_ifd(
    out: &mut Vec<u8>,
    entries: &[IfdEntry],
    at: usize,
    next: u32,
    order: ByteOrder,
    pointer_of: &dyn Fn(u16) -> u32,
) {
    debug_assert_eq!(out.len(), at, "directory emitted at unplanned offset");

    out.extend_from_slice(&order.u16_bytes(entries.len() as u16));

    // First pass: compute where each out-of-line value will land.
    let mut data_at = at + 2 + entries.len() * 12 + 4;
    let mut value_offsets = Vec::with_capacity(entries.len());
    for e in entries {
        if e.value.len() > 4 {
            if data_at % 2 != 0 {
                data_at += 1;
            }
            value_offsets.push(data_at as u32);
            data_at += e.value.len();
        } else {
            value_offsets.push(0);
        }
    }

    for (e, &value_at) in entries.iter().zip(&value_offsets) {
        out.extend_from_slice(&order.u16_bytes(e.tag));
        out.extend_from_slice(&order.u16_bytes(e.field_type));
        out.extend_from_slice(&order.u32_bytes(e.count));
        let is_pointer =
            matches!(e.tag, TAG_EXIF_IFD | TAG_GPS_IFD | TAG_INTEROP_IFD) && e.count == 1;
        if is_pointer {
            out.extend_from_slice(&order.u32_bytes(pointer_of(e.tag)));
        } else if e.value.len() > 4 {
            out.extend_from_slice(&order.u32_bytes(value_at));
        } else {
            let mut inline = [0u8; 4];
            inline[..e.value.len()].copy_from_slice(&e.value);
            out.extend_from_slice(&inline);
        }
    }
    out.extend_from_slice(&order.u32_bytes(next));

    for e in entries {
        if e.value.len() > 4 {
            if out.len() % 2 != 0 {
                out.push(0);
            }
            out.extend_from_slice(&e.value);
        }
    }
}

// ── value encoding ───────────────────────────────────────────────────

fn ascii_entry(tag: u16, text: &str) -> IfdEntry {
    let mut value = text.as_bytes().to_vec();
    value.push(0);
    IfdEntry { tag, field_type: TYPE_ASCII, count: value.len() as u32, value }
}

fn rational_entry(tag: u16, rationals: &[(u32, u32)], order: ByteOrder) -> IfdEntry {
    let mut value = Vec::with_capacity(rationals.len() * 8);
    for &(num, den) in rationals {
        value.extend_from_slice(&order.u32_bytes(num));
        value.extend_from_slice(&order.u32_bytes(den));
    }
    IfdEntry {
        tag,
        field_type: TYPE_RATIONAL,
        count: rationals.len() as u32,
        value,
    }
}

/// Decimal degrees to the EXIF degree/minute/second rational triple.
fn degrees_to_rationals(degrees: f64) -> [(u32, u32); 3] {
    let deg = degrees.floor();
    let minutes_full = (degrees - deg) * 60.0;
    let minutes = minutes_full.floor();
    let seconds = (minutes_full - minutes) * 60.0;
    [
        (deg as u32, 1),
        (minutes as u32, 1),
        ((seconds * 10000.0).round() as u32, 10000),
    ]
}

fn read_rational(value: &[u8], index: usize, order: ByteOrder) -> Option<f64> {
    let num = order.read_u32(value, index * 8).ok()?;
    let den = order.read_u32(value, index * 8 + 4).ok()?;
    if den == 0 {
        return None;
    }
    Some(num as f64 / den as f64)
}

fn rationals_to_degrees(entry: &IfdEntry, order: ByteOrder) -> Option<f64> {
    let deg = read_rational(&entry.value, 0, order)?;
    let min = read_rational(&entry.value, 1, order).unwrap_or(0.0);
    let sec = read_rational(&entry.value, 2, order).unwrap_or(0.0);
    Some(deg + min / 60.0 + sec / 3600.0)
}
