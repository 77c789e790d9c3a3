//! EXIF codec for JPEG.
//!
//! The marker stream is handled by `img-parts`, which preserves every
//! segment (APP0/JFIF, other APPn, quantization/Huffman tables, scan
//! data) byte for byte. Only the APP1/`Exif\0\0` payload is rebuilt, via
//! [`TiffDocument`], and the segment is kept immediately after the
//! SOI/APP0 region per JPEG ordering rules.

use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};

use super::tiff::TiffDocument;
use crate::error::{RestoreError, Result};
use crate::sidecar::MetadataRecord;

const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Produce the full replacement byte stream for a JPEG file with the
/// record's timestamp/GPS upserted into its EXIF structure.
///
/// An existing APP1 payload that is not decodable as TIFF is preserved
/// unmodified; the unit reports [`RestoreError::UnsupportedEncoding`]
/// instead of risking the camera's original data.
pub fn embed(bytes: &[u8], record: &MetadataRecord) -> Result<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| RestoreError::MalformedContainer(format!("JPEG: {e}")))?;

    let mut doc = match jpeg.exif() {
        Some(existing) => TiffDocument::parse(&existing)?,
        None => TiffDocument::new(),
    };

    if let Some(taken_at) = &record.taken_at {
        doc.set_date_time_original(taken_at);
    }
    if let Some(gps) = &record.gps {
        doc.set_gps(gps);
    }

    jpeg.set_exif(Some(Bytes::from(doc.to_bytes())));
    reposition_exif_segment(&mut jpeg);

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Extract the raw TIFF payload of the EXIF APP1 segment, if any.
pub fn extract_tiff(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| RestoreError::MalformedContainer(format!("JPEG: {e}")))?;
    Ok(jpeg.exif().map(|b| b.to_vec()))
}

/// `set_exif` inserts the APP1 segment at a fixed position, which may put
/// it after other APPn markers. Move it back so EXIF sits right after the
/// leading APP0 run (required by JPEG/EXIF ordering and by many parsers).
fn reposition_exif_segment(jpeg: &mut Jpeg) {
    let current = jpeg
        .segments()
        .iter()
        .position(|s| s.marker() == MARKER_APP1 && s.contents().starts_with(EXIF_PREFIX));
    let Some(current) = current else { return };

    let target = jpeg
        .segments()
        .iter()
        .take_while(|s| s.marker() == MARKER_APP0)
        .count();

    if current != target && target < current {
        let segments = jpeg.segments_mut();
        let segment = segments.remove(current);
        segments.insert(target, segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::GpsPosition;
    use chrono::{TimeZone, Utc};

    const ENTROPY: &[u8] = &[0x01, 0x55, 0xAA, 0x31, 0x41, 0x59, 0x26, 0x53];

    /// A structurally valid JPEG: SOI, APP0/JFIF, DQT, SOF0, SOS with a
    /// recognizable entropy payload, EOI.
    fn synthetic_jpeg() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        // APP0 / JFIF
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        // DQT (contents irrelevant to segment parsing)
        out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0x00, 0x01]);
        // SOF0, 1x1, one component
        out.extend_from_slice(&[
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00,
        ]);
        // SOS + entropy + EOI
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        out.extend_from_slice(ENTROPY);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn record(with_gps: bool) -> MetadataRecord {
        MetadataRecord {
            title: "test.jpg".into(),
            taken_at: Some(Utc.with_ymd_and_hms(2020, 1, 1, 13, 0, 0).unwrap()),
            gps: with_gps.then_some(GpsPosition {
                latitude: 48.8584,
                longitude: 2.2945,
                altitude_meters: 35.0,
            }),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn embeds_into_jpeg_without_exif() {
        let out = embed(&synthetic_jpeg(), &record(true)).unwrap();

        let tiff = extract_tiff(&out).unwrap().expect("APP1 EXIF present");
        let doc = TiffDocument::parse(&tiff).unwrap();
        assert_eq!(doc.date_time_original().unwrap(), "2020:01:01 13:00:00");
        let (lat, lon, alt) = doc.gps_position().unwrap();
        assert!((lat - 48.8584).abs() < 1e-4);
        assert!((lon - 2.2945).abs() < 1e-4);
        assert!((alt - 35.0).abs() < 1e-3);
    }

    #[test]
    fn scan_data_and_trailer_survive() {
        let out = embed(&synthetic_jpeg(), &record(true)).unwrap();
        assert!(contains(&out, ENTROPY), "entropy bytes were disturbed");
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        assert_eq!(&out[out.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn exif_segment_lands_after_app0() {
        let out = embed(&synthetic_jpeg(), &record(false)).unwrap();
        let jpeg = Jpeg::from_bytes(Bytes::from(out)).unwrap();
        let segments = jpeg.segments();
        assert_eq!(segments[0].marker(), MARKER_APP0);
        assert_eq!(segments[1].marker(), MARKER_APP1);
        assert!(segments[1].contents().starts_with(EXIF_PREFIX));
    }

    #[test]
    fn no_gps_record_writes_no_gps_tags() {
        let out = embed(&synthetic_jpeg(), &record(false)).unwrap();
        let tiff = extract_tiff(&out).unwrap().unwrap();
        let doc = TiffDocument::parse(&tiff).unwrap();
        assert_eq!(doc.date_time_original().unwrap(), "2020:01:01 13:00:00");
        assert!(doc.gps_position().is_none());
        assert!(doc.gps.entries.is_empty());
    }

    #[test]
    fn rerun_is_byte_stable() {
        let once = embed(&synthetic_jpeg(), &record(true)).unwrap();
        let twice = embed(&once, &record(true)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn second_write_overwrites_not_duplicates() {
        let first = embed(&synthetic_jpeg(), &record(true)).unwrap();

        let mut other = record(true);
        other.taken_at = Some(Utc.with_ymd_and_hms(2021, 6, 15, 8, 30, 0).unwrap());
        let second = embed(&first, &other).unwrap();

        let doc = TiffDocument::parse(&extract_tiff(&second).unwrap().unwrap()).unwrap();
        assert_eq!(doc.date_time_original().unwrap(), "2021:06:15 08:30:00");
        assert_eq!(doc.exif.entries.len(), 1);
    }

    #[test]
    fn existing_unrelated_exif_tags_survive() {
        // First build a file whose EXIF carries a camera tag.
        let mut doc = TiffDocument::new();
        doc.ifd0.upsert(super::super::tiff::IfdEntry {
            tag: 0x010F, // Make
            field_type: 2,
            count: 5,
            value: b"ACME\0".to_vec(),
        });
        let mut jpeg = Jpeg::from_bytes(Bytes::from(synthetic_jpeg())).unwrap();
        jpeg.set_exif(Some(Bytes::from(doc.to_bytes())));
        let input = jpeg.encoder().bytes().to_vec();

        let out = embed(&input, &record(true)).unwrap();
        let parsed = TiffDocument::parse(&extract_tiff(&out).unwrap().unwrap()).unwrap();
        assert_eq!(parsed.ifd0.get(0x010F).unwrap().value, b"ACME\0");
        assert_eq!(parsed.date_time_original().unwrap(), "2020:01:01 13:00:00");
    }

    #[test]
    fn garbage_is_malformed() {
        let result = embed(b"definitely not a jpeg", &record(true));
        assert!(matches!(result, Err(RestoreError::MalformedContainer(_))));
    }

    #[test]
    fn undecodable_exif_payload_is_unsupported_and_untouched() {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(synthetic_jpeg())).unwrap();
        jpeg.set_exif(Some(Bytes::from_static(b"NOT A TIFF STRUCTURE")));
        let input = jpeg.encoder().bytes().to_vec();

        let result = embed(&input, &record(true));
        assert!(matches!(result, Err(RestoreError::UnsupportedEncoding(_))));
    }
}
