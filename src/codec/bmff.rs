//! Length-prefixed box tree shared by the HEIC and MP4/MOV codecs.
//!
//! ISOBMFF boxes (QuickTime atoms) are `[u32 size][fourcc type][payload]`
//! records, with `size == 1` switching to a 64-bit size and `size == 0`
//! meaning "to end of file". Container boxes nest further boxes in their
//! payload. This module parses a byte stream into a [`BoxNode`] tree,
//! lets codecs splice children, and re-serializes with every ancestor
//! size recomputed bottom-up. Payload bytes of untouched boxes are
//! preserved verbatim.
//!
//! Each parsed node remembers its byte span in the original stream so the
//! codecs can re-base absolute file offsets (`iloc` extents, `stco` chunk
//! tables) after boxes above them grow or shrink.

use crate::error::{RestoreError, Result};

pub type FourCC = [u8; 4];

/// Containers whose payload is purely a run of child boxes.
const CONTAINERS: &[&FourCC] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"dinf", b"edts", b"udta", b"mvex", b"iprp",
    b"ipco",
];

/// Nesting deeper than this is treated as a structural error.
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `header` carries full-box version/flags bytes for containers that
    /// have them (the ISO-style `meta` box); empty otherwise.
    Container { header: Vec<u8>, children: Vec<BoxNode> },
    Leaf { payload: Vec<u8> },
    /// Bytes that are not a box at all, emitted verbatim — classic
    /// QuickTime terminates `udta` with a bare 32-bit zero.
    Raw { bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct BoxNode {
    pub typ: FourCC,
    /// Encoded with a 64-bit size in the source; preserved on output.
    pub large: bool,
    /// Encoded with size 0 ("to end of file"); preserved when the box is
    /// still last at top level.
    pub to_eof: bool,
    /// Byte span `(start, total_size)` in the original stream; `None` for
    /// synthesized boxes.
    pub orig_span: Option<(u64, u64)>,
    pub kind: NodeKind,
}

impl BoxNode {
    pub fn leaf(typ: FourCC, payload: Vec<u8>) -> Self {
        Self { typ, large: false, to_eof: false, orig_span: None, kind: NodeKind::Leaf { payload } }
    }

    pub fn container(typ: FourCC, children: Vec<BoxNode>) -> Self {
        Self {
            typ,
            large: false,
            to_eof: false,
            orig_span: None,
            kind: NodeKind::Container { header: Vec::new(), children },
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Leaf { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn children(&self) -> &[BoxNode] {
        match &self.kind {
            NodeKind::Container { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<BoxNode>> {
        match &mut self.kind {
            NodeKind::Container { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn child(&self, typ: &FourCC) -> Option<&BoxNode> {
        self.children().iter().find(|c| &c.typ == typ)
    }

    pub fn child_mut(&mut self, typ: &FourCC) -> Option<&mut BoxNode> {
        self.children_mut()?.iter_mut().find(|c| &c.typ == typ)
    }

    /// Header length this box will be encoded with.
    fn header_len(&self) -> u64 {
        if self.large { 16 } else { 8 }
    }

    fn content_len(&self) -> u64 {
        match &self.kind {
            NodeKind::Leaf { payload } => payload.len() as u64,
            NodeKind::Container { header, children } => {
                header.len() as u64 + children.iter().map(|c| c.total_size()).sum::<u64>()
            }
            NodeKind::Raw { bytes } => bytes.len() as u64,
        }
    }

    /// Full encoded size including the header.
    pub fn total_size(&self) -> u64 {
        if let NodeKind::Raw { bytes } = &self.kind {
            return bytes.len() as u64;
        }
        let mut size = self.header_len() + self.content_len();
        // A 32-bit size field that no longer fits forces the large form.
        if !self.large && size > u32::MAX as u64 {
            size += 8;
        }
        size
    }

    fn write_into(&self, out: &mut Vec<u8>, last_at_top: bool) {
        if let NodeKind::Raw { bytes } = &self.kind {
            out.extend_from_slice(bytes);
            return;
        }
        let size = self.total_size();
        let large = self.large || size > u32::MAX as u64;

        if self.to_eof && last_at_top {
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&self.typ);
        } else if large {
            out.extend_from_slice(&1u32.to_be_bytes());
            out.extend_from_slice(&self.typ);
            out.extend_from_slice(&size.to_be_bytes());
        } else {
            out.extend_from_slice(&(size as u32).to_be_bytes());
            out.extend_from_slice(&self.typ);
        }

        match &self.kind {
            NodeKind::Leaf { payload } => out.extend_from_slice(payload),
            NodeKind::Container { header, children } => {
                out.extend_from_slice(header);
                for child in children {
                    child.write_into(out, false);
                }
            }
            NodeKind::Raw { .. } => unreachable!("handled above"),
        }
    }
}

/// Parse a complete stream of top-level boxes.
pub fn parse_boxes(data: &[u8]) -> Result<Vec<BoxNode>> {
    parse_box_list(data, 0, 0)
}

fn parse_box_list(data: &[u8], base_offset: u64, depth: usize) -> Result<Vec<BoxNode>> {
    if depth > MAX_DEPTH {
        return Err(RestoreError::MalformedContainer("box nesting too deep".into()));
    }

    let mut boxes = Vec::new();
    let mut at = 0usize;
    while at < data.len() {
        // Classic QuickTime ends udta with a bare 32-bit zero; preserve
        // any all-zero trailer verbatim instead of misreading it as a box.
        if data[at..].iter().all(|&b| b == 0) {
            boxes.push(BoxNode {
                typ: [0; 4],
                large: false,
                to_eof: false,
                orig_span: Some((base_offset + at as u64, (data.len() - at) as u64)),
                kind: NodeKind::Raw { bytes: data[at..].to_vec() },
            });
            break;
        }
        if data.len() - at < 8 {
            return Err(RestoreError::MalformedContainer(format!(
                "truncated box header at offset {}",
                base_offset + at as u64
            )));
        }
        let size32 = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let typ: FourCC = [data[at + 4], data[at + 5], data[at + 6], data[at + 7]];

        let (header_len, total, large, to_eof) = match size32 {
            0 => (8usize, (data.len() - at) as u64, false, true),
            1 => {
                if data.len() - at < 16 {
                    return Err(RestoreError::MalformedContainer(
                        "truncated 64-bit box size".into(),
                    ));
                }
                let size64 = u64::from_be_bytes([
                    data[at + 8],
                    data[at + 9],
                    data[at + 10],
                    data[at + 11],
                    data[at + 12],
                    data[at + 13],
                    data[at + 14],
                    data[at + 15],
                ]);
                (16usize, size64, true, false)
            }
            s => (8usize, s as u64, false, false),
        };

        if total < header_len as u64 || at as u64 + total > data.len() as u64 {
            return Err(RestoreError::MalformedContainer(format!(
                "box `{}` size {total} runs past end of stream",
                fourcc_display(&typ)
            )));
        }

        let content = &data[at + header_len..at + total as usize];
        let orig_span = Some((base_offset + at as u64, total));

        let kind = if CONTAINERS.iter().any(|c| *c == &typ) {
            NodeKind::Container {
                header: Vec::new(),
                children: parse_box_list(
                    content,
                    base_offset + (at + header_len) as u64,
                    depth + 1,
                )?,
            }
        } else if &typ == b"meta" {
            parse_meta_content(content, base_offset + (at + header_len) as u64, depth)?
        } else {
            NodeKind::Leaf { payload: content.to_vec() }
        };

        boxes.push(BoxNode { typ, large, to_eof, orig_span, kind });
        at += total as usize;
    }
    Ok(boxes)
}

/// `meta` is a full box (4 bytes of version/flags before the children) in
/// ISO files but a plain container in classic QuickTime. Sniff by where
/// the mandatory `hdlr` child lands.
fn parse_meta_content(content: &[u8], base_offset: u64, depth: usize) -> Result<NodeKind> {
    let qt_style = content.len() >= 8 && &content[4..8] == b"hdlr";
    let header_len = if qt_style { 0 } else { 4 };
    if content.len() < header_len {
        return Err(RestoreError::MalformedContainer("meta box too short".into()));
    }
    Ok(NodeKind::Container {
        header: content[..header_len].to_vec(),
        children: parse_box_list(
            &content[header_len..],
            base_offset + header_len as u64,
            depth + 1,
        )?,
    })
}

/// Re-serialize a top-level box list with all sizes recomputed.
pub fn serialize_boxes(boxes: &[BoxNode]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, b) in boxes.iter().enumerate() {
        b.write_into(&mut out, i == boxes.len() - 1);
    }
    out
}

/// New start offset of every top-level box after mutation, paired with its
/// original span. Used to re-base absolute file offsets stored inside
/// payloads (`stco`, `iloc`).
pub fn top_level_shifts(boxes: &[BoxNode]) -> Vec<(Option<(u64, u64)>, u64)> {
    let mut shifts = Vec::with_capacity(boxes.len());
    let mut at = 0u64;
    for b in boxes {
        shifts.push((b.orig_span, at));
        at += b.total_size();
    }
    shifts
}

/// Map an absolute offset in the original file to the offset of the same
/// byte after mutation, using the top-level shift table. Offsets that fall
/// outside every known original box are returned unchanged.
pub fn rebase_offset(shifts: &[(Option<(u64, u64)>, u64)], offset: u64) -> u64 {
    for (span, new_start) in shifts {
        if let Some((old_start, size)) = span {
            if offset >= *old_start && offset < old_start + size {
                return new_start + (offset - old_start);
            }
        }
    }
    offset
}

pub fn fourcc_display(typ: &FourCC) -> String {
    typ.iter().map(|&b| if b.is_ascii_graphic() { b as char } else { '.' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_box(typ: &FourCC, payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(typ);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn flat_boxes_round_trip() {
        let mut data = raw_box(b"ftyp", b"isom\x00\x00\x00\x00mp41");
        data.extend_from_slice(&raw_box(b"mdat", &[1, 2, 3, 4, 5]));

        let boxes = parse_boxes(&data).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(&boxes[0].typ, b"ftyp");
        assert_eq!(boxes[1].payload().unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn container_recursion_and_size_recompute() {
        let stco = raw_box(b"stco", &[0u8; 8]);
        let stbl = raw_box(b"stbl", &stco);
        let minf = raw_box(b"minf", &stbl);
        let mdia = raw_box(b"mdia", &minf);
        let trak = raw_box(b"trak", &mdia);
        let moov = raw_box(b"moov", &trak);

        let mut boxes = parse_boxes(&moov).unwrap();
        assert_eq!(serialize_boxes(&boxes), moov);

        // Grow a deeply nested leaf; every ancestor size must follow.
        let node = boxes[0]
            .child_mut(b"trak")
            .unwrap()
            .child_mut(b"mdia")
            .unwrap()
            .child_mut(b"minf")
            .unwrap()
            .child_mut(b"stbl")
            .unwrap()
            .child_mut(b"stco")
            .unwrap();
        if let NodeKind::Leaf { payload } = &mut node.kind {
            payload.extend_from_slice(&[0u8; 12]);
        }

        let out = serialize_boxes(&boxes);
        assert_eq!(out.len(), moov.len() + 12);
        let reparsed = parse_boxes(&out).unwrap();
        assert_eq!(reparsed[0].total_size() as usize, out.len());
    }

    #[test]
    fn large_box_encoding_is_preserved() {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&24u64.to_be_bytes());
        data.extend_from_slice(&[9u8; 8]);

        let boxes = parse_boxes(&data).unwrap();
        assert!(boxes[0].large);
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn to_eof_box_is_preserved_when_last() {
        let mut data = raw_box(b"ftyp", b"qt  \x00\x00\x00\x00");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[7u8; 16]);

        let boxes = parse_boxes(&data).unwrap();
        assert!(boxes[1].to_eof);
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn iso_meta_fullbox_header_is_kept() {
        let hdlr = raw_box(b"hdlr", &[0u8; 24]);
        let mut meta_payload = vec![0, 0, 0, 0]; // version/flags
        meta_payload.extend_from_slice(&hdlr);
        let data = raw_box(b"meta", &meta_payload);

        let boxes = parse_boxes(&data).unwrap();
        match &boxes[0].kind {
            NodeKind::Container { header, children } => {
                assert_eq!(header, &[0, 0, 0, 0]);
                assert_eq!(&children[0].typ, b"hdlr");
            }
            _ => panic!("meta should parse as container"),
        }
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn quicktime_meta_without_fullbox_header() {
        let hdlr = raw_box(b"hdlr", &[0u8; 24]);
        let data = raw_box(b"meta", &hdlr);

        let boxes = parse_boxes(&data).unwrap();
        match &boxes[0].kind {
            NodeKind::Container { header, children } => {
                assert!(header.is_empty());
                assert_eq!(&children[0].typ, b"hdlr");
            }
            _ => panic!("meta should parse as container"),
        }
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn udta_zero_terminator_round_trips() {
        // Classic QuickTime udta: one text atom then a bare 32-bit zero.
        let day = raw_box(b"\xa9day", &[0, 4, 0x15, 0xC7, b'2', b'0', b'2', b'0']);
        let mut udta_payload = day;
        udta_payload.extend_from_slice(&[0, 0, 0, 0]);
        let data = raw_box(b"udta", &udta_payload);

        let boxes = parse_boxes(&data).unwrap();
        let children = boxes[0].children();
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1].kind, NodeKind::Raw { bytes } if bytes == &[0, 0, 0, 0]));
        assert_eq!(serialize_boxes(&boxes), data);
    }

    #[test]
    fn oversized_box_is_malformed() {
        let mut data = 100u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            parse_boxes(&data),
            Err(RestoreError::MalformedContainer(_))
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert!(parse_boxes(&[0, 0, 0]).is_err());
    }

    #[test]
    fn offset_rebasing_follows_box_moves() {
        let ftyp = raw_box(b"ftyp", b"isom\x00\x00\x00\x00");
        let moov = raw_box(b"moov", &raw_box(b"udta", &[]));
        let mdat = raw_box(b"mdat", &[1, 2, 3, 4]);
        let mut data = ftyp.clone();
        data.extend_from_slice(&moov);
        data.extend_from_slice(&mdat);

        let mut boxes = parse_boxes(&data).unwrap();
        // Grow udta by 10 bytes — mdat shifts right by 10.
        let udta = boxes[1].child_mut(b"udta").unwrap();
        udta.children_mut()
            .unwrap()
            .push(BoxNode::leaf(*b"\xa9day", vec![0, 0]));

        let shifts = top_level_shifts(&boxes);
        let old_mdat_payload = (ftyp.len() + moov.len() + 8) as u64;
        assert_eq!(rebase_offset(&shifts, old_mdat_payload), old_mdat_payload + 10);
        // Offsets inside ftyp do not move.
        assert_eq!(rebase_offset(&shifts, 4), 4);
    }
}
