//! Container format detection.
//!
//! The extension is the primary signal; the file's leading bytes are
//! checked against the expected container magic so that a mislabeled file
//! is skipped instead of corrupted — writing EXIF structures into a file
//! that is not actually JPEG would destroy it.

use std::path::Path;

use crate::error::{RestoreError, Result};

/// Container family of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Jpeg,
    Heic,
    QuickTimeMp4,
    Unsupported,
}

impl ContainerFormat {
    /// Classify by file extension alone, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "heic" => Self::Heic,
            "mov" | "mp4" => Self::QuickTimeMp4,
            _ => Self::Unsupported,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Heic => "HEIC",
            Self::QuickTimeMp4 => "QuickTime/MP4",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether `head` (the file's leading bytes) carries this container's
    /// magic.
    fn matches_signature(&self, head: &[u8]) -> bool {
        match self {
            Self::Jpeg => head.starts_with(&[0xFF, 0xD8]),
            Self::Heic => is_heic_signature(head),
            Self::QuickTimeMp4 => is_mp4_signature(head),
            Self::Unsupported => false,
        }
    }
}

const HEIC_BRANDS: [&[u8; 4]; 4] = [b"heic", b"heix", b"mif1", b"msf1"];

fn is_heic_signature(head: &[u8]) -> bool {
    if head.len() < 12 || &head[4..8] != b"ftyp" {
        return false;
    }
    if HEIC_BRANDS.iter().any(|b| &head[8..12] == *b) {
        return true;
    }
    // Major brand unrecognized; scan the compatible-brand list inside ftyp.
    let box_size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
    let end = box_size.min(head.len());
    if end <= 16 {
        return false;
    }
    head[16..end]
        .chunks_exact(4)
        .any(|b| HEIC_BRANDS.iter().any(|hb| b == *hb))
}

fn is_mp4_signature(head: &[u8]) -> bool {
    if head.len() < 8 {
        return false;
    }
    matches!(&head[4..8], b"ftyp" | b"moov" | b"free" | b"wide" | b"mdat" | b"skip")
}

/// Classify `path` and confirm its byte signature agrees with the
/// extension.
///
/// Unsupported extensions pass through as [`ContainerFormat::Unsupported`]
/// without touching the file. A disagreement between extension and magic
/// is a [`RestoreError::FormatMismatch`].
pub fn detect_validated(path: &Path) -> Result<ContainerFormat> {
    let format = ContainerFormat::from_path(path);
    if format == ContainerFormat::Unsupported {
        return Ok(format);
    }

    let head = read_head(path, 64)?;
    if format.matches_signature(&head) {
        Ok(format)
    } else {
        log::debug!(
            "{}: leading bytes do not look like {}",
            path.display(),
            format.name()
        );
        Err(RestoreError::FormatMismatch { path: path.to_path_buf(), expected: format.name() })
    }
}

fn read_head(path: &Path, n: usize) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; n];
    let mut read = 0;
    loop {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(k) => read += k,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if read == n {
            break;
        }
    }
    buf.truncate(read);
    Ok(buf)
}
