//! Container codecs.
//!
//! One codec per container family, sharing two building blocks: the
//! TIFF/IFD document ([`tiff`]) used by both JPEG and HEIC, and the
//! length-prefixed box tree ([`bmff`]) used by both HEIC and MP4/MOV.
//! Each codec takes the whole file's bytes plus a [`MetadataRecord`] and
//! returns the complete replacement byte stream; committing it to disk is
//! the Write Engine's job.

pub mod bmff;
pub mod heic;
pub mod jpeg;
pub mod mp4;
pub mod tiff;

use crate::error::{RestoreError, Result};
use crate::format::ContainerFormat;
use crate::sidecar::MetadataRecord;

/// Run the codec for `format` over `bytes`.
pub fn embed(format: ContainerFormat, bytes: &[u8], record: &MetadataRecord) -> Result<Vec<u8>> {
    match format {
        ContainerFormat::Jpeg => jpeg::embed(bytes, record),
        ContainerFormat::Heic => heic::embed(bytes, record),
        ContainerFormat::QuickTimeMp4 => mp4::embed(bytes, record),
        ContainerFormat::Unsupported => Err(RestoreError::UnsupportedEncoding(
            "no codec for this container".into(),
        )),
    }
}
