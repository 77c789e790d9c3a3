//! # takeout-restore
//!
//! Restore photo/video capture metadata — timestamp, GPS position — from
//! exported JSON sidecar files back into the media files themselves, by
//! rewriting each file's native metadata structures: EXIF/TIFF inside
//! JPEG, the `Exif` item of HEIC's ISOBMFF box tree, and the user-data
//! atoms of MP4/MOV.
//!
//! Export pipelines strip capture metadata into sidecars shaped like
//! `IMG_0001.jpg.json` next to `IMG_0001.jpg`. This crate pairs each
//! sidecar back to its media file (tolerating the exporters' renaming
//! quirks), rewrites only the metadata-bearing region of the container,
//! and commits atomically — on any failure the original file is left
//! byte-for-byte intact.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use takeout_restore::config::RestoreConfig;
//! use takeout_restore::pipeline::run_batch;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RestoreConfig {
//!         root: "./takeout".into(),
//!         dry_run: false,
//!         ..RestoreConfig::default()
//!     };
//!
//!     let summary = run_batch(&config, CancellationToken::new()).await?;
//!     println!(
//!         "{} written, {} skipped, {} failed",
//!         summary.written, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Each stage is usable on its own:
//!
//! ```rust,no_run
//! use takeout_restore::codec;
//! use takeout_restore::format;
//! use takeout_restore::sidecar::{match_media_file, MetadataRecord};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let sidecar = Path::new("takeout/IMG_0001.jpg.json");
//!     let record = MetadataRecord::from_json(&std::fs::read_to_string(sidecar)?)?;
//!
//!     let media = match_media_file(sidecar, &record.title)?;
//!     let container = format::detect_validated(&media)?;
//!
//!     let original = std::fs::read(&media)?;
//!     let replacement = codec::embed(container, &original, &record)?;
//!     takeout_restore::write::commit(&media, &replacement, false)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Write Strategy |
//! |--------|---------------|
//! | JPEG (`.jpg`, `.jpeg`) | `DateTimeOriginal` + GPS IFD in the APP1/EXIF segment |
//! | HEIC (`.heic`) | `Exif` item (TIFF payload) in the `meta` box machinery |
//! | MP4/MOV (`.mp4`, `.mov`) | `©day`/`©xyz` user-data atoms + `mvhd` creation time |
//!
//! Anything else is reported and left untouched — no guessing, no
//! in-place mutation, no metadata invented for files without a sidecar.
//!
//! ## Modules
//!
//! - [`sidecar`] — sidecar JSON parsing and sidecar→media matching
//! - [`format`] — container detection (extension + byte signature)
//! - [`codec`] — the three container codecs and their shared TIFF/box-tree cores
//! - [`write`] — atomic commit engine (temp file + rename, dry-run aware)
//! - [`pipeline`] — batch orchestration, concurrency, cancellation
//! - [`config`] — run configuration
//! - [`error`] — the per-unit failure taxonomy

pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod sidecar;
pub mod write;
