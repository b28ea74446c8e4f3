//! # png2webp
//!
//! Batch PNG to WEBP converter that keeps ComfyUI generation metadata. The
//! `prompt`, `workflow` and `extra_pnginfo` text chunks of each PNG are copied
//! into the EXIF chunk of the WEBP, in the layout ComfyUI writes for its own
//! WEBP output, so the image can still be dropped back into ComfyUI.
//!
//! ## Quick Start
//!
//! The pipeline module handles the full walk → decode → encode → write flow:
//!
//! ```rust,no_run
//! use png2webp::config::Config;
//! use png2webp::pipeline::{collect_pngs, convert_batch, BatchSummary};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Load config from file (encoder settings, overwrite policy, etc.)
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!
//!     // Collect PNG files from paths (files or directories)
//!     let items = collect_pngs(&[PathBuf::from("./ComfyUI/output")], config.output.recursive);
//!
//!     let results = convert_batch(items, &config, |p| {
//!         if let Some(ref err) = p.result.error {
//!             eprintln!("[{}/{}] {}: {err}", p.index, p.total, p.result.source.display());
//!         }
//!     });
//!
//!     let summary = BatchSummary::from_results(&results);
//!     println!("{} converted, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The metadata and recode modules can be used on their own:
//!
//! ```rust,no_run
//! use png2webp::metadata::{embed_metadata, read_png_metadata, read_webp_metadata, ExtraLayout};
//! use png2webp::recode::{decode_png, encode_webp, EncodeParams};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("render.png")?;
//!
//!     // 1. Pull the prompt metadata out of the PNG text chunks
//!     let meta = read_png_metadata(Path::new("render.png"))?;
//!     println!("Keys: {:?}", meta.keys().collect::<Vec<_>>());
//!
//!     // 2. Re-encode the pixels
//!     let pixels = decode_png(&bytes)?;
//!     let webp = encode_webp(&pixels, &EncodeParams { lossless: true, ..Default::default() })?;
//!
//!     // 3. Store the metadata in the WEBP's EXIF chunk
//!     let webp = embed_metadata(webp, &meta, ExtraLayout::Verbatim)?;
//!     std::fs::write("render.webp", webp)?;
//!
//!     // 4. Read it back
//!     let back = read_webp_metadata(Path::new("render.webp"))?;
//!     assert_eq!(back.metadata, meta);
//!     Ok(())
//! }
//! ```
//!
//! ## EXIF Layout
//!
//! | PNG keyword | WEBP EXIF tag (IFD0) | Stored as |
//! |-------------|----------------------|-----------|
//! | `prompt` | `0x0110` Model | `prompt:<value>` |
//! | `workflow` | `0x010F` Make | `workflow:<value>` |
//! | `extra_pnginfo` | `0x010E` ImageDescription | `extra_pnginfo:<value>` |
//!
//! With [`ExtraLayout::Expand`](metadata::ExtraLayout::Expand) each member of
//! the `extra_pnginfo` JSON object gets its own tag instead, counting down
//! from `0x010E`.
//!
//! ## Modules
//!
//! - [`config`]: configuration types and loading/saving
//! - [`error`]: per-file error kinds
//! - [`metadata`]: PNG text chunk reading, WEBP EXIF writing and reading
//! - [`pipeline`]: input discovery, destination planning, and batch conversion
//! - [`recode`]: PNG decoding and WEBP encoding

pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod recode;
