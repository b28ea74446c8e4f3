use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::reader::EXIF_PREFIX;
use super::{MetadataKey, PromptMetadata};
use crate::error::{ConvertError, Result};

// IFD0 tags used by ComfyUI for WEBP metadata
const TAG_PROMPT: u16 = 0x0110; // Model
const TAG_WORKFLOW: u16 = 0x010F; // Make
const TAG_EXTRA_FIRST: u16 = 0x010E; // ImageDescription, then downwards
// 0x010A is FillOrder (SHORT); expanded members stop above it
const TAG_EXTRA_LAST: u16 = 0x010B;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// The WEBP EXIF chunk holds just the TIFF data
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

// VP8X flag bits
const VP8X_ALPHA: u8 = 0x10;
const VP8X_EXIF: u8 = 0x08;
const VP8L_SIGNATURE: u8 = 0x2F;
const VP8_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

/// How `extra_pnginfo` is laid out in the EXIF block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraLayout {
    /// One `extra_pnginfo:<text>` entry holding the PNG text byte-for-byte.
    #[default]
    Verbatim,
    /// One `<member>:<value>` entry per member of the JSON object, at
    /// descending tags from ImageDescription.
    Expand,
}

/// Store prompt metadata in the EXIF chunk of an encoded WEBP.
///
/// Returns the WEBP unchanged when `metadata` is empty. Otherwise any existing
/// EXIF chunk is replaced, and a simple-format file is promoted to the extended
/// (`VP8X`) format so the chunk is legal.
pub fn embed_metadata(
    webp: Vec<u8>,
    metadata: &PromptMetadata,
    layout: ExtraLayout,
) -> Result<Vec<u8>> {
    if metadata.is_empty() {
        return Ok(webp);
    }

    let entries = exif_entries(metadata, layout);
    let tiff = build_exif(&entries).map_err(|e| write_err(format!("EXIF: {e}")))?;
    let output = set_exif_chunk(&webp, &tiff).map_err(|e| write_err(format!("RIFF: {e}")))?;

    log::debug!("Embedded {} EXIF entries ({} bytes)", entries.len(), tiff.len());
    Ok(output)
}

// The destination is filled in by the driver via `ConvertError::at`.
fn write_err(reason: String) -> ConvertError {
    ConvertError::write(Path::new(""), reason)
}

/// `(tag, "key:value")` pairs in the ComfyUI layout.
fn exif_entries(metadata: &PromptMetadata, layout: ExtraLayout) -> Vec<(u16, String)> {
    let mut entries = Vec::new();

    if let Some(prompt) = metadata.get(MetadataKey::Prompt) {
        entries.push((TAG_PROMPT, format!("prompt:{prompt}")));
    }
    if let Some(workflow) = metadata.get(MetadataKey::Workflow) {
        entries.push((TAG_WORKFLOW, format!("workflow:{workflow}")));
    }

    if let Some(extra) = metadata.get(MetadataKey::ExtraPngInfo) {
        let expanded = match layout {
            ExtraLayout::Verbatim => None,
            ExtraLayout::Expand => expand_members(extra),
        };
        match expanded {
            Some(members) => {
                let mut tag = TAG_EXTRA_FIRST;
                for (key, value) in members {
                    if tag < TAG_EXTRA_LAST {
                        log::warn!("extra_pnginfo member {key:?} has no free EXIF tag left, dropped");
                        continue;
                    }
                    entries.push((tag, format!("{key}:{value}")));
                    tag -= 1;
                }
            }
            None => entries.push((TAG_EXTRA_FIRST, format!("extra_pnginfo:{extra}"))),
        }
    }

    entries
}

/// Members of a JSON object as `(key, text)`. Strings are written raw, any
/// other value as compact JSON. `None` if the text is not a JSON object.
fn expand_members(text: &str) -> Option<Vec<(String, String)>> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Some(
            map.into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect(),
        ),
        _ => {
            log::warn!("extra_pnginfo is not a JSON object, storing it verbatim");
            None
        }
    }
}

/// Build a TIFF structure with one IFD0 ASCII tag per entry. Values are
/// stored as their UTF-8 bytes plus a NUL.
fn build_exif(entries: &[(u16, String)]) -> std::result::Result<Vec<u8>, String> {
    let mut metadata = Metadata::new();
    for (tag_id, value) in entries {
        metadata.set_tag(string_tag(*tag_id, value.clone()));
    }

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        return Err("empty EXIF block".to_string());
    }
    Ok(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())
}

fn string_tag(tag_id: u16, value: String) -> ExifTag {
    match tag_id {
        TAG_PROMPT => ExifTag::Model(value),
        TAG_WORKFLOW => ExifTag::Make(value),
        TAG_EXTRA_FIRST => ExifTag::ImageDescription(value),
        other => ExifTag::UnknownSTRING(value, other, ExifTagGroup::IFD0),
    }
}

// ============================================================================
// RIFF container
// ============================================================================

struct RiffChunk<'a> {
    id: [u8; 4],
    payload: std::borrow::Cow<'a, [u8]>,
}

/// Replace the EXIF chunk of a WEBP, promoting it to VP8X if needed. The
/// chunk holds `Exif\0\0` followed by the TIFF data, as ComfyUI writes it.
fn set_exif_chunk(webp: &[u8], exif: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut chunks = parse_riff(webp)?;
    chunks.retain(|c| &c.id != b"EXIF");

    let first_id = chunks.first().ok_or("no image chunk")?.id;
    match &first_id {
        b"VP8X" => {
            let mut vp8x = chunks[0].payload.to_vec();
            if vp8x.len() < 10 {
                return Err("truncated VP8X chunk".to_string());
            }
            vp8x[0] |= VP8X_EXIF;
            chunks[0].payload = vp8x.into();
        }
        b"VP8 " | b"VP8L" => {
            let (width, height, alpha) = bitstream_info(&first_id, &chunks[0].payload)?;
            let mut vp8x = vec![0u8; 10];
            vp8x[0] = VP8X_EXIF | if alpha { VP8X_ALPHA } else { 0 };
            vp8x[4..7].copy_from_slice(&(width - 1).to_le_bytes()[..3]);
            vp8x[7..10].copy_from_slice(&(height - 1).to_le_bytes()[..3]);
            chunks.insert(
                0,
                RiffChunk {
                    id: *b"VP8X",
                    payload: vp8x.into(),
                },
            );
        }
        other => {
            return Err(format!(
                "unexpected first chunk {:?}",
                String::from_utf8_lossy(other)
            ));
        }
    }

    // EXIF goes after the image data and before XMP
    let mut payload = Vec::with_capacity(EXIF_PREFIX.len() + exif.len());
    payload.extend_from_slice(EXIF_PREFIX);
    payload.extend_from_slice(exif);
    let exif_chunk = RiffChunk {
        id: *b"EXIF",
        payload: payload.into(),
    };
    match chunks.iter().position(|c| &c.id == b"XMP ") {
        Some(pos) => chunks.insert(pos, exif_chunk),
        None => chunks.push(exif_chunk),
    }

    Ok(encode_riff(&chunks))
}

fn parse_riff(data: &[u8]) -> std::result::Result<Vec<RiffChunk<'_>>, String> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return Err("not a RIFF WEBP file".to_string());
    }
    let riff_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let end = (riff_size + 8).min(data.len());

    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= end {
        let id = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let size =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;
        let start = pos + 8;
        let payload = data
            .get(start..start + size)
            .ok_or_else(|| format!("chunk {:?} extends past end", String::from_utf8_lossy(&id)))?;
        chunks.push(RiffChunk {
            id,
            payload: payload.into(),
        });
        pos = start + size + (size & 1);
    }
    Ok(chunks)
}

fn encode_riff(chunks: &[RiffChunk<'_>]) -> Vec<u8> {
    let body_len: usize = chunks
        .iter()
        .map(|c| 8 + c.payload.len() + (c.payload.len() & 1))
        .sum();

    let mut out = Vec::with_capacity(12 + body_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((4 + body_len) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    for chunk in chunks {
        out.extend_from_slice(&chunk.id);
        out.extend_from_slice(&(chunk.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&chunk.payload);
        if chunk.payload.len() % 2 != 0 {
            out.push(0);
        }
    }
    out
}

/// Canvas size and alpha flag from a simple-format bitstream header.
fn bitstream_info(id: &[u8; 4], payload: &[u8]) -> std::result::Result<(u32, u32, bool), String> {
    if id == b"VP8L" {
        if payload.len() < 5 || payload[0] != VP8L_SIGNATURE {
            return Err("bad VP8L header".to_string());
        }
        let bits = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
        let width = (bits & 0x3FFF) + 1;
        let height = ((bits >> 14) & 0x3FFF) + 1;
        let alpha = (bits >> 28) & 1 == 1;
        Ok((width, height, alpha))
    } else {
        if payload.len() < 10 || payload[3..6] != VP8_START_CODE {
            return Err("bad VP8 header".to_string());
        }
        let width = u16::from_le_bytes([payload[6], payload[7]]) as u32 & 0x3FFF;
        let height = u16::from_le_bytes([payload[8], payload[9]]) as u32 & 0x3FFF;
        if width == 0 || height == 0 {
            return Err("zero-sized VP8 frame".to_string());
        }
        Ok((width, height, false))
    }
}
