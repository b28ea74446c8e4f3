use flate2::read::ZlibDecoder;
use img_parts::png::{Png, PngChunk};
use img_parts::Bytes;
use img_parts::webp::{CHUNK_EXIF, WebP};
use std::io::Read;
use std::path::Path;

use super::{MetadataKey, PromptMetadata};
use crate::error::{ConvertError, Result};

const CHUNK_TEXT: [u8; 4] = *b"tEXt";
const CHUNK_ZTXT: [u8; 4] = *b"zTXt";
const CHUNK_ITXT: [u8; 4] = *b"iTXt";

// Upper bound for a decompressed text chunk
const MAX_INFLATED_TEXT: u64 = 64 * 1024 * 1024;

pub(super) const EXIF_PREFIX: &[u8] = b"Exif\0\0";

// TIFF field types accepted as text
const TIFF_BYTE: u16 = 1;
const TIFF_ASCII: u16 = 2;
const TIFF_UNDEFINED: u16 = 7;

/// Read the recognized text fields from a PNG file.
pub fn read_png_metadata(path: &Path) -> Result<PromptMetadata> {
    let bytes = read_file(path)?;
    png_metadata_from_bytes(&bytes)
}

/// Read the recognized text fields from PNG bytes.
///
/// Every `tEXt`, `zTXt` and `iTXt` chunk is considered, before and after the
/// image data. A keyword that appears more than once keeps its last value.
/// Malformed text chunks are skipped with a warning.
pub fn png_metadata_from_bytes(bytes: &[u8]) -> Result<PromptMetadata> {
    let png = Png::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| ConvertError::decode(format!("not a valid PNG: {e}")))?;

    let mut metadata = PromptMetadata::new();
    for chunk in png.chunks() {
        let decoded = match chunk.kind() {
            CHUNK_TEXT => decode_text(chunk),
            CHUNK_ZTXT => decode_ztxt(chunk),
            CHUNK_ITXT => decode_itxt(chunk),
            _ => continue,
        };

        let (keyword, text) = match decoded {
            Ok(pair) => pair,
            Err(reason) => {
                log::warn!(
                    "Skipping malformed {} chunk: {reason}",
                    String::from_utf8_lossy(&chunk.kind())
                );
                continue;
            }
        };

        match MetadataKey::from_keyword(&keyword) {
            Some(key) => {
                if metadata.insert(key, text).is_some() {
                    log::debug!("Duplicate {key} text chunk, keeping the last one");
                }
            }
            None => log::debug!("Ignoring text chunk {keyword:?}"),
        }
    }

    Ok(metadata)
}

/// `keyword NUL text`, Latin-1.
fn decode_text(chunk: &PngChunk) -> std::result::Result<(String, String), String> {
    let (keyword, rest) = split_keyword(chunk.contents())?;
    Ok((keyword, latin1(rest)))
}

/// `keyword NUL method zlib-data`, Latin-1 once inflated.
fn decode_ztxt(chunk: &PngChunk) -> std::result::Result<(String, String), String> {
    let (keyword, rest) = split_keyword(chunk.contents())?;
    let (&method, compressed) = rest.split_first().ok_or("missing compression method")?;
    if method != 0 {
        return Err(format!("unknown compression method {method}"));
    }
    let text = inflate(compressed)?;
    Ok((keyword, latin1(&text)))
}

/// `keyword NUL flag method language NUL translated NUL text`, UTF-8.
fn decode_itxt(chunk: &PngChunk) -> std::result::Result<(String, String), String> {
    let (keyword, rest) = split_keyword(chunk.contents())?;
    if rest.len() < 2 {
        return Err("truncated iTXt header".to_string());
    }
    let (compressed, method) = (rest[0], rest[1]);
    let rest = &rest[2..];

    // language tag, then translated keyword
    let lang_end = find_nul(rest).ok_or("missing language tag terminator")?;
    let rest = &rest[lang_end + 1..];
    let translated_end = find_nul(rest).ok_or("missing translated keyword terminator")?;
    let raw = &rest[translated_end + 1..];

    let text = match (compressed, method) {
        (0, _) => raw.to_vec(),
        (1, 0) => inflate(raw)?,
        (1, m) => return Err(format!("unknown compression method {m}")),
        (f, _) => return Err(format!("invalid compression flag {f}")),
    };

    let text = String::from_utf8(text).map_err(|e| format!("text is not UTF-8: {e}"))?;
    Ok((keyword, text))
}

fn split_keyword(data: &[u8]) -> std::result::Result<(String, &[u8]), String> {
    let end = find_nul(data).ok_or("missing keyword terminator")?;
    if end == 0 || end > 79 {
        return Err(format!("invalid keyword length {end}"));
    }
    Ok((latin1(&data[..end]), &data[end + 1..]))
}

fn find_nul(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == 0)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn inflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(MAX_INFLATED_TEXT)
        .read_to_end(&mut out)
        .map_err(|e| format!("zlib stream: {e}"))?;
    Ok(out)
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::NotFound(path.to_path_buf()),
        _ => ConvertError::decode(format!("failed to read {}: {e}", path.display())),
    })
}

// ============================================================================
// WEBP side
// ============================================================================

/// Metadata found in a WEBP's EXIF chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebpMetadata {
    /// Entries whose prefix is one of the recognized keys. When a key appears
    /// under more than one tag, the highest tag wins, so `prompt` at Model
    /// and `workflow` at Make take precedence over same-named members of an
    /// expanded `extra_pnginfo`.
    pub metadata: PromptMetadata,
    /// Any other `key:value` entries, in descending tag order. This is where
    /// the members of an expanded `extra_pnginfo` end up, including members
    /// shadowed by a higher tag.
    pub other: Vec<(String, String)>,
}

impl WebpMetadata {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.other.is_empty()
    }
}

/// Read prompt metadata back from a WEBP file.
pub fn read_webp_metadata(path: &Path) -> Result<WebpMetadata> {
    let bytes = read_file(path)?;
    webp_metadata_from_bytes(&bytes)
}

/// Read prompt metadata back from WEBP bytes. A WEBP without an EXIF chunk
/// has empty metadata.
///
/// The chunk may hold the TIFF data as is or behind an `Exif\0\0` header;
/// writers differ.
pub fn webp_metadata_from_bytes(bytes: &[u8]) -> Result<WebpMetadata> {
    let webp = WebP::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| ConvertError::decode(format!("not a valid WEBP: {e}")))?;

    let Some(exif) = webp.chunk_by_id(CHUNK_EXIF).and_then(|c| c.content().data()) else {
        return Ok(WebpMetadata::default());
    };
    let tiff = exif.strip_prefix(EXIF_PREFIX).unwrap_or(&exif[..]);

    let mut tagged: Vec<(u16, String)> = ifd0_text_entries(tiff)
        .map_err(|e| ConvertError::decode(format!("malformed EXIF: {e}")))?;
    tagged.sort_by(|a, b| b.0.cmp(&a.0));

    let mut result = WebpMetadata::default();
    for (_, value) in tagged {
        let Some((key, text)) = value.split_once(':') else {
            continue;
        };
        match MetadataKey::from_keyword(key) {
            Some(k) if !result.metadata.contains(k) => {
                result.metadata.insert(k, text);
            }
            Some(k) => {
                log::debug!("{k} already read from a higher tag, keeping that one");
                result.other.push((key.to_string(), text.to_string()));
            }
            None => result.other.push((key.to_string(), text.to_string())),
        }
    }

    Ok(result)
}

/// Collect `(tag, text)` for every text-like IFD0 entry of a TIFF structure.
fn ifd0_text_entries(tiff: &[u8]) -> std::result::Result<Vec<(u16, String)>, String> {
    let big_endian = match tiff.get(0..2) {
        Some(b"MM") => true,
        Some(b"II") => false,
        _ => return Err("invalid TIFF byte order".to_string()),
    };

    let read_u16 = |offset: usize| -> Option<u16> {
        let b = tiff.get(offset..offset + 2)?;
        Some(if big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    };
    let read_u32 = |offset: usize| -> Option<u32> {
        let b = tiff.get(offset..offset + 4)?;
        Some(if big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    };

    let ifd0_offset = read_u32(4).ok_or("TIFF header too short")? as usize;
    let count = read_u16(ifd0_offset).ok_or("IFD0 offset out of bounds")? as usize;
    let entries_start = ifd0_offset + 2;

    let mut entries = Vec::new();
    for i in 0..count {
        let eo = entries_start + i * 12;
        let (Some(tag), Some(format), Some(len)) = (read_u16(eo), read_u16(eo + 2), read_u32(eo + 4))
        else {
            return Err("IFD0 entries extend beyond TIFF data".to_string());
        };
        if !matches!(format, TIFF_ASCII | TIFF_BYTE | TIFF_UNDEFINED) {
            continue;
        }

        let len = len as usize;
        let data = if len <= 4 {
            tiff.get(eo + 8..eo + 8 + len)
        } else {
            let offset = read_u32(eo + 8).ok_or("truncated IFD entry")? as usize;
            tiff.get(offset..offset.saturating_add(len))
        };
        let Some(data) = data else {
            log::debug!("EXIF tag {tag:#06x} points outside the TIFF data");
            continue;
        };

        let trimmed = match data.iter().rposition(|&b| b != 0) {
            Some(last) => &data[..=last],
            None => &[][..],
        };
        if let Ok(text) = std::str::from_utf8(trimmed) {
            entries.push((tag, text.to_string()));
        }
    }

    Ok(entries)
}
