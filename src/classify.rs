//! Coarse content classification from magic numbers and a text heuristic

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{Filter, FilterChain, DEFAULT_PRESET};
use crate::config::MIB;
use crate::error::AdvisorError;

/// Bytes examined by the text heuristic.
const TEXT_WINDOW: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentCategory {
    Unknown,
    Text,
    Binary,
    Executable,
    Image,
    Audio,
    Video,
    Archive,
    Database,
}

const IMAGE_SIGNATURES: &[&[u8]] = &[b"\x89PNG", b"\xFF\xD8\xFF", b"GIF87a", b"GIF89a"];
const EXECUTABLE_SIGNATURES: &[&[u8]] = &[b"\x7FELF", b"MZ"];
const ARCHIVE_SIGNATURES: &[&[u8]] = &[b"PK\x03\x04", b"ustar"];

fn has_signature(data: &[u8], signatures: &[&[u8]]) -> bool {
    signatures.iter().any(|sig| data.starts_with(sig))
}

fn is_printable_or_space(b: u8) -> bool {
    matches!(b, 0x20..=0x7E | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

fn looks_like_text(data: &[u8]) -> bool {
    let window = &data[..data.len().min(TEXT_WINDOW)];
    if window.is_empty() || window.contains(&0) {
        return false;
    }
    let printable = window.iter().filter(|&&b| is_printable_or_space(b)).count();
    printable * 100 / window.len() > 90
}

/// Classify a sample. Signatures win over the text heuristic; an empty
/// sample is always `Unknown`.
pub fn classify(data: &[u8]) -> ContentCategory {
    if data.is_empty() {
        return ContentCategory::Unknown;
    }
    if has_signature(data, IMAGE_SIGNATURES) {
        ContentCategory::Image
    } else if has_signature(data, EXECUTABLE_SIGNATURES) {
        ContentCategory::Executable
    } else if has_signature(data, ARCHIVE_SIGNATURES) {
        ContentCategory::Archive
    } else if looks_like_text(data) {
        ContentCategory::Text
    } else {
        ContentCategory::Binary
    }
}

/// Classify a file from its first `header_len` bytes.
pub fn classify_file(path: impl AsRef<Path>, header_len: usize) -> Result<ContentCategory, AdvisorError> {
    let mut header = Vec::with_capacity(header_len);
    File::open(path)?
        .take(header_len as u64)
        .read_to_end(&mut header)?;
    Ok(classify(&header))
}

/// Default codec settings for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    pub preset: u32,
    /// `None` leaves the dictionary size to the preset.
    pub dict_size: Option<u32>,
    pub filters: FilterChain,
}

pub fn settings_for(category: ContentCategory) -> CategorySettings {
    let (preset, dict_size) = match category {
        ContentCategory::Text => (7, Some(8 * MIB as u32)),
        ContentCategory::Executable => (6, Some(16 * MIB as u32)),
        ContentCategory::Image => (3, Some(4 * MIB as u32)),
        ContentCategory::Archive => (6, Some(8 * MIB as u32)),
        _ => (DEFAULT_PRESET, None),
    };
    let filters = match category {
        ContentCategory::Executable => FilterChain::with_branch(Filter::X86, dict_size),
        _ => FilterChain::lzma2(dict_size),
    };
    CategorySettings {
        preset,
        dict_size,
        filters,
    }
}
