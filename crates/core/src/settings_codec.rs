//! Generation settings embedded in PNG artifacts.
//!
//! Settings travel as a `tEXt` chunk (`keyword NUL json`) inserted right
//! before `IEND`, so dropping a generated file back into the system
//! restores the configuration that produced it. Non-PNG buffers pass
//! through untouched and malformed chunk streams read as "no metadata".

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Keyword identifying our settings chunk.
pub const SETTINGS_KEYWORD: &str = "generation-settings";

const TEXT_CHUNK: &[u8; 4] = b"tEXt";
const END_CHUNK: &[u8; 4] = b"IEND";

/// Length + type + CRC.
const CHUNK_OVERHEAD: usize = 12;

// ---------------------------------------------------------------------------
// CRC-32 (reflected, polynomial 0xEDB88320)
// ---------------------------------------------------------------------------

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// CRC-32 over the concatenation of `parts`.
pub fn crc32(parts: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for part in parts {
        for &byte in *part {
            crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
    }
    crc ^ 0xFFFF_FFFF
}

// ---------------------------------------------------------------------------
// Chunk walking
// ---------------------------------------------------------------------------

/// A chunk located inside a PNG buffer.
struct Chunk<'a> {
    /// Offset of the length field.
    start: usize,
    /// Offset one past the CRC.
    end: usize,
    kind: &'a [u8],
    data: &'a [u8],
    crc: u32,
}

impl Chunk<'_> {
    fn crc_ok(&self) -> bool {
        crc32(&[self.kind, self.data]) == self.crc
    }
}

/// Walk chunks from offset 8. Returns `None` if the stream is truncated
/// or the buffer is not a PNG.
fn walk_chunks(png: &[u8]) -> Option<Vec<Chunk<'_>>> {
    if !is_png(png) {
        return None;
    }
    let mut chunks = Vec::new();
    let mut offset = PNG_SIGNATURE.len();
    while offset < png.len() {
        let header = png.get(offset..offset + 8)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let end = offset
            .checked_add(CHUNK_OVERHEAD)?
            .checked_add(length)?;
        if end > png.len() {
            return None;
        }
        let data_start = offset + 8;
        let crc_bytes = &png[data_start + length..end];
        let chunk = Chunk {
            start: offset,
            end,
            kind: &header[4..8],
            data: &png[data_start..data_start + length],
            crc: u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]),
        };
        let is_end = chunk.kind == END_CHUNK;
        chunks.push(chunk);
        if is_end {
            break;
        }
        offset = end;
    }
    Some(chunks)
}

fn settings_payload<'a>(chunk: &Chunk<'a>) -> Option<&'a [u8]> {
    if chunk.kind != TEXT_CHUNK {
        return None;
    }
    let nul = chunk.data.iter().position(|&b| b == 0)?;
    if &chunk.data[..nul] != SETTINGS_KEYWORD.as_bytes() {
        return None;
    }
    Some(&chunk.data[nul + 1..])
}

/// Serialize one chunk in standard layout.
pub fn encode_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CHUNK_OVERHEAD);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(&[kind.as_slice(), data]).to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Whether the buffer starts with the PNG signature.
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Embed `settings` before `IEND`, replacing any previous settings chunk.
///
/// Returns the input unchanged when it is not a PNG, the chunk stream is
/// malformed, or no `IEND` chunk exists.
pub fn embed_settings(png: &[u8], settings: &serde_json::Value) -> Vec<u8> {
    let Some(chunks) = walk_chunks(png) else {
        return png.to_vec();
    };
    let Some(iend) = chunks.iter().find(|c| c.kind == END_CHUNK) else {
        return png.to_vec();
    };

    let mut payload = SETTINGS_KEYWORD.as_bytes().to_vec();
    payload.push(0);
    payload.extend_from_slice(settings.to_string().as_bytes());
    let new_chunk = encode_chunk(TEXT_CHUNK, &payload);

    let mut out = Vec::with_capacity(png.len() + new_chunk.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    for chunk in &chunks {
        if settings_payload(chunk).is_some() {
            continue;
        }
        if chunk.start == iend.start {
            out.extend_from_slice(&new_chunk);
        }
        out.extend_from_slice(&png[chunk.start..chunk.end]);
    }
    out
}

/// Extract embedded settings. Any malformation yields `None`.
pub fn extract_settings(png: &[u8]) -> Option<serde_json::Value> {
    let chunks = walk_chunks(png)?;
    chunks
        .iter()
        .filter(|c| c.crc_ok())
        .find_map(settings_payload)
        .and_then(|payload| serde_json::from_slice(payload).ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
