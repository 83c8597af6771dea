//! GLB container validation.
//!
//! A GLB file is a 12-byte header (`glTF` magic, version, total
//! length) followed by 4-byte-aligned chunks, normally one JSON chunk
//! and one BIN chunk. This module checks the container layout of an
//! assembled buffer before it is handed to the parser, and backs the
//! `glb-info` inspection tool.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use thiserror::Error;

pub const GLB_MAGIC: [u8; 4] = *b"glTF";
pub const SUPPORTED_VERSION: u32 = 2;
pub const HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;

/// Chunk type tag for the JSON chunk (`b"JSON"` little-endian).
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// Chunk type tag for the binary chunk (`b"BIN\0"` little-endian).
pub const CHUNK_BIN: u32 = 0x004E_4942;

#[derive(Error, Debug)]
pub enum GlbError {
    #[error("buffer too small to hold a GLB header ({0} bytes)")]
    TooSmall(usize),

    #[error("invalid magic {0:?}, expected b\"glTF\"")]
    BadMagic([u8; 4]),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("declared length {declared} does not match buffer length {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("chunk at offset {offset} overruns the container")]
    ChunkOverrun { offset: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fixed 12-byte container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub length: u32,
}

impl Header {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, GlbError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != GLB_MAGIC {
            return Err(GlbError::BadMagic(magic));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SUPPORTED_VERSION {
            return Err(GlbError::UnsupportedVersion(version));
        }
        let length = reader.read_u32::<LittleEndian>()?;
        Ok(Self { version, length })
    }
}

/// One chunk's location inside the container. `offset` points at the
/// chunk payload, past the 8-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub kind: u32,
    pub offset: usize,
    pub length: usize,
}

impl ChunkInfo {
    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            CHUNK_JSON => "JSON",
            CHUNK_BIN => "BIN",
            _ => "unknown",
        }
    }
}

/// True when the buffer starts with the GLB magic. Plain-JSON `.gltf`
/// payloads skip container validation.
pub fn is_glb(buffer: &[u8]) -> bool {
    buffer.len() >= 4 && buffer[..4] == GLB_MAGIC
}

/// Validate the container layout of an assembled buffer and return the
/// chunk table.
pub fn validate(buffer: &[u8]) -> Result<Vec<ChunkInfo>, GlbError> {
    if buffer.len() < HEADER_SIZE {
        return Err(GlbError::TooSmall(buffer.len()));
    }
    let header = Header::read_from(&mut &buffer[..])?;
    if header.length as usize != buffer.len() {
        return Err(GlbError::LengthMismatch {
            declared: header.length,
            actual: buffer.len(),
        });
    }

    let mut chunks = Vec::new();
    let mut offset = HEADER_SIZE;
    while offset < buffer.len() {
        if offset + CHUNK_HEADER_SIZE > buffer.len() {
            return Err(GlbError::ChunkOverrun { offset });
        }
        let mut cursor = &buffer[offset..];
        let length = cursor.read_u32::<LittleEndian>()? as usize;
        let kind = cursor.read_u32::<LittleEndian>()?;
        let data_offset = offset + CHUNK_HEADER_SIZE;
        if data_offset + length > buffer.len() {
            return Err(GlbError::ChunkOverrun { offset });
        }
        chunks.push(ChunkInfo {
            kind,
            offset: data_offset,
            length,
        });
        // Chunk payloads are padded to 4-byte alignment.
        let padded = (length + 3) & !3;
        offset = data_offset + padded;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
        let json_padding = (4 - json.len() % 4) % 4;
        let mut total = HEADER_SIZE + CHUNK_HEADER_SIZE + json.len() + json_padding;
        if let Some(bin) = bin {
            total += CHUNK_HEADER_SIZE + bin.len() + (4 - bin.len() % 4) % 4;
        }

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&GLB_MAGIC);
        out.extend_from_slice(&SUPPORTED_VERSION.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());

        out.extend_from_slice(&((json.len() + json_padding) as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(json);
        out.extend(std::iter::repeat(b' ').take(json_padding));

        if let Some(bin) = bin {
            let bin_padding = (4 - bin.len() % 4) % 4;
            out.extend_from_slice(&((bin.len() + bin_padding) as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(bin);
            out.extend(std::iter::repeat(0u8).take(bin_padding));
        }
        out
    }

    #[test]
    fn accepts_well_formed_container() {
        let buffer = container(b"{\"asset\":{\"version\":\"2.0\"}}", Some(&[1, 2, 3, 4, 5]));
        let chunks = validate(&buffer).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind_str(), "JSON");
        assert_eq!(chunks[1].kind_str(), "BIN");
        assert_eq!(chunks[1].length, 8); // padded
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buffer = container(b"{}", None);
        buffer[0] = b'x';
        assert!(matches!(validate(&buffer), Err(GlbError::BadMagic(_))));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut buffer = container(b"{}", None);
        buffer[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            validate(&buffer),
            Err(GlbError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut buffer = container(b"{}", None);
        buffer.push(0);
        assert!(matches!(
            validate(&buffer),
            Err(GlbError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_chunk_overrun() {
        let mut buffer = container(b"{}", None);
        // Inflate the JSON chunk length past the end of the container.
        let declared = buffer.len() as u32;
        buffer[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&declared.to_le_bytes());
        assert!(matches!(
            validate(&buffer),
            Err(GlbError::ChunkOverrun { .. })
        ));
    }

    #[test]
    fn detects_glb_magic() {
        assert!(is_glb(&container(b"{}", None)));
        assert!(!is_glb(b"{\"asset\":{}}"));
        assert!(!is_glb(b"gl"));
    }
}
