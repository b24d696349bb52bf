//! Fixed, versioned, little-endian wire framing for rank-to-rank messages.
//!
//! A message is a [`WireHdr`] followed by `u64` words, all little-endian.

use bytemuck::{Pod, Zeroable};

use crate::mesh_error::MeshStreamError;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Payload size announcement.
pub const KIND_SIZE: u16 = 1;
/// Migrated cell rows.
pub const KIND_ROWS: u16 = 2;
/// Gathered colors.
pub const KIND_COLORS: u16 = 3;

/// Bytes of a header-only-plus-one-word message.
pub const SIZE_MSG_LEN: usize = size_of::<WireHdr>() + size_of::<u64>();

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }

    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// Frame `words` as a message of `kind`.
pub fn encode_words(kind: u16, words: &[u64]) -> Vec<u8> {
    let hdr = WireHdr::new(kind);
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + words.len() * 8);
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    for &w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

/// Decode a message of `kind` back into its words.
pub fn decode_words(kind: u16, bytes: &[u8]) -> Result<Vec<u64>, MeshStreamError> {
    let hdr_len = size_of::<WireHdr>();
    if bytes.len() < hdr_len || (bytes.len() - hdr_len) % 8 != 0 {
        return Err(MeshStreamError::Communication(format!(
            "malformed message of {} bytes",
            bytes.len()
        )));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..hdr_len]);
    if hdr.version() != WIRE_VERSION || hdr.kind() != kind {
        return Err(MeshStreamError::Communication(format!(
            "unexpected message kind {} version {} (wanted kind {kind})",
            hdr.kind(),
            hdr.version()
        )));
    }
    Ok(bytes[hdr_len..]
        .chunks_exact(8)
        .map(|c| u64::from_le(bytemuck::pod_read_unaligned::<u64>(c)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_eight_bytes() {
        assert_eq!(size_of::<WireHdr>(), 8);
        assert_eq!(encode_words(KIND_SIZE, &[5]).len(), SIZE_MSG_LEN);
    }

    #[test]
    fn kind_is_checked() {
        let msg = encode_words(KIND_ROWS, &[1, 2, 3]);
        assert_eq!(decode_words(KIND_ROWS, &msg).unwrap(), vec![1, 2, 3]);
        assert!(decode_words(KIND_COLORS, &msg).is_err());
        assert!(decode_words(KIND_ROWS, &msg[..msg.len() - 1]).is_err());
    }
}
