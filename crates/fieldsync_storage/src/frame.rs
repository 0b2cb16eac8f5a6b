//! Frame encoding shared by the byte-oriented backends.
//!
//! Each frame on disk is laid out as:
//!
//! ```text
//! | magic (2) | length (4, LE) | crc32 (4, LE) | body (length) |
//! ```

use crate::error::{StorageError, StorageResult};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 2] = *b"FS";

/// Size of the per-frame header.
pub const FRAME_HEADER_SIZE: usize = 10;

/// Largest body a single frame may carry (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// An intact frame read back from a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position of the frame in append order.
    pub index: u64,
    /// Frame body.
    pub body: Vec<u8>,
}

/// A frame that could not be read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamagedFrame {
    /// Position of the frame in append order.
    pub index: u64,
    /// Why the frame was rejected.
    pub reason: String,
}

/// Result of reading a journal from the start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameScan {
    /// Intact frames, in append order.
    pub frames: Vec<Frame>,
    /// Frames that failed validation.
    pub damaged: Vec<DamagedFrame>,
}

impl FrameScan {
    /// Total number of frames seen, intact or not.
    #[must_use]
    pub fn total(&self) -> usize {
        self.frames.len() + self.damaged.len()
    }

    /// Returns true if every frame was intact.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.damaged.is_empty()
    }
}

/// Encodes a frame body with its header.
///
/// # Errors
///
/// Returns an error if the body exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(body: &[u8]) -> StorageResult<Vec<u8>> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(StorageError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    out.extend_from_slice(&FRAME_MAGIC);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32(body).to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Splits a byte journal into frames.
///
/// A checksum mismatch only damages the affected frame. A bad magic or a
/// length running past the end of the buffer ends the scan, since frame
/// boundaries can no longer be trusted.
#[must_use]
pub fn decode_frames(bytes: &[u8]) -> FrameScan {
    let mut scan = FrameScan::default();
    let mut pos = 0usize;
    let mut index = 0u64;

    while pos < bytes.len() {
        let remaining = &bytes[pos..];
        if remaining.len() < FRAME_HEADER_SIZE {
            scan.damaged.push(DamagedFrame {
                index,
                reason: format!("truncated header ({} trailing bytes)", remaining.len()),
            });
            break;
        }
        if remaining[..2] != FRAME_MAGIC {
            scan.damaged.push(DamagedFrame {
                index,
                reason: format!("bad frame magic at byte {pos}"),
            });
            break;
        }
        let len = u32::from_le_bytes([remaining[2], remaining[3], remaining[4], remaining[5]])
            as usize;
        let expected_crc =
            u32::from_le_bytes([remaining[6], remaining[7], remaining[8], remaining[9]]);
        let end = FRAME_HEADER_SIZE + len;
        if len > MAX_FRAME_SIZE || end > remaining.len() {
            scan.damaged.push(DamagedFrame {
                index,
                reason: format!("torn frame: declared {len} bytes at byte {pos}"),
            });
            break;
        }

        let body = &remaining[FRAME_HEADER_SIZE..end];
        if crc32(body) == expected_crc {
            scan.frames.push(Frame {
                index,
                body: body.to_vec(),
            });
        } else {
            scan.damaged.push(DamagedFrame {
                index,
                reason: "checksum mismatch".to_string(),
            });
        }
        pos += end;
        index += 1;
    }

    scan
}

/// CRC-32 (IEEE polynomial).
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
