// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing codec for the binary bridge protocol.
//!
//! TCP is a stream protocol without message boundaries. Every binary frame
//! carries a 4-byte little-endian length covering the bytes that follow it:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B LE) | Frame body        |
//! +----------------+-------------------+
//! ```
//!
//! The codec accumulates raw socket reads and yields complete frames,
//! header included, so that frame parsers can re-validate the length.

use super::WireError;

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum frame body size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Incremental splitter for a byte stream of length-prefixed frames.
#[derive(Debug)]
pub struct FrameCodec {
    /// Bytes received but not yet returned as a frame
    buffer: Vec<u8>,

    /// Maximum allowed body size (anti-OOM protection)
    max_size: usize,

    /// Statistics: frames decoded
    frames_decoded: u64,

    /// Statistics: frames too large (rejected)
    frames_rejected: u64,
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(16384),
            max_size,
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Number of buffered bytes not yet forming a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Encode a body into a framed buffer: `[length: u32 LE][body]`.
    pub fn encode(body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        Self::encode_into(body, &mut frame);
        frame
    }

    /// Append `[length: u32 LE][body]` to `buf`.
    pub fn encode_into(body: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(body);
    }

    /// Feed raw bytes read from the stream.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete frame (header included), if one is buffered.
    ///
    /// An oversized length header is unrecoverable for the stream: the
    /// caller is expected to drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        let Some(len) = peek_length(&self.buffer) else {
            return Ok(None);
        };

        if len > self.max_size {
            self.frames_rejected += 1;
            self.buffer.clear();
            return Err(WireError::FrameTooLarge {
                size: len,
                max: self.max_size,
            });
        }

        let total = FRAME_HEADER_SIZE + len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let rest = self.buffer.split_off(total);
        let frame = std::mem::replace(&mut self.buffer, rest);
        self.frames_decoded += 1;
        Ok(Some(frame))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::with_default_max()
    }
}

/// Read the body length from a frame header, if enough bytes are present.
pub fn peek_length(buf: &[u8]) -> Option<usize> {
    let header: [u8; FRAME_HEADER_SIZE] = buf.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(header) as usize)
}

/// Validate a complete frame and return its body.
pub fn frame_body(frame: &[u8]) -> Result<&[u8], WireError> {
    let declared = peek_length(frame).ok_or(WireError::Truncated {
        offset: frame.len(),
        needed: FRAME_HEADER_SIZE,
    })?;
    let body = &frame[FRAME_HEADER_SIZE..];
    if body.len() != declared {
        return Err(WireError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok(body)
}
