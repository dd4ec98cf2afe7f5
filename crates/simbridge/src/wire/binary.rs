// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary (Cyber bridge) encoding.
//!
//! Message payloads are encoded field by field in declaration order:
//! primitives little-endian, strings and byte arrays as `u32` LE length +
//! bytes, sequences as `u32` LE count + elements.
//!
//! Frames wrap a payload with an op code and length-prefixed fields:
//!
//! | Op | Fields |
//! |----|--------|
//! | `AddReader` (2) | channel, type |
//! | `AddWriter` (3) | channel, type |
//! | `Publish` (4) | channel, type, message |
//! | `CallService` (5) | service, id (u32), args |
//! | `ServiceResponse` (6) | service, id (u32), ok (u8), values |

use super::cursor::{WireReader, WireWriter};
use super::frame_codec::{frame_body, FrameCodec};
use super::WireError;

/// Types that can be written to the binary encoding.
pub trait BinaryEncode {
    fn encode(&self, w: &mut WireWriter);
}

/// Types that can be read back from the binary encoding.
pub trait BinaryDecode: Sized {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError>;
}

/// Encode a value into a standalone buffer.
pub fn to_bytes<T: BinaryEncode + ?Sized>(value: &T) -> Vec<u8> {
    let mut w = WireWriter::new();
    value.encode(&mut w);
    w.into_inner()
}

/// Decode a value, requiring the whole buffer to be consumed.
pub fn from_bytes<T: BinaryDecode>(bytes: &[u8]) -> Result<T, WireError> {
    let mut r = WireReader::new(bytes);
    let value = T::decode(&mut r)?;
    if !r.is_exhausted() {
        return Err(WireError::Invalid(format!(
            "{} trailing bytes after message",
            r.remaining()
        )));
    }
    Ok(value)
}

macro_rules! impl_binary_primitive {
    ($type:ty, $write:ident, $read:ident) => {
        impl BinaryEncode for $type {
            fn encode(&self, w: &mut WireWriter) {
                w.$write(*self);
            }
        }

        impl BinaryDecode for $type {
            fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
                r.$read()
            }
        }
    };
}

impl_binary_primitive!(u8, write_u8, read_u8);
impl_binary_primitive!(u16, write_u16_le, read_u16_le);
impl_binary_primitive!(u32, write_u32_le, read_u32_le);
impl_binary_primitive!(u64, write_u64_le, read_u64_le);
impl_binary_primitive!(i32, write_i32_le, read_i32_le);
impl_binary_primitive!(i64, write_i64_le, read_i64_le);
impl_binary_primitive!(f32, write_f32_le, read_f32_le);
impl_binary_primitive!(f64, write_f64_le, read_f64_le);

impl BinaryEncode for bool {
    fn encode(&self, w: &mut WireWriter) {
        w.write_u8(u8::from(*self));
    }
}

impl BinaryDecode for bool {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        match r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::Invalid(format!("invalid bool byte {}", other))),
        }
    }
}

impl BinaryEncode for String {
    fn encode(&self, w: &mut WireWriter) {
        w.write_str(self);
    }
}

impl BinaryDecode for String {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        r.read_string("string field")
    }
}

impl<T: BinaryEncode> BinaryEncode for Vec<T> {
    fn encode(&self, w: &mut WireWriter) {
        w.write_u32_le(self.len() as u32);
        for item in self {
            item.encode(w);
        }
    }
}

impl<T: BinaryDecode> BinaryDecode for Vec<T> {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let count = r.read_u32_le()? as usize;
        // Each element takes at least one byte; reject absurd counts early.
        if count > r.remaining() {
            return Err(WireError::Truncated {
                offset: r.offset(),
                needed: count,
            });
        }
        (0..count).map(|_| T::decode(r)).collect()
    }
}

/// Binary protocol operation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    AddReader = 2,
    AddWriter = 3,
    Publish = 4,
    CallService = 5,
    ServiceResponse = 6,
}

impl TryFrom<u8> for BinaryOp {
    type Error = WireError;

    fn try_from(op: u8) -> Result<Self, Self::Error> {
        match op {
            2 => Ok(Self::AddReader),
            3 => Ok(Self::AddWriter),
            4 => Ok(Self::Publish),
            5 => Ok(Self::CallService),
            6 => Ok(Self::ServiceResponse),
            other => Err(WireError::UnknownOp(other)),
        }
    }
}

/// One decoded binary frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinaryFrame {
    AddReader {
        channel: String,
        type_name: String,
    },
    AddWriter {
        channel: String,
        type_name: String,
    },
    Publish {
        channel: String,
        type_name: String,
        message: Vec<u8>,
    },
    CallService {
        service: String,
        id: u32,
        args: Vec<u8>,
    },
    ServiceResponse {
        service: String,
        id: u32,
        ok: bool,
        values: Vec<u8>,
    },
}

impl BinaryFrame {
    pub fn op(&self) -> BinaryOp {
        match self {
            Self::AddReader { .. } => BinaryOp::AddReader,
            Self::AddWriter { .. } => BinaryOp::AddWriter,
            Self::Publish { .. } => BinaryOp::Publish,
            Self::CallService { .. } => BinaryOp::CallService,
            Self::ServiceResponse { .. } => BinaryOp::ServiceResponse,
        }
    }

    /// Encode into a complete frame, length header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(64);
        w.write_u8(self.op() as u8);
        match self {
            Self::AddReader { channel, type_name } | Self::AddWriter { channel, type_name } => {
                w.write_str(channel);
                w.write_str(type_name);
            }
            Self::Publish {
                channel,
                type_name,
                message,
            } => {
                w.write_str(channel);
                w.write_str(type_name);
                w.write_blob(message);
            }
            Self::CallService { service, id, args } => {
                w.write_str(service);
                w.write_u32_le(*id);
                w.write_blob(args);
            }
            Self::ServiceResponse {
                service,
                id,
                ok,
                values,
            } => {
                w.write_str(service);
                w.write_u32_le(*id);
                w.write_u8(u8::from(*ok));
                w.write_blob(values);
            }
        }
        FrameCodec::encode(w.as_slice())
    }

    /// Decode a complete frame, length header included.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let body = frame_body(frame)?;
        let mut r = WireReader::new(body);
        let op = BinaryOp::try_from(r.read_u8()?)?;

        let decoded = match op {
            BinaryOp::AddReader => Self::AddReader {
                channel: r.read_string("channel")?,
                type_name: r.read_string("type")?,
            },
            BinaryOp::AddWriter => Self::AddWriter {
                channel: r.read_string("channel")?,
                type_name: r.read_string("type")?,
            },
            BinaryOp::Publish => Self::Publish {
                channel: r.read_string("channel")?,
                type_name: r.read_string("type")?,
                message: r.read_blob()?.to_vec(),
            },
            BinaryOp::CallService => Self::CallService {
                service: r.read_string("service")?,
                id: r.read_u32_le()?,
                args: r.read_blob()?.to_vec(),
            },
            BinaryOp::ServiceResponse => Self::ServiceResponse {
                service: r.read_string("service")?,
                id: r.read_u32_le()?,
                ok: r.read_u8()? != 0,
                values: r.read_blob()?.to_vec(),
            },
        };

        if !r.is_exhausted() {
            return Err(WireError::Invalid(format!(
                "{} trailing bytes in {:?} frame",
                r.remaining(),
                op
            )));
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_frame_layout() {
        let frame = BinaryFrame::Publish {
            channel: "/a".into(),
            type_name: "T".into(),
            message: vec![0xAB],
        }
        .encode();

        // len | op | 2 "/a" | 1 "T" | 1 [AB]
        let expected_body: Vec<u8> = vec![
            4, 2, 0, 0, 0, b'/', b'a', 1, 0, 0, 0, b'T', 1, 0, 0, 0, 0xAB,
        ];
        assert_eq!(&frame[..4], &(expected_body.len() as u32).to_le_bytes());
        assert_eq!(&frame[4..], expected_body.as_slice());
    }

    #[test]
    fn test_decode_service_response() {
        let frame = BinaryFrame::ServiceResponse {
            service: "/reset".into(),
            id: 42,
            ok: false,
            values: b"SERVICE_NOT_FOUND".to_vec(),
        };
        assert_eq!(BinaryFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_unknown_op() {
        let frame = FrameCodec::encode(&[1]);
        assert_eq!(
            BinaryFrame::decode(&frame).unwrap_err(),
            WireError::UnknownOp(1)
        );
    }

    #[test]
    fn test_truncated_field() {
        let mut frame = BinaryFrame::AddReader {
            channel: "/imu".into(),
            type_name: "apollo.drivers.gnss.Imu".into(),
        }
        .encode();
        frame.truncate(frame.len() - 3);
        let len = (frame.len() - 4) as u32;
        frame[..4].copy_from_slice(&len.to_le_bytes());
        assert!(matches!(
            BinaryFrame::decode(&frame).unwrap_err(),
            WireError::Truncated { .. }
        ));
    }

    #[test]
    fn test_vec_rejects_absurd_count() {
        let mut w = WireWriter::new();
        w.write_u32_le(1_000_000);
        let err = from_bytes::<Vec<u8>>(w.as_slice()).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn test_bool_rejects_garbage() {
        assert!(from_bytes::<bool>(&[2]).is_err());
        assert!(from_bytes::<bool>(&[1]).unwrap());
    }
}
