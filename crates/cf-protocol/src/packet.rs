//! Packet codec.
//!
//! Every value on the wire is `[tag: u8][payload]`, little-endian:
//!
//! | tag | payload                                                   |
//! |-----|-----------------------------------------------------------|
//! | `S` | `u32` length + UTF-8 bytes                                |
//! | `D` | `f64`                                                     |
//! | `I` | `i64`                                                     |
//! | `P` | `u32` ndim, ndim x `u32` dims, product(dims) x `f64`      |
//! | `K` | `u32` length + JSON document                              |
//! | `X` | `u32` length + UTF-8 error message                        |
//! | `C` | command code byte                                         |
//! | `A` | acknowledged command code byte                            |

use std::io::{self, Read, Write};

use cf_core::{Array, SignalValue};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

pub const TAG_STR: u8 = b'S';
pub const TAG_DOUBLE: u8 = b'D';
pub const TAG_INT: u8 = b'I';
pub const TAG_ARRAY: u8 = b'P';
pub const TAG_JSON: u8 = b'K';
pub const TAG_ERROR: u8 = b'X';
pub const TAG_COMMAND: u8 = b'C';
pub const TAG_ACK: u8 = b'A';

/// Upper bound on any length-prefixed payload (64 MiB).
pub const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// One framed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Str(String),
    Double(f64),
    Int(i64),
    Array(Array),
    Json(Value),
    Error(String),
    Command(u8),
    Ack(u8),
}

impl Packet {
    pub fn tag(&self) -> u8 {
        match self {
            Packet::Str(_) => TAG_STR,
            Packet::Double(_) => TAG_DOUBLE,
            Packet::Int(_) => TAG_INT,
            Packet::Array(_) => TAG_ARRAY,
            Packet::Json(_) => TAG_JSON,
            Packet::Error(_) => TAG_ERROR,
            Packet::Command(_) => TAG_COMMAND,
            Packet::Ack(_) => TAG_ACK,
        }
    }

    /// Array packet for a signal value; scalars become shape `[]`.
    pub fn signal(value: &SignalValue) -> Self {
        match value {
            SignalValue::Scalar(x) => Packet::Array(Array::scalar(*x)),
            SignalValue::Array(a) => Packet::Array(a.clone()),
        }
    }

    /// Inverse of [`Packet::signal`].
    pub fn into_signal(self) -> Option<SignalValue> {
        match self {
            Packet::Array(a) if a.ndim() == 0 => a.data().first().copied().map(SignalValue::Scalar),
            Packet::Array(a) => Some(SignalValue::Array(a)),
            Packet::Double(x) => Some(SignalValue::Scalar(x)),
            _ => None,
        }
    }

    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(16);
        buf.push(self.tag());
        match self {
            Packet::Str(s) | Packet::Error(s) => put_bytes(&mut buf, s.as_bytes())?,
            Packet::Double(x) => buf.extend_from_slice(&x.to_le_bytes()),
            Packet::Int(n) => buf.extend_from_slice(&n.to_le_bytes()),
            Packet::Array(a) => {
                put_u32(&mut buf, a.ndim())?;
                for &dim in a.shape() {
                    put_u32(&mut buf, dim)?;
                }
                for x in a.data() {
                    buf.extend_from_slice(&x.to_le_bytes());
                }
            }
            Packet::Json(v) => {
                let doc = serde_json::to_vec(v)
                    .map_err(|e| ProtocolError::framing(format!("unencodable document: {e}")))?;
                put_bytes(&mut buf, &doc)?;
            }
            Packet::Command(code) | Packet::Ack(code) => buf.push(*code),
        }
        Ok(buf)
    }
}

fn put_u32(buf: &mut Vec<u8>, n: usize) -> ProtocolResult<()> {
    let n = u32::try_from(n).map_err(|_| ProtocolError::framing("length exceeds u32"))?;
    buf.extend_from_slice(&n.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> ProtocolResult<()> {
    if bytes.len() > MAX_PAYLOAD {
        return Err(ProtocolError::framing("payload too large"));
    }
    put_u32(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Encode `packet` and write it in one call.
pub fn write_packet<W: Write>(w: &mut W, packet: &Packet) -> ProtocolResult<()> {
    w.write_all(&packet.encode()?)?;
    Ok(())
}

/// Read one packet. End of stream before the tag is [`ProtocolError::Closed`];
/// anywhere later it is a framing error.
pub fn read_packet<R: Read>(r: &mut R) -> ProtocolResult<Packet> {
    let mut tag = [0u8; 1];
    match r.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(ProtocolError::Closed),
        Err(e) => return Err(e.into()),
    }

    let packet = match tag[0] {
        TAG_STR => Packet::Str(get_string(r)?),
        TAG_ERROR => Packet::Error(get_string(r)?),
        TAG_DOUBLE => Packet::Double(f64::from_le_bytes(get_array(r)?)),
        TAG_INT => Packet::Int(i64::from_le_bytes(get_array(r)?)),
        TAG_ARRAY => Packet::Array(get_shaped(r)?),
        TAG_JSON => {
            let bytes = get_bytes(r)?;
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| ProtocolError::framing(format!("invalid document: {e}")))?;
            Packet::Json(value)
        }
        TAG_COMMAND => Packet::Command(get_array::<1, _>(r)?[0]),
        TAG_ACK => Packet::Ack(get_array::<1, _>(r)?[0]),
        other => {
            return Err(ProtocolError::framing(format!(
                "unknown packet tag 0x{other:02x}"
            )));
        }
    };
    Ok(packet)
}

fn get_array<const N: usize, R: Read>(r: &mut R) -> ProtocolResult<[u8; N]> {
    let mut buf = [0u8; N];
    read_payload(r, &mut buf)?;
    Ok(buf)
}

fn read_payload<R: Read>(r: &mut R, buf: &mut [u8]) -> ProtocolResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::framing("truncated payload")
        } else {
            e.into()
        }
    })
}

fn get_len<R: Read>(r: &mut R) -> ProtocolResult<usize> {
    let len = u32::from_le_bytes(get_array(r)?) as usize;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::framing(format!("payload of {len} bytes too large")));
    }
    Ok(len)
}

fn get_bytes<R: Read>(r: &mut R) -> ProtocolResult<Vec<u8>> {
    let len = get_len(r)?;
    let mut bytes = vec![0u8; len];
    read_payload(r, &mut bytes)?;
    Ok(bytes)
}

fn get_string<R: Read>(r: &mut R) -> ProtocolResult<String> {
    String::from_utf8(get_bytes(r)?)
        .map_err(|e| ProtocolError::framing(format!("invalid UTF-8: {e}")))
}

fn get_shaped<R: Read>(r: &mut R) -> ProtocolResult<Array> {
    let ndim = u32::from_le_bytes(get_array(r)?) as usize;
    if ndim > 32 {
        return Err(ProtocolError::framing(format!("{ndim} dimensions")));
    }
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(u32::from_le_bytes(get_array(r)?) as usize);
    }
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&n| n.saturating_mul(8) <= MAX_PAYLOAD)
        .ok_or_else(|| ProtocolError::framing(format!("array shape {shape:?} too large")))?;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(f64::from_le_bytes(get_array(r)?));
    }
    Array::new(shape, data).map_err(|e| ProtocolError::framing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::io::Cursor;

    fn round_trip(packet: &Packet) -> Packet {
        let bytes = packet.encode().unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = read_packet(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
        decoded
    }

    #[test]
    fn byte_layout() {
        assert_eq!(
            Packet::Str("x".into()).encode().unwrap(),
            vec![b'S', 1, 0, 0, 0, b'x']
        );
        assert_eq!(Packet::Command(b'G').encode().unwrap(), vec![b'C', b'G']);
        assert_eq!(Packet::Ack(b'G').encode().unwrap(), vec![b'A', b'G']);

        let mut expected = vec![b'D'];
        expected.extend_from_slice(&1.5f64.to_le_bytes());
        assert_eq!(Packet::Double(1.5).encode().unwrap(), expected);

        let scalar = Packet::signal(&SignalValue::scalar(2.0));
        let mut expected = vec![b'P', 0, 0, 0, 0];
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        assert_eq!(scalar.encode().unwrap(), expected);
    }

    #[test]
    fn empty_values_round_trip() {
        for packet in [
            Packet::Str(String::new()),
            Packet::Error(String::new()),
            Packet::Array(Array::from_vec(Vec::new())),
            Packet::Array(Array::zeros(vec![0, 3])),
            Packet::Json(json!({})),
        ] {
            assert_eq!(round_trip(&packet), packet);
        }
    }

    #[test]
    fn signals_convert_both_ways() {
        let scalar = SignalValue::scalar(-4.0);
        assert_eq!(Packet::signal(&scalar).into_signal(), Some(scalar));
        let vector = SignalValue::vector(vec![1.0, 2.0]);
        assert_eq!(Packet::signal(&vector).into_signal(), Some(vector));
        assert_eq!(Packet::Str("x".into()).into_signal(), None);
    }

    #[test]
    fn end_of_stream_and_truncation() {
        let mut empty = Cursor::new(Vec::new());
        assert!(matches!(read_packet(&mut empty), Err(ProtocolError::Closed)));

        let mut truncated = Cursor::new(vec![b'S', 5, 0, 0, 0, b'a']);
        assert!(matches!(
            read_packet(&mut truncated),
            Err(ProtocolError::Framing { .. })
        ));

        let mut bad_tag = Cursor::new(vec![b'Z', 0]);
        assert!(matches!(
            read_packet(&mut bad_tag),
            Err(ProtocolError::Framing { .. })
        ));

        let mut bad_utf8 = Cursor::new(vec![b'S', 1, 0, 0, 0, 0xff]);
        assert!(matches!(
            read_packet(&mut bad_utf8),
            Err(ProtocolError::Framing { .. })
        ));
    }

    #[test]
    fn oversized_lengths_are_rejected_before_allocating() {
        let mut huge = Cursor::new(vec![b'S', 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(
            read_packet(&mut huge),
            Err(ProtocolError::Framing { .. })
        ));

        let mut huge_array = vec![b'P', 2, 0, 0, 0];
        huge_array.extend_from_slice(&u32::MAX.to_le_bytes());
        huge_array.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            read_packet(&mut Cursor::new(huge_array)),
            Err(ProtocolError::Framing { .. })
        ));
    }

    fn array_strategy() -> impl Strategy<Value = Array> {
        prop::collection::vec(0usize..4, 0..4).prop_flat_map(|shape| {
            let len: usize = shape.iter().product();
            prop::collection::vec(-1e9f64..1e9, len)
                .prop_map(move |data| Array::new(shape.clone(), data).unwrap())
        })
    }

    fn packet_strategy() -> impl Strategy<Value = Packet> {
        prop_oneof![
            ".*".prop_map(Packet::Str),
            ".*".prop_map(Packet::Error),
            any::<f64>()
                .prop_filter("NaN never compares equal", |x| !x.is_nan())
                .prop_map(Packet::Double),
            any::<i64>().prop_map(Packet::Int),
            array_strategy().prop_map(Packet::Array),
            prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| Packet::Json(json!(v))),
            (0x20u8..0x7f).prop_map(Packet::Command),
            (0x20u8..0x7f).prop_map(Packet::Ack),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(packet in packet_strategy()) {
            prop_assert_eq!(round_trip(&packet), packet);
        }

        #[test]
        fn packets_decode_back_to_back(packets in prop::collection::vec(packet_strategy(), 0..8)) {
            let mut bytes = Vec::new();
            for p in &packets {
                write_packet(&mut bytes, p).unwrap();
            }
            let mut cursor = Cursor::new(bytes);
            for p in &packets {
                prop_assert_eq!(&read_packet(&mut cursor).unwrap(), p);
            }
            prop_assert!(matches!(read_packet(&mut cursor), Err(ProtocolError::Closed)));
        }
    }
}
