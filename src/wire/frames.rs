//! Value and timestamp frame encoding.
//!
//! Each channel contributes two frames per message: element bytes in the
//! channel's byte order (compressed per channel config), then a fixed
//! 16-byte device timestamp. Type and shape from the channel config
//! determine byte width and array length; byte order is per channel, not
//! per message.

use crate::types::{ByteOrder, ChannelConfig, ChannelType, Timestamp, Value};
use crate::{BsreadError, Result};

/// Encode a value into a channel's wire frame (including compression).
pub fn encode_value(value: &Value, config: &ChannelConfig) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    write_value(&mut raw, value, config)?;
    Ok(config.compression.compress(&raw, 0, element_size(config)))
}

/// Decode a channel's wire frame into a tagged value.
pub fn decode_value(frame: &[u8], config: &ChannelConfig) -> Result<Value> {
    let raw = config
        .compression
        .decompress(frame, 0, element_size(config))
        .map_err(|e| BsreadError::decode(&config.name, e.to_string()))?;

    if config.ty == ChannelType::String {
        // Dynamic width: the whole payload is one UTF-8 string
        let s = String::from_utf8(raw)
            .map_err(|e| BsreadError::decode(&config.name, e.to_string()))?;
        return Ok(Value::String(s));
    }

    let size = config.ty.size().expect("fixed-width type");
    let count = config.element_count();
    if raw.len() != size * count {
        return Err(BsreadError::decode(
            &config.name,
            format!("expected {} bytes, got {}", size * count, raw.len()),
        ));
    }

    if config.is_scalar() {
        read_element(&raw, config.ty, config.encoding)
    } else {
        let items = raw
            .chunks(size)
            .map(|chunk| read_element(chunk, config.ty, config.encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(items))
    }
}

/// Encode a device timestamp frame: two u64 words in the channel byte order.
pub fn encode_timestamp(ts: Timestamp, encoding: ByteOrder) -> [u8; 16] {
    let mut out = [0u8; 16];
    let (sec, ns) = (ts.sec, ts.ns as u64);
    match encoding {
        ByteOrder::LittleEndian => {
            out[..8].copy_from_slice(&sec.to_le_bytes());
            out[8..].copy_from_slice(&ns.to_le_bytes());
        }
        ByteOrder::BigEndian => {
            out[..8].copy_from_slice(&sec.to_be_bytes());
            out[8..].copy_from_slice(&ns.to_be_bytes());
        }
    }
    out
}

/// Decode and validate a device timestamp frame.
pub fn decode_timestamp(frame: &[u8], encoding: ByteOrder) -> Result<Timestamp> {
    if frame.len() != 16 {
        return Err(BsreadError::framing(
            "timestamp frame",
            format!("expected 16 bytes, got {}", frame.len()),
        ));
    }
    let read = |bytes: &[u8]| {
        let arr: [u8; 8] = bytes.try_into().expect("8-byte slice");
        match encoding {
            ByteOrder::LittleEndian => u64::from_le_bytes(arr),
            ByteOrder::BigEndian => u64::from_be_bytes(arr),
        }
    };
    let sec = read(&frame[..8]);
    let ns = read(&frame[8..]);
    if ns >= Timestamp::NANOS_PER_SEC as u64 {
        return Err(BsreadError::MalformedTimestamp { sec, ns });
    }
    Timestamp::new(sec, ns as u32)
}

fn element_size(config: &ChannelConfig) -> usize {
    config.ty.size().unwrap_or(1)
}

fn write_value(out: &mut Vec<u8>, value: &Value, config: &ChannelConfig) -> Result<()> {
    match value {
        Value::Array(items) => {
            if config.is_scalar() {
                return Err(type_mismatch(config, value));
            }
            if items.len() != config.element_count() {
                return Err(BsreadError::decode(
                    &config.name,
                    format!(
                        "array has {} elements, shape wants {}",
                        items.len(),
                        config.element_count()
                    ),
                ));
            }
            for item in items {
                write_element(out, item, config)?;
            }
            Ok(())
        }
        _ => {
            if !config.is_scalar() {
                return Err(type_mismatch(config, value));
            }
            write_element(out, value, config)
        }
    }
}

fn write_element(out: &mut Vec<u8>, value: &Value, config: &ChannelConfig) -> Result<()> {
    macro_rules! put {
        ($v:expr) => {
            match config.encoding {
                ByteOrder::LittleEndian => out.extend_from_slice(&$v.to_le_bytes()),
                ByteOrder::BigEndian => out.extend_from_slice(&$v.to_be_bytes()),
            }
        };
    }
    match (value, config.ty) {
        (Value::Bool(v), ChannelType::Bool) => out.push(*v as u8),
        (Value::Int8(v), ChannelType::Int8) => out.push(*v as u8),
        (Value::UInt8(v), ChannelType::UInt8) => out.push(*v),
        (Value::Int16(v), ChannelType::Int16) => put!(v),
        (Value::UInt16(v), ChannelType::UInt16) => put!(v),
        (Value::Int32(v), ChannelType::Int32) => put!(v),
        (Value::UInt32(v), ChannelType::UInt32) => put!(v),
        (Value::Int64(v), ChannelType::Int64) => put!(v),
        (Value::UInt64(v), ChannelType::UInt64) => put!(v),
        (Value::Float32(v), ChannelType::Float32) => put!(v),
        (Value::Float64(v), ChannelType::Float64) => put!(v),
        (Value::String(v), ChannelType::String) => out.extend_from_slice(v.as_bytes()),
        _ => return Err(type_mismatch(config, value)),
    }
    Ok(())
}

fn read_element(bytes: &[u8], ty: ChannelType, encoding: ByteOrder) -> Result<Value> {
    macro_rules! get {
        ($ty:ty) => {{
            let arr: [u8; size_of::<$ty>()] = bytes
                .try_into()
                .map_err(|_| BsreadError::framing("value frame", "short element"))?;
            match encoding {
                ByteOrder::LittleEndian => <$ty>::from_le_bytes(arr),
                ByteOrder::BigEndian => <$ty>::from_be_bytes(arr),
            }
        }};
    }
    Ok(match ty {
        ChannelType::Bool => Value::Bool(get!(u8) != 0),
        ChannelType::Int8 => Value::Int8(get!(i8)),
        ChannelType::UInt8 => Value::UInt8(get!(u8)),
        ChannelType::Int16 => Value::Int16(get!(i16)),
        ChannelType::UInt16 => Value::UInt16(get!(u16)),
        ChannelType::Int32 => Value::Int32(get!(i32)),
        ChannelType::UInt32 => Value::UInt32(get!(u32)),
        ChannelType::Int64 => Value::Int64(get!(i64)),
        ChannelType::UInt64 => Value::UInt64(get!(u64)),
        ChannelType::Float32 => Value::Float32(get!(f32)),
        ChannelType::Float64 => Value::Float64(get!(f64)),
        ChannelType::String => unreachable!("strings decode as whole frames"),
    })
}

fn type_mismatch(config: &ChannelConfig, value: &Value) -> BsreadError {
    BsreadError::decode(
        &config.name,
        format!("value {:?} does not match channel type {:?}", value.channel_type(), config.ty),
    )
}
