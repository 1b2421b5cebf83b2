//! util: общие утилиты.
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах.
//! - env_flag()/env_parse(): разбор ENV-переменных конфигурации.
//! - read_uvarint()/write_uvarint(): unsigned LEB128, как в каталогах архива.

use crate::error::CodecError;

/// Текущее Unix-время в секундах.
#[inline]
pub fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Boolean env var: "1|true|yes|on" => true, "0|false|no|off" => false, otherwise None.
pub fn env_flag(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parsed env var; None if unset or unparsable.
pub fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse::<T>().ok()
}

/// Decode an unsigned LEB128 varint from `buf` at `*pos`, advancing `*pos`.
pub fn read_uvarint(buf: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let Some(&byte) = buf.get(*pos) else {
            return Err(CodecError::Truncated {
                need: *pos + 1,
                have: buf.len(),
            });
        };
        *pos += 1;

        let payload = u64::from(byte & 0x7F);
        // 10th byte may only carry the top bit of a u64
        if (shift == 63 && payload > 1) || shift > 63 {
            return Err(CodecError::VarintOverflow);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Encode `value` as unsigned LEB128 into `out`.
pub fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
