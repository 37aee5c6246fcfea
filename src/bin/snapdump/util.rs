use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use snapdump::config::ExistingDest;

/// Код выхода процесса: ищем snapdump::Error в цепочке anyhow.
pub fn exit_code(e: &anyhow::Error) -> i32 {
    e.chain()
        .find_map(|c| c.downcast_ref::<snapdump::Error>())
        .map(|se| se.exit_code())
        .unwrap_or(1)
}

pub fn existing_dest(force: bool, merge: bool) -> ExistingDest {
    match (force, merge) {
        (true, _) => ExistingDest::Wipe,
        (false, true) => ExistingDest::Merge,
        (false, false) => ExistingDest::Refuse,
    }
}

/// Ключ из аргумента: hex:<hex>, b64:<base64> или literal (UTF-8 байты).
pub fn decode_key_arg(arg: &str) -> Result<Vec<u8>> {
    if let Some(hx) = arg.strip_prefix("hex:") {
        return decode_hex(hx);
    }
    if let Some(b) = arg.strip_prefix("b64:") {
        return STANDARD
            .decode(b.trim())
            .map_err(|e| anyhow!("invalid base64 key: {}", e));
    }
    Ok(arg.as_bytes().to_vec())
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(anyhow!("hex string must have even length"));
    }
    s.as_bytes()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let hi = (pair[0] as char).to_digit(16);
            let lo = (pair[1] as char).to_digit(16);
            match (hi, lo) {
                (Some(h), Some(l)) => Ok(((h << 4) | l) as u8),
                _ => Err(anyhow!("invalid hex at pos {}", i * 2)),
            }
        })
        .collect()
}

pub fn display_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("(binary {} B)", bytes.len()),
    }
}

pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
