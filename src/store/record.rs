//! store/record: кадры data.log.
//!
//! Формат файла:
//! - заголовок 16 байт: MAGIC (8) + reserved (8);
//! - записи: [crc32 u32][key_len u32][val_len u32][hdr_crc u32][key][value], LE.
//!   crc32 считается по key_len‖val_len‖key‖value, hdr_crc: по key_len‖val_len.
//!
//! Частичный хвост (заголовок или тело обрываются на EOF при целом hdr_crc)
//! читается как Ok(None). Битые длины в середине журнала: Storage-ошибка.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, Result};

pub const LOG_MAGIC: &[u8; 8] = b"SDKVLOG2";
pub const LOG_HDR_SIZE: usize = 16;
pub const REC_HDR_SIZE: usize = 16;

const REC_OFF_CRC: usize = 0;
const REC_OFF_KLEN: usize = 4;
const REC_OFF_VLEN: usize = 8;
const REC_OFF_HCRC: usize = 12;

pub fn write_log_header<W: Write>(w: &mut W) -> Result<()> {
    let mut hdr = [0u8; LOG_HDR_SIZE];
    hdr[..8].copy_from_slice(LOG_MAGIC);
    w.write_all(&hdr)?;
    Ok(())
}

/// Прочитать и проверить заголовок. Ok(false): файл короче заголовка (пустой/новый).
pub fn read_log_header<R: Read>(r: &mut R) -> Result<bool> {
    let mut hdr = [0u8; LOG_HDR_SIZE];
    if let Err(e) = r.read_exact(&mut hdr) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(false);
        }
        return Err(e.into());
    }
    if &hdr[..8] != LOG_MAGIC {
        return Err(Error::storage("data.log: bad magic"));
    }
    Ok(true)
}

fn record_crc(hdr_lens: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(hdr_lens);
    h.update(key);
    h.update(value);
    h.finalize()
}

fn lens_crc(lens: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(lens);
    h.finalize()
}

/// Записать одну запись по текущей позиции writer'а. Возвращает число записанных байт.
pub fn write_record<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> Result<u64> {
    if key.len() > u32::MAX as usize || value.len() > u32::MAX as usize {
        return Err(Error::storage(format!(
            "record too large: key={} value={}",
            key.len(),
            value.len()
        )));
    }

    let mut hdr = [0u8; REC_HDR_SIZE];
    LittleEndian::write_u32(&mut hdr[REC_OFF_KLEN..REC_OFF_KLEN + 4], key.len() as u32);
    LittleEndian::write_u32(&mut hdr[REC_OFF_VLEN..REC_OFF_VLEN + 4], value.len() as u32);
    let lens = REC_OFF_KLEN..REC_OFF_HCRC;
    let crc = record_crc(&hdr[lens.clone()], key, value);
    let hcrc = lens_crc(&hdr[lens]);
    LittleEndian::write_u32(&mut hdr[REC_OFF_CRC..REC_OFF_CRC + 4], crc);
    LittleEndian::write_u32(&mut hdr[REC_OFF_HCRC..REC_OFF_HCRC + 4], hcrc);

    w.write_all(&hdr)?;
    w.write_all(key)?;
    w.write_all(value)?;
    Ok((REC_HDR_SIZE + key.len() + value.len()) as u64)
}

/// Одна запись лога.
#[derive(Debug)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Полный размер записи (заголовок + payload).
    pub len_total: u64,
}

/// Считать следующую запись. `remaining`: байт от начала записи до конца файла.
///
/// - Ok(Some(rec)): запись полная и CRC совпал;
/// - Ok(None): EOF или частичный хвост;
/// - Err: битый заголовок, CRC mismatch или I/O.
///
/// Память под key/value выделяется только после проверки длин по `remaining`.
pub fn read_record<R: Read>(r: &mut R, remaining: u64) -> Result<Option<LogRecord>> {
    if remaining < REC_HDR_SIZE as u64 {
        return Ok(None);
    }
    let mut hdr = [0u8; REC_HDR_SIZE];
    if let Err(e) = r.read_exact(&mut hdr) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e.into());
    }

    let lens = &hdr[REC_OFF_KLEN..REC_OFF_HCRC];
    if lens_crc(lens) != LittleEndian::read_u32(&hdr[REC_OFF_HCRC..REC_OFF_HCRC + 4]) {
        return Err(Error::storage("data.log: corrupt record header"));
    }

    let klen = LittleEndian::read_u32(&hdr[REC_OFF_KLEN..REC_OFF_KLEN + 4]) as u64;
    let vlen = LittleEndian::read_u32(&hdr[REC_OFF_VLEN..REC_OFF_VLEN + 4]) as u64;
    let crc = LittleEndian::read_u32(&hdr[REC_OFF_CRC..REC_OFF_CRC + 4]);

    // заголовок целый, тело обрывается на EOF: недописанная последняя запись
    if klen + vlen > remaining - REC_HDR_SIZE as u64 {
        return Ok(None);
    }

    let mut key = vec![0u8; klen as usize];
    let mut value = vec![0u8; vlen as usize];
    r.read_exact(&mut key)?;
    r.read_exact(&mut value)?;

    if record_crc(lens, &key, &value) != crc {
        return Err(Error::storage(format!(
            "data.log: crc mismatch (key_len={klen}, val_len={vlen})"
        )));
    }

    Ok(Some(LogRecord {
        key,
        value,
        len_total: REC_HDR_SIZE as u64 + klen + vlen,
    }))
}
