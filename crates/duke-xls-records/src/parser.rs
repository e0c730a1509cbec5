//! Little-endian field readers and writers for BIFF8 record bodies.
//!
//! Readers take the body slice and a cursor and advance it; writers append to a
//! `Vec<u8>`.

use crate::error::{RecordError, RecordResult};

fn short(offset: usize, need: usize) -> RecordError {
    RecordError::Parse(format!(
        "unexpected end of data at offset {offset}, need {need} byte(s)"
    ))
}

/// Copy the next `N` bytes into an array, advancing `offset`.
#[inline]
fn take<const N: usize>(data: &[u8], offset: &mut usize) -> RecordResult<[u8; N]> {
    let bytes = data
        .get(*offset..)
        .and_then(|rest| rest.get(..N))
        .ok_or_else(|| short(*offset, N))?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(bytes);
    *offset += N;
    Ok(raw)
}

#[inline]
pub fn read_u8(data: &[u8], offset: &mut usize) -> RecordResult<u8> {
    take::<1>(data, offset).map(|[b]| b)
}

#[inline]
pub fn read_u16(data: &[u8], offset: &mut usize) -> RecordResult<u16> {
    take(data, offset).map(u16::from_le_bytes)
}

#[inline]
pub fn read_u32(data: &[u8], offset: &mut usize) -> RecordResult<u32> {
    take(data, offset).map(u32::from_le_bytes)
}

#[inline]
pub fn read_i16(data: &[u8], offset: &mut usize) -> RecordResult<i16> {
    take(data, offset).map(i16::from_le_bytes)
}

#[inline]
pub fn read_i32(data: &[u8], offset: &mut usize) -> RecordResult<i32> {
    take(data, offset).map(i32::from_le_bytes)
}

#[inline]
pub fn read_f64(data: &[u8], offset: &mut usize) -> RecordResult<f64> {
    take(data, offset).map(f64::from_le_bytes)
}

/// Borrow `len` raw bytes, advancing `offset`.
#[inline]
pub fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> RecordResult<&'a [u8]> {
    let slice = data
        .get(*offset..)
        .and_then(|rest| rest.get(..len))
        .ok_or_else(|| short(*offset, len))?;
    *offset += len;
    Ok(slice)
}

/// Everything from `offset` to the end of the body.
#[inline]
pub fn read_remaining(data: &[u8], offset: &mut usize) -> Vec<u8> {
    let rest = data.get(*offset..).unwrap_or_default().to_vec();
    *offset = data.len();
    rest
}

/// Decode an RK number: bit 0 scales by 1/100, bit 1 selects a 30-bit
/// signed integer over the top 30 bits of a double.
#[inline]
pub fn decode_rk(rk: u32) -> f64 {
    let value = match rk & 0x02 {
        0 => f64::from_bits(u64::from(rk & !0x03) << 32),
        _ => f64::from((rk as i32) >> 2),
    };
    match rk & 0x01 {
        0 => value,
        _ => value / 100.0,
    }
}

/// Read an RK value from 4 bytes at `offset`.
#[inline]
pub fn read_rk(data: &[u8], offset: &mut usize) -> RecordResult<f64> {
    let raw = read_u32(data, offset)?;
    Ok(decode_rk(raw))
}

// writers

#[inline]
pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

#[inline]
pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Overwrite a `u16` at a fixed position of an already written buffer.
#[inline]
pub fn patch_u16(out: &mut [u8], pos: usize, v: u16) {
    out[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
}

/// Overwrite a `u32` at a fixed position of an already written buffer.
#[inline]
pub fn patch_u32(out: &mut [u8], pos: usize, v: u32) {
    out[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rk_values_from_the_format_reference() {
        let cases = [
            (0x3FF0_0000, 1.0),
            (0x3FF0_0001, 0.01),
            (0x004B_5646, 1_234_321.0),
            (0x004B_5647, 12_343.21),
            ((-5i32 << 2) as u32 | 0x02, -5.0),
        ];
        for (rk, expected) in cases {
            assert_eq!(decode_rk(rk), expected, "rk {rk:#010X}");
        }
    }

    #[test]
    fn readers_advance_and_stop_at_the_end() {
        let data = [0x09, 0x08, 0xEF, 0xBE, 0xAD, 0xDE, 0x7F];
        let mut off = 0;
        assert_eq!(read_u16(&data, &mut off).unwrap(), 0x0809);
        assert_eq!(read_u32(&data, &mut off).unwrap(), 0xDEAD_BEEF);
        assert_eq!(off, 6);
        assert!(read_u16(&data, &mut off).is_err());
        assert_eq!(off, 6);
        assert_eq!(read_u8(&data, &mut off).unwrap(), 0x7F);
        assert_eq!(read_remaining(&data, &mut off), Vec::<u8>::new());
    }

    #[test]
    fn signed_and_float_fields() {
        let mut out = Vec::new();
        write_i16(&mut out, -2);
        write_i32(&mut out, -70_000);
        write_f64(&mut out, 3.25);
        let mut off = 0;
        assert_eq!(read_i16(&out, &mut off).unwrap(), -2);
        assert_eq!(read_i32(&out, &mut off).unwrap(), -70_000);
        assert_eq!(read_f64(&out, &mut off).unwrap(), 3.25);
    }

    #[test]
    fn patching_rewrites_in_place() {
        let mut out = vec![0; 6];
        patch_u16(&mut out, 0, 0x0809);
        patch_u32(&mut out, 2, 0x0102_0304);
        assert_eq!(out, vec![0x09, 0x08, 0x04, 0x03, 0x02, 0x01]);
    }
}
