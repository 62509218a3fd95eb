//! Intel HEX reader and writer.
//!
//! Supported records: data (00), end of file (01), extended segment address
//! (02) and extended linear address (04). Start address records (03, 05)
//! carry nothing useful for a flash image and are skipped.

use std::fmt::Write;

use super::SparseImage;
use crate::error::ImageError;

const DATA: u8 = 0x00;
const EOF: u8 = 0x01;
const EXTENDED_SEGMENT: u8 = 0x02;
const START_SEGMENT: u8 = 0x03;
const EXTENDED_LINEAR: u8 = 0x04;
const START_LINEAR: u8 = 0x05;

/// Data bytes per record when writing.
const RECORD_WIDTH: usize = 16;

pub fn parse(text: &str) -> Result<SparseImage, ImageError> {
    let mut image = SparseImage::new();
    let mut base: u32 = 0;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let record = raw.trim();
        if record.is_empty() {
            continue;
        }
        if !record.starts_with(':') {
            return Err(ImageError::MissingStartCode { line });
        }
        let bytes = decode_hex(&record[1..]).ok_or(ImageError::InvalidHex { line })?;
        if bytes.len() < 5 || bytes.len() != bytes[0] as usize + 5 {
            return Err(ImageError::BadLength { line });
        }
        if bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) != 0 {
            return Err(ImageError::BadChecksum { line });
        }

        let offset = u16::from_be_bytes([bytes[1], bytes[2]]) as u32;
        let kind = bytes[3];
        let data = &bytes[4..bytes.len() - 1];
        match kind {
            DATA => {
                let overflow = || ImageError::AddressOverflow { line };
                let start = base.checked_add(offset).ok_or_else(overflow)?;
                for (i, value) in data.iter().enumerate() {
                    let address = start.checked_add(i as u32).ok_or_else(overflow)?;
                    image.set(address, *value);
                }
            }
            EOF => return Ok(image),
            EXTENDED_SEGMENT | EXTENDED_LINEAR => {
                if data.len() != 2 {
                    return Err(ImageError::BadLength { line });
                }
                let value = u16::from_be_bytes([data[0], data[1]]) as u32;
                base = if kind == EXTENDED_SEGMENT {
                    value << 4
                } else {
                    value << 16
                };
            }
            START_SEGMENT | START_LINEAR => {}
            _ => return Err(ImageError::UnsupportedRecord { line, kind }),
        }
    }

    Err(ImageError::MissingEof)
}

pub fn to_string(image: &SparseImage) -> String {
    let mut out = String::new();
    let mut upper: u32 = 0;
    let mut start: u32 = 0;
    let mut pending: Vec<u8> = Vec::with_capacity(RECORD_WIDTH);

    for (address, value) in image.iter() {
        let contiguous = !pending.is_empty() && address == start + pending.len() as u32;
        let crosses_segment = address & 0xFFFF == 0;
        if !contiguous || pending.len() == RECORD_WIDTH || crosses_segment {
            flush(&mut out, &mut upper, start, &mut pending);
            start = address;
        }
        pending.push(value);
    }
    flush(&mut out, &mut upper, start, &mut pending);

    write_record(&mut out, 0, EOF, &[]);
    out
}

fn flush(out: &mut String, upper: &mut u32, start: u32, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    let high = start >> 16;
    if high != *upper {
        write_record(out, 0, EXTENDED_LINEAR, &(high as u16).to_be_bytes());
        *upper = high;
    }
    write_record(out, (start & 0xFFFF) as u16, DATA, pending);
    pending.clear();
}

fn write_record(out: &mut String, offset: u16, kind: u8, data: &[u8]) {
    let mut bytes = Vec::with_capacity(data.len() + 5);
    bytes.push(data.len() as u8);
    bytes.extend_from_slice(&offset.to_be_bytes());
    bytes.push(kind);
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
    bytes.push((!sum).wrapping_add(1));

    out.push(':');
    for byte in bytes {
        // Writing into a String cannot fail.
        let _ = write!(out, "{:02X}", byte);
    }
    out.push('\n');
}

fn decode_hex(digits: &str) -> Option<Vec<u8>> {
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}
