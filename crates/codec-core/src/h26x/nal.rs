//! NAL unit framing helpers
//!
//! Every demultiplexer normalizes H.264/H.265 payloads to 4-byte big-endian
//! length prefixes. These helpers convert between that framing, Annex-B start
//! codes and the 1..=4 byte prefixes a configuration record may declare.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Four byte Annex-B start code
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// NAL unit framing of a video payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NalFormat {
    /// 4-byte big-endian length prefixes
    #[default]
    LengthPrefixed,
    /// `00 00 00 01` start codes
    AnnexB,
}

/// Remove emulation prevention bytes (`00 00 03` becomes `00 00`)
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Find the next start code at or after `from`.
///
/// Returns the offset of the first start code byte and the start code length
/// (3 or 4).
pub fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    if data.len() < 3 {
        return None;
    }
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i + 2] > 1 {
            i += 3;
            continue;
        }
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > from && data[i - 1] == 0 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// Split an Annex-B buffer into NAL units (start codes and trailing zero bytes removed)
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let Some((first, len)) = find_start_code(data, 0) else {
        return nals;
    };
    let mut start = first + len;
    loop {
        match find_start_code(data, start) {
            Some((pos, len)) => {
                push_trimmed(&mut nals, &data[start..pos]);
                start = pos + len;
            }
            None => {
                push_trimmed(&mut nals, &data[start..]);
                return nals;
            }
        }
    }
}

fn push_trimmed<'a>(nals: &mut Vec<&'a [u8]>, nal: &'a [u8]) {
    let end = nal.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    if end > 0 {
        nals.push(&nal[..end]);
    }
}

/// Iterate over the NAL units of a length-prefixed buffer
pub fn iter_length_prefixed(data: &[u8], length_size: u8) -> Result<LengthPrefixedIter<'_>> {
    if !(1..=4).contains(&length_size) {
        return Err(CodecError::UnsupportedNalLengthSize { size: length_size });
    }
    Ok(LengthPrefixedIter {
        data,
        length_size: length_size as usize,
    })
}

/// Iterator returned by [`iter_length_prefixed`]
#[derive(Debug, Clone)]
pub struct LengthPrefixedIter<'a> {
    data: &'a [u8],
    length_size: usize,
}

impl<'a> Iterator for LengthPrefixedIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < self.length_size {
            let available = self.data.len();
            self.data = &[];
            return Some(Err(CodecError::invalid_syntax(
                "nal length",
                format!("{} byte prefix, {} bytes left", self.length_size, available),
            )));
        }
        let len = self.data[..self.length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        let body = &self.data[self.length_size..];
        if len > body.len() {
            self.data = &[];
            return Some(Err(CodecError::invalid_syntax(
                "nal length",
                format!("declared {} bytes, {} available", len, body.len()),
            )));
        }
        self.data = &body[len..];
        Some(Ok(&body[..len]))
    }
}

/// Frame NAL units with 4-byte length prefixes
pub fn to_length_prefixed<'a>(nals: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
    let mut out = BytesMut::new();
    for nal in nals {
        out.put_u32(nal.len() as u32);
        out.put_slice(nal);
    }
    out.freeze()
}

/// Rewrite a length-prefixed buffer with `length_size` byte prefixes to 4-byte prefixes
pub fn normalize_length_size(data: &[u8], length_size: u8) -> Result<Bytes> {
    if length_size == 4 {
        // Still walk the buffer so truncated units are rejected
        for nal in iter_length_prefixed(data, 4)? {
            nal?;
        }
        return Ok(Bytes::copy_from_slice(data));
    }
    let nals = iter_length_prefixed(data, length_size)?.collect::<Result<Vec<_>>>()?;
    Ok(to_length_prefixed(nals))
}

/// Convert 4-byte length-prefixed NAL units to Annex-B
pub fn length_prefixed_to_annex_b(data: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(data.len());
    for nal in iter_length_prefixed(data, 4)? {
        out.put_slice(&START_CODE);
        out.put_slice(nal?);
    }
    Ok(out.freeze())
}

/// Convert an Annex-B buffer to 4-byte length-prefixed NAL units
pub fn annex_b_to_length_prefixed(data: &[u8]) -> Bytes {
    to_length_prefixed(split_annex_b(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulation_prevention() {
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03]),
            vec![0x00, 0x00, 0x01, 0x00, 0x00]
        );
        // A lone 03 after a single zero is data
        assert_eq!(strip_emulation_prevention(&[0x00, 0x03, 0x00]), vec![0x00, 0x03, 0x00]);
    }

    #[test]
    fn test_split_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x00, 0x00, 0x00,
            0x01, 0x65, 0x88, 0x00,
        ];
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x67, 0x42][..], &[0x68, 0xCE][..], &[0x65, 0x88][..]]);
    }

    #[test]
    fn test_split_without_start_code() {
        assert!(split_annex_b(&[0x67, 0x42, 0x00]).is_empty());
    }

    #[test]
    fn test_normalize_two_byte_lengths() {
        let data = [0x00, 0x02, 0x65, 0x88, 0x00, 0x01, 0x06];
        let out = normalize_length_size(&data, 2).unwrap();
        assert_eq!(
            &out[..],
            &[0x00, 0x00, 0x00, 0x02, 0x65, 0x88, 0x00, 0x00, 0x00, 0x01, 0x06]
        );
    }

    #[test]
    fn test_truncated_length_prefix_is_rejected() {
        let data = [0x00, 0x00, 0x00, 0x09, 0x65];
        assert!(normalize_length_size(&data, 4).is_err());
        assert!(matches!(
            iter_length_prefixed(&data, 5),
            Err(CodecError::UnsupportedNalLengthSize { size: 5 })
        ));
    }

    #[test]
    fn test_annex_b_conversion() {
        let lp = to_length_prefixed([&[0x67, 0x42][..], &[0x65][..]]);
        let annex_b = length_prefixed_to_annex_b(&lp).unwrap();
        assert_eq!(&annex_b[..], &[0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x65]);
        assert_eq!(annex_b_to_length_prefixed(&annex_b), lp);
    }
}
