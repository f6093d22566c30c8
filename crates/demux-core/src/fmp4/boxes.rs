//! ISO base media box headers and child iteration

use rplay_codec_core::ByteReader;

use crate::error::{DemuxError, Result};

/// Box type code
pub type FourCc = [u8; 4];

/// A parsed box header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type
    pub kind: FourCc,
    /// Header length: 8, or 16 with a 64-bit size
    pub header_len: usize,
    /// Total box size, header included
    pub size: u64,
}

impl BoxHeader {
    /// Parse a header at the start of `data`.
    ///
    /// Returns `Ok(None)` while the header itself is incomplete. A size of
    /// zero ("to end of file") cannot be honoured on a stream and is an error.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 8 {
            return Ok(None);
        }
        let mut r = ByteReader::new(data);
        let size32 = r.read_u32()?;
        let kind = r.read_fourcc()?;
        let (size, header_len) = match size32 {
            0 => {
                return Err(DemuxError::malformed(
                    "fmp4",
                    format!("box '{}' extends to end of file", fourcc_name(&kind)),
                ))
            }
            1 => {
                if data.len() < 16 {
                    return Ok(None);
                }
                (r.read_u64()?, 16)
            }
            size => (size as u64, 8),
        };
        if size < header_len as u64 {
            return Err(DemuxError::malformed(
                "fmp4",
                format!("box '{}' size {} below header size", fourcc_name(&kind), size),
            ));
        }
        Ok(Some(Self {
            kind,
            header_len,
            size,
        }))
    }

    /// Body length
    pub fn body_len(&self) -> u64 {
        self.size - self.header_len as u64
    }
}

/// Printable box type
pub fn fourcc_name(kind: &FourCc) -> String {
    kind.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Iterator over the child boxes of a container body
#[derive(Debug, Clone)]
pub struct Children<'a> {
    data: &'a [u8],
}

/// Iterate over the boxes packed in `body`
pub fn children(body: &[u8]) -> Children<'_> {
    Children { data: body }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<(FourCc, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let header = match BoxHeader::parse(self.data) {
            Ok(Some(header)) => header,
            Ok(None) => {
                self.data = &[];
                return Some(Err(DemuxError::malformed("fmp4", "truncated child box header")));
            }
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };
        if header.size > self.data.len() as u64 {
            let kind = fourcc_name(&header.kind);
            self.data = &[];
            return Some(Err(DemuxError::malformed(
                "fmp4",
                format!("child box '{}' overruns its parent", kind),
            )));
        }
        let size = header.size as usize;
        let body = &self.data[header.header_len..size];
        self.data = &self.data[size..];
        Some(Ok((header.kind, body)))
    }
}

/// Find the first child of the given type
pub fn find_child<'a>(body: &'a [u8], kind: &FourCc) -> Result<Option<&'a [u8]>> {
    for child in children(body) {
        let (child_kind, child_body) = child?;
        if &child_kind == kind {
            return Ok(Some(child_body));
        }
    }
    Ok(None)
}

/// Version and flags of a full box, plus a reader positioned after them
pub fn full_box(body: &[u8]) -> Result<(u8, u32, ByteReader<'_>)> {
    let mut r = ByteReader::new(body);
    let word = r.read_u32()?;
    Ok(((word >> 24) as u8, word & 0x00FF_FFFF, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        let mut data = vec![0, 0, 0, 16];
        data.extend_from_slice(b"free");
        assert_eq!(BoxHeader::parse(&data[..7]).unwrap(), None);
        let header = BoxHeader::parse(&data).unwrap().unwrap();
        assert_eq!((&header.kind, header.header_len, header.size), (b"free", 8, 16));

        let mut large = vec![0, 0, 0, 1];
        large.extend_from_slice(b"mdat");
        assert_eq!(BoxHeader::parse(&large).unwrap(), None);
        large.extend_from_slice(&(1u64 << 33).to_be_bytes());
        let header = BoxHeader::parse(&large).unwrap().unwrap();
        assert_eq!((header.header_len, header.size), (16, 1 << 33));
        assert_eq!(header.body_len(), (1 << 33) - 16);
    }

    #[test]
    fn test_rejects_open_ended_and_undersized_boxes() {
        let mut open = vec![0, 0, 0, 0];
        open.extend_from_slice(b"mdat");
        assert!(BoxHeader::parse(&open).is_err());
        let mut tiny = vec![0, 0, 0, 4];
        tiny.extend_from_slice(b"moof");
        assert!(BoxHeader::parse(&tiny).is_err());
    }

    #[test]
    fn test_children_and_overrun() {
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 0, 0, 9]);
        body.extend_from_slice(b"abcd");
        body.push(7);
        body.extend_from_slice(&[0, 0, 0, 8]);
        body.extend_from_slice(b"efgh");
        let kinds: Vec<_> = children(&body).map(|c| c.unwrap().0).collect();
        assert_eq!(kinds, vec![*b"abcd", *b"efgh"]);
        assert_eq!(find_child(&body, b"abcd").unwrap(), Some(&[7u8][..]));
        assert_eq!(find_child(&body, b"zzzz").unwrap(), None);

        body[3] = 200;
        assert!(children(&body).next().unwrap().is_err());
    }
}
