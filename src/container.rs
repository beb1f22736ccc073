//! The on-disk bytecode container: a 20-byte header followed by a code
//! section and a length-prefixed string-data section.
//!
//! This is the serialized answer to "run a compiled program without
//! recompiling it": an explicit magic/version header, validated length
//! fields, and a `thiserror` enum (`ContainerError`) for every way the
//! bytes on disk can be lying.

use crate::error::ContainerError;
use std::rc::Rc;

const MAGIC: &[u8; 8] = b"OAKSCODE";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

pub struct Container {
    pub code: Vec<u8>,
    pub data: Vec<u8>,
}

impl Container {
    pub fn new(code: Vec<u8>, data: Vec<u8>) -> Self {
        Container { code, data }
    }

    /// Serialize to the wire format: `OAKSCODE` + version + code size +
    /// data size, then the two sections back to back.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.code.len() + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::TruncatedHeader(bytes.len()));
        }
        if &bytes[0..8] != MAGIC {
            return Err(ContainerError::BadMagic);
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version > VERSION {
            return Err(ContainerError::UnsupportedVersion {
                found: version,
                supported: VERSION,
            });
        }
        let code_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap());

        let remaining_after_header = bytes.len() - HEADER_LEN;
        if code_size as usize > remaining_after_header {
            return Err(ContainerError::CodeSizeOverflow {
                declared: code_size,
                remaining: remaining_after_header,
            });
        }
        let code_start = HEADER_LEN;
        let code_end = code_start + code_size as usize;
        let remaining_after_code = bytes.len() - code_end;
        if data_size as usize > remaining_after_code {
            return Err(ContainerError::DataSizeOverflow {
                declared: data_size,
                remaining: remaining_after_code,
            });
        }
        let data_start = code_end;
        let data_end = data_start + data_size as usize;

        Ok(Container {
            code: bytes[code_start..code_end].to_vec(),
            data: bytes[data_start..data_end].to_vec(),
        })
    }

    /// Decode the data section into an ordered string table: record `i`'s
    /// offset in this `Vec` is exactly the index the emitter assigned it,
    /// so `LOAD_CONST_STR`/`LOAD`/`STORE`/etc. can index straight into it.
    pub fn decode_strings(&self) -> Result<Vec<Rc<str>>, ContainerError> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset < self.data.len() {
            if offset + 4 > self.data.len() {
                return Err(ContainerError::DataRecordOverrun { offset });
            }
            let len = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > self.data.len() {
                return Err(ContainerError::DataRecordOverrun { offset });
            }
            let text = std::str::from_utf8(&self.data[offset..offset + len])
                .map_err(|_| ContainerError::InvalidUtf8 { offset })?;
            out.push(Rc::from(text));
            offset += len;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        let mut data = Vec::new();
        for s in ["hello", "world"] {
            data.extend_from_slice(&(s.len() as u32).to_le_bytes());
            data.extend_from_slice(s.as_bytes());
        }
        Container::new(vec![0, 1, 2, 3], data)
    }

    #[test]
    fn round_trips_through_bytes() {
        let c = sample();
        let bytes = c.to_bytes();
        let back = Container::from_bytes(&bytes).unwrap();
        assert_eq!(back.code, c.code);
        assert_eq!(back.data, c.data);
    }

    #[test]
    fn decodes_the_string_table_in_order() {
        let c = sample();
        let strings = c.decode_strings().unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(&*strings[0], "hello");
        assert_eq!(&*strings[1], "world");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Container::from_bytes(&bytes),
            Err(ContainerError::BadMagic)
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            Container::from_bytes(&[0u8; 4]),
            Err(ContainerError::TruncatedHeader(4))
        ));
    }

    #[test]
    fn rejects_code_size_overflow() {
        let mut bytes = sample().to_bytes();
        // Inflate the declared code size past what's actually present.
        bytes[12..16].copy_from_slice(&9999u32.to_le_bytes());
        assert!(matches!(
            Container::from_bytes(&bytes),
            Err(ContainerError::CodeSizeOverflow { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = sample().to_bytes();
        bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            Container::from_bytes(&bytes),
            Err(ContainerError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
