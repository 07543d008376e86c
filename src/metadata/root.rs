//! The metadata root: magic, version string and the stream directory.

use crate::{
    file::parser::Parser,
    metadata::streams::StreamHeader,
    Result,
};

/// Magic value at the start of every metadata root (`BSJB`).
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The decoded metadata root.
#[derive(Debug, Clone)]
pub struct Root {
    /// Major version, 1 for every known writer
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// The stream directory in declaration order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Decode the root at the start of `data`, which spans the whole metadata directory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on a wrong magic or a stream outside of `data`, and
    /// [`crate::Error::UnknownStream`] for an unrecognised stream name.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - 0x{:08x}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let _reserved = parser.read_le::<u32>()?;

        let version_length = parser.read_le::<u32>()? as usize;
        let version_bytes = parser.read_bytes(version_length)?;
        let version = String::from_utf8_lossy(version_bytes)
            .trim_end_matches('\0')
            .to_string();
        parser.align(4)?;

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;

        let mut stream_headers = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;
            let end = header.offset.checked_add(header.size).ok_or_else(|| {
                malformed_error!(
                    "Stream offset and size cause integer overflow - {} + {}",
                    header.offset,
                    header.size
                )
            })?;
            if end as usize > data.len() {
                return Err(malformed_error!(
                    "Stream {} exceeds the metadata directory",
                    header.name
                ));
            }

            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            version,
            flags,
            stream_headers,
        })
    }

    /// Bytes of the stream called `name` in `data`, if present
    #[must_use]
    pub fn stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.stream_headers
            .iter()
            .find(|header| header.name == name)
            .and_then(|header| {
                data.get(header.offset as usize..(header.offset + header.size) as usize)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn root(name: &[u8]) -> Vec<u8> {
        let mut data = vec![
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00,
            b'v', b'4', b'.', b'0', b'.', b'3', b'0', b'3', b'1', b'9', 0x00, 0x00,
            0x00, 0x00,
            0x01, 0x00,
            0x34, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
        ];
        data.extend_from_slice(name);
        data.resize(0x34, 0);
        data.extend_from_slice(&[0x00, b'a', b'b', 0x00]);
        data
    }

    #[test]
    fn crafted() {
        let data = root(b"#Strings\0\0\0\0");
        let root = Root::read(&data).unwrap();
        assert_eq!(root.version, "v4.0.30319");
        assert_eq!(root.stream_headers.len(), 1);
        assert_eq!(root.stream(&data, "#Strings").unwrap(), b"\0ab\0");
        assert!(root.stream(&data, "#Blob").is_none());
    }

    #[test]
    fn unknown_stream() {
        let data = root(b"#Foo\0\0\0\0");
        assert!(matches!(
            Root::read(&data),
            Err(crate::Error::UnknownStream(name)) if name == "#Foo"
        ));
    }

    #[test]
    fn bad_magic() {
        let mut data = root(b"#~\0\0");
        data[0] = 0;
        assert!(matches!(Root::read(&data), Err(crate::Error::Malformed { .. })));
    }
}
