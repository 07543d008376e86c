use crate::{file::parser::Parser, Result};

/// The stream names a metadata root may declare.
pub const STREAM_NAMES: [&str; 5] = ["#Strings", "#US", "#GUID", "#Blob", "#~"];

/// One entry of the metadata root's stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream from the start of the metadata root
    pub offset: u32,
    /// Stream size in bytes
    pub size: u32,
    /// Stream name, one of [`STREAM_NAMES`]
    pub name: String,
}

impl StreamHeader {
    /// Read a stream header and move `parser` to the next 4-byte aligned entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownStream`] for a name outside [`STREAM_NAMES`].
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let start = parser.pos();
        let name = parser.read_string_utf8()?;
        let consumed = parser.pos() - start;
        if consumed > 32 {
            return Err(malformed_error!("Stream name exceeds 32 bytes - {}", name));
        }
        parser.align(4)?;

        if !STREAM_NAMES.contains(&name.as_str()) {
            return Err(crate::Error::UnknownStream(name));
        }

        Ok(StreamHeader { offset, size, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x6C, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            b'#', b'~', 0x00, 0x00,
            0xFF,
        ];

        let mut parser = Parser::new(&data);
        let header = StreamHeader::read(&mut parser).unwrap();
        assert_eq!(header.offset, 0x6C);
        assert_eq!(header.size, 0x10);
        assert_eq!(header.name, "#~");
        assert_eq!(parser.pos(), 12);
    }

    #[test]
    fn unknown() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            b'#', b'P', b'd', b'b', 0x00, 0x00, 0x00, 0x00,
        ];

        let mut parser = Parser::new(&data);
        assert!(matches!(
            StreamHeader::read(&mut parser),
            Err(crate::Error::UnknownStream(name)) if name == "#Pdb"
        ));
    }
}
