//! The CLI header (`IMAGE_COR20_HEADER`) located through the CLR runtime data directory.

use crate::{file::parser::Parser, metadata::token::Token, Result};

/// Size of the CLI header in bytes.
pub const COR20_HEADER_SIZE: usize = 72;

/// The fields of the CLI header a front end consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Header size, 72 for every known runtime
    pub cb: u32,
    /// Minimum runtime major version
    pub major_runtime_version: u16,
    /// Minimum runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Runtime flags (`COMIMAGE_FLAGS_*`)
    pub flags: u32,
    /// MethodDef or File token of the entry point, null for libraries
    pub entry_point_token: Token,
    /// RVA of the managed resources
    pub resource_rva: u32,
    /// Size of the managed resources
    pub resource_size: u32,
}

impl Cor20Header {
    /// Decode the header from `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedHeader`] if fewer than 72 bytes are available, or
    /// [`crate::Error::Malformed`] if the metadata directory is empty.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(crate::Error::TruncatedHeader("CLI header"));
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("CLI header has no metadata directory"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = Token::new(parser.read_le::<u32>()?);
        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let mut data = vec![
            0x48, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x05, 0x00,
            0x00, 0x21, 0x00, 0x00,
            0x40, 0x02, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x06,
        ];
        data.resize(COR20_HEADER_SIZE, 0);

        let header = Cor20Header::read(&data).unwrap();
        assert_eq!(header.cb, 72);
        assert_eq!(header.major_runtime_version, 2);
        assert_eq!(header.minor_runtime_version, 5);
        assert_eq!(header.meta_data_rva, 0x2100);
        assert_eq!(header.meta_data_size, 0x240);
        assert_eq!(header.flags, 1);
        assert_eq!(header.entry_point_token, Token(0x0600_0003));
    }

    #[test]
    fn truncated() {
        assert!(matches!(
            Cor20Header::read(&[0x48, 0x00]),
            Err(crate::Error::TruncatedHeader(_))
        ));
    }
}
