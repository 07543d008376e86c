//! Access to the PE container that carries a CLI module.
//!
//! [`File`] owns the raw bytes (memory-mapped or in memory) together with a parsed
//! [`goblin::pe::PE`] view of them. Before goblin sees the image, [`File`] runs the checks a
//! CLI loader requires and goblin does not enforce:
//!
//! - `MZ` at offset 0 and a `PE\0\0` signature at `e_lfanew`
//! - an optional header of at least 224 bytes
//! - COFF characteristics of a plain CLI executable or library
//!   (`0x010e`, `0x0102`, `0x210e`, `0x2102`)
//! - a CLR runtime header data directory
//!
//! Relative virtual addresses are translated with [`File::rva_to_offset`], which only maps
//! through sections that contain code or initialized data.
//!
//! ```rust,no_run
//! use cilfront::file::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("app.dll"))?;
//! let (clr_rva, clr_size) = file.clr()?;
//! println!("CLI header at 0x{clr_rva:x} ({clr_size} bytes)");
//! # Ok::<(), cilfront::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    file::io::read_le_at,
    Error::{BadImageSignature, Empty, GoblinErr, OptionalHeaderTooSmall, RvaNotMapped,
        TruncatedHeader, UnsupportedCharacteristics},
    Result,
};
use goblin::pe::{section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// Minimum optional header size of a PE32 CLI image.
pub const MIN_OPTIONAL_HEADER_SIZE: u16 = 224;

/// COFF characteristics accepted for CLI images.
pub const ACCEPTED_CHARACTERISTICS: [u16; 4] = [0x210e, 0x010e, 0x0102, 0x2102];

/// Section characteristics that make a section usable for RVA translation
/// (`IMAGE_SCN_CNT_CODE | IMAGE_SCN_CNT_INITIALIZED_DATA`).
const MAPPABLE_SECTION: u32 = 0x60;

/// Storage of the raw image bytes.
pub trait Backend: Send + Sync {
    /// Get a bounds checked slice of the image
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not covered by the image.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// The whole image
    fn data(&self) -> &[u8];

    /// Image size in bytes
    fn len(&self) -> usize;
}

#[self_referencing]
/// A loaded PE image.
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Map and load the image at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or one of the format
    /// errors if it is not a CLI image.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;
        Self::load(input)
    }

    /// Load an image from an owned buffer.
    ///
    /// # Errors
    /// Returns one of the format errors if `data` is not a CLI image.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);
        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        check_headers(data.data())?;

        let data = Box::new(data);
        File::try_new(data, |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;
            match pe.header.optional_header {
                Some(optional_header) => {
                    if optional_header
                        .data_directories
                        .get_clr_runtime_header()
                        .is_none()
                    {
                        Err(malformed_error!(
                            "File does not have a CLR runtime header directory"
                        ))
                    } else {
                        Ok(pe)
                    }
                }
                None => Err(malformed_error!("File does not have an OptionalHeader")),
            }
        })
    }

    /// Image size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// True for an empty image, which [`File`] never holds
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole image
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// A bounds checked slice of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not covered by the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// COFF characteristics
    #[must_use]
    pub fn characteristics(&self) -> u16 {
        self.with_pe(|pe| pe.header.coff_header.characteristics)
    }

    /// Section headers in file order
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// RVA and size of the CLR runtime header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the directory is missing.
    pub fn clr(&self) -> Result<(u32, u32)> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .and_then(|header| {
                    header
                        .data_directories
                        .get_clr_runtime_header()
                        .map(|dir| (dir.virtual_address, dir.size))
                })
                .ok_or_else(|| malformed_error!("File does not have a CLR runtime header"))
        })
    }

    /// Translate a relative virtual address to a file offset.
    ///
    /// Only sections flagged as code or initialized data take part in the lookup.
    ///
    /// # Errors
    /// Returns [`crate::Error::RvaNotMapped`] if no such section covers `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.with_pe(|pe| {
            for section in &pe.sections {
                if section.characteristics & MAPPABLE_SECTION == 0 {
                    continue;
                }

                let Some(section_end) = section.virtual_address.checked_add(section.virtual_size)
                else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        section.virtual_size
                    ));
                };

                if rva >= section.virtual_address && rva < section_end {
                    return Ok((rva - section.virtual_address) as usize
                        + section.pointer_to_raw_data as usize);
                }
            }

            Err(RvaNotMapped(rva))
        })
    }

    /// Slice of `len` bytes starting at `rva`.
    ///
    /// # Errors
    /// Returns [`crate::Error::RvaNotMapped`] or [`crate::Error::OutOfBounds`].
    pub fn rva_slice(&self, rva: u32, len: usize) -> Result<&[u8]> {
        let offset = self.rva_to_offset(rva)?;
        self.data_slice(offset, len)
    }

    /// Everything from `rva` to the end of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::RvaNotMapped`] if `rva` is not covered by a section.
    pub fn rva_tail(&self, rva: u32) -> Result<&[u8]> {
        let offset = self.rva_to_offset(rva)?;
        self.data().get(offset..).ok_or(out_of_bounds_error!())
    }
}

/// Run the header checks goblin does not perform.
fn check_headers(data: &[u8]) -> Result<()> {
    if data.len() < 0x40 {
        return Err(TruncatedHeader("DOS header"));
    }
    if &data[0..2] != b"MZ" {
        return Err(BadImageSignature);
    }

    let mut offset = 0x3c;
    let lfanew = read_le_at::<u32>(data, &mut offset)? as usize;

    // PE signature and the 20 byte COFF header
    if lfanew.checked_add(24).is_none_or(|end| end > data.len()) {
        return Err(TruncatedHeader("COFF header"));
    }
    if &data[lfanew..lfanew + 4] != b"PE\0\0" {
        return Err(BadImageSignature);
    }

    let mut offset = lfanew + 20;
    let optional_size = read_le_at::<u16>(data, &mut offset)?;
    let characteristics = read_le_at::<u16>(data, &mut offset)?;

    if optional_size < MIN_OPTIONAL_HEADER_SIZE {
        return Err(OptionalHeaderTooSmall(optional_size));
    }
    if !ACCEPTED_CHARACTERISTICS.contains(&characteristics) {
        return Err(UnsupportedCharacteristics(characteristics));
    }
    if offset + optional_size as usize > data.len() {
        return Err(TruncatedHeader("optional header"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::ImageBuilder, Error};

    fn image() -> Vec<u8> {
        ImageBuilder::new("Sample").build().unwrap()
    }

    fn lfanew(data: &[u8]) -> usize {
        u32::from_le_bytes([data[0x3c], data[0x3d], data[0x3e], data[0x3f]]) as usize
    }

    #[test]
    fn load_builder_image() {
        let file = File::from_mem(image()).unwrap();
        assert!(!file.is_empty());
        assert_eq!(file.characteristics(), 0x2102);

        let (clr_rva, clr_size) = file.clr().unwrap();
        assert_eq!(clr_size, 72);
        let offset = file.rva_to_offset(clr_rva).unwrap();
        assert_eq!(file.data_slice(offset, 4).unwrap(), &72u32.to_le_bytes());
        assert!(file.rva_tail(clr_rva).unwrap().len() >= 72);
    }

    #[test]
    fn rva_not_mapped() {
        let file = File::from_mem(image()).unwrap();
        assert!(matches!(file.rva_to_offset(0x10), Err(Error::RvaNotMapped(0x10))));
        assert!(matches!(
            file.rva_to_offset(0x00FF_0000),
            Err(Error::RvaNotMapped(_))
        ));
    }

    #[test]
    fn empty() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Error::Empty)));
    }

    #[test]
    fn bad_signatures() {
        let mut data = image();
        data[0] = b'X';
        assert!(matches!(File::from_mem(data), Err(Error::BadImageSignature)));

        let mut data = image();
        let pe = lfanew(&data);
        data[pe + 2] = 1;
        assert!(matches!(File::from_mem(data), Err(Error::BadImageSignature)));

        assert!(matches!(
            File::from_mem(vec![b'M', b'Z', 0, 0]),
            Err(Error::TruncatedHeader(_))
        ));
    }

    #[test]
    fn optional_header_too_small() {
        let mut data = image();
        let pe = lfanew(&data);
        data[pe + 20..pe + 22].copy_from_slice(&200u16.to_le_bytes());
        assert!(matches!(
            File::from_mem(data),
            Err(Error::OptionalHeaderTooSmall(200))
        ));
    }

    #[test]
    fn unsupported_characteristics() {
        let mut data = image();
        let pe = lfanew(&data);
        data[pe + 22..pe + 24].copy_from_slice(&0x0022u16.to_le_bytes());
        assert!(matches!(
            File::from_mem(data),
            Err(Error::UnsupportedCharacteristics(0x0022))
        ));
    }
}
