//! The PE32 container around a single `.text` section.
//!
//! The layout is fixed: a minimal DOS header pointing at the PE signature, the COFF header, a
//! 224 byte optional header with 16 data directories and one section header. The section holds
//! everything the image carries and is the only thing the CLI header directory points into.

use crate::Result;

/// RVA of the `.text` section
pub(crate) const TEXT_RVA: u32 = 0x2000;

const FILE_ALIGNMENT: u32 = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const PE_OFFSET: u32 = 0x80;
const OPTIONAL_HEADER_SIZE: u16 = 224;
const DATA_DIRECTORIES: usize = 16;
const CLR_DIRECTORY: usize = 14;

/// `IMAGE_FILE_EXECUTABLE_IMAGE | IMAGE_FILE_32BIT_MACHINE | IMAGE_FILE_DLL`
const CHARACTERISTICS: u16 = 0x2102;
/// `CNT_CODE | MEM_EXECUTE | MEM_READ`
const TEXT_CHARACTERISTICS: u32 = 0x6000_0020;

fn align(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Wrap `text` in a PE32 image whose CLI header is at `clr_rva`.
pub(crate) fn write_image(text: &[u8], clr_rva: u32, clr_size: u32) -> Result<Vec<u8>> {
    let virtual_size = u32::try_from(text.len())
        .map_err(|_| malformed_error!("Section of {} bytes is too large", text.len()))?;
    let raw_size = align(virtual_size, FILE_ALIGNMENT);
    let image_size = TEXT_RVA + align(virtual_size.max(1), SECTION_ALIGNMENT);

    let mut out = Vec::with_capacity((FILE_ALIGNMENT + raw_size) as usize);

    out.extend_from_slice(b"MZ");
    out.resize(0x3C, 0);
    put_u32(&mut out, PE_OFFSET);
    out.resize(PE_OFFSET as usize, 0);

    out.extend_from_slice(b"PE\0\0");
    put_u16(&mut out, 0x014C);
    put_u16(&mut out, 1);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u16(&mut out, OPTIONAL_HEADER_SIZE);
    put_u16(&mut out, CHARACTERISTICS);

    let optional_start = out.len();
    put_u16(&mut out, 0x010B);
    out.push(8);
    out.push(0);
    put_u32(&mut out, raw_size);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, TEXT_RVA);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0x0040_0000);
    put_u32(&mut out, SECTION_ALIGNMENT);
    put_u32(&mut out, FILE_ALIGNMENT);
    put_u16(&mut out, 4);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 4);
    put_u16(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, image_size);
    put_u32(&mut out, FILE_ALIGNMENT);
    put_u32(&mut out, 0);
    put_u16(&mut out, 3);
    put_u16(&mut out, 0x8540);
    put_u32(&mut out, 0x0010_0000);
    put_u32(&mut out, 0x1000);
    put_u32(&mut out, 0x0010_0000);
    put_u32(&mut out, 0x1000);
    put_u32(&mut out, 0);
    put_u32(&mut out, DATA_DIRECTORIES as u32);
    for directory in 0..DATA_DIRECTORIES {
        if directory == CLR_DIRECTORY {
            put_u32(&mut out, clr_rva);
            put_u32(&mut out, clr_size);
        } else {
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
        }
    }
    debug_assert_eq!(out.len() - optional_start, usize::from(OPTIONAL_HEADER_SIZE));

    out.extend_from_slice(b".text\0\0\0");
    put_u32(&mut out, virtual_size);
    put_u32(&mut out, TEXT_RVA);
    put_u32(&mut out, raw_size);
    put_u32(&mut out, FILE_ALIGNMENT);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u32(&mut out, TEXT_CHARACTERISTICS);

    out.resize(FILE_ALIGNMENT as usize, 0);
    out.extend_from_slice(text);
    out.resize((FILE_ALIGNMENT + raw_size) as usize, 0);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers() {
        let image = write_image(&[0xAA; 100], TEXT_RVA, 72).unwrap();
        assert_eq!(image.len(), 0x400);
        assert_eq!(&image[..2], b"MZ");
        assert_eq!(&image[0x80..0x84], b"PE\0\0");
        assert_eq!(u16::from_le_bytes([image[0x94], image[0x95]]), 224);
        assert_eq!(u16::from_le_bytes([image[0x96], image[0x97]]), 0x2102);
        assert_eq!(image[0x200], 0xAA);

        let clr = 0x98 + 96 + CLR_DIRECTORY * 8;
        assert_eq!(&image[clr..clr + 4], &TEXT_RVA.to_le_bytes());
        assert_eq!(&image[clr + 4..clr + 8], &72u32.to_le_bytes());
    }
}
