//! Method body headers, code and exception sections (ECMA-335 II.25.4).
//!
//! A body starts with either a one byte tiny header (code size in the upper six bits, max stack
//! fixed at 8, no locals, no extra sections) or a twelve byte fat header. Fat bodies may be
//! followed by 4-byte aligned data sections holding exception clauses in small (12 byte) or fat
//! (24 byte) encoding.

use crate::{
    file::io::{read_le, read_le_at},
    metadata::{
        method::{ExceptionClause, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
    },
    Result,
};

/// Max stack implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

const FAT_HEADER_SIZE: usize = 12;
const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;

/// A decoded method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Maximum number of items on the evaluation stack
    pub max_stack: u16,
    /// Zero-initialise locals on entry
    pub init_locals: bool,
    /// `StandAloneSig` token of the locals signature, null if there are no locals
    pub local_var_sig_token: Token,
    /// The raw CIL bytes
    pub code: Vec<u8>,
    /// Exception handling clauses from all extra sections
    pub exception_clauses: Vec<ExceptionClause>,
    /// True if the body used a fat header
    pub is_fat: bool,
}

impl MethodBody {
    /// Decode a body starting at the first byte of `data`. Trailing bytes are ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header, code or a section runs past the end
    /// of `data`, and [`crate::Error::Malformed`] for an unknown header format.
    pub fn read(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Method body is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b11)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = usize::from(first_byte >> 2);
                let code = data.get(1..=size_code).ok_or(out_of_bounds_error!())?;

                Ok(MethodBody {
                    max_stack: TINY_MAX_STACK,
                    init_locals: false,
                    local_var_sig_token: Token::default(),
                    code: code.to_vec(),
                    exception_clauses: Vec::new(),
                    is_fat: false,
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < FAT_HEADER_SIZE {
                    return Err(out_of_bounds_error!());
                }

                let mut cursor = 0;
                let first_duo = read_le_at::<u16>(data, &mut cursor)?;
                let max_stack = read_le_at::<u16>(data, &mut cursor)?;
                let size_code = read_le_at::<u32>(data, &mut cursor)? as usize;
                let local_var_sig_token = Token::new(read_le_at::<u32>(data, &mut cursor)?);

                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat method header size too small - {}",
                        size_header
                    ));
                }

                let code_end = size_header
                    .checked_add(size_code)
                    .ok_or(out_of_bounds_error!())?;
                let code = data
                    .get(size_header..code_end)
                    .ok_or(out_of_bounds_error!())?;

                let flags = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                let exception_clauses = if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    read_sections(data, code_end)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    max_stack,
                    init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig_token,
                    code: code.to_vec(),
                    exception_clauses,
                    is_fat: true,
                })
            }
            _ => Err(malformed_error!(
                "Method header is neither fat nor tiny - {}",
                first_byte
            )),
        }
    }

    /// Encode the body, using a tiny header when nothing requires a fat one.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let tiny = self.code.len() < 64
            && self.max_stack <= TINY_MAX_STACK
            && !self.init_locals
            && self.local_var_sig_token.is_null()
            && self.exception_clauses.is_empty();

        let mut out = Vec::with_capacity(FAT_HEADER_SIZE + self.code.len());
        if tiny {
            out.push(((self.code.len() as u8) << 2) | 0x2);
            out.extend_from_slice(&self.code);
            return out;
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_clauses.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        out.extend_from_slice(&(flags.bits() | (3 << 12)).to_le_bytes());
        out.extend_from_slice(&self.max_stack.to_le_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.local_var_sig_token.value().to_le_bytes());
        out.extend_from_slice(&self.code);

        if !self.exception_clauses.is_empty() {
            out.resize((out.len() + 3) & !3, 0);

            let size = 4 + FAT_CLAUSE_SIZE * self.exception_clauses.len();
            let header = (size as u32) << 8
                | u32::from((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
            out.extend_from_slice(&header.to_le_bytes());
            for clause in &self.exception_clauses {
                for value in [
                    u32::from(clause.flags.bits()),
                    clause.try_offset,
                    clause.try_length,
                    clause.handler_offset,
                    clause.handler_length,
                    clause.class_token_or_filter,
                ] {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }

        out
    }

    /// Length of the code in bytes
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.code.len()
    }
}

fn read_sections(data: &[u8], code_end: usize) -> Result<Vec<ExceptionClause>> {
    let mut clauses = Vec::new();
    let mut cursor = (code_end + 3) & !3;

    loop {
        let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(
            data.get(cursor..).ok_or(out_of_bounds_error!())?,
        )?);
        if !section_flags.contains(SectionFlags::EHTABLE) {
            log::warn!("Skipping method data section without EH table: {section_flags:?}");
            break;
        }

        let start = cursor;
        if section_flags.contains(SectionFlags::FAT_FORMAT) {
            let size = (read_le_at::<u32>(data, &mut cursor)? >> 8) as usize;
            if size < 4 || data.len() < start + size {
                return Err(out_of_bounds_error!());
            }

            for _ in 0..(size - 4) / FAT_CLAUSE_SIZE {
                #[allow(clippy::cast_possible_truncation)]
                let flags = ExceptionHandlerFlags::from_bits_truncate(
                    read_le_at::<u32>(data, &mut cursor)? as u16,
                );
                clauses.push(ExceptionClause {
                    flags,
                    try_offset: read_le_at::<u32>(data, &mut cursor)?,
                    try_length: read_le_at::<u32>(data, &mut cursor)?,
                    handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                    handler_length: read_le_at::<u32>(data, &mut cursor)?,
                    class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
        } else {
            let size = usize::from(read_le::<u8>(
                data.get(cursor + 1..).ok_or(out_of_bounds_error!())?,
            )?);
            if size < 4 || data.len() < start + size {
                return Err(out_of_bounds_error!());
            }

            cursor += 4;
            for _ in 0..(size - 4) / SMALL_CLAUSE_SIZE {
                clauses.push(ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                        data,
                        &mut cursor,
                    )?),
                    try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
        }

        if !section_flags.contains(SectionFlags::MORE_SECTS) {
            break;
        }
        cursor = (start + section_size(data, start, section_flags)? + 3) & !3;
    }

    Ok(clauses)
}

fn section_size(data: &[u8], start: usize, flags: SectionFlags) -> Result<usize> {
    let mut cursor = start;
    let header = read_le_at::<u32>(data, &mut cursor)?;
    if flags.contains(SectionFlags::FAT_FORMAT) {
        Ok((header >> 8) as usize)
    } else {
        Ok(((header >> 8) & 0xFF) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::ClauseKind;

    #[test]
    fn tiny() {
        // ldarg.0; ldc.i4.1; add; ret
        let data = [0x12, 0x02, 0x17, 0x58, 0x2A, 0xFF];

        let body = MethodBody::read(&data).unwrap();
        assert!(!body.is_fat);
        assert!(!body.init_locals);
        assert_eq!(body.max_stack, 8);
        assert_eq!(body.code, [0x02, 0x17, 0x58, 0x2A]);
        assert!(body.local_var_sig_token.is_null());
        assert!(body.exception_clauses.is_empty());

        assert!(MethodBody::read(&[0x12, 0x02]).is_err());
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30, 0x05, 0x00, 0x02, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x11,
            0x00, 0x2A,
        ];

        let body = MethodBody::read(&data).unwrap();
        assert!(body.is_fat);
        assert!(body.init_locals);
        assert_eq!(body.max_stack, 5);
        assert_eq!(body.local_var_sig_token, Token(0x1100_0001));
        assert_eq!(body.code, [0x00, 0x2A]);
    }

    #[test]
    fn fat_small_section() {
        #[rustfmt::skip]
        let data = [
            // header: fat, more sections, size 3 dwords
            0x0B, 0x30, 0x02, 0x00, 0x06, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            // code
            0x00, 0x00, 0xDD, 0x00, 0x26, 0x2A,
            // padding
            0x00, 0x00,
            // small EH section, 16 bytes
            0x01, 0x10, 0x00, 0x00,
            // catch: try 0..2, handler 2..4
            0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x02,
            0x05, 0x00, 0x00, 0x01,
        ];

        let body = MethodBody::read(&data).unwrap();
        assert_eq!(body.code.len(), 6);
        assert_eq!(body.exception_clauses.len(), 1);

        let clause = &body.exception_clauses[0];
        assert_eq!(clause.try_offset, 0);
        assert_eq!(clause.try_length, 2);
        assert_eq!(clause.handler_offset, 2);
        assert_eq!(clause.handler_length, 2);
        assert_eq!(clause.kind(), ClauseKind::Catch(Token(0x0100_0005)));
        assert!(clause.protects(1));
        assert!(!clause.protects(2));
    }

    #[test]
    fn fat_section_write_read() {
        let body = MethodBody {
            max_stack: 2,
            init_locals: false,
            local_var_sig_token: Token::default(),
            code: vec![0x00, 0xDC, 0x2A],
            exception_clauses: vec![ExceptionClause {
                flags: ExceptionHandlerFlags::FINALLY,
                try_offset: 0,
                try_length: 1,
                handler_offset: 1,
                handler_length: 1,
                class_token_or_filter: 0,
            }],
            is_fat: true,
        };

        let encoded = body.write();
        assert_eq!(encoded.len(), 12 + 3 + 1 + 4 + 24);
        assert_eq!(encoded[16], 0x41);

        let decoded = MethodBody::read(&encoded).unwrap();
        assert_eq!(decoded, body);
        assert_eq!(decoded.exception_clauses[0].kind(), ClauseKind::Finally);
    }

    #[test]
    fn multiple_sections() {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x2A, 0x00, 0x00, 0x00,
            // small section with MORE_SECTS, one fault clause
            0x81, 0x10, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00,
            // small section, one filter clause
            0x01, 0x10, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01,
            0x07, 0x00, 0x00, 0x00,
        ];

        let body = MethodBody::read(&data).unwrap();
        assert_eq!(body.exception_clauses.len(), 2);
        assert_eq!(body.exception_clauses[0].kind(), ClauseKind::Fault);
        assert_eq!(body.exception_clauses[1].kind(), ClauseKind::Filter(7));
    }

    #[test]
    fn invalid_header() {
        assert!(MethodBody::read(&[]).is_err());
        assert!(MethodBody::read(&[0x01]).is_err());
        assert!(MethodBody::read(&[0x03, 0x30, 0x00]).is_err());
    }
}
