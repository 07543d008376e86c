use widestring::U16String;

use crate::{
    file::io::read_le,
    metadata::signatures::ELEMENT_TYPE,
    Result,
};

/// A default value from the `Constant` table.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ConstantValue {
    Boolean(bool),
    Char(u16),
    I1(i8),
    U1(u8),
    I2(i16),
    U2(u16),
    I4(i32),
    U4(u32),
    I8(i64),
    U8(u64),
    R4(f32),
    R8(f64),
    String(U16String),
    /// A null object reference
    Null,
}

impl ConstantValue {
    /// Decode the value blob of a constant of `element_type`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a short blob and
    /// [`crate::Error::UnknownElementType`] for a kind constants cannot have.
    pub fn parse(element_type: u8, blob: &[u8]) -> Result<ConstantValue> {
        Ok(match element_type {
            ELEMENT_TYPE::BOOLEAN => ConstantValue::Boolean(read_le::<u8>(blob)? != 0),
            ELEMENT_TYPE::CHAR => ConstantValue::Char(read_le(blob)?),
            ELEMENT_TYPE::I1 => ConstantValue::I1(read_le(blob)?),
            ELEMENT_TYPE::U1 => ConstantValue::U1(read_le(blob)?),
            ELEMENT_TYPE::I2 => ConstantValue::I2(read_le(blob)?),
            ELEMENT_TYPE::U2 => ConstantValue::U2(read_le(blob)?),
            ELEMENT_TYPE::I4 => ConstantValue::I4(read_le(blob)?),
            ELEMENT_TYPE::U4 => ConstantValue::U4(read_le(blob)?),
            ELEMENT_TYPE::I8 => ConstantValue::I8(read_le(blob)?),
            ELEMENT_TYPE::U8 => ConstantValue::U8(read_le(blob)?),
            ELEMENT_TYPE::R4 => ConstantValue::R4(read_le(blob)?),
            ELEMENT_TYPE::R8 => ConstantValue::R8(read_le(blob)?),
            ELEMENT_TYPE::STRING => {
                let units = blob
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect::<Vec<_>>();
                ConstantValue::String(U16String::from_vec(units))
            }
            ELEMENT_TYPE::CLASS => ConstantValue::Null,
            other => return Err(crate::Error::UnknownElementType(other)),
        })
    }
}
