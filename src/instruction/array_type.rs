//! The `atype` operand of `newarray`.

use crate::Error::InvalidConstantTag;
use crate::error::Result;

/// Primitive element type for a `newarray` instruction.
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-6.html#jvms-6.5.newarray>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl ArrayType {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ArrayType::Boolean => 4,
            ArrayType::Char => 5,
            ArrayType::Float => 6,
            ArrayType::Double => 7,
            ArrayType::Byte => 8,
            ArrayType::Short => 9,
            ArrayType::Int => 10,
            ArrayType::Long => 11,
        }
    }

    /// # Errors
    /// Returns an error if `code` is not one of the defined `atype` values
    /// 4-11.
    pub fn parse(code: u8) -> Result<ArrayType> {
        let array_type = match code {
            4 => ArrayType::Boolean,
            5 => ArrayType::Char,
            6 => ArrayType::Float,
            7 => ArrayType::Double,
            8 => ArrayType::Byte,
            9 => ArrayType::Short,
            10 => ArrayType::Int,
            11 => ArrayType::Long,
            _ => return Err(InvalidConstantTag(code)),
        };
        Ok(array_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() -> Result<()> {
        for array_type in [
            ArrayType::Boolean,
            ArrayType::Char,
            ArrayType::Float,
            ArrayType::Double,
            ArrayType::Byte,
            ArrayType::Short,
            ArrayType::Int,
            ArrayType::Long,
        ] {
            assert_eq!(array_type, ArrayType::parse(array_type.code())?);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_code() {
        assert!(ArrayType::parse(3).is_err());
        assert!(ArrayType::parse(12).is_err());
    }
}
