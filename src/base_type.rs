//! Primitive descriptor codes, as used in field and method descriptors.
//!
//! See: <https://docs.oracle.com/javase/specs/jvms/se23/html/jvms-4.html#jvms-4.3.2>

use crate::Error::InvalidBaseTypeCode;
use crate::error::Result;
use std::fmt;

/// One of the eight JVM primitive types, identified by its one-letter
/// descriptor code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    Boolean,
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
}

/// `(descriptor code, Java source name)` for every primitive, in
/// declaration order. `parse` scans this table instead of mirroring
/// `code`'s match in reverse, so the two directions can't drift apart.
const DESCRIPTORS: [(char, &str); 8] = [
    ('Z', "boolean"),
    ('B', "byte"),
    ('C', "char"),
    ('D', "double"),
    ('F', "float"),
    ('I', "int"),
    ('J', "long"),
    ('S', "short"),
];

impl BaseType {
    /// Returns the descriptor code for this type.
    #[must_use]
    pub const fn code(&self) -> char {
        DESCRIPTORS[*self as usize].0
    }

    /// Returns the Java source name for this type.
    #[must_use]
    pub const fn class_name(&self) -> &'static str {
        DESCRIPTORS[*self as usize].1
    }

    /// Whether this type occupies two stack slots / two local slots.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, BaseType::Long | BaseType::Double)
    }

    /// Parses a single descriptor code character.
    ///
    /// # Errors
    /// Returns an error if the code is not one of the eight defined codes.
    pub fn parse(code: char) -> Result<BaseType> {
        DESCRIPTORS
            .iter()
            .position(|&(descriptor_code, _)| descriptor_code == code)
            .map(Self::from_index)
            .ok_or(InvalidBaseTypeCode(code))
    }

    /// Inverse of `*self as usize`; kept as the one place that knows the
    /// enum's declaration order matches `DESCRIPTORS`.
    fn from_index(index: usize) -> BaseType {
        match index {
            0 => BaseType::Boolean,
            1 => BaseType::Byte,
            2 => BaseType::Char,
            3 => BaseType::Double,
            4 => BaseType::Float,
            5 => BaseType::Int,
            6 => BaseType::Long,
            _ => BaseType::Short,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.class_name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_invalid_code() {
        assert_eq!(Err(InvalidBaseTypeCode('0')), BaseType::parse('0'));
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        for base_type in [
            BaseType::Boolean,
            BaseType::Byte,
            BaseType::Char,
            BaseType::Double,
            BaseType::Float,
            BaseType::Int,
            BaseType::Long,
            BaseType::Short,
        ] {
            let code = base_type.code();
            assert_eq!(base_type, BaseType::parse(code)?);
        }
        Ok(())
    }

    #[test]
    fn test_class_names_match_declaration_order() {
        for (index, (code, name)) in DESCRIPTORS.iter().enumerate() {
            let base_type = BaseType::from_index(index);
            assert_eq!(*code, base_type.code());
            assert_eq!(*name, base_type.class_name());
        }
    }

    #[test]
    fn test_is_wide() {
        assert!(BaseType::Long.is_wide());
        assert!(BaseType::Double.is_wide());
        assert!(!BaseType::Int.is_wide());
    }

    #[test]
    fn test_display() {
        assert_eq!("int", BaseType::Int.to_string());
        assert_eq!("boolean", BaseType::Boolean.to_string());
    }
}
