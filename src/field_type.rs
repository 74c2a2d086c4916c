//! Field and method descriptor parsing.
//!
//! This is the source-of-truth type model consumed (not produced) by the
//! instruction step effects: an `invoke*` or field-access instruction needs
//! to know how many stack slots its arguments occupy, which this module
//! answers without the core needing to understand class hierarchy at all.
//!
//! See: <https://docs.oracle.com/javase/specs/jvms/se24/html/jvms-4.html#jvms-4.3.2>

use crate::Error::{InvalidFieldTypeCode, InvalidFieldTypeDescriptor, InvalidMethodDescriptor};
use crate::base_type::BaseType;
use crate::error::Result;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// A JVM field descriptor: a primitive, a class/interface reference, or an
/// array of one of those.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Returns the leading descriptor code for this type.
    #[must_use]
    pub fn code(&self) -> char {
        match self {
            FieldType::Base(base_type) => base_type.code(),
            FieldType::Object(..) => 'L',
            FieldType::Array(..) => '[',
        }
    }

    /// Returns the Java source class name for this type.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.class_name().to_string(),
            FieldType::Object(class_name) => class_name.to_string(),
            FieldType::Array(component_type) => match &**component_type {
                FieldType::Base(base_type) => format!("[{}", base_type.code()),
                FieldType::Object(class_name) => format!("[L{class_name};"),
                FieldType::Array(_) => format!("[{}", component_type.class_name()),
            },
        }
    }

    /// Returns the full descriptor string for this type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.code().to_string(),
            FieldType::Object(class_name) => format!("L{class_name};"),
            FieldType::Array(component_type) => {
                format!("[{}", component_type.descriptor())
            }
        }
    }

    /// Number of stack/local slots this type occupies: 2 for `long`/`double`,
    /// 1 for everything else (arrays and objects are always single-slot
    /// references).
    #[must_use]
    pub fn slot_count(&self) -> u8 {
        match self {
            FieldType::Base(base_type) if base_type.is_wide() => 2,
            _ => 1,
        }
    }

    /// Parses a single, complete field descriptor (no trailing characters
    /// allowed).
    ///
    /// # Errors
    /// Returns an error if the descriptor is malformed or has trailing data.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut chars = descriptor.chars().peekable();
        let field_type = Self::parse_one(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
        }
        Ok(field_type)
    }

    /// Parses a method descriptor `(ArgTypes)ReturnType` into its parameter
    /// types and an optional return type (`None` for `void`).
    ///
    /// # Errors
    /// Returns an error if the descriptor is malformed.
    pub fn parse_method_descriptor(
        descriptor: &str,
    ) -> Result<(Vec<FieldType>, Option<FieldType>)> {
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        }

        let mut parameters = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                None => return Err(InvalidMethodDescriptor(descriptor.to_string())),
                _ => parameters.push(
                    Self::parse_one(descriptor, &mut chars)
                        .map_err(|_| InvalidMethodDescriptor(descriptor.to_string()))?,
                ),
            }
        }

        let return_type = match chars.peek() {
            Some('V') => {
                chars.next();
                None
            }
            Some(_) => Some(
                Self::parse_one(descriptor, &mut chars)
                    .map_err(|_| InvalidMethodDescriptor(descriptor.to_string()))?,
            ),
            None => return Err(InvalidMethodDescriptor(descriptor.to_string())),
        };

        Ok((parameters, return_type))
    }

    /// Consumes one field type from `chars`, recursing through any leading
    /// `[` array markers. The sole descriptor-grammar parser in this module;
    /// both [`Self::parse`] and [`Self::parse_method_descriptor`] drive it
    /// over the same `Peekable` cursor rather than each walking the grammar
    /// themselves.
    fn parse_one(descriptor: &str, chars: &mut Peekable<Chars>) -> Result<FieldType> {
        match chars.next() {
            Some('[') => Ok(FieldType::Array(Box::new(Self::parse_one(
                descriptor, chars,
            )?))),
            Some('L') => {
                let mut class_name = String::new();
                let mut terminated = false;
                for ch in chars.by_ref() {
                    if ch == ';' {
                        terminated = true;
                        break;
                    }
                    class_name.push(ch);
                }
                if terminated && !class_name.is_empty() {
                    Ok(FieldType::Object(class_name))
                } else {
                    Err(InvalidFieldTypeDescriptor(descriptor.to_string()))
                }
            }
            Some(code) => BaseType::parse(code)
                .map(FieldType::Base)
                .map_err(|_| InvalidFieldTypeCode(code)),
            None => Err(InvalidFieldTypeDescriptor(descriptor.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base_type) => write!(f, "{}", base_type.class_name()),
            FieldType::Object(class_name) => write!(f, "{class_name}"),
            FieldType::Array(component_type) => write!(f, "{component_type}[]"),
        }
    }
}
