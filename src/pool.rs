//! A minimal constant pool.
//!
//! This is the class-file envelope's oracle as consumed by the instruction
//! set: `get`/`try_get` resolve a constant reference to its value; `add`
//! grows the pool when reassembling. Only the constant kinds an instruction's
//! `decode`/`step` actually touches are modeled; runtime-visible-annotation
//! and record/module bootstrap plumbing is out of scope.
//!
//! See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.4>

use crate::Error::{InvalidConstantPoolIndex, InvalidConstantPoolIndexType};
use crate::error::Result;
use std::fmt;

/// The kind of a `MethodHandle` reference, per JVMS table 4.4.8-A.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

/// A single constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: ReferenceKind,
        reference_index: u16,
    },
    MethodType(u16),
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
}

impl Constant {
    /// Whether this constant occupies two consecutive pool slots (long and
    /// double do, per JVMS 4.4.5).
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ConstantEntry {
    Placeholder,
    Constant(Constant),
}

/// A 1-based, growable table of constants referenced from method bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantPool {
    constants: Vec<ConstantEntry>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool with the reserved index-0 placeholder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constants: vec![ConstantEntry::Placeholder],
        }
    }

    /// Number of occupied slots, including the trailing placeholder that
    /// follows every long/double entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constants.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a constant without returning its index. Long/Double entries
    /// also append a placeholder occupying the following slot.
    pub fn push(&mut self, constant: Constant) {
        let add_placeholder = constant.is_wide();
        self.constants.push(ConstantEntry::Constant(constant));
        if add_placeholder {
            self.constants.push(ConstantEntry::Placeholder);
        }
    }

    /// Appends a constant and returns its 1-based index.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed 65,534 constants.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        let index = u16::try_from(self.constants.len())?;
        self.push(constant);
        Ok(index)
    }

    /// Returns the constant at `index`, or `None` if the index is invalid.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.try_get(index).ok()
    }

    /// Returns the constant at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is 0, out of bounds, or a placeholder
    /// slot following a long/double.
    pub fn try_get(&self, index: u16) -> Result<&Constant> {
        match self.constants.get(index as usize) {
            Some(ConstantEntry::Constant(constant)) => Ok(constant),
            Some(ConstantEntry::Placeholder) | None => Err(InvalidConstantPoolIndex(index)),
        }
    }

    /// Resolves a `Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or not a `Utf8` entry.
    pub fn try_get_utf8(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Resolves a `Class` entry at `index` to its name.
    ///
    /// # Errors
    /// Returns an error if the index does not resolve to a `Class` entry
    /// whose name index is a `Utf8` entry.
    pub fn try_get_class(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Class(name_index) => self.try_get_utf8(*name_index),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Adds a `Utf8` constant and returns its index.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_utf8<S: Into<String>>(&mut self, value: S) -> Result<u16> {
        self.add(Constant::Utf8(value.into()))
    }

    /// Adds a `Class` constant (and its backing `Utf8` name) and returns the
    /// `Class` entry's index.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_class<S: Into<String>>(&mut self, name: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    /// Adds a `NameAndType` constant and returns its index.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_name_and_type<S: Into<String>>(&mut self, name: S, descriptor: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Adds a `MethodRef` constant and returns its index.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_method_ref<S: Into<String>>(
        &mut self,
        class_name: S,
        method_name: S,
        descriptor: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(method_name, descriptor)?;
        self.add(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }
}

impl fmt::Display for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ConstantPool ({} entries):", self.len())?;
        for (index, entry) in self.constants.iter().enumerate().skip(1) {
            if let ConstantEntry::Constant(constant) = entry {
                writeln!(f, "  #{index} = {constant:?}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_display_lists_every_occupied_entry() -> Result<()> {
        let mut pool = ConstantPool::new();
        pool.add_utf8("Example")?;
        pool.add_class("Example")?;
        pool.add(Constant::Long(7))?;

        let expected = indoc! {r#"
            ConstantPool (4 entries):
              #1 = Utf8("Example")
              #2 = Class(1)
              #3 = Long(7)
        "#};
        assert_eq!(expected, pool.to_string());
        Ok(())
    }

    #[test]
    fn test_new_is_empty() {
        let pool = ConstantPool::new();
        assert_eq!(0, pool.len());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_and_get() -> Result<()> {
        let mut pool = ConstantPool::new();
        let index = pool.add(Constant::Integer(42))?;
        assert_eq!(Some(&Constant::Integer(42)), pool.get(index));
        assert_eq!(None, pool.get(0));
        Ok(())
    }

    #[test]
    fn test_wide_constant_reserves_placeholder() -> Result<()> {
        let mut pool = ConstantPool::new();
        let long_index = pool.add(Constant::Long(7))?;
        let next_index = pool.add(Constant::Integer(1))?;
        assert_eq!(long_index + 2, next_index);
        assert_eq!(
            Err(InvalidConstantPoolIndex(long_index + 1)),
            pool.try_get(long_index + 1)
        );
        Ok(())
    }

    #[test]
    fn test_add_utf8_and_class() -> Result<()> {
        let mut pool = ConstantPool::new();
        let class_index = pool.add_class("java/lang/Object")?;
        assert_eq!("java/lang/Object", pool.try_get_class(class_index)?);
        Ok(())
    }

    #[test]
    fn test_try_get_invalid_type() -> Result<()> {
        let mut pool = ConstantPool::new();
        let index = pool.add_utf8("not a class")?;
        assert_eq!(
            Err(InvalidConstantPoolIndexType(index)),
            pool.try_get_class(index)
        );
        Ok(())
    }

    #[test]
    fn test_add_method_ref() -> Result<()> {
        let mut pool = ConstantPool::new();
        let index = pool.add_method_ref(
            "java/lang/Object".to_string(),
            "toString".to_string(),
            "()Ljava/lang/String;".to_string(),
        )?;
        assert!(matches!(pool.get(index), Some(Constant::MethodRef { .. })));
        Ok(())
    }
}
