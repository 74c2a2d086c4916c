//! The minimal method/code envelope needed to drive disassembly and tracing.
//!
//! This is not a class-file reader: callers construct `MethodInfo`/`Code`
//! values directly (or decode a `Code` attribute's raw bytes themselves) and
//! hand them to [`crate::graph::disassemble`] / [`crate::tracer::trace`].

use crate::error::Result;
use crate::field_type::FieldType;
use bitflags::bitflags;
use std::ops::Range;

bitflags! {
    /// `access_flags` of a `method_info` structure, per JVMS 4.6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// One entry of a `Code` attribute's exception table.
///
/// `range_pc` is half-open: `start_pc` inclusive, `end_pc` exclusive, per
/// JVMS 4.7.3. `catch_type` of 0 means "catches everything" (used to compile
/// `finally` blocks).
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionTableEntry {
    pub range_pc: Range<u16>,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// A verification-type tag as it would appear in a `StackMapTable` frame.
/// Carried only so `Code` can cross-check the tracer's own output; this
/// crate does not decode/encode the attribute's compact delta format.
#[derive(Clone, Debug, PartialEq)]
pub enum StackMapVerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    Uninitialized(u16),
}

/// One explicit (fully expanded) `StackMapTable` frame: the locals and stack
/// verification types expected at `offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct StackMapFrame {
    pub offset: u16,
    pub locals: Vec<StackMapVerificationType>,
    pub stack: Vec<StackMapVerificationType>,
}

/// The `Code` attribute of a method: its raw instruction bytes plus the
/// structural metadata the disassembler needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub stack_map_table: Option<Vec<StackMapFrame>>,
}

impl Code {
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            stack_map_table: None,
        }
    }

    #[must_use]
    pub fn with_exception_table(mut self, exception_table: Vec<ExceptionTableEntry>) -> Self {
        self.exception_table = exception_table;
        self
    }
}

/// A method and its parsed descriptor, sufficient to seed the tracer's
/// initial frame (parameter types, `this` slot) and drive disassembly.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub class_name: String,
    pub name: String,
    pub access_flags: MethodAccessFlags,
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
    pub code: Option<Code>,
}

impl MethodInfo {
    /// Parses `descriptor` and builds a `MethodInfo` with no `Code` yet
    /// attached.
    ///
    /// # Errors
    /// Returns an error if `descriptor` is not a well-formed method
    /// descriptor.
    pub fn new<S: Into<String>>(
        class_name: S,
        name: S,
        access_flags: MethodAccessFlags,
        descriptor: &str,
    ) -> Result<Self> {
        let (parameters, return_type) = FieldType::parse_method_descriptor(descriptor)?;
        Ok(Self {
            class_name: class_name.into(),
            name: name.into(),
            access_flags,
            parameters,
            return_type,
            code: None,
        })
    }

    #[must_use]
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    /// Whether this method is an instance initializer (`<init>`).
    #[must_use]
    pub fn is_instance_initializer(&self) -> bool {
        self.name == "<init>"
    }

    /// Number of local-variable slots occupied by `this` (if any) plus the
    /// declared parameters, before counting any locals the method body
    /// itself introduces.
    #[must_use]
    pub fn parameter_slot_count(&self) -> u16 {
        let mut slots: u16 = u16::from(!self.access_flags.contains(MethodAccessFlags::STATIC));
        for parameter in &self.parameters {
            slots = slots.saturating_add(u16::from(parameter.slot_count()));
        }
        slots
    }

    /// Returns the attached `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::NoCodeAttribute`] if the method has none.
    pub fn code(&self) -> Result<&Code> {
        self.code.as_ref().ok_or(crate::Error::NoCodeAttribute)
    }
}
