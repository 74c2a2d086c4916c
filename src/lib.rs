//! A library for disassembling, abstractly tracing, and reassembling JVM
//! method bodies.
//!
//! Reading a class file's constant pool and method table is out of scope:
//! callers hand this crate a [`MethodInfo`]/[`Code`] pair (built by hand, or
//! decoded from a `Code` attribute's raw bytes by some other layer) and get
//! back a [`Graph`] via [`disassemble`], a [`TraceResult`] via [`trace`], and
//! raw bytecode back out via [`assemble`]. Four pieces do the real work:
//!
//! - [`lattice`] — the JVM's verification type lattice (`Type`/`Ref`).
//! - [`instruction`] — one `Instruction` variant per opcode, with
//!   `decode`/`encode` and a `step` stack-effect.
//! - [`graph`] — splits a method into [`Block`]s connected by typed
//!   [`Edge`]s.
//! - [`tracer`] — a bounded multi-pass dataflow analysis over a `Graph`,
//!   producing per-block entry frames, liveness, and recorded type
//!   conflicts.

pub mod assemble;
pub mod base_type;
pub mod error;
pub mod field_type;
pub mod graph;
pub mod instruction;
pub mod lattice;
pub mod method;
pub mod pool;
pub mod tracer;

pub use assemble::assemble;
pub use base_type::BaseType;
pub use error::{Error, Result};
pub use field_type::FieldType;
pub use graph::{disassemble, Block, Edge, EdgeKind, Graph};
pub use instruction::{ExceptionKind, Instruction, LookupSwitch, TableSwitch, WideInstruction};
pub use lattice::{Interner, Ref, Type};
pub use method::{Code, ExceptionTableEntry, MethodAccessFlags, MethodInfo};
pub use pool::{Constant, ConstantPool};
pub use tracer::{trace, Context, ContextFlags, Frame, TraceResult};
