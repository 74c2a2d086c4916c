//! The verification-type lattice the tracer propagates values through.
//!
//! `Type` mirrors the kinds described in
//! [JVMS §4.10.1.2](https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.10.1.2),
//! but unlike a verifier's own type system it never walks the class
//! hierarchy: `assignable` only trusts name equality, `null`, and the
//! built-in widenings below. Hierarchy-aware assignability is the
//! responsibility of whatever source-of-truth class model a caller layers
//! on top.

mod interner;

pub use interner::Interner;

use std::sync::Arc;

use crate::base_type::BaseType;
use crate::field_type::FieldType;

/// A reference-kind type: a named class/interface, an array, `null`, or one
/// of the two uninitialized-object markers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ref {
    /// A class type, identified by internal name (e.g. `java/lang/Object`).
    Class(Arc<str>),
    /// An interface type, identified by internal name.
    Interface(Arc<str>),
    /// An array whose element type is `elem`.
    Array(Box<Type>),
    /// The null reference, assignable to every reference type.
    Null,
    /// `this` inside a constructor, before the superclass `<init>` runs.
    UninitializedThis,
    /// The result of a `new` at instruction offset `src`, before its
    /// `<init>` has run.
    Uninitialized { src: u32 },
}

/// A value kind in the tracer's lattice.
///
/// `top` is the universal supertype of both word sizes; reachable only as
/// the declared type of an unused local slot or the hi-dword placeholder of
/// a two-word value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Type {
    #[default]
    Top,
    Int,
    Float,
    Long,
    Double,
    Reference(Ref),
    /// A `jsr`'s return address, keyed by the `Jsr` instruction offset that
    /// produced it so that `ret` can be matched back to its subroutine.
    ReturnAddress { src: u32 },
}

impl Type {
    /// Convenience constructor for `java/lang/Object`.
    #[must_use]
    pub fn object(interner: &Interner) -> Self {
        Type::Reference(Ref::Class(interner.intern("java/lang/Object")))
    }

    /// Whether this type occupies one stack/local slot.
    #[must_use]
    pub const fn is_category1(&self) -> bool {
        !matches!(self, Type::Long | Type::Double)
    }

    /// Whether this type occupies two consecutive stack/local slots.
    #[must_use]
    pub const fn is_category2(&self) -> bool {
        matches!(self, Type::Long | Type::Double)
    }

    /// Whether this is any reference kind (including uninitialized markers
    /// and `null`).
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_))
    }

    /// Whether this is an uninitialized-object reference.
    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        matches!(
            self,
            Type::Reference(Ref::Uninitialized { .. } | Ref::UninitializedThis)
        )
    }

    /// Whether this is `Integer` — the collapsed kind that `byte`, `char`,
    /// `short`, and `boolean` all lower to (see `from_field_type`).
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Type::Int)
    }

    /// Lowers a descriptor-level [`FieldType`] into a lattice `Type`,
    /// collapsing `byte`/`char`/`short`/`boolean` into `Int` — this is the
    /// one place that distinction is erased; `verification` downstream is
    /// therefore the identity function (see DESIGN.md Open Question 1).
    #[must_use]
    pub fn from_field_type(field_type: &FieldType, interner: &Interner) -> Self {
        match field_type {
            FieldType::Base(BaseType::Boolean | BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Int) => {
                Type::Int
            }
            FieldType::Base(BaseType::Float) => Type::Float,
            FieldType::Base(BaseType::Long) => Type::Long,
            FieldType::Base(BaseType::Double) => Type::Double,
            FieldType::Object(class_name) => Type::Reference(Ref::Class(interner.intern(class_name))),
            FieldType::Array(component) => {
                Type::Reference(Ref::Array(Box::new(Type::from_field_type(component, interner))))
            }
        }
    }

    /// The kind used when merging two frames at a join point. Never fails
    /// within the lattice itself — only the `FieldType` → `Type` lowering
    /// boundary can fail (on `void`), which is not representable here.
    #[must_use]
    pub fn verification(&self) -> Type {
        self.clone()
    }

    /// Is `other` a legal value where `self` is the declared/expected type?
    ///
    /// Reference assignability stops at name equality or `null`; the core
    /// does not consult a classpath. `Object` accepts any reference.
    #[must_use]
    pub fn assignable(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Top, _) => true,
            (a, b) if a == b => true,
            (Type::Reference(Ref::Class(name)), _) if &**name == "java/lang/Object" => {
                other.is_reference()
            }
            (Type::Reference(a), Type::Reference(Ref::Null)) => !matches!(a, Ref::UninitializedThis | Ref::Uninitialized { .. }),
            (Type::Reference(Ref::Array(elem_a)), Type::Reference(Ref::Array(elem_b))) => {
                elem_a.is_reference() && elem_b.is_reference() && elem_a.assignable(elem_b)
            }
            _ => false,
        }
    }
}
