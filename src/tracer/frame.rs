//! The tracer's per-program-point abstract state: an arena of symbolic
//! [`Entry`] values plus the [`Frame`] (stack + locals) that references them
//! by [`EntryId`].
//!
//! Entries reference each other (`adjacent`, `conflicts`) by index into a
//! flat per-trace arena rather than by owned pointer — see SPEC_FULL.md §5
//! and the "Entry `adjacent`/`parent` graphs" design note.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::lattice::Type;

/// An index into an [`EntryArena`]. Cheap to copy; following a stale id
/// (after the arena that produced it is dropped) is a logic error, not
/// something this type prevents at compile time — arenas are per-trace and
/// short-lived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

/// A constant value propagated alongside an entry's type, when the tracer's
/// [`crate::tracer::ContextFlags::CONSTANT_PROPAGATION`] flag is set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

/// A recorded mismatch between an entry's actual type and what a consumer
/// expected of it. Non-fatal: the tracer records these and continues with a
/// freshly cast replacement entry (see SPEC_FULL.md §4.4 "Type conflicts").
#[derive(Clone, Debug, PartialEq)]
pub struct Conflict {
    pub offset: u32,
    pub expected: Type,
    pub found: Type,
}

/// A symbolic value inhabiting one stack or local slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub ty: Type,
    /// The instruction offset that produced this value, if any.
    pub source: Option<u32>,
    /// Marks the upper half of a two-word value; the hidword entry
    /// immediately follows its lodword on the stack and at `index + 1` in
    /// locals.
    pub hidword: bool,
    /// Set once a stack manipulation has separated the two halves of what
    /// was a two-word value; such halves must not be treated as one again.
    pub split: bool,
    /// Set when this entry was produced by widening at a multi-predecessor
    /// merge point (see `Frame::generify`).
    pub generified: bool,
    pub value: Option<ConstValue>,
    pub adjacent: Vec<EntryId>,
    pub constraints: Vec<Type>,
    pub conflicts: Vec<Conflict>,
}

impl Entry {
    fn new(ty: Type, source: Option<u32>) -> Self {
        Self {
            ty,
            source,
            hidword: false,
            split: false,
            generified: false,
            value: None,
            adjacent: Vec::new(),
            constraints: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

/// A flat, per-trace arena of entries. Never shrinks during a trace;
/// discarded whole when the trace result is returned (see SPEC_FULL.md §5).
#[derive(Clone, Debug, Default)]
pub struct EntryArena {
    entries: Vec<Entry>,
}

impl EntryArena {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn alloc(&mut self, ty: Type, source: Option<u32>) -> EntryId {
        let id = EntryId(self.entries.len());
        self.entries.push(Entry::new(ty, source));
        id
    }

    #[must_use]
    pub fn get(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    /// Iterates every entry ever allocated, including ones no longer
    /// reachable from any live frame (e.g. replaced by [`Frame::replace`]) —
    /// used to collect conflicts recorded across a whole trace.
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn get_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.0]
    }

    /// Deep-clones the entry at `id` (fresh identity, same type/value), used
    /// by `Frame::copy(deep = true)`.
    pub fn clone_entry(&mut self, id: EntryId) -> EntryId {
        let entry = self.entries[id.0].clone();
        let new_id = EntryId(self.entries.len());
        self.entries.push(entry);
        new_id
    }

    /// Widens the entry at `id` to `ty`, recording the original as
    /// `adjacent`, per `Frame::generify`.
    pub fn generify(&mut self, id: EntryId, ty: Type) -> EntryId {
        let source = self.entries[id.0].source;
        let new_id = EntryId(self.entries.len());
        let mut entry = Entry::new(ty, source);
        entry.generified = true;
        entry.adjacent.push(id);
        self.entries.push(entry);
        new_id
    }
}

/// The tracer's abstract operand stack + local-variable map at one program
/// point.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub stack: Vec<EntryId>,
    pub locals: BTreeMap<u16, EntryId>,
    pub thrown: Option<EntryId>,
    pub returned: Option<EntryId>,
    pub uses: BTreeSet<u16>,
    pub defs: BTreeSet<u16>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a fresh entry of `ty` (attributed to instruction `source`,
    /// when known), reserving a second hi-dword slot for two-word types.
    pub fn push(&mut self, arena: &mut EntryArena, ty: Type, source: Option<u32>) -> EntryId {
        let wide = ty.is_category2();
        let id = arena.alloc(ty, source);
        self.stack.push(id);
        if wide {
            let hi = arena.alloc(Type::Top, source);
            arena.get_mut(hi).hidword = true;
            self.stack.push(hi);
        }
        id
    }

    /// Pushes an already-allocated entry (used when the value survives a
    /// `dup`/`swap` rather than being freshly created).
    pub fn push_entry(&mut self, id: EntryId) {
        self.stack.push(id);
    }

    /// Pops one value, consuming its hidword slot too if it is category 2.
    ///
    /// # Errors
    /// Returns [`crate::Error::ShortRead`]-shaped underflow only via
    /// `expect(...)`-free logic: an empty stack returns `None` from the
    /// caller's perspective via a panic-free check — callers that need a
    /// `Result` should use [`Frame::pop_checked`].
    pub fn pop(&mut self, arena: &EntryArena) -> Option<EntryId> {
        let top = self.stack.pop()?;
        let entry = arena.get(top);
        if entry.hidword && !entry.split {
            return self.stack.pop();
        }
        Some(top)
    }

    /// Pops a value and records a conflict if it is not assignable to
    /// `expected`, replacing it with a freshly cast entry of `expected`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ShortRead`] if the stack is empty.
    pub fn pop_expect(
        &mut self,
        arena: &mut EntryArena,
        expected: &Type,
        offset: u32,
    ) -> Result<EntryId> {
        let Some(id) = self.pop(arena) else {
            return Err(crate::Error::ShortRead {
                expected: 1,
                actual: 0,
            });
        };
        let found = arena.get(id).ty.clone();
        if expected.assignable(&found) {
            return Ok(id);
        }
        let source = arena.get(id).source;
        let replacement = arena.alloc(expected.clone(), source);
        arena.get_mut(replacement).conflicts.push(Conflict {
            offset,
            expected: expected.clone(),
            found,
        });
        Ok(replacement)
    }

    /// Writes `id` into local slot `index`, marking `index` (and `index + 1`
    /// for a two-word value) as defined.
    pub fn store(&mut self, arena: &EntryArena, index: u16, id: EntryId) {
        self.defs.insert(index);
        let wide = arena.get(id).ty.is_category2();
        self.locals.insert(index, id);
        if wide {
            self.defs.insert(index + 1);
        }
    }

    /// Reads local slot `index`, marking it used if it was not already
    /// defined earlier in this block.
    pub fn load(&mut self, index: u16) -> Option<EntryId> {
        if !self.defs.contains(&index) {
            self.uses.insert(index);
        }
        self.locals.get(&index).copied()
    }

    /// Records that the current instruction throws `id`. Idempotent: a
    /// second throw in the same block is a no-op.
    pub fn throw(&mut self, id: EntryId) {
        if self.thrown.is_none() {
            self.thrown = Some(id);
        }
    }

    /// Records that the current instruction returns `id`.
    pub fn return_(&mut self, id: Option<EntryId>) {
        if self.returned.is_none() {
            self.returned = id;
        }
    }

    /// Replaces every occurrence of `old` in the stack and locals with a
    /// fresh entry of `new_ty`, used by `invokespecial <init>`. Returns the
    /// new entry id shared by all replaced occurrences.
    pub fn replace(&mut self, arena: &mut EntryArena, old: EntryId, new_ty: Type) -> EntryId {
        let replacement = arena.alloc(new_ty, arena.get(old).source);
        for slot in &mut self.stack {
            if *slot == old {
                *slot = replacement;
            }
        }
        for slot in self.locals.values_mut() {
            if *slot == old {
                *slot = replacement;
            }
        }
        replacement
    }

    /// Produces a shallow copy of this frame (shared entry ids); when `deep`
    /// is true, every entry is additionally cloned to a fresh id so the two
    /// frames no longer alias.
    #[must_use]
    pub fn copy(&self, arena: &mut EntryArena, deep: bool) -> Frame {
        if !deep {
            return self.clone();
        }
        let mut table = BTreeMap::new();
        let remap = |arena: &mut EntryArena, id: EntryId, table: &mut BTreeMap<EntryId, EntryId>| {
            *table.entry(id).or_insert_with(|| arena.clone_entry(id))
        };
        let mut out = Frame::new();
        for id in &self.stack {
            out.stack.push(remap(arena, *id, &mut table));
        }
        for (index, id) in &self.locals {
            out.locals.insert(*index, remap(arena, *id, &mut table));
        }
        out.thrown = self.thrown.map(|id| remap(arena, id, &mut table));
        out.returned = self.returned.map(|id| remap(arena, id, &mut table));
        out.uses = self.uses.clone();
        out.defs = self.defs.clone();
        out
    }

    /// Widens every reference entry (stack and locals) to `Object`, leaving
    /// primitives untouched. Used when entering a block reached from more
    /// than one predecessor.
    pub fn generify(&mut self, arena: &mut EntryArena, object: &Type) {
        for slot in &mut self.stack {
            if arena.get(*slot).ty.is_reference() {
                *slot = arena.generify(*slot, object.clone());
            }
        }
        for slot in self.locals.values_mut() {
            if arena.get(*slot).ty.is_reference() {
                *slot = arena.generify(*slot, object.clone());
            }
        }
    }

    /// Returns `true` iff `other` may legally flow into a block whose entry
    /// constraint is `self`: equal stack depth, pairwise-assignable stack
    /// entries, and a compatible entry for every local in `live`.
    #[must_use]
    pub fn merge(&self, arena: &mut EntryArena, other: &Frame, live: &BTreeSet<u16>) -> bool {
        if self.stack.len() != other.stack.len() {
            return false;
        }
        for (a, b) in self.stack.iter().zip(other.stack.iter()) {
            if !arena.get(*a).ty.assignable(&arena.get(*b).ty) {
                return false;
            }
        }
        for index in live {
            let Some(a) = self.locals.get(index) else {
                continue;
            };
            let Some(b) = other.locals.get(index) else {
                return false;
            };
            if !arena.get(*a).ty.assignable(&arena.get(*b).ty) {
                return false;
            }
        }
        for (a, b) in self.stack.iter().zip(other.stack.iter()) {
            if arena.get(*a).generified {
                arena.get_mut(*a).adjacent.push(*b);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{Interner, Ref};

    #[test]
    fn test_push_pop_one_word() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        frame.push(&mut arena, Type::Int, Some(0));
        assert_eq!(1, frame.stack.len());
        let popped = frame.pop(&arena).expect("value");
        assert_eq!(Type::Int, arena.get(popped).ty);
        assert!(frame.stack.is_empty());
    }

    #[test]
    fn test_push_pop_two_word_consumes_hidword() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        frame.push(&mut arena, Type::Long, Some(0));
        assert_eq!(2, frame.stack.len());
        let popped = frame.pop(&arena).expect("value");
        assert_eq!(Type::Long, arena.get(popped).ty);
        assert!(frame.stack.is_empty());
    }

    #[test]
    fn test_store_wide_marks_both_slots_defined() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        let id = arena.alloc(Type::Double, None);
        frame.store(&arena, 2, id);
        assert!(frame.defs.contains(&2));
        assert!(frame.defs.contains(&3));
    }

    #[test]
    fn test_load_marks_use_when_not_defined() {
        let mut frame = Frame::new();
        frame.load(1);
        assert!(frame.uses.contains(&1));
    }

    #[test]
    fn test_load_after_store_is_not_a_use() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        let id = arena.alloc(Type::Int, None);
        frame.store(&arena, 1, id);
        frame.load(1);
        assert!(!frame.uses.contains(&1));
    }

    #[test]
    fn test_replace_rewrites_every_occurrence() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        let interner = Interner::new();
        let uninit = arena.alloc(Type::Reference(Ref::Uninitialized { src: 0 }), Some(0));
        frame.push_entry(uninit);
        frame.store(&arena, 0, uninit);
        let object_type = Type::object(&interner);
        let replacement = frame.replace(&mut arena, uninit, object_type.clone());
        assert_eq!(Some(&replacement), frame.locals.get(&0));
        assert_eq!(Some(&replacement), frame.stack.first());
        assert_eq!(object_type, arena.get(replacement).ty);
    }

    #[test]
    fn test_merge_accepts_identical_frames() {
        let mut arena = EntryArena::new();
        let mut a = Frame::new();
        a.push(&mut arena, Type::Int, None);
        let b = a.copy(&mut arena, true);
        assert!(a.merge(&mut arena, &b, &BTreeSet::new()));
    }

    #[test]
    fn test_merge_rejects_depth_mismatch() {
        let mut arena = EntryArena::new();
        let a = Frame::new();
        let mut b = Frame::new();
        b.push(&mut arena, Type::Int, None);
        assert!(!a.merge(&mut arena, &b, &BTreeSet::new()));
    }

    #[test]
    fn test_pop_expect_records_conflict_on_mismatch() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        frame.push(&mut arena, Type::Int, Some(1));
        let id = frame.pop_expect(&mut arena, &Type::Long, 5).expect("pop");
        assert_eq!(1, arena.get(id).conflicts.len());
    }

    #[test]
    fn test_pop_expect_returns_freshly_cast_entry_on_mismatch() {
        let mut arena = EntryArena::new();
        let mut frame = Frame::new();
        frame.push(&mut arena, Type::Int, Some(1));
        let id = frame.pop_expect(&mut arena, &Type::Long, 5).expect("pop");
        assert_eq!(Type::Long, arena.get(id).ty);
    }
}
