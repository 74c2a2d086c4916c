//! Tracer configuration: toggles for constant propagation, exception
//! propagation, and strict typing, in the same bitflags-plus-builder shape
//! as a verifier's own configuration struct.

use bitflags::bitflags;

bitflags! {
    /// Boolean options for a trace run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContextFlags: u8 {
        /// Track known constant values across arithmetic, not just types.
        const CONSTANT_PROPAGATION = 0b0000_0001;
        /// Connect every possibly-throwing instruction to its handlers
        /// (disable to treat a method as if it never throws, e.g. when
        /// analyzing straight-line synthetic bytecode).
        const EXCEPTION_PROPAGATION = 0b0000_0010;
        /// Promote the first recorded type conflict to a returned error
        /// instead of accumulating it in the trace result.
        const STRICT_TYPING = 0b0000_0100;
        /// Allow `jsr`/`ret` subroutines (deprecated since Java 6, but still
        /// legal in old class files).
        const ALLOW_SUBROUTINES = 0b0000_1000;
    }
}

/// Configuration for one [`crate::tracer::trace`] run.
#[derive(Debug, Clone)]
pub struct Context {
    pub flags: ContextFlags,
    /// Upper bound on dataflow passes before surfacing
    /// [`crate::Error::TraceDivergence`]. Default 100, per SPEC_FULL.md
    /// Testable Property 6.
    pub max_passes: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            flags: ContextFlags::EXCEPTION_PROPAGATION | ContextFlags::ALLOW_SUBROUTINES,
            max_passes: 100,
        }
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A permissive configuration: constant propagation on, strict typing
    /// off, subroutines allowed.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            flags: ContextFlags::EXCEPTION_PROPAGATION
                | ContextFlags::ALLOW_SUBROUTINES
                | ContextFlags::CONSTANT_PROPAGATION,
            ..Self::default()
        }
    }

    /// A strict configuration: the first type conflict aborts the trace.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            flags: ContextFlags::EXCEPTION_PROPAGATION
                | ContextFlags::ALLOW_SUBROUTINES
                | ContextFlags::STRICT_TYPING,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    #[must_use]
    pub fn with_constant_propagation(mut self, enabled: bool) -> Self {
        self.flags.set(ContextFlags::CONSTANT_PROPAGATION, enabled);
        self
    }

    #[must_use]
    pub const fn constant_propagation(&self) -> bool {
        self.flags.contains(ContextFlags::CONSTANT_PROPAGATION)
    }

    #[must_use]
    pub const fn exception_propagation(&self) -> bool {
        self.flags.contains(ContextFlags::EXCEPTION_PROPAGATION)
    }

    #[must_use]
    pub const fn strict_typing(&self) -> bool {
        self.flags.contains(ContextFlags::STRICT_TYPING)
    }

    #[must_use]
    pub const fn allow_subroutines(&self) -> bool {
        self.flags.contains(ContextFlags::ALLOW_SUBROUTINES)
    }
}
