//! Deobfuscation of method bodies and identifiers.
//!
//! # Architecture
//!
//! Method bodies are rewritten by a fixed pipeline of [`CodePass`] implementations that
//! operate on a decoded [`crate::assembly::Code`] container:
//!
//! 1. [`ConstantConditionPass`] - folds branches on literal conditions, drops dead code
//! 2. [`CleanupPass`] - removes fall-through jumps and push/pop pairs
//!
//! The [`Deobfuscator`] runs the pipeline until no pass reports a change and re-encodes
//! the body only when something changed. Identifier renaming works on whole units instead
//! of bodies; see [`rename_registers`] and [`IdentifierRenamer`].
//!
//! Bodies with exception ranges are never rewritten: exception offsets are byte
//! positions that re-encoding does not remap.
//!
//! # Examples
//!
//! ```rust
//! use swfscope::{abc::ConstantPool, assembly::Code, deobfuscation::Deobfuscator};
//!
//! // pushtrue, iftrue +3, pushbyte 1, returnvalue, pushbyte 2, returnvalue
//! let mut code = Code::decode(&[0x26, 0x11, 0x03, 0, 0, 0x24, 0x01, 0x48, 0x24, 0x02, 0x48])?;
//! assert!(Deobfuscator::new().run_on_code(&mut code, &ConstantPool::default())?);
//! assert_eq!(code.encode()?, vec![0x24, 0x02, 0x48]);
//! # Ok::<(), swfscope::Error>(())
//! ```

mod controlflow;
mod rename;

pub use controlflow::{remove_unreachable, CleanupPass, ConstantConditionPass};
pub use rename::{is_valid_identifier, rename_registers, IdentifierRenamer};

use bitflags::bitflags;

use crate::{
    abc::{AbcFile, ConstantPool, MethodBody},
    assembly::{Code, OpCode},
    Result,
};

bitflags! {
    /// Transforms applied by [`crate::Game::sanitize`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sanitization: u8 {
        /// Fold constant-condition control flow
        const DEOBFUSCATE = 0x01;
        /// Name placeholder debug registers
        const RENAME_REGISTERS = 0x02;
        /// Replace invalid namespace and class names
        const RENAME_IDENTIFIERS = 0x04;
        /// Everything
        const ALL = Self::DEOBFUSCATE.bits() | Self::RENAME_REGISTERS.bits() | Self::RENAME_IDENTIFIERS.bits();
    }
}

/// A transformation over one decoded method body.
///
/// Passes must be thread-safe so a pipeline can be shared across workers.
pub trait CodePass: Send + Sync {
    /// Unique name for logging.
    fn name(&self) -> &'static str;

    /// Should this pass run on `code`? Override to skip bodies cheaply.
    fn should_run(&self, _code: &Code) -> bool {
        true
    }

    /// Rewrite `code` in place.
    ///
    /// Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the container's exits are inconsistent.
    fn run(&self, code: &mut Code, pool: &ConstantPool) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Bytecode every obfuscated body opens with: `pushfalse, pushtrue`.
pub const OBFUSCATION_MARKER: [u8; 2] = [OpCode::PushFalse as u8, OpCode::PushTrue as u8];

/// Returns true if the body opens with [`OBFUSCATION_MARKER`].
///
/// Other bodies are left alone even when they branch on literals.
#[must_use]
pub fn looks_obfuscated(body: &MethodBody) -> bool {
    body.code.starts_with(&OBFUSCATION_MARKER)
}

/// Runs the body pipeline to a fixed point.
pub struct Deobfuscator {
    passes: Vec<Box<dyn CodePass>>,
    max_rounds: usize,
    max_layout_iterations: usize,
}

impl Default for Deobfuscator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deobfuscator {
    /// The standard pipeline with the default layout bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout_limit(Code::MAX_LAYOUT_ITERATIONS)
    }

    /// The standard pipeline, re-encoding with at most `max_layout_iterations` passes.
    #[must_use]
    pub fn with_layout_limit(max_layout_iterations: usize) -> Self {
        Deobfuscator {
            passes: vec![Box::new(ConstantConditionPass), Box::new(CleanupPass)],
            max_rounds: 16,
            max_layout_iterations,
        }
    }

    /// Run every pass until none reports a change.
    ///
    /// # Errors
    /// Propagates the first pass error.
    pub fn run_on_code(&self, code: &mut Code, pool: &ConstantPool) -> Result<bool> {
        let mut changed = false;
        for _ in 0..self.max_rounds {
            let mut round = false;
            for pass in &self.passes {
                if !pass.should_run(code) {
                    continue;
                }
                if pass.run(code, pool)? {
                    log::trace!("Pass {} changed the body", pass.name());
                    round = true;
                }
            }
            if !round {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Decode, rewrite and re-encode one body. Bodies with exception ranges are skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode and
    /// [`crate::Error::LayoutDivergence`] if re-encoding does not settle.
    pub fn run_on_body(&self, body: &mut MethodBody, pool: &ConstantPool) -> Result<bool> {
        if body.has_exceptions() {
            return Ok(false);
        }
        let mut code = body.parse_code()?;
        if !self.run_on_code(&mut code, pool)? {
            return Ok(false);
        }
        body.set_code_with_limit(&code, pool, self.max_layout_iterations)?;
        Ok(true)
    }

    /// Rewrite every body of `abc` that carries the obfuscation marker.
    ///
    /// Returns the number of rewritten bodies.
    ///
    /// # Errors
    /// See [`Deobfuscator::run_on_body`].
    pub fn run_on_unit(&self, abc: &mut AbcFile) -> Result<usize> {
        let mut rewritten = 0;
        for body in &mut abc.bodies {
            if body.has_exceptions() || !looks_obfuscated(body) {
                continue;
            }
            if self.run_on_body(body, &abc.pool)? {
                rewritten += 1;
            }
        }
        log::debug!("Deobfuscated {} of {} bodies", rewritten, abc.bodies.len());
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::AbcBuilder;

    // pushfalse, pushtrue, iftrue +3, pushbyte 1, returnvalue, pop, pushbyte 2, returnvalue
    const GUARDED: &[u8] = &[
        0x27, 0x26, 0x11, 0x03, 0x00, 0x00, 0x24, 0x01, 0x48, 0x29, 0x24, 0x02, 0x48,
    ];

    #[test]
    fn marker_detection() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let guarded = builder.method(class, "a", &[], "int", GUARDED);
        let plain = builder.method(class, "b", &[], "int", &[0x24, 0x02, 0x48]);
        // pushtrue, iftrue +0, pushbyte 2, returnvalue
        let literal = builder.method(
            class,
            "c",
            &[],
            "int",
            &[0x26, 0x11, 0x00, 0x00, 0x00, 0x24, 0x02, 0x48],
        );
        let abc = builder.build();

        assert!(looks_obfuscated(abc.body(guarded).unwrap()));
        assert!(!looks_obfuscated(abc.body(plain).unwrap()));
        assert!(!looks_obfuscated(abc.body(literal).unwrap()));
    }

    #[test]
    fn unit_is_rewritten_once() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let guarded = builder.method(class, "a", &[], "int", GUARDED);
        let mut abc = builder.build();

        let deobfuscator = Deobfuscator::new();
        assert_eq!(deobfuscator.run_on_unit(&mut abc).unwrap(), 1);
        assert_eq!(abc.body(guarded).unwrap().code, vec![0x24, 0x02, 0x48]);

        let once = abc.to_bytes();
        assert_eq!(deobfuscator.run_on_unit(&mut abc).unwrap(), 0);
        assert_eq!(abc.to_bytes(), once);
    }

    #[test]
    fn bodies_with_exceptions_are_skipped() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let guarded = builder.method(class, "a", &[], "int", GUARDED);
        builder.exception(guarded);
        let mut abc = builder.build();

        assert_eq!(Deobfuscator::new().run_on_unit(&mut abc).unwrap(), 0);
        assert_eq!(abc.body(guarded).unwrap().code, GUARDED);
    }

    #[test]
    fn sanitization_flags() {
        assert!(Sanitization::ALL.contains(Sanitization::RENAME_REGISTERS));
        assert_eq!(Sanitization::ALL.bits(), 0x07);
    }
}
