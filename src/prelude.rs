//! # swfscope Prelude
//!
//! The types most programs need to load, clean up, inspect and patch a client.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all swfscope operations
pub use crate::Error;

/// The result type used throughout swfscope
pub use crate::Result;

/// Analysis bounds applied while loading
pub use crate::AnalysisConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// A loaded client
pub use crate::Game;

/// The container and its records
pub use crate::swf::{Compression, SwfFile, Tag, TagBody};

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Bytecode
// ================================================================================================

/// Units, pools and members
pub use crate::abc::{
    AbcFile, ConstantPool, Container, MethodBody, MethodFilter, MethodInfo, Trait, TraitKind,
};

/// Instructions and code
pub use crate::assembly::{Code, Instruction, OpCode};

// ================================================================================================
// Transforms and Messages
// ================================================================================================

/// Sanitization selection and the body rewriter
pub use crate::deobfuscation::{Deobfuscator, Sanitization};

/// Message table types
pub use crate::messages::{Direction, MessageItem, MessageReference, MessageRegistry};
