//! AVM2 instruction decoding, symbolic execution and the editable code container.
//!
//! # Key Components
//!
//! - [`OpCode`] - The opcode table with mnemonics and control flow classes
//! - [`Instruction`] - A decoded instruction, one variant per operand family
//! - [`Machine`] - Symbolic stack and registers for literal-only evaluation
//! - [`Code`] - Instruction arena with index-based jump and switch exits
//!
//! # Examples
//!
//! ```rust
//! use swfscope::assembly::{Code, OpCode};
//!
//! // getlocal_0, pushscope, returnvoid
//! let code = Code::decode(&[0xD0, 0x30, 0x47])?;
//! assert!(code.starts_with(&[OpCode::GetLocal0, OpCode::PushScope]));
//! for instruction in &code {
//!     println!("{}", instruction);
//! }
//! # Ok::<(), swfscope::Error>(())
//! ```

mod code;
mod instruction;
mod machine;
mod opcodes;

pub use code::Code;
pub use instruction::{FlowType, Instruction};
pub use machine::{Machine, Value};
pub use opcodes::OpCode;
