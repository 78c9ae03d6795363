//! Decoded AVM2 instructions.
//!
//! [`Instruction`] has one variant per operand family. Each variant carries its
//! [`OpCode`] plus exactly the operands that family declares, in declaration order, so
//! encoding writes the fields back in the order they were read.
//!
//! Branch and switch variants keep the raw relative offsets they were decoded with. Inside
//! a [`crate::assembly::Code`] container those raw values are ignored: targets live in
//! the container's exit maps and offsets are recomputed during layout.

use std::fmt;

use crate::{
    abc::ConstantPool,
    assembly::OpCode,
    file::{
        parser::Parser,
        writer::{u32_width, Writer},
    },
    Result,
};

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Either falls through or branches
    ConditionalBranch,
    /// Always branches (`jump`)
    UnconditionalBranch,
    /// Multi-way branch (`lookupswitch`)
    Switch,
    /// Leaves the method
    Return,
    /// Raises an exception
    Throw,
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Opcodes without operands, including the implied-register `getlocal_N`/`setlocal_N`
    Bare(OpCode),
    /// Register operand: `getlocal`, `setlocal`, `kill`, `inclocal`, `declocal` and the
    /// `_i` variants
    Local {
        /// Opcode
        op: OpCode,
        /// Register number
        register: u32,
    },
    /// `jump` and the conditional branches
    Branch {
        /// Opcode
        op: OpCode,
        /// Raw offset relative to the end of the instruction
        offset: i32,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Raw default offset relative to the start of the instruction
        default_offset: i32,
        /// Raw case offsets relative to the start of the instruction
        case_offsets: Vec<i32>,
    },
    /// `pushbyte`
    PushByte(u8),
    /// `pushshort`, with the raw encoded value
    PushShort(u32),
    /// Pool literal pushes: `pushstring`, `pushint`, `pushuint`, `pushdouble`,
    /// `pushnamespace`
    PushConstant {
        /// Opcode
        op: OpCode,
        /// Index into the table the opcode selects
        index: u32,
    },
    /// Opcodes with a multiname operand
    Property {
        /// Opcode
        op: OpCode,
        /// Multiname index
        name: u32,
    },
    /// Property calls and constructions with a multiname and an argument count
    CallProperty {
        /// Opcode
        op: OpCode,
        /// Multiname index
        name: u32,
        /// Number of arguments
        arg_count: u32,
    },
    /// Opcodes with only an argument count
    ArgCount {
        /// Opcode
        op: OpCode,
        /// Number of arguments (properties for `newobject`, elements for `newarray`)
        arg_count: u32,
    },
    /// `callmethod` and `callstatic`
    CallMethod {
        /// Opcode
        op: OpCode,
        /// Dispatch id or method index
        index: u32,
        /// Number of arguments
        arg_count: u32,
    },
    /// Opcodes with a single table index or line number
    Index {
        /// Opcode
        op: OpCode,
        /// Method, class, exception, slot, string index or line number
        index: u32,
    },
    /// `getscopeobject`
    GetScopeObject(u8),
    /// `hasnext2`
    HasNext2 {
        /// Register holding the iterated object
        object_register: u32,
        /// Register holding the iteration index
        index_register: u32,
    },
    /// `debug`
    Debug {
        /// Debug record type, 1 for a register name
        debug_type: u8,
        /// String index of the register name
        name: u32,
        /// Register number, zero based from the first parameter
        register: u8,
        /// Unused extra field
        extra: u32,
    },
}

impl Instruction {
    /// `getlocal` for `register`, using the implied-register form when one exists.
    #[must_use]
    pub fn get_local(register: u32) -> Self {
        match register {
            0 => Instruction::Bare(OpCode::GetLocal0),
            1 => Instruction::Bare(OpCode::GetLocal1),
            2 => Instruction::Bare(OpCode::GetLocal2),
            3 => Instruction::Bare(OpCode::GetLocal3),
            _ => Instruction::Local {
                op: OpCode::GetLocal,
                register,
            },
        }
    }

    /// `setlocal` for `register`, using the implied-register form when one exists.
    #[must_use]
    pub fn set_local(register: u32) -> Self {
        match register {
            0 => Instruction::Bare(OpCode::SetLocal0),
            1 => Instruction::Bare(OpCode::SetLocal1),
            2 => Instruction::Bare(OpCode::SetLocal2),
            3 => Instruction::Bare(OpCode::SetLocal3),
            _ => Instruction::Local {
                op: OpCode::SetLocal,
                register,
            },
        }
    }

    /// A branch with a placeholder offset, to be resolved through the container's exits.
    #[must_use]
    pub fn branch(op: OpCode) -> Self {
        Instruction::Branch { op, offset: 0 }
    }

    /// Shorthand for [`Instruction::Property`].
    #[must_use]
    pub fn property(op: OpCode, name: u32) -> Self {
        Instruction::Property { op, name }
    }

    /// Shorthand for [`Instruction::CallProperty`].
    #[must_use]
    pub fn call_property(op: OpCode, name: u32, arg_count: u32) -> Self {
        Instruction::CallProperty {
            op,
            name,
            arg_count,
        }
    }

    /// Shorthand for [`Instruction::PushConstant`].
    #[must_use]
    pub fn push_constant(op: OpCode, index: u32) -> Self {
        Instruction::PushConstant { op, index }
    }

    /// The opcode of this instruction.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::Bare(op)
            | Instruction::Local { op, .. }
            | Instruction::Branch { op, .. }
            | Instruction::PushConstant { op, .. }
            | Instruction::Property { op, .. }
            | Instruction::CallProperty { op, .. }
            | Instruction::ArgCount { op, .. }
            | Instruction::CallMethod { op, .. }
            | Instruction::Index { op, .. } => *op,
            Instruction::LookupSwitch { .. } => OpCode::LookupSwitch,
            Instruction::PushByte(_) => OpCode::PushByte,
            Instruction::PushShort(_) => OpCode::PushShort,
            Instruction::GetScopeObject(_) => OpCode::GetScopeObject,
            Instruction::HasNext2 { .. } => OpCode::HasNext2,
            Instruction::Debug { .. } => OpCode::Debug,
        }
    }

    /// How this instruction transfers control.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode().flow_type()
    }

    /// Multiname operand, for property access and call opcodes.
    #[must_use]
    pub fn multiname(&self) -> Option<u32> {
        match self {
            Instruction::Property { name, .. } | Instruction::CallProperty { name, .. } => {
                Some(*name)
            }
            _ => None,
        }
    }

    /// Argument count of a call or construction.
    #[must_use]
    pub fn arg_count(&self) -> Option<u32> {
        match self {
            Instruction::CallProperty { arg_count, .. }
            | Instruction::ArgCount { arg_count, .. }
            | Instruction::CallMethod { arg_count, .. } => Some(*arg_count),
            _ => None,
        }
    }

    /// Register operand of a local access, including the implied-register forms.
    #[must_use]
    pub fn register(&self) -> Option<u32> {
        match self {
            Instruction::Bare(op) => op.implied_register(),
            Instruction::Local { register, .. } => Some(*register),
            _ => None,
        }
    }

    /// Returns true for `getlocal` in any form.
    #[must_use]
    pub fn is_get_local(&self) -> bool {
        matches!(
            self.opcode(),
            OpCode::GetLocal
                | OpCode::GetLocal0
                | OpCode::GetLocal1
                | OpCode::GetLocal2
                | OpCode::GetLocal3
        )
    }

    /// Returns true for `setlocal` in any form.
    #[must_use]
    pub fn is_set_local(&self) -> bool {
        matches!(
            self.opcode(),
            OpCode::SetLocal
                | OpCode::SetLocal0
                | OpCode::SetLocal1
                | OpCode::SetLocal2
                | OpCode::SetLocal3
        )
    }

    /// Signed value of a `pushbyte`/`pushshort` literal.
    #[must_use]
    pub fn small_int(&self) -> Option<i32> {
        match self {
            Instruction::PushByte(value) => Some(i32::from(*value as i8)),
            #[allow(clippy::cast_possible_truncation)]
            Instruction::PushShort(value) => Some(i32::from(*value as u16 as i16)),
            _ => None,
        }
    }

    /// Returns true for instructions that push a literal and have no other effect.
    #[must_use]
    pub fn is_literal_push(&self) -> bool {
        match self {
            Instruction::PushByte(_)
            | Instruction::PushShort(_)
            | Instruction::PushConstant { .. } => true,
            Instruction::Bare(op) => matches!(
                op,
                OpCode::PushTrue
                    | OpCode::PushFalse
                    | OpCode::PushNull
                    | OpCode::PushUndefined
                    | OpCode::PushNaN
            ),
            _ => false,
        }
    }

    /// Decode one instruction at the parser's position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown opcodes and
    /// [`crate::Error::OutOfBounds`] for truncated operands.
    pub fn decode(parser: &mut Parser) -> Result<Self> {
        let byte = parser.read_le::<u8>()?;
        let Some(op) = OpCode::from_repr(byte) else {
            return Err(corrupt_error!(
                "Unknown opcode {:#04x} at offset {}",
                byte,
                parser.pos() - 1
            ));
        };

        let instruction = match op {
            OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Kill
            | OpCode::IncLocal
            | OpCode::DecLocal
            | OpCode::IncLocalI
            | OpCode::DecLocalI => Instruction::Local {
                op,
                register: parser.read_u30()?,
            },

            OpCode::IfNlt
            | OpCode::IfNle
            | OpCode::IfNgt
            | OpCode::IfNge
            | OpCode::Jump
            | OpCode::IfTrue
            | OpCode::IfFalse
            | OpCode::IfEq
            | OpCode::IfNe
            | OpCode::IfLt
            | OpCode::IfLe
            | OpCode::IfGt
            | OpCode::IfGe
            | OpCode::IfStrictEq
            | OpCode::IfStrictNe => Instruction::Branch {
                op,
                offset: parser.read_s24()?,
            },

            OpCode::LookupSwitch => {
                let default_offset = parser.read_s24()?;
                let case_count = parser.read_u30()?;
                let mut case_offsets = Vec::with_capacity((case_count as usize).min(1024) + 1);
                for _ in 0..=case_count {
                    case_offsets.push(parser.read_s24()?);
                }
                Instruction::LookupSwitch {
                    default_offset,
                    case_offsets,
                }
            }

            OpCode::PushByte => Instruction::PushByte(parser.read_le::<u8>()?),
            OpCode::PushShort => Instruction::PushShort(parser.read_u30()?),

            OpCode::PushString
            | OpCode::PushInt
            | OpCode::PushUInt
            | OpCode::PushDouble
            | OpCode::PushNamespace => Instruction::PushConstant {
                op,
                index: parser.read_u30()?,
            },

            OpCode::GetSuper
            | OpCode::SetSuper
            | OpCode::GetDescendants
            | OpCode::FindPropStrict
            | OpCode::FindProperty
            | OpCode::FindDef
            | OpCode::GetLex
            | OpCode::SetProperty
            | OpCode::GetProperty
            | OpCode::InitProperty
            | OpCode::DeleteProperty
            | OpCode::Coerce
            | OpCode::AsType
            | OpCode::IsType => Instruction::Property {
                op,
                name: parser.read_u30()?,
            },

            OpCode::CallSuper
            | OpCode::CallProperty
            | OpCode::ConstructProp
            | OpCode::CallPropLex
            | OpCode::CallSuperVoid
            | OpCode::CallPropVoid => Instruction::CallProperty {
                op,
                name: parser.read_u30()?,
                arg_count: parser.read_u30()?,
            },

            OpCode::Call
            | OpCode::Construct
            | OpCode::ConstructSuper
            | OpCode::ApplyType
            | OpCode::NewObject
            | OpCode::NewArray => Instruction::ArgCount {
                op,
                arg_count: parser.read_u30()?,
            },

            OpCode::CallMethod | OpCode::CallStatic => Instruction::CallMethod {
                op,
                index: parser.read_u30()?,
                arg_count: parser.read_u30()?,
            },

            OpCode::NewFunction
            | OpCode::NewClass
            | OpCode::NewCatch
            | OpCode::GetSlot
            | OpCode::SetSlot
            | OpCode::GetGlobalSlot
            | OpCode::SetGlobalSlot
            | OpCode::GetOuterScope
            | OpCode::Dxns
            | OpCode::DebugLine
            | OpCode::DebugFile
            | OpCode::BkptLine => Instruction::Index {
                op,
                index: parser.read_u30()?,
            },

            OpCode::GetScopeObject => Instruction::GetScopeObject(parser.read_le::<u8>()?),

            OpCode::HasNext2 => Instruction::HasNext2 {
                object_register: parser.read_u30()?,
                index_register: parser.read_u30()?,
            },

            OpCode::Debug => Instruction::Debug {
                debug_type: parser.read_le::<u8>()?,
                name: parser.read_u30()?,
                register: parser.read_le::<u8>()?,
                extra: parser.read_u30()?,
            },

            OpCode::Bkpt
            | OpCode::Nop
            | OpCode::Throw
            | OpCode::DxnsLate
            | OpCode::Label
            | OpCode::PushWith
            | OpCode::PopScope
            | OpCode::NextName
            | OpCode::HasNext
            | OpCode::PushNull
            | OpCode::PushUndefined
            | OpCode::NextValue
            | OpCode::PushTrue
            | OpCode::PushFalse
            | OpCode::PushNaN
            | OpCode::Pop
            | OpCode::Dup
            | OpCode::Swap
            | OpCode::PushScope
            | OpCode::Li8
            | OpCode::Li16
            | OpCode::Li32
            | OpCode::Lf32
            | OpCode::Lf64
            | OpCode::Si8
            | OpCode::Si16
            | OpCode::Si32
            | OpCode::Sf32
            | OpCode::Sf64
            | OpCode::ReturnVoid
            | OpCode::ReturnValue
            | OpCode::Sxi1
            | OpCode::Sxi8
            | OpCode::Sxi16
            | OpCode::NewActivation
            | OpCode::GetGlobalScope
            | OpCode::ConvertS
            | OpCode::EscXElem
            | OpCode::EscXAttr
            | OpCode::ConvertI
            | OpCode::ConvertU
            | OpCode::ConvertD
            | OpCode::ConvertB
            | OpCode::ConvertO
            | OpCode::CheckFilter
            | OpCode::CoerceB
            | OpCode::CoerceA
            | OpCode::CoerceI
            | OpCode::CoerceD
            | OpCode::CoerceS
            | OpCode::AsTypeLate
            | OpCode::CoerceU
            | OpCode::CoerceO
            | OpCode::Negate
            | OpCode::Increment
            | OpCode::Decrement
            | OpCode::TypeOf
            | OpCode::Not
            | OpCode::BitNot
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Modulo
            | OpCode::LShift
            | OpCode::RShift
            | OpCode::URShift
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::Equals
            | OpCode::StrictEquals
            | OpCode::LessThan
            | OpCode::LessEquals
            | OpCode::GreaterThan
            | OpCode::GreaterEquals
            | OpCode::InstanceOf
            | OpCode::IsTypeLate
            | OpCode::In
            | OpCode::IncrementI
            | OpCode::DecrementI
            | OpCode::NegateI
            | OpCode::AddI
            | OpCode::SubtractI
            | OpCode::MultiplyI
            | OpCode::GetLocal0
            | OpCode::GetLocal1
            | OpCode::GetLocal2
            | OpCode::GetLocal3
            | OpCode::SetLocal0
            | OpCode::SetLocal1
            | OpCode::SetLocal2
            | OpCode::SetLocal3
            | OpCode::Timestamp => Instruction::Bare(op),
        };

        Ok(instruction)
    }

    /// Encode this instruction with its stored offsets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if a branch offset exceeds the `s24` range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u8(self.opcode().byte());
        match self {
            Instruction::Bare(_) => {}
            Instruction::Local { register, .. } => writer.write_u30(*register),
            Instruction::Branch { offset, .. } => writer.write_s24(*offset)?,
            Instruction::LookupSwitch {
                default_offset,
                case_offsets,
            } => {
                writer.write_s24(*default_offset)?;
                writer.write_u30(case_offsets.len().saturating_sub(1) as u32);
                for offset in case_offsets {
                    writer.write_s24(*offset)?;
                }
            }
            Instruction::PushByte(value) => writer.write_u8(*value),
            Instruction::PushShort(value) => writer.write_u30(*value),
            Instruction::PushConstant { index, .. } | Instruction::Index { index, .. } => {
                writer.write_u30(*index);
            }
            Instruction::Property { name, .. } => writer.write_u30(*name),
            Instruction::CallProperty {
                name, arg_count, ..
            } => {
                writer.write_u30(*name);
                writer.write_u30(*arg_count);
            }
            Instruction::ArgCount { arg_count, .. } => writer.write_u30(*arg_count),
            Instruction::CallMethod {
                index, arg_count, ..
            } => {
                writer.write_u30(*index);
                writer.write_u30(*arg_count);
            }
            Instruction::GetScopeObject(index) => writer.write_u8(*index),
            Instruction::HasNext2 {
                object_register,
                index_register,
            } => {
                writer.write_u30(*object_register);
                writer.write_u30(*index_register);
            }
            Instruction::Debug {
                debug_type,
                name,
                register,
                extra,
            } => {
                writer.write_u8(*debug_type);
                writer.write_u30(*name);
                writer.write_u8(*register);
                writer.write_u30(*extra);
            }
        }
        Ok(())
    }

    /// Encoded size in bytes. Branch widths do not depend on their offsets.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn width(&self) -> usize {
        1 + match self {
            Instruction::Bare(_) => 0,
            Instruction::Local { register, .. } => u32_width(*register),
            Instruction::Branch { .. } => 3,
            Instruction::LookupSwitch { case_offsets, .. } => {
                3 + u32_width(case_offsets.len().saturating_sub(1) as u32) + 3 * case_offsets.len()
            }
            Instruction::PushByte(_) | Instruction::GetScopeObject(_) => 1,
            Instruction::PushShort(value) => u32_width(*value),
            Instruction::PushConstant { index, .. } | Instruction::Index { index, .. } => {
                u32_width(*index)
            }
            Instruction::Property { name, .. } => u32_width(*name),
            Instruction::CallProperty {
                name, arg_count, ..
            } => u32_width(*name) + u32_width(*arg_count),
            Instruction::ArgCount { arg_count, .. } => u32_width(*arg_count),
            Instruction::CallMethod {
                index, arg_count, ..
            } => u32_width(*index) + u32_width(*arg_count),
            Instruction::HasNext2 {
                object_register,
                index_register,
            } => u32_width(*object_register) + u32_width(*index_register),
            Instruction::Debug { name, extra, .. } => 2 + u32_width(*name) + u32_width(*extra),
        }
    }

    /// Operand stack entries consumed. Runtime multiname parts are resolved through `pool`.
    #[must_use]
    pub fn stack_pops(&self, pool: &ConstantPool) -> u32 {
        let runtime = |name: u32| pool.multiname_runtime_pops(name);
        match self {
            Instruction::Bare(op) => match op {
                OpCode::Throw
                | OpCode::DxnsLate
                | OpCode::PushWith
                | OpCode::Pop
                | OpCode::Dup
                | OpCode::PushScope
                | OpCode::ReturnValue
                | OpCode::SetLocal0
                | OpCode::SetLocal1
                | OpCode::SetLocal2
                | OpCode::SetLocal3
                | OpCode::Li8
                | OpCode::Li16
                | OpCode::Li32
                | OpCode::Lf32
                | OpCode::Lf64
                | OpCode::Sxi1
                | OpCode::Sxi8
                | OpCode::Sxi16
                | OpCode::ConvertS
                | OpCode::EscXElem
                | OpCode::EscXAttr
                | OpCode::ConvertI
                | OpCode::ConvertU
                | OpCode::ConvertD
                | OpCode::ConvertB
                | OpCode::ConvertO
                | OpCode::CheckFilter
                | OpCode::CoerceB
                | OpCode::CoerceA
                | OpCode::CoerceI
                | OpCode::CoerceD
                | OpCode::CoerceS
                | OpCode::CoerceU
                | OpCode::CoerceO
                | OpCode::Negate
                | OpCode::Increment
                | OpCode::Decrement
                | OpCode::TypeOf
                | OpCode::Not
                | OpCode::BitNot
                | OpCode::IncrementI
                | OpCode::DecrementI
                | OpCode::NegateI => 1,
                OpCode::NextName
                | OpCode::HasNext
                | OpCode::NextValue
                | OpCode::Swap
                | OpCode::Si8
                | OpCode::Si16
                | OpCode::Si32
                | OpCode::Sf32
                | OpCode::Sf64
                | OpCode::AsTypeLate
                | OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulo
                | OpCode::LShift
                | OpCode::RShift
                | OpCode::URShift
                | OpCode::BitAnd
                | OpCode::BitOr
                | OpCode::BitXor
                | OpCode::Equals
                | OpCode::StrictEquals
                | OpCode::LessThan
                | OpCode::LessEquals
                | OpCode::GreaterThan
                | OpCode::GreaterEquals
                | OpCode::InstanceOf
                | OpCode::IsTypeLate
                | OpCode::In
                | OpCode::AddI
                | OpCode::SubtractI
                | OpCode::MultiplyI => 2,
                _ => 0,
            },
            Instruction::Local { op, .. } => u32::from(*op == OpCode::SetLocal),
            Instruction::Branch { op, .. } => match op {
                OpCode::Jump => 0,
                OpCode::IfTrue | OpCode::IfFalse => 1,
                _ => 2,
            },
            Instruction::LookupSwitch { .. } => 1,
            Instruction::PushByte(_)
            | Instruction::PushShort(_)
            | Instruction::PushConstant { .. }
            | Instruction::GetScopeObject(_)
            | Instruction::HasNext2 { .. }
            | Instruction::Debug { .. } => 0,
            Instruction::Property { op, name } => match op {
                OpCode::GetSuper | OpCode::GetDescendants | OpCode::GetProperty => {
                    1 + runtime(*name)
                }
                OpCode::DeleteProperty => 1 + runtime(*name),
                OpCode::SetSuper | OpCode::SetProperty | OpCode::InitProperty => {
                    2 + runtime(*name)
                }
                OpCode::FindPropStrict | OpCode::FindProperty => runtime(*name),
                OpCode::Coerce | OpCode::AsType | OpCode::IsType => 1,
                _ => 0,
            },
            Instruction::CallProperty {
                name, arg_count, ..
            } => arg_count + 1 + runtime(*name),
            Instruction::ArgCount { op, arg_count } => match op {
                OpCode::Call => arg_count + 2,
                OpCode::NewObject => arg_count * 2,
                OpCode::NewArray => *arg_count,
                _ => arg_count + 1,
            },
            Instruction::CallMethod { arg_count, .. } => arg_count + 1,
            Instruction::Index { op, .. } => match op {
                OpCode::NewClass | OpCode::GetSlot | OpCode::SetGlobalSlot => 1,
                OpCode::SetSlot => 2,
                _ => 0,
            },
        }
    }

    /// Operand stack entries produced.
    #[must_use]
    pub fn stack_pushes(&self) -> u32 {
        match self {
            Instruction::Bare(op) => match op {
                OpCode::Dup | OpCode::Swap => 2,
                OpCode::NextName
                | OpCode::HasNext
                | OpCode::NextValue
                | OpCode::PushNull
                | OpCode::PushUndefined
                | OpCode::PushTrue
                | OpCode::PushFalse
                | OpCode::PushNaN
                | OpCode::Li8
                | OpCode::Li16
                | OpCode::Li32
                | OpCode::Lf32
                | OpCode::Lf64
                | OpCode::Sxi1
                | OpCode::Sxi8
                | OpCode::Sxi16
                | OpCode::NewActivation
                | OpCode::GetGlobalScope
                | OpCode::ConvertS
                | OpCode::EscXElem
                | OpCode::EscXAttr
                | OpCode::ConvertI
                | OpCode::ConvertU
                | OpCode::ConvertD
                | OpCode::ConvertB
                | OpCode::ConvertO
                | OpCode::CheckFilter
                | OpCode::CoerceB
                | OpCode::CoerceA
                | OpCode::CoerceI
                | OpCode::CoerceD
                | OpCode::CoerceS
                | OpCode::AsTypeLate
                | OpCode::CoerceU
                | OpCode::CoerceO
                | OpCode::Negate
                | OpCode::Increment
                | OpCode::Decrement
                | OpCode::TypeOf
                | OpCode::Not
                | OpCode::BitNot
                | OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulo
                | OpCode::LShift
                | OpCode::RShift
                | OpCode::URShift
                | OpCode::BitAnd
                | OpCode::BitOr
                | OpCode::BitXor
                | OpCode::Equals
                | OpCode::StrictEquals
                | OpCode::LessThan
                | OpCode::LessEquals
                | OpCode::GreaterThan
                | OpCode::GreaterEquals
                | OpCode::InstanceOf
                | OpCode::IsTypeLate
                | OpCode::In
                | OpCode::IncrementI
                | OpCode::DecrementI
                | OpCode::NegateI
                | OpCode::AddI
                | OpCode::SubtractI
                | OpCode::MultiplyI
                | OpCode::GetLocal0
                | OpCode::GetLocal1
                | OpCode::GetLocal2
                | OpCode::GetLocal3 => 1,
                _ => 0,
            },
            Instruction::Local { op, .. } => u32::from(*op == OpCode::GetLocal),
            Instruction::Branch { .. }
            | Instruction::LookupSwitch { .. }
            | Instruction::Debug { .. } => 0,
            Instruction::PushByte(_)
            | Instruction::PushShort(_)
            | Instruction::PushConstant { .. }
            | Instruction::GetScopeObject(_)
            | Instruction::HasNext2 { .. } => 1,
            Instruction::Property { op, .. } => match op {
                OpCode::SetSuper | OpCode::SetProperty | OpCode::InitProperty => 0,
                _ => 1,
            },
            Instruction::CallProperty { op, .. } => {
                u32::from(!matches!(op, OpCode::CallSuperVoid | OpCode::CallPropVoid))
            }
            Instruction::ArgCount { op, .. } => u32::from(*op != OpCode::ConstructSuper),
            Instruction::CallMethod { .. } => 1,
            Instruction::Index { op, .. } => match op {
                OpCode::NewFunction
                | OpCode::NewClass
                | OpCode::NewCatch
                | OpCode::GetSlot
                | OpCode::GetGlobalSlot
                | OpCode::GetOuterScope => 1,
                _ => 0,
            },
        }
    }

    /// Change in scope stack depth.
    #[must_use]
    pub fn scope_delta(&self) -> i32 {
        match self.opcode() {
            OpCode::PushScope | OpCode::PushWith => 1,
            OpCode::PopScope => -1,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode())?;
        match self {
            Instruction::Bare(_) => Ok(()),
            Instruction::Local { register, .. } => write!(f, " {register}"),
            Instruction::Branch { offset, .. } => write!(f, " {offset:+}"),
            Instruction::LookupSwitch {
                default_offset,
                case_offsets,
            } => write!(f, " {default_offset:+} {case_offsets:?}"),
            Instruction::PushByte(value) => write!(f, " {}", *value as i8),
            Instruction::PushShort(value) => write!(f, " {value}"),
            Instruction::PushConstant { index, .. } | Instruction::Index { index, .. } => {
                write!(f, " #{index}")
            }
            Instruction::Property { name, .. } => write!(f, " #{name}"),
            Instruction::CallProperty {
                name, arg_count, ..
            } => write!(f, " #{name} ({arg_count})"),
            Instruction::ArgCount { arg_count, .. } => write!(f, " ({arg_count})"),
            Instruction::CallMethod {
                index, arg_count, ..
            } => write!(f, " #{index} ({arg_count})"),
            Instruction::GetScopeObject(index) => write!(f, " {index}"),
            Instruction::HasNext2 {
                object_register,
                index_register,
            } => write!(f, " {object_register} {index_register}"),
            Instruction::Debug {
                debug_type,
                name,
                register,
                extra,
            } => write!(f, " {debug_type} #{name} {register} {extra}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::{Multiname, NamespaceKind};

    fn decode_all(data: &[u8]) -> Vec<Instruction> {
        let mut parser = Parser::new(data);
        let mut out = Vec::new();
        while parser.has_more_data() {
            out.push(Instruction::decode(&mut parser).unwrap());
        }
        out
    }

    #[test]
    fn operand_order_is_preserved() {
        // callproperty #3 (2), debug 1 #4 0 0, hasnext2 5 6, lookupswitch +0 [1 case]
        let data = [
            0x46, 0x03, 0x02, 0xEF, 0x01, 0x04, 0x00, 0x00, 0x32, 0x05, 0x06, 0x1B, 0x00, 0x00,
            0x00, 0x01, 0x04, 0x00, 0x00, 0x08, 0x00, 0x00,
        ];
        let instructions = decode_all(&data);
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0], Instruction::call_property(OpCode::CallProperty, 3, 2));
        assert_eq!(
            instructions[3],
            Instruction::LookupSwitch {
                default_offset: 0,
                case_offsets: vec![4, 8],
            }
        );

        let mut writer = Writer::new();
        for instruction in &instructions {
            instruction.encode(&mut writer).unwrap();
        }
        assert_eq!(writer.data(), &data);
        let widths: usize = instructions.iter().map(Instruction::width).sum();
        assert_eq!(widths, data.len());
    }

    #[test]
    fn unknown_opcode() {
        let error = Instruction::decode(&mut Parser::new(&[0x00])).unwrap_err();
        assert!(error.is_corrupt());
    }

    #[test]
    fn stack_effects() {
        let mut pool = ConstantPool::default();
        let name = pool.add_string("x");
        let ns = pool.add_namespace(NamespaceKind::Package, "");
        let static_name = pool.add_multiname(Multiname::qname(ns, name));
        let late_name = pool.add_multiname(Multiname::RtqNameL { attribute: false });

        let get = Instruction::property(OpCode::GetProperty, static_name);
        assert_eq!((get.stack_pops(&pool), get.stack_pushes()), (1, 1));

        let late = Instruction::property(OpCode::GetProperty, late_name);
        assert_eq!(late.stack_pops(&pool), 3);

        let call = Instruction::call_property(OpCode::CallPropVoid, static_name, 2);
        assert_eq!((call.stack_pops(&pool), call.stack_pushes()), (3, 0));

        let object = Instruction::ArgCount {
            op: OpCode::NewObject,
            arg_count: 2,
        };
        assert_eq!(object.stack_pops(&pool), 4);

        let branch = Instruction::branch(OpCode::IfLt);
        assert_eq!(branch.stack_pops(&pool), 2);
        assert_eq!(Instruction::Bare(OpCode::Dup).stack_pushes(), 2);
    }

    #[test]
    fn small_literals() {
        assert_eq!(Instruction::PushByte(0xFF).small_int(), Some(-1));
        assert_eq!(Instruction::PushShort(4000).small_int(), Some(4000));
        assert_eq!(Instruction::get_local(2), Instruction::Bare(OpCode::GetLocal2));
        assert_eq!(Instruction::set_local(7).register(), Some(7));
        assert_eq!(Instruction::PushShort(4000).to_string(), "pushshort 4000");
    }
}
