//! The AVM2 opcode table.

use strum::{Display, EnumIter, FromRepr, IntoStaticStr};

use crate::assembly::FlowType;

/// Every AVM2 opcode, in byte order. `Display` renders the assembler mnemonic.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    FromRepr,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum OpCode {
    Bkpt = 0x01,
    Nop = 0x02,
    Throw = 0x03,
    GetSuper = 0x04,
    SetSuper = 0x05,
    Dxns = 0x06,
    DxnsLate = 0x07,
    Kill = 0x08,
    Label = 0x09,
    IfNlt = 0x0C,
    IfNle = 0x0D,
    IfNgt = 0x0E,
    IfNge = 0x0F,
    Jump = 0x10,
    IfTrue = 0x11,
    IfFalse = 0x12,
    IfEq = 0x13,
    IfNe = 0x14,
    IfLt = 0x15,
    IfLe = 0x16,
    IfGt = 0x17,
    IfGe = 0x18,
    IfStrictEq = 0x19,
    IfStrictNe = 0x1A,
    LookupSwitch = 0x1B,
    PushWith = 0x1C,
    PopScope = 0x1D,
    NextName = 0x1E,
    HasNext = 0x1F,
    PushNull = 0x20,
    PushUndefined = 0x21,
    NextValue = 0x23,
    PushByte = 0x24,
    PushShort = 0x25,
    PushTrue = 0x26,
    PushFalse = 0x27,
    PushNaN = 0x28,
    Pop = 0x29,
    Dup = 0x2A,
    Swap = 0x2B,
    PushString = 0x2C,
    PushInt = 0x2D,
    PushUInt = 0x2E,
    PushDouble = 0x2F,
    PushScope = 0x30,
    PushNamespace = 0x31,
    HasNext2 = 0x32,
    Li8 = 0x35,
    Li16 = 0x36,
    Li32 = 0x37,
    Lf32 = 0x38,
    Lf64 = 0x39,
    Si8 = 0x3A,
    Si16 = 0x3B,
    Si32 = 0x3C,
    Sf32 = 0x3D,
    Sf64 = 0x3E,
    NewFunction = 0x40,
    Call = 0x41,
    Construct = 0x42,
    CallMethod = 0x43,
    CallStatic = 0x44,
    CallSuper = 0x45,
    CallProperty = 0x46,
    ReturnVoid = 0x47,
    ReturnValue = 0x48,
    ConstructSuper = 0x49,
    ConstructProp = 0x4A,
    CallPropLex = 0x4C,
    CallSuperVoid = 0x4E,
    CallPropVoid = 0x4F,
    Sxi1 = 0x50,
    Sxi8 = 0x51,
    Sxi16 = 0x52,
    ApplyType = 0x53,
    NewObject = 0x55,
    NewArray = 0x56,
    NewActivation = 0x57,
    NewClass = 0x58,
    GetDescendants = 0x59,
    NewCatch = 0x5A,
    FindPropStrict = 0x5D,
    FindProperty = 0x5E,
    FindDef = 0x5F,
    GetLex = 0x60,
    SetProperty = 0x61,
    GetLocal = 0x62,
    SetLocal = 0x63,
    GetGlobalScope = 0x64,
    GetScopeObject = 0x65,
    GetProperty = 0x66,
    GetOuterScope = 0x67,
    InitProperty = 0x68,
    DeleteProperty = 0x6A,
    GetSlot = 0x6C,
    SetSlot = 0x6D,
    GetGlobalSlot = 0x6E,
    SetGlobalSlot = 0x6F,
    #[strum(serialize = "convert_s")]
    ConvertS = 0x70,
    #[strum(serialize = "esc_xelem")]
    EscXElem = 0x71,
    #[strum(serialize = "esc_xattr")]
    EscXAttr = 0x72,
    #[strum(serialize = "convert_i")]
    ConvertI = 0x73,
    #[strum(serialize = "convert_u")]
    ConvertU = 0x74,
    #[strum(serialize = "convert_d")]
    ConvertD = 0x75,
    #[strum(serialize = "convert_b")]
    ConvertB = 0x76,
    #[strum(serialize = "convert_o")]
    ConvertO = 0x77,
    CheckFilter = 0x78,
    Coerce = 0x80,
    #[strum(serialize = "coerce_b")]
    CoerceB = 0x81,
    #[strum(serialize = "coerce_a")]
    CoerceA = 0x82,
    #[strum(serialize = "coerce_i")]
    CoerceI = 0x83,
    #[strum(serialize = "coerce_d")]
    CoerceD = 0x84,
    #[strum(serialize = "coerce_s")]
    CoerceS = 0x85,
    AsType = 0x86,
    AsTypeLate = 0x87,
    #[strum(serialize = "coerce_u")]
    CoerceU = 0x88,
    #[strum(serialize = "coerce_o")]
    CoerceO = 0x89,
    Negate = 0x90,
    Increment = 0x91,
    IncLocal = 0x92,
    Decrement = 0x93,
    DecLocal = 0x94,
    TypeOf = 0x95,
    Not = 0x96,
    BitNot = 0x97,
    Add = 0xA0,
    Subtract = 0xA1,
    Multiply = 0xA2,
    Divide = 0xA3,
    Modulo = 0xA4,
    LShift = 0xA5,
    RShift = 0xA6,
    URShift = 0xA7,
    BitAnd = 0xA8,
    BitOr = 0xA9,
    BitXor = 0xAA,
    Equals = 0xAB,
    StrictEquals = 0xAC,
    LessThan = 0xAD,
    LessEquals = 0xAE,
    GreaterThan = 0xAF,
    GreaterEquals = 0xB0,
    InstanceOf = 0xB1,
    IsType = 0xB2,
    IsTypeLate = 0xB3,
    In = 0xB4,
    #[strum(serialize = "increment_i")]
    IncrementI = 0xC0,
    #[strum(serialize = "decrement_i")]
    DecrementI = 0xC1,
    #[strum(serialize = "inclocal_i")]
    IncLocalI = 0xC2,
    #[strum(serialize = "declocal_i")]
    DecLocalI = 0xC3,
    #[strum(serialize = "negate_i")]
    NegateI = 0xC4,
    #[strum(serialize = "add_i")]
    AddI = 0xC5,
    #[strum(serialize = "subtract_i")]
    SubtractI = 0xC6,
    #[strum(serialize = "multiply_i")]
    MultiplyI = 0xC7,
    #[strum(serialize = "getlocal_0")]
    GetLocal0 = 0xD0,
    #[strum(serialize = "getlocal_1")]
    GetLocal1 = 0xD1,
    #[strum(serialize = "getlocal_2")]
    GetLocal2 = 0xD2,
    #[strum(serialize = "getlocal_3")]
    GetLocal3 = 0xD3,
    #[strum(serialize = "setlocal_0")]
    SetLocal0 = 0xD4,
    #[strum(serialize = "setlocal_1")]
    SetLocal1 = 0xD5,
    #[strum(serialize = "setlocal_2")]
    SetLocal2 = 0xD6,
    #[strum(serialize = "setlocal_3")]
    SetLocal3 = 0xD7,
    Debug = 0xEF,
    DebugLine = 0xF0,
    DebugFile = 0xF1,
    BkptLine = 0xF2,
    Timestamp = 0xF3,
}

impl OpCode {
    /// The opcode byte.
    #[must_use]
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// The assembler mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// How this opcode transfers control.
    #[must_use]
    pub fn flow_type(self) -> FlowType {
        match self {
            OpCode::Jump => FlowType::UnconditionalBranch,
            OpCode::IfNlt
            | OpCode::IfNle
            | OpCode::IfNgt
            | OpCode::IfNge
            | OpCode::IfTrue
            | OpCode::IfFalse
            | OpCode::IfEq
            | OpCode::IfNe
            | OpCode::IfLt
            | OpCode::IfLe
            | OpCode::IfGt
            | OpCode::IfGe
            | OpCode::IfStrictEq
            | OpCode::IfStrictNe => FlowType::ConditionalBranch,
            OpCode::LookupSwitch => FlowType::Switch,
            OpCode::ReturnVoid | OpCode::ReturnValue => FlowType::Return,
            OpCode::Throw => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Returns true for `jump` and the conditional branches.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        )
    }

    /// Returns true for conditional branches.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        self.flow_type() == FlowType::ConditionalBranch
    }

    /// Register read or written by the implied-register forms `getlocal_N`/`setlocal_N`.
    #[must_use]
    pub fn implied_register(self) -> Option<u32> {
        match self {
            OpCode::GetLocal0 | OpCode::SetLocal0 => Some(0),
            OpCode::GetLocal1 | OpCode::SetLocal1 => Some(1),
            OpCode::GetLocal2 | OpCode::SetLocal2 => Some(2),
            OpCode::GetLocal3 | OpCode::SetLocal3 => Some(3),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn mnemonics() {
        assert_eq!(OpCode::GetLocal0.to_string(), "getlocal_0");
        assert_eq!(OpCode::CallPropVoid.mnemonic(), "callpropvoid");
        assert_eq!(OpCode::ConvertI.to_string(), "convert_i");
        assert_eq!(OpCode::PushNaN.to_string(), "pushnan");
    }

    #[test]
    fn table_is_ordered_by_byte() {
        let bytes: Vec<u8> = OpCode::iter().map(OpCode::byte).collect();
        assert!(bytes.windows(2).all(|pair| pair[0] < pair[1]));
        for op in OpCode::iter() {
            assert_eq!(OpCode::from_repr(op.byte()), Some(op));
        }
        assert_eq!(OpCode::from_repr(0x00), None);
        assert_eq!(OpCode::from_repr(0x22), None);
    }

    #[test]
    fn flow() {
        assert_eq!(OpCode::Jump.flow_type(), FlowType::UnconditionalBranch);
        assert!(OpCode::IfStrictNe.is_conditional());
        assert_eq!(OpCode::ReturnValue.flow_type(), FlowType::Return);
        assert_eq!(OpCode::LookupSwitch.flow_type(), FlowType::Switch);
        assert!(!OpCode::LookupSwitch.is_branch());
        assert_eq!(OpCode::SetLocal2.implied_register(), Some(2));
    }
}
