//! Symbolic execution over literal values.
//!
//! The [`Machine`] models the operand stack and register file of a single method
//! activation, but only tracks values that are known at decode time: literal pushes,
//! register copies and the comparisons between them. Anything else becomes
//! [`Value::Unknown`], while the stack height stays exact.

use std::collections::BTreeMap;

use crate::{
    abc::ConstantPool,
    assembly::{Instruction, OpCode},
};

/// A symbolic value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Not known statically
    Unknown,
    /// `true` or `false`
    Boolean(bool),
    /// An integral number
    Integer(i64),
    /// A floating point number
    Number(f64),
    /// A string, by pool index
    String(u32),
    /// `null`
    Null,
}

impl Value {
    /// Returns true unless the value is [`Value::Unknown`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown)
    }

    /// Truthiness, when it can be decided without the pool.
    #[must_use]
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            Value::Integer(value) => Some(*value != 0),
            Value::Number(value) => Some(*value != 0.0 && !value.is_nan()),
            Value::Null => Some(false),
            Value::String(_) | Value::Unknown => None,
        }
    }

    /// Numeric view used by relational comparisons.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn number(&self) -> Option<f64> {
        match self {
            Value::Boolean(value) => Some(if *value { 1.0 } else { 0.0 }),
            Value::Integer(value) => Some(*value as f64),
            Value::Number(value) => Some(*value),
            Value::Null => Some(0.0),
            Value::String(_) | Value::Unknown => None,
        }
    }

    /// Identity used when merging states; NaN equals itself.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    fn loose_equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::String(a), Value::String(b)) if a == b => Some(true),
            (Value::String(_), _) | (_, Value::String(_)) => None,
            (Value::Null, Value::Null) => Some(true),
            (Value::Null, _) | (_, Value::Null) => Some(false),
            _ => Some(self.number()? == other.number()?),
        }
    }

    fn strict_equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Unknown, _) | (_, Value::Unknown) => None,
            (Value::String(a), Value::String(b)) if a == b => Some(true),
            (Value::String(_), Value::String(_)) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
            (Value::Null, Value::Null) => Some(true),
            (
                Value::Integer(_) | Value::Number(_),
                Value::Integer(_) | Value::Number(_),
            ) => Some(self.number()? == other.number()?),
            _ => Some(false),
        }
    }
}

/// Symbolic operand stack and register file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Machine {
    stack: Vec<Value>,
    registers: BTreeMap<u32, Value>,
}

impl Machine {
    /// An empty machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current operand stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Top of the operand stack.
    #[must_use]
    pub fn top(&self) -> Value {
        self.peek(0)
    }

    /// Value `depth` entries below the top.
    #[must_use]
    pub fn peek(&self, depth: usize) -> Value {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.stack.get(index))
            .copied()
            .unwrap_or(Value::Unknown)
    }

    /// Push a value.
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop a value; an empty stack yields [`Value::Unknown`].
    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Unknown)
    }

    /// Known value of `register`.
    #[must_use]
    pub fn register(&self, register: u32) -> Value {
        self.registers
            .get(&register)
            .copied()
            .unwrap_or(Value::Unknown)
    }

    /// Store a value into `register`.
    pub fn set_register(&mut self, register: u32, value: Value) {
        if value.is_known() {
            self.registers.insert(register, value);
        } else {
            self.registers.remove(&register);
        }
    }

    /// Join `other` into this state: values that differ become unknown.
    ///
    /// Returns `None` if the stack heights disagree, otherwise whether this state changed.
    pub fn merge(&mut self, other: &Machine) -> Option<bool> {
        if self.stack.len() != other.stack.len() {
            return None;
        }

        let mut changed = false;
        for (mine, theirs) in self.stack.iter_mut().zip(&other.stack) {
            if mine.is_known() && !mine.same(theirs) {
                *mine = Value::Unknown;
                changed = true;
            }
        }

        let before = self.registers.len();
        self.registers
            .retain(|register, value| other.registers.get(register).is_some_and(|v| v.same(value)));
        changed |= self.registers.len() != before;

        Some(changed)
    }

    /// Apply `instruction` to this state.
    ///
    /// Literal pushes, register moves, `pop`/`dup`/`swap`, `not` and the comparison
    /// operators are evaluated; every other instruction pops and pushes unknowns
    /// according to its stack effect.
    pub fn execute(&mut self, instruction: &Instruction, pool: &ConstantPool) {
        match instruction {
            Instruction::Bare(op) => match op {
                OpCode::PushTrue => self.push(Value::Boolean(true)),
                OpCode::PushFalse => self.push(Value::Boolean(false)),
                OpCode::PushNull => self.push(Value::Null),
                OpCode::PushNaN => self.push(Value::Number(f64::NAN)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => {
                    let top = self.pop();
                    self.push(top);
                    self.push(top);
                }
                OpCode::Swap => {
                    let top = self.pop();
                    let below = self.pop();
                    self.push(top);
                    self.push(below);
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(value.truthy().map_or(Value::Unknown, |b| Value::Boolean(!b)));
                }
                OpCode::ConvertB | OpCode::CoerceB => {
                    let value = self.pop();
                    self.push(value.truthy().map_or(Value::Unknown, Value::Boolean));
                }
                OpCode::Equals
                | OpCode::StrictEquals
                | OpCode::LessThan
                | OpCode::LessEquals
                | OpCode::GreaterThan
                | OpCode::GreaterEquals => {
                    let right = self.pop();
                    let left = self.pop();
                    let result = compare(*op, &left, &right);
                    self.push(result.map_or(Value::Unknown, Value::Boolean));
                }
                _ => match op.implied_register() {
                    Some(register) => self.move_register(instruction, register),
                    None => self.apply_effect(instruction, pool),
                },
            },
            Instruction::Local { op, register } => match op {
                OpCode::GetLocal | OpCode::SetLocal => self.move_register(instruction, *register),
                _ => self.set_register(*register, Value::Unknown),
            },
            Instruction::PushByte(_) | Instruction::PushShort(_) => {
                let value = instruction.small_int().map_or(Value::Unknown, |v| {
                    Value::Integer(i64::from(v))
                });
                self.push(value);
            }
            Instruction::PushConstant { op, index } => {
                let value = match op {
                    OpCode::PushInt => pool.int(*index).map(|v| Value::Integer(i64::from(v))),
                    OpCode::PushUInt => pool.uint(*index).map(|v| Value::Integer(i64::from(v))),
                    OpCode::PushDouble => pool.double(*index).map(Value::Number),
                    OpCode::PushString => Some(Value::String(*index)),
                    _ => None,
                };
                self.push(value.unwrap_or(Value::Unknown));
            }
            Instruction::HasNext2 {
                object_register,
                index_register,
            } => {
                self.set_register(*object_register, Value::Unknown);
                self.set_register(*index_register, Value::Unknown);
                self.push(Value::Unknown);
            }
            _ => self.apply_effect(instruction, pool),
        }
    }

    /// Evaluate a branch against the current state without consuming operands.
    ///
    /// `jump` is always taken; conditional branches resolve when their operands are known.
    #[must_use]
    pub fn run_condition(&self, instruction: &Instruction) -> Option<bool> {
        let Instruction::Branch { op, .. } = instruction else {
            return None;
        };

        match op {
            OpCode::Jump => Some(true),
            OpCode::IfTrue => self.top().truthy(),
            OpCode::IfFalse => self.top().truthy().map(|b| !b),
            _ => {
                let right = self.peek(0);
                let left = self.peek(1);
                let comparison = match op {
                    OpCode::IfEq => OpCode::Equals,
                    OpCode::IfNe => return compare(OpCode::Equals, &left, &right).map(|b| !b),
                    OpCode::IfStrictEq => OpCode::StrictEquals,
                    OpCode::IfStrictNe => {
                        return compare(OpCode::StrictEquals, &left, &right).map(|b| !b)
                    }
                    OpCode::IfLt => OpCode::LessThan,
                    OpCode::IfLe => OpCode::LessEquals,
                    OpCode::IfGt => OpCode::GreaterThan,
                    OpCode::IfGe => OpCode::GreaterEquals,
                    OpCode::IfNlt => return compare(OpCode::LessThan, &left, &right).map(|b| !b),
                    OpCode::IfNle => {
                        return compare(OpCode::LessEquals, &left, &right).map(|b| !b)
                    }
                    OpCode::IfNgt => {
                        return compare(OpCode::GreaterThan, &left, &right).map(|b| !b)
                    }
                    OpCode::IfNge => {
                        return compare(OpCode::GreaterEquals, &left, &right).map(|b| !b)
                    }
                    _ => return None,
                };
                compare(comparison, &left, &right)
            }
        }
    }

    fn move_register(&mut self, instruction: &Instruction, register: u32) {
        if instruction.is_get_local() {
            let value = self.register(register);
            self.push(value);
        } else {
            let value = self.pop();
            self.set_register(register, value);
        }
    }

    fn apply_effect(&mut self, instruction: &Instruction, pool: &ConstantPool) {
        for _ in 0..instruction.stack_pops(pool) {
            self.pop();
        }
        for _ in 0..instruction.stack_pushes() {
            self.push(Value::Unknown);
        }
    }
}

fn compare(op: OpCode, left: &Value, right: &Value) -> Option<bool> {
    match op {
        OpCode::Equals => left.loose_equals(right),
        OpCode::StrictEquals => left.strict_equals(right),
        _ => {
            let (a, b) = (left.number()?, right.number()?);
            if a.is_nan() || b.is_nan() {
                return Some(false);
            }
            Some(match op {
                OpCode::LessThan => a < b,
                OpCode::LessEquals => a <= b,
                OpCode::GreaterThan => a > b,
                OpCode::GreaterEquals => a >= b,
                _ => return None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut Machine, instructions: &[Instruction]) {
        let pool = ConstantPool::default();
        for instruction in instructions {
            machine.execute(instruction, &pool);
        }
    }

    #[test]
    fn literals_and_registers() {
        let mut machine = Machine::new();
        run(
            &mut machine,
            &[
                Instruction::PushByte(5),
                Instruction::set_local(4),
                Instruction::get_local(4),
                Instruction::Bare(OpCode::PushTrue),
                Instruction::Bare(OpCode::Swap),
            ],
        );
        assert_eq!(machine.stack(), &[Value::Boolean(true), Value::Integer(5)]);
        assert_eq!(machine.register(4), Value::Integer(5));
    }

    #[test]
    fn conditions() {
        let mut machine = Machine::new();
        run(&mut machine, &[Instruction::Bare(OpCode::PushTrue)]);
        assert_eq!(machine.run_condition(&Instruction::branch(OpCode::IfTrue)), Some(true));
        assert_eq!(machine.run_condition(&Instruction::branch(OpCode::IfFalse)), Some(false));

        run(
            &mut machine,
            &[Instruction::PushByte(1), Instruction::PushByte(2)],
        );
        assert_eq!(machine.run_condition(&Instruction::branch(OpCode::IfLt)), Some(true));
        assert_eq!(machine.run_condition(&Instruction::branch(OpCode::IfNlt)), Some(false));
        assert_eq!(machine.run_condition(&Instruction::branch(OpCode::Jump)), Some(true));

        let mut unknown = Machine::new();
        run(&mut unknown, &[Instruction::get_local(1)]);
        assert_eq!(unknown.run_condition(&Instruction::branch(OpCode::IfTrue)), None);
    }

    #[test]
    fn unmodelled_instructions_keep_height() {
        let mut pool = ConstantPool::default();
        let name = pool.add_string("f");
        let multiname = pool.add_multiname(crate::abc::Multiname::qname(0, name));

        let mut machine = Machine::new();
        machine.push(Value::Integer(1));
        machine.push(Value::Integer(2));
        machine.execute(&Instruction::call_property(OpCode::CallProperty, multiname, 1), &pool);
        assert_eq!(machine.stack(), &[Value::Unknown]);
    }

    #[test]
    fn merge_forgets_disagreements() {
        let mut left = Machine::new();
        left.push(Value::Boolean(true));
        left.set_register(1, Value::Integer(3));

        let mut right = Machine::new();
        right.push(Value::Boolean(false));
        right.set_register(1, Value::Integer(3));

        assert_eq!(left.merge(&right), Some(true));
        assert_eq!(left.stack(), &[Value::Unknown]);
        assert_eq!(left.register(1), Value::Integer(3));
        assert_eq!(left.merge(&right), Some(false));

        right.push(Value::Null);
        assert_eq!(left.merge(&right), None);
    }
}
