//! A method body's bytecode as an editable instruction arena.
//!
//! [`Code`] stores decoded instructions in order and keeps control transfers as index
//! links in two side tables: the jump exits (branch index to target index) and the switch
//! exits (switch index to case targets, default last). Byte offsets only exist while
//! decoding and encoding, so instructions can be inserted and removed freely; every index
//! shift updates both tables.
//!
//! # Examples
//!
//! ```rust
//! use swfscope::assembly::{Code, Instruction, OpCode};
//!
//! // pushtrue, iftrue +1, pushfalse, returnvoid
//! let mut code = Code::decode(&[0x26, 0x11, 0x01, 0x00, 0x00, 0x27, 0x47])?;
//! assert_eq!(code.jump_exit(1), Some(3));
//!
//! code.insert(3, Instruction::Bare(OpCode::Nop));
//! assert_eq!(code.jump_exit(1), Some(4));
//! assert_eq!(code.encode()?, vec![0x26, 0x11, 0x02, 0x00, 0x00, 0x27, 0x02, 0x47]);
//! # Ok::<(), swfscope::Error>(())
//! ```

use std::{collections::BTreeMap, ops::Range};

use crate::{
    abc::ConstantPool,
    assembly::{FlowType, Instruction, OpCode},
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Decoded, editable bytecode of one method body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
    instructions: Vec<Instruction>,
    jump_exits: BTreeMap<usize, usize>,
    switch_exits: BTreeMap<usize, Vec<usize>>,
}

impl Code {
    /// Default bound on layout passes during encoding.
    pub const MAX_LAYOUT_ITERATIONS: usize = 32;

    /// An empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode raw bytecode and resolve every branch and switch target to an index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown opcodes and for targets that do not
    /// land on an instruction boundary.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let mut instructions = Vec::new();
        let mut positions = Vec::new();
        while parser.has_more_data() {
            positions.push(parser.pos());
            instructions.push(Instruction::decode(&mut parser)?);
        }

        let resolve = |site: usize, base: usize, offset: i32| -> Result<usize> {
            let target = i64::try_from(base).unwrap_or(i64::MAX) + i64::from(offset);
            usize::try_from(target)
                .ok()
                .and_then(|target| positions.binary_search(&target).ok())
                .ok_or_else(|| {
                    corrupt_error!(
                        "Instruction {} targets byte {} which is not an instruction boundary",
                        site,
                        target
                    )
                })
        };

        let mut jump_exits = BTreeMap::new();
        let mut switch_exits = BTreeMap::new();
        for (index, instruction) in instructions.iter().enumerate() {
            match instruction {
                Instruction::Branch { offset, .. } => {
                    let end = positions[index] + instruction.width();
                    jump_exits.insert(index, resolve(index, end, *offset)?);
                }
                Instruction::LookupSwitch {
                    default_offset,
                    case_offsets,
                } => {
                    let start = positions[index];
                    let mut targets = Vec::with_capacity(case_offsets.len() + 1);
                    for offset in case_offsets {
                        targets.push(resolve(index, start, *offset)?);
                    }
                    targets.push(resolve(index, start, *default_offset)?);
                    switch_exits.insert(index, targets);
                }
                _ => {}
            }
        }

        Ok(Code {
            instructions,
            jump_exits,
            switch_exits,
        })
    }

    /// Encode with the default layout bound.
    ///
    /// # Errors
    /// See [`Code::encode_with_limit`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_with_limit(Self::MAX_LAYOUT_ITERATIONS)
    }

    /// Lay the instructions out until their positions stop moving, then emit them with
    /// branch offsets recomputed from the exit tables.
    ///
    /// # Errors
    /// - [`crate::Error::LayoutDivergence`] if no fixed point is reached within
    ///   `max_iterations` passes
    /// - [`crate::Error::Corrupt`] for a branch without an exit or an offset outside the
    ///   `s24` range
    pub fn encode_with_limit(&self, max_iterations: usize) -> Result<Vec<u8>> {
        let mut positions = Self::positions(self.instructions.iter().map(Instruction::width));

        for _ in 0..max_iterations {
            let laid_out = self.layout(&positions)?;
            let next = Self::positions(laid_out.iter().map(Instruction::width));
            if next == positions {
                let mut writer = Writer::with_capacity(positions.last().copied().unwrap_or(0));
                for instruction in &laid_out {
                    instruction.encode(&mut writer)?;
                }
                return Ok(writer.into_inner());
            }
            positions = next;
        }

        Err(Error::LayoutDivergence(max_iterations))
    }

    fn positions(widths: impl Iterator<Item = usize>) -> Vec<usize> {
        let mut positions = vec![0];
        let mut offset = 0;
        for width in widths {
            offset += width;
            positions.push(offset);
        }
        positions
    }

    fn layout(&self, positions: &[usize]) -> Result<Vec<Instruction>> {
        let relative = |from: usize, to: usize| -> Result<i32> {
            let delta = i64::try_from(positions[to]).unwrap_or(i64::MAX)
                - i64::try_from(from).unwrap_or(i64::MAX);
            i32::try_from(delta)
                .map_err(|_| corrupt_error!("Branch distance {} exceeds the s24 range", delta))
        };

        let mut laid_out = Vec::with_capacity(self.instructions.len());
        for (index, instruction) in self.instructions.iter().enumerate() {
            let placed = match instruction {
                Instruction::Branch { op, .. } => {
                    let Some(&target) = self.jump_exits.get(&index) else {
                        return Err(corrupt_error!("Branch {} at {} has no exit", op, index));
                    };
                    Instruction::Branch {
                        op: *op,
                        offset: relative(positions[index + 1], target)?,
                    }
                }
                Instruction::LookupSwitch { .. } => {
                    let Some((default, cases)) = self
                        .switch_exits
                        .get(&index)
                        .and_then(|targets| targets.split_last())
                    else {
                        return Err(corrupt_error!("Switch at {} has no exits", index));
                    };
                    let start = positions[index];
                    Instruction::LookupSwitch {
                        default_offset: relative(start, *default)?,
                        case_offsets: cases
                            .iter()
                            .map(|&target| relative(start, target))
                            .collect::<Result<Vec<_>>>()?,
                    }
                }
                other => other.clone(),
            };
            laid_out.push(placed);
        }
        Ok(laid_out)
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// All instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterate over the instructions.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Mutable instruction at `index`, for operand edits. Use [`Code::replace`] to change
    /// an instruction's control flow.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    /// Target index of the branch at `branch`.
    #[must_use]
    pub fn jump_exit(&self, branch: usize) -> Option<usize> {
        self.jump_exits.get(&branch).copied()
    }

    /// Targets of the switch at `switch`, cases first and default last.
    #[must_use]
    pub fn switch_exit(&self, switch: usize) -> Option<&[usize]> {
        self.switch_exits.get(&switch).map(Vec::as_slice)
    }

    /// Every branch and its target.
    #[must_use]
    pub fn jump_exits(&self) -> &BTreeMap<usize, usize> {
        &self.jump_exits
    }

    /// Every switch and its targets.
    #[must_use]
    pub fn switch_exits(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.switch_exits
    }

    /// Returns true if the code contains any branch or switch.
    #[must_use]
    pub fn has_exits(&self) -> bool {
        !self.jump_exits.is_empty() || !self.switch_exits.is_empty()
    }

    /// Indices of the instructions that transfer control to `index`.
    pub fn references(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let jumps = self
            .jump_exits
            .iter()
            .filter(move |(_, &target)| target == index)
            .map(|(&site, _)| site);
        let switches = self
            .switch_exits
            .iter()
            .filter(move |(_, targets)| targets.contains(&index))
            .map(|(&site, _)| site);
        jumps.chain(switches)
    }

    /// Returns true if any branch or switch targets `index`.
    #[must_use]
    pub fn is_target(&self, index: usize) -> bool {
        self.references(index).next().is_some()
    }

    /// Insert `instruction` before `index`. Exits that targeted the instruction formerly
    /// at `index` follow it.
    pub fn insert(&mut self, index: usize, instruction: Instruction) {
        self.insert_range(index, vec![instruction]);
    }

    /// Insert `instructions` before `index`.
    pub fn insert_range(&mut self, index: usize, instructions: Vec<Instruction>) {
        let count = instructions.len();
        if count == 0 {
            return;
        }
        let index = index.min(self.instructions.len());
        self.remap(|position| Some(if position >= index { position + count } else { position }));
        self.instructions.splice(index..index, instructions);
    }

    /// Append an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Append instructions.
    pub fn extend(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.extend(instructions);
    }

    /// Remove the instruction at `index`.
    ///
    /// # Errors
    /// See [`Code::remove_range`].
    pub fn remove(&mut self, index: usize) -> Result<Instruction> {
        let mut removed = self.remove_range(index..index + 1)?;
        removed.pop().ok_or(out_of_bounds_error!())
    }

    /// Remove `range`. Exits owned by removed instructions are dropped.
    ///
    /// # Errors
    /// - [`crate::Error::OutOfBounds`] if the range exceeds the code
    /// - [`crate::Error::TargetStillReferenced`] if an instruction outside the range
    ///   still targets one inside it
    pub fn remove_range(&mut self, range: Range<usize>) -> Result<Vec<Instruction>> {
        if range.start > range.end || range.end > self.instructions.len() {
            return Err(out_of_bounds_error!());
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let outside = |site: &usize| !range.contains(site);
        for (site, target) in &self.jump_exits {
            if outside(site) && range.contains(target) {
                return Err(Error::TargetStillReferenced(*target));
            }
        }
        for (site, targets) in &self.switch_exits {
            if let Some(target) = targets.iter().find(|t| range.contains(t)) {
                if outside(site) {
                    return Err(Error::TargetStillReferenced(*target));
                }
            }
        }

        self.jump_exits.retain(|site, _| outside(site));
        self.switch_exits.retain(|site, _| outside(site));
        let count = range.len();
        let end = range.end;
        self.remap(|position| Some(if position >= end { position - count } else { position }));

        Ok(self.instructions.drain(range).collect())
    }

    /// Replace the instruction at `index`, returning the old one.
    ///
    /// A replacement that is no longer a branch (or switch) drops the exit; a branch
    /// replaced by a branch keeps it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the end.
    pub fn replace(&mut self, index: usize, instruction: Instruction) -> Result<Instruction> {
        let slot = self
            .instructions
            .get_mut(index)
            .ok_or(out_of_bounds_error!())?;
        if !instruction.opcode().is_branch() {
            self.jump_exits.remove(&index);
        }
        if instruction.opcode() != OpCode::LookupSwitch {
            self.switch_exits.remove(&index);
        }
        Ok(std::mem::replace(slot, instruction))
    }

    /// Point the branch at `branch` to `target`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the end and
    /// [`crate::Error::Corrupt`] if `branch` is not a branch.
    pub fn set_jump_exit(&mut self, branch: usize, target: usize) -> Result<()> {
        let instruction = self.instructions.get(branch).ok_or(out_of_bounds_error!())?;
        if !instruction.opcode().is_branch() {
            return Err(corrupt_error!("Instruction {} is not a branch", branch));
        }
        if target >= self.instructions.len() {
            return Err(out_of_bounds_error!());
        }
        self.jump_exits.insert(branch, target);
        Ok(())
    }

    /// Set the targets of the switch at `switch`, cases first and default last.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the end and
    /// [`crate::Error::Corrupt`] if `switch` is not a `lookupswitch` or fewer than one case
    /// plus the default are given.
    pub fn set_switch_exits(&mut self, switch: usize, targets: Vec<usize>) -> Result<()> {
        let instruction = self.instructions.get(switch).ok_or(out_of_bounds_error!())?;
        if instruction.opcode() != OpCode::LookupSwitch {
            return Err(corrupt_error!("Instruction {} is not a switch", switch));
        }
        if targets.len() < 2 {
            return Err(corrupt_error!("Switch {} needs a case and a default target", switch));
        }
        if targets.iter().any(|&t| t >= self.instructions.len()) {
            return Err(out_of_bounds_error!());
        }
        self.switch_exits.insert(switch, targets);
        Ok(())
    }

    /// Redirect every exit that targets `from` to `to`.
    pub fn retarget(&mut self, from: usize, to: usize) {
        for target in self.jump_exits.values_mut() {
            if *target == from {
                *target = to;
            }
        }
        for targets in self.switch_exits.values_mut() {
            for target in targets.iter_mut().filter(|t| **t == from) {
                *target = to;
            }
        }
    }

    fn remap(&mut self, map: impl Fn(usize) -> Option<usize>) {
        self.jump_exits = std::mem::take(&mut self.jump_exits)
            .into_iter()
            .filter_map(|(site, target)| Some((map(site)?, map(target)?)))
            .collect();
        self.switch_exits = std::mem::take(&mut self.switch_exits)
            .into_iter()
            .filter_map(|(site, targets)| {
                let targets = targets.into_iter().map(&map).collect::<Option<Vec<_>>>()?;
                Some((map(site)?, targets))
            })
            .collect();
    }

    /// Indices reachable in one step from `index`.
    #[must_use]
    pub fn successors(&self, index: usize) -> Vec<usize> {
        let Some(instruction) = self.instructions.get(index) else {
            return Vec::new();
        };
        let next = Some(index + 1).filter(|&n| n < self.instructions.len());
        match instruction.flow_type() {
            FlowType::Sequential => next.into_iter().collect(),
            FlowType::ConditionalBranch => {
                next.into_iter().chain(self.jump_exit(index)).collect()
            }
            FlowType::UnconditionalBranch => self.jump_exit(index).into_iter().collect(),
            FlowType::Switch => self.switch_exit(index).map(<[usize]>::to_vec).unwrap_or_default(),
            FlowType::Return | FlowType::Throw => Vec::new(),
        }
    }

    /// First index of `op`.
    #[must_use]
    pub fn index_of(&self, op: OpCode) -> Option<usize> {
        self.index_of_from(op, 0)
    }

    /// First index of `op` at or after `start`.
    #[must_use]
    pub fn index_of_from(&self, op: OpCode, start: usize) -> Option<usize> {
        self.instructions
            .iter()
            .skip(start)
            .position(|i| i.opcode() == op)
            .map(|position| position + start)
    }

    /// Last index of `op`.
    #[must_use]
    pub fn last_index_of(&self, op: OpCode) -> Option<usize> {
        self.instructions.iter().rposition(|i| i.opcode() == op)
    }

    /// Returns true if any instruction uses `op`.
    #[must_use]
    pub fn contains(&self, op: OpCode) -> bool {
        self.index_of(op).is_some()
    }

    /// Returns true if the opcodes at the start of the code are exactly `ops`.
    #[must_use]
    pub fn starts_with(&self, ops: &[OpCode]) -> bool {
        ops.len() <= self.instructions.len()
            && self
                .instructions
                .iter()
                .zip(ops)
                .all(|(instruction, op)| instruction.opcode() == *op)
    }

    /// Opcode histogram in opcode byte order.
    #[must_use]
    pub fn op_groups(&self) -> BTreeMap<OpCode, usize> {
        let mut groups = BTreeMap::new();
        for instruction in &self.instructions {
            *groups.entry(instruction.opcode()).or_insert(0) += 1;
        }
        groups
    }

    /// Instructions skipped by the forward branch at `branch`.
    #[must_use]
    pub fn jump_block(&self, branch: usize) -> Option<&[Instruction]> {
        let target = self.jump_exit(branch)?;
        if target <= branch {
            return None;
        }
        self.instructions.get(branch + 1..target)
    }

    /// Highest register referenced by any instruction.
    #[must_use]
    pub fn max_register(&self) -> Option<u32> {
        self.instructions
            .iter()
            .flat_map(|instruction| match instruction {
                Instruction::HasNext2 {
                    object_register,
                    index_register,
                } => vec![*object_register, *index_register],
                other => other.register().into_iter().collect(),
            })
            .max()
    }

    /// Peak operand stack depth over every reachable path.
    #[must_use]
    pub fn max_stack(&self, pool: &ConstantPool) -> u32 {
        self.peaks(pool).0
    }

    /// Peak scope stack growth over every reachable path, relative to the entry depth.
    #[must_use]
    pub fn max_scope_depth(&self) -> u32 {
        self.peaks(&ConstantPool::default()).1
    }

    fn peaks(&self, pool: &ConstantPool) -> (u32, u32) {
        if self.instructions.is_empty() {
            return (0, 0);
        }

        let mut seen: Vec<bool> = vec![false; self.instructions.len()];
        let mut pending = vec![(0usize, 0u32, 0u32)];
        let (mut max_stack, mut max_scope) = (0, 0);

        while let Some((index, stack, scope)) = pending.pop() {
            if seen[index] {
                continue;
            }
            seen[index] = true;

            let instruction = &self.instructions[index];
            let stack = stack.saturating_sub(instruction.stack_pops(pool)) + instruction.stack_pushes();
            let scope = scope.saturating_add_signed(instruction.scope_delta());
            max_stack = max_stack.max(stack);
            max_scope = max_scope.max(scope);

            for successor in self.successors(index) {
                if !seen[successor] {
                    pending.push((successor, stack, scope));
                }
            }
        }

        (max_stack, max_scope)
    }
}

impl<'a> IntoIterator for &'a Code {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl From<Vec<Instruction>> for Code {
    /// Wrap straight-line instructions. Branches need their exits set afterwards.
    fn from(instructions: Vec<Instruction>) -> Self {
        Code {
            instructions,
            ..Code::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // getlocal_0, iffalse -> 4, pushbyte 1, jump -> 5, pushbyte 2, returnvalue, returnvoid
    const BRANCHY: [u8; 15] = [
        0xD0, 0x12, 0x06, 0x00, 0x00, 0x24, 0x01, 0x10, 0x02, 0x00, 0x00, 0x24, 0x02, 0x48, 0x47,
    ];

    #[test]
    fn decode_resolves_targets() {
        let code = Code::decode(&BRANCHY).unwrap();
        assert_eq!(code.len(), 7);
        assert_eq!(code.jump_exit(1), Some(4));
        assert_eq!(code.jump_exit(3), Some(5));
        assert_eq!(code.encode().unwrap(), BRANCHY);
    }

    #[test]
    fn misaligned_target_is_corrupt() {
        // jump +1 lands inside pushbyte's operand
        let data = [0x10, 0x01, 0x00, 0x00, 0x24, 0x01, 0x47];
        assert!(Code::decode(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn switch_offsets_are_relative_to_switch_start() {
        // getlocal_1, lookupswitch default +10 cases [+9], nop, returnvoid, returnvoid
        let data = [
            0xD1, 0x1B, 0x0A, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x02, 0x47, 0x47,
        ];
        let code = Code::decode(&data).unwrap();
        assert_eq!(code.switch_exit(1), Some(&[3, 4][..]));
        assert_eq!(code.encode().unwrap(), data);
        assert!(code.has_exits());
    }

    #[test]
    fn insert_shifts_exits() {
        let mut code = Code::decode(&BRANCHY).unwrap();
        code.insert(2, Instruction::Bare(OpCode::Nop));
        assert_eq!(code.jump_exit(1), Some(5));
        assert_eq!(code.jump_exit(4), Some(6));

        let bytes = code.encode().unwrap();
        let reparsed = Code::decode(&bytes).unwrap();
        assert_eq!(reparsed.instructions(), code.instructions());
        assert_eq!(reparsed.jump_exits(), code.jump_exits());
    }

    #[test]
    fn removing_a_target_is_refused() {
        let mut code = Code::decode(&BRANCHY).unwrap();
        assert!(matches!(code.remove(4), Err(Error::TargetStillReferenced(4))));
        assert_eq!(code.len(), 7);

        code.retarget(4, 5);
        let removed = code.remove_range(2..5).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(code.len(), 4);
        assert_eq!(code.jump_exit(1), Some(2));
        assert_eq!(code.jump_exits().len(), 1);
    }

    #[test]
    fn replace_drops_exit() {
        let mut code = Code::decode(&BRANCHY).unwrap();
        let old = code.replace(3, Instruction::Bare(OpCode::Nop)).unwrap();
        assert_eq!(old.opcode(), OpCode::Jump);
        assert_eq!(code.jump_exit(3), None);
        assert!(code.set_jump_exit(3, 5).unwrap_err().is_corrupt());
    }

    #[test]
    fn branch_without_exit() {
        let mut code = Code::new();
        code.push(Instruction::branch(OpCode::Jump));
        code.push(Instruction::Bare(OpCode::ReturnVoid));
        assert!(code.encode().unwrap_err().is_corrupt());

        code.set_jump_exit(0, 1).unwrap();
        assert_eq!(code.encode().unwrap(), vec![0x10, 0x00, 0x00, 0x00, 0x47]);
    }

    #[test]
    fn layout_limit() {
        let code = Code::decode(&BRANCHY).unwrap();
        assert!(matches!(code.encode_with_limit(0), Err(Error::LayoutDivergence(0))));
        assert!(code.encode_with_limit(1).is_ok());
    }

    #[test]
    fn queries() {
        let code = Code::decode(&BRANCHY).unwrap();
        assert_eq!(code.index_of(OpCode::PushByte), Some(2));
        assert_eq!(code.index_of_from(OpCode::PushByte, 3), Some(4));
        assert_eq!(code.last_index_of(OpCode::PushByte), Some(4));
        assert!(code.starts_with(&[OpCode::GetLocal0, OpCode::IfFalse]));
        assert_eq!(code.op_groups()[&OpCode::PushByte], 2);
        assert_eq!(code.jump_block(1).map(<[Instruction]>::len), Some(2));
        assert_eq!(code.max_register(), Some(0));
        assert_eq!(code.max_stack(&ConstantPool::default()), 1);
        assert_eq!(code.successors(1), vec![2, 4]);
        assert_eq!(code.references(4).collect::<Vec<_>>(), vec![1]);
    }
}
