//! Constant-condition branch folding and the cleanup that follows it.
//!
//! The obfuscator this targets pushes boolean literals at the top of a body and lets
//! conditional branches consume them, so half of every such branch is never taken while a
//! linear disassembler still follows it. [`ConstantConditionPass`] walks the body with a
//! [`Machine`], folds every branch whose condition is a known literal on all paths and
//! drops what became unreachable. [`CleanupPass`] then removes the debris: jumps to the
//! next instruction and literal pushes that are popped right away.

use crate::{
    abc::ConstantPool,
    assembly::{Code, FlowType, Instruction, Machine, OpCode},
    deobfuscation::CodePass,
    Result,
};

/// Abstract state on entry to every instruction, `None` where unreachable.
///
/// Returns `None` if two paths join with different stack heights.
fn entry_states(code: &Code, pool: &ConstantPool) -> Option<Vec<Option<Machine>>> {
    let mut states: Vec<Option<Machine>> = vec![None; code.len()];
    if code.is_empty() {
        return Some(states);
    }
    states[0] = Some(Machine::new());

    let mut pending = vec![0];
    while let Some(index) = pending.pop() {
        let Some(mut machine) = states[index].clone() else {
            continue;
        };
        let instruction = &code.instructions()[index];

        let decision = match instruction.flow_type() {
            FlowType::ConditionalBranch => machine.run_condition(instruction),
            _ => None,
        };
        machine.execute(instruction, pool);

        let successors = match decision {
            Some(true) => code.jump_exit(index).into_iter().collect(),
            Some(false) => Some(index + 1)
                .filter(|&next| next < code.len())
                .into_iter()
                .collect(),
            None => code.successors(index),
        };

        for successor in successors {
            match states[successor].as_mut() {
                Some(existing) => match existing.merge(&machine) {
                    Some(true) => pending.push(successor),
                    Some(false) => {}
                    None => return None,
                },
                None => {
                    states[successor] = Some(machine.clone());
                    pending.push(successor);
                }
            }
        }
    }

    Some(states)
}

/// Reachability from instruction 0 over the current exits.
fn reachable(code: &Code) -> Vec<bool> {
    let mut seen = vec![false; code.len()];
    let mut pending = if code.is_empty() { Vec::new() } else { vec![0] };
    while let Some(index) = pending.pop() {
        if std::mem::replace(&mut seen[index], true) {
            continue;
        }
        pending.extend(code.successors(index).into_iter().filter(|&s| !seen[s]));
    }
    seen
}

/// Replace the conditional branch at `index` by pops of its operands, followed by a
/// `jump` to its target when `taken`.
fn fold_branch(code: &mut Code, index: usize, taken: bool, pool: &ConstantPool) -> Result<()> {
    let instruction = code.get(index).cloned().ok_or(out_of_bounds_error!())?;
    let target = code.jump_exit(index);

    let mut replacement = vec![Instruction::Bare(OpCode::Pop); instruction.stack_pops(pool) as usize];
    if taken {
        replacement.push(Instruction::branch(OpCode::Jump));
    }
    if replacement.is_empty() {
        replacement.push(Instruction::Bare(OpCode::Nop));
    }

    let count = replacement.len();
    let rest = replacement.split_off(1);
    let first = replacement.remove(0);
    code.replace(index, first)?;
    code.insert_range(index + 1, rest);

    if taken {
        let Some(target) = target else {
            return Err(corrupt_error!("Branch at {} has no exit", index));
        };
        let target = if target > index { target + count - 1 } else { target };
        code.set_jump_exit(index + count - 1, target)?;
    }
    Ok(())
}

/// Drop every instruction that is unreachable from the entry.
///
/// Returns true if anything was removed.
///
/// # Errors
/// Returns [`crate::Error::TargetStillReferenced`] if a reachable exit points into a
/// removed range, which would indicate inconsistent exits.
pub fn remove_unreachable(code: &mut Code) -> Result<bool> {
    let live = reachable(code);
    if live.iter().all(|&l| l) {
        return Ok(false);
    }

    // Dead branches may point into other dead ranges
    for (index, &is_live) in live.iter().enumerate() {
        let flow = code.instructions()[index].flow_type();
        if !is_live && matches!(flow, FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch) {
            code.replace(index, Instruction::Bare(OpCode::Nop))?;
        }
    }

    let mut end = live.len();
    while end > 0 {
        if live[end - 1] {
            end -= 1;
            continue;
        }
        let mut start = end - 1;
        while start > 0 && !live[start - 1] {
            start -= 1;
        }
        code.remove_range(start..end)?;
        end = start;
    }
    Ok(true)
}

/// Folds conditional branches whose condition is a known literal on every path into
/// the edge actually taken, then drops the unreachable side.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantConditionPass;

impl CodePass for ConstantConditionPass {
    fn name(&self) -> &'static str {
        "constant-condition"
    }

    fn run(&self, code: &mut Code, pool: &ConstantPool) -> Result<bool> {
        let Some(states) = entry_states(code, pool) else {
            log::debug!("Stack heights disagree at a join, leaving body untouched");
            return Ok(false);
        };

        let decisions = code
            .iter()
            .enumerate()
            .filter(|(_, instruction)| instruction.flow_type() == FlowType::ConditionalBranch)
            .filter_map(|(index, instruction)| {
                let taken = states[index].as_ref()?.run_condition(instruction)?;
                Some((index, taken))
            })
            .collect::<Vec<_>>();

        // Back to front, so folding never shifts a pending index
        for &(index, taken) in decisions.iter().rev() {
            fold_branch(code, index, taken, pool)?;
        }

        let removed = remove_unreachable(code)?;
        Ok(!decisions.is_empty() || removed)
    }

    fn description(&self) -> &'static str {
        "Folds branches on literal conditions and removes the dead side"
    }
}

/// Removes jumps to the next instruction and literal pushes that are immediately popped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupPass;

impl CleanupPass {
    fn remove_fallthrough_jumps(code: &mut Code) -> Result<bool> {
        let mut changed = false;
        for index in (0..code.len()).rev() {
            let is_jump = code.get(index).map(Instruction::opcode) == Some(OpCode::Jump);
            if is_jump && code.jump_exit(index) == Some(index + 1) {
                code.retarget(index, index + 1);
                code.remove(index)?;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn remove_push_pop_pairs(code: &mut Code) -> Result<bool> {
        let mut changed = false;
        let mut index = code.len().saturating_sub(2);
        loop {
            let pair = code.get(index).is_some_and(Instruction::is_literal_push)
                && code.get(index + 1).map(Instruction::opcode) == Some(OpCode::Pop);
            if pair && !code.is_target(index + 1) && index + 2 < code.len() {
                code.retarget(index, index + 2);
                code.remove_range(index..index + 2)?;
                changed = true;
            }
            if index == 0 {
                break;
            }
            index -= 1;
        }
        Ok(changed)
    }
}

impl CodePass for CleanupPass {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn run(&self, code: &mut Code, _pool: &ConstantPool) -> Result<bool> {
        let mut changed = false;
        loop {
            let jumps = Self::remove_fallthrough_jumps(code)?;
            let pairs = Self::remove_push_pop_pairs(code)?;
            if !(jumps || pairs) {
                return Ok(changed);
            }
            changed = true;
        }
    }

    fn description(&self) -> &'static str {
        "Removes fall-through jumps and push/pop pairs"
    }
}
