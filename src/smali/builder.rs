//! This module contains the mutable view the optimizer uses to rewrite a
//! method's code, including the compaction step that strips removed
//! instructions and remaps every address that referred to them.

use std::collections::BTreeSet;

use crate::smali::{
    instruction::Instruction,
    method::DexMethod,
};

/// A mutable view over one method's instruction stream.
///
/// The view exists so that rewrites go through a narrow interface: passes
/// replace instructions in place or turn them into `nop`, and address
/// renumbering happens in exactly one place ([`MethodBuilder::compact`]).
/// A fresh view must be obtained from the class manager after any rewrite, as
/// compaction invalidates previously-observed addresses.
#[derive(Debug)]
pub struct MethodBuilder<'a> {
    method: &'a mut DexMethod,
}

impl<'a> MethodBuilder<'a> {
    /// Constructs a builder view over `method`.
    #[must_use]
    pub fn new(method: &'a mut DexMethod) -> Self {
        Self { method }
    }

    /// Gets the method being rewritten.
    #[must_use]
    pub fn method(&self) -> &DexMethod {
        self.method
    }

    /// Gets the number of instructions in the method.
    #[must_use]
    pub fn len(&self) -> usize {
        self.method.instructions.len()
    }

    /// Checks whether the method has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.method.instructions.is_empty()
    }

    /// Gets the instruction at `address`, if it exists.
    #[must_use]
    pub fn instruction(&self, address: usize) -> Option<&Instruction> {
        self.method.instructions.get(address)
    }

    /// Replaces the instruction at `address` with `instruction`.
    ///
    /// # Panics
    ///
    /// Panics if `address` is out of bounds. Passes only rewrite addresses
    /// they obtained from the execution graph of this same method, so an
    /// out-of-bounds address is a programmer bug.
    pub fn replace(&mut self, address: usize, instruction: Instruction) {
        self.method.instructions[address] = instruction;
    }

    /// Replaces the instruction at `address` with a `nop`, marking it for
    /// removal by the next compaction.
    ///
    /// # Panics
    ///
    /// Panics if `address` is out of bounds, which is a programmer bug.
    pub fn nop(&mut self, address: usize) {
        self.method.instructions[address] = Instruction::Nop;
    }

    /// Removes every `nop` and every instruction in `dead` from the method,
    /// remapping branch targets, switch tables, and try/catch regions onto
    /// the surviving addresses.
    ///
    /// A `nop` that is the final instruction is preserved when a surviving
    /// branch still refers past it, so that every target keeps a landing
    /// address.
    ///
    /// Returns whether anything was removed.
    pub fn compact(&mut self, dead: &BTreeSet<usize>) -> bool {
        let instructions = &self.method.instructions;
        let mut removable: Vec<bool> = instructions
            .iter()
            .enumerate()
            .map(|(address, instruction)| {
                matches!(instruction, Instruction::Nop) || dead.contains(&address)
            })
            .collect();

        // Every referenced address must land on a surviving instruction at or
        // after it. Keep the landing instruction alive where none follows.
        let referenced: BTreeSet<usize> = instructions
            .iter()
            .enumerate()
            .filter(|(address, _)| !removable[*address])
            .flat_map(|(_, instruction)| instruction.branch_targets())
            .chain(self.method.try_blocks.iter().flat_map(|block| {
                block.handlers.iter().map(|handler| handler.target)
            }))
            .collect();
        for target in referenced {
            if !instructions[target..].iter().enumerate().any(|(offset, _)| !removable[target + offset]) {
                removable[target] = false;
            }
        }

        // The method must still end on an instruction that cannot fall
        // through. Where removal would leave a falling-through tail (for
        // example behind an always-throwing instruction), the original
        // continuation is kept instead.
        loop {
            let Some(last_kept) = removable.iter().rposition(|remove| !*remove) else {
                if !removable.is_empty() {
                    removable[0] = false;
                    continue;
                }
                break;
            };
            let falls_through = !instructions[last_kept].is_terminal()
                && !matches!(instructions[last_kept], Instruction::Goto { .. });
            if falls_through && last_kept + 1 < removable.len() {
                removable[last_kept + 1] = false;
                continue;
            }
            break;
        }

        if removable.iter().all(|remove| !remove) {
            return false;
        }

        // The new address of a surviving instruction is the count of
        // survivors before it; a removed address maps to the next survivor.
        let mut new_address = vec![0usize; removable.len() + 1];
        let mut survivors = 0usize;
        for (address, remove) in removable.iter().enumerate() {
            new_address[address] = survivors;
            if !remove {
                survivors += 1;
            }
        }
        new_address[removable.len()] = survivors;

        let remap = |address: usize| -> usize { new_address[address] };

        let mut compacted = Vec::with_capacity(survivors);
        for (address, instruction) in self.method.instructions.drain(..).enumerate() {
            if removable[address] {
                continue;
            }
            compacted.push(remap_instruction(instruction, &remap));
        }
        self.method.instructions = compacted;

        for block in &mut self.method.try_blocks {
            block.start = remap(block.start);
            block.end = new_address[block.end];
            for handler in &mut block.handlers {
                handler.target = remap(handler.target);
            }
        }
        self.method.try_blocks.retain(|block| block.start < block.end);

        true
    }
}

/// Rewrites the addresses embedded in `instruction` through `remap`.
fn remap_instruction(instruction: Instruction, remap: &impl Fn(usize) -> usize) -> Instruction {
    match instruction {
        Instruction::Goto { target } => Instruction::Goto {
            target: remap(target),
        },
        Instruction::IfTest {
            lhs,
            rhs,
            comparison,
            target,
        } => Instruction::IfTest {
            lhs,
            rhs,
            comparison,
            target: remap(target),
        },
        Instruction::IfTestZ {
            value,
            comparison,
            target,
        } => Instruction::IfTestZ {
            value,
            comparison,
            target: remap(target),
        },
        Instruction::PackedSwitch {
            value,
            first_key,
            targets,
        } => Instruction::PackedSwitch {
            value,
            first_key,
            targets: targets.into_iter().map(remap).collect(),
        },
        Instruction::SparseSwitch {
            value,
            keys,
            targets,
        } => Instruction::SparseSwitch {
            value,
            keys,
            targets: targets.into_iter().map(remap).collect(),
        },
        other => other,
    }
}
