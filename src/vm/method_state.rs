//! This module contains the register-file state of a method under execution.

use std::collections::BTreeSet;

use crate::{
    error::{container::Locatable, execution, execution::Error},
    vm::value::HeapItem,
};

/// The register file of one method frame during symbolic execution, together
/// with the per-node dataflow marks.
///
/// # Pseudo-Registers
///
/// Beyond the numbered frame registers, a frame carries the invoke result
/// (read by `move-result*`) and the caught exception (read by
/// `move-exception`) in dedicated slots, mirroring how the runtime keeps them
/// out of the addressable frame.
///
/// # Dataflow Marks
///
/// Each node's execution starts from fresh, empty read/assigned marks (a
/// branched copy clears them). [`MethodState::read_register`] marks a read
/// and [`MethodState::peek_register`] does not, so state inspection by the
/// engine itself never pollutes the dataflow the optimizer later queries.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodState {
    /// The numbered registers of the frame.
    registers: Vec<HeapItem>,

    /// The registers assigned during the current node's execution.
    assigned: BTreeSet<u16>,

    /// The registers read during the current node's execution.
    read: BTreeSet<u16>,

    /// The result of the most recent invoke, awaiting `move-result*`.
    result: Option<HeapItem>,

    /// The caught exception awaiting `move-exception`.
    exception: Option<HeapItem>,
}

impl MethodState {
    /// Constructs a state of `register_count` registers, each holding an
    /// untyped unknown.
    #[must_use]
    pub fn new(register_count: usize) -> Self {
        let registers = (0..register_count).map(|_| HeapItem::untyped_unknown()).collect();
        Self {
            registers,
            assigned: BTreeSet::new(),
            read: BTreeSet::new(),
            result: None,
            exception: None,
        }
    }

    /// Gets the number of registers in the frame.
    #[must_use]
    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Reads the register `register`, marking it read for dataflow purposes.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the register is out of range for the frame.
    pub fn read_register(&mut self, register: u16) -> execution::Result<HeapItem> {
        self.read.insert(register);
        self.peek_register(register)
    }

    /// Reads the register `register` without leaving a dataflow mark.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the register is out of range for the frame.
    pub fn peek_register(&self, register: u16) -> execution::Result<HeapItem> {
        self.registers
            .get(register as usize)
            .cloned()
            .ok_or(Error::RegisterOutOfRange {
                register: register as usize,
                frame_size: self.registers.len(),
            })
            .locate(u32::from(register))
    }

    /// Assigns `item` to the register `register`, marking it assigned.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the register is out of range for the frame.
    pub fn assign_register(&mut self, register: u16, item: HeapItem) -> execution::Result<()> {
        let frame_size = self.registers.len();
        let slot = self
            .registers
            .get_mut(register as usize)
            .ok_or(Error::RegisterOutOfRange {
                register: register as usize,
                frame_size,
            })
            .locate(u32::from(register))?;
        *slot = item;
        self.assigned.insert(register);

        Ok(())
    }

    /// Assigns the wide `item` to the register pair starting at `register`.
    ///
    /// Both halves of the pair receive the item, mirroring the runtime's view
    /// that the pair holds one value.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if either register of the pair is out of range.
    pub fn assign_register_wide(&mut self, register: u16, item: HeapItem) -> execution::Result<()> {
        self.assign_register(register, item.clone())?;
        self.assign_register(register + 1, item)
    }

    /// Sets the invoke-result pseudo-register.
    pub fn set_result(&mut self, item: HeapItem) {
        self.result = Some(item);
    }

    /// Takes the invoke-result pseudo-register, leaving it empty.
    #[must_use]
    pub fn take_result(&mut self) -> Option<HeapItem> {
        self.result.take()
    }

    /// Gets the invoke-result pseudo-register without consuming it.
    #[must_use]
    pub fn result_snapshot(&self) -> Option<HeapItem> {
        self.result.clone()
    }

    /// Empties the invoke-result pseudo-register, for invokes of `void`
    /// methods.
    pub fn clear_result(&mut self) {
        self.result = None;
    }

    /// Sets the caught-exception pseudo-register.
    pub fn set_exception_item(&mut self, item: HeapItem) {
        self.exception = Some(item);
    }

    /// Gets the caught-exception pseudo-register.
    #[must_use]
    pub fn exception_item(&self) -> Option<&HeapItem> {
        self.exception.as_ref()
    }

    /// Gets the registers assigned during the current node's execution.
    #[must_use]
    pub fn assigned_registers(&self) -> &BTreeSet<u16> {
        &self.assigned
    }

    /// Gets the registers read during the current node's execution.
    #[must_use]
    pub fn read_registers(&self) -> &BTreeSet<u16> {
        &self.read
    }

    /// Creates the register file for a child node: values are deep-copied so
    /// divergent paths cannot see one another's writes, and the dataflow
    /// marks start fresh.
    #[must_use]
    pub fn branch(&self) -> Self {
        let registers = self.registers.iter().map(HeapItem::deep_clone).collect();
        Self {
            registers,
            assigned: BTreeSet::new(),
            read: BTreeSet::new(),
            result: self.result.as_ref().map(HeapItem::deep_clone),
            exception: self.exception.as_ref().map(HeapItem::deep_clone),
        }
    }

    /// Joins another state into this one register-wise in the value lattice.
    ///
    /// Both states must belong to the same frame; a mismatch in register
    /// count is a programmer bug.
    ///
    /// # Panics
    ///
    /// Panics if the register counts differ.
    pub fn merge_with(&mut self, other: &Self) {
        assert_eq!(
            self.registers.len(),
            other.registers.len(),
            "States of the same method must have identical register counts"
        );
        for (slot, incoming) in self.registers.iter_mut().zip(other.registers.iter()) {
            *slot = slot.merge(incoming);
        }
    }
}
