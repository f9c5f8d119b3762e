use once_cell::sync::OnceCell;

use crate::descriptor::MethodDescriptor;
use crate::instruction::Instruction;
use crate::keys::{ClassId, Symbol};
use jvmcore_classfile::ExceptionTableEntry;

/// A callable routine on a class. Holds raw bytecode plus, after
/// optimization, the decoded instruction vector. Optimization is deferred
/// until first use and is idempotent: a second call is a no-op.
#[derive(Debug)]
pub struct Method {
    pub owner: ClassId,
    pub name: Symbol,
    pub descriptor: MethodDescriptor,
    pub descriptor_symbol: Symbol,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_native: bool,
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    instructions: OnceCell<Vec<Instruction>>,
}

impl Method {
    pub fn new(
        owner: ClassId,
        name: Symbol,
        descriptor: MethodDescriptor,
        descriptor_symbol: Symbol,
        is_static: bool,
        is_abstract: bool,
        is_native: bool,
        max_stack: u16,
        max_locals: u16,
        bytecode: Vec<u8>,
        exception_table: Vec<ExceptionTableEntry>,
    ) -> Self {
        Method {
            owner,
            name,
            descriptor,
            descriptor_symbol,
            is_static,
            is_abstract,
            is_native,
            max_stack,
            max_locals,
            bytecode,
            exception_table,
            instructions: OnceCell::new(),
        }
    }

    pub fn is_optimized(&self) -> bool {
        self.instructions.get().is_some()
    }

    pub fn instructions(&self) -> Option<&[Instruction]> {
        self.instructions.get().map(Vec::as_slice)
    }

    /// Installs the decoded/linked instruction vector. Called exactly once
    /// by `crate::optimize::optimize`; a second attempt (e.g. from a
    /// concurrent first call on another thread) is silently dropped since
    /// `OnceCell` already holds the winning value.
    pub fn set_instructions(&self, instructions: Vec<Instruction>) {
        let _ = self.instructions.set(instructions);
    }

    /// Number of argument slots this method expects on the operand stack at
    /// call time: declared parameters plus one for `this` on instance
    /// methods.
    pub fn argument_slot_count(&self) -> usize {
        self.descriptor.parameter_slot_count() + usize::from(!self.is_static)
    }
}
