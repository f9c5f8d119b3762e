/// One row of a `Code` attribute's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// An attribute attached to a class, field, method or `Code` attribute.
///
/// Only `Code` is read by the core; everything else the JVM defines
/// (`LineNumberTable`, `StackMapTable`, annotations, …) is kept verbatim as
/// `Other` so a class file round-trips through this reader without loss,
/// without this crate having to understand every attribute kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    Code {
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        exception_table: Vec<ExceptionTableEntry>,
    },
    Other {
        name: String,
        data: Vec<u8>,
    },
}

impl AttributeInfo {
    pub fn name(&self) -> &str {
        match self {
            AttributeInfo::Code { .. } => "Code",
            AttributeInfo::Other { name, .. } => name,
        }
    }
}
