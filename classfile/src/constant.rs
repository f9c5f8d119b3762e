/// One entry of the constant pool.
///
/// Index `0` is never materialized as an entry (the pool is 1-indexed, as in
/// the class file format); `Unused` fills the slot after a `Long`/`Double`
/// entry, which occupy two consecutive pool indices.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolEntry {
    Unused,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
}

impl ConstantPoolEntry {
    /// Whether this entry occupies two consecutive constant pool slots, per
    /// the JVM's long-standing (and slightly irregular) indexing rule.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_))
    }

    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            ConstantPoolEntry::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Raw constant pool tag bytes, per the class file format.
pub(crate) mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}
