//! Plain data types for a parsed `.class` file, plus a minimal reader.
//!
//! This crate is the external collaborator spec'd as "class-file parsing" —
//! it is not a verifier and does not attempt to understand every attribute
//! the class file format defines. It exists so the runtime core has a typed
//! boundary to consume rather than raw bytes.

pub mod attribute;
pub mod constant;
pub mod error;
mod reader;
pub mod flags;

pub use attribute::{AttributeInfo, ExceptionTableEntry};
pub use constant::ConstantPoolEntry;
pub use error::ClassFileError;
pub use flags::{ClassFlags, FieldFlags, MethodFlags};
pub use reader::parse;

/// A fully-read class file, constant-pool indices intact and unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: Vec<ConstantPoolEntry>,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn class_flags(&self) -> ClassFlags {
        ClassFlags(self.access_flags)
    }

    pub fn constant_utf8(&self, index: u16) -> Option<&str> {
        self.constant_pool.get(index as usize)?.as_utf8()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    pub fn field_flags(&self) -> FieldFlags {
        FieldFlags(self.access_flags)
    }
}

/// `MethodInfo` shares its shape with `FieldInfo` in the class file format;
/// the alias keeps call sites self-documenting without duplicating the type.
pub type MethodInfo = FieldInfo;

impl FieldInfo {
    pub fn method_flags(&self) -> MethodFlags {
        MethodFlags(self.access_flags)
    }

    /// The `Code` attribute, if this entry is a method with a body (i.e. not
    /// `abstract` or `native`).
    pub fn code(&self) -> Option<(u16, u16, &[u8], &[ExceptionTableEntry])> {
        self.attributes.iter().find_map(|attr| match attr {
            AttributeInfo::Code {
                max_stack,
                max_locals,
                code,
                exception_table,
            } => Some((*max_stack, *max_locals, code.as_slice(), exception_table.as_slice())),
            AttributeInfo::Other { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_be(v: u16) -> [u8; 2] {
        v.to_be_bytes()
    }
    fn u32_be(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    /// Builds the smallest legal class file: no fields, no methods, a
    /// constant pool holding just the class's own name and `java/lang/Object`.
    fn minimal_class_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        b.extend_from_slice(&u16_be(0)); // minor
        b.extend_from_slice(&u16_be(61)); // major (Java 17)

        // constant pool: #1 Utf8 "Example", #2 Class -> #1,
        // #3 Utf8 "java/lang/Object", #4 Class -> #3
        b.extend_from_slice(&u16_be(5)); // count = next_index
        b.push(1); // Utf8
        b.extend_from_slice(&u16_be(7));
        b.extend_from_slice(b"Example");
        b.push(7); // Class
        b.extend_from_slice(&u16_be(1));
        b.push(1); // Utf8
        b.extend_from_slice(&u16_be(16));
        b.extend_from_slice(b"java/lang/Object");
        b.push(7); // Class
        b.extend_from_slice(&u16_be(3));

        b.extend_from_slice(&u16_be(0x0021)); // access_flags: PUBLIC | SUPER
        b.extend_from_slice(&u16_be(2)); // this_class
        b.extend_from_slice(&u16_be(4)); // super_class
        b.extend_from_slice(&u16_be(0)); // interfaces_count
        b.extend_from_slice(&u16_be(0)); // fields_count
        b.extend_from_slice(&u16_be(0)); // methods_count
        b.extend_from_slice(&u16_be(0)); // attributes_count
        b
    }

    #[test]
    fn parses_minimal_class() {
        let bytes = minimal_class_bytes();
        let class = parse(&bytes).expect("minimal class file should parse");
        assert_eq!(class.major_version, 61);
        assert_eq!(class.constant_utf8(1), Some("Example"));
        assert_eq!(class.constant_utf8(3), Some("java/lang/Object"));
        assert!(class.fields.is_empty());
        assert!(class.methods.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_class_bytes();
        bytes[3] = 0x00;
        match parse(&bytes) {
            Err(ClassFileError::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = minimal_class_bytes();
        let truncated = &bytes[..bytes.len() - 4];
        assert!(matches!(parse(truncated), Err(ClassFileError::Truncated)));
    }

    #[test]
    fn long_and_double_constants_occupy_two_slots() {
        let mut b = Vec::new();
        b.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        b.extend_from_slice(&u16_be(0));
        b.extend_from_slice(&u16_be(61));

        // count = 5: #1 Long (2 slots), #3 Class -> #... , #4 Utf8
        b.extend_from_slice(&u16_be(5));
        b.push(5); // Long
        b.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 42]);
        b.push(1); // Utf8 at #3
        b.extend_from_slice(&u16_be(1));
        b.extend_from_slice(b"X");

        b.extend_from_slice(&u16_be(0x0021));
        b.extend_from_slice(&u16_be(3));
        b.extend_from_slice(&u16_be(0));
        b.extend_from_slice(&u16_be(0));
        b.extend_from_slice(&u16_be(0));
        b.extend_from_slice(&u16_be(0));
        b.extend_from_slice(&u16_be(0));

        let class = parse(&b).unwrap();
        assert_eq!(class.constant_pool[1], ConstantPoolEntry::Long(42));
        assert_eq!(class.constant_pool[2], ConstantPoolEntry::Unused);
        assert_eq!(class.constant_utf8(3), Some("X"));
        let _ = u32_be(0);
    }
}
