use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::attribute::{AttributeInfo, ExceptionTableEntry};
use crate::constant::{tag, ConstantPoolEntry};
use crate::error::ClassFileError;
use crate::{ClassFile, FieldInfo, MethodInfo};

const MAGIC: u32 = 0xCAFEBABE;

/// Turns raw `.class` bytes into a [`ClassFile`].
///
/// This is a reader, not a verifier: constant pool indices referenced by
/// fields/methods/attributes are copied through as-is and only validated
/// when the core later dereferences them. Unknown attributes are kept as
/// opaque byte blobs rather than rejected.
pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassFileError> {
    let mut cursor = Cursor::new(bytes);

    let magic = read_u32(&mut cursor)?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }

    let minor_version = read_u16(&mut cursor)?;
    let major_version = read_u16(&mut cursor)?;

    let constant_pool = read_constant_pool(&mut cursor)?;

    let access_flags = read_u16(&mut cursor)?;
    let this_class = read_u16(&mut cursor)?;
    let super_class = read_u16(&mut cursor)?;

    let interfaces_count = read_u16(&mut cursor)?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(read_u16(&mut cursor)?);
    }

    let fields_count = read_u16(&mut cursor)?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        fields.push(read_field_or_method(&mut cursor, &constant_pool)?);
    }

    let methods_count = read_u16(&mut cursor)?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(read_field_or_method(&mut cursor, &constant_pool)?);
    }

    let attributes = read_attributes(&mut cursor, &constant_pool)?;

    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

fn read_constant_pool(cursor: &mut Cursor<&[u8]>) -> Result<Vec<ConstantPoolEntry>, ClassFileError> {
    let count = read_u16(cursor)?;
    let mut pool = Vec::with_capacity(count as usize);
    pool.push(ConstantPoolEntry::Unused);

    let mut i = 1;
    while i < count {
        let entry = read_constant_entry(cursor)?;
        let wide = entry.is_wide();
        pool.push(entry);
        i += 1;
        if wide {
            pool.push(ConstantPoolEntry::Unused);
            i += 1;
        }
    }
    Ok(pool)
}

fn read_constant_entry(cursor: &mut Cursor<&[u8]>) -> Result<ConstantPoolEntry, ClassFileError> {
    let t = read_u8(cursor)?;
    Ok(match t {
        tag::UTF8 => {
            let len = read_u16(cursor)? as usize;
            let mut buf = vec![0u8; len];
            cursor.read_exact(&mut buf).map_err(|_| ClassFileError::Truncated)?;
            ConstantPoolEntry::Utf8(decode_modified_utf8(buf)?)
        }
        tag::INTEGER => ConstantPoolEntry::Integer(read_u32(cursor)? as i32),
        tag::FLOAT => ConstantPoolEntry::Float(f32::from_bits(read_u32(cursor)?)),
        tag::LONG => ConstantPoolEntry::Long(read_u64(cursor)? as i64),
        tag::DOUBLE => ConstantPoolEntry::Double(f64::from_bits(read_u64(cursor)?)),
        tag::CLASS => ConstantPoolEntry::Class {
            name_index: read_u16(cursor)?,
        },
        tag::STRING => ConstantPoolEntry::String {
            string_index: read_u16(cursor)?,
        },
        tag::FIELDREF => ConstantPoolEntry::Fieldref {
            class_index: read_u16(cursor)?,
            name_and_type_index: read_u16(cursor)?,
        },
        tag::METHODREF => ConstantPoolEntry::Methodref {
            class_index: read_u16(cursor)?,
            name_and_type_index: read_u16(cursor)?,
        },
        tag::INTERFACE_METHODREF => ConstantPoolEntry::InterfaceMethodref {
            class_index: read_u16(cursor)?,
            name_and_type_index: read_u16(cursor)?,
        },
        tag::NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
            name_index: read_u16(cursor)?,
            descriptor_index: read_u16(cursor)?,
        },
        tag::METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
            reference_kind: read_u8(cursor)?,
            reference_index: read_u16(cursor)?,
        },
        tag::METHOD_TYPE => ConstantPoolEntry::MethodType {
            descriptor_index: read_u16(cursor)?,
        },
        // InvokeDynamic / Module / Package are recognized so their fixed-size
        // payloads can be skipped, but the core never consumes them.
        tag::INVOKE_DYNAMIC => {
            read_u16(cursor)?;
            read_u16(cursor)?;
            ConstantPoolEntry::Unused
        }
        tag::MODULE | tag::PACKAGE => {
            read_u16(cursor)?;
            ConstantPoolEntry::Unused
        }
        other => return Err(ClassFileError::InvalidConstantPoolTag(other)),
    })
}

fn read_field_or_method(
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<FieldInfo, ClassFileError> {
    let access_flags = read_u16(cursor)?;
    let name_index = read_u16(cursor)?;
    let descriptor_index = read_u16(cursor)?;
    let attributes = read_attributes(cursor, pool)?;
    Ok(FieldInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn read_attributes(
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<Vec<AttributeInfo>, ClassFileError> {
    let count = read_u16(cursor)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = read_u16(cursor)?;
        let length = read_u32(cursor)? as usize;
        let mut data = vec![0u8; length];
        cursor.read_exact(&mut data).map_err(|_| ClassFileError::Truncated)?;

        let name = utf8_at(pool, name_index)?.to_string();
        let attribute = if name == "Code" {
            parse_code_attribute(&data)?
        } else {
            AttributeInfo::Other { name, data }
        };
        attributes.push(attribute);
    }
    Ok(attributes)
}

fn parse_code_attribute(data: &[u8]) -> Result<AttributeInfo, ClassFileError> {
    let mut cursor = Cursor::new(data);
    let max_stack = read_u16(&mut cursor)?;
    let max_locals = read_u16(&mut cursor)?;
    let code_length = read_u32(&mut cursor)? as usize;
    let mut code = vec![0u8; code_length];
    cursor
        .read_exact(&mut code)
        .map_err(|_| ClassFileError::Truncated)?;

    let exception_table_length = read_u16(&mut cursor)?;
    let mut exception_table = Vec::with_capacity(exception_table_length as usize);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionTableEntry {
            start_pc: read_u16(&mut cursor)?,
            end_pc: read_u16(&mut cursor)?,
            handler_pc: read_u16(&mut cursor)?,
            catch_type: read_u16(&mut cursor)?,
        });
    }

    // Attributes nested inside Code (LineNumberTable, StackMapTable, ...)
    // are skipped entirely: the core never inspects them and this reader
    // has no constant pool in scope here to resolve their name indices
    // against, so the remaining bytes (if any) are simply dropped.

    Ok(AttributeInfo::Code {
        max_stack,
        max_locals,
        code,
        exception_table,
    })
}

fn utf8_at(pool: &[ConstantPoolEntry], index: u16) -> Result<&str, ClassFileError> {
    pool.get(index as usize)
        .and_then(ConstantPoolEntry::as_utf8)
        .ok_or(ClassFileError::InvalidConstantPoolIndex(index))
}

/// Reinterprets the class file's modified UTF-8 as ordinary UTF-8.
///
/// The two encodings diverge only on the NUL byte and supplementary
/// characters (CESU-8 surrogate pairs vs. 4-byte UTF-8), neither of which
/// the core's identifier/descriptor handling needs to distinguish.
fn decode_modified_utf8(buf: Vec<u8>) -> Result<String, ClassFileError> {
    String::from_utf8(buf).map_err(ClassFileError::from)
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, ClassFileError> {
    cursor.read_u8().map_err(|_| ClassFileError::Truncated)
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, ClassFileError> {
    cursor.read_u16::<BigEndian>().map_err(|_| ClassFileError::Truncated)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, ClassFileError> {
    cursor.read_u32::<BigEndian>().map_err(|_| ClassFileError::Truncated)
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, ClassFileError> {
    cursor.read_u64::<BigEndian>().map_err(|_| ClassFileError::Truncated)
}
