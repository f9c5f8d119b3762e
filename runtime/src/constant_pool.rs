use jvmcore_classfile::{ClassFile, ConstantPoolEntry};
use lasso::ThreadedRodeo;

use crate::error::{JvmError, LinkageError};
use crate::keys::Symbol;

/// The constant pool as the engine wants to consume it: names and
/// descriptors interned once at load time, member references resolved one
/// layer deep (through their `NameAndType` entry) so the link pass never
/// has to walk the class-file pool's index chains itself.
#[derive(Debug, Clone)]
pub enum RuntimeConstant {
    Unused,
    Utf8(Symbol),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Symbol),
    String(Symbol),
    Fieldref { class: Symbol, name: Symbol, descriptor: Symbol },
    Methodref { class: Symbol, name: Symbol, descriptor: Symbol },
    InterfaceMethodref { class: Symbol, name: Symbol, descriptor: Symbol },
    NameAndType { name: Symbol, descriptor: Symbol },
    MethodHandle { reference_kind: u8, owner: Symbol, name: Symbol, descriptor: Symbol },
    MethodType(Symbol),
}

pub fn build_runtime_pool(
    class_file: &ClassFile,
    interner: &ThreadedRodeo,
) -> Result<Vec<RuntimeConstant>, JvmError> {
    let pool = &class_file.constant_pool;
    let mut out = Vec::with_capacity(pool.len());
    for entry in pool {
        out.push(match entry {
            ConstantPoolEntry::Unused => RuntimeConstant::Unused,
            ConstantPoolEntry::Utf8(s) => RuntimeConstant::Utf8(interner.get_or_intern(s)),
            ConstantPoolEntry::Integer(v) => RuntimeConstant::Integer(*v),
            ConstantPoolEntry::Float(v) => RuntimeConstant::Float(*v),
            ConstantPoolEntry::Long(v) => RuntimeConstant::Long(*v),
            ConstantPoolEntry::Double(v) => RuntimeConstant::Double(*v),
            ConstantPoolEntry::Class { name_index } => {
                RuntimeConstant::Class(utf8_symbol(class_file, interner, *name_index)?)
            }
            ConstantPoolEntry::String { string_index } => {
                RuntimeConstant::String(utf8_symbol(class_file, interner, *string_index)?)
            }
            ConstantPoolEntry::Fieldref { class_index, name_and_type_index } => {
                let class = class_name_symbol(class_file, interner, *class_index)?;
                let (name, descriptor) = name_and_type(class_file, interner, *name_and_type_index)?;
                RuntimeConstant::Fieldref { class, name, descriptor }
            }
            ConstantPoolEntry::Methodref { class_index, name_and_type_index } => {
                let class = class_name_symbol(class_file, interner, *class_index)?;
                let (name, descriptor) = name_and_type(class_file, interner, *name_and_type_index)?;
                RuntimeConstant::Methodref { class, name, descriptor }
            }
            ConstantPoolEntry::InterfaceMethodref { class_index, name_and_type_index } => {
                let class = class_name_symbol(class_file, interner, *class_index)?;
                let (name, descriptor) = name_and_type(class_file, interner, *name_and_type_index)?;
                RuntimeConstant::InterfaceMethodref { class, name, descriptor }
            }
            ConstantPoolEntry::NameAndType { name_index, descriptor_index } => {
                let name = utf8_symbol(class_file, interner, *name_index)?;
                let descriptor = utf8_symbol(class_file, interner, *descriptor_index)?;
                RuntimeConstant::NameAndType { name, descriptor }
            }
            ConstantPoolEntry::MethodHandle { reference_kind, reference_index } => {
                let (owner, name, descriptor) = match pool.get(*reference_index as usize) {
                    Some(ConstantPoolEntry::Fieldref { class_index, name_and_type_index })
                    | Some(ConstantPoolEntry::Methodref { class_index, name_and_type_index })
                    | Some(ConstantPoolEntry::InterfaceMethodref { class_index, name_and_type_index }) => {
                        let owner = class_name_symbol(class_file, interner, *class_index)?;
                        let (name, descriptor) = name_and_type(class_file, interner, *name_and_type_index)?;
                        (owner, name, descriptor)
                    }
                    _ => {
                        return Err(LinkageError::UnexpectedConstantKind {
                            index: *reference_index,
                            expected: "Fieldref/Methodref/InterfaceMethodref",
                        }
                        .into())
                    }
                };
                RuntimeConstant::MethodHandle { reference_kind: *reference_kind, owner, name, descriptor }
            }
            ConstantPoolEntry::MethodType { descriptor_index } => {
                RuntimeConstant::MethodType(utf8_symbol(class_file, interner, *descriptor_index)?)
            }
        });
    }
    Ok(out)
}

fn utf8_symbol(class_file: &ClassFile, interner: &ThreadedRodeo, index: u16) -> Result<Symbol, JvmError> {
    class_file
        .constant_utf8(index)
        .map(|s| interner.get_or_intern(s))
        .ok_or_else(|| LinkageError::ConstantPoolIndexOutOfRange(index).into())
}

fn class_name_symbol(class_file: &ClassFile, interner: &ThreadedRodeo, class_index: u16) -> Result<Symbol, JvmError> {
    match class_file.constant_pool.get(class_index as usize) {
        Some(ConstantPoolEntry::Class { name_index }) => utf8_symbol(class_file, interner, *name_index),
        _ => Err(LinkageError::UnexpectedConstantKind { index: class_index, expected: "Class" }.into()),
    }
}

fn name_and_type(
    class_file: &ClassFile,
    interner: &ThreadedRodeo,
    index: u16,
) -> Result<(Symbol, Symbol), JvmError> {
    match class_file.constant_pool.get(index as usize) {
        Some(ConstantPoolEntry::NameAndType { name_index, descriptor_index }) => Ok((
            utf8_symbol(class_file, interner, *name_index)?,
            utf8_symbol(class_file, interner, *descriptor_index)?,
        )),
        _ => Err(LinkageError::UnexpectedConstantKind { index, expected: "NameAndType" }.into()),
    }
}
