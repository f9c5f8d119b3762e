use std::collections::HashMap;
use std::sync::Mutex;

use jvmcore_classfile::ClassFile;
use tracing::debug;

use crate::class::{Class, FieldSlot};
use crate::constant_pool::{build_runtime_pool, RuntimeConstant};
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
use crate::error::{JvmError, JvmResult, LinkageError};
use crate::keys::{ClassId, MethodKey};
use crate::method::Method;
use crate::value::Value;
use crate::vm::Vm;

/// Loads a parsed class file into `vm`, assigning distinct static and
/// instance field slot indices, zero-initializing static storage, and
/// turning every method entry into a `Method` whose instruction vector is
/// left empty until first use. Returns the new class's id.
#[hotpath::measure]
pub fn load_class(vm: &Vm, class_file: &ClassFile) -> JvmResult<ClassId> {
    let interner = &vm.interner;
    let constant_pool = build_runtime_pool(class_file, interner)?;

    let this_name = resolve_class_name(&constant_pool, class_file.this_class)?;
    let super_name = if class_file.super_class == 0 {
        None
    } else {
        Some(resolve_class_name(&constant_pool, class_file.super_class)?)
    };
    debug!("loading class {:?}, super {:?}", this_name, super_name);

    let mut fields = HashMap::new();
    let mut static_descriptors = Vec::new();
    let mut static_values = Vec::new();
    let mut instance_descriptors = Vec::new();

    for field in &class_file.fields {
        let name = interner.get_or_intern(
            class_file
                .constant_utf8(field.name_index)
                .ok_or(LinkageError::ConstantPoolIndexOutOfRange(field.name_index))?,
        );
        let descriptor_str = class_file
            .constant_utf8(field.descriptor_index)
            .ok_or(LinkageError::ConstantPoolIndexOutOfRange(field.descriptor_index))?;
        let descriptor = parse_field_descriptor(descriptor_str)?;
        let is_static = field.field_flags().is_static();

        let slot_index = if is_static {
            let idx = static_descriptors.len();
            static_values.push(Value::zero_for_descriptor(&descriptor));
            static_descriptors.push(descriptor.clone());
            idx
        } else {
            let idx = instance_descriptors.len();
            instance_descriptors.push(descriptor.clone());
            idx
        };

        fields.insert(name, FieldSlot { descriptor, is_static, slot_index });
    }

    let class_id = vm.reserve_class_id();
    let mut methods = HashMap::new();

    for method_info in &class_file.methods {
        let name = interner.get_or_intern(
            class_file
                .constant_utf8(method_info.name_index)
                .ok_or(LinkageError::ConstantPoolIndexOutOfRange(method_info.name_index))?,
        );
        let descriptor_str = class_file
            .constant_utf8(method_info.descriptor_index)
            .ok_or(LinkageError::ConstantPoolIndexOutOfRange(method_info.descriptor_index))?;
        let descriptor = parse_method_descriptor(descriptor_str)?;
        let descriptor_symbol = interner.get_or_intern(descriptor_str);

        let flags = method_info.method_flags();
        let (max_stack, max_locals, bytecode, exception_table) = match method_info.code() {
            Some((max_stack, max_locals, code, table)) => (max_stack, max_locals, code.to_vec(), table.to_vec()),
            None => (0, 0, Vec::new(), Vec::new()),
        };

        let method = Method::new(
            class_id,
            name,
            descriptor,
            descriptor_symbol,
            flags.is_static(),
            flags.is_abstract(),
            flags.is_native(),
            max_stack,
            max_locals,
            bytecode,
            exception_table,
        );
        let method_id = vm.register_method(method);
        methods.insert(MethodKey { name, descriptor: descriptor_symbol }, method_id);
    }

    let class = Class {
        name: this_name,
        super_class: super_name,
        constant_pool,
        methods,
        fields,
        static_descriptors,
        static_values: Mutex::new(static_values),
        instance_descriptors,
    };

    let registered_id = vm.register_class(this_name, class);
    debug_assert_eq!(registered_id, class_id);
    Ok(class_id)
}

fn resolve_class_name(pool: &[RuntimeConstant], class_index: u16) -> JvmResult<crate::keys::Symbol> {
    match pool.get(class_index as usize) {
        Some(RuntimeConstant::Class(name)) => Ok(*name),
        _ => Err(JvmError::Linkage(LinkageError::UnexpectedConstantKind {
            index: class_index,
            expected: "Class",
        })),
    }
}
