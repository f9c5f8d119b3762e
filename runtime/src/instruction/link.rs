use std::collections::HashMap;

use super::{
    Instruction, InstructionKind, ResolvedConstant, ResolvedInstanceField, ResolvedStaticField,
};
use crate::class::Class;
use crate::constant_pool::RuntimeConstant;
use crate::descriptor::{JavaType, PrimitiveType};
use crate::error::{JvmError, JvmResult, LinkageError};
use crate::keys::MethodKey;
use crate::value::MethodHandleKind;
use crate::vm::Vm;

/// Everything a single instruction's link step needs: where it sits in the
/// method, the offset→instruction-index map built during decode, the
/// owning class (for constant-pool lookups), the VM (for cross-class
/// resolution of `new`/invoke targets), and the method's own declared
/// return type (to validate return opcodes against).
pub struct LinkContext<'a> {
    pub byte_offset: usize,
    pub offset_map: &'a HashMap<usize, usize>,
    pub class: &'a Class,
    pub vm: &'a Vm,
    pub return_type: Option<JavaType>,
}

impl<'a> LinkContext<'a> {
    fn resolve_branch(&self, raw_offset: i16) -> JvmResult<usize> {
        self.resolve_absolute(self.byte_offset as i64 + raw_offset as i64)
    }

    fn resolve_absolute(&self, target_byte_offset: i64) -> JvmResult<usize> {
        if target_byte_offset < 0 {
            return Err(LinkageError::BadBranchTarget(target_byte_offset as i32).into());
        }
        self.offset_map
            .get(&(target_byte_offset as usize))
            .copied()
            .ok_or_else(|| LinkageError::BadBranchTarget(target_byte_offset as i32).into())
    }

    fn constant(&self, index: u16) -> JvmResult<&RuntimeConstant> {
        self.class
            .constant_pool
            .get(index as usize)
            .ok_or_else(|| LinkageError::ConstantPoolIndexOutOfRange(index).into())
    }

    fn class_id_for_name(&self, name: crate::keys::Symbol) -> JvmResult<crate::keys::ClassId> {
        self.vm
            .lookup_class_by_symbol(name)
            .ok_or_else(|| JvmError::ClassNotFound(self.vm.interner.resolve(&name).to_string()))
    }

    fn resolve_field(&self, index: u16) -> JvmResult<(crate::keys::ClassId, String, JavaType)> {
        let (class_sym, name_sym, descriptor_sym) = match self.constant(index)? {
            RuntimeConstant::Fieldref { class, name, descriptor } => (*class, *name, *descriptor),
            _ => return Err(LinkageError::UnexpectedConstantKind { index, expected: "Fieldref" }.into()),
        };
        let class_id = self.class_id_for_name(class_sym)?;
        let field_name = self.vm.interner.resolve(&name_sym).to_string();
        let descriptor_str = self.vm.interner.resolve(&descriptor_sym);
        let descriptor = crate::descriptor::parse_field_descriptor(descriptor_str)?;
        Ok((class_id, field_name, descriptor))
    }

    fn resolve_method(&self, index: u16) -> JvmResult<(crate::keys::ClassId, MethodKey)> {
        let (class_sym, name_sym, descriptor_sym) = match self.constant(index)? {
            RuntimeConstant::Methodref { class, name, descriptor } => (*class, *name, *descriptor),
            RuntimeConstant::InterfaceMethodref { class, name, descriptor } => (*class, *name, *descriptor),
            _ => return Err(LinkageError::UnexpectedConstantKind { index, expected: "Methodref" }.into()),
        };
        let class_id = self.class_id_for_name(class_sym)?;
        Ok((class_id, MethodKey { name: name_sym, descriptor: descriptor_sym }))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReturnKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
}

/// Whether `kind` (the opcode family: `ireturn`, `lreturn`, ...) is
/// compatible with a method's declared return type. `ireturn` covers every
/// stack-widened integral kind (byte/char/short/int/boolean), matching the
/// widening the same opcode performs on load.
fn return_kind_matches(return_type: &Option<JavaType>, kind: ReturnKind) -> bool {
    match (kind, return_type) {
        (ReturnKind::Void, None) => true,
        (ReturnKind::Void, Some(_)) | (_, None) => false,
        (ReturnKind::Int, Some(JavaType::Primitive(p))) => matches!(
            p,
            PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
                | PrimitiveType::Boolean
        ),
        (ReturnKind::Long, Some(JavaType::Primitive(PrimitiveType::Long))) => true,
        (ReturnKind::Float, Some(JavaType::Primitive(PrimitiveType::Float))) => true,
        (ReturnKind::Double, Some(JavaType::Primitive(PrimitiveType::Double))) => true,
        (ReturnKind::Reference, Some(JavaType::Reference(_))) => true,
        (ReturnKind::Reference, Some(JavaType::Array(_))) => true,
        _ => false,
    }
}

impl Instruction {
    fn return_kind(&self) -> Option<ReturnKind> {
        match self.kind {
            InstructionKind::Ireturn => Some(ReturnKind::Int),
            InstructionKind::Lreturn => Some(ReturnKind::Long),
            InstructionKind::Freturn => Some(ReturnKind::Float),
            InstructionKind::Dreturn => Some(ReturnKind::Double),
            InstructionKind::Areturn => Some(ReturnKind::Reference),
            InstructionKind::Return => Some(ReturnKind::Void),
            _ => None,
        }
    }

    pub fn link(&mut self, ctx: &LinkContext) -> JvmResult<()> {
        if let Some(kind) = self.return_kind() {
            if !return_kind_matches(&ctx.return_type, kind) {
                return Err(LinkageError::BadDescriptor(
                    "return opcode incompatible with the method's declared return type".into(),
                )
                .into());
            }
            return Ok(());
        }

        match &mut self.kind {
            InstructionKind::IfCond { raw_offset, target, .. }
            | InstructionKind::IfICmp { raw_offset, target, .. }
            | InstructionKind::IfACmp { raw_offset, target, .. }
            | InstructionKind::Ifnull { raw_offset, target }
            | InstructionKind::Ifnonnull { raw_offset, target }
            | InstructionKind::Goto { raw_offset, target } => {
                *target = Some(ctx.resolve_branch(*raw_offset)?);
            }
            InstructionKind::Jsr { raw_offset, target, return_index } => {
                *target = Some(ctx.resolve_branch(*raw_offset)?);
                *return_index = Some(ctx.resolve_absolute((ctx.byte_offset + self.byte_length as usize) as i64)?);
            }
            InstructionKind::Tableswitch { default_raw, offsets_raw, default_target, targets, .. } => {
                *default_target = Some(ctx.resolve_absolute(ctx.byte_offset as i64 + *default_raw as i64)?);
                let mut resolved = Vec::with_capacity(offsets_raw.len());
                for raw in offsets_raw.iter() {
                    resolved.push(ctx.resolve_absolute(ctx.byte_offset as i64 + *raw as i64)?);
                }
                *targets = Some(resolved);
            }
            InstructionKind::Lookupswitch { default_raw, pairs_raw, default_target, targets, .. } => {
                *default_target = Some(ctx.resolve_absolute(ctx.byte_offset as i64 + *default_raw as i64)?);
                let mut resolved = Vec::with_capacity(pairs_raw.len());
                for (matc, raw) in pairs_raw.iter() {
                    resolved.push((*matc, ctx.resolve_absolute(ctx.byte_offset as i64 + *raw as i64)?));
                }
                *targets = Some(resolved);
            }

            InstructionKind::Ldc { index, resolved } => {
                *resolved = Some(link_ldc(ctx, *index)?);
            }
            InstructionKind::Ldc2W { index, resolved } => {
                let value = link_ldc(ctx, *index)?;
                match value {
                    ResolvedConstant::Long(_) | ResolvedConstant::Double(_) => *resolved = Some(value),
                    _ => {
                        return Err(LinkageError::UnexpectedConstantKind { index: *index, expected: "Long/Double" }.into())
                    }
                }
            }

            InstructionKind::Getstatic { index, resolved } | InstructionKind::Putstatic { index, resolved } => {
                let (class_id, field_name, descriptor) = ctx.resolve_field(*index)?;
                let class = ctx.vm.class(class_id);
                let name_sym = ctx.vm.interner.get_or_intern(&field_name);
                let slot = class.lookup_static_field(name_sym).ok_or_else(|| JvmError::NoSuchField {
                    class: ctx.vm.interner.resolve(&class.name).to_string(),
                    name: field_name.clone(),
                })?;
                *resolved = Some((
                    ResolvedStaticField { class: class_id, slot_index: slot.slot_index },
                    descriptor,
                ));
            }
            InstructionKind::Getfield { index, resolved } | InstructionKind::Putfield { index, resolved } => {
                let (class_id, field_name, _descriptor) = ctx.resolve_field(*index)?;
                let class = ctx.vm.class(class_id);
                let name_sym = ctx.vm.interner.get_or_intern(&field_name);
                let slot = class.lookup_instance_field(name_sym).ok_or_else(|| JvmError::NoSuchField {
                    class: ctx.vm.interner.resolve(&class.name).to_string(),
                    name: field_name.clone(),
                })?;
                *resolved = Some(ResolvedInstanceField {
                    class: class_id,
                    slot_index: slot.slot_index,
                    descriptor: slot.descriptor.clone(),
                });
            }

            InstructionKind::New { index, resolved } => {
                let class_sym = match ctx.constant(*index)? {
                    RuntimeConstant::Class(name) => *name,
                    _ => return Err(LinkageError::UnexpectedConstantKind { index: *index, expected: "Class" }.into()),
                };
                *resolved = Some(ctx.class_id_for_name(class_sym)?);
            }

            InstructionKind::Invokespecial { index, resolved } => {
                let (class_id, key) = ctx.resolve_method(*index)?;
                let method_id = ctx.vm.lookup_method(class_id, &key).ok_or_else(|| method_not_found(ctx, class_id, &key))?;
                if ctx.vm.method(method_id).is_static {
                    return Err(LinkageError::BadDescriptor("invokespecial target is static".into()).into());
                }
                *resolved = Some(method_id);
            }
            InstructionKind::Invokestatic { index, resolved } => {
                let (class_id, key) = ctx.resolve_method(*index)?;
                let method_id = ctx.vm.lookup_method(class_id, &key).ok_or_else(|| method_not_found(ctx, class_id, &key))?;
                if !ctx.vm.method(method_id).is_static {
                    return Err(LinkageError::BadDescriptor("invokestatic target is not static".into()).into());
                }
                *resolved = Some(method_id);
            }
            InstructionKind::Invokevirtual { index, resolved } => {
                let (class_id, key) = ctx.resolve_method(*index)?;
                let method_id = ctx.vm.lookup_method(class_id, &key).ok_or_else(|| method_not_found(ctx, class_id, &key))?;
                if ctx.vm.method(method_id).is_static {
                    return Err(LinkageError::BadDescriptor("invokevirtual target is static".into()).into());
                }
                *resolved = Some(method_id);
            }

            _ => {}
        }
        Ok(())
    }
}

fn method_not_found(ctx: &LinkContext, class_id: crate::keys::ClassId, key: &MethodKey) -> JvmError {
    let class = ctx.vm.class(class_id);
    JvmError::NoSuchMethod {
        class: ctx.vm.interner.resolve(&class.name).to_string(),
        name: ctx.vm.interner.resolve(&key.name).to_string(),
        descriptor: ctx.vm.interner.resolve(&key.descriptor).to_string(),
    }
}

fn link_ldc(ctx: &LinkContext, index: u16) -> JvmResult<ResolvedConstant> {
    match ctx.constant(index)?.clone() {
        RuntimeConstant::Integer(v) => Ok(ResolvedConstant::Int(v)),
        RuntimeConstant::Float(v) => Ok(ResolvedConstant::Float(v)),
        RuntimeConstant::Long(v) => Ok(ResolvedConstant::Long(v)),
        RuntimeConstant::Double(v) => Ok(ResolvedConstant::Double(v)),
        RuntimeConstant::String(sym) => Ok(ResolvedConstant::Str(ctx.vm.interner.resolve(&sym).into())),
        RuntimeConstant::Class(name) => Ok(ResolvedConstant::Class(ctx.class_id_for_name(name)?)),
        RuntimeConstant::MethodType(sym) => Ok(ResolvedConstant::MethodType(ctx.vm.interner.resolve(&sym).into())),
        RuntimeConstant::MethodHandle { reference_kind, owner, name, descriptor } => {
            let kind = MethodHandleKind::from_u8(reference_kind)
                .ok_or(LinkageError::UnresolvedMethodHandleKind(reference_kind))?;
            let name_str = ctx.vm.interner.resolve(&name);
            let is_init = name_str == "<init>";
            let is_cinit = name_str == "<clinit>";
            let valid = match kind {
                MethodHandleKind::InvokeVirtual
                | MethodHandleKind::InvokeStatic
                | MethodHandleKind::InvokeSpecial
                | MethodHandleKind::InvokeInterface => !is_init && !is_cinit,
                MethodHandleKind::NewInvokeSpecial => is_init,
                _ => !is_init && !is_cinit,
            };
            if !valid {
                return Err(LinkageError::UnresolvedMethodHandleName(name_str.to_string()).into());
            }
            Ok(ResolvedConstant::MethodHandle {
                kind,
                owner: ctx.vm.interner.resolve(&owner).into(),
                name: name_str.into(),
                descriptor: ctx.vm.interner.resolve(&descriptor).into(),
            })
        }
        _ => Err(LinkageError::UnexpectedConstantKind { index, expected: "loadable constant" }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn empty_class(vm: &Vm) -> Class {
        Class {
            name: vm.interner.get_or_intern("Test"),
            super_class: None,
            constant_pool: Vec::new(),
            methods: Default::default(),
            fields: Default::default(),
            static_descriptors: Vec::new(),
            static_values: std::sync::Mutex::new(Vec::new()),
            instance_descriptors: Vec::new(),
        }
    }

    fn ctx<'a>(offset_map: &'a HashMap<usize, usize>, class: &'a Class, vm: &'a Vm, byte_offset: usize) -> LinkContext<'a> {
        LinkContext { byte_offset, offset_map, class, vm, return_type: None }
    }

    #[test]
    fn resolve_branch_maps_a_raw_offset_to_its_instruction_index() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let mut offset_map = HashMap::new();
        offset_map.insert(0usize, 0usize);
        offset_map.insert(3usize, 1usize);
        let link_ctx = ctx(&offset_map, &class, &vm, 0);
        assert_eq!(link_ctx.resolve_branch(3).unwrap(), 1);
    }

    #[test]
    fn resolve_branch_rejects_a_target_not_on_an_instruction_boundary() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let mut offset_map = HashMap::new();
        offset_map.insert(0usize, 0usize);
        let link_ctx = ctx(&offset_map, &class, &vm, 0);
        let err = link_ctx.resolve_branch(7).unwrap_err();
        assert!(matches!(err, JvmError::Linkage(LinkageError::BadBranchTarget(7))));
    }

    #[test]
    fn resolve_absolute_rejects_a_negative_target() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let offset_map = HashMap::new();
        let link_ctx = ctx(&offset_map, &class, &vm, 0);
        let err = link_ctx.resolve_absolute(-1).unwrap_err();
        assert!(matches!(err, JvmError::Linkage(LinkageError::BadBranchTarget(-1))));
    }

    #[test]
    fn goto_links_its_raw_offset_into_an_instruction_index() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let mut offset_map = HashMap::new();
        offset_map.insert(0usize, 0usize);
        offset_map.insert(5usize, 1usize);
        let link_ctx = ctx(&offset_map, &class, &vm, 0);
        let mut instr = Instruction { kind: InstructionKind::Goto { raw_offset: 5, target: None }, byte_length: 3 };
        instr.link(&link_ctx).unwrap();
        match instr.kind {
            InstructionKind::Goto { target, .. } => assert_eq!(target, Some(1)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn goto_with_an_out_of_bounds_target_is_a_linkage_error_not_a_panic() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let offset_map = HashMap::new();
        let link_ctx = ctx(&offset_map, &class, &vm, 0);
        let mut instr = Instruction { kind: InstructionKind::Goto { raw_offset: 100, target: None }, byte_length: 3 };
        let err = instr.link(&link_ctx).unwrap_err();
        assert!(matches!(err, JvmError::Linkage(LinkageError::BadBranchTarget(100))));
    }

    #[test]
    fn return_opcode_incompatible_with_declared_return_type_is_rejected() {
        let vm = Vm::new(VmConfig::default());
        let class = empty_class(&vm);
        let offset_map = HashMap::new();
        let mut link_ctx = ctx(&offset_map, &class, &vm, 0);
        link_ctx.return_type = Some(JavaType::Primitive(PrimitiveType::Int));
        let mut instr = Instruction { kind: InstructionKind::Return, byte_length: 1 };
        let err = instr.link(&link_ctx).unwrap_err();
        assert!(matches!(err, JvmError::Linkage(LinkageError::BadDescriptor(_))));
    }
}
