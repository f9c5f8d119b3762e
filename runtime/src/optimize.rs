use std::collections::HashMap;

use tracing::debug;

use crate::instruction::{decode_one, LinkContext};
use crate::keys::ClassId;
use crate::method::Method;
use crate::vm::Vm;
use crate::error::JvmResult;

/// Decodes and links a method's bytecode into its instruction vector,
/// installing the result via `Method::set_instructions`. A no-op if the
/// method is already optimized (checked by the caller via
/// `Method::is_optimized`, and again here since two threads can race to
/// optimize the same method the first time it runs).
///
/// Abstract and native methods have no bytecode to decode; they get an
/// empty instruction vector so `is_optimized` still reports `true` and
/// nothing re-attempts the pass on a later call.
#[hotpath::measure]
pub fn optimize(vm: &Vm, owner: ClassId, method: &Method) -> JvmResult<()> {
    if method.is_optimized() {
        return Ok(());
    }
    if method.is_abstract || method.is_native {
        method.set_instructions(Vec::new());
        return Ok(());
    }

    debug!("optimizing method {:?} ({} bytes of bytecode)", method.name, method.bytecode.len());

    let (mut instructions, byte_offsets, offset_map) = hotpath::measure_block!("optimize::decode", {
        let mut instructions = Vec::new();
        let mut byte_offsets = Vec::new();
        let mut offset_map = HashMap::new();
        let mut offset = 0usize;
        while offset < method.bytecode.len() {
            let instr = decode_one(&method.bytecode, offset)?;
            offset_map.insert(offset, instructions.len());
            byte_offsets.push(offset);
            offset += instr.byte_length as usize;
            instructions.push(instr);
        }
        (instructions, byte_offsets, offset_map)
    });

    hotpath::measure_block!("optimize::link", {
        let class = vm.class(owner);
        for (i, instr) in instructions.iter_mut().enumerate() {
            let ctx = LinkContext {
                byte_offset: byte_offsets[i],
                offset_map: &offset_map,
                class: &class,
                vm,
                return_type: method.descriptor.return_type.clone(),
            };
            instr.link(&ctx)?;
        }
    });

    method.set_instructions(instructions);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::config::VmConfig;
    use crate::descriptor::MethodDescriptor;
    use crate::error::{JvmError, LinkageError};
    use crate::instruction::InstructionKind;

    fn vm_with_owner_class() -> (Vm, ClassId) {
        let vm = Vm::new(VmConfig::default());
        let name = vm.interner.get_or_intern("Test");
        let class = Class {
            name,
            super_class: None,
            constant_pool: Vec::new(),
            methods: Default::default(),
            fields: Default::default(),
            static_descriptors: Vec::new(),
            static_values: std::sync::Mutex::new(Vec::new()),
            instance_descriptors: Vec::new(),
        };
        let owner = vm.register_builtin_class(name, class);
        (vm, owner)
    }

    fn void_method(vm: &Vm, owner: ClassId, bytecode: Vec<u8>) -> Method {
        let name = vm.interner.get_or_intern("run");
        let descriptor_symbol = vm.interner.get_or_intern("()V");
        Method::new(
            owner,
            name,
            MethodDescriptor { parameters: Vec::new(), return_type: None },
            descriptor_symbol,
            true,
            false,
            false,
            2,
            2,
            bytecode,
            Vec::new(),
        )
    }

    #[test]
    fn optimize_resolves_a_forward_goto_from_raw_bytecode() {
        let (vm, owner) = vm_with_owner_class();
        // nop; goto +3 (to the `return` 3 instructions ahead); return
        let bytecode = vec![0x00, 0xa7, 0x00, 0x03, 0xb1];
        let method = void_method(&vm, owner, bytecode);

        optimize(&vm, owner, &method).unwrap();
        let instructions = method.instructions().unwrap();
        assert_eq!(instructions.len(), 3);
        match &instructions[1].kind {
            InstructionKind::Goto { target, .. } => assert_eq!(*target, Some(2)),
            other => panic!("expected Goto, got {other:?}"),
        }
        assert!(matches!(instructions[2].kind, InstructionKind::Return));
    }

    #[test]
    fn optimize_is_idempotent_on_a_second_call() {
        let (vm, owner) = vm_with_owner_class();
        let method = void_method(&vm, owner, vec![0xb1]);

        optimize(&vm, owner, &method).unwrap();
        let first_len = method.instructions().unwrap().len();
        optimize(&vm, owner, &method).unwrap();
        assert_eq!(method.instructions().unwrap().len(), first_len);
    }

    #[test]
    fn optimize_rejects_a_branch_target_outside_the_method_body() {
        let (vm, owner) = vm_with_owner_class();
        // goto +100, nowhere near the end of a 3-byte method
        let bytecode = vec![0xa7, 0x00, 0x64];
        let method = void_method(&vm, owner, bytecode);

        let err = optimize(&vm, owner, &method).unwrap_err();
        assert!(matches!(err, JvmError::Linkage(LinkageError::BadBranchTarget(100))));
    }

    #[test]
    fn abstract_methods_optimize_to_an_empty_instruction_vector() {
        let (vm, owner) = vm_with_owner_class();
        let name = vm.interner.get_or_intern("run");
        let descriptor_symbol = vm.interner.get_or_intern("()V");
        let method = Method::new(
            owner,
            name,
            MethodDescriptor { parameters: Vec::new(), return_type: None },
            descriptor_symbol,
            false,
            true,
            false,
            0,
            0,
            Vec::new(),
            Vec::new(),
        );
        optimize(&vm, owner, &method).unwrap();
        assert_eq!(method.instructions().unwrap().len(), 0);
    }
}
