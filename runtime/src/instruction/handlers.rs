use std::sync::Arc;

use super::{CompareOp, Instruction, InstructionKind, ResolvedConstant};
use crate::descriptor::{JavaType, PrimitiveType};
use crate::error::{ExitReason, JvmError, JvmResult, LinkageError};
use crate::thread::{ReturnFrame, Thread};
use crate::value::{ArrayRef, ClassInstance, Value};
use crate::vm::Vm;

/// The fetch-execute loop's entry point: run one instruction against
/// `thread`, consulting `vm` for cross-class state (classes, other
/// methods). Branching opcodes and method calls/returns set
/// `thread.branch_taken`/`thread.pc`/`thread.method` directly rather than
/// relying on the driver's default pc-increment.
pub fn execute(instr: &Instruction, thread: &mut Thread, vm: &Vm) -> JvmResult<()> {
    match &instr.kind {
        InstructionKind::Nop => {}
        InstructionKind::AconstNull => thread.push_ref(Value::Null("java/lang/Object"))?,
        InstructionKind::IconstValue(v) => thread.push_i32(*v)?,
        InstructionKind::LconstValue(v) => thread.push_i64(*v)?,
        InstructionKind::FconstValue(v) => thread.push_f32(*v)?,
        InstructionKind::DconstValue(v) => thread.push_f64(*v)?,
        InstructionKind::Bipush(v) | InstructionKind::Sipush(v) => thread.push_i32(*v)?,

        InstructionKind::Ldc { resolved, .. } | InstructionKind::Ldc2W { resolved, .. } => {
            push_constant(thread, required(resolved)?.clone())?;
        }

        InstructionKind::Iload(i) => thread.push_i32(expect_int(thread.local(*i)?)?)?,
        InstructionKind::Fload(i) => thread.push_f32(expect_float(thread.local(*i)?)?)?,
        InstructionKind::Lload(i) => thread.push_i64(expect_long(thread.local(*i)?)?)?,
        InstructionKind::Dload(i) => thread.push_f64(expect_double(thread.local(*i)?)?)?,
        InstructionKind::Aload(i) => thread.push_ref(expect_reference(thread.local(*i)?)?)?,

        InstructionKind::Istore(i) => {
            let v = thread.pop_i32()?;
            thread.set_local(*i, Value::Int(v))?;
        }
        InstructionKind::Fstore(i) => {
            let v = thread.pop_f32()?;
            thread.set_local(*i, Value::Float(v))?;
        }
        InstructionKind::Lstore(i) => {
            let v = thread.pop_i64()?;
            thread.set_local(*i, Value::Long(v))?;
        }
        InstructionKind::Dstore(i) => {
            let v = thread.pop_f64()?;
            thread.set_local(*i, Value::Double(v))?;
        }
        InstructionKind::Astore(i) => {
            let v = thread.pop_ref()?;
            thread.set_local(*i, v)?;
        }

        InstructionKind::Iaload => array_load_int(thread)?,
        InstructionKind::Laload => array_load_long(thread)?,
        InstructionKind::Faload => array_load_float(thread)?,
        InstructionKind::Daload => array_load_double(thread)?,
        InstructionKind::Aaload => array_load_ref(thread)?,
        InstructionKind::Baload => array_load_byte(thread)?,
        InstructionKind::Caload => array_load_char(thread)?,
        InstructionKind::Saload => array_load_short(thread)?,

        InstructionKind::Iastore => array_store_int(thread)?,
        InstructionKind::Lastore => array_store_long(thread)?,
        InstructionKind::Fastore => array_store_float(thread)?,
        InstructionKind::Dastore => array_store_double(thread)?,
        InstructionKind::Aastore => array_store_ref(thread)?,
        InstructionKind::Bastore => array_store_byte(thread)?,
        InstructionKind::Castore => array_store_char(thread)?,
        InstructionKind::Sastore => array_store_short(thread)?,

        InstructionKind::Pop => {
            thread.pop_raw_slots(1)?;
        }
        InstructionKind::Pop2 => {
            thread.pop_raw_slots(2)?;
        }
        InstructionKind::Dup => {
            let v = thread.raw_data_slot(0)?;
            thread.push_i32(v)?;
        }
        InstructionKind::DupX1 => {
            let s = thread.pop_raw_slots(2)?;
            thread.push_raw_slots(&[s[1], s[0], s[1]])?;
        }
        InstructionKind::DupX2 => {
            let s = thread.pop_raw_slots(3)?;
            thread.push_raw_slots(&[s[2], s[0], s[1], s[2]])?;
        }
        InstructionKind::Dup2 => {
            let v1 = thread.raw_data_slot(0)?;
            let v2 = thread.raw_data_slot(1)?;
            thread.push_i32(v2)?;
            thread.push_i32(v1)?;
        }
        InstructionKind::Dup2X1 => {
            let s = thread.pop_raw_slots(3)?;
            thread.push_raw_slots(&[s[1], s[2], s[0], s[1], s[2]])?;
        }
        InstructionKind::Dup2X2 => {
            let s = thread.pop_raw_slots(4)?;
            thread.push_raw_slots(&[s[2], s[3], s[0], s[1], s[2], s[3]])?;
        }
        InstructionKind::Swap => {
            let s = thread.pop_raw_slots(2)?;
            thread.push_raw_slots(&[s[1], s[0]])?;
        }

        InstructionKind::Iadd => binop_i32(thread, i32::wrapping_add)?,
        InstructionKind::Isub => binop_i32(thread, |a, b| a.wrapping_sub(b))?,
        InstructionKind::Imul => binop_i32(thread, i32::wrapping_mul)?,
        InstructionKind::Idiv => div_i32(thread)?,
        InstructionKind::Irem => rem_i32(thread)?,
        InstructionKind::Ineg => {
            let v = thread.pop_i32()?;
            thread.push_i32(v.wrapping_neg())?;
        }

        InstructionKind::Ladd => binop_i64(thread, i64::wrapping_add)?,
        InstructionKind::Lsub => binop_i64(thread, |a, b| a.wrapping_sub(b))?,
        InstructionKind::Lmul => binop_i64(thread, i64::wrapping_mul)?,
        InstructionKind::Ldiv => div_i64(thread)?,
        InstructionKind::Lrem => rem_i64(thread)?,
        InstructionKind::Lneg => {
            let v = thread.pop_i64()?;
            thread.push_i64(v.wrapping_neg())?;
        }

        InstructionKind::Fadd => binop_f32(thread, |a, b| a + b)?,
        InstructionKind::Fsub => binop_f32(thread, |a, b| a - b)?,
        InstructionKind::Fmul => binop_f32(thread, |a, b| a * b)?,
        InstructionKind::Fdiv => binop_f32(thread, |a, b| a / b)?,
        InstructionKind::Frem => frem(thread)?,
        InstructionKind::Fneg => {
            let v = thread.pop_f32()?;
            thread.push_f32(-v)?;
        }

        InstructionKind::Dadd => binop_f64(thread, |a, b| a + b)?,
        InstructionKind::Dsub => binop_f64(thread, |a, b| a - b)?,
        InstructionKind::Dmul => binop_f64(thread, |a, b| a * b)?,
        InstructionKind::Ddiv => binop_f64(thread, |a, b| a / b)?,
        InstructionKind::Drem => drem(thread)?,
        InstructionKind::Dneg => {
            let v = thread.pop_f64()?;
            thread.push_f64(-v)?;
        }

        InstructionKind::Ishl => shift_i32(thread, 0x1f, |a, n| a.wrapping_shl(n))?,
        InstructionKind::Ishr => shift_i32(thread, 0x1f, |a, n| a.wrapping_shr(n))?,
        InstructionKind::Iushr => shift_i32(thread, 0x1f, |a, n| (a as u32).wrapping_shr(n) as i32)?,
        InstructionKind::Lshl => shift_i64(thread, 0x3f, |a, n| a.wrapping_shl(n))?,
        InstructionKind::Lshr => shift_i64(thread, 0x3f, |a, n| a.wrapping_shr(n))?,
        InstructionKind::Lushr => shift_i64(thread, 0x3f, |a, n| (a as u64).wrapping_shr(n) as i64)?,
        InstructionKind::Iand => binop_i32(thread, |a, b| a & b)?,
        InstructionKind::Ior => binop_i32(thread, |a, b| a | b)?,
        InstructionKind::Ixor => binop_i32(thread, |a, b| a ^ b)?,
        InstructionKind::Land => binop_i64(thread, |a, b| a & b)?,
        InstructionKind::Lor => binop_i64(thread, |a, b| a | b)?,
        InstructionKind::Lxor => binop_i64(thread, |a, b| a ^ b)?,

        InstructionKind::Iinc { index, value } => {
            let current = expect_int(thread.local(*index)?)?;
            thread.set_local(*index, Value::Int(current.wrapping_add(*value)))?;
        }

        InstructionKind::I2l => {
            let v = thread.pop_i32()?;
            thread.push_i64(v as i64)?;
        }
        InstructionKind::I2f => {
            let v = thread.pop_i32()?;
            thread.push_f32(v as f32)?;
        }
        InstructionKind::I2d => {
            let v = thread.pop_i32()?;
            thread.push_f64(v as f64)?;
        }
        InstructionKind::L2i => {
            let v = thread.pop_i64()?;
            thread.push_i32(v as i32)?;
        }
        InstructionKind::L2f => {
            let v = thread.pop_i64()?;
            thread.push_f32(v as f32)?;
        }
        InstructionKind::L2d => {
            let v = thread.pop_i64()?;
            thread.push_f64(v as f64)?;
        }
        InstructionKind::F2i => {
            let v = thread.pop_f32()?;
            thread.push_i32(v as i32)?;
        }
        InstructionKind::F2l => {
            let v = thread.pop_f32()?;
            thread.push_i64(v as i64)?;
        }
        InstructionKind::F2d => {
            let v = thread.pop_f32()?;
            thread.push_f64(v as f64)?;
        }
        InstructionKind::D2i => {
            let v = thread.pop_f64()?;
            thread.push_i32(v as i32)?;
        }
        InstructionKind::D2l => {
            let v = thread.pop_f64()?;
            thread.push_i64(v as i64)?;
        }
        InstructionKind::D2f => {
            let v = thread.pop_f64()?;
            thread.push_f32(v as f32)?;
        }
        InstructionKind::I2b => {
            let v = thread.pop_i32()?;
            thread.push_i32((v as i8) as i32)?;
        }
        InstructionKind::I2c => {
            let v = thread.pop_i32()?;
            thread.push_i32((v as u16) as i32)?;
        }
        InstructionKind::I2s => {
            let v = thread.pop_i32()?;
            thread.push_i32((v as i16) as i32)?;
        }

        InstructionKind::Lcmp => {
            let b = thread.pop_i64()?;
            let a = thread.pop_i64()?;
            thread.push_i32(signum(a.cmp(&b)))?;
        }
        InstructionKind::Fcmpl => float_cmp(thread, -1, f32::partial_cmp, thread_pop_f32_pair)?,
        InstructionKind::Fcmpg => float_cmp(thread, 1, f32::partial_cmp, thread_pop_f32_pair)?,
        InstructionKind::Dcmpl => double_cmp(thread, -1)?,
        InstructionKind::Dcmpg => double_cmp(thread, 1)?,

        InstructionKind::IfCond { op, target, .. } => {
            let v = thread.pop_i32()?;
            branch_if(thread, compare_to_zero(*op, v), required_usize(target)?)?;
        }
        InstructionKind::IfICmp { op, target, .. } => {
            let b = thread.pop_i32()?;
            let a = thread.pop_i32()?;
            branch_if(thread, compare_ints(*op, a, b), required_usize(target)?)?;
        }
        InstructionKind::IfACmp { eq, target, .. } => {
            let b = thread.pop_ref()?;
            let a = thread.pop_ref()?;
            let same = refs_equal(&a, &b);
            branch_if(thread, same == *eq, required_usize(target)?)?;
        }
        InstructionKind::Goto { target, .. } => {
            thread.pc = required_usize(target)?;
            thread.branch_taken = true;
        }
        InstructionKind::Jsr { target, return_index, .. } => {
            let return_to = required_usize(return_index)?;
            thread.push_ref(Value::ReturnAddress(return_to))?;
            thread.pc = required_usize(target)?;
            thread.branch_taken = true;
        }
        InstructionKind::Ret { index } => match thread.local(*index)? {
            Value::ReturnAddress(target) => {
                thread.pc = *target;
                thread.branch_taken = true;
            }
            other => {
                return Err(JvmError::TypeMismatch { expected: "returnAddress", found: other.type_name().into() })
            }
        },

        InstructionKind::Tableswitch { low, default_target, targets, .. } => {
            let index = thread.pop_i32()?;
            let targets = required(targets)?;
            let default = required_usize(default_target)?;
            let target = if index >= *low && (index - *low) < targets.len() as i32 {
                targets[(index - *low) as usize]
            } else {
                default
            };
            thread.pc = target;
            thread.branch_taken = true;
        }
        InstructionKind::Lookupswitch { default_target, targets, .. } => {
            let key = thread.pop_i32()?;
            let targets = required(targets)?;
            let target = targets
                .binary_search_by_key(&key, |(m, _)| *m)
                .map(|i| targets[i].1)
                .unwrap_or(required_usize(default_target)?);
            thread.pc = target;
            thread.branch_taken = true;
        }

        InstructionKind::Ireturn => return_int(thread, vm)?,
        InstructionKind::Lreturn => return_wide(thread, RawWide::Long(thread.pop_i64()?))?,
        InstructionKind::Freturn => return_simple(thread, RawSimple::Float(thread.pop_f32()?))?,
        InstructionKind::Dreturn => return_wide(thread, RawWide::Double(thread.pop_f64()?))?,
        InstructionKind::Areturn => {
            let v = thread.pop_ref()?;
            return_simple(thread, RawSimple::Reference(v))?;
        }
        InstructionKind::Return => return_void(thread)?,

        InstructionKind::Getstatic { resolved, .. } => {
            let (field, _descriptor) = required(resolved)?.clone();
            let class = vm.class(field.class);
            let value = class.static_values.lock().unwrap()[field.slot_index].clone();
            push_value(thread, value)?;
        }
        InstructionKind::Putstatic { resolved, .. } => {
            let (field, descriptor) = required(resolved)?.clone();
            let class = vm.class(field.class);
            let value = pop_for_descriptor(thread, &descriptor)?;
            class.static_values.lock().unwrap()[field.slot_index] = value;
        }
        InstructionKind::Getfield { resolved, .. } => {
            let field = required(resolved)?.clone();
            let instance = expect_class_instance(thread.pop_ref()?)?;
            let value = instance.fields.lock().unwrap()[field.slot_index].clone();
            push_value(thread, value)?;
        }
        InstructionKind::Putfield { resolved, .. } => {
            let field = required(resolved)?.clone();
            let value = pop_for_descriptor(thread, &field.descriptor)?;
            let instance = expect_class_instance(thread.pop_ref()?)?;
            instance.fields.lock().unwrap()[field.slot_index] = value;
        }

        InstructionKind::Invokespecial { resolved, .. } => {
            let method_id = *required(resolved)?;
            invoke(thread, vm, method_id)?;
        }

        InstructionKind::New { resolved, .. } => {
            let class_id = *required(resolved)?;
            let class = vm.class(class_id);
            let fields = class.instance_descriptors.iter().map(Value::zero_for_descriptor).collect();
            let instance = ClassInstance { class: class_id, fields: std::sync::Mutex::new(fields), native: None };
            thread.push_ref(Value::ClassInstance(Arc::new(instance)))?;
        }

        InstructionKind::Invokestatic { .. } => return Err(JvmError::NotImplemented("invokestatic")),
        InstructionKind::Invokevirtual { .. } => return Err(JvmError::NotImplemented("invokevirtual")),
        InstructionKind::Invokeinterface { .. } => return Err(JvmError::NotImplemented("invokeinterface")),
        InstructionKind::Invokedynamic { .. } => return Err(JvmError::NotImplemented("invokedynamic")),

        InstructionKind::Newarray { .. } => return Err(JvmError::NotImplemented("newarray")),
        InstructionKind::Anewarray { .. } => return Err(JvmError::NotImplemented("anewarray")),
        InstructionKind::Arraylength => return Err(JvmError::NotImplemented("arraylength")),
        InstructionKind::Athrow => return Err(JvmError::NotImplemented("athrow")),
        InstructionKind::Checkcast { .. } => return Err(JvmError::NotImplemented("checkcast")),
        InstructionKind::Instanceof { .. } => return Err(JvmError::NotImplemented("instanceof")),
        InstructionKind::Monitorenter => return Err(JvmError::NotImplemented("monitorenter")),
        InstructionKind::Monitorexit => return Err(JvmError::NotImplemented("monitorexit")),
        InstructionKind::Wide { .. } => return Err(JvmError::NotImplemented("wide")),
        InstructionKind::Multianewarray { .. } => return Err(JvmError::NotImplemented("multianewarray")),
        InstructionKind::Ifnull { .. } => return Err(JvmError::NotImplemented("ifnull")),
        InstructionKind::Ifnonnull { .. } => return Err(JvmError::NotImplemented("ifnonnull")),
        InstructionKind::GotoW { .. } => return Err(JvmError::NotImplemented("goto_w")),
        InstructionKind::JsrW { .. } => return Err(JvmError::NotImplemented("jsr_w")),
        InstructionKind::Breakpoint => return Err(JvmError::NotImplemented("breakpoint")),
        InstructionKind::Impdep1 => return Err(JvmError::NotImplemented("impdep1")),
        InstructionKind::Impdep2 => return Err(JvmError::NotImplemented("impdep2")),
        InstructionKind::Unknown(op) => return Err(JvmError::UnknownOpcode(*op)),
    }
    Ok(())
}

fn required<T>(opt: &Option<T>) -> JvmResult<&T> {
    opt.as_ref()
        .ok_or_else(|| JvmError::Linkage(LinkageError::BadDescriptor("instruction executed before linking".into())))
}

fn required_usize(opt: &Option<usize>) -> JvmResult<usize> {
    required(opt).copied()
}

// -- locals --------------------------------------------------------------

fn expect_int(v: &Value) -> JvmResult<i32> {
    v.as_i32().ok_or_else(|| JvmError::TypeMismatch { expected: "int", found: v.type_name().into() })
}

fn expect_long(v: &Value) -> JvmResult<i64> {
    match v {
        Value::Long(l) => Ok(*l),
        other => Err(JvmError::TypeMismatch { expected: "long", found: other.type_name().into() }),
    }
}

fn expect_float(v: &Value) -> JvmResult<f32> {
    match v {
        Value::Float(f) => Ok(*f),
        other => Err(JvmError::TypeMismatch { expected: "float", found: other.type_name().into() }),
    }
}

fn expect_double(v: &Value) -> JvmResult<f64> {
    match v {
        Value::Double(d) => Ok(*d),
        other => Err(JvmError::TypeMismatch { expected: "double", found: other.type_name().into() }),
    }
}

fn expect_reference(v: &Value) -> JvmResult<Value> {
    if v.is_primitive() {
        return Err(JvmError::TypeMismatch { expected: "reference", found: v.type_name().into() });
    }
    Ok(v.clone())
}

fn expect_class_instance(v: Value) -> JvmResult<Arc<ClassInstance>> {
    match v {
        Value::ClassInstance(ci) => Ok(ci),
        Value::Null(_) => Err(JvmError::NullPointer),
        other => Err(JvmError::TypeMismatch { expected: "class instance", found: other.type_name().into() }),
    }
}

fn refs_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null(_), Value::Null(_)) => true,
        (Value::Null(_), _) | (_, Value::Null(_)) => false,
        (Value::ClassInstance(x), Value::ClassInstance(y)) => Arc::ptr_eq(x, y),
        (Value::String(x), Value::String(y)) => Arc::ptr_eq(x, y),
        (Value::MethodType(x), Value::MethodType(y)) => Arc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::ReturnAddress(x), Value::ReturnAddress(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => array_ptr_eq(x, y),
        _ => false,
    }
}

fn array_ptr_eq(a: &ArrayRef, b: &ArrayRef) -> bool {
    match (a, b) {
        (ArrayRef::Byte(x), ArrayRef::Byte(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Char(x), ArrayRef::Char(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Short(x), ArrayRef::Short(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Int(x), ArrayRef::Int(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Long(x), ArrayRef::Long(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Float(x), ArrayRef::Float(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Double(x), ArrayRef::Double(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Boolean(x), ArrayRef::Boolean(y)) => Arc::ptr_eq(x, y),
        (ArrayRef::Reference(x), ArrayRef::Reference(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

// -- constants / fields ----------------------------------------------------

fn push_constant(thread: &mut Thread, constant: ResolvedConstant) -> JvmResult<()> {
    match constant {
        ResolvedConstant::Int(v) => thread.push_i32(v),
        ResolvedConstant::Float(v) => thread.push_f32(v),
        ResolvedConstant::Long(v) => thread.push_i64(v),
        ResolvedConstant::Double(v) => thread.push_f64(v),
        ResolvedConstant::Str(s) => thread.push_ref(Value::String(s)),
        ResolvedConstant::Class(id) => thread.push_ref(Value::Class(id)),
        ResolvedConstant::MethodType(s) => thread.push_ref(Value::MethodType(s)),
        ResolvedConstant::MethodHandle { kind, owner, name, descriptor } => {
            thread.push_ref(Value::MethodHandle { kind, owner, name, descriptor })
        }
    }
}

fn push_value(thread: &mut Thread, value: Value) -> JvmResult<()> {
    match value {
        Value::Byte(b) => thread.push_i32(b as i32),
        Value::Char(c) => thread.push_i32(c as i32),
        Value::Short(s) => thread.push_i32(s as i32),
        Value::Int(i) => thread.push_i32(i),
        Value::Boolean(b) => thread.push_i32(b as i32),
        Value::Long(l) => thread.push_i64(l),
        Value::Float(f) => thread.push_f32(f),
        Value::Double(d) => thread.push_f64(d),
        other => thread.push_ref(other),
    }
}

/// Pops a value off whichever stack `descriptor` dictates, coercing
/// primitives to the field's declared shape (`putstatic`/`putfield`).
fn pop_for_descriptor(thread: &mut Thread, descriptor: &JavaType) -> JvmResult<Value> {
    match descriptor {
        JavaType::Primitive(PrimitiveType::Long) => Ok(Value::Long(thread.pop_i64()?)),
        JavaType::Primitive(PrimitiveType::Double) => Ok(Value::Double(thread.pop_f64()?)),
        JavaType::Primitive(PrimitiveType::Float) => Ok(Value::Float(thread.pop_f32()?)),
        JavaType::Primitive(p) => Ok(Value::convert_from_primitive(thread.pop_i32()?, &JavaType::Primitive(*p))),
        JavaType::Reference(_) | JavaType::Array(_) => thread.pop_ref(),
    }
}

// -- arithmetic --------------------------------------------------------------

fn binop_i32(thread: &mut Thread, f: impl Fn(i32, i32) -> i32) -> JvmResult<()> {
    let b = thread.pop_i32()?;
    let a = thread.pop_i32()?;
    thread.push_i32(f(a, b))
}

fn binop_i64(thread: &mut Thread, f: impl Fn(i64, i64) -> i64) -> JvmResult<()> {
    let b = thread.pop_i64()?;
    let a = thread.pop_i64()?;
    thread.push_i64(f(a, b))
}

fn binop_f32(thread: &mut Thread, f: impl Fn(f32, f32) -> f32) -> JvmResult<()> {
    let b = thread.pop_f32()?;
    let a = thread.pop_f32()?;
    thread.push_f32(f(a, b))
}

fn binop_f64(thread: &mut Thread, f: impl Fn(f64, f64) -> f64) -> JvmResult<()> {
    let b = thread.pop_f64()?;
    let a = thread.pop_f64()?;
    thread.push_f64(f(a, b))
}

fn div_i32(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_i32()?;
    let a = thread.pop_i32()?;
    if b == 0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_i32(a.wrapping_div(b))
}

fn rem_i32(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_i32()?;
    let a = thread.pop_i32()?;
    if b == 0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_i32(a.wrapping_rem(b))
}

fn div_i64(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_i64()?;
    let a = thread.pop_i64()?;
    if b == 0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_i64(a.wrapping_div(b))
}

fn rem_i64(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_i64()?;
    let a = thread.pop_i64()?;
    if b == 0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_i64(a.wrapping_rem(b))
}

/// JVM float/double remainder: truncate both operands toward zero, then
/// take the (now ordinary) IEEE remainder; a divisor that truncates to
/// zero is an arithmetic error rather than a NaN result.
fn frem(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_f32()?;
    let a = thread.pop_f32()?;
    let (ta, tb) = (a.trunc(), b.trunc());
    if tb == 0.0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_f32(ta % tb)
}

fn drem(thread: &mut Thread) -> JvmResult<()> {
    let b = thread.pop_f64()?;
    let a = thread.pop_f64()?;
    let (ta, tb) = (a.trunc(), b.trunc());
    if tb == 0.0 {
        return Err(JvmError::ArithmeticDivisionByZero);
    }
    thread.push_f64(ta % tb)
}

fn shift_i32(thread: &mut Thread, mask: u32, f: impl Fn(i32, u32) -> i32) -> JvmResult<()> {
    let amount = thread.pop_i32()? as u32 & mask;
    let value = thread.pop_i32()?;
    thread.push_i32(f(value, amount))
}

fn shift_i64(thread: &mut Thread, mask: u32, f: impl Fn(i64, u32) -> i64) -> JvmResult<()> {
    let amount = thread.pop_i32()? as u32 & mask;
    let value = thread.pop_i64()?;
    thread.push_i64(f(value, amount))
}

fn signum(ord: std::cmp::Ordering) -> i32 {
    match ord {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

fn thread_pop_f32_pair(thread: &mut Thread) -> JvmResult<(f32, f32)> {
    let b = thread.pop_f32()?;
    let a = thread.pop_f32()?;
    Ok((a, b))
}

fn float_cmp(
    thread: &mut Thread,
    nan_result: i32,
    cmp: fn(&f32, &f32) -> Option<std::cmp::Ordering>,
    pop_pair: fn(&mut Thread) -> JvmResult<(f32, f32)>,
) -> JvmResult<()> {
    let (a, b) = pop_pair(thread)?;
    let result = match cmp(&a, &b) {
        Some(ord) => signum(ord),
        None => nan_result,
    };
    thread.push_i32(result)
}

fn double_cmp(thread: &mut Thread, nan_result: i32) -> JvmResult<()> {
    let b = thread.pop_f64()?;
    let a = thread.pop_f64()?;
    let result = match a.partial_cmp(&b) {
        Some(ord) => signum(ord),
        None => nan_result,
    };
    thread.push_i32(result)
}

// -- branches ---------------------------------------------------------------

fn compare_to_zero(op: CompareOp, v: i32) -> bool {
    match op {
        CompareOp::Eq => v == 0,
        CompareOp::Ne => v != 0,
        CompareOp::Lt => v < 0,
        CompareOp::Ge => v >= 0,
        CompareOp::Gt => v > 0,
        CompareOp::Le => v <= 0,
    }
}

fn compare_ints(op: CompareOp, a: i32, b: i32) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Ge => a >= b,
        CompareOp::Gt => a > b,
        CompareOp::Le => a <= b,
    }
}

fn branch_if(thread: &mut Thread, taken: bool, target: usize) -> JvmResult<()> {
    if taken {
        thread.pc = target;
        thread.branch_taken = true;
    }
    Ok(())
}

// -- array access ------------------------------------------------------------

fn array_index(thread: &mut Thread) -> JvmResult<(ArrayRef, usize)> {
    let index = thread.pop_i32()?;
    let arrayref = thread.pop_ref()?;
    let array = match arrayref {
        Value::Array(a) => a,
        Value::Null(_) => return Err(JvmError::NullPointer),
        other => return Err(JvmError::TypeMismatch { expected: "array", found: other.type_name().into() }),
    };
    if index < 0 || index as usize >= array.len() {
        return Err(JvmError::IndexOutOfBounds { index, length: array.len() as i32 });
    }
    Ok((array, index as usize))
}

macro_rules! array_load {
    ($name:ident, $variant:ident, $push:ident, $as:ty) => {
        fn $name(thread: &mut Thread) -> JvmResult<()> {
            let (array, index) = array_index(thread)?;
            match array {
                ArrayRef::$variant(cell) => {
                    let v = cell.lock().unwrap()[index];
                    thread.$push(v as $as)
                }
                other => Err(JvmError::TypeMismatch { expected: stringify!($variant), found: other_array_name(&other) }),
            }
        }
    };
}

macro_rules! array_store {
    ($name:ident, $variant:ident, $pop:ident, $as:ty) => {
        fn $name(thread: &mut Thread) -> JvmResult<()> {
            let value = thread.$pop()?;
            let (array, index) = array_index(thread)?;
            match array {
                ArrayRef::$variant(cell) => {
                    cell.lock().unwrap()[index] = value as $as;
                    Ok(())
                }
                other => Err(JvmError::TypeMismatch { expected: stringify!($variant), found: other_array_name(&other) }),
            }
        }
    };
}

fn other_array_name(a: &ArrayRef) -> String {
    match a {
        ArrayRef::Byte(_) => "byte[]",
        ArrayRef::Char(_) => "char[]",
        ArrayRef::Short(_) => "short[]",
        ArrayRef::Int(_) => "int[]",
        ArrayRef::Long(_) => "long[]",
        ArrayRef::Float(_) => "float[]",
        ArrayRef::Double(_) => "double[]",
        ArrayRef::Boolean(_) => "boolean[]",
        ArrayRef::Reference(_) => "reference[]",
    }
    .to_string()
}

array_load!(array_load_int, Int, push_i32, i32);
array_load!(array_load_long, Long, push_i64, i64);
array_load!(array_load_float, Float, push_f32, f32);
array_load!(array_load_double, Double, push_f64, f64);
array_load!(array_load_byte, Byte, push_i32, i32);
array_load!(array_load_char, Char, push_i32, i32);
array_load!(array_load_short, Short, push_i32, i32);

array_store!(array_store_int, Int, pop_i32, i32);
array_store!(array_store_long, Long, pop_i64, i64);
array_store!(array_store_float, Float, pop_f32, f32);
array_store!(array_store_double, Double, pop_f64, f64);
array_store!(array_store_byte, Byte, pop_i32, i8);
array_store!(array_store_char, Char, pop_i32, u16);
array_store!(array_store_short, Short, pop_i32, i16);

fn array_load_ref(thread: &mut Thread) -> JvmResult<()> {
    let (array, index) = array_index(thread)?;
    match array {
        ArrayRef::Reference(cell) => {
            let v = cell.lock().unwrap()[index].clone();
            thread.push_ref(v)
        }
        other => Err(JvmError::TypeMismatch { expected: "reference[]", found: other_array_name(&other) }),
    }
}

fn array_store_ref(thread: &mut Thread) -> JvmResult<()> {
    let value = thread.pop_ref()?;
    let (array, index) = array_index(thread)?;
    match array {
        ArrayRef::Reference(cell) => {
            cell.lock().unwrap()[index] = value;
            Ok(())
        }
        other => Err(JvmError::TypeMismatch { expected: "reference[]", found: other_array_name(&other) }),
    }
}

// -- method call/return -------------------------------------------------------

fn pop_argument(thread: &mut Thread, ty: &JavaType) -> JvmResult<Value> {
    match ty {
        JavaType::Primitive(PrimitiveType::Long) => Ok(Value::Long(thread.pop_i64()?)),
        JavaType::Primitive(PrimitiveType::Double) => Ok(Value::Double(thread.pop_f64()?)),
        JavaType::Primitive(PrimitiveType::Float) => Ok(Value::Float(thread.pop_f32()?)),
        JavaType::Primitive(PrimitiveType::Int) => Ok(Value::Int(thread.pop_i32()?)),
        JavaType::Primitive(PrimitiveType::Byte) => Ok(Value::Byte(thread.pop_i32()? as i8)),
        JavaType::Primitive(PrimitiveType::Char) => Ok(Value::Char(thread.pop_i32()? as u16)),
        JavaType::Primitive(PrimitiveType::Short) => Ok(Value::Short(thread.pop_i32()? as i16)),
        JavaType::Primitive(PrimitiveType::Boolean) => Ok(Value::Boolean((thread.pop_i32()? & 1) as u8)),
        JavaType::Reference(_) | JavaType::Array(_) => thread.pop_ref(),
    }
}

/// Performs a direct call (`invokespecial`): pops `this` and the declared
/// arguments off the caller's stacks into the callee's local-variable
/// vector, pushes a return frame, and switches the thread onto the callee.
fn invoke(thread: &mut Thread, vm: &Vm, method_id: crate::keys::MethodId) -> JvmResult<()> {
    let callee = vm.method(method_id);
    if !callee.is_optimized() {
        crate::optimize::optimize(vm, callee.owner, &callee)?;
    }

    let mut slot_starts = Vec::with_capacity(callee.descriptor.parameters.len() + 1);
    let mut cursor = 1usize; // slot 0 reserved for `this`
    for param in &callee.descriptor.parameters {
        slot_starts.push(cursor);
        cursor += param.slot_count();
    }
    debug_assert_eq!(cursor, callee.argument_slot_count());

    let mut new_locals: Vec<Option<Value>> = vec![None; callee.max_locals as usize];
    for (i, param) in callee.descriptor.parameters.iter().enumerate().rev() {
        let value = pop_argument(thread, param)?;
        let start = slot_starts[i];
        new_locals[start] = Some(value);
    }
    let this_ref = thread.pop_ref()?;
    if matches!(this_ref, Value::Null(_)) {
        return Err(JvmError::NullPointer);
    }
    new_locals[0] = Some(this_ref);

    let frame = ReturnFrame {
        method: thread.method,
        resume_index: thread.pc + 1,
        data_stack_size: thread.data_stack_len(),
        reference_stack_size: thread.reference_stack_len(),
        locals: std::mem::replace(&mut thread.locals, new_locals),
    };
    thread.push_frame(frame)?;
    thread.method = method_id;
    thread.pc = 0;
    thread.branch_taken = true;
    Ok(())
}

enum RawSimple {
    Float(f32),
    Reference(Value),
}

enum RawWide {
    Long(i64),
    Double(f64),
}

/// Restores the caller's frame, then pushes `value` onto the now-restored
/// stack. Used for everything except `ireturn`, whose narrowing has its own
/// quirk (see `return_int`).
fn return_simple(thread: &mut Thread, value: RawSimple) -> JvmResult<()> {
    let Some(frame) = thread.pop_frame() else {
        thread.exit_reason = Some(ExitReason::Completed);
        return Ok(());
    };
    restore_frame(thread, frame);
    match value {
        RawSimple::Float(f) => thread.push_f32(f)?,
        RawSimple::Reference(v) => thread.push_ref(v)?,
    }
    thread.branch_taken = true;
    Ok(())
}

fn return_wide(thread: &mut Thread, value: RawWide) -> JvmResult<()> {
    let Some(frame) = thread.pop_frame() else {
        thread.exit_reason = Some(ExitReason::Completed);
        return Ok(());
    };
    restore_frame(thread, frame);
    match value {
        RawWide::Long(v) => thread.push_i64(v)?,
        RawWide::Double(v) => thread.push_f64(v)?,
    }
    thread.branch_taken = true;
    Ok(())
}

fn return_void(thread: &mut Thread) -> JvmResult<()> {
    let Some(frame) = thread.pop_frame() else {
        thread.exit_reason = Some(ExitReason::Completed);
        return Ok(());
    };
    restore_frame(thread, frame);
    thread.branch_taken = true;
    Ok(())
}

/// `ireturn`'s narrowing is applied to the method's declared return kind
/// only after the frame swap has already happened, so the narrowed value
/// lands on the *caller's* stack rather than the callee's. This is an
/// intentional quirk carried over rather than a bug.
fn return_int(thread: &mut Thread, vm: &Vm) -> JvmResult<()> {
    let raw = thread.pop_i32()?;
    let callee_return_type = vm.method(thread.method).descriptor.return_type.clone();

    let Some(frame) = thread.pop_frame() else {
        thread.exit_reason = Some(ExitReason::Completed);
        return Ok(());
    };
    restore_frame(thread, frame);

    let narrowed = match callee_return_type {
        Some(JavaType::Primitive(PrimitiveType::Byte)) => (raw as i8) as i32,
        Some(JavaType::Primitive(PrimitiveType::Char)) => (raw as u16) as i32,
        Some(JavaType::Primitive(PrimitiveType::Short)) => (raw as i16) as i32,
        Some(JavaType::Primitive(PrimitiveType::Boolean)) => raw & 1,
        _ => raw,
    };
    thread.push_i32(narrowed)?;
    thread.branch_taken = true;
    Ok(())
}

fn restore_frame(thread: &mut Thread, frame: ReturnFrame) {
    thread.method = frame.method;
    thread.pc = frame.resume_index;
    thread.locals = frame.locals;
    thread.truncate_data_stack(frame.data_stack_size);
    thread.truncate_reference_stack(frame.reference_stack_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::keys::MethodId;

    fn thread_with_locals(n: usize) -> Thread {
        Thread::new(MethodId(0), 16, vec![None; n])
    }

    fn vm() -> Vm {
        Vm::new(VmConfig::default())
    }

    fn plain(kind: InstructionKind) -> Instruction {
        Instruction { kind, byte_length: 1 }
    }

    #[test]
    fn iadd_sums_two_pushed_ints() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::IconstValue(2)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::IconstValue(3)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::Iadd), &mut t, &vm).unwrap();
        assert_eq!(t.pop_i32().unwrap(), 5);
    }

    #[test]
    fn ldc2w_long_round_trips_through_the_data_stack() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        let instr = plain(InstructionKind::Ldc2W {
            index: 0,
            resolved: Some(ResolvedConstant::Long(0x1122_3344_5566_7788)),
        });
        execute(&instr, &mut t, &vm).unwrap();
        assert_eq!(t.pop_i64().unwrap(), 0x1122_3344_5566_7788);
    }

    #[test]
    fn ifeq_skips_to_its_target_when_top_of_stack_is_zero() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::IconstValue(0)), &mut t, &vm).unwrap();
        let ifeq = plain(InstructionKind::IfCond {
            op: CompareOp::Eq,
            raw_offset: 0,
            target: Some(5),
        });
        execute(&ifeq, &mut t, &vm).unwrap();
        assert!(t.branch_taken);
        assert_eq!(t.pc, 5);

        // Landing instruction at the branch target behaves like any other.
        execute(&plain(InstructionKind::IconstValue(42)), &mut t, &vm).unwrap();
        assert_eq!(t.pop_i32().unwrap(), 42);
    }

    #[test]
    fn ifeq_falls_through_when_top_of_stack_is_nonzero() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::IconstValue(1)), &mut t, &vm).unwrap();
        let ifeq = plain(InstructionKind::IfCond {
            op: CompareOp::Eq,
            raw_offset: 0,
            target: Some(5),
        });
        execute(&ifeq, &mut t, &vm).unwrap();
        assert!(!t.branch_taken);
    }

    #[test]
    fn fcmpl_treats_nan_as_less_than() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::FconstValue(f32::NAN)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::FconstValue(1.0)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::Fcmpl), &mut t, &vm).unwrap();
        assert_eq!(t.pop_i32().unwrap(), -1);
    }

    #[test]
    fn fcmpg_treats_nan_as_greater_than() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::FconstValue(f32::NAN)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::FconstValue(1.0)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::Fcmpg), &mut t, &vm).unwrap();
        assert_eq!(t.pop_i32().unwrap(), 1);
    }

    #[test]
    fn ishl_masks_shift_distance_to_five_bits() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::IconstValue(1)), &mut t, &vm).unwrap();
        // 33 & 0x1f == 1, so this behaves like a shift of one, not 33.
        execute(&plain(InstructionKind::IconstValue(33)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::Ishl), &mut t, &vm).unwrap();
        assert_eq!(t.pop_i32().unwrap(), 2);
    }

    #[test]
    fn idiv_by_zero_is_an_arithmetic_error() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        execute(&plain(InstructionKind::IconstValue(5)), &mut t, &vm).unwrap();
        execute(&plain(InstructionKind::IconstValue(0)), &mut t, &vm).unwrap();
        assert!(matches!(
            execute(&plain(InstructionKind::Idiv), &mut t, &vm),
            Err(JvmError::ArithmeticDivisionByZero)
        ));
    }

    #[test]
    fn getstatic_before_link_reports_a_linkage_error_not_a_panic() {
        let mut t = thread_with_locals(0);
        let vm = vm();
        let instr = plain(InstructionKind::Getstatic { index: 0, resolved: None });
        assert!(matches!(execute(&instr, &mut t, &vm), Err(JvmError::Linkage(_))));
    }

    #[test]
    fn new_allocates_a_zero_initialized_instance() {
        let mut t = thread_with_locals(0);
        let vm_instance = vm();
        let class = crate::class::Class {
            name: vm_instance.interner.get_or_intern("Example"),
            super_class: None,
            constant_pool: Vec::new(),
            methods: Default::default(),
            fields: Default::default(),
            static_descriptors: Vec::new(),
            static_values: std::sync::Mutex::new(Vec::new()),
            instance_descriptors: vec![JavaType::Primitive(PrimitiveType::Int)],
        };
        let class_id = vm_instance.register_builtin_class(class.name, class);
        let instr = plain(InstructionKind::New { index: 0, resolved: Some(class_id) });
        execute(&instr, &mut t, &vm_instance).unwrap();
        let value = t.pop_ref().unwrap();
        match value {
            Value::ClassInstance(instance) => {
                let fields = instance.fields.lock().unwrap();
                assert_eq!(fields.len(), 1);
                assert!(matches!(fields[0], Value::Int(0)));
            }
            other => panic!("expected a class instance, got {other:?}"),
        }
    }
}
