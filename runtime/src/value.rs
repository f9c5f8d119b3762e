use crate::keys::ClassId;
use std::sync::Arc;

/// A reference to a heap-allocated array, parameterized by element kind.
/// Each primitive kind gets its own variant (per spec) so `iaload`/`castore`
/// and friends can type-check against the exact element kind without an
/// extra tag field.
#[derive(Debug, Clone)]
pub enum ArrayRef {
    Byte(Arc<std::sync::Mutex<Vec<i8>>>),
    Char(Arc<std::sync::Mutex<Vec<u16>>>),
    Short(Arc<std::sync::Mutex<Vec<i16>>>),
    Int(Arc<std::sync::Mutex<Vec<i32>>>),
    Long(Arc<std::sync::Mutex<Vec<i64>>>),
    Float(Arc<std::sync::Mutex<Vec<f32>>>),
    Double(Arc<std::sync::Mutex<Vec<f64>>>),
    Boolean(Arc<std::sync::Mutex<Vec<u8>>>),
    Reference(Arc<std::sync::Mutex<Vec<Value>>>),
}

impl ArrayRef {
    pub fn len(&self) -> usize {
        match self {
            ArrayRef::Byte(v) => v.lock().unwrap().len(),
            ArrayRef::Char(v) => v.lock().unwrap().len(),
            ArrayRef::Short(v) => v.lock().unwrap().len(),
            ArrayRef::Int(v) => v.lock().unwrap().len(),
            ArrayRef::Long(v) => v.lock().unwrap().len(),
            ArrayRef::Float(v) => v.lock().unwrap().len(),
            ArrayRef::Double(v) => v.lock().unwrap().len(),
            ArrayRef::Boolean(v) => v.lock().unwrap().len(),
            ArrayRef::Reference(v) => v.lock().unwrap().len(),
        }
    }
}

/// A `ClassInstance` allocated by `new`. Instance fields are indexed the
/// same way `Class` indexes its own static-field vector.
#[derive(Debug)]
pub struct ClassInstance {
    pub class: ClassId,
    pub fields: std::sync::Mutex<Vec<Value>>,
    /// Opaque payload used by built-in classes (e.g. `System.out`'s
    /// `PrintStream`) that carry host-side state no bytecode-visible field
    /// can express.
    pub native: Option<NativePayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePayload {
    Stdout,
}

/// One of the eight JVM method handle reference kinds (`REF_getField`
/// through `REF_invokeInterface`), carried as the discriminant of a
/// `Value::MethodHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl MethodHandleKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::GetField,
            2 => Self::GetStatic,
            3 => Self::PutField,
            4 => Self::PutStatic,
            5 => Self::InvokeVirtual,
            6 => Self::InvokeStatic,
            7 => Self::InvokeSpecial,
            8 => Self::NewInvokeSpecial,
            9 => Self::InvokeInterface,
            _ => return None,
        })
    }
}

/// The engine's tagged value type. Spans every JVM primitive kind plus
/// every reference kind the core needs to carry through fields, locals,
/// arrays, and the reference stack.
#[derive(Debug, Clone)]
pub enum Value {
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Semantically distinct from `Byte`, though stored the same way (0/1).
    Boolean(u8),
    /// Carries the expected descriptor so a field read of a never-assigned
    /// reference slot can still report the declared type.
    Null(&'static str),
    ClassInstance(Arc<ClassInstance>),
    Array(ArrayRef),
    Class(ClassId),
    String(Arc<str>),
    MethodType(Arc<str>),
    MethodHandle {
        kind: MethodHandleKind,
        owner: Arc<str>,
        name: Arc<str>,
        descriptor: Arc<str>,
    },
    /// The address `jsr` pushes and `ret` jumps to. Not a JVM-spec value
    /// kind of its own, but `jsr`/`ret` route it through the reference
    /// stack (matching how a real compiler stores it with `astore`), so it
    /// needs a `Value` shape to occupy that slot.
    ReturnAddress(usize),
}

impl Value {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Byte(_)
                | Value::Char(_)
                | Value::Short(_)
                | Value::Int(_)
                | Value::Long(_)
                | Value::Float(_)
                | Value::Double(_)
                | Value::Boolean(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Null(_) => "null",
            Value::ClassInstance(_) => "class_instance",
            Value::Array(_) => "array",
            Value::Class(_) => "class",
            Value::String(_) => "string",
            Value::MethodType(_) => "method_type",
            Value::MethodHandle { .. } => "method_handle",
            Value::ReturnAddress(_) => "return_address",
        }
    }

    /// The value's integer interpretation, for primitives stored as one
    /// of the narrower integral kinds. Does not widen float/double.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Byte(b) => Some(b as i32),
            Value::Char(c) => Some(c as i32),
            Value::Short(s) => Some(s as i32),
            Value::Int(i) => Some(i),
            Value::Boolean(b) => Some(b as i32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Long(l) => Some(l),
            _ => self.as_i32().map(|i| i as i64),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    /// Coerces a 32-bit stack-widened int into the declared primitive shape
    /// of a field or array element, per the narrowing rules applied by
    /// `putstatic`/`putfield`/typed array stores.
    pub fn convert_from_primitive(raw: i32, descriptor: &crate::descriptor::JavaType) -> Value {
        use crate::descriptor::{JavaType, PrimitiveType};
        match descriptor {
            JavaType::Primitive(PrimitiveType::Byte) => Value::Byte(raw as i8),
            JavaType::Primitive(PrimitiveType::Char) => Value::Char(raw as u16),
            JavaType::Primitive(PrimitiveType::Short) => Value::Short(raw as i16),
            JavaType::Primitive(PrimitiveType::Int) => Value::Int(raw),
            JavaType::Primitive(PrimitiveType::Boolean) => Value::Boolean((raw & 1) as u8),
            _ => Value::Int(raw),
        }
    }

    /// The zero value for a descriptor, used to default-initialize static
    /// and instance field slots.
    pub fn zero_for_descriptor(descriptor: &crate::descriptor::JavaType) -> Value {
        use crate::descriptor::{JavaType, PrimitiveType};
        match descriptor {
            JavaType::Primitive(PrimitiveType::Byte) => Value::Byte(0),
            JavaType::Primitive(PrimitiveType::Char) => Value::Char(0),
            JavaType::Primitive(PrimitiveType::Short) => Value::Short(0),
            JavaType::Primitive(PrimitiveType::Int) => Value::Int(0),
            JavaType::Primitive(PrimitiveType::Long) => Value::Long(0),
            JavaType::Primitive(PrimitiveType::Float) => Value::Float(0.0),
            JavaType::Primitive(PrimitiveType::Double) => Value::Double(0.0),
            JavaType::Primitive(PrimitiveType::Boolean) => Value::Boolean(0),
            JavaType::Reference(name) => Value::Null(leak_name(name)),
            JavaType::Array(_) => Value::Null("array"),
        }
    }
}

/// Descriptor names used for `Value::Null`'s expected-type tag are rare and
/// bounded by the number of distinct field descriptors a loaded class
/// declares, so leaking them for a `'static` str is acceptable here rather
/// than threading a lifetime through every field-default call site.
fn leak_name(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{JavaType, PrimitiveType};

    #[test]
    fn convert_from_primitive_narrows_byte() {
        let v = Value::convert_from_primitive(0x1FF, &JavaType::Primitive(PrimitiveType::Byte));
        match v {
            Value::Byte(b) => assert_eq!(b, 0x1FFu32 as i8),
            _ => panic!("expected byte"),
        }
    }

    #[test]
    fn zero_value_for_reference_is_null_with_descriptor() {
        let v = Value::zero_for_descriptor(&JavaType::Reference("java/lang/Object".into()));
        match v {
            Value::Null(name) => assert_eq!(name, "java/lang/Object"),
            _ => panic!("expected null"),
        }
    }
}
