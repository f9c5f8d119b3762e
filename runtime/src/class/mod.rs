use std::collections::HashMap;
use std::sync::Mutex;

use crate::constant_pool::RuntimeConstant;
use crate::descriptor::JavaType;
use crate::keys::{MethodId, MethodKey, Symbol};
use crate::value::Value;

/// Static or instance field metadata: its declared type and where its
/// value lives in the owning class's (or instance's) value vector.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub descriptor: JavaType,
    pub is_static: bool,
    pub slot_index: usize,
}

/// A loaded class. Owns its method table, field metadata, and static-field
/// storage. Created once when a class file is loaded and never destroyed
/// for the lifetime of the VM — there is no unload path, so the object
/// graph (`Class` → `Method` → resolved field/method pointers) is built
/// once and addressed by arena index rather than shared pointers.
#[derive(Debug)]
pub struct Class {
    pub name: Symbol,
    /// The superclass's interned name, not a `ClassId` — there is no
    /// superclass traversal, so the superclass itself need not be loaded
    /// for this class to load, and forcing early resolution to a `ClassId`
    /// would make that an unwanted precondition.
    pub super_class: Option<Symbol>,
    pub constant_pool: Vec<RuntimeConstant>,
    pub methods: HashMap<MethodKey, MethodId>,
    pub fields: HashMap<Symbol, FieldSlot>,
    pub static_descriptors: Vec<JavaType>,
    pub static_values: Mutex<Vec<Value>>,
    pub instance_descriptors: Vec<JavaType>,
}

impl Class {
    pub fn lookup_method(&self, key: &MethodKey) -> Option<MethodId> {
        self.methods.get(key).copied()
    }

    /// Static-field resolution: fails if the name is unknown or the
    /// matched field is non-static. No superclass traversal — an
    /// acknowledged gap carried over from the source behaviour.
    pub fn lookup_static_field(&self, name: Symbol) -> Option<&FieldSlot> {
        self.fields.get(&name).filter(|f| f.is_static)
    }

    /// Instance-field resolution, symmetrical with `lookup_static_field`.
    pub fn lookup_instance_field(&self, name: Symbol) -> Option<&FieldSlot> {
        self.fields.get(&name).filter(|f| !f.is_static)
    }
}

pub use crate::value::{ClassInstance, NativePayload};
