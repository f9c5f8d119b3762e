use lasso::Spur;

/// An interned identifier: class names, member names, and descriptors are
/// all stored once in the VM-wide interner and referred to by this key
/// everywhere else, the same way the teacher interns symbols with `lasso`.
pub type Symbol = Spur;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                $name(value as u32)
            }
        }
    };
}

arena_id!(ClassId);
arena_id!(MethodId);

/// The (class, name, descriptor) triple used to look a method up by
/// signature rather than by arena index, e.g. when resolving an
/// `invokespecial` at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: Symbol,
    pub descriptor: Symbol,
}
