//! Thin wrappers around the raw `access_flags` bitmask shared by classes,
//! fields and methods. Kept as plain newtypes rather than a `bitflags!`
//! dependency since only a handful of bits are ever queried by the core.

macro_rules! access_flags {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub u16);

        impl $name {
            pub const ACC_PUBLIC: u16 = 0x0001;
            pub const ACC_STATIC: u16 = 0x0008;
            pub const ACC_FINAL: u16 = 0x0010;
            pub const ACC_SUPER: u16 = 0x0020;
            pub const ACC_NATIVE: u16 = 0x0100;
            pub const ACC_INTERFACE: u16 = 0x0200;
            pub const ACC_ABSTRACT: u16 = 0x0400;

            pub fn is_public(self) -> bool {
                self.0 & Self::ACC_PUBLIC != 0
            }
            pub fn is_static(self) -> bool {
                self.0 & Self::ACC_STATIC != 0
            }
            pub fn is_final(self) -> bool {
                self.0 & Self::ACC_FINAL != 0
            }
            pub fn is_native(self) -> bool {
                self.0 & Self::ACC_NATIVE != 0
            }
            pub fn is_abstract(self) -> bool {
                self.0 & Self::ACC_ABSTRACT != 0
            }
            pub fn is_interface(self) -> bool {
                self.0 & Self::ACC_INTERFACE != 0
            }

            pub fn raw(self) -> u16 {
                self.0
            }
        }
    };
}

access_flags!(ClassFlags);
access_flags!(FieldFlags);
access_flags!(MethodFlags);
