use std::fmt::{self, Display};

/// Errors produced while turning raw `.class` bytes into a [`crate::ClassFile`].
///
/// This crate is deliberately not a verifier: a malformed attribute body past
/// the bytes the core actually reads is never inspected, so most of these
/// variants fire only on truncation or an outright corrupt header.
#[derive(Debug)]
pub enum ClassFileError {
    BadMagic(u32),
    UnsupportedVersion { major: u16, minor: u16 },
    Truncated,
    InvalidConstantPoolTag(u8),
    InvalidConstantPoolIndex(u16),
    Utf8(std::string::FromUtf8Error),
    Io(std::io::Error),
}

impl Display for ClassFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassFileError::BadMagic(got) => write!(f, "bad magic number: {got:#010x}"),
            ClassFileError::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported class file version {major}.{minor}")
            }
            ClassFileError::Truncated => write!(f, "class file ended before expected"),
            ClassFileError::InvalidConstantPoolTag(tag) => {
                write!(f, "unknown constant pool tag {tag}")
            }
            ClassFileError::InvalidConstantPoolIndex(idx) => {
                write!(f, "constant pool index {idx} out of range")
            }
            ClassFileError::Utf8(e) => write!(f, "invalid modified utf-8: {e}"),
            ClassFileError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ClassFileError {}

impl From<std::io::Error> for ClassFileError {
    fn from(value: std::io::Error) -> Self {
        ClassFileError::Io(value)
    }
}

impl From<std::string::FromUtf8Error> for ClassFileError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        ClassFileError::Utf8(value)
    }
}
