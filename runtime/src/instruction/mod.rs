mod decode;
pub mod handlers;
mod link;

pub use decode::decode_one;
pub use link::LinkContext;

use crate::descriptor::JavaType;
use crate::keys::{ClassId, MethodId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone)]
pub enum ResolvedConstant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(std::sync::Arc<str>),
    Class(ClassId),
    MethodType(std::sync::Arc<str>),
    MethodHandle {
        kind: crate::value::MethodHandleKind,
        owner: std::sync::Arc<str>,
        name: std::sync::Arc<str>,
        descriptor: std::sync::Arc<str>,
    },
}

/// A resolved `getstatic`/`putstatic` target: no subclass polymorphism
/// means the slot index is fixed once the class and field name resolve.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedStaticField {
    pub class: ClassId,
    pub slot_index: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedInstanceField {
    pub class: ClassId,
    pub slot_index: usize,
    pub descriptor: JavaType,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedSwitch {
    pub default_target: usize,
}

/// One variant per opcode family. Local-variable fast forms (`iload_0`…
/// `_3`) and constant-push fast forms (`iconst_m1`…`_5`, `lconst_*`,
/// `fconst_*`, `dconst_*`) are folded into their base variant at decode
/// time — the opcode byte only ever affects which index/value is decoded,
/// never the link or execute behaviour, so carrying a separate variant per
/// fast form would duplicate every downstream match arm for no semantic
/// gain.
#[derive(Debug, Clone)]
pub enum InstructionKind {
    Nop,
    AconstNull,
    IconstValue(i32),
    LconstValue(i64),
    FconstValue(f32),
    DconstValue(f64),
    Bipush(i32),
    Sipush(i32),

    Ldc {
        index: u16,
        resolved: Option<ResolvedConstant>,
    },
    Ldc2W {
        index: u16,
        resolved: Option<ResolvedConstant>,
    },

    Iload(u16),
    Lload(u16),
    Fload(u16),
    Dload(u16),
    Aload(u16),

    Iaload,
    Laload,
    Faload,
    Daload,
    Aaload,
    Baload,
    Caload,
    Saload,

    Istore(u16),
    Lstore(u16),
    Fstore(u16),
    Dstore(u16),
    Astore(u16),

    Iastore,
    Lastore,
    Fastore,
    Dastore,
    Aastore,
    Bastore,
    Castore,
    Sastore,

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    Iadd,
    Ladd,
    Fadd,
    Dadd,
    Isub,
    Lsub,
    Fsub,
    Dsub,
    Imul,
    Lmul,
    Fmul,
    Dmul,
    Idiv,
    Ldiv,
    Fdiv,
    Ddiv,
    Irem,
    Lrem,
    Frem,
    Drem,
    Ineg,
    Lneg,
    Fneg,
    Dneg,

    Ishl,
    Lshl,
    Ishr,
    Lshr,
    Iushr,
    Lushr,
    Iand,
    Land,
    Ior,
    Lor,
    Ixor,
    Lxor,

    Iinc {
        index: u16,
        value: i32,
    },

    I2l,
    I2f,
    I2d,
    L2i,
    L2f,
    L2d,
    F2i,
    F2l,
    F2d,
    D2i,
    D2l,
    D2f,
    I2b,
    I2c,
    I2s,

    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,

    IfCond {
        op: CompareOp,
        raw_offset: i16,
        target: Option<usize>,
    },
    IfICmp {
        op: CompareOp,
        raw_offset: i16,
        target: Option<usize>,
    },
    IfACmp {
        eq: bool,
        raw_offset: i16,
        target: Option<usize>,
    },
    Goto {
        raw_offset: i16,
        target: Option<usize>,
    },
    Jsr {
        raw_offset: i16,
        target: Option<usize>,
        return_index: Option<usize>,
    },
    Ret {
        index: u16,
    },

    Tableswitch {
        default_raw: i32,
        low: i32,
        high: i32,
        offsets_raw: Vec<i32>,
        default_target: Option<usize>,
        targets: Option<Vec<usize>>,
    },
    Lookupswitch {
        default_raw: i32,
        pairs_raw: Vec<(i32, i32)>,
        default_target: Option<usize>,
        targets: Option<Vec<(i32, usize)>>,
    },

    Ireturn,
    Lreturn,
    Freturn,
    Dreturn,
    Areturn,
    Return,

    Getstatic {
        index: u16,
        resolved: Option<(ResolvedStaticField, JavaType)>,
    },
    Putstatic {
        index: u16,
        resolved: Option<(ResolvedStaticField, JavaType)>,
    },
    Getfield {
        index: u16,
        resolved: Option<ResolvedInstanceField>,
    },
    Putfield {
        index: u16,
        resolved: Option<ResolvedInstanceField>,
    },

    Invokespecial {
        index: u16,
        resolved: Option<MethodId>,
    },
    Invokestatic {
        index: u16,
        resolved: Option<MethodId>,
    },
    Invokevirtual {
        index: u16,
        resolved: Option<MethodId>,
    },
    Invokeinterface {
        index: u16,
        count: u8,
    },
    Invokedynamic {
        index: u16,
    },

    New {
        index: u16,
        resolved: Option<ClassId>,
    },
    Newarray {
        atype: u8,
    },
    Anewarray {
        index: u16,
    },
    Arraylength,
    Athrow,
    Checkcast {
        index: u16,
    },
    Instanceof {
        index: u16,
    },
    Monitorenter,
    Monitorexit,

    Wide {
        modified_opcode: u8,
    },
    Multianewarray {
        index: u16,
        dimensions: u8,
    },

    Ifnull {
        raw_offset: i16,
        target: Option<usize>,
    },
    Ifnonnull {
        raw_offset: i16,
        target: Option<usize>,
    },
    GotoW {
        raw_offset: i32,
    },
    JsrW {
        raw_offset: i32,
    },

    Breakpoint,
    Impdep1,
    Impdep2,

    /// An opcode byte the decoder does not recognize. Valid per the decode
    /// pass (no decode-time failure); fails only if ever executed.
    Unknown(u8),
}

impl InstructionKind {
    /// A short mnemonic rendering for diagnostics, one line per variant,
    /// roughly matching `javap -c` style (`ldc #5`, `goto 12`, ...).
    /// Unresolved operands (pre-link) print their raw form; resolved ones
    /// print the resolved target where that's more informative.
    pub fn disassembly(&self) -> String {
        use InstructionKind::*;
        match self {
            Nop => "nop".into(),
            AconstNull => "aconst_null".into(),
            IconstValue(v) => format!("iconst {v}"),
            LconstValue(v) => format!("lconst {v}"),
            FconstValue(v) => format!("fconst {v}"),
            DconstValue(v) => format!("dconst {v}"),
            Bipush(v) => format!("bipush {v}"),
            Sipush(v) => format!("sipush {v}"),

            Ldc { index, .. } => format!("ldc #{index}"),
            Ldc2W { index, .. } => format!("ldc2_w #{index}"),

            Iload(i) => format!("iload {i}"),
            Lload(i) => format!("lload {i}"),
            Fload(i) => format!("fload {i}"),
            Dload(i) => format!("dload {i}"),
            Aload(i) => format!("aload {i}"),

            Iaload => "iaload".into(),
            Laload => "laload".into(),
            Faload => "faload".into(),
            Daload => "daload".into(),
            Aaload => "aaload".into(),
            Baload => "baload".into(),
            Caload => "caload".into(),
            Saload => "saload".into(),

            Istore(i) => format!("istore {i}"),
            Lstore(i) => format!("lstore {i}"),
            Fstore(i) => format!("fstore {i}"),
            Dstore(i) => format!("dstore {i}"),
            Astore(i) => format!("astore {i}"),

            Iastore => "iastore".into(),
            Lastore => "lastore".into(),
            Fastore => "fastore".into(),
            Dastore => "dastore".into(),
            Aastore => "aastore".into(),
            Bastore => "bastore".into(),
            Castore => "castore".into(),
            Sastore => "sastore".into(),

            Pop => "pop".into(),
            Pop2 => "pop2".into(),
            Dup => "dup".into(),
            DupX1 => "dup_x1".into(),
            DupX2 => "dup_x2".into(),
            Dup2 => "dup2".into(),
            Dup2X1 => "dup2_x1".into(),
            Dup2X2 => "dup2_x2".into(),
            Swap => "swap".into(),

            Iadd => "iadd".into(),
            Ladd => "ladd".into(),
            Fadd => "fadd".into(),
            Dadd => "dadd".into(),
            Isub => "isub".into(),
            Lsub => "lsub".into(),
            Fsub => "fsub".into(),
            Dsub => "dsub".into(),
            Imul => "imul".into(),
            Lmul => "lmul".into(),
            Fmul => "fmul".into(),
            Dmul => "dmul".into(),
            Idiv => "idiv".into(),
            Ldiv => "ldiv".into(),
            Fdiv => "fdiv".into(),
            Ddiv => "ddiv".into(),
            Irem => "irem".into(),
            Lrem => "lrem".into(),
            Frem => "frem".into(),
            Drem => "drem".into(),
            Ineg => "ineg".into(),
            Lneg => "lneg".into(),
            Fneg => "fneg".into(),
            Dneg => "dneg".into(),

            Ishl => "ishl".into(),
            Lshl => "lshl".into(),
            Ishr => "ishr".into(),
            Lshr => "lshr".into(),
            Iushr => "iushr".into(),
            Lushr => "lushr".into(),
            Iand => "iand".into(),
            Land => "land".into(),
            Ior => "ior".into(),
            Lor => "lor".into(),
            Ixor => "ixor".into(),
            Lxor => "lxor".into(),

            Iinc { index, value } => format!("iinc {index}, {value}"),

            I2l => "i2l".into(),
            I2f => "i2f".into(),
            I2d => "i2d".into(),
            L2i => "l2i".into(),
            L2f => "l2f".into(),
            L2d => "l2d".into(),
            F2i => "f2i".into(),
            F2l => "f2l".into(),
            F2d => "f2d".into(),
            D2i => "d2i".into(),
            D2l => "d2l".into(),
            D2f => "d2f".into(),
            I2b => "i2b".into(),
            I2c => "i2c".into(),
            I2s => "i2s".into(),

            Lcmp => "lcmp".into(),
            Fcmpl => "fcmpl".into(),
            Fcmpg => "fcmpg".into(),
            Dcmpl => "dcmpl".into(),
            Dcmpg => "dcmpg".into(),

            IfCond { op, raw_offset, target } => disassemble_branch(&format!("if{}", cmp_suffix(*op)), *raw_offset, *target),
            IfICmp { op, raw_offset, target } => disassemble_branch(&format!("if_icmp{}", cmp_suffix(*op)), *raw_offset, *target),
            IfACmp { eq, raw_offset, target } => {
                disassemble_branch(if *eq { "if_acmpeq" } else { "if_acmpne" }, *raw_offset, *target)
            }
            Goto { raw_offset, target } => disassemble_branch("goto", *raw_offset, *target),
            Jsr { raw_offset, target, .. } => disassemble_branch("jsr", *raw_offset, *target),
            Ret { index } => format!("ret {index}"),

            Tableswitch { low, high, default_target, .. } => match default_target {
                Some(t) => format!("tableswitch {low}..{high} default={t}"),
                None => format!("tableswitch {low}..{high} default=?"),
            },
            Lookupswitch { pairs_raw, default_target, .. } => match default_target {
                Some(t) => format!("lookupswitch {} pairs default={t}", pairs_raw.len()),
                None => format!("lookupswitch {} pairs default=?", pairs_raw.len()),
            },

            Ireturn => "ireturn".into(),
            Lreturn => "lreturn".into(),
            Freturn => "freturn".into(),
            Dreturn => "dreturn".into(),
            Areturn => "areturn".into(),
            Return => "return".into(),

            Getstatic { index, .. } => format!("getstatic #{index}"),
            Putstatic { index, .. } => format!("putstatic #{index}"),
            Getfield { index, .. } => format!("getfield #{index}"),
            Putfield { index, .. } => format!("putfield #{index}"),

            Invokespecial { index, .. } => format!("invokespecial #{index}"),
            Invokestatic { index, .. } => format!("invokestatic #{index}"),
            Invokevirtual { index, .. } => format!("invokevirtual #{index}"),
            Invokeinterface { index, count } => format!("invokeinterface #{index}, {count}"),
            Invokedynamic { index } => format!("invokedynamic #{index}"),

            New { index, .. } => format!("new #{index}"),
            Newarray { atype } => format!("newarray {atype}"),
            Anewarray { index } => format!("anewarray #{index}"),
            Arraylength => "arraylength".into(),
            Athrow => "athrow".into(),
            Checkcast { index } => format!("checkcast #{index}"),
            Instanceof { index } => format!("instanceof #{index}"),
            Monitorenter => "monitorenter".into(),
            Monitorexit => "monitorexit".into(),

            Wide { modified_opcode } => format!("wide {modified_opcode:#04x}"),
            Multianewarray { index, dimensions } => format!("multianewarray #{index}, {dimensions}"),

            Ifnull { raw_offset, target } => disassemble_branch("ifnull", *raw_offset, *target),
            Ifnonnull { raw_offset, target } => disassemble_branch("ifnonnull", *raw_offset, *target),
            GotoW { raw_offset } => format!("goto_w {raw_offset}"),
            JsrW { raw_offset } => format!("jsr_w {raw_offset}"),

            Breakpoint => "breakpoint".into(),
            Impdep1 => "impdep1".into(),
            Impdep2 => "impdep2".into(),

            Unknown(op) => format!("unknown {op:#04x}"),
        }
    }
}

fn cmp_suffix(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Ge => "ge",
        CompareOp::Gt => "gt",
        CompareOp::Le => "le",
    }
}

fn disassemble_branch(mnemonic: &str, raw_offset: i16, target: Option<usize>) -> String {
    match target {
        Some(t) => format!("{mnemonic} {t}"),
        None => format!("{mnemonic} {raw_offset:+}"),
    }
}

impl std::fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembly())
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub byte_length: u32,
}

impl Instruction {
    pub fn length(&self) -> u32 {
        self.byte_length
    }

    /// The disassembly string for this instruction's kind (see
    /// `InstructionKind::disassembly`); diagnostics print this alongside
    /// `byte_length` rather than the raw opcode byte.
    pub fn disassembly(&self) -> String {
        self.kind.disassembly()
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.kind.disassembly())
    }
}
