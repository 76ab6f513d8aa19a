//! Dalvik instruction decoding.
//!
//! Bytecode is a stream of 16-bit code units, little-endian on disk. The low
//! byte of the first unit of an instruction is the opcode; the rest of the
//! encoding depends on the instruction format. Format names follow the Dalvik
//! specification (`11x`, `22c`, `35c`, ...).

use crate::error::DexError;

/// Instruction encoding formats, as named by the Dalvik specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    F10x,
    F12x,
    F11n,
    F11x,
    F10t,
    F20t,
    F22x,
    F21t,
    F21s,
    F21h,
    F21c,
    F23x,
    F22b,
    F22t,
    F22s,
    F22c,
    F32x,
    F30t,
    F31t,
    F31i,
    F31c,
    F35c,
    F3rc,
    F51l,
    /// The payload pseudo-instructions have data-dependent lengths.
    Payload,
}

impl Format {
    /// Fixed length in code units. Payload lengths are data-dependent and
    /// computed during decode.
    fn units(&self) -> usize {
        match self {
            Format::F10x | Format::F12x | Format::F11n | Format::F11x | Format::F10t => 1,
            Format::F20t
            | Format::F22x
            | Format::F21t
            | Format::F21s
            | Format::F21h
            | Format::F21c
            | Format::F23x
            | Format::F22b
            | Format::F22t
            | Format::F22s
            | Format::F22c => 2,
            Format::F32x
            | Format::F30t
            | Format::F31t
            | Format::F31i
            | Format::F31c
            | Format::F35c
            | Format::F3rc => 3,
            Format::F51l => 5,
            Format::Payload => 0,
        }
    }
}

macro_rules! opcode_table {
    ( $( $value:literal => $name:ident, $mnemonic:literal, $format:ident; )* ) => {
        /// Every standard (non-odex) Dalvik opcode, plus the three payload
        /// pseudo-instructions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $name, )*
            PackedSwitchPayload,
            SparseSwitchPayload,
            FillArrayDataPayload,
        }

        impl Opcode {
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $value => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                    Opcode::PackedSwitchPayload => "packed-switch-payload",
                    Opcode::SparseSwitchPayload => "sparse-switch-payload",
                    Opcode::FillArrayDataPayload => "array-data-payload",
                }
            }

            pub fn format(&self) -> Format {
                match self {
                    $( Opcode::$name => Format::$format, )*
                    Opcode::PackedSwitchPayload
                    | Opcode::SparseSwitchPayload
                    | Opcode::FillArrayDataPayload => Format::Payload,
                }
            }
        }
    };
}

opcode_table! {
    0x00 => Nop, "nop", F10x;
    0x01 => Move, "move", F12x;
    0x02 => MoveFrom16, "move/from16", F22x;
    0x03 => Move16, "move/16", F32x;
    0x04 => MoveWide, "move-wide", F12x;
    0x05 => MoveWideFrom16, "move-wide/from16", F22x;
    0x06 => MoveWide16, "move-wide/16", F32x;
    0x07 => MoveObject, "move-object", F12x;
    0x08 => MoveObjectFrom16, "move-object/from16", F22x;
    0x09 => MoveObject16, "move-object/16", F32x;
    0x0a => MoveResult, "move-result", F11x;
    0x0b => MoveResultWide, "move-result-wide", F11x;
    0x0c => MoveResultObject, "move-result-object", F11x;
    0x0d => MoveException, "move-exception", F11x;
    0x0e => ReturnVoid, "return-void", F10x;
    0x0f => Return, "return", F11x;
    0x10 => ReturnWide, "return-wide", F11x;
    0x11 => ReturnObject, "return-object", F11x;
    0x12 => Const4, "const/4", F11n;
    0x13 => Const16, "const/16", F21s;
    0x14 => Const, "const", F31i;
    0x15 => ConstHigh16, "const/high16", F21h;
    0x16 => ConstWide16, "const-wide/16", F21s;
    0x17 => ConstWide32, "const-wide/32", F31i;
    0x18 => ConstWide, "const-wide", F51l;
    0x19 => ConstWideHigh16, "const-wide/high16", F21h;
    0x1a => ConstString, "const-string", F21c;
    0x1b => ConstStringJumbo, "const-string/jumbo", F31c;
    0x1c => ConstClass, "const-class", F21c;
    0x1d => MonitorEnter, "monitor-enter", F11x;
    0x1e => MonitorExit, "monitor-exit", F11x;
    0x1f => CheckCast, "check-cast", F21c;
    0x20 => InstanceOf, "instance-of", F22c;
    0x21 => ArrayLength, "array-length", F12x;
    0x22 => NewInstance, "new-instance", F21c;
    0x23 => NewArray, "new-array", F22c;
    0x24 => FilledNewArray, "filled-new-array", F35c;
    0x25 => FilledNewArrayRange, "filled-new-array/range", F3rc;
    0x26 => FillArrayData, "fill-array-data", F31t;
    0x27 => Throw, "throw", F11x;
    0x28 => Goto, "goto", F10t;
    0x29 => Goto16, "goto/16", F20t;
    0x2a => Goto32, "goto/32", F30t;
    0x2b => PackedSwitch, "packed-switch", F31t;
    0x2c => SparseSwitch, "sparse-switch", F31t;
    0x2d => CmplFloat, "cmpl-float", F23x;
    0x2e => CmpgFloat, "cmpg-float", F23x;
    0x2f => CmplDouble, "cmpl-double", F23x;
    0x30 => CmpgDouble, "cmpg-double", F23x;
    0x31 => CmpLong, "cmp-long", F23x;
    0x32 => IfEq, "if-eq", F22t;
    0x33 => IfNe, "if-ne", F22t;
    0x34 => IfLt, "if-lt", F22t;
    0x35 => IfGe, "if-ge", F22t;
    0x36 => IfGt, "if-gt", F22t;
    0x37 => IfLe, "if-le", F22t;
    0x38 => IfEqz, "if-eqz", F21t;
    0x39 => IfNez, "if-nez", F21t;
    0x3a => IfLtz, "if-ltz", F21t;
    0x3b => IfGez, "if-gez", F21t;
    0x3c => IfGtz, "if-gtz", F21t;
    0x3d => IfLez, "if-lez", F21t;
    0x44 => Aget, "aget", F23x;
    0x45 => AgetWide, "aget-wide", F23x;
    0x46 => AgetObject, "aget-object", F23x;
    0x47 => AgetBoolean, "aget-boolean", F23x;
    0x48 => AgetByte, "aget-byte", F23x;
    0x49 => AgetChar, "aget-char", F23x;
    0x4a => AgetShort, "aget-short", F23x;
    0x4b => Aput, "aput", F23x;
    0x4c => AputWide, "aput-wide", F23x;
    0x4d => AputObject, "aput-object", F23x;
    0x4e => AputBoolean, "aput-boolean", F23x;
    0x4f => AputByte, "aput-byte", F23x;
    0x50 => AputChar, "aput-char", F23x;
    0x51 => AputShort, "aput-short", F23x;
    0x52 => Iget, "iget", F22c;
    0x53 => IgetWide, "iget-wide", F22c;
    0x54 => IgetObject, "iget-object", F22c;
    0x55 => IgetBoolean, "iget-boolean", F22c;
    0x56 => IgetByte, "iget-byte", F22c;
    0x57 => IgetChar, "iget-char", F22c;
    0x58 => IgetShort, "iget-short", F22c;
    0x59 => Iput, "iput", F22c;
    0x5a => IputWide, "iput-wide", F22c;
    0x5b => IputObject, "iput-object", F22c;
    0x5c => IputBoolean, "iput-boolean", F22c;
    0x5d => IputByte, "iput-byte", F22c;
    0x5e => IputChar, "iput-char", F22c;
    0x5f => IputShort, "iput-short", F22c;
    0x60 => Sget, "sget", F21c;
    0x61 => SgetWide, "sget-wide", F21c;
    0x62 => SgetObject, "sget-object", F21c;
    0x63 => SgetBoolean, "sget-boolean", F21c;
    0x64 => SgetByte, "sget-byte", F21c;
    0x65 => SgetChar, "sget-char", F21c;
    0x66 => SgetShort, "sget-short", F21c;
    0x67 => Sput, "sput", F21c;
    0x68 => SputWide, "sput-wide", F21c;
    0x69 => SputObject, "sput-object", F21c;
    0x6a => SputBoolean, "sput-boolean", F21c;
    0x6b => SputByte, "sput-byte", F21c;
    0x6c => SputChar, "sput-char", F21c;
    0x6d => SputShort, "sput-short", F21c;
    0x6e => InvokeVirtual, "invoke-virtual", F35c;
    0x6f => InvokeSuper, "invoke-super", F35c;
    0x70 => InvokeDirect, "invoke-direct", F35c;
    0x71 => InvokeStatic, "invoke-static", F35c;
    0x72 => InvokeInterface, "invoke-interface", F35c;
    0x74 => InvokeVirtualRange, "invoke-virtual/range", F3rc;
    0x75 => InvokeSuperRange, "invoke-super/range", F3rc;
    0x76 => InvokeDirectRange, "invoke-direct/range", F3rc;
    0x77 => InvokeStaticRange, "invoke-static/range", F3rc;
    0x78 => InvokeInterfaceRange, "invoke-interface/range", F3rc;
    0x7b => NegInt, "neg-int", F12x;
    0x7c => NotInt, "not-int", F12x;
    0x7d => NegLong, "neg-long", F12x;
    0x7e => NotLong, "not-long", F12x;
    0x7f => NegFloat, "neg-float", F12x;
    0x80 => NegDouble, "neg-double", F12x;
    0x81 => IntToLong, "int-to-long", F12x;
    0x82 => IntToFloat, "int-to-float", F12x;
    0x83 => IntToDouble, "int-to-double", F12x;
    0x84 => LongToInt, "long-to-int", F12x;
    0x85 => LongToFloat, "long-to-float", F12x;
    0x86 => LongToDouble, "long-to-double", F12x;
    0x87 => FloatToInt, "float-to-int", F12x;
    0x88 => FloatToLong, "float-to-long", F12x;
    0x89 => FloatToDouble, "float-to-double", F12x;
    0x8a => DoubleToInt, "double-to-int", F12x;
    0x8b => DoubleToLong, "double-to-long", F12x;
    0x8c => DoubleToFloat, "double-to-float", F12x;
    0x8d => IntToByte, "int-to-byte", F12x;
    0x8e => IntToChar, "int-to-char", F12x;
    0x8f => IntToShort, "int-to-short", F12x;
    0x90 => AddInt, "add-int", F23x;
    0x91 => SubInt, "sub-int", F23x;
    0x92 => MulInt, "mul-int", F23x;
    0x93 => DivInt, "div-int", F23x;
    0x94 => RemInt, "rem-int", F23x;
    0x95 => AndInt, "and-int", F23x;
    0x96 => OrInt, "or-int", F23x;
    0x97 => XorInt, "xor-int", F23x;
    0x98 => ShlInt, "shl-int", F23x;
    0x99 => ShrInt, "shr-int", F23x;
    0x9a => UshrInt, "ushr-int", F23x;
    0x9b => AddLong, "add-long", F23x;
    0x9c => SubLong, "sub-long", F23x;
    0x9d => MulLong, "mul-long", F23x;
    0x9e => DivLong, "div-long", F23x;
    0x9f => RemLong, "rem-long", F23x;
    0xa0 => AndLong, "and-long", F23x;
    0xa1 => OrLong, "or-long", F23x;
    0xa2 => XorLong, "xor-long", F23x;
    0xa3 => ShlLong, "shl-long", F23x;
    0xa4 => ShrLong, "shr-long", F23x;
    0xa5 => UshrLong, "ushr-long", F23x;
    0xa6 => AddFloat, "add-float", F23x;
    0xa7 => SubFloat, "sub-float", F23x;
    0xa8 => MulFloat, "mul-float", F23x;
    0xa9 => DivFloat, "div-float", F23x;
    0xaa => RemFloat, "rem-float", F23x;
    0xab => AddDouble, "add-double", F23x;
    0xac => SubDouble, "sub-double", F23x;
    0xad => MulDouble, "mul-double", F23x;
    0xae => DivDouble, "div-double", F23x;
    0xaf => RemDouble, "rem-double", F23x;
    0xb0 => AddInt2addr, "add-int/2addr", F12x;
    0xb1 => SubInt2addr, "sub-int/2addr", F12x;
    0xb2 => MulInt2addr, "mul-int/2addr", F12x;
    0xb3 => DivInt2addr, "div-int/2addr", F12x;
    0xb4 => RemInt2addr, "rem-int/2addr", F12x;
    0xb5 => AndInt2addr, "and-int/2addr", F12x;
    0xb6 => OrInt2addr, "or-int/2addr", F12x;
    0xb7 => XorInt2addr, "xor-int/2addr", F12x;
    0xb8 => ShlInt2addr, "shl-int/2addr", F12x;
    0xb9 => ShrInt2addr, "shr-int/2addr", F12x;
    0xba => UshrInt2addr, "ushr-int/2addr", F12x;
    0xbb => AddLong2addr, "add-long/2addr", F12x;
    0xbc => SubLong2addr, "sub-long/2addr", F12x;
    0xbd => MulLong2addr, "mul-long/2addr", F12x;
    0xbe => DivLong2addr, "div-long/2addr", F12x;
    0xbf => RemLong2addr, "rem-long/2addr", F12x;
    0xc0 => AndLong2addr, "and-long/2addr", F12x;
    0xc1 => OrLong2addr, "or-long/2addr", F12x;
    0xc2 => XorLong2addr, "xor-long/2addr", F12x;
    0xc3 => ShlLong2addr, "shl-long/2addr", F12x;
    0xc4 => ShrLong2addr, "shr-long/2addr", F12x;
    0xc5 => UshrLong2addr, "ushr-long/2addr", F12x;
    0xc6 => AddFloat2addr, "add-float/2addr", F12x;
    0xc7 => SubFloat2addr, "sub-float/2addr", F12x;
    0xc8 => MulFloat2addr, "mul-float/2addr", F12x;
    0xc9 => DivFloat2addr, "div-float/2addr", F12x;
    0xca => RemFloat2addr, "rem-float/2addr", F12x;
    0xcb => AddDouble2addr, "add-double/2addr", F12x;
    0xcc => SubDouble2addr, "sub-double/2addr", F12x;
    0xcd => MulDouble2addr, "mul-double/2addr", F12x;
    0xce => DivDouble2addr, "div-double/2addr", F12x;
    0xcf => RemDouble2addr, "rem-double/2addr", F12x;
    0xd0 => AddIntLit16, "add-int/lit16", F22s;
    0xd1 => RsubInt, "rsub-int", F22s;
    0xd2 => MulIntLit16, "mul-int/lit16", F22s;
    0xd3 => DivIntLit16, "div-int/lit16", F22s;
    0xd4 => RemIntLit16, "rem-int/lit16", F22s;
    0xd5 => AndIntLit16, "and-int/lit16", F22s;
    0xd6 => OrIntLit16, "or-int/lit16", F22s;
    0xd7 => XorIntLit16, "xor-int/lit16", F22s;
    0xd8 => AddIntLit8, "add-int/lit8", F22b;
    0xd9 => RsubIntLit8, "rsub-int/lit8", F22b;
    0xda => MulIntLit8, "mul-int/lit8", F22b;
    0xdb => DivIntLit8, "div-int/lit8", F22b;
    0xdc => RemIntLit8, "rem-int/lit8", F22b;
    0xdd => AndIntLit8, "and-int/lit8", F22b;
    0xde => OrIntLit8, "or-int/lit8", F22b;
    0xdf => XorIntLit8, "xor-int/lit8", F22b;
    0xe0 => ShlIntLit8, "shl-int/lit8", F22b;
    0xe1 => ShrIntLit8, "shr-int/lit8", F22b;
    0xe2 => UshrIntLit8, "ushr-int/lit8", F22b;
}

/// The payload identifier code units. Each is a `nop` (low byte `0x00`) with
/// a distinguishing high byte.
const PACKED_SWITCH_IDENT: u16 = 0x0100;
const SPARSE_SWITCH_IDENT: u16 = 0x0200;
const FILL_ARRAY_IDENT: u16 = 0x0300;

/// Decoded operands, grouped by shape rather than by format so that handlers
/// can match on meaning. Literals are pre-sign-extended and `high16` shifts
/// are already applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    Empty,
    /// 11x
    Reg { a: u8 },
    /// 12x
    PairNib { a: u8, b: u8 },
    /// 22x / 32x
    RegPair { a: u16, b: u16 },
    /// 23x
    Triple { a: u8, b: u8, c: u8 },
    /// 11n / 21s / 21h / 31i / 51l
    RegLit { a: u8, lit: i64 },
    /// 22s / 22b
    RegRegLit { a: u8, b: u8, lit: i32 },
    /// 10t / 20t / 30t
    Branch { off: i32 },
    /// 21t / 31t
    RegBranch { a: u8, off: i32 },
    /// 22t
    PairBranch { a: u8, b: u8, off: i32 },
    /// 21c / 31c
    RegIdx { a: u8, idx: u32 },
    /// 22c
    PairIdx { a: u8, b: u8, idx: u16 },
    /// 35c
    Call { args: Vec<u8>, idx: u16 },
    /// 3rc
    CallRange { first: u16, count: u8, idx: u16 },
    PackedSwitch { first_key: i32, targets: Vec<i32> },
    SparseSwitch { keys: Vec<i32>, targets: Vec<i32> },
    FillArray { width: u16, data: Vec<u8> },
}

/// One decoded instruction. `len` is the instruction's length in code units,
/// which is also how far `pc` advances on fall-through.
#[derive(Debug, Clone, PartialEq)]
pub struct Ins {
    pub op: Opcode,
    pub operands: Operands,
    pub len: usize,
}

/// The five invocation kinds. `/range` forms map onto the same kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    pub fn has_receiver(&self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

fn unit_at(units: &[u16], pc: usize, at: usize) -> Result<u16, DexError> {
    units
        .get(at)
        .copied()
        .ok_or(DexError::Truncated(pc, at - pc + 1))
}

fn i32_at(units: &[u16], pc: usize, at: usize) -> Result<i32, DexError> {
    let lo = unit_at(units, pc, at)? as u32;
    let hi = unit_at(units, pc, at + 1)? as u32;
    Ok((lo | (hi << 16)) as i32)
}

fn decode_payload(units: &[u16], pc: usize, ident: u16) -> Result<Ins, DexError> {
    match ident {
        PACKED_SWITCH_IDENT => {
            let size = unit_at(units, pc, pc + 1)? as usize;
            let first_key = i32_at(units, pc, pc + 2)?;
            let mut targets = Vec::with_capacity(size);
            for i in 0..size {
                targets.push(i32_at(units, pc, pc + 4 + i * 2)?);
            }

            Ok(Ins {
                op: Opcode::PackedSwitchPayload,
                operands: Operands::PackedSwitch { first_key, targets },
                len: size * 2 + 4,
            })
        }
        SPARSE_SWITCH_IDENT => {
            let size = unit_at(units, pc, pc + 1)? as usize;
            let mut keys = Vec::with_capacity(size);
            let mut targets = Vec::with_capacity(size);
            for i in 0..size {
                keys.push(i32_at(units, pc, pc + 2 + i * 2)?);
            }
            for i in 0..size {
                targets.push(i32_at(units, pc, pc + 2 + size * 2 + i * 2)?);
            }

            Ok(Ins {
                op: Opcode::SparseSwitchPayload,
                operands: Operands::SparseSwitch { keys, targets },
                len: size * 4 + 2,
            })
        }
        FILL_ARRAY_IDENT => {
            let width = unit_at(units, pc, pc + 1)?;
            let size = i32_at(units, pc, pc + 2)? as u32;
            let byte_len = (width as usize)
                .checked_mul(size as usize)
                .ok_or(DexError::MalformedPayload(pc))?;
            let data_units = (byte_len + 1) / 2;

            let mut data = Vec::with_capacity(byte_len);
            for i in 0..data_units {
                let unit = unit_at(units, pc, pc + 4 + i)?;
                data.push((unit & 0xff) as u8);
                data.push((unit >> 8) as u8);
            }
            data.truncate(byte_len);

            Ok(Ins {
                op: Opcode::FillArrayDataPayload,
                operands: Operands::FillArray { width, data },
                len: data_units + 4,
            })
        }
        _ => Err(DexError::MalformedPayload(pc)),
    }
}

/// Decode the instruction at `pc`. Payload pseudo-instructions decode like
/// any other instruction; it is the caller's business not to fall into them.
pub fn decode(units: &[u16], pc: usize) -> Result<Ins, DexError> {
    let first = *units.get(pc).ok_or(DexError::PcOutOfRange(pc, units.len()))?;

    if matches!(
        first,
        PACKED_SWITCH_IDENT | SPARSE_SWITCH_IDENT | FILL_ARRAY_IDENT
    ) {
        return decode_payload(units, pc, first);
    }

    let byte = (first & 0xff) as u8;
    let hi = (first >> 8) as u8;

    let op = Opcode::from_byte(byte).ok_or(DexError::UnknownOpcode(byte, pc))?;
    let format = op.format();
    let len = format.units();

    if pc + len > units.len() {
        return Err(DexError::Truncated(pc, len));
    }

    let operands = match format {
        Format::F10x => Operands::Empty,
        Format::F11x => Operands::Reg { a: hi },
        Format::F12x => Operands::PairNib {
            a: hi & 0xf,
            b: hi >> 4,
        },
        Format::F11n => {
            // Sign-extend the nibble literal
            let nib = ((hi >> 4) as i8) << 4 >> 4;
            Operands::RegLit {
                a: hi & 0xf,
                lit: nib as i64,
            }
        }
        Format::F10t => Operands::Branch {
            off: (hi as i8) as i32,
        },
        Format::F20t => Operands::Branch {
            off: (units[pc + 1] as i16) as i32,
        },
        Format::F30t => Operands::Branch {
            off: i32_at(units, pc, pc + 1)?,
        },
        Format::F22x => Operands::RegPair {
            a: hi as u16,
            b: units[pc + 1],
        },
        Format::F32x => Operands::RegPair {
            a: units[pc + 1],
            b: units[pc + 2],
        },
        Format::F21t => Operands::RegBranch {
            a: hi,
            off: (units[pc + 1] as i16) as i32,
        },
        Format::F31t => Operands::RegBranch {
            a: hi,
            off: i32_at(units, pc, pc + 1)?,
        },
        Format::F21s => Operands::RegLit {
            a: hi,
            lit: (units[pc + 1] as i16) as i64,
        },
        Format::F21h => {
            let shift = if op == Opcode::ConstWideHigh16 { 48 } else { 16 };
            Operands::RegLit {
                a: hi,
                lit: ((units[pc + 1] as i16) as i64) << shift,
            }
        }
        Format::F31i => Operands::RegLit {
            a: hi,
            lit: i32_at(units, pc, pc + 1)? as i64,
        },
        Format::F51l => {
            let mut lit = 0u64;
            for i in 0..4 {
                lit |= (units[pc + 1 + i] as u64) << (16 * i);
            }
            Operands::RegLit {
                a: hi,
                lit: lit as i64,
            }
        }
        Format::F21c => Operands::RegIdx {
            a: hi,
            idx: units[pc + 1] as u32,
        },
        Format::F31c => Operands::RegIdx {
            a: hi,
            idx: i32_at(units, pc, pc + 1)? as u32,
        },
        Format::F23x => {
            let unit = units[pc + 1];
            Operands::Triple {
                a: hi,
                b: (unit & 0xff) as u8,
                c: (unit >> 8) as u8,
            }
        }
        Format::F22b => {
            let unit = units[pc + 1];
            Operands::RegRegLit {
                a: hi,
                b: (unit & 0xff) as u8,
                lit: ((unit >> 8) as u8 as i8) as i32,
            }
        }
        Format::F22t => Operands::PairBranch {
            a: hi & 0xf,
            b: hi >> 4,
            off: (units[pc + 1] as i16) as i32,
        },
        Format::F22s => Operands::RegRegLit {
            a: hi & 0xf,
            b: hi >> 4,
            lit: (units[pc + 1] as i16) as i32,
        },
        Format::F22c => Operands::PairIdx {
            a: hi & 0xf,
            b: hi >> 4,
            idx: units[pc + 1],
        },
        Format::F35c => {
            let count = (hi >> 4) as usize;
            let g = hi & 0xf;
            let idx = units[pc + 1];
            let regs = units[pc + 2];
            let nibbles = [
                (regs & 0xf) as u8,
                ((regs >> 4) & 0xf) as u8,
                ((regs >> 8) & 0xf) as u8,
                ((regs >> 12) & 0xf) as u8,
                g,
            ];
            if count > 5 {
                return Err(DexError::MalformedPayload(pc));
            }

            Operands::Call {
                args: nibbles[..count].to_vec(),
                idx,
            }
        }
        Format::F3rc => Operands::CallRange {
            first: units[pc + 2],
            count: hi,
            idx: units[pc + 1],
        },
        Format::Payload => unreachable!("payloads are decoded by ident"),
    };

    Ok(Ins { op, operands, len })
}

impl Ins {
    /// The register this instruction defines, if any, along with whether the
    /// value is wide (occupying the pair `(reg, reg + 1)`). Used by the
    /// data-flow analyzers to find the nearest write.
    pub fn written_register(&self) -> Option<(u16, bool)> {
        use Opcode::*;

        let wide = matches!(
            self.op,
            MoveWide
                | MoveWideFrom16
                | MoveWide16
                | MoveResultWide
                | ConstWide16
                | ConstWide32
                | ConstWide
                | ConstWideHigh16
                | AgetWide
                | IgetWide
                | SgetWide
                | NegLong
                | NotLong
                | NegDouble
                | IntToLong
                | IntToDouble
                | LongToDouble
                | FloatToLong
                | FloatToDouble
                | DoubleToLong
                | AddLong
                | SubLong
                | MulLong
                | DivLong
                | RemLong
                | AndLong
                | OrLong
                | XorLong
                | ShlLong
                | ShrLong
                | UshrLong
                | AddDouble
                | SubDouble
                | MulDouble
                | DivDouble
                | RemDouble
                | AddLong2addr
                | SubLong2addr
                | MulLong2addr
                | DivLong2addr
                | RemLong2addr
                | AndLong2addr
                | OrLong2addr
                | XorLong2addr
                | ShlLong2addr
                | ShrLong2addr
                | UshrLong2addr
                | AddDouble2addr
                | SubDouble2addr
                | MulDouble2addr
                | DivDouble2addr
                | RemDouble2addr
        );

        let dst = match (&self.op, &self.operands) {
            // Stores, branches, invokes, returns and friends define nothing
            (
                Nop | ReturnVoid | Return | ReturnWide | ReturnObject | MonitorEnter | MonitorExit
                | CheckCast | Throw | Goto | Goto16 | Goto32 | PackedSwitch | SparseSwitch
                | FillArrayData | FilledNewArray | FilledNewArrayRange | PackedSwitchPayload
                | SparseSwitchPayload | FillArrayDataPayload,
                _,
            ) => None,
            (Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar | AputShort, _) => {
                None
            }
            (Iput | IputWide | IputObject | IputBoolean | IputByte | IputChar | IputShort, _) => {
                None
            }
            (Sput | SputWide | SputObject | SputBoolean | SputByte | SputChar | SputShort, _) => {
                None
            }
            (
                InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface
                | InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange | InvokeStaticRange
                | InvokeInterfaceRange,
                _,
            ) => None,
            (
                IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfEqz | IfNez | IfLtz | IfGez | IfGtz
                | IfLez,
                _,
            ) => None,

            (_, Operands::Reg { a }) => Some(*a as u16),
            (_, Operands::PairNib { a, .. }) => Some(*a as u16),
            (_, Operands::RegPair { a, .. }) => Some(*a),
            (_, Operands::Triple { a, .. }) => Some(*a as u16),
            (_, Operands::RegLit { a, .. }) => Some(*a as u16),
            (_, Operands::RegRegLit { a, .. }) => Some(*a as u16),
            (_, Operands::RegIdx { a, .. }) => Some(*a as u16),
            (_, Operands::PairIdx { a, .. }) => Some(*a as u16),
            _ => None,
        };

        dst.map(|d| (d, wide))
    }

    pub fn invoke_kind(&self) -> Option<InvokeKind> {
        use Opcode::*;
        match self.op {
            InvokeVirtual | InvokeVirtualRange => Some(InvokeKind::Virtual),
            InvokeSuper | InvokeSuperRange => Some(InvokeKind::Super),
            InvokeDirect | InvokeDirectRange => Some(InvokeKind::Direct),
            InvokeStatic | InvokeStaticRange => Some(InvokeKind::Static),
            InvokeInterface | InvokeInterfaceRange => Some(InvokeKind::Interface),
            _ => None,
        }
    }

    /// The method index of an invoke, if this is one.
    pub fn invoke_target(&self) -> Option<u16> {
        match (&self.invoke_kind(), &self.operands) {
            (Some(_), Operands::Call { idx, .. }) => Some(*idx),
            (Some(_), Operands::CallRange { idx, .. }) => Some(*idx),
            _ => None,
        }
    }

    /// Argument registers of an invoke, range forms expanded.
    pub fn invoke_args(&self) -> Option<Vec<u16>> {
        match (&self.invoke_kind(), &self.operands) {
            (Some(_), Operands::Call { args, .. }) => {
                Some(args.iter().map(|a| *a as u16).collect())
            }
            (Some(_), Operands::CallRange { first, count, .. }) => {
                Some((*first..*first + *count as u16).collect())
            }
            _ => None,
        }
    }

    /// True for instructions that unconditionally leave the current basic
    /// block. The forward analyzer stops scanning at these.
    pub fn ends_block(&self) -> bool {
        use Opcode::*;
        matches!(
            self.op,
            ReturnVoid | Return | ReturnWide | ReturnObject | Goto | Goto16 | Goto32 | Throw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_23x_binop() {
        // add-int v0, v1, v2
        let units = [0x0090, 0x0201];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.op, Opcode::AddInt);
        assert_eq!(ins.len, 2);
        assert_eq!(ins.operands, Operands::Triple { a: 0, b: 1, c: 2 });
    }

    #[test]
    fn decodes_nibble_literals_signed() {
        // const/4 v0, #-1
        let units = [0xf012];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.operands, Operands::RegLit { a: 0, lit: -1 });
    }

    #[test]
    fn decodes_const_high16() {
        // const/high16 v0, #0x41200000 (3.0f-ish bit pattern upper half)
        let units = [0x0015, 0x4120];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(
            ins.operands,
            Operands::RegLit {
                a: 0,
                lit: 0x4120_0000
            }
        );
    }

    #[test]
    fn decodes_const_wide_51l() {
        // const-wide v2, #0x0123456789abcdef
        let units = [0x0218, 0xcdef, 0x89ab, 0x4567, 0x0123];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.len, 5);
        assert_eq!(
            ins.operands,
            Operands::RegLit {
                a: 2,
                lit: 0x0123_4567_89ab_cdef
            }
        );
    }

    #[test]
    fn decodes_35c_invoke() {
        // invoke-static {v1, v2}, meth@7
        let units = [0x2071, 0x0007, 0x0021];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.op, Opcode::InvokeStatic);
        assert_eq!(ins.invoke_kind(), Some(InvokeKind::Static));
        assert_eq!(ins.invoke_args().unwrap(), vec![1, 2]);
        assert_eq!(ins.invoke_target(), Some(7));
    }

    #[test]
    fn decodes_3rc_invoke_window() {
        // invoke-virtual/range {v3 .. v6}, meth@2
        let units = [0x0474, 0x0002, 0x0003];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.invoke_args().unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn decodes_packed_switch_payload() {
        let units = [0x0100, 0x0002, 0x000a, 0x0000, 5, 0, 9, 0];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.len, 8);
        assert_eq!(
            ins.operands,
            Operands::PackedSwitch {
                first_key: 10,
                targets: vec![5, 9]
            }
        );
    }

    #[test]
    fn decodes_fill_array_payload() {
        // 3 bytes of width 1: data units rounded up
        let units = [0x0300, 0x0001, 0x0003, 0x0000, 0x2211, 0x0033];
        let ins = decode(&units, 0).unwrap();
        assert_eq!(ins.len, 6);
        assert_eq!(
            ins.operands,
            Operands::FillArray {
                width: 1,
                data: vec![0x11, 0x22, 0x33]
            }
        );
    }

    #[test]
    fn rejects_unknown_opcodes() {
        let units = [0x00ff];
        assert!(matches!(
            decode(&units, 0),
            Err(DexError::UnknownOpcode(0xff, 0))
        ));
    }

    #[test]
    fn rejects_truncated_instructions() {
        // const/16 needs a literal unit
        let units = [0x0013];
        assert!(matches!(decode(&units, 0), Err(DexError::Truncated(0, 2))));
    }

    #[test]
    fn every_decoded_length_is_nonzero() {
        for byte in 0x00..=0xe2u16 {
            if let Some(op) = Opcode::from_byte(byte as u8) {
                assert!(op.format().units() > 0, "{:?} has zero length", op);
            }
        }
    }
}
