//! A single parsed DEX container.
//!
//! Only the tables the emulator consumes are read: string / type / proto /
//! field / method ids, class defs, class data and code items. Map list,
//! annotations, debug info and static values are skipped, and checksums are
//! not verified; hostile containers routinely have bogus ones anyway.

use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use support::encoding::decode_mutf8;
use winnow::binary::{be_u32, le_u16, le_u32, u8};
use winnow::combinator::repeat;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_till;

use crate::code::{Ins, Operands, Opcode};
use crate::error::DexError;

/// The constant used to indicate that an index value is absent.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#no-index>
pub const NO_INDEX: u32 = u32::MAX;

/// Little-endian marker in the header's `endian_tag` field.
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// Byte-swapped marker. Parsed but rejected; big-endian containers do not
/// occur in practice.
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

bitflags! {
    /// Method access flags as stored in `encoded_method.access_flags`.
    pub struct MethodFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const BRIDGE = 0x40;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

#[derive(Debug, Clone)]
pub struct Proto {
    pub shorty_idx: u32,
    pub return_idx: u32,
    /// Type indices of the parameters, in order.
    pub params: Vec<u16>,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldId {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodId {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

/// Bytecode and register shape of one method body.
#[derive(Debug, Clone)]
pub struct CodeItem {
    pub registers: u16,
    /// How many of the registers are incoming parameter slots. Parameters
    /// occupy the *last* `ins` registers.
    pub ins: u16,
    pub outs: u16,
    pub units: Rc<[u16]>,
}

#[derive(Debug, Clone)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub flags: MethodFlags,
    pub code: Option<CodeItem>,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub type_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub methods: Vec<EncodedMethod>,
}

/// A resolved field reference, `Lcls;->name:Ltype;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// A resolved method reference with its canonical signature string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub class: String,
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
    pub signature: String,
}

impl MethodSig {
    /// The hook-registry key, `Lcls;->name`.
    pub fn key(&self) -> String {
        format!("{}->{}", self.class, self.name)
    }
}

#[derive(Debug)]
pub struct Container {
    pub strings: Vec<String>,
    /// String index of each type descriptor.
    pub types: Vec<u32>,
    pub protos: Vec<Proto>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub classes: Vec<ClassDef>,
}

struct RawHeader {
    string_ids_size: u32,
    string_ids_off: u32,
    type_ids_size: u32,
    type_ids_off: u32,
    proto_ids_size: u32,
    proto_ids_off: u32,
    field_ids_size: u32,
    field_ids_off: u32,
    method_ids_size: u32,
    method_ids_off: u32,
    class_defs_size: u32,
    class_defs_off: u32,
}

fn parse_header(input: &mut &[u8]) -> ModalResult<RawHeader> {
    // `dex\n035\0` and friends
    let (_, _, version, _) = (
        be_u32.verify(|magic| *magic == 0x6465_780A),
        u8.verify(|v| *v == 0x30),
        winnow::binary::be_u16,
        u8.verify(|v| *v == 0x00),
    )
        .parse_next(input)?;

    let _ = version;

    let (
        _checksum,
        _signature,
        _file_size,
        _header_size,
        _endian_tag,
        _link_size,
        _link_off,
        _map_off,
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        class_defs_size,
        class_defs_off,
    ) = (
        le_u32,
        winnow::token::take(20usize),
        le_u32,
        le_u32,
        le_u32.verify(|&tag| tag == ENDIAN_CONSTANT),
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32.verify(|&size| size <= u16::MAX.into()),
        le_u32,
        le_u32.verify(|&size| size <= u16::MAX.into()),
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
        le_u32,
    )
        .parse_next(input)?;

    Ok(RawHeader {
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        class_defs_size,
        class_defs_off,
    })
}

#[inline]
fn uleb128(input: &mut &[u8]) -> ModalResult<u32> {
    let mut val = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = u8.parse_next(input)?;
        let b = (byte & 0x7f) as u64;
        val |= b
            .checked_shl(shift)
            .ok_or(ErrMode::Cut(ContextError::new()))?;

        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok(val as u32)
}

fn seek(data: &[u8], off: u32) -> Result<&[u8], DexError> {
    data.get(off as usize..).ok_or(DexError::InvalidHeader)
}

fn parse_string_data(data: &[u8], off: u32) -> Result<String, DexError> {
    let mut input = seek(data, off)?;

    let _utf16_size = uleb128(&mut input).map_err(|_| DexError::StringError)?;
    let bytes = take_till::<_, _, ContextError>(0.., |b| b == 0)
        .parse_next(&mut input)
        .map_err(|_| DexError::StringError)?;

    Ok(decode_mutf8(bytes).into_owned())
}

fn parse_type_list(data: &[u8], off: u32) -> Result<Vec<u16>, DexError> {
    if off == 0 {
        return Ok(Vec::new());
    }

    let mut input = seek(data, off)?;
    let size = le_u32::<_, ContextError>
        .parse_next(&mut input)
        .map_err(|_| DexError::ProtoError)?;

    repeat::<_, _, Vec<u16>, ContextError, _>(size as usize, le_u16)
        .parse_next(&mut input)
        .map_err(|_| DexError::ProtoError)
}

fn parse_code_item(data: &[u8], off: u32) -> Result<CodeItem, DexError> {
    let mut input = seek(data, off)?;
    let err = || DexError::CodeError(off);

    let (registers, ins, outs, _tries, _debug_off, insns_size) =
        (le_u16, le_u16, le_u16, le_u16, le_u32, le_u32)
            .parse_next(&mut input)
            .map_err(|_: ErrMode<ContextError>| err())?;

    let units: Vec<u16> = repeat::<_, _, Vec<u16>, ContextError, _>(insns_size as usize, le_u16)
        .parse_next(&mut input)
        .map_err(|_| err())?;

    Ok(CodeItem {
        registers,
        ins,
        outs,
        units: units.into(),
    })
}

fn parse_class_data(data: &[u8], off: u32) -> Result<Vec<EncodedMethod>, DexError> {
    let mut input = seek(data, off)?;
    let err = || DexError::ClassDataError(off);

    let static_fields = uleb128(&mut input).map_err(|_| err())?;
    let instance_fields = uleb128(&mut input).map_err(|_| err())?;
    let direct_methods = uleb128(&mut input).map_err(|_| err())?;
    let virtual_methods = uleb128(&mut input).map_err(|_| err())?;

    // Fields are (idx_diff, access_flags) uleb pairs; the emulator resolves
    // fields through field_ids, so the encoded list is skipped.
    for _ in 0..(static_fields + instance_fields) * 2 {
        uleb128(&mut input).map_err(|_| err())?;
    }

    let mut methods = Vec::with_capacity((direct_methods + virtual_methods) as usize);
    for count in [direct_methods, virtual_methods] {
        let mut method_idx = 0u32;
        for _ in 0..count {
            let idx_diff = uleb128(&mut input).map_err(|_| err())?;
            let flags = uleb128(&mut input).map_err(|_| err())?;
            let code_off = uleb128(&mut input).map_err(|_| err())?;

            method_idx = method_idx.wrapping_add(idx_diff);

            let code = if code_off != 0 {
                Some(parse_code_item(data, code_off)?)
            } else {
                None
            };

            methods.push(EncodedMethod {
                method_idx,
                flags: MethodFlags::from_bits_truncate(flags),
                code,
            });
        }
    }

    Ok(methods)
}

impl Container {
    /// Parse a raw `classes.dex` byte stream.
    pub fn parse(data: &[u8]) -> Result<Container, DexError> {
        let header = {
            let mut input = data;
            parse_header(&mut input).map_err(|_| DexError::InvalidHeader)?
        };

        let string_offsets: Vec<u32> = {
            let mut input = seek(data, header.string_ids_off)?;
            repeat::<_, _, Vec<u32>, ContextError, _>(header.string_ids_size as usize, le_u32)
                .parse_next(&mut input)
                .map_err(|_| DexError::StringError)?
        };

        let strings = string_offsets
            .iter()
            .map(|off| parse_string_data(data, *off))
            .collect::<Result<Vec<_>, _>>()?;

        let types: Vec<u32> = {
            let mut input = seek(data, header.type_ids_off)?;
            repeat::<_, _, Vec<u32>, ContextError, _>(header.type_ids_size as usize, le_u32)
                .parse_next(&mut input)
                .map_err(|_| DexError::TypeError)?
        };

        let raw_protos: Vec<(u32, u32, u32)> = {
            let mut input = seek(data, header.proto_ids_off)?;
            repeat::<_, _, Vec<_>, ContextError, _>(
                header.proto_ids_size as usize,
                (le_u32, le_u32, le_u32),
            )
            .parse_next(&mut input)
            .map_err(|_| DexError::ProtoError)?
        };

        let protos = raw_protos
            .into_iter()
            .map(|(shorty_idx, return_idx, params_off)| {
                Ok(Proto {
                    shorty_idx,
                    return_idx,
                    params: parse_type_list(data, params_off)?,
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?;

        let fields: Vec<FieldId> = {
            let mut input = seek(data, header.field_ids_off)?;
            repeat::<_, _, Vec<_>, ContextError, _>(
                header.field_ids_size as usize,
                (le_u16, le_u16, le_u32),
            )
            .parse_next(&mut input)
            .map_err(|_| DexError::FieldError)?
            .into_iter()
            .map(|(class_idx, type_idx, name_idx)| FieldId {
                class_idx,
                type_idx,
                name_idx,
            })
            .collect()
        };

        let methods: Vec<MethodId> = {
            let mut input = seek(data, header.method_ids_off)?;
            repeat::<_, _, Vec<_>, ContextError, _>(
                header.method_ids_size as usize,
                (le_u16, le_u16, le_u32),
            )
            .parse_next(&mut input)
            .map_err(|_| DexError::MethodError)?
            .into_iter()
            .map(|(class_idx, proto_idx, name_idx)| MethodId {
                class_idx,
                proto_idx,
                name_idx,
            })
            .collect()
        };

        let raw_classes: Vec<Vec<u32>> = {
            let mut input = seek(data, header.class_defs_off)?;
            repeat::<_, _, Vec<_>, ContextError, _>(
                header.class_defs_size as usize,
                repeat::<_, _, Vec<u32>, ContextError, _>(8, le_u32),
            )
            .parse_next(&mut input)
            .map_err(|_| DexError::ClassError)?
        };

        let classes = raw_classes
            .into_iter()
            .map(|def| {
                let class_data_off = def[6];
                let methods = if class_data_off != 0 {
                    parse_class_data(data, class_data_off)?
                } else {
                    Vec::new()
                };

                Ok(ClassDef {
                    type_idx: def[0],
                    access_flags: def[1],
                    superclass_idx: def[2],
                    methods,
                })
            })
            .collect::<Result<Vec<_>, DexError>>()?;

        Ok(Container {
            strings,
            types,
            protos,
            fields,
            methods,
            classes,
        })
    }

    pub fn string(&self, idx: u32) -> Result<&str, DexError> {
        self.strings
            .get(idx as usize)
            .map(|s| s.as_str())
            .ok_or(DexError::BadStringIndex(idx))
    }

    pub fn type_desc(&self, idx: u32) -> Result<&str, DexError> {
        let string_idx = *self
            .types
            .get(idx as usize)
            .ok_or(DexError::BadTypeIndex(idx))?;
        self.string(string_idx)
    }

    pub fn field_ref(&self, idx: u32) -> Result<FieldRef, DexError> {
        let field = self
            .fields
            .get(idx as usize)
            .ok_or(DexError::BadFieldIndex(idx))?;

        Ok(FieldRef {
            class: self.type_desc(field.class_idx as u32)?.to_string(),
            name: self.string(field.name_idx)?.to_string(),
            descriptor: self.type_desc(field.type_idx as u32)?.to_string(),
        })
    }

    pub fn method_sig(&self, idx: u32) -> Result<MethodSig, DexError> {
        let method = self
            .methods
            .get(idx as usize)
            .ok_or(DexError::BadMethodIndex(idx))?;

        let proto = self
            .protos
            .get(method.proto_idx as usize)
            .ok_or(DexError::BadMethodIndex(idx))?;

        let class = self.type_desc(method.class_idx as u32)?.to_string();
        let name = self.string(method.name_idx)?.to_string();
        let params = proto
            .params
            .iter()
            .map(|p| self.type_desc(*p as u32).map(|s| s.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = self.type_desc(proto.return_idx)?.to_string();

        let signature = format!(
            "{}->{}({}){}",
            class,
            name,
            params.concat(),
            return_type
        );

        Ok(MethodSig {
            class,
            name,
            params,
            return_type,
            signature,
        })
    }

    /// Render one decoded instruction in baksmali style. Never fails; broken
    /// indices render as `kind@idx` so hostile containers still disassemble.
    pub fn disassemble(&self, ins: &Ins) -> String {
        let m = ins.op.mnemonic();

        let string_at = |idx: u32| {
            self.string(idx)
                .map(|s| format!("\"{}\"", escape(s)))
                .unwrap_or_else(|_| format!("string@{idx}"))
        };
        let type_at = |idx: u32| {
            self.type_desc(idx)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| format!("type@{idx}"))
        };
        let field_at = |idx: u32| {
            self.field_ref(idx)
                .map(|f| format!("{}->{}:{}", f.class, f.name, f.descriptor))
                .unwrap_or_else(|_| format!("field@{idx}"))
        };
        let method_at = |idx: u32| {
            self.method_sig(idx)
                .map(|s| s.signature)
                .unwrap_or_else(|_| format!("method@{idx}"))
        };

        let idx_operand = |idx: u32| match ins.op {
            Opcode::ConstString | Opcode::ConstStringJumbo => string_at(idx),
            Opcode::ConstClass
            | Opcode::CheckCast
            | Opcode::NewInstance
            | Opcode::InstanceOf
            | Opcode::NewArray
            | Opcode::FilledNewArray
            | Opcode::FilledNewArrayRange => type_at(idx),
            op if op.mnemonic().starts_with("sget")
                || op.mnemonic().starts_with("sput")
                || op.mnemonic().starts_with("iget")
                || op.mnemonic().starts_with("iput") =>
            {
                field_at(idx)
            }
            _ => method_at(idx),
        };

        match &ins.operands {
            Operands::Empty => m.to_string(),
            Operands::Reg { a } => format!("{m} v{a}"),
            Operands::PairNib { a, b } => format!("{m} v{a}, v{b}"),
            Operands::RegPair { a, b } => format!("{m} v{a}, v{b}"),
            Operands::Triple { a, b, c } => format!("{m} v{a}, v{b}, v{c}"),
            Operands::RegLit { a, lit } => format!("{m} v{a}, {}", lit_str(*lit)),
            Operands::RegRegLit { a, b, lit } => {
                format!("{m} v{a}, v{b}, {}", lit_str(*lit as i64))
            }
            Operands::Branch { off } => format!("{m} {}", off_str(*off)),
            Operands::RegBranch { a, off } => format!("{m} v{a}, {}", off_str(*off)),
            Operands::PairBranch { a, b, off } => {
                format!("{m} v{a}, v{b}, {}", off_str(*off))
            }
            Operands::RegIdx { a, idx } => format!("{m} v{a}, {}", idx_operand(*idx)),
            Operands::PairIdx { a, b, idx } => {
                format!("{m} v{a}, v{b}, {}", idx_operand(*idx as u32))
            }
            Operands::Call { args, idx } => {
                let regs = args
                    .iter()
                    .map(|r| format!("v{r}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{m} {{{regs}}}, {}", idx_operand(*idx as u32))
            }
            Operands::CallRange { first, count, idx } => {
                let last = *first as u32 + count.saturating_sub(1) as u32;
                format!(
                    "{m} {{v{first} .. v{last}}}, {}",
                    idx_operand(*idx as u32)
                )
            }
            Operands::PackedSwitch { targets, .. } => {
                format!("{m} [{} targets]", targets.len())
            }
            Operands::SparseSwitch { keys, .. } => format!("{m} [{} keys]", keys.len()),
            Operands::FillArray { width, data } => {
                format!("{m} [{} x {width} bytes]", data.len() / (*width).max(1) as usize)
            }
        }
    }
}

fn lit_str(lit: i64) -> String {
    if lit < 0 {
        format!("-{:#x}", lit.unsigned_abs())
    } else {
        format!("{lit:#x}")
    }
}

fn off_str(off: i32) -> String {
    if off < 0 {
        format!("-{:#x}", off.unsigned_abs())
    } else {
        format!("+{off:#x}")
    }
}

fn escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => "\\\"".chars().collect::<Vec<_>>(),
            '\\' => "\\\\".chars().collect(),
            '\n' => "\\n".chars().collect(),
            '\r' => "\\r".chars().collect(),
            '\t' => "\\t".chars().collect(),
            c => vec![c],
        })
        .collect()
}
