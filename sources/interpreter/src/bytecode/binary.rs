//! Binary arithmetic in all four widths, the literal and `/2addr` forms,
//! and the cmp family.
//!
//! Integer semantics are two's-complement wrapping; division and remainder
//! by zero are fatal; shift counts mask to 5 bits (int) or 6 bits (long).
//! Float and double follow IEEE-754 with quiet NaN propagation.

use anyhow::{anyhow, Result};
use dex::{Ins, Opcode, Operands};

use super::{operands, Progression};
use crate::object::Value;
use crate::Context;

fn int_arith(op: Opcode, lhs: i32, rhs: i32) -> Result<i32> {
    use Opcode::*;

    Ok(match op {
        AddInt | AddInt2addr | AddIntLit16 | AddIntLit8 => lhs.wrapping_add(rhs),
        SubInt | SubInt2addr => lhs.wrapping_sub(rhs),
        RsubInt | RsubIntLit8 => rhs.wrapping_sub(lhs),
        MulInt | MulInt2addr | MulIntLit16 | MulIntLit8 => lhs.wrapping_mul(rhs),
        DivInt | DivInt2addr | DivIntLit16 | DivIntLit8 => {
            if rhs == 0 {
                return Err(anyhow!("division by zero"));
            }
            lhs.wrapping_div(rhs)
        }
        RemInt | RemInt2addr | RemIntLit16 | RemIntLit8 => {
            if rhs == 0 {
                return Err(anyhow!("remainder by zero"));
            }
            lhs.wrapping_rem(rhs)
        }
        AndInt | AndInt2addr | AndIntLit16 | AndIntLit8 => lhs & rhs,
        OrInt | OrInt2addr | OrIntLit16 | OrIntLit8 => lhs | rhs,
        XorInt | XorInt2addr | XorIntLit16 | XorIntLit8 => lhs ^ rhs,
        ShlInt | ShlInt2addr | ShlIntLit8 => lhs.wrapping_shl(rhs as u32 & 0x1f),
        ShrInt | ShrInt2addr | ShrIntLit8 => lhs.wrapping_shr(rhs as u32 & 0x1f),
        UshrInt | UshrInt2addr | UshrIntLit8 => {
            ((lhs as u32).wrapping_shr(rhs as u32 & 0x1f)) as i32
        }
        op => return Err(anyhow!("{op:?} is not an int binop")),
    })
}

fn long_arith(op: Opcode, lhs: i64, rhs: i64) -> Result<i64> {
    use Opcode::*;

    Ok(match op {
        AddLong | AddLong2addr => lhs.wrapping_add(rhs),
        SubLong | SubLong2addr => lhs.wrapping_sub(rhs),
        MulLong | MulLong2addr => lhs.wrapping_mul(rhs),
        DivLong | DivLong2addr => {
            if rhs == 0 {
                return Err(anyhow!("division by zero"));
            }
            lhs.wrapping_div(rhs)
        }
        RemLong | RemLong2addr => {
            if rhs == 0 {
                return Err(anyhow!("remainder by zero"));
            }
            lhs.wrapping_rem(rhs)
        }
        AndLong | AndLong2addr => lhs & rhs,
        OrLong | OrLong2addr => lhs | rhs,
        XorLong | XorLong2addr => lhs ^ rhs,
        ShlLong | ShlLong2addr => lhs.wrapping_shl(rhs as u32 & 0x3f),
        ShrLong | ShrLong2addr => lhs.wrapping_shr(rhs as u32 & 0x3f),
        UshrLong | UshrLong2addr => ((lhs as u64).wrapping_shr(rhs as u32 & 0x3f)) as i64,
        op => return Err(anyhow!("{op:?} is not a long binop")),
    })
}

fn float_arith(op: Opcode, lhs: f32, rhs: f32) -> Result<f32> {
    use Opcode::*;

    Ok(match op {
        AddFloat | AddFloat2addr => lhs + rhs,
        SubFloat | SubFloat2addr => lhs - rhs,
        MulFloat | MulFloat2addr => lhs * rhs,
        DivFloat | DivFloat2addr => lhs / rhs,
        RemFloat | RemFloat2addr => lhs % rhs,
        op => return Err(anyhow!("{op:?} is not a float binop")),
    })
}

fn double_arith(op: Opcode, lhs: f64, rhs: f64) -> Result<f64> {
    use Opcode::*;

    Ok(match op {
        AddDouble | AddDouble2addr => lhs + rhs,
        SubDouble | SubDouble2addr => lhs - rhs,
        MulDouble | MulDouble2addr => lhs * rhs,
        DivDouble | DivDouble2addr => lhs / rhs,
        RemDouble | RemDouble2addr => lhs % rhs,
        op => return Err(anyhow!("{op:?} is not a double binop")),
    })
}

/// Whether the shift-count operand of a long shift is a narrow int register.
fn is_long_shift(op: Opcode) -> bool {
    use Opcode::*;
    matches!(
        op,
        ShlLong | ShrLong | UshrLong | ShlLong2addr | ShrLong2addr | UshrLong2addr
    )
}

pub fn int_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let lhs = ctx.registers.get(*b as u16)?.int()?;
        let rhs = ctx.registers.get(*c as u16)?.int()?;
        ctx.registers
            .set(*a as u16, Value::Int(int_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn int_op_2addr(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairNib { a, b } => {
        let lhs = ctx.registers.get(*a as u16)?.int()?;
        let rhs = ctx.registers.get(*b as u16)?.int()?;
        ctx.registers
            .set(*a as u16, Value::Int(int_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn int_op_lit(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegRegLit { a, b, lit } => {
        let lhs = ctx.registers.get(*b as u16)?.int()?;
        ctx.registers
            .set(*a as u16, Value::Int(int_arith(ins.op, lhs, *lit)?))?;
        Ok(Progression::Next)
    })
}

pub fn long_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let lhs = ctx.registers.get_wide(*b as u16)?.long()?;
        let rhs = if is_long_shift(ins.op) {
            ctx.registers.get(*c as u16)?.int()? as i64
        } else {
            ctx.registers.get_wide(*c as u16)?.long()?
        };
        ctx.registers
            .set_wide(*a as u16, Value::Long(long_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn long_op_2addr(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairNib { a, b } => {
        let lhs = ctx.registers.get_wide(*a as u16)?.long()?;
        let rhs = if is_long_shift(ins.op) {
            ctx.registers.get(*b as u16)?.int()? as i64
        } else {
            ctx.registers.get_wide(*b as u16)?.long()?
        };
        ctx.registers
            .set_wide(*a as u16, Value::Long(long_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn float_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let lhs = ctx.registers.get(*b as u16)?.float()?;
        let rhs = ctx.registers.get(*c as u16)?.float()?;
        ctx.registers
            .set(*a as u16, Value::Float(float_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn float_op_2addr(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairNib { a, b } => {
        let lhs = ctx.registers.get(*a as u16)?.float()?;
        let rhs = ctx.registers.get(*b as u16)?.float()?;
        ctx.registers
            .set(*a as u16, Value::Float(float_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn double_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let lhs = ctx.registers.get_wide(*b as u16)?.double()?;
        let rhs = ctx.registers.get_wide(*c as u16)?.double()?;
        ctx.registers
            .set_wide(*a as u16, Value::Double(double_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

pub fn double_op_2addr(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairNib { a, b } => {
        let lhs = ctx.registers.get_wide(*a as u16)?.double()?;
        let rhs = ctx.registers.get_wide(*b as u16)?.double()?;
        ctx.registers
            .set_wide(*a as u16, Value::Double(double_arith(ins.op, lhs, rhs)?))?;
        Ok(Progression::Next)
    })
}

/// `cmp-long` and the four float/double comparisons. The `l`/`g` suffix only
/// decides which way NaN falls: `cmpl` yields -1, `cmpg` yields +1.
pub fn cmp(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let result = match ins.op {
            Opcode::CmpLong => {
                let lhs = ctx.registers.get_wide(*b as u16)?.long()?;
                let rhs = ctx.registers.get_wide(*c as u16)?.long()?;
                match lhs.cmp(&rhs) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                }
            }
            Opcode::CmplFloat | Opcode::CmpgFloat => {
                let lhs = ctx.registers.get(*b as u16)?.float()?;
                let rhs = ctx.registers.get(*c as u16)?.float()?;
                let nan = if ins.op == Opcode::CmpgFloat { 1 } else { -1 };
                match lhs.partial_cmp(&rhs) {
                    Some(std::cmp::Ordering::Less) => -1,
                    Some(std::cmp::Ordering::Equal) => 0,
                    Some(std::cmp::Ordering::Greater) => 1,
                    None => nan,
                }
            }
            Opcode::CmplDouble | Opcode::CmpgDouble => {
                let lhs = ctx.registers.get_wide(*b as u16)?.double()?;
                let rhs = ctx.registers.get_wide(*c as u16)?.double()?;
                let nan = if ins.op == Opcode::CmpgDouble { 1 } else { -1 };
                match lhs.partial_cmp(&rhs) {
                    Some(std::cmp::Ordering::Less) => -1,
                    Some(std::cmp::Ordering::Equal) => 0,
                    Some(std::cmp::Ordering::Greater) => 1,
                    None => nan,
                }
            }
            op => return Err(anyhow!("{op:?} is not a cmp")),
        };

        ctx.registers.set(*a as u16, Value::Int(result))?;
        Ok(Progression::Next)
    })
}
