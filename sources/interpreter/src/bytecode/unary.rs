//! Negation, bitwise not, and the twelve primitive conversions.
//!
//! Float-to-integral conversions truncate toward zero, saturate at the
//! target's extremes and map NaN to zero, which is exactly what Rust's `as`
//! casts do since 1.45.

use anyhow::{anyhow, Result};
use dex::{Ins, Opcode, Operands};

use super::{operands, Progression};
use crate::object::Value;
use crate::Context;

pub fn unary(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    use Opcode::*;

    operands!(ins, Operands::PairNib { a, b } => {
        let src = *b as u16;
        let dst = *a as u16;
        let regs = &mut ctx.registers;

        let result = match ins.op {
            NegInt => Value::Int(regs.get(src)?.int()?.wrapping_neg()),
            NotInt => Value::Int(!regs.get(src)?.int()?),
            NegLong => Value::Long(regs.get_wide(src)?.long()?.wrapping_neg()),
            NotLong => Value::Long(!regs.get_wide(src)?.long()?),
            NegFloat => Value::Float(-regs.get(src)?.float()?),
            NegDouble => Value::Double(-regs.get_wide(src)?.double()?),

            IntToLong => Value::Long(regs.get(src)?.int()? as i64),
            IntToFloat => Value::Float(regs.get(src)?.int()? as f32),
            IntToDouble => Value::Double(regs.get(src)?.int()? as f64),
            LongToInt => Value::Int(regs.get_wide(src)?.long()? as i32),
            LongToFloat => Value::Float(regs.get_wide(src)?.long()? as f32),
            LongToDouble => Value::Double(regs.get_wide(src)?.long()? as f64),
            FloatToInt => Value::Int(regs.get(src)?.float()? as i32),
            FloatToLong => Value::Long(regs.get(src)?.float()? as i64),
            FloatToDouble => Value::Double(regs.get(src)?.float()? as f64),
            DoubleToInt => Value::Int(regs.get_wide(src)?.double()? as i32),
            DoubleToLong => Value::Long(regs.get_wide(src)?.double()? as i64),
            DoubleToFloat => Value::Float(regs.get_wide(src)?.double()? as f32),

            IntToByte => Value::Int((regs.get(src)?.int()? as i8) as i32),
            // Chars are a tagged kind of their own so that string mocks
            // render them as text, not as codepoint digits
            IntToChar => Value::Char(regs.get(src)?.int()? as u16),
            IntToShort => Value::Int((regs.get(src)?.int()? as i16) as i32),

            op => return Err(anyhow!("{op:?} is not a unary op")),
        };

        if result.is_wide() {
            regs.set_wide(dst, result)?;
        } else {
            regs.set(dst, result)?;
        }

        Ok(Progression::Next)
    })
}
