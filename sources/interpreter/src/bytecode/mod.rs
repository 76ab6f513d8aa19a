//! Opcode handlers, grouped by family. The dispatch below is a static match
//! over the decoded opcode; extension belongs in the mock layer, not here.

use anyhow::Result;
use dex::{Ins, Opcode};

use crate::object::Value;
use crate::{Context, Vm};

mod binary;
mod invoke;
mod load_store;
mod ops;
mod unary;

/// How the pc moves after a handler runs.
pub enum Progression {
    /// Fall through to the next instruction.
    Next,
    /// Branch relative to the pc of the current instruction, in code units.
    JumpRel(i32),
    /// Terminate the frame with its return value.
    Return(Option<Value>),
}

/// Pull the expected operand shape out of an instruction, erroring on
/// mismatch. Decode guarantees the shape per format; this keeps handlers
/// honest without unwraps.
macro_rules! operands {
    ($ins:expr, $pat:pat => $body:expr) => {
        match &$ins.operands {
            $pat => $body,
            other => {
                return Err(anyhow::anyhow!(
                    "unexpected operands {:?} for {:?}",
                    other,
                    $ins.op
                ))
            }
        }
    };
}

pub(crate) use operands;

pub fn execute(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    use Opcode::*;

    match ins.op {
        Nop | PackedSwitchPayload | SparseSwitchPayload | FillArrayDataPayload => {
            Ok(Progression::Next)
        }

        // No scheduler, no contention: monitors are no-ops
        MonitorEnter | MonitorExit => Ok(Progression::Next),

        Move | MoveFrom16 | Move16 | MoveObject | MoveObjectFrom16 | MoveObject16 => {
            load_store::mov(ctx, ins, false)
        }
        MoveWide | MoveWideFrom16 | MoveWide16 => load_store::mov(ctx, ins, true),
        MoveResult | MoveResultObject => load_store::move_result(ctx, ins, false),
        MoveResultWide => load_store::move_result(ctx, ins, true),
        MoveException => load_store::move_exception(ctx, ins),

        ReturnVoid | Return | ReturnWide | ReturnObject => ops::return_op(ctx, ins),

        Const4 | Const16 | Const | ConstHigh16 => load_store::constant(ctx, ins),
        ConstWide16 | ConstWide32 | ConstWide | ConstWideHigh16 => {
            load_store::constant_wide(ctx, ins)
        }
        ConstString | ConstStringJumbo => load_store::const_string(vm, ctx, ins),
        ConstClass => load_store::const_class(vm, ctx, ins),

        CheckCast => ops::check_cast(vm, ctx, ins),
        InstanceOf => ops::instance_of(vm, ctx, ins),
        NewInstance => ops::new_instance(vm, ctx, ins),
        Throw => ops::throw_op(ctx, ins),

        ArrayLength => load_store::array_length(ctx, ins),
        NewArray => load_store::new_array(vm, ctx, ins),
        FilledNewArray | FilledNewArrayRange => load_store::filled_new_array(vm, ctx, ins),
        FillArrayData => load_store::fill_array_data(ctx, ins),

        Goto | Goto16 | Goto32 => ops::goto_op(ins),
        PackedSwitch | SparseSwitch => ops::switch_op(ctx, ins),

        IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => ops::if_test(ctx, ins),
        IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => ops::if_testz(ctx, ins),

        Aget | AgetWide | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort => {
            load_store::array_get(ctx, ins)
        }
        Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar | AputShort => {
            load_store::array_put(ctx, ins)
        }

        Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort => {
            load_store::instance_get(vm, ctx, ins)
        }
        Iput | IputWide | IputObject | IputBoolean | IputByte | IputChar | IputShort => {
            load_store::instance_put(vm, ctx, ins)
        }

        Sget | SgetWide | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
            load_store::static_get(vm, ctx, ins)
        }
        Sput | SputWide | SputObject | SputBoolean | SputByte | SputChar | SputShort => {
            load_store::static_put(vm, ctx, ins)
        }

        InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface
        | InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange | InvokeStaticRange
        | InvokeInterfaceRange => invoke::invoke(vm, ctx, ins),

        CmplFloat | CmpgFloat | CmplDouble | CmpgDouble | CmpLong => binary::cmp(ctx, ins),

        AddInt | SubInt | MulInt | DivInt | RemInt | AndInt | OrInt | XorInt | ShlInt | ShrInt
        | UshrInt => binary::int_op(ctx, ins),
        AddLong | SubLong | MulLong | DivLong | RemLong | AndLong | OrLong | XorLong | ShlLong
        | ShrLong | UshrLong => binary::long_op(ctx, ins),
        AddFloat | SubFloat | MulFloat | DivFloat | RemFloat => binary::float_op(ctx, ins),
        AddDouble | SubDouble | MulDouble | DivDouble | RemDouble => binary::double_op(ctx, ins),

        AddInt2addr | SubInt2addr | MulInt2addr | DivInt2addr | RemInt2addr | AndInt2addr
        | OrInt2addr | XorInt2addr | ShlInt2addr | ShrInt2addr | UshrInt2addr => {
            binary::int_op_2addr(ctx, ins)
        }
        AddLong2addr | SubLong2addr | MulLong2addr | DivLong2addr | RemLong2addr | AndLong2addr
        | OrLong2addr | XorLong2addr | ShlLong2addr | ShrLong2addr | UshrLong2addr => {
            binary::long_op_2addr(ctx, ins)
        }
        AddFloat2addr | SubFloat2addr | MulFloat2addr | DivFloat2addr | RemFloat2addr => {
            binary::float_op_2addr(ctx, ins)
        }
        AddDouble2addr | SubDouble2addr | MulDouble2addr | DivDouble2addr | RemDouble2addr => {
            binary::double_op_2addr(ctx, ins)
        }

        AddIntLit16 | RsubInt | MulIntLit16 | DivIntLit16 | RemIntLit16 | AndIntLit16
        | OrIntLit16 | XorIntLit16 | AddIntLit8 | RsubIntLit8 | MulIntLit8 | DivIntLit8
        | RemIntLit8 | AndIntLit8 | OrIntLit8 | XorIntLit8 | ShlIntLit8 | ShrIntLit8
        | UshrIntLit8 => binary::int_op_lit(ctx, ins),

        NegInt | NotInt | NegLong | NotLong | NegFloat | NegDouble | IntToLong | IntToFloat
        | IntToDouble | LongToInt | LongToFloat | LongToDouble | FloatToInt | FloatToLong
        | FloatToDouble | DoubleToInt | DoubleToLong | DoubleToFloat | IntToByte | IntToChar
        | IntToShort => unary::unary(ctx, ins),
    }
}
