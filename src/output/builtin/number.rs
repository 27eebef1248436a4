use wasm_encoder::{Function as WASMFunction, Instruction as WASMInstruction, ValType};

/// Per-type instruction selection for the numeric helper functions.
pub(super) struct NumOps<'a> {
    /// Evaluates `a = b`, pushing `1` if true, and `0` otherwise.
    pub(super) eq: WASMInstruction<'a>,
    /// Evaluates `a != b`, pushing `1` if true, and `0` otherwise.
    pub(super) ne: WASMInstruction<'a>,
    /// Evaluates `a < b` (signed), pushing `1` if true, and `0` otherwise.
    pub(super) lt: WASMInstruction<'a>,
    /// Evaluates `a > b` (signed), pushing `1` if true, and `0` otherwise.
    pub(super) gt: WASMInstruction<'a>,
    /// Evaluates `a - b`.
    pub(super) sub: WASMInstruction<'a>,
    /// Evaluates `a * b`.
    pub(super) mul: WASMInstruction<'a>,
    /// Evaluates `a / b`.
    pub(super) div: WASMInstruction<'a>,
    /// Pushes a zero of this type.
    pub(super) zero: WASMInstruction<'a>,
    /// Pushes a NaN of this type, for floating types.
    pub(super) nan: Option<WASMInstruction<'a>>,
    /// Rounds towards zero, for floating types.
    pub(super) trunc: Option<WASMInstruction<'a>>,
}

impl NumOps<'_> {
    pub(super) fn from_type(t: ValType) -> Self {
        match t {
            ValType::I32 => NumOps {
                eq: WASMInstruction::I32Eq,
                ne: WASMInstruction::I32Neq,
                lt: WASMInstruction::I32LtS,
                gt: WASMInstruction::I32GtS,
                sub: WASMInstruction::I32Sub,
                mul: WASMInstruction::I32Mul,
                div: WASMInstruction::I32DivS,
                zero: WASMInstruction::I32Const(0),
                nan: None,
                trunc: None,
            },
            ValType::I64 => NumOps {
                eq: WASMInstruction::I64Eq,
                ne: WASMInstruction::I64Neq,
                lt: WASMInstruction::I64LtS,
                gt: WASMInstruction::I64GtS,
                sub: WASMInstruction::I64Sub,
                mul: WASMInstruction::I64Mul,
                div: WASMInstruction::I64DivS,
                zero: WASMInstruction::I64Const(0),
                nan: None,
                trunc: None,
            },
            ValType::F32 => NumOps {
                eq: WASMInstruction::F32Eq,
                ne: WASMInstruction::F32Neq,
                lt: WASMInstruction::F32Lt,
                gt: WASMInstruction::F32Gt,
                sub: WASMInstruction::F32Sub,
                mul: WASMInstruction::F32Mul,
                div: WASMInstruction::F32Div,
                zero: WASMInstruction::F32Const(0.0),
                nan: Some(WASMInstruction::F32Const(f32::NAN)),
                trunc: Some(WASMInstruction::F32Trunc),
            },
            ValType::F64 => NumOps {
                eq: WASMInstruction::F64Eq,
                ne: WASMInstruction::F64Neq,
                lt: WASMInstruction::F64Lt,
                gt: WASMInstruction::F64Gt,
                sub: WASMInstruction::F64Sub,
                mul: WASMInstruction::F64Mul,
                div: WASMInstruction::F64Div,
                zero: WASMInstruction::F64Const(0.0),
                nan: Some(WASMInstruction::F64Const(f64::NAN)),
                trunc: Some(WASMInstruction::F64Trunc),
            },
            _ => unreachable!("Expected a numeric value type, got {:?}", t),
        }
    }

    /// Writes a check that `local` is NaN, pushing `1` if so. Relies on
    /// `NaN != NaN` holding for every other value.
    pub(super) fn is_nan<'b>(&self, f: &'b mut WASMFunction, local: u32) -> &'b mut WASMFunction {
        f.instruction(&WASMInstruction::LocalGet(local))
            .instruction(&WASMInstruction::LocalGet(local))
            .instruction(&self.ne)
    }

    /// Writes a check that `local` is finite, pushing `1` if so. `a - a` is
    /// zero exactly when `a` is neither NaN nor an infinity.
    pub(super) fn is_finite<'b>(&self, f: &'b mut WASMFunction, local: u32) -> &'b mut WASMFunction {
        f.instruction(&WASMInstruction::LocalGet(local))
            .instruction(&WASMInstruction::LocalGet(local))
            .instruction(&self.sub)
            .instruction(&self.zero)
            .instruction(&self.eq)
    }
}
