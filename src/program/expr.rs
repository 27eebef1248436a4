use crate::program::{FieldId, MethodId};
use std::sync::Arc;
use wasm_encoder::ValType;

/// Structured expression tree node, as reconstructed by the decompiler.
///
/// The tree is already typed and well-formed: operand types are carried on
/// the nodes that need them and value/statement positions are the
/// decompiler's responsibility. Code generation is a single exhaustive match
/// over this enum, so adding a variant fails loudly everywhere it matters.
#[derive(Debug)]
pub enum Expr {
    // [] -> [value: t]
    IntConst(i32),
    LongConst(i64),
    FloatConst(f32),
    DoubleConst(f64),

    // [] -> [value: t]
    GetLocal(u32),
    // [] -> []
    SetLocal(u32, Box<Expr>),

    // [] -> [value: t]
    Binary {
        op: BinaryOp,
        value_type: ValType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Statement sequence.
    Block(Vec<Expr>),
    /// Two-way conditional over statement arms.
    If {
        condition: Box<Expr>,
        then_branch: Vec<Expr>,
        else_branch: Vec<Expr>,
    },
    Return(Option<Box<Expr>>),
    /// Discards the value produced by the inner expression.
    Drop(Box<Expr>),
    Unreachable,

    // [this: i32] -> [value: t]
    GetField { receiver: Box<Expr>, field: FieldId },
    // [this: i32, value: t] -> []
    SetField {
        receiver: Box<Expr>,
        field: FieldId,
        value: Box<Expr>,
    },
    // [] -> [value: t]
    GetStatic(FieldId),
    // [value: t] -> []
    SetStatic(FieldId, Box<Expr>),

    /// Allocates an instance of the named class. [] -> [ptr: i32]
    New(Arc<String>),

    // [...] -> [return: t]
    InvokeStatic { method: MethodId, args: Vec<Expr> },
    /// Virtual dispatch; the first argument is the receiver.
    // [this: i32, ...] -> [return: t]
    InvokeVirtual { method: MethodId, args: Vec<Expr> },

    /// Requests the named class's static initializer to have run. [] -> []
    InitClass(Arc<String>),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// Preorder walk over this expression and all of its children.
    pub fn for_each(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::IntConst(_)
            | Expr::LongConst(_)
            | Expr::FloatConst(_)
            | Expr::DoubleConst(_)
            | Expr::GetLocal(_)
            | Expr::GetStatic(_)
            | Expr::New(_)
            | Expr::InitClass(_)
            | Expr::Unreachable => {}
            Expr::SetLocal(_, value) => value.for_each(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each(f);
                rhs.for_each(f);
            }
            Expr::Block(body) => {
                for expr in body {
                    expr.for_each(f);
                }
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.for_each(f);
                for expr in then_branch {
                    expr.for_each(f);
                }
                for expr in else_branch {
                    expr.for_each(f);
                }
            }
            Expr::Return(value) => {
                if let Some(value) = value {
                    value.for_each(f);
                }
            }
            Expr::Drop(value) => value.for_each(f),
            Expr::GetField { receiver, .. } => receiver.for_each(f),
            Expr::SetField {
                receiver, value, ..
            } => {
                receiver.for_each(f);
                value.for_each(f);
            }
            Expr::SetStatic(_, value) => value.for_each(f),
            Expr::InvokeStatic { args, .. } | Expr::InvokeVirtual { args, .. } => {
                for arg in args {
                    arg.for_each(f);
                }
            }
        }
    }
}
