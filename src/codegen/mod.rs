use crate::intrinsics::{Intrinsic, Intrinsics};
use crate::layout::ClassLayout;
use crate::output::{BuiltinFunction, Module};
use crate::program::{BinaryOp, ClassUniverse, Expr, Method, MethodId};
use crate::runtime::allocate_method;
use crate::virtuals::VirtualTable;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;
use wasm_encoder::{
    BlockType, Function as WASMFunction, Instruction as WASMInstruction, MemArg, ValType,
};

/// Lowers structured method bodies to WebAssembly function bodies.
///
/// One generator serves the whole function pass; all inputs are the
/// write-once products of the earlier passes. Invocations are lowered in
/// this order: intrinsic targets inline through the registry, imported and
/// user functions become direct calls, virtual targets go through the
/// per-signature dispatcher with the receiver class's slot constant.
pub struct FunctionGenerator<'a> {
    pub universe: &'a ClassUniverse,
    pub layout: &'a ClassLayout,
    pub virtual_table: &'a VirtualTable,
    pub intrinsics: &'a Intrinsics,
    /// Indices of imports and user functions, fixed before the function pass.
    pub function_indices: &'a HashMap<MethodId, u32>,
    /// Reserved indices of the per-class initializer wrappers.
    pub initializer_indices: &'a HashMap<Arc<String>, u32>,
}

impl FunctionGenerator<'_> {
    /// Lowers one method body to a WebAssembly function.
    pub fn generate(&self, out: &mut Module, method: &Method) -> WASMFunction {
        let body = method
            .body
            .as_ref()
            .expect("Only methods with bodies are generated");
        let mut f = WASMFunction::new(run_length_encode(&body.locals));
        for expr in &body.code {
            self.emit(out, &mut f, expr);
        }
        f.instruction(&WASMInstruction::End);
        f
    }

    fn emit(&self, out: &mut Module, f: &mut WASMFunction, expr: &Expr) {
        match expr {
            Expr::IntConst(value) => {
                f.instruction(&WASMInstruction::I32Const(*value));
            }
            Expr::LongConst(value) => {
                f.instruction(&WASMInstruction::I64Const(*value));
            }
            Expr::FloatConst(value) => {
                f.instruction(&WASMInstruction::F32Const(*value));
            }
            Expr::DoubleConst(value) => {
                f.instruction(&WASMInstruction::F64Const(*value));
            }
            Expr::GetLocal(index) => {
                f.instruction(&WASMInstruction::LocalGet(*index));
            }
            Expr::SetLocal(index, value) => {
                self.emit(out, f, value);
                f.instruction(&WASMInstruction::LocalSet(*index));
            }
            Expr::Binary {
                op,
                value_type,
                lhs,
                rhs,
            } => {
                self.emit(out, f, lhs);
                self.emit(out, f, rhs);
                f.instruction(&binary_instruction(*op, *value_type));
            }
            Expr::Block(body) => {
                f.instruction(&WASMInstruction::Block(BlockType::Empty));
                for expr in body {
                    self.emit(out, f, expr);
                }
                f.instruction(&WASMInstruction::End);
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.emit(out, f, condition);
                f.instruction(&WASMInstruction::If(BlockType::Empty));
                for expr in then_branch {
                    self.emit(out, f, expr);
                }
                if !else_branch.is_empty() {
                    f.instruction(&WASMInstruction::Else);
                    for expr in else_branch {
                        self.emit(out, f, expr);
                    }
                }
                f.instruction(&WASMInstruction::End);
            }
            Expr::Return(value) => {
                if let Some(value) = value {
                    self.emit(out, f, value);
                }
                f.instruction(&WASMInstruction::Return);
            }
            Expr::Drop(value) => {
                self.emit(out, f, value);
                f.instruction(&WASMInstruction::Drop);
            }
            Expr::Unreachable => {
                f.instruction(&WASMInstruction::Unreachable);
            }
            // Field accesses load/store at the offset fixed during layout
            Expr::GetField { receiver, field } => {
                self.emit(out, f, receiver);
                let (field_type, arg) = self.layout.instance_field(field);
                f.instruction(&load_instruction(field_type, arg));
            }
            Expr::SetField {
                receiver,
                field,
                value,
            } => {
                self.emit(out, f, receiver);
                self.emit(out, f, value);
                let (field_type, arg) = self.layout.instance_field(field);
                f.instruction(&store_instruction(field_type, arg));
            }
            // Statics live at absolute addresses inside the class record
            Expr::GetStatic(field) => {
                let (field_type, address) = self.layout.static_field(field);
                f.instruction(&WASMInstruction::I32Const(as_i32(address)));
                f.instruction(&load_instruction(field_type, absolute(field_type)));
            }
            Expr::SetStatic(field, value) => {
                let (field_type, address) = self.layout.static_field(field);
                f.instruction(&WASMInstruction::I32Const(as_i32(address)));
                self.emit(out, f, value);
                f.instruction(&store_instruction(field_type, absolute(field_type)));
            }
            // Allocation passes the class record to the runtime allocator
            Expr::New(class_name) => {
                assert!(
                    !self.layout.is_structure(class_name),
                    "Cannot allocate structure class {}",
                    class_name
                );
                let class_pointer = self.layout.get_class_pointer(class_name);
                let allocate = allocate_method();
                let index = match self.function_indices.get(&allocate) {
                    Some(&index) => index,
                    None => panic!("Allocator is not reachable, cannot lower new {}", class_name),
                };
                f.instruction(&WASMInstruction::I32Const(as_i32(class_pointer)));
                f.instruction(&WASMInstruction::Call(index));
            }
            Expr::InvokeStatic { method, args } => {
                if let Some(intrinsic) = self.intrinsics.get(method) {
                    self.emit_intrinsic(out, f, intrinsic, args);
                    return;
                }
                for arg in args {
                    self.emit(out, f, arg);
                }
                match self.function_indices.get(method) {
                    Some(&index) => {
                        f.instruction(&WASMInstruction::Call(index));
                    }
                    // The target was dropped with a diagnostic; keep the
                    // module well-formed and trap if control ever gets here
                    None if self.is_omitted(method) => {
                        f.instruction(&WASMInstruction::Unreachable);
                    }
                    None => panic!("Call to unknown function {}", method),
                }
            }
            Expr::InvokeVirtual { method, args } => {
                if let Some(intrinsic) = self.intrinsics.get(method) {
                    self.emit_intrinsic(out, f, intrinsic, args);
                    return;
                }
                for arg in args {
                    self.emit(out, f, arg);
                }
                let slot = self.virtual_table.slot_of(method);
                let dispatcher = out.ensure_dispatcher_function(&method.descriptor.function_type);
                f.instruction(&WASMInstruction::I32Const(slot));
                f.instruction(&WASMInstruction::Call(dispatcher));
            }
            // No wrapper exists for structures and initializer-less classes;
            // the request is a no-op there
            Expr::InitClass(class_name) => {
                if let Some(&index) = self.initializer_indices.get(class_name) {
                    f.instruction(&WASMInstruction::Call(index));
                }
            }
        }
    }

    fn emit_intrinsic(
        &self,
        out: &mut Module,
        f: &mut WASMFunction,
        intrinsic: Intrinsic,
        args: &[Expr],
    ) {
        for arg in args {
            self.emit(out, f, arg);
        }
        match intrinsic {
            Intrinsic::Compare(t) => {
                let builtin = match t {
                    ValType::I32 => BuiltinFunction::IntCmp,
                    ValType::I64 => BuiltinFunction::LongCmp,
                    ValType::F32 => BuiltinFunction::FloatCmp,
                    ValType::F64 => BuiltinFunction::DoubleCmp,
                    _ => unreachable!("Expected a numeric value type, got {:?}", t),
                };
                let index = out.ensure_builtin_function(builtin);
                f.instruction(&WASMInstruction::Call(index));
            }
            Intrinsic::Remainder(t) => {
                let builtin = match t {
                    ValType::F32 => BuiltinFunction::FloatRem,
                    ValType::F64 => BuiltinFunction::DoubleRem,
                    _ => unreachable!("Expected a floating value type, got {:?}", t),
                };
                let index = out.ensure_builtin_function(builtin);
                f.instruction(&WASMInstruction::Call(index));
            }
            Intrinsic::RawLoad(t) => {
                f.instruction(&load_instruction(t, absolute(t)));
            }
            Intrinsic::RawStore(t) => {
                f.instruction(&store_instruction(t, absolute(t)));
            }
            Intrinsic::AddressAdd => {
                f.instruction(&WASMInstruction::I32Add);
            }
        }
    }

    /// Whether the universe knows the method but the function pass dropped
    /// it (a native without an import annotation, or a sentinel native with
    /// no intrinsic). Calls to such targets lower to `unreachable`.
    fn is_omitted(&self, id: &MethodId) -> bool {
        self.universe
            .get(&id.class_name)
            .and_then(|class| class.methods.iter().find(|m| m.id == *id))
            .map(|method| method.modifiers.is_native)
            .unwrap_or(false)
    }
}

fn as_i32(value: u32) -> i32 {
    i32::try_from(value).expect("Address exceeded i32 bounds")
}

/// Memory immediate for an access whose address is computed on the stack.
fn absolute(t: ValType) -> MemArg {
    let align = match t {
        ValType::I32 | ValType::F32 => 2, // log2(4) = 2
        ValType::I64 | ValType::F64 => 3, // log2(8) = 3
        _ => unimplemented!("{:?}", t),
    };
    MemArg {
        offset: 0,
        align,
        memory_index: 0,
    }
}

fn load_instruction(t: ValType, arg: MemArg) -> WASMInstruction<'static> {
    match t {
        ValType::I32 => WASMInstruction::I32Load(arg),
        ValType::I64 => WASMInstruction::I64Load(arg),
        ValType::F32 => WASMInstruction::F32Load(arg),
        ValType::F64 => WASMInstruction::F64Load(arg),
        _ => unimplemented!("{:?}", t),
    }
}

fn store_instruction(t: ValType, arg: MemArg) -> WASMInstruction<'static> {
    match t {
        ValType::I32 => WASMInstruction::I32Store(arg),
        ValType::I64 => WASMInstruction::I64Store(arg),
        ValType::F32 => WASMInstruction::F32Store(arg),
        ValType::F64 => WASMInstruction::F64Store(arg),
        _ => unimplemented!("{:?}", t),
    }
}

fn binary_instruction(op: BinaryOp, t: ValType) -> WASMInstruction<'static> {
    match (op, t) {
        (BinaryOp::Add, ValType::I32) => WASMInstruction::I32Add,
        (BinaryOp::Add, ValType::I64) => WASMInstruction::I64Add,
        (BinaryOp::Add, ValType::F32) => WASMInstruction::F32Add,
        (BinaryOp::Add, ValType::F64) => WASMInstruction::F64Add,
        (BinaryOp::Sub, ValType::I32) => WASMInstruction::I32Sub,
        (BinaryOp::Sub, ValType::I64) => WASMInstruction::I64Sub,
        (BinaryOp::Sub, ValType::F32) => WASMInstruction::F32Sub,
        (BinaryOp::Sub, ValType::F64) => WASMInstruction::F64Sub,
        (BinaryOp::Mul, ValType::I32) => WASMInstruction::I32Mul,
        (BinaryOp::Mul, ValType::I64) => WASMInstruction::I64Mul,
        (BinaryOp::Mul, ValType::F32) => WASMInstruction::F32Mul,
        (BinaryOp::Mul, ValType::F64) => WASMInstruction::F64Mul,
        (BinaryOp::Div, ValType::I32) => WASMInstruction::I32DivS,
        (BinaryOp::Div, ValType::I64) => WASMInstruction::I64DivS,
        (BinaryOp::Div, ValType::F32) => WASMInstruction::F32Div,
        (BinaryOp::Div, ValType::F64) => WASMInstruction::F64Div,
        (BinaryOp::And, ValType::I32) => WASMInstruction::I32And,
        (BinaryOp::And, ValType::I64) => WASMInstruction::I64And,
        (BinaryOp::Or, ValType::I32) => WASMInstruction::I32Or,
        (BinaryOp::Or, ValType::I64) => WASMInstruction::I64Or,
        (BinaryOp::Xor, ValType::I32) => WASMInstruction::I32Xor,
        (BinaryOp::Xor, ValType::I64) => WASMInstruction::I64Xor,
        (BinaryOp::Shl, ValType::I32) => WASMInstruction::I32Shl,
        (BinaryOp::Shl, ValType::I64) => WASMInstruction::I64Shl,
        (BinaryOp::Shr, ValType::I32) => WASMInstruction::I32ShrS,
        (BinaryOp::Shr, ValType::I64) => WASMInstruction::I64ShrS,
        (BinaryOp::Eq, ValType::I32) => WASMInstruction::I32Eq,
        (BinaryOp::Eq, ValType::I64) => WASMInstruction::I64Eq,
        (BinaryOp::Eq, ValType::F32) => WASMInstruction::F32Eq,
        (BinaryOp::Eq, ValType::F64) => WASMInstruction::F64Eq,
        (BinaryOp::Ne, ValType::I32) => WASMInstruction::I32Neq,
        (BinaryOp::Ne, ValType::I64) => WASMInstruction::I64Neq,
        (BinaryOp::Ne, ValType::F32) => WASMInstruction::F32Neq,
        (BinaryOp::Ne, ValType::F64) => WASMInstruction::F64Neq,
        (BinaryOp::Lt, ValType::I32) => WASMInstruction::I32LtS,
        (BinaryOp::Lt, ValType::I64) => WASMInstruction::I64LtS,
        (BinaryOp::Lt, ValType::F32) => WASMInstruction::F32Lt,
        (BinaryOp::Lt, ValType::F64) => WASMInstruction::F64Lt,
        (BinaryOp::Le, ValType::I32) => WASMInstruction::I32LeS,
        (BinaryOp::Le, ValType::I64) => WASMInstruction::I64LeS,
        (BinaryOp::Le, ValType::F32) => WASMInstruction::F32Le,
        (BinaryOp::Le, ValType::F64) => WASMInstruction::F64Le,
        (BinaryOp::Gt, ValType::I32) => WASMInstruction::I32GtS,
        (BinaryOp::Gt, ValType::I64) => WASMInstruction::I64GtS,
        (BinaryOp::Gt, ValType::F32) => WASMInstruction::F32Gt,
        (BinaryOp::Gt, ValType::F64) => WASMInstruction::F64Gt,
        (BinaryOp::Ge, ValType::I32) => WASMInstruction::I32GeS,
        (BinaryOp::Ge, ValType::I64) => WASMInstruction::I64GeS,
        (BinaryOp::Ge, ValType::F32) => WASMInstruction::F32Ge,
        (BinaryOp::Ge, ValType::F64) => WASMInstruction::F64Ge,
        (op, t) => unimplemented!("{:?} over {:?}", op, t),
    }
}

fn run_length_encode(locals: &[ValType]) -> Vec<(u32, ValType)> {
    let mut encoded: Vec<(u32, ValType)> = Vec::new();
    for &local in locals {
        match encoded.last_mut() {
            Some((count, t)) if *t == local => *count += 1,
            _ => encoded.push((1, local)),
        }
    }
    encoded
}
