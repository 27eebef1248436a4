use crate::program::MethodId;
use crate::runtime::{
    address_add_method, address_get_method, address_put_method, compare_method, remainder_method,
};
use std::collections::HashMap;
use wasm_encoder::ValType;

/// Inline lowering applied at an invocation site instead of a call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Intrinsic {
    /// Numeric three-way compare, lowered to a shared helper function.
    Compare(ValType),
    /// Floating remainder, lowered to a shared helper function.
    Remainder(ValType),
    /// Raw memory read at an address operand.
    RawLoad(ValType),
    /// Raw memory write at an address operand.
    RawStore(ValType),
    /// Address arithmetic (`ptr + offset`).
    AddressAdd,
}

/// Exact-match registry from method reference to intrinsic lowering.
///
/// Methods found here never compile to module functions; the expression
/// generator consults the registry before any dispatch decision. Registration
/// is additive so targets can contribute further groups.
#[derive(Debug, Default)]
pub struct Intrinsics {
    entries: HashMap<MethodId, Intrinsic>,
}

impl Intrinsics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the wasm runtime group: numeric compares,
    /// floating remainders and the raw memory operations of the address
    /// sentinel class.
    pub fn with_runtime_group() -> Self {
        let mut intrinsics = Self::new();
        for t in [ValType::I32, ValType::I64, ValType::F32, ValType::F64] {
            intrinsics.register(compare_method(t), Intrinsic::Compare(t));
            intrinsics.register(address_get_method(t), Intrinsic::RawLoad(t));
            intrinsics.register(address_put_method(t), Intrinsic::RawStore(t));
        }
        for t in [ValType::F32, ValType::F64] {
            intrinsics.register(remainder_method(t), Intrinsic::Remainder(t));
        }
        intrinsics.register(address_add_method(), Intrinsic::AddressAdd);
        intrinsics
    }

    pub fn register(&mut self, id: MethodId, intrinsic: Intrinsic) {
        self.entries.insert(id, intrinsic);
    }

    pub fn get(&self, id: &MethodId) -> Option<Intrinsic> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &MethodId) -> bool {
        self.entries.contains_key(id)
    }
}
