//! Deterministic symbol mangling.
//!
//! Emitted function names must be valid, stable identifiers, and distinct
//! method references must never collide (the assembler treats a collision as
//! a fatal bug). Characters outside `[A-Za-z0-9]` are replaced by a
//! prefix-free escape: `/` becomes `_`, anything else becomes `$<hex>_`.
//! Decoding is unambiguous (`$` opens an escape and appears nowhere else),
//! so the encoding is injective over well-formed references.

use crate::program::{val_type_name, FunctionType, MethodId};
use itertools::Itertools;
use std::fmt::Write;

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' => out.push(c),
            '/' => out.push('_'),
            other => write!(out, "${:x}_", other as u32).unwrap(),
        }
    }
    out
}

/// Returns the module-level symbol for a method reference.
///
/// The reference's canonical display form (`class.name(params)return`) is
/// escaped wholesale; class-file naming rules keep that form unambiguous.
pub fn mangle_method(id: &MethodId) -> String {
    format!("m_{}", escape(&id.to_string()))
}

/// Returns the symbol for a class's initializer wrapper. The `clinit_`
/// namespace is disjoint from method symbols by prefix.
pub fn mangle_initializer(class_name: &str) -> String {
    format!("clinit_{}", escape(class_name))
}

/// Returns the symbol naming a raw function type, used for indirect-call
/// type entries and dispatcher debug names.
pub fn mangle_signature(func_type: &FunctionType) -> String {
    let params = func_type.params.iter().copied().map(val_type_name).format("");
    let results = func_type.results.iter().copied().map(val_type_name).format("");
    format!("sig_{}_{}", params, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{FieldDescriptor, MethodDescriptor, ReturnDescriptor};
    use std::sync::Arc;
    use wasm_encoder::ValType;

    fn id(class_name: &str, name: &str, params: Vec<FieldDescriptor>) -> MethodId {
        MethodId {
            class_name: Arc::new(String::from(class_name)),
            name: Arc::new(String::from(name)),
            descriptor: Arc::new(MethodDescriptor::new(params, ReturnDescriptor::Void)),
        }
    }

    #[test]
    fn distinct_references_get_distinct_symbols() {
        // Pairs chosen to collide under naive '/' and '_' flattening
        let pairs = [
            (id("a/b", "c", vec![]), id("a", "b_c", vec![])),
            (id("a_b", "c", vec![]), id("a/b", "c", vec![])),
            (id("pkg/A", "f", vec![FieldDescriptor::Int]), id("pkg/A", "f", vec![FieldDescriptor::Long])),
            (id("pkg/A", "f", vec![]), id("pkg/A$f", "", vec![])),
        ];
        for (a, b) in &pairs {
            assert_ne!(mangle_method(a), mangle_method(b), "{} vs {}", a, b);
        }
    }

    #[test]
    fn mangling_is_reproducible() {
        let a = id("pkg/Main", "run", vec![FieldDescriptor::Int]);
        assert_eq!(mangle_method(&a), mangle_method(&a.clone()));
        assert_eq!(mangle_method(&a), "m_pkg_Main$2e_run$28_I$29_V");
    }

    #[test]
    fn initializer_namespace_is_disjoint() {
        // A method literally named like a wrapper symbol must not alias it
        let tricky = id("A", "clinit_A", vec![]);
        assert_ne!(mangle_method(&tricky), mangle_initializer("A"));
        assert_eq!(mangle_initializer("pkg/A"), "clinit_pkg_A");
    }

    #[test]
    fn signature_symbols() {
        let func_type = FunctionType {
            params: vec![ValType::I32, ValType::F64],
            results: vec![ValType::I32],
        };
        assert_eq!(mangle_signature(&func_type), "sig_i32f64_i32");
        let empty = FunctionType {
            params: vec![],
            results: vec![],
        };
        assert_eq!(mangle_signature(&empty), "sig__");
    }
}
