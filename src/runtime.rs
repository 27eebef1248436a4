//! Well-known runtime names and the in-memory class record format.
//!
//! The runtime support classes live in the universe like any other code; the
//! back end recognises them by name to wire allocation, dispatch and the
//! intrinsic lowerings together.

use crate::program::{FieldDescriptor, MethodDescriptor, MethodId, ReturnDescriptor};
use std::sync::Arc;
use wasm_encoder::{MemArg, ValType};

/// Sentinel class whose instances are raw pointers; its methods are memory
/// intrinsics and never compile to functions.
pub const ADDRESS_CLASS: &str = "runtime/Address";
/// Sentinel base class for inline value aggregates (layout only, no header,
/// no dispatch, no initializer wrapper).
pub const STRUCTURE_CLASS: &str = "runtime/Structure";
pub const ALLOCATOR_CLASS: &str = "runtime/Allocator";
pub const WASM_RUNTIME_CLASS: &str = "runtime/WasmRuntime";
pub const RUNTIME_CLASS_CLASS: &str = "runtime/RuntimeClass";

/// Annotation marking a native method as imported from the host, with
/// optional `module` and `name` values.
pub const IMPORT_ANNOTATION: &str = "runtime/Import";
/// Annotation marking a class whose `<clinit>` runs from the start function.
pub const STATIC_INIT_ANNOTATION: &str = "runtime/StaticInit";

pub const CLINIT_NAME: &str = "<clinit>";

/// First class record is placed here; lower addresses stay null-safe.
pub const CLASS_RECORD_BASE: u32 = 256;
/// Class record header: instance size (i32).
pub const CLASS_SIZE_OFFSET: u64 = 0;
/// Class record header: initialization flag word (i32).
pub const CLASS_FLAGS_OFFSET: u64 = 4;
/// Class record header: dispatch table base index (i32).
pub const CLASS_VTABLE_OFFSET: u64 = 8;
/// Class record header: superclass record pointer (i32, 0 for roots).
pub const CLASS_SUPER_OFFSET: u64 = 12;
/// Static field area starts after the header.
pub const CLASS_HEADER_SIZE: u32 = 16;
/// Bit set in the flag word once the class initializer has run.
pub const INITIALIZED_FLAG: i32 = 1;

/// Every heap instance starts with an i32 class-record pointer.
pub const OBJECT_HEADER_SIZE: u32 = 4;
/// Location of the class-record pointer relative to instance pointers.
pub const OBJECT_HEADER_MEM_ARG: MemArg = MemArg {
    offset: 0,
    align: 2, // log2(4) = 2
    memory_index: 0,
};

/// The heap origin is rounded up to this boundary after the last record.
pub const HEAP_ALIGNMENT: u32 = 4096;
/// Declared initial size of the module's linear memory, in 64 KiB pages.
pub const INITIAL_MEMORY_PAGES: u64 = 64;

fn method_id(class_name: &str, name: &str, descriptor: MethodDescriptor) -> MethodId {
    MethodId {
        class_name: Arc::new(String::from(class_name)),
        name: Arc::new(String::from(name)),
        descriptor: Arc::new(descriptor),
    }
}

fn numeric_field(t: ValType) -> FieldDescriptor {
    match t {
        ValType::I32 => FieldDescriptor::Int,
        ValType::I64 => FieldDescriptor::Long,
        ValType::F32 => FieldDescriptor::Float,
        ValType::F64 => FieldDescriptor::Double,
        _ => unreachable!("Expected a numeric value type, got {:?}", t),
    }
}

fn numeric_suffix(t: ValType) -> &'static str {
    match t {
        ValType::I32 => "Int",
        ValType::I64 => "Long",
        ValType::F32 => "Float",
        ValType::F64 => "Double",
        _ => unreachable!("Expected a numeric value type, got {:?}", t),
    }
}

/// `WasmRuntime.compare` for the given operand type, returning the sign of
/// `a - b` as an i32.
pub fn compare_method(t: ValType) -> MethodId {
    let operand = numeric_field(t);
    let descriptor = MethodDescriptor::new(
        vec![operand.clone(), operand],
        ReturnDescriptor::Field(FieldDescriptor::Int),
    );
    method_id(WASM_RUNTIME_CLASS, "compare", descriptor)
}

/// `WasmRuntime.remainder` for the given floating operand type.
pub fn remainder_method(t: ValType) -> MethodId {
    let operand = numeric_field(t);
    let descriptor = MethodDescriptor::new(
        vec![operand.clone(), operand.clone()],
        ReturnDescriptor::Field(operand),
    );
    method_id(WASM_RUNTIME_CLASS, "remainder", descriptor)
}

/// `Allocator.allocate(RuntimeClass) -> Address`.
pub fn allocate_method() -> MethodId {
    let descriptor = MethodDescriptor::new(
        vec![FieldDescriptor::Object(String::from(RUNTIME_CLASS_CLASS))],
        ReturnDescriptor::Field(FieldDescriptor::Object(String::from(ADDRESS_CLASS))),
    );
    method_id(ALLOCATOR_CLASS, "allocate", descriptor)
}

/// `Allocator.initialize() -> Address`, synthesized by the assembler to
/// return the heap origin.
pub fn allocator_initialize_method() -> MethodId {
    let descriptor = MethodDescriptor::new(
        vec![],
        ReturnDescriptor::Field(FieldDescriptor::Object(String::from(ADDRESS_CLASS))),
    );
    method_id(ALLOCATOR_CLASS, "initialize", descriptor)
}

/// `Allocator.<clinit>`.
pub fn allocator_clinit_method() -> MethodId {
    let descriptor = MethodDescriptor::new(vec![], ReturnDescriptor::Void);
    method_id(ALLOCATOR_CLASS, CLINIT_NAME, descriptor)
}

/// `Address.get<T>() -> T` raw memory read.
pub fn address_get_method(t: ValType) -> MethodId {
    let descriptor = MethodDescriptor::new(vec![], ReturnDescriptor::Field(numeric_field(t)));
    method_id(ADDRESS_CLASS, &format!("get{}", numeric_suffix(t)), descriptor)
}

/// `Address.put<T>(T)` raw memory write.
pub fn address_put_method(t: ValType) -> MethodId {
    let descriptor = MethodDescriptor::new(vec![numeric_field(t)], ReturnDescriptor::Void);
    method_id(ADDRESS_CLASS, &format!("put{}", numeric_suffix(t)), descriptor)
}

/// `Address.add(int) -> Address` pointer arithmetic.
pub fn address_add_method() -> MethodId {
    let descriptor = MethodDescriptor::new(
        vec![FieldDescriptor::Int],
        ReturnDescriptor::Field(FieldDescriptor::Object(String::from(ADDRESS_CLASS))),
    );
    method_id(ADDRESS_CLASS, "add", descriptor)
}
