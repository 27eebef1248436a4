//! Whole-program ahead-of-time back end lowering a linked class-file
//! intermediate representation into a WebAssembly module.
//!
//! The front end (class-file parsing), the decompiler producing structured
//! expression trees, and the reachability engine are external collaborators.
//! This crate consumes their output — a [`ClassUniverse`] with method bodies
//! attached — and a [`Controller`] supplying entry points, diagnostics and
//! cooperative cancellation, then emits one textual WebAssembly module per
//! [`Assembler::emit`] call.

mod assemble;
mod codegen;
mod controller;
mod deps;
mod intrinsics;
mod layout;
mod mangle;
mod output;
mod program;
mod runtime;
#[cfg(test)]
mod tests;
mod virtuals;

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;
#[cfg(test)]
#[macro_use]
extern crate lazy_static;
#[cfg(test)]
#[macro_use]
extern crate maplit;

pub use crate::assemble::{Assembler, Assembly, EmitOutcome};
pub use crate::controller::{Controller, DiagArg, Diagnostic, Diagnostics};
pub use crate::deps::{contribute_runtime_dependencies, DependencyConsumer};
pub use crate::intrinsics::{Intrinsic, Intrinsics};
pub use crate::layout::{is_structure_class, ClassLayout, ClassLayoutGenerator, ClassRecord};
pub use crate::mangle::{mangle_initializer, mangle_method, mangle_signature};
pub use crate::output::{BuiltinFunction, Module};
pub use crate::program::*;
pub use crate::runtime::*;
pub use crate::virtuals::{ClassTable, Signature, VirtualSlot, VirtualTable};
