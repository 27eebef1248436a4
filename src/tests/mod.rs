//! Integration tests and common testing helper functions. Unit tests are
//! located within their related implementation files.
//!
//! The front end is an external collaborator, so universes are constructed
//! programmatically; the emitted modules are executed under wasmtime.

mod dispatch;
mod helpers;

pub use helpers::*;
