mod builtin;
mod ensure;
mod types;

pub use builtin::BuiltinFunction;
pub use ensure::Ensurable;
pub use types::*;
