mod construct;
mod types;

pub use self::types::*;
