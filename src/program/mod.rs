mod descriptors;
mod expr;
mod types;
mod universe;

pub use self::descriptors::*;
pub use self::expr::*;
pub use self::types::*;
pub use self::universe::*;
