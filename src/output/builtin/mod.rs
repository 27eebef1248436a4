mod compare;
mod number;
mod rem;

pub use self::compare::*;
pub use self::rem::*;

/// Helper function shared by intrinsic call sites, included in the module at
/// most once each.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BuiltinFunction {
    // [a: i32, b: i32] -> [ord: i32]
    IntCmp,
    // [a: i64, b: i64] -> [ord: i32]
    LongCmp,
    // [a: f32, b: f32] -> [ord: i32]
    FloatCmp,
    // [a: f64, b: f64] -> [ord: i32]
    DoubleCmp,

    // [a: f32, b: f32] -> [c: f32]
    FloatRem,
    // [a: f64, b: f64] -> [c: f64]
    DoubleRem,
}

impl BuiltinFunction {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFunction::IntCmp => "!IntCmp",
            BuiltinFunction::LongCmp => "!LongCmp",
            BuiltinFunction::FloatCmp => "!FloatCmp",
            BuiltinFunction::DoubleCmp => "!DoubleCmp",
            BuiltinFunction::FloatRem => "!FloatRem",
            BuiltinFunction::DoubleRem => "!DoubleRem",
        }
    }
}
