use crate::output::builtin::number::NumOps;
use crate::program::FunctionType;
use wasm_encoder::{Function as WASMFunction, Instruction as WASMInstruction, ValType};

/// Constructs the three-way compare helper for operand type `t`, with the
/// signature `[a: t, b: t] -> [ord: i32]`.
///
/// The result is `(a > b) - (a < b)`: 1 if a > b, -1 if a < b, 0 if a = b.
/// For floating types an unordered pair (either operand NaN) makes both
/// comparisons false, so the result is 0.
pub fn construct_compare(t: ValType) -> (FunctionType, WASMFunction) {
    let num = NumOps::from_type(t);
    let func_type = FunctionType {
        params: vec![t, t],          // [a: t, b: t]
        results: vec![ValType::I32], // [ord: i32]
    };
    let mut f = WASMFunction::new(vec![]);
    f.instruction(&WASMInstruction::LocalGet(0))
        .instruction(&WASMInstruction::LocalGet(1))
        .instruction(&num.gt)
        .instruction(&WASMInstruction::LocalGet(0))
        .instruction(&WASMInstruction::LocalGet(1))
        .instruction(&num.lt)
        .instruction(&WASMInstruction::I32Sub)
        .instruction(&WASMInstruction::End);
    (func_type, f)
}

#[cfg(test)]
mod tests {
    use crate::output::builtin::BuiltinFunction;
    use crate::tests::{construct_builtin_module, WASM_ENGINE};
    use wasmtime::{Linker, Module, Store};

    #[test]
    fn compare() -> anyhow::Result<()> {
        // Instantiate WebAssembly module
        let module = construct_builtin_module(&[
            BuiltinFunction::IntCmp,
            BuiltinFunction::LongCmp,
            BuiltinFunction::FloatCmp,
            BuiltinFunction::DoubleCmp,
        ]);
        let module = Module::new(&WASM_ENGINE, module.finish())?;
        let linker = Linker::new(&WASM_ENGINE);
        let mut store = Store::new(&WASM_ENGINE, 0);
        let instance = linker.instantiate(&mut store, &module)?;

        // Get references to exports
        let int_cmp = instance.get_typed_func::<(i32, i32), i32, _>(&mut store, "!IntCmp")?;
        let long_cmp = instance.get_typed_func::<(i64, i64), i32, _>(&mut store, "!LongCmp")?;
        let float_cmp = instance.get_typed_func::<(f32, f32), i32, _>(&mut store, "!FloatCmp")?;
        let double_cmp = instance.get_typed_func::<(f64, f64), i32, _>(&mut store, "!DoubleCmp")?;

        // !IntCmp
        assert_eq!(int_cmp.call(&mut store, (1, 2))?, -1);
        assert_eq!(int_cmp.call(&mut store, (1, 1))?, 0);
        assert_eq!(int_cmp.call(&mut store, (2, 1))?, 1);
        assert_eq!(int_cmp.call(&mut store, (-2, 1))?, -1);

        // !LongCmp
        assert_eq!(long_cmp.call(&mut store, (1, 2))?, -1);
        assert_eq!(long_cmp.call(&mut store, (1, 1))?, 0);
        assert_eq!(long_cmp.call(&mut store, (2, 1))?, 1);

        // !FloatCmp
        assert_eq!(float_cmp.call(&mut store, (1.0, 2.0))?, -1);
        assert_eq!(float_cmp.call(&mut store, (1.0, 1.0))?, 0);
        assert_eq!(float_cmp.call(&mut store, (2.0, 1.0))?, 1);
        // !FloatCmp: unordered pairs compare as equal
        assert_eq!(float_cmp.call(&mut store, (f32::NAN, 1.0))?, 0);
        assert_eq!(float_cmp.call(&mut store, (1.0, f32::NAN))?, 0);
        assert_eq!(float_cmp.call(&mut store, (f32::NAN, f32::NAN))?, 0);

        // !DoubleCmp
        assert_eq!(double_cmp.call(&mut store, (1.0, 2.0))?, -1);
        assert_eq!(double_cmp.call(&mut store, (1.0, 1.0))?, 0);
        assert_eq!(double_cmp.call(&mut store, (2.0, 1.0))?, 1);
        assert_eq!(double_cmp.call(&mut store, (f64::NAN, 1.0))?, 0);

        Ok(())
    }
}
