use crate::output::builtin::number::NumOps;
use crate::program::FunctionType;
use wasm_encoder::{BlockType, Function as WASMFunction, Instruction as WASMInstruction, ValType};

/// Constructs the floating remainder helper for operand type `t`, with the
/// signature `[a (dividend): t, b (divisor): t] -> [c: t]`.
///
/// The class-file semantics differ from `fmod` in their edge cases:
///
/// 1. A NaN operand or an infinite dividend makes the result NaN.
/// 2. An infinite divisor leaves a finite dividend untouched.
/// 3. A zero dividend is returned as-is, keeping its sign.
/// 4. Otherwise the result is `a - trunc(a / b) * b`. A zero divisor falls
///    into this case and yields NaN through `trunc(±inf) * 0`.
pub fn construct_rem(t: ValType) -> (FunctionType, WASMFunction) {
    let num = NumOps::from_type(t);
    let nan = num.nan.as_ref().unwrap();
    let trunc = num.trunc.as_ref().unwrap();
    let func_type = FunctionType {
        params: vec![t, t], // [a: t, b: t]
        results: vec![t],   // [c: t]
    };
    let mut f = WASMFunction::new(vec![]);

    // 1. NaN operands and an infinite dividend all collapse to NaN. A NaN
    //    dividend is caught by the finiteness check too.
    num.is_finite(&mut f, /* a */ 0)
        .instruction(&WASMInstruction::If(BlockType::Empty))
        .instruction(&WASMInstruction::Else)
        .instruction(nan)
        .instruction(&WASMInstruction::Return)
        .instruction(&WASMInstruction::End);
    num.is_nan(&mut f, /* b */ 1)
        .instruction(&WASMInstruction::If(BlockType::Empty))
        .instruction(nan)
        .instruction(&WASMInstruction::Return)
        .instruction(&WASMInstruction::End);

    // 2. An infinite divisor leaves the (now known finite) dividend untouched
    num.is_finite(&mut f, /* b */ 1)
        .instruction(&WASMInstruction::If(BlockType::Empty))
        .instruction(&WASMInstruction::Else)
        .instruction(&WASMInstruction::LocalGet(/* a */ 0))
        .instruction(&WASMInstruction::Return)
        .instruction(&WASMInstruction::End);

    // 3. A zero dividend is returned as-is, keeping its sign
    f.instruction(&WASMInstruction::LocalGet(/* a */ 0))
        .instruction(&num.zero)
        .instruction(&num.eq)
        .instruction(&WASMInstruction::If(BlockType::Empty))
        .instruction(&WASMInstruction::LocalGet(/* a */ 0))
        .instruction(&WASMInstruction::Return)
        .instruction(&WASMInstruction::End);

    // 4. a - trunc(a/b) * b. Dividing by zero gives an infinite quotient,
    //    and multiplying that back by zero poisons the result with NaN.
    f.instruction(&WASMInstruction::LocalGet(/* a */ 0))
        .instruction(&WASMInstruction::LocalGet(/* a */ 0))
        .instruction(&WASMInstruction::LocalGet(/* b */ 1))
        .instruction(&num.div)
        .instruction(trunc)
        .instruction(&WASMInstruction::LocalGet(/* b */ 1))
        .instruction(&num.mul)
        .instruction(&num.sub);

    f.instruction(&WASMInstruction::End);

    (func_type, f)
}

#[cfg(test)]
mod tests {
    use crate::output::builtin::BuiltinFunction;
    use crate::tests::{construct_builtin_module, WASM_ENGINE};
    use wasmtime::{Linker, Module, Store};

    #[test]
    fn rem() -> anyhow::Result<()> {
        // Instantiate WebAssembly module
        let module =
            construct_builtin_module(&[BuiltinFunction::FloatRem, BuiltinFunction::DoubleRem]);
        let module = Module::new(&WASM_ENGINE, module.finish())?;
        let linker = Linker::new(&WASM_ENGINE);
        let mut store = Store::new(&WASM_ENGINE, 0);
        let instance = linker.instantiate(&mut store, &module)?;

        // Get references to exports
        let float_rem = instance.get_typed_func::<(f32, f32), f32, _>(&mut store, "!FloatRem")?;
        let double_rem = instance.get_typed_func::<(f64, f64), f64, _>(&mut store, "!DoubleRem")?;

        // 1. NaN operands and an infinite dividend give NaN
        assert!(f32::is_nan(float_rem.call(&mut store, (f32::NAN, 1.0))?));
        assert!(f32::is_nan(float_rem.call(&mut store, (1.0, f32::NAN))?));
        assert!(f32::is_nan(float_rem.call(&mut store, (f32::INFINITY, 1.0))?));
        assert!(f32::is_nan(
            float_rem.call(&mut store, (f32::INFINITY, f32::INFINITY))?
        ));
        assert!(f64::is_nan(double_rem.call(&mut store, (f64::NAN, 1.0))?));
        assert!(f64::is_nan(double_rem.call(&mut store, (1.0, f64::NAN))?));
        assert!(f64::is_nan(
            double_rem.call(&mut store, (f64::INFINITY, 1.0))?
        ));

        // A zero divisor gives NaN too
        assert!(f32::is_nan(float_rem.call(&mut store, (1.0, 0.0))?));
        assert!(f64::is_nan(double_rem.call(&mut store, (1.0, 0.0))?));

        // 2. An infinite divisor leaves the dividend untouched
        assert_eq!(float_rem.call(&mut store, (42.0, f32::INFINITY))?, 42.0);
        assert_eq!(double_rem.call(&mut store, (42.0, f64::INFINITY))?, 42.0);

        // 3. A zero dividend is returned as-is
        assert_eq!(float_rem.call(&mut store, (0.0, 3.0))?, 0.0);
        assert_eq!(double_rem.call(&mut store, (0.0, 3.0))?, 0.0);

        // 4. The remainder keeps the dividend's sign
        assert_eq!(float_rem.call(&mut store, (7.5, 2.0))?, 1.5);
        assert_eq!(float_rem.call(&mut store, (-7.5, 2.0))?, -1.5);
        assert_eq!(double_rem.call(&mut store, (7.5, 2.0))?, 1.5);
        assert_eq!(double_rem.call(&mut store, (-7.5, 2.0))?, -1.5);

        Ok(())
    }
}
