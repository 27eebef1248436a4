//! End-to-end dynamic dispatch: allocation through the runtime allocator,
//! header words, dispatch tables and the per-signature dispatchers.

use crate::controller::Controller;
use crate::program::Expr;
use crate::tests::{
    allocator_class, assemble_universe, body_with_locals, class_of, concrete_method, instance_ref,
    read_i32, universe_of, virtual_call, TestController, WASM_ENGINE,
};
use wasm_encoder::ValType;
use wasmtime::{Linker, Module, Store};

#[test]
fn calls_resolve_through_the_receiver_class() -> anyhow::Result<()> {
    let speak = instance_ref("zoo/Animal", "speak");
    let animal = class_of(
        "zoo/Animal",
        None,
        vec![concrete_method(
            "zoo/Animal",
            "speak",
            false,
            crate::tests::body(vec![Expr::Return(Some(Box::new(Expr::IntConst(1))))]),
        )],
    );
    let dog = class_of(
        "zoo/Dog",
        Some("zoo/Animal"),
        vec![concrete_method(
            "zoo/Dog",
            "speak",
            false,
            crate::tests::body(vec![Expr::Return(Some(Box::new(Expr::IntConst(2))))]),
        )],
    );
    // Both entry methods dispatch through the base class reference
    let new_and_speak = |class_name: &str| {
        body_with_locals(
            vec![ValType::I32],
            vec![
                Expr::SetLocal(0, Box::new(Expr::New(crate::tests::str_arc(class_name)))),
                Expr::Return(Some(Box::new(virtual_call(
                    &speak,
                    vec![Expr::GetLocal(0)],
                )))),
            ],
        )
    };
    let main = class_of(
        "app/Main",
        None,
        vec![
            concrete_method("app/Main", "dog", true, new_and_speak("zoo/Dog")),
            concrete_method("app/Main", "animal", true, new_and_speak("zoo/Animal")),
        ],
    );
    let universe = universe_of(vec![allocator_class(), animal, dog, main]);

    let controller = TestController::with_entry_points(btreemap! {
        String::from("dog") => crate::tests::int_method_id("app/Main", "dog"),
        String::from("animal") => crate::tests::int_method_id("app/Main", "animal"),
    });
    let assembly = assemble_universe(&universe, &controller);
    assert_eq!(controller.diagnostics().error_count(), 0);

    // Overrides share the base class's slot
    assert_eq!(
        assembly.virtual_table.slot_of(&speak),
        assembly.virtual_table.slot_of(&instance_ref("zoo/Dog", "speak"))
    );

    let heap_base = assembly.layout.heap_base();
    let dog_record = assembly.layout.get_class_pointer("zoo/Dog");

    let module = Module::new(&WASM_ENGINE, assembly.module.finish())?;
    let linker = Linker::new(&WASM_ENGINE);
    let mut store = Store::new(&WASM_ENGINE, 0);
    let instance = linker.instantiate(&mut store, &module)?;

    let dog = instance.get_typed_func::<(), i32, _>(&mut store, "dog")?;
    let animal = instance.get_typed_func::<(), i32, _>(&mut store, "animal")?;
    assert_eq!(dog.call(&mut store, ())?, 2);
    assert_eq!(animal.call(&mut store, ())?, 1);
    assert_eq!(dog.call(&mut store, ())?, 2);

    // The first allocation happened at the heap origin and its header word
    // names the dog's class record
    let memory = instance.get_memory(&mut store, "memory").unwrap();
    let data = memory.data(&store);
    assert_eq!(read_i32(data, heap_base), dog_record as i32);

    Ok(())
}
