//! Common testing helper functions

use crate::controller::{Controller, Diagnostics};
use crate::intrinsics::Intrinsics;
use crate::layout::{ClassLayout, ClassLayoutGenerator};
use crate::output::{BuiltinFunction, Module};
use crate::program::{
    Annotation, BinaryOp, Class, ClassUniverse, Expr, Field, FieldDescriptor, FieldId,
    FunctionBody, Method, MethodDescriptor, MethodId, Modifiers, ReturnDescriptor,
};
use crate::runtime::{
    address_get_method, address_put_method, allocate_method, allocator_clinit_method,
    allocator_initialize_method, ADDRESS_CLASS, ALLOCATOR_CLASS, STATIC_INIT_ANNOTATION,
};
use crate::virtuals::VirtualTable;
use crate::{Assembler, Assembly};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wasm_encoder::{Export, ValType};
use wasmtime::Engine;

lazy_static! {
    pub static ref WASM_ENGINE: Engine = Engine::default();
}

/// Returns an atomically reference-counted owned string from a borrowed string.
pub fn str_arc(value: &str) -> Arc<String> {
    Arc::new(String::from(value))
}

/// Controller with scripted cancellation: the first `cancel_after` polls
/// report no cancellation, every later poll reports it.
pub struct TestController {
    diagnostics: Diagnostics,
    entry_points: BTreeMap<String, MethodId>,
    cancel_after: Option<usize>,
    polls: Cell<usize>,
}

impl TestController {
    pub fn new() -> Self {
        Self::with_entry_points(BTreeMap::new())
    }

    pub fn with_entry_points(entry_points: BTreeMap<String, MethodId>) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            entry_points,
            cancel_after: None,
            polls: Cell::new(0),
        }
    }

    pub fn cancelling_after(polls: usize) -> Self {
        let mut controller = Self::new();
        controller.cancel_after = Some(polls);
        controller
    }

    /// Number of cancellation polls observed so far.
    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

impl Controller for TestController {
    fn was_cancelled(&self) -> bool {
        let seen = self.polls.get() + 1;
        self.polls.set(seen);
        match self.cancel_after {
            Some(limit) => seen > limit,
            None => false,
        }
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn entry_points(&self) -> &BTreeMap<String, MethodId> {
        &self.entry_points
    }
}

pub fn universe_of(classes: Vec<Class>) -> ClassUniverse {
    let mut universe = ClassUniverse::new();
    for class in classes {
        universe.add(class);
    }
    universe
}

pub fn class_of(name: &str, super_name: Option<&str>, methods: Vec<Arc<Method>>) -> Class {
    Class {
        class_name: str_arc(name),
        super_class_name: super_name.map(str_arc),
        interfaces: vec![],
        fields: vec![],
        methods,
        annotations: HashMap::new(),
        is_interface: false,
        is_structure: false,
    }
}

pub fn field(name: &str, descriptor: FieldDescriptor, is_static: bool) -> Field {
    Field {
        name: str_arc(name),
        descriptor: Arc::new(descriptor),
        is_static,
    }
}

pub fn class_with_fields(
    name: &str,
    super_name: Option<&str>,
    fields: Vec<(&str, FieldDescriptor, bool)>,
) -> Class {
    let mut class = class_of(name, super_name, vec![]);
    class.fields = fields
        .into_iter()
        .map(|(name, descriptor, is_static)| field(name, descriptor, is_static))
        .collect();
    class
}

/// Class whose methods are instance methods of signature `()I`; `true` gives
/// the method a body returning 0, `false` leaves it abstract.
pub fn class_with_methods(
    name: &str,
    super_name: Option<&str>,
    methods: Vec<(&str, bool)>,
) -> Class {
    let methods = methods
        .into_iter()
        .map(|(method_name, has_body)| {
            let id = instance_ref(name, method_name);
            let body = match has_body {
                true => Some(body(vec![Expr::Return(Some(Box::new(Expr::IntConst(0))))])),
                false => None,
            };
            method(id, Modifiers::default(), HashMap::new(), body)
        })
        .collect();
    class_of(name, super_name, methods)
}

pub fn method(
    id: MethodId,
    modifiers: Modifiers,
    annotations: HashMap<String, Annotation>,
    body: Option<FunctionBody>,
) -> Arc<Method> {
    Arc::new(Method {
        id,
        modifiers,
        annotations,
        body,
    })
}

pub fn body(code: Vec<Expr>) -> FunctionBody {
    FunctionBody {
        locals: vec![],
        code,
    }
}

pub fn body_with_locals(locals: Vec<ValType>, code: Vec<Expr>) -> FunctionBody {
    FunctionBody { locals, code }
}

pub fn void_method_id(class_name: &str, name: &str) -> MethodId {
    MethodId {
        class_name: str_arc(class_name),
        name: str_arc(name),
        descriptor: Arc::new(MethodDescriptor::new(vec![], ReturnDescriptor::Void)),
    }
}

/// `<clinit>` with the given body.
pub fn clinit_of(class_name: &str, function_body: FunctionBody) -> Arc<Method> {
    method(
        void_method_id(class_name, crate::runtime::CLINIT_NAME),
        Modifiers {
            is_static: true,
            ..Modifiers::default()
        },
        HashMap::new(),
        Some(function_body),
    )
}

/// Marks a class for initialization from the start function.
pub fn annotate_static_init(class: &mut Class) {
    class
        .annotations
        .insert(String::from(STATIC_INIT_ANNOTATION), Annotation::default());
}

pub fn int_method_id(class_name: &str, name: &str) -> MethodId {
    MethodId {
        class_name: str_arc(class_name),
        name: str_arc(name),
        descriptor: Arc::new(MethodDescriptor::new(
            vec![],
            ReturnDescriptor::Field(FieldDescriptor::Int),
        )),
    }
}

/// Instance method reference of signature `()I`.
pub fn instance_ref(class_name: &str, name: &str) -> MethodId {
    int_method_id(class_name, name)
}

/// Static method of signature `()I` with the given body.
pub fn static_int_method(class_name: &str, name: &str, function_body: FunctionBody) -> Arc<Method> {
    method(
        int_method_id(class_name, name),
        Modifiers {
            is_static: true,
            ..Modifiers::default()
        },
        HashMap::new(),
        Some(function_body),
    )
}

/// Instance method of signature `()I` with the given body.
pub fn concrete_method(
    class_name: &str,
    name: &str,
    is_static: bool,
    function_body: FunctionBody,
) -> Arc<Method> {
    method(
        int_method_id(class_name, name),
        Modifiers {
            is_static,
            ..Modifiers::default()
        },
        HashMap::new(),
        Some(function_body),
    )
}

pub fn virtual_call(target: &MethodId, args: Vec<Expr>) -> Expr {
    Expr::InvokeVirtual {
        method: target.clone(),
        args,
    }
}

pub fn static_call(target: &MethodId, args: Vec<Expr>) -> Expr {
    Expr::InvokeStatic {
        method: target.clone(),
        args,
    }
}

pub fn static_int_field(class_name: &str, name: &str) -> FieldId {
    FieldId {
        class_name: str_arc(class_name),
        name: str_arc(name),
        descriptor: Arc::new(FieldDescriptor::Int),
    }
}

pub fn get_static(id: &FieldId) -> Expr {
    Expr::GetStatic(id.clone())
}

pub fn set_static(id: &FieldId, value: Expr) -> Expr {
    Expr::SetStatic(id.clone(), Box::new(value))
}

pub fn add_i32(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op: BinaryOp::Add,
        value_type: ValType::I32,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// The allocator runtime class the reachability engine would normally keep
/// live: a bump pointer in its static area, seeded from the synthesized
/// `initialize` by its `<clinit>`, and an `allocate` that stamps the class
/// record into the new instance's header word.
pub fn allocator_class() -> Class {
    let next = FieldId {
        class_name: str_arc(ALLOCATOR_CLASS),
        name: str_arc("next"),
        descriptor: Arc::new(FieldDescriptor::Object(String::from(ADDRESS_CLASS))),
    };

    let allocate = method(
        allocate_method(),
        Modifiers {
            is_static: true,
            ..Modifiers::default()
        },
        HashMap::new(),
        Some(body_with_locals(
            vec![ValType::I32],
            vec![
                // addr = next
                Expr::SetLocal(1, Box::new(Expr::GetStatic(next.clone()))),
                // addr.putInt(class record pointer)
                virtual_call(
                    &address_put_method(ValType::I32),
                    vec![Expr::GetLocal(1), Expr::GetLocal(0)],
                ),
                // next = addr + class.size (record offset 0)
                Expr::SetStatic(
                    next.clone(),
                    Box::new(add_i32(
                        Expr::GetLocal(1),
                        virtual_call(&address_get_method(ValType::I32), vec![Expr::GetLocal(0)]),
                    )),
                ),
                Expr::Return(Some(Box::new(Expr::GetLocal(1)))),
            ],
        )),
    );

    let clinit = method(
        allocator_clinit_method(),
        Modifiers {
            is_static: true,
            ..Modifiers::default()
        },
        HashMap::new(),
        Some(body(vec![Expr::SetStatic(
            next.clone(),
            Box::new(static_call(&allocator_initialize_method(), vec![])),
        )])),
    );

    let mut class = class_of(ALLOCATOR_CLASS, None, vec![allocate, clinit]);
    class.fields = vec![Field {
        name: str_arc("next"),
        descriptor: Arc::new(FieldDescriptor::Object(String::from(ADDRESS_CLASS))),
        is_static: true,
    }];
    class
        .annotations
        .insert(String::from(STATIC_INIT_ANNOTATION), Annotation::default());
    class
}

/// Runs dispatch analysis and the layout pass alone, without a controller.
pub fn layout_of(universe: &ClassUniverse) -> ClassLayout {
    let diagnostics = Diagnostics::new();
    let virtual_table = VirtualTable::build(universe, &Intrinsics::with_runtime_group(), &diagnostics);
    let mut generator = ClassLayoutGenerator::new(universe, &virtual_table);
    for class in universe.classes() {
        generator.lay_out_class(class);
    }
    generator.finish()
}

/// Enables `log` output for tests run with `RUST_LOG` set.
fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs the full pipeline, panicking on cancellation or failure.
pub fn assemble_universe(universe: &ClassUniverse, controller: &TestController) -> Assembly {
    init_test_logging();
    Assembler::new(universe, controller)
        .assemble()
        .unwrap()
        .expect("Unexpected cancellation")
}

/// Runs the full pipeline and serializes the module to text.
pub fn emit_text(universe: &ClassUniverse, controller: &TestController) -> String {
    init_test_logging();
    let mut sink = Vec::new();
    let outcome = Assembler::new(universe, controller).emit(&mut sink).unwrap();
    assert_eq!(outcome, crate::EmitOutcome::Completed);
    String::from_utf8(sink).unwrap()
}

/// Constructs a WebAssembly module exporting the specified built-in functions.
pub fn construct_builtin_module(builtins: &[BuiltinFunction]) -> Module {
    let mut module = Module::new();
    for &builtin in builtins {
        module.ensure_builtin_function(builtin);
        // Previous function index should be ensured built-in
        module.exports.export(
            builtin.name(),
            Export::Function(module.next_function_index - 1),
        );
    }
    module
}

/// Reads a little-endian i32 out of an instantiated module's linear memory.
pub fn read_i32(data: &[u8], address: u32) -> i32 {
    let address = address as usize;
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&data[address..address + 4]);
    i32::from_le_bytes(bytes)
}
