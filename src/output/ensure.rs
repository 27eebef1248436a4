use crate::mangle::mangle_signature;
use crate::output::builtin::{construct_compare, construct_rem, BuiltinFunction};
use crate::output::types::QueuedFunction;
use crate::output::Module;
use crate::program::FunctionType;
use crate::runtime::{CLASS_VTABLE_OFFSET, OBJECT_HEADER_MEM_ARG};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use wasm_encoder::{
    Function as WASMFunction, Instruction as WASMInstruction, MemArg, TypeSection, ValType,
};

/// Module-level helper a function body may depend on, included at most once.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Ensurable {
    Type(Arc<FunctionType>),
    Dispatcher(Arc<FunctionType>),
    Builtin(BuiltinFunction),
    TrapStub(Arc<FunctionType>),
}

fn ensure_type(
    ensured: &mut HashMap<Ensurable, u32>,
    next_type_index: &mut u32,
    types: &mut TypeSection,
    func_type: &Arc<FunctionType>,
) -> u32 {
    // Return existing type index or create a new one
    *ensured
        .entry(Ensurable::Type(Arc::clone(func_type)))
        .or_insert_with_key(|_| {
            // Write to type section
            types.function(
                func_type.params.iter().copied(),
                func_type.results.iter().copied(),
            );
            // Return and increment current type index
            let index = *next_type_index;
            *next_type_index += 1;
            index
        })
}

impl Module {
    /// Writes all queued function bodies to the function/code sections in
    /// index order. Runs automatically from [`Module::finish`].
    pub(crate) fn flush_queued_functions(&mut self) {
        self.queued_functions
            .sort_by_key(|func| func.function_index);
        let Module {
            functions,
            codes,
            function_names,
            ..
        } = self;
        for func in self.queued_functions.drain(..) {
            functions.function(func.type_index);
            codes.function(&func.function);
            function_names.append(func.function_index, &func.name);
        }
    }

    pub fn ensure_type(&mut self, func_type: &Arc<FunctionType>) -> u32 {
        let Module {
            ensured,
            next_type_index,
            types,
            ..
        } = self;
        ensure_type(ensured, next_type_index, types, func_type)
    }

    /// Hands out the next function index without supplying a body yet. The
    /// assembler reserves indices for its synthesized functions this way so
    /// call sites can reference them during the function pass.
    pub(crate) fn reserve_function(&mut self) -> u32 {
        let index = self.next_function_index;
        self.next_function_index += 1;
        index
    }

    /// Supplies the body for a previously reserved function index.
    pub(crate) fn supply_function(
        &mut self,
        function_index: u32,
        func_type: &Arc<FunctionType>,
        name: String,
        function: WASMFunction,
    ) {
        let type_index = self.ensure_type(func_type);
        self.queued_functions.push(QueuedFunction {
            type_index,
            function_index,
            function,
            name,
        });
    }

    /// Returns the index of the dispatcher for instance methods of the given
    /// (receiver-less) function type, creating it on first use.
    ///
    /// Dispatchers solve the stack-access problem of dynamic dispatch: the
    /// receiver sits underneath the arguments, and WebAssembly cannot reach
    /// past them. As a function, the dispatcher has all operands as locals;
    /// it reloads the receiver, follows its header word to the class record,
    /// loads the dispatch-table base from the record and adds the caller's
    /// slot constant for the `call_indirect`.
    pub(crate) fn ensure_dispatcher_function(&mut self, func_type: &Arc<FunctionType>) -> u32 {
        let Module {
            ensured,
            next_type_index,
            next_function_index,
            queued_functions,
            types,
            ..
        } = self;
        // Return existing dispatcher function index or create a new one
        match ensured.entry(Ensurable::Dispatcher(Arc::clone(func_type))) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                // Get, store and increment current function index (do this
                // here not on return as we need a mutable borrow of `ensured`
                // later, but must store into the `entry` borrowed from it)
                let index = *next_function_index;
                *next_function_index += 1;
                entry.insert(index);

                // Type of the target methods, with the implicit receiver
                let mut func_type = func_type.with_implicit_this();
                let name = format!("!Dispatcher_{}", mangle_signature(&func_type));
                let target_func_type = Arc::new(func_type.clone());
                let target_type_index =
                    ensure_type(ensured, next_type_index, types, &target_func_type);
                // Number of parameters forwarded to the indirect call
                let call_params_len = func_type.params.len() as u32;
                // The dispatcher itself takes one extra slot parameter
                func_type.params.push(ValType::I32);
                let dispatcher_type_index =
                    ensure_type(ensured, next_type_index, types, &Arc::new(func_type));

                // Construct dispatcher function code
                let mut f = WASMFunction::new(vec![]);
                // 1. Forward all parameters for the indirect call
                for i in 0..call_params_len {
                    f.instruction(&WASMInstruction::LocalGet(i));
                }
                // 2. Follow the receiver's header word to its class record...
                f.instruction(&WASMInstruction::LocalGet(0));
                f.instruction(&WASMInstruction::I32Load(OBJECT_HEADER_MEM_ARG));
                //    ...and read the record's dispatch-table base
                f.instruction(&WASMInstruction::I32Load(MemArg {
                    offset: CLASS_VTABLE_OFFSET,
                    align: 2,
                    memory_index: 0,
                }));
                // 3. Add the signature's slot index
                f.instruction(&WASMInstruction::LocalGet(call_params_len));
                f.instruction(&WASMInstruction::I32Add);
                // 4. Call the implementation with the forwarded parameters
                f.instruction(&WASMInstruction::CallIndirect {
                    ty: target_type_index,
                    table: 0,
                });
                f.instruction(&WASMInstruction::End);

                // Queue writing function to sections
                queued_functions.push(QueuedFunction {
                    type_index: dispatcher_type_index,
                    function_index: index,
                    function: f,
                    name,
                });

                // Return function index
                index
            }
        }
    }

    /// Returns the index of the trap stub for the given (full) function
    /// type, creating it on first use. Trap stubs fill dispatch slots whose
    /// implementation could not be resolved.
    pub(crate) fn ensure_trap_stub(&mut self, func_type: &Arc<FunctionType>) -> u32 {
        let Module {
            ensured,
            next_type_index,
            next_function_index,
            queued_functions,
            types,
            ..
        } = self;
        match ensured.entry(Ensurable::TrapStub(Arc::clone(func_type))) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = *next_function_index;
                *next_function_index += 1;
                entry.insert(index);

                let type_index = ensure_type(ensured, next_type_index, types, func_type);
                let mut f = WASMFunction::new(vec![]);
                f.instruction(&WASMInstruction::Unreachable)
                    .instruction(&WASMInstruction::End);
                queued_functions.push(QueuedFunction {
                    type_index,
                    function_index: index,
                    function: f,
                    name: format!("!Trap_{}", mangle_signature(func_type)),
                });

                index
            }
        }
    }

    /// Returns the index of the given builtin helper, creating it on first
    /// use.
    pub(crate) fn ensure_builtin_function(&mut self, builtin: BuiltinFunction) -> u32 {
        let Module {
            ensured,
            next_type_index,
            next_function_index,
            queued_functions,
            types,
            ..
        } = self;
        // Return existing builtin function index or create a new one
        match ensured.entry(Ensurable::Builtin(builtin)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = *next_function_index;
                *next_function_index += 1;
                entry.insert(index);

                // Construct builtin function
                let (func_type, f) = match builtin {
                    BuiltinFunction::IntCmp => construct_compare(ValType::I32),
                    BuiltinFunction::LongCmp => construct_compare(ValType::I64),
                    BuiltinFunction::FloatCmp => construct_compare(ValType::F32),
                    BuiltinFunction::DoubleCmp => construct_compare(ValType::F64),
                    BuiltinFunction::FloatRem => construct_rem(ValType::F32),
                    BuiltinFunction::DoubleRem => construct_rem(ValType::F64),
                };

                // Get type of constructed function
                let type_index = ensure_type(ensured, next_type_index, types, &Arc::new(func_type));
                // Queue writing function to sections
                queued_functions.push(QueuedFunction {
                    type_index,
                    function_index: index,
                    function: f,
                    name: String::from(builtin.name()),
                });

                index
            }
        }
    }
}
