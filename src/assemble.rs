use crate::codegen::FunctionGenerator;
use crate::controller::{Controller, DiagArg};
use crate::intrinsics::Intrinsics;
use crate::layout::{is_structure_class, ClassLayout, ClassLayoutGenerator};
use crate::mangle::{mangle_initializer, mangle_method};
use crate::output::Module;
use crate::program::{Class, ClassUniverse, Expr, FunctionType, Method, MethodId};
use crate::runtime::{
    allocator_initialize_method, CLASS_FLAGS_OFFSET, IMPORT_ANNOTATION, INITIALIZED_FLAG,
    STATIC_INIT_ANNOTATION,
};
use crate::virtuals::VirtualTable;
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use wasm_encoder::{
    BlockType, Elements, EntityType, Export, Function as WASMFunction,
    Instruction as WASMInstruction, MemArg, TableType, ValType,
};

/// Result of one emission attempt.
#[derive(Debug, Eq, PartialEq)]
pub enum EmitOutcome {
    Completed,
    /// The controller flagged cancellation at a checkpoint; nothing was
    /// written to the sink.
    Cancelled,
}

/// What the function pass does with one method.
enum Action {
    Compile,
    Skip,
    /// Native outside the sentinel classes without an import annotation:
    /// report and drop the function, keep compiling everything else.
    Diagnose,
}

/// Finished per-build artefacts, exposed for inspection and serialization.
pub struct Assembly {
    pub module: Module,
    pub layout: ClassLayout,
    pub virtual_table: VirtualTable,
    /// Function index of every import, compiled method and synthesized
    /// `Allocator.initialize`.
    pub function_indices: HashMap<MethodId, u32>,
}

/// Drives one whole-program emission: dispatch analysis, class layout, the
/// function pass, allocator bootstrap, initializer wrappers, the start
/// function, entry-point exports and serialization.
///
/// All state is owned by one `emit` invocation; nothing persists between
/// builds.
pub struct Assembler<'a, C: Controller> {
    universe: &'a ClassUniverse,
    controller: &'a C,
    intrinsics: Intrinsics,
}

impl<'a, C: Controller> Assembler<'a, C> {
    pub fn new(universe: &'a ClassUniverse, controller: &'a C) -> Self {
        Self {
            universe,
            controller,
            intrinsics: Intrinsics::with_runtime_group(),
        }
    }

    /// Further intrinsic registrations for target-specific method groups.
    pub fn intrinsics_mut(&mut self) -> &mut Intrinsics {
        &mut self.intrinsics
    }

    /// Runs the full pipeline and writes the module's textual form to `sink`
    /// as UTF-8. Cancellation produces no output at all.
    pub fn emit<W: Write>(&self, sink: &mut W) -> anyhow::Result<EmitOutcome> {
        let assembly = match self.assemble()? {
            Some(assembly) => assembly,
            None => return Ok(EmitOutcome::Cancelled),
        };
        let bytes = assembly.module.finish();
        let wat = wasmprinter::print_bytes(&bytes).context("Unable to render module to text")?;
        sink.write_all(wat.as_bytes())
            .context("Unable to write module text")?;
        Ok(EmitOutcome::Completed)
    }

    /// Runs the full pipeline, returning `None` if cancellation was observed
    /// at any checkpoint.
    pub fn assemble(&self) -> anyhow::Result<Option<Assembly>> {
        let diagnostics = self.controller.diagnostics();
        let allocator_initialize = allocator_initialize_method();

        info!("Building dispatch tables...");
        let virtual_table = VirtualTable::build(self.universe, &self.intrinsics, diagnostics);
        virtual_table.dump();

        // 1. Layout pass
        info!("Laying out class records...");
        let mut layout_generator = ClassLayoutGenerator::new(self.universe, &virtual_table);
        for class in self.universe.classes() {
            class.dump();
            layout_generator.lay_out_class(class);
            if self.controller.was_cancelled() {
                return Ok(None);
            }
        }
        let layout = layout_generator.finish();

        let mut module = Module::new();
        let mut function_indices = HashMap::new();
        let mut symbols = HashSet::new();

        // Imports occupy the low indices WebAssembly requires, discovered by
        // a deterministic scan in first-reference order
        for id in self.collect_import_references() {
            let symbol = mangle_method(&id);
            ensure!(symbols.insert(symbol.clone()), "Mangled symbol collision: {}", symbol);
            let annotation = self
                .universe
                .get(&id.class_name)
                .and_then(|class| class.methods.iter().find(|m| m.id == id))
                .and_then(|method| method.annotation(IMPORT_ANNOTATION))
                .expect("Import references carry the import annotation");
            let module_name = annotation
                .values
                .get("module")
                .map(String::as_str)
                .unwrap_or("imports");
            let import_name = annotation
                .values
                .get("name")
                .cloned()
                .unwrap_or_else(|| id.name.to_string());
            let type_index = module.ensure_type(&id.descriptor.function_type);
            module
                .imports
                .import(module_name, Some(&import_name), EntityType::Function(type_index));
            let index = module.reserve_function();
            module.function_names.append(index, &symbol);
            function_indices.insert(id, index);
        }

        // Fix every compiled function's index up front so call sites can be
        // lowered in one pass
        debug!("Function Identifiers:");
        let mut compiled_count = 0;
        for class in self.universe.classes() {
            for method in &class.methods {
                if let Action::Compile = self.action(class, method, &allocator_initialize) {
                    let symbol = mangle_method(&method.id);
                    ensure!(
                        symbols.insert(symbol.clone()),
                        "Mangled symbol collision: {}",
                        symbol
                    );
                    let index = module.reserve_function();
                    debug!("{:>4}: {}", index, method.id);
                    module.function_names.append(index, &symbol);
                    function_indices.insert(method.id.clone(), index);
                    compiled_count += 1;
                }
            }
        }

        // Reserve indices for the synthesized functions so `InitClass` sites
        // and entry points can reference them during the function pass
        let initialize_symbol = mangle_method(&allocator_initialize);
        ensure!(
            symbols.insert(initialize_symbol.clone()),
            "Mangled symbol collision: {}",
            initialize_symbol
        );
        let initialize_index = module.reserve_function();
        module.function_names.append(initialize_index, &initialize_symbol);
        function_indices.insert(allocator_initialize.clone(), initialize_index);

        let mut initializer_indices = HashMap::new();
        let mut initializer_order = Vec::new();
        for class in self.universe.classes() {
            if layout.is_structure(&class.class_name) {
                continue;
            }
            let clinit = match class.class_initializer() {
                Some(clinit) if clinit.body.is_some() => clinit,
                _ => continue,
            };
            let clinit_id = clinit.id.clone();
            let symbol = mangle_initializer(&class.class_name);
            ensure!(symbols.insert(symbol.clone()), "Mangled symbol collision: {}", symbol);
            let index = module.reserve_function();
            module.function_names.append(index, &symbol);
            initializer_indices.insert(Arc::clone(&class.class_name), index);
            initializer_order.push((Arc::clone(&class.class_name), clinit_id, index));
        }

        let start_index = module.reserve_function();
        module.function_names.append(start_index, "__start__");

        // 2. Function pass
        info!("Compiling {} function(s)...", compiled_count);
        let generator = FunctionGenerator {
            universe: self.universe,
            layout: &layout,
            virtual_table: &virtual_table,
            intrinsics: &self.intrinsics,
            function_indices: &function_indices,
            initializer_indices: &initializer_indices,
        };
        for class in self.universe.classes() {
            for method in &class.methods {
                match self.action(class, method, &allocator_initialize) {
                    Action::Compile => {
                        let f = generator.generate(&mut module, method);
                        let func_type = match method.modifiers.is_static {
                            true => Arc::clone(&method.id.descriptor.function_type),
                            false => {
                                Arc::new(method.id.descriptor.function_type.with_implicit_this())
                            }
                        };
                        let type_index = module.ensure_type(&func_type);
                        module.functions.function(type_index);
                        module.codes.function(&f);
                    }
                    Action::Diagnose => diagnostics.error(
                        Some(&method.id),
                        "Native method {{m0}} has no import annotation",
                        &[DiagArg::Method(method.id.clone())],
                    ),
                    Action::Skip => {}
                }
                if self.controller.was_cancelled() {
                    return Ok(None);
                }
            }
        }

        // 3. Allocator bootstrap: the heap begins at the page boundary the
        // layout pass sealed
        let mut f = WASMFunction::new(vec![]);
        f.instruction(&WASMInstruction::I32Const(layout.heap_base() as i32))
            .instruction(&WASMInstruction::End);
        module.supply_function(
            initialize_index,
            &allocator_initialize.descriptor.function_type,
            initialize_symbol,
            f,
        );

        // 4. Per-class initializer wrappers
        let void_type = Arc::new(FunctionType {
            params: vec![],
            results: vec![],
        });
        for (class_name, clinit_id, wrapper_index) in &initializer_order {
            let clinit_index = function_indices[clinit_id];
            let record_address = layout.get_class_pointer(class_name) as i32;
            let f = render_initializer_wrapper(record_address, clinit_index);
            module.supply_function(
                *wrapper_index,
                &void_type,
                mangle_initializer(class_name),
                f,
            );
        }
        if self.controller.was_cancelled() {
            return Ok(None);
        }

        // 5. Start function: record stores first, then initializer calls for
        // annotated classes in universe order
        let mut f = WASMFunction::new(vec![]);
        for instruction in layout.memory_init() {
            f.instruction(instruction);
        }
        for class in self.universe.classes() {
            if class.annotation(STATIC_INIT_ANNOTATION).is_none() {
                continue;
            }
            if let Some(&index) = initializer_indices.get(&class.class_name) {
                f.instruction(&WASMInstruction::Call(index));
            }
        }
        f.instruction(&WASMInstruction::End);
        module.supply_function(start_index, &void_type, String::from("__start__"), f);
        module.start = Some(start_index);

        // Dispatch table elements, one active segment per class with slots
        self.render_dispatch_table(&mut module, &virtual_table, &function_indices);

        // 6. Entry-point exports. A configured entry point whose function was
        // never emitted was unreachable; that is not an error.
        for (name, id) in self.controller.entry_points() {
            if let Some(&index) = function_indices.get(id) {
                module.exports.export(name, Export::Function(index));
            }
        }
        if self.controller.was_cancelled() {
            return Ok(None);
        }

        Ok(Some(Assembly {
            module,
            layout,
            virtual_table,
            function_indices,
        }))
    }

    /// Walks every body once, collecting import-annotated native call targets
    /// in first-reference order.
    fn collect_import_references(&self) -> Vec<MethodId> {
        let mut seen = HashSet::new();
        let mut imports = Vec::new();
        for class in self.universe.classes() {
            for method in &class.methods {
                let body = match &method.body {
                    Some(body) => body,
                    None => continue,
                };
                for root in &body.code {
                    root.for_each(&mut |expr| {
                        let target = match expr {
                            Expr::InvokeStatic { method, .. }
                            | Expr::InvokeVirtual { method, .. } => method,
                            _ => return,
                        };
                        if seen.contains(target) || !self.is_import(target) {
                            return;
                        }
                        seen.insert(target.clone());
                        imports.push(target.clone());
                    });
                }
            }
        }
        imports
    }

    fn is_import(&self, id: &MethodId) -> bool {
        if self.intrinsics.contains(id) || is_structure_class(self.universe, &id.class_name) {
            return false;
        }
        self.universe
            .get(&id.class_name)
            .and_then(|class| class.methods.iter().find(|m| m.id == *id))
            .map(|method| {
                method.modifiers.is_native && method.annotation(IMPORT_ANNOTATION).is_some()
            })
            .unwrap_or(false)
    }

    fn action(&self, class: &Class, method: &Method, allocator_initialize: &MethodId) -> Action {
        // Synthesized below; a body in the universe would shadow the bootstrap
        if method.id == *allocator_initialize {
            return Action::Skip;
        }
        if self.intrinsics.contains(&method.id) {
            return Action::Skip;
        }
        if method.modifiers.is_native {
            // Sentinel natives are raw memory operations, silently dropped
            if is_structure_class(self.universe, &class.class_name) {
                return Action::Skip;
            }
            return match method.annotation(IMPORT_ANNOTATION) {
                Some(_) => Action::Skip, // declared on first reference
                None => Action::Diagnose,
            };
        }
        match method.body {
            Some(_) => Action::Compile,
            None => Action::Skip, // abstract
        }
    }

    /// Fills the module's funcref table with every class's dispatch slots at
    /// its base. Unresolved slots point at trap stubs.
    fn render_dispatch_table(
        &self,
        module: &mut Module,
        virtual_table: &VirtualTable,
        function_indices: &HashMap<MethodId, u32>,
    ) {
        for class_name in self.universe.class_names() {
            let table = match virtual_table.table(class_name) {
                Some(table) if !table.slots.is_empty() => table,
                _ => continue,
            };
            let slot_indices = table
                .slots
                .iter()
                .map(|slot| {
                    let target = slot
                        .target
                        .as_ref()
                        .and_then(|target| function_indices.get(target).copied());
                    target.unwrap_or_else(|| {
                        let func_type = Arc::new(
                            slot.signature.descriptor.function_type.with_implicit_this(),
                        );
                        module.ensure_trap_stub(&func_type)
                    })
                })
                .collect::<Vec<_>>();
            module.elements.active(
                None,
                &WASMInstruction::I32Const(table.base as i32),
                ValType::FuncRef,
                Elements::Functions(&slot_indices),
            );
        }
        module.tables.table(TableType {
            element_type: ValType::FuncRef,
            minimum: virtual_table.table_size(),
            maximum: Some(virtual_table.table_size()),
        });
    }
}

/// Builds the guarded `<clinit>` wrapper body: one labeled block whose exit
/// edge is the already-initialized check, followed by the flag store and the
/// call. The first call sets the flag and runs the body; later calls branch
/// out before either.
fn render_initializer_wrapper(record_address: i32, clinit_index: u32) -> WASMFunction {
    let flags = MemArg {
        offset: CLASS_FLAGS_OFFSET,
        align: 2, // log2(4) = 2
        memory_index: 0,
    };
    let mut f = WASMFunction::new(vec![]);
    f.instruction(&WASMInstruction::Block(BlockType::Empty));
    // 1. Leave if the flag word already carries the initialized bit
    f.instruction(&WASMInstruction::I32Const(record_address))
        .instruction(&WASMInstruction::I32Load(flags))
        .instruction(&WASMInstruction::I32Const(INITIALIZED_FLAG))
        .instruction(&WASMInstruction::I32And)
        .instruction(&WASMInstruction::BrIf(0));
    // 2. Set the initialized bit before running the body
    f.instruction(&WASMInstruction::I32Const(record_address))
        .instruction(&WASMInstruction::I32Const(record_address))
        .instruction(&WASMInstruction::I32Load(flags))
        .instruction(&WASMInstruction::I32Const(INITIALIZED_FLAG))
        .instruction(&WASMInstruction::I32Or)
        .instruction(&WASMInstruction::I32Store(flags));
    // 3. Run the original initializer
    f.instruction(&WASMInstruction::Call(clinit_index));
    f.instruction(&WASMInstruction::End); // block
    f.instruction(&WASMInstruction::End); // function
    f
}
