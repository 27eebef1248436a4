use crate::output::ensure::Ensurable;
use crate::runtime::INITIAL_MEMORY_PAGES;
use std::collections::HashMap;
use wasm_encoder::{
    CodeSection, ElementSection, Export, ExportSection, Function as WASMFunction, FunctionSection,
    ImportSection, MemorySection, MemoryType, Module as WASMModule, NameMap, NameSection,
    StartSection, TableSection, TypeSection,
};

/// Function whose index was handed out during the function pass but whose
/// body joins the function/code sections only once all user functions have
/// been written: dispatchers, builtins, trap stubs and the assembler's
/// synthesized functions.
pub(super) struct QueuedFunction {
    /// Index of the WebAssembly function type in the output module.
    pub type_index: u32,
    /// Index of the WebAssembly function body in the output module.
    pub function_index: u32,
    /// WebAssembly function body.
    pub function: WASMFunction,
    /// Debug name. Synthetic helpers start with `!`.
    pub name: String,
}

/// Output WebAssembly module including types, functions, memory and tables.
///
/// This has the following structure:
///
/// - Function Type Declarations (Type Section)
/// - Native Imports (Import Section)
/// - User Functions (Function Section)
/// - Dispatcher/Builtin/Trap/Synthesized Functions (Function Section)
/// - Table Declaration (Table Section)
/// - Memory Declaration (Memory Section)
/// - Entry Point Exports (Export Section)
/// - Start Designator (Start Section)
/// - Dispatch Table Elements (Element Section)
/// - Function Code (Code Section)
/// - Debug Function Names (Name Section)
///
/// While user functions are written we don't yet know which helpers later
/// functions will need, but every function's index must be fixed the moment
/// it can be called. Helpers therefore receive indices on demand and their
/// bodies are queued until the queue is flushed in index order.
pub struct Module {
    /// Helpers already present in the module: type indices for
    /// [`Ensurable::Type`], function indices otherwise.
    pub(super) ensured: HashMap<Ensurable, u32>,
    /// Index in the module of the next added function type.
    pub(super) next_type_index: u32,
    /// Index in the module of the next added function.
    pub next_function_index: u32,
    /// Bodies waiting for all user functions to be written.
    pub(super) queued_functions: Vec<QueuedFunction>,
    /// Debug names for each function, used in the WebAssembly text output.
    pub function_names: NameMap,

    // https://webassembly.github.io/spec/core/binary/modules.html#sections
    pub types: TypeSection,         // 1
    pub imports: ImportSection,     // 2
    pub functions: FunctionSection, // 3
    pub tables: TableSection,       // 4
    pub memories: MemorySection,    // 5
    pub exports: ExportSection,     // 7
    /// Function run at instantiation, before any export is callable.
    pub start: Option<u32>, // 8
    pub elements: ElementSection,   // 9
    pub codes: CodeSection,         // 10
}

impl Module {
    /// Constructs a new empty module with its linear memory declared and
    /// exported.
    pub fn new() -> Self {
        let mut module = Self {
            ensured: HashMap::new(),
            next_type_index: 0,
            next_function_index: 0,
            queued_functions: Vec::new(),
            function_names: NameMap::new(),

            types: TypeSection::new(),
            imports: ImportSection::new(),
            functions: FunctionSection::new(),
            tables: TableSection::new(),
            memories: MemorySection::new(),
            exports: ExportSection::new(),
            start: None,
            elements: ElementSection::new(),
            codes: CodeSection::new(),
        };
        module.add_memory();
        module
    }

    /// Adds and exports the module's linear memory. The low pages hold the
    /// class records; the allocator bootstrap hands out addresses above them.
    fn add_memory(&mut self) {
        self.memories.memory(MemoryType {
            minimum: INITIAL_MEMORY_PAGES,
            maximum: None,
            memory64: false,
        });
        self.exports.export("memory", Export::Memory(0));
    }

    /// Finalises this module and converts it to executable bytes. The result
    /// can be fed to `wasmprinter` or written to a binary `.wasm` file.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_queued_functions();

        // Build names section
        let mut names = NameSection::new();
        names.functions(&self.function_names);

        let mut module = WASMModule::new();
        // Attach sections to module
        module.section(&self.types);
        module.section(&self.imports);
        module.section(&self.functions);
        module.section(&self.tables);
        module.section(&self.memories);
        module.section(&self.exports);
        if let Some(function_index) = self.start {
            module.section(&StartSection { function_index });
        }
        module.section(&self.elements);
        module.section(&self.codes);
        module.section(&names);
        // Convert to bytes
        module.finish()
    }
}
