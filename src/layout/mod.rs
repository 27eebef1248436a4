use crate::program::{Class, ClassUniverse, FieldId};
use crate::runtime::{
    CLASS_HEADER_SIZE, CLASS_RECORD_BASE, CLASS_SIZE_OFFSET, CLASS_SUPER_OFFSET,
    CLASS_VTABLE_OFFSET, HEAP_ALIGNMENT, OBJECT_HEADER_SIZE, ADDRESS_CLASS, STRUCTURE_CLASS,
};
use crate::virtuals::VirtualTable;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::sync::Arc;
use wasm_encoder::{Instruction as WASMInstruction, MemArg, ValType};

/// Returns whether the named class is layout-only: the pointer and aggregate
/// sentinels themselves, anything extending the aggregate sentinel, and
/// anything the front end flagged explicitly. Structures get field offsets
/// but no record, no allocation and no initializer wrapper.
pub fn is_structure_class(universe: &ClassUniverse, name: &str) -> bool {
    let mut name = name.to_string();
    loop {
        if name == ADDRESS_CLASS || name == STRUCTURE_CLASS {
            return true;
        }
        let class = match universe.get(&name) {
            Some(class) => class,
            None => return false,
        };
        if class.is_structure {
            return true;
        }
        match &class.super_class_name {
            Some(super_name) => name = super_name.to_string(),
            None => return false,
        }
    }
}

/// Runtime record of one non-structure class in linear memory.
#[derive(Debug)]
pub struct ClassRecord {
    /// 4-aligned record address.
    pub address: u32,
    /// Bytes occupied by the record: fixed header plus the static field area.
    pub record_size: u32,
    /// Absolute addresses of the class's static fields.
    pub static_addresses: HashMap<Arc<String>, u32>,
}

/// Assigns record addresses, field offsets and the heap origin.
///
/// The assembler drives [`ClassLayoutGenerator::lay_out_class`] once per
/// class in universe order (polling cancellation between classes), then calls
/// [`ClassLayoutGenerator::finish`] to seal addresses and build the
/// memory-initializer contribution for the start function.
pub struct ClassLayoutGenerator<'a> {
    universe: &'a ClassUniverse,
    virtual_table: &'a VirtualTable,
    next_address: u32,
    records: HashMap<Arc<String>, ClassRecord>,
    /// Absolute offsets of each class's own instance fields (header and
    /// inherited fields already included).
    field_offsets: HashMap<Arc<String>, HashMap<Arc<String>, u32>>,
    instance_sizes: HashMap<Arc<String>, u32>,
    structures: HashSet<Arc<String>>,
}

impl<'a> ClassLayoutGenerator<'a> {
    pub fn new(universe: &'a ClassUniverse, virtual_table: &'a VirtualTable) -> Self {
        Self {
            universe,
            virtual_table,
            next_address: CLASS_RECORD_BASE,
            records: HashMap::new(),
            field_offsets: HashMap::new(),
            instance_sizes: HashMap::new(),
            structures: HashSet::new(),
        }
    }

    /// Bytes of instance fields declared by the class's ancestors.
    fn inherited_field_bytes(&self, class: &Class) -> u32 {
        let mut size = 0;
        let mut current = class
            .super_class_name
            .as_ref()
            .and_then(|name| self.universe.get(name));
        while let Some(parent) = current {
            size += own_instance_field_bytes(parent);
            current = parent
                .super_class_name
                .as_ref()
                .and_then(|name| self.universe.get(name));
        }
        size
    }

    /// Computes one class's field offsets, instance size and (for
    /// non-structure classes) its record address and static field area.
    pub fn lay_out_class(&mut self, class: &Class) {
        let structure = is_structure_class(self.universe, &class.class_name);
        let inherited = self.inherited_field_bytes(class);

        // Instance fields in declaration order, parent fields first;
        // structures overlay raw memory and carry no header word
        let mut offset = match structure {
            true => inherited,
            false => OBJECT_HEADER_SIZE + inherited,
        };
        let mut offsets = HashMap::new();
        for field in class.fields.iter().filter(|f| !f.is_static) {
            offsets.insert(Arc::clone(&field.name), offset);
            offset += field.descriptor.size();
        }
        self.field_offsets
            .insert(Arc::clone(&class.class_name), offsets);
        self.instance_sizes
            .insert(Arc::clone(&class.class_name), offset);

        if structure {
            self.structures.insert(Arc::clone(&class.class_name));
            return;
        }

        // Record: fixed header, then statics in declaration order
        let address = (self.next_address + 3) & !3;
        let mut static_addresses = HashMap::new();
        let mut static_offset = CLASS_HEADER_SIZE;
        for field in class.fields.iter().filter(|f| f.is_static) {
            static_addresses.insert(Arc::clone(&field.name), address + static_offset);
            static_offset += field.descriptor.size();
        }
        self.next_address = address + static_offset;
        self.records.insert(
            Arc::clone(&class.class_name),
            ClassRecord {
                address,
                record_size: static_offset,
                static_addresses,
            },
        );
    }

    /// Seals the layout: computes the heap origin (the next page boundary
    /// strictly above the last record) and the start-function stores that
    /// write each record's static header into linear memory.
    pub fn finish(self) -> ClassLayout {
        let heap_base = (self.next_address / HEAP_ALIGNMENT + 1) * HEAP_ALIGNMENT;

        let mut memory_init = Vec::with_capacity(self.records.len() * 9);
        for class in self.universe.classes() {
            let record = match self.records.get(&class.class_name) {
                Some(record) => record,
                None => continue, // structure
            };
            let address = as_i32(record.address);
            let instance_size = as_i32(self.instance_sizes[&class.class_name]);
            let table_base = as_i32(self.virtual_table.table_base(&class.class_name));
            let super_pointer = class
                .super_class_name
                .as_ref()
                .and_then(|name| self.records.get(name))
                .map(|parent| as_i32(parent.address))
                .unwrap_or(0);

            memory_init.push(WASMInstruction::I32Const(address));
            memory_init.push(WASMInstruction::I32Const(instance_size));
            memory_init.push(WASMInstruction::I32Store(record_field(CLASS_SIZE_OFFSET)));
            memory_init.push(WASMInstruction::I32Const(address));
            memory_init.push(WASMInstruction::I32Const(table_base));
            memory_init.push(WASMInstruction::I32Store(record_field(CLASS_VTABLE_OFFSET)));
            memory_init.push(WASMInstruction::I32Const(address));
            memory_init.push(WASMInstruction::I32Const(super_pointer));
            memory_init.push(WASMInstruction::I32Store(record_field(CLASS_SUPER_OFFSET)));
        }

        // Superclass names survive the universe borrow for field resolution
        let supers = self
            .universe
            .classes()
            .filter_map(|class| {
                let super_name = class.super_class_name.as_ref()?;
                Some((Arc::clone(&class.class_name), Arc::clone(super_name)))
            })
            .collect();

        ClassLayout {
            records: self.records,
            field_offsets: self.field_offsets,
            instance_sizes: self.instance_sizes,
            structures: self.structures,
            supers,
            heap_base,
            memory_init,
        }
    }
}

fn own_instance_field_bytes(class: &Class) -> u32 {
    class
        .fields
        .iter()
        .filter(|f| !f.is_static)
        .map(|f| f.descriptor.size())
        .sum()
}

fn as_i32(value: u32) -> i32 {
    i32::try_from(value).expect("Address exceeded i32 bounds")
}

fn record_field(offset: u64) -> MemArg {
    MemArg {
        offset,
        align: 2, // log2(4) = 2
        memory_index: 0,
    }
}

/// Finished layout, read-only for the rest of the build.
#[derive(Debug)]
pub struct ClassLayout {
    records: HashMap<Arc<String>, ClassRecord>,
    field_offsets: HashMap<Arc<String>, HashMap<Arc<String>, u32>>,
    instance_sizes: HashMap<Arc<String>, u32>,
    structures: HashSet<Arc<String>>,
    supers: HashMap<Arc<String>, Arc<String>>,
    heap_base: u32,
    memory_init: Vec<WASMInstruction<'static>>,
}

impl ClassLayout {
    /// Address of the class's runtime record. Unknown classes are a contract
    /// violation.
    pub fn get_class_pointer(&self, class_name: &str) -> u32 {
        match self.records.get(&class_name.to_string()) {
            Some(record) => record.address,
            None => panic!("No class record for {}", class_name),
        }
    }

    pub fn record(&self, class_name: &str) -> Option<&ClassRecord> {
        self.records.get(&class_name.to_string())
    }

    pub fn is_structure(&self, class_name: &str) -> bool {
        self.structures.contains(&class_name.to_string())
    }

    /// Total instance size including the header word (for structures, the
    /// bare aggregate size).
    pub fn instance_size(&self, class_name: &str) -> u32 {
        self.instance_sizes[&class_name.to_string()]
    }

    /// First heap address handed out by the allocator bootstrap.
    pub fn heap_base(&self) -> u32 {
        self.heap_base
    }

    /// Store sequence initializing every class record, prepended to the
    /// start function before any initializer call.
    pub fn memory_init(&self) -> &[WASMInstruction<'static>] {
        &self.memory_init
    }

    /// Returns the WebAssembly type and memory immediate for an instance
    /// field access. The declaring class is found by walking up from the
    /// reference's class, so a subclass field hiding a superclass field
    /// resolves to the nearest declaration.
    pub fn instance_field(&self, id: &FieldId) -> (ValType, MemArg) {
        let field_type = id.descriptor.as_type();
        let align = match field_type {
            ValType::I32 | ValType::F32 => 2, // log2(4) = 2
            ValType::I64 | ValType::F64 => 3, // log2(8) = 3
            _ => unimplemented!("{:?}", field_type),
        };
        let offset = self
            .resolve_field(&id.class_name, &id.name)
            .unwrap_or_else(|| panic!("No field offset for {}", id));
        let arg = MemArg {
            offset: offset as u64,
            align,
            memory_index: 0,
        };
        (field_type, arg)
    }

    /// Returns the WebAssembly type and absolute address of a static field.
    pub fn static_field(&self, id: &FieldId) -> (ValType, u32) {
        let mut class_name = Some(Arc::clone(&id.class_name));
        while let Some(name) = class_name {
            if let Some(record) = self.records.get(&name) {
                if let Some(&address) = record.static_addresses.get(&id.name) {
                    return (id.descriptor.as_type(), address);
                }
            }
            class_name = self.supers.get(&name).cloned();
        }
        panic!("No static field address for {}", id)
    }

    fn resolve_field(&self, class_name: &Arc<String>, field_name: &Arc<String>) -> Option<u32> {
        let mut class_name = Some(Arc::clone(class_name));
        while let Some(name) = class_name {
            let offset = self
                .field_offsets
                .get(&name)
                .and_then(|offsets| offsets.get(field_name));
            if let Some(&offset) = offset {
                return Some(offset);
            }
            class_name = self.supers.get(&name).cloned();
        }
        None
    }
}
