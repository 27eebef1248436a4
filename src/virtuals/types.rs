use crate::program::{MethodDescriptor, MethodId};
use itertools::Itertools;
use log::Level;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Method signature as seen by dynamic dispatch: simple name plus parameter
/// and return descriptors. The owning class is deliberately absent — an
/// override shares its parent's signature and therefore its slot.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Signature {
    pub name: Arc<String>,
    pub descriptor: Arc<MethodDescriptor>,
}

impl Signature {
    pub fn of(id: &MethodId) -> Self {
        Self {
            name: Arc::clone(&id.name),
            descriptor: Arc::clone(&id.descriptor),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature {{ {} }}", self)
    }
}

/// One dispatch slot of one class.
#[derive(Debug, Clone)]
pub struct VirtualSlot {
    pub signature: Signature,
    /// Implementing method. Absent when no implementation can be resolved
    /// (abstract without override, or an unknown call target) — such slots
    /// render as trap stubs.
    pub target: Option<MethodId>,
}

/// Dispatch table of a single class: inherited slots first, in the parent's
/// order, then the signatures this class introduces.
#[derive(Debug)]
pub struct ClassTable {
    pub class_name: Arc<String>,
    /// Base index of this class's slots within the module's function table.
    pub base: u32,
    pub slots: Vec<VirtualSlot>,
}

/// Per-class dispatch tables for every virtually-invoked signature in the
/// program, tree-shaken to signatures that appear at some call site.
///
/// Every class's record stores its table base (record offset 8); a virtual
/// call loads the base from the receiver's record and adds the compile-time
/// slot index of the signature, giving the index of the implementation in the
/// module's single funcref table.
#[derive(Debug)]
pub struct VirtualTable {
    pub(super) tables: HashMap<Arc<String>, ClassTable>,
    pub(super) table_size: u32,
}

impl VirtualTable {
    pub fn table(&self, class_name: &str) -> Option<&ClassTable> {
        self.tables.get(&class_name.to_string())
    }

    /// Base index of a class's dispatch slots, 0 for classes without any.
    pub fn table_base(&self, class_name: &str) -> u32 {
        self.table(class_name).map(|t| t.base).unwrap_or(0)
    }

    /// Total number of funcref table entries required by all classes.
    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    /// Slot index of a virtually-invoked method within its receiver class's
    /// table. Absence is a contract violation: every call site was scanned
    /// when the table was built.
    pub fn slot_of(&self, id: &MethodId) -> i32 {
        let table = &self.tables[&id.class_name];
        let signature = Signature::of(id);
        table
            .slots
            .iter()
            .position(|slot| slot.signature == signature)
            .unwrap_or_else(|| panic!("No dispatch slot for {}", id)) as i32
    }

    /// Logs all dispatch tables to the console at log level [`Level::Debug`].
    pub fn dump(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        debug!("Dispatch Tables:");
        for table in self.tables.values().sorted_by_key(|t| t.base) {
            debug!("{:>6}: {}", table.base, table.class_name);
            for (i, slot) in table.slots.iter().enumerate() {
                match &slot.target {
                    Some(target) => trace!("{:>8}: {} -> {}", i, slot.signature, target.class_name),
                    None => trace!("{:>8}: {} -> (trap)", i, slot.signature),
                }
            }
        }
    }
}
