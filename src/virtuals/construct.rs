use crate::controller::{DiagArg, Diagnostics};
use crate::intrinsics::Intrinsics;
use crate::layout::is_structure_class;
use crate::program::{Class, ClassUniverse, Expr, MethodId};
use crate::virtuals::{ClassTable, Signature, VirtualSlot, VirtualTable};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Result of enumerating every virtual call site in the program.
struct CallSiteScan {
    /// Signatures observed at some call site; only these get dispatch slots.
    signatures: HashSet<Signature>,
    /// Signatures whose target could not be resolved anywhere in the
    /// receiver's hierarchy, keyed by receiver class. These still get slots
    /// so dispatch lands in a trap stub instead of arbitrary code.
    unresolved: HashMap<Arc<String>, Vec<Signature>>,
}

impl VirtualTable {
    /// Builds the per-class dispatch tables.
    ///
    /// Every method body is scanned for virtual invocation targets, then the
    /// class hierarchy is walked in preorder (roots and children in universe
    /// order): each class inherits its parent's slots, overrides update the
    /// inherited slot in place, and newly-introduced signatures that appear
    /// at a call site are appended. Unknown targets are reported through the
    /// controller's diagnostics and never panic.
    pub fn build(
        universe: &ClassUniverse,
        intrinsics: &Intrinsics,
        diagnostics: &Diagnostics,
    ) -> Self {
        let scan = scan_call_sites(universe, intrinsics, diagnostics);

        // Group subclasses under their superclass. Classes whose superclass
        // is absent or layout-only start their own hierarchy.
        let mut roots: Vec<&Class> = Vec::new();
        let mut children: HashMap<Arc<String>, Vec<&Class>> = HashMap::new();
        for class in universe.classes() {
            if is_structure_class(universe, &class.class_name) {
                continue; // no dispatch on inline aggregates
            }
            match &class.super_class_name {
                Some(super_name)
                    if universe.contains(super_name)
                        && !is_structure_class(universe, super_name) =>
                {
                    children
                        .entry(Arc::clone(super_name))
                        .or_insert_with(Vec::new)
                        .push(class);
                }
                _ => roots.push(class),
            }
        }

        let mut tables = HashMap::new();
        for root in roots {
            populate_tables(&scan, &children, root, vec![], &mut tables);
        }

        // Assign table bases in universe order so identical universes yield
        // identical element segments.
        let mut offset = 0;
        for class_name in universe.class_names() {
            if let Some(table) = tables.get_mut(class_name) {
                table.base = offset;
                offset += table.slots.len() as u32;
            }
        }

        Self {
            tables,
            table_size: offset,
        }
    }
}

fn scan_call_sites(
    universe: &ClassUniverse,
    intrinsics: &Intrinsics,
    diagnostics: &Diagnostics,
) -> CallSiteScan {
    let mut signatures = HashSet::new();
    let mut seen_targets = HashSet::new();
    let mut unresolved: HashMap<Arc<String>, Vec<Signature>> = HashMap::new();

    for class in universe.classes() {
        for method in &class.methods {
            let body = match &method.body {
                Some(body) => body,
                None => continue,
            };
            for root in &body.code {
                root.for_each(&mut |expr| {
                    let target = match expr {
                        Expr::InvokeVirtual { method, .. } => method,
                        _ => return,
                    };
                    // Intrinsic and layout-only targets never reach dispatch
                    if intrinsics.contains(target)
                        || is_structure_class(universe, &target.class_name)
                    {
                        return;
                    }
                    signatures.insert(Signature::of(target));
                    if !seen_targets.insert(target.clone()) {
                        return;
                    }
                    if !resolves(universe, target) {
                        diagnostics.error(
                            Some(&method.id),
                            "Virtual call to unknown method {{m0}}",
                            &[DiagArg::Method(target.clone())],
                        );
                        if universe.contains(&target.class_name) {
                            unresolved
                                .entry(Arc::clone(&target.class_name))
                                .or_insert_with(Vec::new)
                                .push(Signature::of(target));
                        }
                    }
                });
            }
        }
    }

    CallSiteScan {
        signatures,
        unresolved,
    }
}

/// Checks whether some class in the target's superclass chain declares an
/// instance method with the target's signature.
fn resolves(universe: &ClassUniverse, target: &MethodId) -> bool {
    let mut current = universe.get(&target.class_name);
    while let Some(class) = current {
        let declared = class.methods.iter().any(|m| {
            !m.modifiers.is_static
                && m.id.name == target.name
                && m.id.descriptor == target.descriptor
        });
        if declared {
            return true;
        }
        current = class
            .super_class_name
            .as_ref()
            .and_then(|name| universe.get(name));
    }
    false
}

/// Builds one class's slot list from its parent's and recurses into
/// subclasses, so an inherited signature keeps its index all the way down.
fn populate_tables(
    scan: &CallSiteScan,
    children: &HashMap<Arc<String>, Vec<&Class>>,
    class: &Class,
    mut slots: Vec<VirtualSlot>,
    tables: &mut HashMap<Arc<String>, ClassTable>,
) {
    for method in &class.methods {
        // Constructors and initializers never dispatch dynamically
        if method.modifiers.is_static || method.id.name.starts_with('<') {
            continue;
        }
        let signature = Signature::of(&method.id);
        let target = method.body.as_ref().map(|_| method.id.clone());
        match slots.iter_mut().find(|slot| slot.signature == signature) {
            // Overrides reuse the parent slot, repointing it at this class's
            // implementation. Abstract re-declarations keep the inherited one.
            Some(slot) => {
                if target.is_some() {
                    slot.target = target;
                }
            }
            None => {
                if scan.signatures.contains(&signature) {
                    slots.push(VirtualSlot { signature, target });
                }
            }
        }
    }

    // Slots for unresolved call targets naming this class directly
    if let Some(signatures) = scan.unresolved.get(&class.class_name) {
        for signature in signatures {
            if !slots.iter().any(|slot| slot.signature == *signature) {
                slots.push(VirtualSlot {
                    signature: signature.clone(),
                    target: None,
                });
            }
        }
    }

    for &child in children.get(&class.class_name).into_iter().flatten() {
        populate_tables(scan, children, child, slots.clone(), tables);
    }

    tables.insert(
        Arc::clone(&class.class_name),
        ClassTable {
            class_name: Arc::clone(&class.class_name),
            base: 0, // assigned once all tables exist
            slots,
        },
    );
}

#[cfg(test)]
mod tests {
    use crate::intrinsics::Intrinsics;
    use crate::controller::Diagnostics;
    use crate::program::Expr;
    use crate::tests::{
        body, class_with_methods, concrete_method, instance_ref, universe_of, virtual_call,
    };
    use crate::virtuals::VirtualTable;

    #[test]
    fn overrides_share_the_parent_slot() {
        // Animal.speak() overridden by Dog, with one call site animal.speak()
        let speak = instance_ref("zoo/Animal", "speak");
        let caller = concrete_method(
            "zoo/App",
            "run",
            true,
            body(vec![Expr::Drop(Box::new(virtual_call(&speak, vec![Expr::IntConst(0)])))]),
        );
        let universe = universe_of(vec![
            class_with_methods("zoo/Animal", None, vec![("speak", true)]),
            class_with_methods("zoo/Dog", Some("zoo/Animal"), vec![("speak", true)]),
            class_with_methods("zoo/Cat", Some("zoo/Animal"), vec![]),
            crate::tests::class_of("zoo/App", None, vec![caller]),
        ]);

        let diagnostics = Diagnostics::new();
        let table = VirtualTable::build(&universe, &Intrinsics::with_runtime_group(), &diagnostics);
        assert_eq!(diagnostics.error_count(), 0);

        let animal_slot = table.slot_of(&speak);
        let dog_slot = table.slot_of(&instance_ref("zoo/Dog", "speak"));
        let cat_slot = table.slot_of(&instance_ref("zoo/Cat", "speak"));
        assert_eq!(animal_slot, dog_slot);
        assert_eq!(animal_slot, cat_slot);

        // Dog's slot points at Dog's implementation, Animal's at Animal's,
        // and Cat inherits Animal's
        let target_of = |class: &str| {
            table.table(class).unwrap().slots[animal_slot as usize]
                .target
                .clone()
                .unwrap()
        };
        assert_eq!(*target_of("zoo/Animal").class_name, "zoo/Animal");
        assert_eq!(*target_of("zoo/Dog").class_name, "zoo/Dog");
        assert_eq!(*target_of("zoo/Cat").class_name, "zoo/Animal");
    }

    #[test]
    fn uncalled_signatures_get_no_slot() {
        let universe = universe_of(vec![class_with_methods(
            "zoo/Animal",
            None,
            vec![("speak", true), ("sleep", true)],
        )]);
        let diagnostics = Diagnostics::new();
        let table = VirtualTable::build(&universe, &Intrinsics::with_runtime_group(), &diagnostics);
        // No call sites at all: tables exist but stay empty
        assert_eq!(table.table("zoo/Animal").unwrap().slots.len(), 0);
        assert_eq!(table.table_size(), 0);
    }

    #[test]
    fn unknown_target_reports_and_traps() {
        let phantom = instance_ref("zoo/Animal", "phantom");
        let caller = concrete_method(
            "zoo/App",
            "run",
            true,
            body(vec![Expr::Drop(Box::new(virtual_call(&phantom, vec![Expr::IntConst(0)])))]),
        );
        let universe = universe_of(vec![
            class_with_methods("zoo/Animal", None, vec![]),
            crate::tests::class_of("zoo/App", None, vec![caller]),
        ]);

        let diagnostics = Diagnostics::new();
        let table = VirtualTable::build(&universe, &Intrinsics::with_runtime_group(), &diagnostics);
        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].message.contains("zoo/Animal.phantom"));

        // The slot exists so dispatch lands in a trap stub
        let animal = table.table("zoo/Animal").unwrap();
        assert_eq!(animal.slots.len(), 1);
        assert!(animal.slots[0].target.is_none());
    }
}
