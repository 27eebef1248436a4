use crate::program::Class;
use std::collections::HashMap;
use std::sync::Arc;

/// Fully linked, read-only class universe.
///
/// Iteration order is the insertion order chosen by the front end and is a
/// stated contract: emitted record addresses, table bases and the start
/// function's call sequence all derive from it, so identical universes yield
/// byte-identical modules.
#[derive(Debug, Default)]
pub struct ClassUniverse {
    names: Vec<Arc<String>>,
    classes: HashMap<Arc<String>, Class>,
}

impl ClassUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class to the universe. Duplicate names are a front-end bug.
    pub fn add(&mut self, class: Class) {
        let name = Arc::clone(&class.class_name);
        let previous = self.classes.insert(Arc::clone(&name), class);
        assert!(previous.is_none(), "Duplicate class in universe: {}", name);
        self.names.push(name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(&name.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&Class> {
        self.classes.get(&name.to_string())
    }

    /// Class names in stable universe order.
    pub fn class_names(&self) -> impl Iterator<Item = &Arc<String>> {
        self.names.iter()
    }

    /// Classes in stable universe order.
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.names.iter().map(move |name| &self.classes[name])
    }
}
