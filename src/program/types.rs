use crate::program::{FieldDescriptor, MethodDescriptor};
use crate::runtime::CLINIT_NAME;
use itertools::Itertools;
use log::Level;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Formatter;
use std::sync::Arc;

/// Linked class descriptor as produced by the front end.
///
/// Everything here is read-only during emission; the assembler never mutates
/// the universe it was handed.
#[derive(Debug, Clone)]
pub struct Class {
    pub class_name: Arc<String>,
    pub super_class_name: Option<Arc<String>>,
    pub interfaces: Vec<Arc<String>>,
    pub fields: Vec<Field>,
    pub methods: Vec<Arc<Method>>,
    /// Annotations keyed by annotation class name.
    pub annotations: HashMap<String, Annotation>,
    pub is_interface: bool,
    /// Explicit structure marker. Classes extending the structure sentinel
    /// are detected during layout even without this flag.
    pub is_structure: bool,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Arc<String>,
    pub descriptor: Arc<FieldDescriptor>,
    pub is_static: bool,
}

#[derive(Debug)]
pub struct Method {
    pub id: MethodId,
    pub modifiers: Modifiers,
    /// Annotations keyed by annotation class name.
    pub annotations: HashMap<String, Annotation>,
    /// Structured body from the decompiler. Absent for native and abstract
    /// methods.
    pub body: Option<FunctionBody>,
}

/// Structured method body: the decompiler's expression tree plus the extra
/// locals it introduced beyond the parameter list.
#[derive(Debug)]
pub struct FunctionBody {
    pub locals: Vec<wasm_encoder::ValType>,
    pub code: Vec<crate::program::Expr>,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_native: bool,
    pub is_abstract: bool,
}

/// Annotation instance: element name → value, both as strings.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub values: HashMap<String, String>,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct MethodId {
    pub class_name: Arc<String>,
    pub name: Arc<String>,
    pub descriptor: Arc<MethodDescriptor>,
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

impl fmt::Debug for MethodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MethodId {{ {} }}", self)
    }
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct FieldId {
    pub class_name: Arc<String>,
    pub name: Arc<String>,
    pub descriptor: Arc<FieldDescriptor>,
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FieldId {{ {} }}", self)
    }
}

impl Class {
    pub fn annotation(&self, annotation_class: &str) -> Option<&Annotation> {
        self.annotations.get(annotation_class)
    }

    /// Returns the class's static initializer, if it declares one.
    pub fn class_initializer(&self) -> Option<&Arc<Method>> {
        self.methods.iter().find(|m| *m.id.name == CLINIT_NAME)
    }

    pub fn dump(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        match &self.super_class_name {
            Some(super_name) => debug!("Class: {} (extends {})", self.class_name, super_name),
            None => debug!("Class: {}", self.class_name),
        }
        if !self.annotations.is_empty() {
            trace!("  Annotations: {}", self.annotations.keys().sorted().join(", "));
        }
        for field in &self.fields {
            trace!("  Field: {}{} (static: {})", field.name, field.descriptor, field.is_static);
        }
        for method in &self.methods {
            debug!(
                "  Method: ({:?}) {}{}",
                method.modifiers, method.id.name, method.id.descriptor,
            );
        }
    }
}

impl Method {
    pub fn annotation(&self, annotation_class: &str) -> Option<&Annotation> {
        self.annotations.get(annotation_class)
    }
}
