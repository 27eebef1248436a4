use crate::program::MethodId;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

/// Host of one build: supplies entry points, collects diagnostics and flags
/// cooperative cancellation.
///
/// The assembler polls [`Controller::was_cancelled`] at fixed checkpoints
/// (after each class in the layout pass, after each method in the function
/// pass, after initializer synthesis and after entry-point wiring) and
/// returns early without serializing anything once it observes `true`.
pub trait Controller {
    fn was_cancelled(&self) -> bool;

    fn diagnostics(&self) -> &Diagnostics;

    /// Configured entry points: public export name → method reference.
    /// Ordered so export wiring is deterministic.
    fn entry_points(&self) -> &BTreeMap<String, MethodId>;
}

/// Argument to a diagnostic, substituted for `{{m<i>}}` (method) and
/// `{{c<i>}}` (class) placeholders in the format string.
#[derive(Debug, Clone)]
pub enum DiagArg {
    Method(MethodId),
    Class(Arc<String>),
}

impl fmt::Display for DiagArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagArg::Method(id) => fmt::Display::fmt(id, f),
            DiagArg::Class(name) => fmt::Display::fmt(name, f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Method the problem was found in, when one is known.
    pub location: Option<MethodId>,
    pub message: String,
}

/// Accumulating diagnostic sink. Input-model problems are recorded here and
/// compilation continues; only invariant violations and I/O failures unwind
/// the pipeline.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, location: Option<&MethodId>, format: &str, args: &[DiagArg]) {
        let message = render_message(format, args);
        error!("{}", message);
        self.errors.borrow_mut().push(Diagnostic {
            location: location.cloned(),
            message,
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors.borrow().len()
    }

    pub fn errors(&self) -> Ref<'_, Vec<Diagnostic>> {
        self.errors.borrow()
    }
}

/// Replaces `{{m<i>}}`/`{{c<i>}}` placeholders with the matching argument's
/// rendered form. Placeholders without a matching argument are left as-is.
fn render_message(format: &str, args: &[DiagArg]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match lookup(key, args) {
                    Some(arg) => write!(out, "{}", arg).unwrap(),
                    None => write!(out, "{{{{{}}}}}", key).unwrap(),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(key: &str, args: &'a [DiagArg]) -> Option<&'a DiagArg> {
    let (kind, index) = key.split_at(1);
    let index: usize = index.parse().ok()?;
    let arg = args.get(index)?;
    match (kind, arg) {
        ("m", DiagArg::Method(_)) | ("c", DiagArg::Class(_)) => Some(arg),
        _ => None,
    }
}
