use crate::program::MethodId;
use crate::runtime::{
    allocate_method, allocator_clinit_method, compare_method, remainder_method,
};
use wasm_encoder::ValType;

/// Reachability engine hook. The engine owns the closure over the program;
/// this crate only announces which runtime helpers must stay live so their
/// bodies are present in the universe handed to [`crate::Assembler`].
pub trait DependencyConsumer {
    fn require_method(&mut self, id: &MethodId);
}

/// Announces the runtime methods the emitted code may call: the numeric
/// compare helpers, the floating remainder helpers, the allocator and the
/// allocator's initializer. Announcements carry no state, so repeating the
/// call is harmless.
pub fn contribute_runtime_dependencies(consumer: &mut dyn DependencyConsumer) {
    for t in [ValType::I32, ValType::I64, ValType::F32, ValType::F64] {
        consumer.require_method(&compare_method(t));
    }
    for t in [ValType::F32, ValType::F64] {
        consumer.require_method(&remainder_method(t));
    }
    consumer.require_method(&allocate_method());
    consumer.require_method(&allocator_clinit_method());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Recorder {
        required: HashSet<String>,
        calls: usize,
    }

    impl DependencyConsumer for Recorder {
        fn require_method(&mut self, id: &MethodId) {
            self.required.insert(id.to_string());
            self.calls += 1;
        }
    }

    #[test]
    fn announces_runtime_helpers() {
        let mut recorder = Recorder::default();
        contribute_runtime_dependencies(&mut recorder);
        let expected = [
            "runtime/WasmRuntime.compare(II)I",
            "runtime/WasmRuntime.compare(JJ)I",
            "runtime/WasmRuntime.compare(FF)I",
            "runtime/WasmRuntime.compare(DD)I",
            "runtime/WasmRuntime.remainder(FF)F",
            "runtime/WasmRuntime.remainder(DD)D",
            "runtime/Allocator.allocate(Lruntime/RuntimeClass;)Lruntime/Address;",
            "runtime/Allocator.<clinit>()V",
        ];
        assert_eq!(recorder.calls, expected.len());
        for name in &expected {
            assert!(recorder.required.contains(*name), "missing {}", name);
        }
    }

    #[test]
    fn contribution_is_idempotent() {
        let mut recorder = Recorder::default();
        contribute_runtime_dependencies(&mut recorder);
        let first = recorder.required.clone();
        contribute_runtime_dependencies(&mut recorder);
        assert_eq!(recorder.required, first);
    }
}
