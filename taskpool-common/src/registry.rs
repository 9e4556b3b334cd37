// taskpool-common/src/registry.rs
//! The cross-process callable transport.
//!
//! Rust closures can't be serialized, so a submitted payload can't carry one
//! directly the way a dynamic language can pickle an arbitrary callable.
//! Instead every task function is registered under a stable string id at
//! `ctor`-time (before `main` runs, in both the submitting binary and the
//! `taskpool-worker` binary, since both link whatever crate defines the
//! function). This mirrors `procspawn`'s function-pointer marshaling, just
//! keyed by name instead of by a generated symbol.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::TaskError;

/// Signature every registered task function must have: positional args and
/// keyword args as JSON, a JSON result or a `TaskError` on failure.
pub type TaskFn = fn(Value, Value) -> Result<Value, TaskError>;

static REGISTRY: Lazy<Mutex<HashMap<&'static str, TaskFn>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers `f` under `name`. Called from `register_task!`'s generated
/// `#[ctor::ctor]` function; not normally called directly.
pub fn register(name: &'static str, f: TaskFn) {
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    if registry.insert(name, f).is_some() {
        // A duplicate registration is a programmer error (two functions
        // registered under the same id), not a runtime condition a caller
        // can recover from.
        panic!("task function '{name}' registered more than once");
    }
}

/// Looks up a previously registered task function by id.
pub fn lookup(name: &str) -> Option<TaskFn> {
    let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    registry.get(name).copied()
}

/// Registers a `fn(Value, Value) -> Result<Value, TaskError>` as a task
/// function callable from anywhere that links this crate.
///
/// ```ignore
/// fn add(args: serde_json::Value, _kwargs: serde_json::Value) -> Result<serde_json::Value, TaskError> {
///     let (a, b): (i64, i64) = serde_json::from_value(args).map_err(TaskError::serialization)?;
///     Ok(serde_json::json!(a + b))
/// }
/// register_task!("add", add);
/// ```
#[macro_export]
macro_rules! register_task {
    ($name:expr, $func:path) => {
        const _: () = {
            #[$crate::__reexport::ctor::ctor]
            fn __register() {
                $crate::registry::register($name, $func);
            }
        };
    };
}

// `register_task!` expands in the caller's crate, so the `ctor` attribute
// macro needs to be reachable through us without forcing every caller to add
// a direct `ctor` dependency.
#[doc(hidden)]
pub mod __reexport {
    pub use ctor;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(args: Value, _kwargs: Value) -> Result<Value, TaskError> {
        let n: i64 = serde_json::from_value(args).map_err(TaskError::serialization)?;
        Ok(serde_json::json!(n * 2))
    }

    register_task!("taskpool_common_tests::double", double);

    #[test]
    fn registered_function_is_reachable_by_name() {
        let f = lookup("taskpool_common_tests::double").expect("registered at ctor time");
        let out = f(serde_json::json!(21), Value::Null).unwrap();
        assert_eq!(out, serde_json::json!(42));
    }

    #[test]
    fn unregistered_name_is_absent() {
        assert!(lookup("taskpool_common_tests::does_not_exist").is_none());
    }
}
