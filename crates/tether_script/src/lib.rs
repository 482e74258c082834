//! Tether Script - the host/script value bridge
//!
//! Binds host structs and functions into an embedded script runtime:
//! - `ScriptRuntime::bind` exposes structs as constructible classes and
//!   functions as callables
//! - `Bridge::to_script` / `Bridge::from_script` convert values by host type
//! - Bound instances resolve property access against tagged fields, native
//!   fields, methods and a per-instance dynamic property bag
//! - Host structs reachable from script stay alive until the script object
//!   wrapping them is collected

pub mod bridge;
pub mod error;
pub mod function;
mod interceptor;
pub mod marshal;
pub mod ownership;
pub mod registry;
pub mod runtime;
mod scope;
pub mod settings;
pub mod wrapper;

pub use bridge::Bridge;
pub use error::{BindError, BridgeError, RuntimeError, ScriptException};
pub use ownership::OwnershipTable;
pub use registry::{BindingMeta, BindingRegistry};
pub use runtime::{BindTarget, ScriptRuntime};
pub use settings::{BridgeSettings, EngineSettings, RuntimeSettings};
pub use wrapper::{Instance, InstanceWrapper};

pub use rquickjs;
