//! Typed host access to the globals, nested tables and functions of scripts
//! running on the `moonbridge-core` engine, and host functions exposed back to
//! those scripts.
//!
//! ```no_run
//! use moonbridge::{Script, ScriptFunction};
//!
//! # fn main() -> moonbridge::Result<()> {
//! let script = Script::open("config.lua")?;
//! script.set("window.width", 800)?;
//! let title: String = script.get("window.title")?;
//! let area: i64 = script.call(&ScriptFunction::new("area", 1)?, (4, 5))?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod factory;
pub mod function;
pub mod path;
pub mod range;
pub mod registry;
pub mod script;
pub mod stack;
pub mod value;
pub mod value_ref;

#[cfg(test)]
mod factory_test;
#[cfg(test)]
mod path_test;
#[cfg(test)]
mod registry_test;
#[cfg(test)]
mod test_util;
#[cfg(test)]
mod value_ref_test;

pub use error::{BridgeError, Result};
pub use factory::{Context, ContextFactory, ContextOptions};
pub use function::{Args, Returns, ScriptFunction, Spread, invoke, invoke_values};
pub use moonbridge_core::ValueType;
pub use path::DottedPath;
pub use range::{Domain, Numeric, fits, fits_in};
pub use registry::{HostFunction, HostReturn};
pub use script::{Script, ScriptOptions};
pub use stack::{FieldMap, FieldWriter, FromFields, FromStack, IntoFields, SlotGuard, ToStack};
pub use value::ScriptValue;
pub use value_ref::ValueRef;
