//! ferry-core - marshaling and dispatch for calls between a managed host and
//! JavaScript.
//!
//! The host calls JavaScript functions and JavaScript calls exported host
//! methods. Values cross according to a compact signature (`"ii"`, `"S"`,
//! `"a"`, ...) and every call reports its outcome as a [`CallResult`]: a value
//! with code `0`, or a non-zero code with a diagnostic.
//!
//! # Example
//!
//! ```
//! use ferry_core::{Bridge, ForeignEngine, ForeignError, RawValue, Signature, TypeTag, Value};
//!
//! struct NoScript;
//!
//! impl ForeignEngine for NoScript {
//!     fn evaluate(&mut self, _: &str) -> Result<Option<String>, ForeignError> {
//!         Ok(None)
//!     }
//!     fn call_function(&mut self, _: &RawValue, _: Vec<RawValue>) -> Result<RawValue, ForeignError> {
//!         Ok(RawValue::Undefined)
//!     }
//!     fn apply_filter(&mut self, _: &str, value: RawValue) -> Result<RawValue, ForeignError> {
//!         Ok(value)
//!     }
//! }
//!
//! let bridge = Bridge::new();
//! bridge
//!     .exports()
//!     .unwrap()
//!     .export(
//!         "[Demo] BP.Exports:Sum",
//!         Signature::parse("ii").unwrap().with_result(TypeTag::Int32),
//!         |args| Ok(Value::Int32(args[0].expect_i32()? + args[1].expect_i32()?)),
//!     )
//!     .unwrap();
//!
//! let result = bridge.call(
//!     &mut NoScript,
//!     "[Demo] BP.Exports:Sum",
//!     "ii",
//!     vec![RawValue::Int32(1), RawValue::Int32(2)],
//! );
//! assert_eq!(result.code(), 0);
//! assert_eq!(result.value(), Some(&RawValue::Int32(3)));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CallDispatcher                         │
//! │  - arity check, panic boundary, CallResult + exception code │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ↓                                   ↓
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       MethodBinder       │   │       MarshalingEngine       │
//! │  (name, sig) → bound     │   │  Value ⇄ RawValue per tag    │
//! │  cache over MethodTable  │   │                              │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                     │                  │
//!                                     ↓                  ↓
//!                  ┌────────────────────────┐  ┌────────────────────────┐
//!                  │   StringInternTable    │  │ CustomMarshalerRegistry│
//!                  │  content → one entry   │  │  TypeKey → converters  │
//!                  └────────────────────────┘  └────────────────────────┘
//! ```

pub mod binder;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod foreign;
pub mod intern;
pub mod marshal;
pub mod method;
pub mod registry;
pub mod signature;
pub mod stats;
pub mod types;
pub mod value;

pub use binder::{BoundMethod, MethodBinder};
pub use bridge::{Bridge, BridgeBuilder};
pub use config::BridgeConfig;
pub use dispatch::{CallDispatcher, CallResult, Fault};
pub use error::{BridgeError, BridgeResult, ForeignError};
pub use foreign::ForeignEngine;
pub use intern::{InternId, InternStats, InternedString, StringInternTable};
pub use marshal::{MarshalingEngine, infer_tag};
pub use method::{ExportTable, MethodFn, MethodHandle, MethodId, MethodTable, QualifiedName};
pub use registry::{CustomMarshaler, CustomMarshalerRegistry, MarshalerDescriptor};
pub use signature::{Signature, SignatureCache};
pub use stats::{BridgeStats, BridgeStatsSnapshot};
pub use types::{TypeKey, TypeTag};
pub use value::{CustomValue, RawValue, Value};

pub mod prelude {
    pub use crate::binder::BoundMethod;
    pub use crate::bridge::{Bridge, BridgeBuilder};
    pub use crate::config::BridgeConfig;
    pub use crate::dispatch::{CallResult, Fault};
    pub use crate::error::{BridgeError, BridgeResult, ForeignError};
    pub use crate::foreign::ForeignEngine;
    pub use crate::intern::{InternId, InternedString, StringInternTable};
    pub use crate::method::{ExportTable, MethodHandle, MethodTable};
    pub use crate::registry::{CustomMarshaler, MarshalerDescriptor};
    pub use crate::signature::Signature;
    pub use crate::types::{TypeKey, TypeTag};
    pub use crate::value::{CustomValue, RawValue, Value};
}
