//! ferry-boa - the ferry bridge over the Boa JavaScript engine.
//!
//! [`BoaEngine`] implements [`ForeignEngine`](ferry_core::ForeignEngine) and
//! installs a global `Ferry` object so scripts can call managed exports.
//!
//! # Example
//!
//! ```
//! use ferry_boa::BoaEngine;
//! use ferry_core::{Bridge, Signature, TypeTag, Value};
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
//! let mut engine = BoaEngine::new(bridge).unwrap();
//! let result = engine.eval(r#"Ferry.callStaticMethod("[Demo] BP.Exports:Sum", [1, 2], "ii")"#);
//! assert_eq!(result.into_parts(), ("3".to_string(), 0));
//! ```
//!
//! # Thread Safety
//!
//! [`BoaEngine`] is `!Send`. The [`Bridge`](ferry_core::Bridge) it wraps is
//! `Send + Sync`, so one bridge can back one engine per thread.

mod api;
pub mod convert;
mod engine;

pub use api::GLOBAL_NAME;
pub use convert::{ForeignStrings, SharedStrings, foreign_error, number_to_raw};
pub use engine::BoaEngine;
