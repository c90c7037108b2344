//! Call dispatch and the exception-signaling protocol
//!
//! Every crossing ends in a [`CallResult`]: either a typed value with code `0`
//! or a non-zero code with a diagnostic. Nothing a call does, including a
//! panic in a managed target, unwinds past the dispatcher.

use std::fmt;
use std::num::NonZeroI32;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::binder::{BoundMethod, MethodBinder};
use crate::error::{BridgeError, BridgeResult};
use crate::foreign::ForeignEngine;
use crate::marshal::MarshalingEngine;
use crate::signature::Signature;
use crate::stats::BridgeStats;
use crate::types::TypeTag;
use crate::value::{RawValue, Value};

/// A failed call: non-zero code plus a human-readable diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic} (code {code})")]
pub struct Fault {
    pub code: NonZeroI32,
    pub diagnostic: String,
}

impl From<&BridgeError> for Fault {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.code(),
            diagnostic: err.to_string(),
        }
    }
}

/// Outcome of one call across the bridge.
///
/// The code must be checked before the value is used: a result text of `"0"`
/// and a failure are otherwise indistinguishable on the wire.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult<T> {
    Completed(T),
    Faulted(Fault),
}

impl<T> CallResult<T> {
    pub fn fault(err: &BridgeError) -> Self {
        Self::Faulted(Fault::from(err))
    }

    /// Exception code: `0` on success
    pub fn code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            Self::Faulted(fault) => fault.code.get(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Faulted(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Faulted(fault) => Some(&fault.diagnostic),
        }
    }

    pub fn into_result(self) -> Result<T, Fault> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Faulted(fault) => Err(fault),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U> {
        match self {
            Self::Completed(value) => CallResult::Completed(f(value)),
            Self::Faulted(fault) => CallResult::Faulted(fault),
        }
    }
}

impl<T: From<String>> CallResult<T> {
    /// `(value, code)` pair; a faulted value is the diagnostic text
    pub fn into_parts(self) -> (T, i32) {
        let code = self.code();
        match self {
            Self::Completed(value) => (value, code),
            Self::Faulted(fault) => (T::from(fault.diagnostic), code),
        }
    }
}

impl<T> From<BridgeResult<T>> for CallResult<T> {
    fn from(result: BridgeResult<T>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(err) => Self::fault(&err),
        }
    }
}

impl<T: fmt::Display> fmt::Display for CallResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(value) => write!(f, "{}", value),
            Self::Faulted(fault) => write!(f, "{}", fault),
        }
    }
}

pub struct CallDispatcher {
    binder: Arc<MethodBinder>,
    marshal: Arc<MarshalingEngine>,
    stats: Arc<BridgeStats>,
    catch_panics: bool,
}

impl CallDispatcher {
    pub fn new(
        binder: Arc<MethodBinder>,
        marshal: Arc<MarshalingEngine>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            binder,
            marshal,
            stats,
            catch_panics: true,
        }
    }

    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Evaluate `source` on the foreign side. `undefined` and `null` yield
    /// empty text.
    pub fn evaluate(&self, engine: &mut dyn ForeignEngine, source: &str) -> CallResult<String> {
        let result = self.guard(|| {
            engine
                .evaluate(source)
                .map(Option::unwrap_or_default)
                .map_err(BridgeError::from)
        });
        self.finish("evaluate", result)
    }

    /// Bind `name` with `signature_text` and invoke it
    pub fn call(
        &self,
        engine: &mut dyn ForeignEngine,
        name: &str,
        signature_text: &str,
        raws: Vec<RawValue>,
    ) -> CallResult<RawValue> {
        let result = self
            .binder
            .bind(name, signature_text)
            .and_then(|bound| self.guard(|| self.invoke_bound(engine, &bound, raws)));
        self.finish(name, result)
    }

    /// Invoke an already bound method with raw foreign arguments
    pub fn invoke(
        &self,
        engine: &mut dyn ForeignEngine,
        bound: &BoundMethod,
        raws: Vec<RawValue>,
    ) -> CallResult<RawValue> {
        let result = self.guard(|| self.invoke_bound(engine, bound, raws));
        self.finish(bound.name(), result)
    }

    /// Count and report a call that failed before any argument was
    /// converted, e.g. a front end that checks arity ahead of conversion
    pub fn reject(&self, call: &str, err: &BridgeError) -> Fault {
        BridgeStats::bump(&self.stats.calls);
        self.record_fault(call, err);
        Fault::from(err)
    }

    /// Call the global foreign function `function` with managed arguments.
    ///
    /// The function name travels on the interned-string path.
    pub fn invoke_foreign(
        &self,
        engine: &mut dyn ForeignEngine,
        function: &str,
        signature: &Signature,
        args: &[Value],
    ) -> CallResult<Value> {
        let result = self.guard(|| self.call_foreign(engine, function, signature, args));
        self.finish(function, result)
    }

    fn invoke_bound(
        &self,
        engine: &mut dyn ForeignEngine,
        bound: &BoundMethod,
        raws: Vec<RawValue>,
    ) -> BridgeResult<RawValue> {
        bound.check_arity(raws.len())?;
        let signature = bound.signature();

        let args = raws
            .into_iter()
            .enumerate()
            .map(|(index, raw)| self.marshal.from_foreign(raw, signature.param(index), engine))
            .collect::<BridgeResult<Vec<_>>>()?;

        let result = bound.call(&args)?;
        self.marshal.to_foreign(&result, signature.result(), engine)
    }

    fn call_foreign(
        &self,
        engine: &mut dyn ForeignEngine,
        function: &str,
        signature: &Signature,
        args: &[Value],
    ) -> BridgeResult<Value> {
        if !signature.accepts_arity(args.len()) {
            return Err(BridgeError::ArityMismatch {
                method: function.to_string(),
                expected: signature.arity(),
                actual: args.len(),
            });
        }

        let name = self.marshal.to_foreign(
            &Value::from(function),
            &TypeTag::InternedString,
            engine,
        )?;

        let raws = args
            .iter()
            .enumerate()
            .map(|(index, arg)| self.marshal.to_foreign(arg, signature.param(index), engine))
            .collect::<BridgeResult<Vec<_>>>()?;

        let result = engine.call_function(&name, raws)?;
        self.marshal.from_foreign(result, signature.result(), engine)
    }

    fn guard<T>(&self, f: impl FnOnce() -> BridgeResult<T>) -> BridgeResult<T> {
        if !self.catch_panics {
            return f();
        }
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("panic: {}", s)
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("panic: {}", s)
                } else {
                    "panic: unknown error".to_string()
                };
                error!("Managed call panicked: {}", message);
                Err(BridgeError::managed(message))
            }
        }
    }

    fn finish<T>(&self, call: &str, result: BridgeResult<T>) -> CallResult<T> {
        BridgeStats::bump(&self.stats.calls);
        if let Err(err) = &result {
            self.record_fault(call, err);
        }
        CallResult::from(result)
    }

    fn record_fault(&self, call: &str, err: &BridgeError) {
        BridgeStats::bump(&self.stats.faults);
        debug!(
            call,
            kind = err.kind(),
            code = err.code().get(),
            error = %err,
            "Call faulted"
        );
    }
}
