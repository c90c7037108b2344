//! The bridge facade and its builder.

use std::sync::Arc;

use crate::binder::{BoundMethod, MethodBinder};
use crate::config::BridgeConfig;
use crate::dispatch::{CallDispatcher, CallResult, Fault};
use crate::error::{BridgeError, BridgeResult};
use crate::foreign::ForeignEngine;
use crate::intern::StringInternTable;
use crate::marshal::MarshalingEngine;
use crate::method::{ExportTable, MethodTable};
use crate::registry::{CustomMarshaler, CustomMarshalerRegistry, MarshalerDescriptor};
use crate::signature::Signature;
use crate::stats::{BridgeStats, BridgeStatsSnapshot};
use crate::types::TypeKey;
use crate::value::{RawValue, Value};

/// Shared handle to one bridge: intern table, marshalers, binder cache and
/// dispatcher. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Bridge {
    config: BridgeConfig,
    interns: Arc<StringInternTable>,
    marshalers: Arc<CustomMarshalerRegistry>,
    exports: Option<Arc<ExportTable>>,
    binder: Arc<MethodBinder>,
    marshal: Arc<MarshalingEngine>,
    dispatcher: Arc<CallDispatcher>,
    stats: Arc<BridgeStats>,
}

impl Bridge {
    /// Bridge with default config and an empty [`ExportTable`]
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn interns(&self) -> &Arc<StringInternTable> {
        &self.interns
    }

    pub fn marshalers(&self) -> &Arc<CustomMarshalerRegistry> {
        &self.marshalers
    }

    /// The export table, unless a custom method table was supplied
    pub fn exports(&self) -> Option<&Arc<ExportTable>> {
        self.exports.as_ref()
    }

    pub fn binder(&self) -> &MethodBinder {
        &self.binder
    }

    pub fn marshaling(&self) -> &MarshalingEngine {
        &self.marshal
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn register_custom(
        &self,
        key: TypeKey,
        descriptor: MarshalerDescriptor,
    ) -> BridgeResult<()> {
        self.marshalers.register(key, descriptor)
    }

    pub fn register_marshaler<M: CustomMarshaler>(&self) -> BridgeResult<()> {
        self.marshalers.register_marshaler::<M>()
    }

    pub fn bind(&self, name: &str, signature_text: &str) -> BridgeResult<Arc<BoundMethod>> {
        self.binder.bind(name, signature_text)
    }

    pub fn evaluate(&self, engine: &mut dyn ForeignEngine, source: &str) -> CallResult<String> {
        self.dispatcher.evaluate(engine, source)
    }

    pub fn invoke(
        &self,
        engine: &mut dyn ForeignEngine,
        bound: &BoundMethod,
        raws: Vec<RawValue>,
    ) -> CallResult<RawValue> {
        self.dispatcher.invoke(engine, bound, raws)
    }

    /// See [`CallDispatcher::reject`]
    pub fn reject(&self, call: &str, err: &BridgeError) -> Fault {
        self.dispatcher.reject(call, err)
    }

    pub fn call(
        &self,
        engine: &mut dyn ForeignEngine,
        name: &str,
        signature_text: &str,
        raws: Vec<RawValue>,
    ) -> CallResult<RawValue> {
        self.dispatcher.call(engine, name, signature_text, raws)
    }

    pub fn invoke_foreign(
        &self,
        engine: &mut dyn ForeignEngine,
        function: &str,
        signature: &Signature,
        args: &[Value],
    ) -> CallResult<Value> {
        self.dispatcher.invoke_foreign(engine, function, signature, args)
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`Bridge`]
#[derive(Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    method_table: Option<Arc<dyn MethodTable>>,
    exports: Option<Arc<ExportTable>>,
    interns: Option<Arc<StringInternTable>>,
    marshalers: Option<Arc<CustomMarshalerRegistry>>,
}

impl BridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve methods through `table` instead of an [`ExportTable`]
    pub fn method_table(mut self, table: Arc<dyn MethodTable>) -> Self {
        self.method_table = Some(table);
        self
    }

    /// Resolve methods through an existing export table
    pub fn exports(mut self, exports: Arc<ExportTable>) -> Self {
        self.exports = Some(exports);
        self
    }

    /// Share an intern table, e.g. [`StringInternTable::global`]
    pub fn interns(mut self, interns: Arc<StringInternTable>) -> Self {
        self.interns = Some(interns);
        self
    }

    pub fn marshalers(mut self, marshalers: Arc<CustomMarshalerRegistry>) -> Self {
        self.marshalers = Some(marshalers);
        self
    }

    pub fn build(self) -> Bridge {
        let stats = Arc::new(BridgeStats::new());
        let interns = self.interns.unwrap_or_default();
        let marshalers = self.marshalers.unwrap_or_default();

        let (table, exports) = match self.method_table {
            Some(table) => (table, None),
            None => {
                let exports = self.exports.unwrap_or_default();
                let table: Arc<dyn MethodTable> = exports.clone();
                (table, Some(exports))
            }
        };

        let binder = Arc::new(
            MethodBinder::new(table, stats.clone())
                .with_stabilized_auto(self.config.stabilize_auto_signatures),
        );
        let marshal = Arc::new(
            MarshalingEngine::new(interns.clone(), marshalers.clone(), stats.clone())
                .with_intern_fast_path(self.config.intern_fast_path),
        );
        let dispatcher = Arc::new(
            CallDispatcher::new(binder.clone(), marshal.clone(), stats.clone())
                .with_catch_panics(self.config.catch_panics),
        );

        Bridge {
            config: self.config,
            interns,
            marshalers,
            exports,
            binder,
            marshal,
            dispatcher,
            stats,
        }
    }
}
