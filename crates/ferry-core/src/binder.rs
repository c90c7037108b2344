//! Method binding and the bound-method cache
//!
//! Resolving a name through the [`MethodTable`] costs far more than calling
//! the result, so [`MethodBinder`] resolves each `(name, signature)` pair once
//! and hands out the cached [`BoundMethod`] afterwards. Failed resolutions are
//! not cached; a method exported later is found by the next bind.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::method::{MethodHandle, MethodId, MethodTable, QualifiedName};
use crate::signature::{Signature, SignatureCache};
use crate::stats::BridgeStats;
use crate::types::TypeTag;
use crate::value::Value;

/// A resolved method with a fixed call signature.
#[derive(Debug)]
pub struct BoundMethod {
    handle: MethodHandle,
    signature: Signature,
    signature_text: String,
}

impl BoundMethod {
    /// Canonical qualified name
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn method_id(&self) -> MethodId {
        self.handle.id()
    }

    /// Call signature: parameter tags used for incoming arguments and the
    /// result tag used for the return value
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Signature text the method was bound with
    pub fn signature_text(&self) -> &str {
        &self.signature_text
    }

    pub fn declared_signature(&self) -> &Signature {
        self.handle.signature()
    }

    pub fn is_auto(&self) -> bool {
        self.signature.is_auto()
    }

    /// Fail with `ArityMismatch` unless `count` arguments fit the signature
    pub fn check_arity(&self, count: usize) -> BridgeResult<()> {
        if self.signature.accepts_arity(count) {
            return Ok(());
        }
        Err(BridgeError::ArityMismatch {
            method: self.name().to_string(),
            expected: self.signature.arity(),
            actual: count,
        })
    }

    pub(crate) fn call(&self, args: &[Value]) -> BridgeResult<Value> {
        self.handle.invoke(args)
    }
}

pub struct MethodBinder {
    table: Arc<dyn MethodTable>,
    signatures: SignatureCache,
    cache: DashMap<String, FxHashMap<String, Arc<BoundMethod>>>,
    stats: Arc<BridgeStats>,
    stabilize_auto: bool,
}

impl MethodBinder {
    pub fn new(table: Arc<dyn MethodTable>, stats: Arc<BridgeStats>) -> Self {
        Self {
            table,
            signatures: SignatureCache::new(),
            cache: DashMap::new(),
            stats,
            stabilize_auto: true,
        }
    }

    pub fn with_stabilized_auto(mut self, enabled: bool) -> Self {
        self.stabilize_auto = enabled;
        self
    }

    /// Bind `name` with `signature_text`, resolving on first use.
    pub fn bind(&self, name: &str, signature_text: &str) -> BridgeResult<Arc<BoundMethod>> {
        if let Some(bound) = self
            .cache
            .get(name)
            .and_then(|by_signature| by_signature.get(signature_text).cloned())
        {
            BridgeStats::bump(&self.stats.bind_cache_hits);
            debug!(name, signature = signature_text, "Bind cache hit");
            return Ok(bound);
        }

        let qualified = QualifiedName::parse(name)?;
        let call_signature = self.signatures.parse(signature_text)?;

        BridgeStats::bump(&self.stats.resolutions);
        let handle = self
            .table
            .resolve(&qualified.canonical())
            .ok_or_else(|| BridgeError::method_not_found(qualified.canonical()))?;

        let signature = self.bound_signature(&handle, call_signature)?;
        debug!(
            name = handle.name(),
            signature = %signature,
            "Resolved method"
        );

        let bound = Arc::new(BoundMethod {
            handle,
            signature,
            signature_text: signature_text.to_string(),
        });
        let bound = self
            .cache
            .entry(name.to_string())
            .or_default()
            .entry(signature_text.to_string())
            .or_insert(bound)
            .clone();
        Ok(bound)
    }

    fn bound_signature(&self, handle: &MethodHandle, call: Signature) -> BridgeResult<Signature> {
        let declared = handle.signature();

        if call.is_auto() {
            if self.stabilize_auto {
                return Ok(declared.clone());
            }
            return Ok(Signature::auto());
        }

        if !declared.is_auto() && declared.arity() != call.arity() {
            return Err(BridgeError::ArityMismatch {
                method: handle.name().to_string(),
                expected: declared.arity(),
                actual: call.arity(),
            });
        }

        let params = call
            .params()
            .iter()
            .enumerate()
            .map(|(index, tag)| match tag {
                TypeTag::Auto if self.stabilize_auto => declared.param(index).clone(),
                other => other.clone(),
            })
            .collect();
        Ok(Signature::new(params, declared.result().clone()))
    }

    /// Drop every cached binding of `name`, whatever spelling it was bound by.
    pub fn invalidate(&self, name: &str) -> usize {
        let Ok(qualified) = QualifiedName::parse(name) else {
            return 0;
        };
        let canonical = qualified.canonical();
        let mut removed = 0;
        self.cache.retain(|_, by_signature| {
            let before = by_signature.len();
            by_signature.retain(|_, bound| bound.name() != canonical);
            removed += before - by_signature.len();
            !by_signature.is_empty()
        });
        if removed > 0 {
            debug!(name = %canonical, removed, "Invalidated bindings");
        }
        removed
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of cached bindings
    pub fn len(&self) -> usize {
        self.cache.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::ExportTable;
    use std::sync::atomic::Ordering;

    fn binder_with_exports() -> (MethodBinder, Arc<ExportTable>, Arc<BridgeStats>) {
        let table = Arc::new(ExportTable::new());
        table
            .export(
                "[Asm] BP.Exports:Sum",
                Signature::parse("ii").unwrap().with_result(TypeTag::Int32),
                |args| Ok(Value::Int32(args[0].expect_i32()? + args[1].expect_i32()?)),
            )
            .unwrap();
        table
            .export(
                "[Asm] BP.Exports:ReturnDouble",
                Signature::parse("d").unwrap().with_result(TypeTag::Float64),
                |args| Ok(args[0].clone()),
            )
            .unwrap();
        let stats = Arc::new(BridgeStats::new());
        let binder = MethodBinder::new(table.clone(), stats.clone());
        (binder, table, stats)
    }

    #[test]
    fn test_bind_caches_per_signature() {
        let (binder, _, stats) = binder_with_exports();
        let first = binder.bind("[Asm] BP.Exports:Sum", "ii").unwrap();
        let second = binder.bind("[Asm] BP.Exports:Sum", "ii").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stats.resolutions.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bind_cache_hits.load(Ordering::Relaxed), 1);

        let auto = binder.bind("[Asm] BP.Exports:Sum", "a").unwrap();
        assert!(!Arc::ptr_eq(&first, &auto));
        assert_eq!(binder.len(), 2);
    }

    #[test]
    fn test_bound_signature_takes_declared_result() {
        let (binder, _, _) = binder_with_exports();
        let bound = binder.bind("[Asm] BP.Exports:Sum", "ii").unwrap();
        assert_eq!(bound.signature().result(), &TypeTag::Int32);
        assert_eq!(bound.signature_text(), "ii");
    }

    #[test]
    fn test_auto_signature_stabilized() {
        let (binder, _, _) = binder_with_exports();
        let bound = binder.bind("[Asm] BP.Exports:ReturnDouble", "a").unwrap();
        assert!(!bound.is_auto());
        assert_eq!(bound.signature().params(), &[TypeTag::Float64]);
    }

    #[test]
    fn test_auto_signature_unstabilized() {
        let (binder, _, _) = binder_with_exports();
        let binder = binder.with_stabilized_auto(false);
        let bound = binder.bind("[Asm] BP.Exports:ReturnDouble", "a").unwrap();
        assert!(bound.is_auto());
        assert_eq!(bound.signature().result(), &TypeTag::Auto);
    }

    #[test]
    fn test_not_found_is_not_cached() {
        let (binder, table, stats) = binder_with_exports();
        let err = binder.bind("[Asm] BP.Exports:Late", "").unwrap_err();
        assert!(matches!(err, BridgeError::MethodNotFound { reason: None, .. }));
        assert!(err.is_retryable());

        table
            .export("[Asm] BP.Exports:Late", Signature::empty(), |_| Ok(Value::Void))
            .unwrap();
        binder.bind("[Asm] BP.Exports:Late", "").unwrap();
        assert_eq!(stats.resolutions.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_signature_errors() {
        let (binder, _, _) = binder_with_exports();
        let err = binder.bind("[Asm] BP.Exports:Sum", "iq").unwrap_err();
        assert!(matches!(err, BridgeError::Signature { tag: 'q', .. }));

        let err = binder.bind("[Asm] BP.Exports:Sum", "i").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ArityMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_invalidate_by_any_spelling() {
        let (binder, _, stats) = binder_with_exports();
        binder.bind("[Asm] BP.Exports:Sum", "ii").unwrap();
        binder.bind("[Asm]BP.Exports:Sum", "a").unwrap();
        binder.bind("[Asm] BP.Exports:ReturnDouble", "d").unwrap();

        assert_eq!(binder.invalidate("[Asm] BP.Exports:Sum"), 2);
        assert_eq!(binder.len(), 1);

        binder.bind("[Asm] BP.Exports:Sum", "ii").unwrap();
        assert_eq!(stats.resolutions.load(Ordering::Relaxed), 4);

        binder.clear();
        assert!(binder.is_empty());
    }
}
