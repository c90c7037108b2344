//! Managed methods and their resolution by name.
//!
//! Qualified names follow `[Assembly] Namespace.Type:Method`. The assembly
//! prefix and the `Namespace.Type:` part are optional, so `Sum` and
//! `BP.BenchmarkExports:Sum` are valid too.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::signature::Signature;
use crate::value::Value;

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique method identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(u64);

impl MethodId {
    fn next() -> Self {
        Self(NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

pub type MethodFn = Arc<dyn Fn(&[Value]) -> BridgeResult<Value> + Send + Sync>;

/// A resolvable managed call target with its declared signature.
#[derive(Clone)]
pub struct MethodHandle {
    id: MethodId,
    name: Arc<str>,
    signature: Signature,
    target: MethodFn,
}

impl MethodHandle {
    pub fn new<F>(name: impl Into<Arc<str>>, signature: Signature, target: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        Self {
            id: MethodId::next(),
            name: name.into(),
            signature,
            target: Arc::new(target),
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter and result tags
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn invoke(&self, args: &[Value]) -> BridgeResult<Value> {
        (self.target)(args)
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Source of managed methods, looked up by qualified name.
pub trait MethodTable: Send + Sync {
    fn resolve(&self, name: &str) -> Option<MethodHandle>;
}

/// A parsed `[Assembly] Namespace.Type:Method` name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub assembly: Option<String>,
    /// `Namespace.Type`, possibly without a namespace
    pub type_name: Option<String>,
    pub method: String,
}

impl QualifiedName {
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let text = text.trim();
        let malformed = |reason: &str| BridgeError::malformed_name(text, reason);

        let (assembly, rest) = match text.strip_prefix('[') {
            Some(rest) => {
                let (assembly, rest) = rest
                    .split_once(']')
                    .ok_or_else(|| malformed("unterminated assembly name"))?;
                let assembly = assembly.trim();
                if assembly.is_empty() {
                    return Err(malformed("empty assembly name"));
                }
                (Some(assembly.to_string()), rest.trim_start())
            }
            None => (None, text),
        };

        let (type_name, method) = match rest.rsplit_once(':') {
            Some((type_name, method)) => {
                if type_name.is_empty() || type_name.split('.').any(|part| part.is_empty()) {
                    return Err(malformed("invalid type name"));
                }
                (Some(type_name.to_string()), method)
            }
            None if assembly.is_some() => {
                return Err(malformed("missing ':' before method name"));
            }
            None => (None, rest),
        };

        if method.is_empty() {
            return Err(malformed("empty method name"));
        }
        if method.chars().any(|c| c.is_whitespace() || matches!(c, '.' | ':' | '[' | ']')) {
            return Err(malformed("invalid character in method name"));
        }

        Ok(Self {
            assembly,
            type_name,
            method: method.to_string(),
        })
    }

    /// Canonical text form
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(assembly) = &self.assembly {
            write!(f, "[{}] ", assembly)?;
        }
        if let Some(type_name) = &self.type_name {
            write!(f, "{}:", type_name)?;
        }
        f.write_str(&self.method)
    }
}

/// In-process method table populated with closures.
#[derive(Default)]
pub struct ExportTable {
    methods: DashMap<String, MethodHandle>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `target` under `name`, replacing any previous export.
    ///
    /// Bindings already cached for a replaced name keep the old target until
    /// they are invalidated.
    pub fn export<F>(&self, name: &str, signature: Signature, target: F) -> BridgeResult<MethodId>
    where
        F: Fn(&[Value]) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        let canonical = QualifiedName::parse(name)?.canonical();
        let handle = MethodHandle::new(canonical.as_str(), signature, target);
        let id = handle.id();
        debug!(name = %canonical, signature = %handle.signature(), "Exported method");
        self.methods.insert(canonical, handle);
        Ok(id)
    }

    pub fn remove(&self, name: &str) -> bool {
        QualifiedName::parse(name)
            .map(|qualified| self.methods.remove(&qualified.canonical()).is_some())
            .unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl MethodTable for ExportTable {
    fn resolve(&self, name: &str) -> Option<MethodHandle> {
        let canonical = QualifiedName::parse(name).ok()?.canonical();
        self.methods.get(&canonical).map(|handle| handle.clone())
    }
}
