//! Compact call signatures.
//!
//! A signature is one tag per parameter plus a result tag. The textual form
//! is a string of one-letter tags:
//!
//! | Letter | Tag              |
//! |--------|------------------|
//! | `i`    | int32            |
//! | `d`    | float64          |
//! | `s`    | string (copied)  |
//! | `S`    | interned string  |
//! | `a`    | auto             |
//!
//! The empty string means "no parameters". A lone `a` is the auto signature:
//! any number of arguments, each tag inferred at the call boundary.

use dashmap::DashMap;
use std::fmt;

use crate::error::{BridgeError, BridgeResult};
use crate::types::TypeTag;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Vec<TypeTag>,
    result: TypeTag,
}

impl Signature {
    pub fn new(params: Vec<TypeTag>, result: TypeTag) -> Self {
        Self { params, result }
    }

    /// No parameters, void result
    pub fn empty() -> Self {
        Self::new(Vec::new(), TypeTag::Void)
    }

    /// The variadic auto signature (`"a"`)
    pub fn auto() -> Self {
        Self::new(vec![TypeTag::Auto], TypeTag::Auto)
    }

    /// Parse the textual form. The result tag defaults to `Void`.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let params = text
            .chars()
            .enumerate()
            .map(|(position, tag)| {
                TypeTag::from_letter(tag).ok_or_else(|| BridgeError::Signature {
                    text: text.to_string(),
                    tag,
                    position,
                })
            })
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(Self::new(params, TypeTag::Void))
    }

    pub fn with_result(mut self, result: TypeTag) -> Self {
        self.result = result;
        self
    }

    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    pub fn result(&self) -> &TypeTag {
        &self.result
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.params.as_slice(), [TypeTag::Auto])
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        self.is_auto() || self.params.len() == count
    }

    /// Tag for the parameter at `index`; every position is `Auto` for the
    /// auto signature.
    pub fn param(&self, index: usize) -> &TypeTag {
        if self.is_auto() {
            return &TypeTag::Auto;
        }
        self.params.get(index).unwrap_or(&TypeTag::Auto)
    }

    /// Textual form of the parameters, `None` when a tag has no letter
    pub fn to_text(&self) -> Option<String> {
        self.params.iter().map(TypeTag::letter).collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, tag) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", tag)?;
        }
        write!(f, ") -> {}", self.result)
    }
}

/// Memoizes parsed signatures by their text.
#[derive(Default)]
pub struct SignatureCache {
    parsed: DashMap<String, Signature>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, text: &str) -> BridgeResult<Signature> {
        if let Some(signature) = self.parsed.get(text) {
            return Ok(signature.clone());
        }
        let signature = Signature::parse(text)?;
        self.parsed.insert(text.to_string(), signature.clone());
        Ok(signature)
    }

    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }
}
