//! Ordered specialization table and call-time type resolution

use std::sync::Arc;

use crate::error::{UfuncError, UfuncResult};
use crate::tensor::DType;
use super::compiler::Kernel;
use super::signature::Signature;

/// One compiled kernel for one signature
#[derive(Clone)]
pub struct Specialization {
    signature: Signature,
    kernel: Arc<dyn Kernel>,
}

impl Specialization {
    pub fn new(signature: Signature, kernel: Arc<dyn Kernel>) -> Self {
        Self { signature, kernel }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }
}

impl std::fmt::Debug for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Specialization({})", self.signature)
    }
}

/// Specializations in insertion order. Order is resolution priority.
#[derive(Debug, Clone, Default)]
pub struct SpecializationTable {
    entries: Vec<Specialization>,
}

impl SpecializationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries.iter().any(|s| s.signature == *signature)
    }

    /// Append; rejects a signature that is already present
    pub fn push(&mut self, specialization: Specialization) -> UfuncResult<()> {
        if self.contains(&specialization.signature) {
            return Err(UfuncError::DuplicateSignature(specialization.signature.to_string()));
        }
        self.entries.push(specialization);
        Ok(())
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.entries.iter().map(|s| &s.signature)
    }

    /// First exact match in insertion order, else the first entry every
    /// requested dtype safely casts into.
    pub fn resolve(&self, dtypes: &[DType]) -> UfuncResult<&Specialization> {
        if let Some(exact) = self.entries.iter().find(|s| s.signature.matches_exactly(dtypes)) {
            return Ok(exact);
        }
        if let Some(widened) = self.entries.iter().find(|s| s.signature.accepts_by_safe_cast(dtypes)) {
            return Ok(widened);
        }
        Err(UfuncError::TypeMismatch {
            requested: dtypes
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", "),
            available: self
                .signatures()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}
