//! Open-phase builder: collects compiled specializations, then turns into
//! an immutable [`Ufunc`].

use std::fmt;
use std::sync::Arc;

use crate::config::{self, VectorizeConfig};
use crate::device::ComputeDevice;
use crate::error::{UfuncError, UfuncResult};
use crate::strategy::{create_strategy, BasicLoop, LoopStrategy, StrategyKind};
use crate::tensor::DType;
use super::compiler::{HostCompiler, KernelCompiler};
use super::function::ScalarFunction;
use super::gufunc::GufuncLayout;
use super::runtime::Ufunc;
use super::signature::Signature;
use super::table::{Specialization, SpecializationTable};

pub struct Vectorizer {
    function: ScalarFunction,
    layout: Option<GufuncLayout>,
    strategy: StrategyKind,
    compiler: Arc<dyn KernelCompiler>,
    device: Option<Arc<dyn ComputeDevice>>,
    config: VectorizeConfig,
    table: SpecializationTable,
}

impl Vectorizer {
    /// Elementwise vectorizer using the process configuration
    pub fn new(function: ScalarFunction) -> Self {
        let config = config::get_config();
        let strategy = match config.default_strategy {
            StrategyKind::Generalized => StrategyKind::Basic,
            kind => kind,
        };
        Self {
            function,
            layout: None,
            strategy,
            compiler: Arc::new(HostCompiler),
            device: None,
            config,
            table: SpecializationTable::new(),
        }
    }

    /// Vectorizer for a core-dimension function, e.g. layout `(m),(m)->()`
    pub fn generalized(function: ScalarFunction, layout: &str) -> UfuncResult<Self> {
        let layout: GufuncLayout = layout.parse()?;
        if layout.nin() != function.arity() {
            return Err(UfuncError::arity(
                &format!("core layout of '{}'", function.name()),
                function.arity(),
                layout.nin(),
            ));
        }
        if !function.is_core() {
            return Err(UfuncError::InvalidInput(format!(
                "'{}' has an elementwise body; a core layout needs a core body",
                function.name()
            )));
        }
        let mut vectorizer = Self::new(function);
        vectorizer.layout = Some(layout);
        vectorizer.strategy = StrategyKind::Generalized;
        Ok(vectorizer)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn KernelCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Device the device loop runs on, instead of the configured one
    pub fn with_device(mut self, device: Arc<dyn ComputeDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_config(mut self, config: VectorizeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn function(&self) -> &ScalarFunction {
        &self.function
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Compile and register `restype(argtypes...)`
    pub fn add(&mut self, restype: DType, argtypes: &[DType]) -> UfuncResult<()> {
        self.add_signature(Signature::new(restype, argtypes))
    }

    /// Compile and register `signature`. On error the table is unchanged.
    pub fn add_signature(&mut self, signature: Signature) -> UfuncResult<()> {
        if signature.arity() != self.function.arity() {
            return Err(UfuncError::arity(
                &format!("add of {} to '{}'", signature, self.function.name()),
                self.function.arity(),
                signature.arity(),
            ));
        }
        if self.table.contains(&signature) {
            return Err(UfuncError::DuplicateSignature(signature.to_string()));
        }
        if self.function.is_core() != self.layout.is_some() {
            return Err(UfuncError::compilation(
                &signature,
                "function body does not match the vectorizer kind",
            ));
        }

        let kernel = self.compiler.compile(&signature, &self.function)?;
        tracing::debug!("added {} to '{}'", signature, self.function.name());
        self.table.push(Specialization::new(signature, kernel))
    }

    /// Freeze the table into a ufunc running on the selected strategy
    pub fn build(self) -> UfuncResult<Ufunc> {
        if self.table.is_empty() {
            return Err(UfuncError::InvalidState(format!(
                "'{}' has no signatures; add at least one before building",
                self.function.name()
            )));
        }
        self.config.validate()?;
        let generalized_loop = self.strategy == StrategyKind::Generalized;
        if self.layout.is_some() && !generalized_loop {
            return Err(UfuncError::InvalidState(format!(
                "generalized ufunc '{}' cannot run on the {} loop",
                self.function.name(),
                self.strategy
            )));
        }
        if self.layout.is_none() && generalized_loop {
            return Err(UfuncError::InvalidState(format!(
                "'{}' has no core layout for the generalized loop",
                self.function.name()
            )));
        }

        let strategy = create_strategy(self.strategy, &self.config, self.device);
        let fallback: Option<Arc<dyn LoopStrategy>> =
            if self.strategy == StrategyKind::Device && self.config.device.fallback_to_host {
                Some(Arc::new(BasicLoop::new()))
            } else {
                None
            };
        tracing::info!(
            "built ufunc '{}' with {} signature(s) on the {} loop",
            self.function.name(),
            self.table.len(),
            self.strategy
        );
        Ok(Ufunc::new(
            self.function.name().to_string(),
            self.function.arity(),
            self.table,
            strategy,
            fallback,
            self.layout,
        ))
    }
}

impl fmt::Debug for Vectorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vectorizer")
            .field("function", &self.function)
            .field("strategy", &self.strategy)
            .field("signatures", &self.table.len())
            .finish()
    }
}
