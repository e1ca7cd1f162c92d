//! Built ufuncs: immutable, shareable across threads, callable as
//! elementwise maps and as binary reductions.

use std::fmt;
use std::sync::Arc;

use crate::error::{UfuncError, UfuncResult};
use crate::strategy::{LoopStrategy, StrategyKind};
use crate::tensor::{DType, NdArray};
use super::broadcast::broadcast_shapes;
use super::compiler::Kernel;
use super::gufunc::{run_generalized, GufuncLayout};
use super::loops;
use super::signature::Signature;
use super::table::SpecializationTable;

/// How a call actually ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub strategy: StrategyKind,
    /// The configured strategy failed and the host loop redid the work
    pub fell_back: bool,
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    fn completed(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            fell_back: false,
            warnings: Vec::new(),
        }
    }
}

pub struct Ufunc {
    name: String,
    arity: usize,
    table: SpecializationTable,
    strategy: Arc<dyn LoopStrategy>,
    fallback: Option<Arc<dyn LoopStrategy>>,
    layout: Option<GufuncLayout>,
}

impl Ufunc {
    pub(crate) fn new(
        name: String,
        arity: usize,
        table: SpecializationTable,
        strategy: Arc<dyn LoopStrategy>,
        fallback: Option<Arc<dyn LoopStrategy>>,
        layout: Option<GufuncLayout>,
    ) -> Self {
        Self {
            name,
            arity,
            table,
            strategy,
            fallback,
            layout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Registered signatures in resolution order
    pub fn signatures(&self) -> Vec<Signature> {
        self.table.signatures().cloned().collect()
    }

    pub fn layout(&self) -> Option<&GufuncLayout> {
        self.layout.as_ref()
    }

    pub fn is_generalized(&self) -> bool {
        self.layout.is_some()
    }

    /// Apply the ufunc to `inputs`, broadcasting them against each other
    pub fn call(&self, inputs: &[&NdArray]) -> UfuncResult<NdArray> {
        self.call_reported(inputs).map(|(out, _)| out)
    }

    pub fn call_reported(&self, inputs: &[&NdArray]) -> UfuncResult<(NdArray, ExecutionReport)> {
        if inputs.len() != self.arity {
            return Err(UfuncError::arity(
                &format!("call of '{}'", self.name),
                self.arity,
                inputs.len(),
            ));
        }
        let dtypes: Vec<DType> = inputs.iter().map(|a| a.dtype()).collect();
        let (kernel, restype) = self.resolve(&dtypes)?;
        let owned: Vec<NdArray> = inputs.iter().map(|a| (*a).clone()).collect();

        match &self.layout {
            Some(layout) => self.execute("call", |strategy| {
                run_generalized(strategy, layout, &kernel, &owned, restype)
            }),
            None => {
                let shapes: Vec<&[usize]> = inputs.iter().map(|a| a.shape()).collect();
                broadcast_shapes(&shapes)?;
                self.execute("call", |strategy| loops::elementwise(strategy, &kernel, &owned, restype))
            }
        }
    }

    /// Reduce along the leading axis
    pub fn reduce(&self, array: &NdArray) -> UfuncResult<NdArray> {
        self.reduce_axis(array, 0)
    }

    pub fn reduce_axis(&self, array: &NdArray, axis: usize) -> UfuncResult<NdArray> {
        self.reduce_reported(array, axis).map(|(out, _)| out)
    }

    pub fn reduce_reported(&self, array: &NdArray, axis: usize) -> UfuncResult<(NdArray, ExecutionReport)> {
        let (kernel, restype) = self.binary_kernel("reduce", array, axis)?;
        if array.shape()[axis] == 0 {
            return Err(UfuncError::InvalidInput(format!(
                "cannot reduce over zero-length axis {}: '{}' has no identity",
                axis, self.name
            )));
        }
        self.execute("reduce", |strategy| loops::reduce(strategy, &kernel, array, axis, restype))
    }

    /// Running reduction along the leading axis, keeping every step. An
    /// empty axis gives an empty result of the same shape.
    pub fn accumulate(&self, array: &NdArray) -> UfuncResult<NdArray> {
        self.accumulate_axis(array, 0)
    }

    pub fn accumulate_axis(&self, array: &NdArray, axis: usize) -> UfuncResult<NdArray> {
        self.accumulate_reported(array, axis).map(|(out, _)| out)
    }

    pub fn accumulate_reported(&self, array: &NdArray, axis: usize) -> UfuncResult<(NdArray, ExecutionReport)> {
        let (kernel, restype) = self.binary_kernel("accumulate", array, axis)?;
        self.execute("accumulate", |strategy| loops::accumulate(strategy, &kernel, array, axis, restype))
    }

    /// Apply to every pair of elements; the result has shape
    /// `a.shape() ++ b.shape()`
    pub fn outer(&self, a: &NdArray, b: &NdArray) -> UfuncResult<NdArray> {
        self.require_binary("outer")?;
        let mut left = a.clone();
        for _ in 0..b.ndim() {
            left = left.insert_axis(left.ndim())?;
        }
        let mut right = b.clone();
        for _ in 0..a.ndim() {
            right = right.insert_axis(0)?;
        }
        self.call(&[&left, &right])
    }

    fn resolve(&self, dtypes: &[DType]) -> UfuncResult<(Arc<dyn Kernel>, DType)> {
        let specialization = self.table.resolve(dtypes)?;
        tracing::debug!(
            "'{}' resolved ({}) to {}",
            self.name,
            dtypes.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "),
            specialization.signature()
        );
        Ok((specialization.kernel().clone(), specialization.signature().restype()))
    }

    fn require_binary(&self, operation: &str) -> UfuncResult<()> {
        if self.layout.is_some() {
            return Err(UfuncError::UnsupportedOperation(format!(
                "{} is not defined for generalized ufunc '{}'",
                operation, self.name
            )));
        }
        if self.arity != 2 {
            return Err(UfuncError::arity(
                &format!("{} of '{}'", operation, self.name),
                2,
                self.arity,
            ));
        }
        Ok(())
    }

    /// Kernel for folding `array` along `axis`. Its result is fed back as
    /// the first argument, so the restype must fit that argtype.
    fn binary_kernel(&self, operation: &str, array: &NdArray, axis: usize) -> UfuncResult<(Arc<dyn Kernel>, DType)> {
        self.require_binary(operation)?;
        if array.ndim() == 0 {
            return Err(UfuncError::InvalidInput(format!(
                "cannot {} a 0-d array",
                operation
            )));
        }
        if axis >= array.ndim() {
            return Err(UfuncError::AxisOutOfBounds {
                axis,
                ndim: array.ndim(),
            });
        }
        let specialization = self.table.resolve(&[array.dtype(), array.dtype()])?;
        let signature = specialization.signature();
        let accumulator = signature.argtypes()[0];
        if !signature.restype().can_cast_to(accumulator) {
            return Err(UfuncError::TypeMismatch {
                requested: format!("{} accumulator as {}", signature.restype(), accumulator),
                available: signature.to_string(),
            });
        }
        Ok((specialization.kernel().clone(), signature.restype()))
    }

    /// Run `operation` on the configured strategy, redoing it on the host
    /// loop when the device fails and fallback is enabled
    fn execute<F>(&self, operation: &str, run: F) -> UfuncResult<(NdArray, ExecutionReport)>
    where
        F: Fn(&dyn LoopStrategy) -> UfuncResult<NdArray>,
    {
        match run(self.strategy.as_ref()) {
            Ok(out) => Ok((out, ExecutionReport::completed(self.strategy.kind()))),
            Err(err) if err.is_recoverable() => match &self.fallback {
                Some(host) => {
                    tracing::warn!(
                        "{} of '{}' failed on the {} loop, rerunning on the host: {}",
                        operation,
                        self.name,
                        self.strategy.kind(),
                        err
                    );
                    let out = run(host.as_ref())?;
                    Ok((
                        out,
                        ExecutionReport {
                            strategy: host.kind(),
                            fell_back: true,
                            warnings: vec![err.to_string()],
                        },
                    ))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Ufunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ufunc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("strategy", &self.strategy.kind())
            .field("signatures", &self.signatures())
            .field("layout", &self.layout.as_ref().map(|l| l.to_string()))
            .finish()
    }
}
