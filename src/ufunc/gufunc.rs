//! Generalized signatures: per-input core dimensions plus broadcast loop
//! dimensions, e.g. `(m,n),(n,p)->(m,p)`.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{UfuncError, UfuncResult};
use crate::strategy::{chunk_fn, LoopStrategy};
use crate::tensor::{DType, NdArray, Scalar};
use super::broadcast::{ExecutionPlan, OperandLayout};
use super::compiler::Kernel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreDim {
    Named(String),
    Fixed(usize),
}

impl Display for CoreDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreDim::Named(name) => write!(f, "{}", name),
            CoreDim::Fixed(size) => write!(f, "{}", size),
        }
    }
}

/// Core dimensions of every input and of the single output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GufuncLayout {
    inputs: Vec<Vec<CoreDim>>,
    output: Vec<CoreDim>,
}

impl GufuncLayout {
    pub fn nin(&self) -> usize {
        self.inputs.len()
    }

    pub fn inputs(&self) -> &[Vec<CoreDim>] {
        &self.inputs
    }

    pub fn output(&self) -> &[CoreDim] {
        &self.output
    }

    /// Bind every named core dimension to its size in `inputs`
    pub fn bind(&self, inputs: &[&NdArray]) -> UfuncResult<BTreeMap<String, usize>> {
        if inputs.len() != self.inputs.len() {
            return Err(UfuncError::arity("core layout", self.inputs.len(), inputs.len()));
        }
        let mut sizes = BTreeMap::new();
        for (k, (array, dims)) in inputs.iter().zip(&self.inputs).enumerate() {
            if array.ndim() < dims.len() {
                return Err(UfuncError::InvalidInput(format!(
                    "input {} has {} dimension(s) but its core layout needs {}",
                    k,
                    array.ndim(),
                    dims.len()
                )));
            }
            let core = &array.shape()[array.ndim() - dims.len()..];
            for (dim, &size) in dims.iter().zip(core) {
                match dim {
                    CoreDim::Fixed(expected) if *expected != size => {
                        return Err(UfuncError::CoreDimension {
                            name: expected.to_string(),
                            expected: *expected,
                            got: size,
                        });
                    }
                    CoreDim::Fixed(_) => {}
                    CoreDim::Named(name) => match sizes.get(name) {
                        Some(&bound) if bound != size => {
                            return Err(UfuncError::CoreDimension {
                                name: name.clone(),
                                expected: bound,
                                got: size,
                            });
                        }
                        Some(_) => {}
                        None => {
                            sizes.insert(name.clone(), size);
                        }
                    },
                }
            }
        }
        Ok(sizes)
    }

    pub fn output_shape(&self, sizes: &BTreeMap<String, usize>) -> UfuncResult<Vec<usize>> {
        self.output
            .iter()
            .map(|dim| match dim {
                CoreDim::Fixed(size) => Ok(*size),
                CoreDim::Named(name) => sizes
                    .get(name)
                    .copied()
                    .ok_or_else(|| UfuncError::Internal(format!("core dimension '{}' was never bound", name))),
            })
            .collect()
    }
}

fn parse_dims(text: &str, layout: &str) -> UfuncResult<Vec<CoreDim>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|token| {
            if let Ok(size) = token.parse::<usize>() {
                return Ok(CoreDim::Fixed(size));
            }
            let mut chars = token.chars();
            let valid = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_');
            if valid {
                Ok(CoreDim::Named(token.to_string()))
            } else {
                Err(UfuncError::InvalidInput(format!(
                    "bad core dimension '{}' in layout '{}'",
                    token, layout
                )))
            }
        })
        .collect()
}

fn parse_groups(text: &str, layout: &str) -> UfuncResult<Vec<Vec<CoreDim>>> {
    let malformed = || UfuncError::InvalidInput(format!("malformed core layout '{}'", layout));
    let mut groups = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if !groups.is_empty() {
            // both "(m),(m)" and the concatenated "(m)(m)" are accepted
            rest = rest.strip_prefix(',').unwrap_or(rest);
        }
        let body = rest.strip_prefix('(').ok_or_else(malformed)?;
        let close = body.find(')').ok_or_else(malformed)?;
        groups.push(parse_dims(&body[..close], layout)?);
        rest = &body[close + 1..];
    }
    Ok(groups)
}

impl FromStr for GufuncLayout {
    type Err = UfuncError;

    fn from_str(s: &str) -> UfuncResult<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (lhs, rhs) = compact
            .split_once("->")
            .ok_or_else(|| UfuncError::InvalidInput(format!("core layout '{}' has no '->'", s)))?;
        let inputs = parse_groups(lhs, s)?;
        let mut outputs = parse_groups(rhs, s)?;
        if inputs.is_empty() || outputs.len() != 1 {
            return Err(UfuncError::InvalidInput(format!(
                "core layout '{}' needs at least one input and exactly one output",
                s
            )));
        }
        let output = outputs.remove(0);

        for dim in &output {
            if let CoreDim::Named(name) = dim {
                let bound = inputs.iter().flatten().any(|d| d == dim);
                if !bound {
                    return Err(UfuncError::InvalidInput(format!(
                        "output core dimension '{}' in '{}' is not bound by any input",
                        name, s
                    )));
                }
            }
        }
        Ok(Self { inputs, output })
    }
}

impl Display for GufuncLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = |dims: &[CoreDim]| {
            let inner = dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",");
            format!("({})", inner)
        };
        let inputs = self.inputs.iter().map(|d| group(d.as_slice())).collect::<Vec<_>>().join(",");
        write!(f, "{}->{}", inputs, group(self.output.as_slice()))
    }
}

/// Run a generalized-signature kernel once per broadcast loop index
pub(crate) fn run_generalized(
    strategy: &dyn LoopStrategy,
    layout: &GufuncLayout,
    kernel: &Arc<dyn Kernel>,
    inputs: &[NdArray],
    restype: DType,
) -> UfuncResult<NdArray> {
    let staged = strategy.stage(inputs)?;
    let refs: Vec<&NdArray> = staged.iter().collect();
    let sizes = layout.bind(&refs)?;
    let core_shape = layout.output_shape(&sizes)?;
    let core_len: usize = core_shape.iter().product();

    let ranks: Vec<usize> = layout.inputs().iter().map(|dims| dims.len()).collect();
    let loop_layouts: Vec<OperandLayout<'_>> = staged
        .iter()
        .zip(&ranks)
        .map(|(array, &rank)| {
            let split = array.ndim() - rank;
            (&array.shape()[..split], &array.strides()[..split], array.offset())
        })
        .collect();
    let plan = ExecutionPlan::from_layouts(&loop_layouts)?;
    let mut shape = plan.shape().to_vec();
    shape.extend_from_slice(&core_shape);
    let len = plan.len();

    let kernel = kernel.clone();
    let expected = core_shape.clone();
    let work = chunk_fn(move |range| evaluate_cores(kernel.as_ref(), &staged, &ranks, &plan, &expected, restype, range));
    let outputs = strategy.run_chunks(strategy.partition(len, core_len.max(1)), work)?;
    let values: Vec<Scalar> = outputs.into_iter().flat_map(|output| output.values).collect();
    NdArray::from_scalars(&values, &shape, restype)
}

fn evaluate_cores(
    kernel: &dyn Kernel,
    inputs: &[NdArray],
    ranks: &[usize],
    plan: &ExecutionPlan,
    core_shape: &[usize],
    restype: DType,
    range: Range<usize>,
) -> UfuncResult<Vec<Scalar>> {
    let core_len: usize = core_shape.iter().product();
    let mut values = Vec::with_capacity(range.len() * core_len);
    plan.walk(range, |offsets| {
        let views: Vec<NdArray> = inputs
            .iter()
            .zip(ranks)
            .zip(offsets)
            .map(|((array, &rank), &offset)| {
                let split = array.ndim() - rank;
                array.strided_view(offset, &array.shape()[split..], &array.strides()[split..])
            })
            .collect();
        let result = kernel.invoke_core(&views)?;
        if result.shape() != core_shape {
            return Err(UfuncError::InvalidInput(format!(
                "kernel returned shape {:?}, layout declares {:?}",
                result.shape(),
                core_shape
            )));
        }
        values.extend(result.to_scalars().into_iter().map(|v| v.cast(restype)));
        Ok(())
    })?;
    Ok(values)
}
