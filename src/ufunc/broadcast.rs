//! NumPy-style broadcasting: common iteration shape and per-input strides

use std::ops::Range;

use crate::error::{UfuncError, UfuncResult};
use crate::tensor::iter::walk_strided;
use crate::tensor::NdArray;

/// Common shape of `shapes`, aligned on trailing dimensions.
///
/// Missing leading axes count as size 1. At each aligned axis every size
/// must equal the others or be exactly 1.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> UfuncResult<Vec<usize>> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; ndim];
    for (axis, slot) in out.iter_mut().enumerate() {
        let mut size: Option<usize> = None;
        for shape in shapes {
            let lead = ndim - shape.len();
            if axis < lead {
                continue;
            }
            let dim = shape[axis - lead];
            if dim == 1 {
                continue;
            }
            match size {
                None => size = Some(dim),
                Some(existing) if existing == dim => {}
                Some(_) => return Err(UfuncError::shape_broadcast(axis, shapes)),
            }
        }
        *slot = size.unwrap_or(1);
    }
    Ok(out)
}

/// Iteration geometry for one call; recomputed every call, never cached
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    shape: Vec<usize>,
    strides: Vec<Vec<isize>>,
    offsets: Vec<usize>,
}

/// Shape, strides and base offset of one operand
pub type OperandLayout<'a> = (&'a [usize], &'a [isize], usize);

impl ExecutionPlan {
    pub fn new(inputs: &[&NdArray]) -> UfuncResult<Self> {
        let layouts: Vec<OperandLayout<'_>> = inputs
            .iter()
            .map(|a| (a.shape(), a.strides(), a.offset()))
            .collect();
        Self::from_layouts(&layouts)
    }

    /// Plan over explicit layouts, e.g. the loop dimensions of a
    /// generalized-signature call
    pub fn from_layouts(layouts: &[OperandLayout<'_>]) -> UfuncResult<Self> {
        let shapes: Vec<&[usize]> = layouts.iter().map(|(shape, _, _)| *shape).collect();
        let shape = broadcast_shapes(&shapes)?;
        let ndim = shape.len();

        let strides = layouts
            .iter()
            .map(|(operand_shape, operand_strides, _)| {
                let lead = ndim - operand_shape.len();
                (0..ndim)
                    .map(|axis| {
                        if axis < lead || operand_shape[axis - lead] == 1 {
                            0
                        } else {
                            operand_strides[axis - lead]
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            shape,
            strides,
            offsets: layouts.iter().map(|(_, _, offset)| *offset).collect(),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strides of operand `k` over the broadcast shape; zero on repeated axes
    pub fn strides(&self, k: usize) -> &[isize] {
        &self.strides[k]
    }

    /// Visit flat positions `range`, with every operand's element offset
    pub fn walk<F>(&self, range: Range<usize>, visit: F) -> UfuncResult<()>
    where
        F: FnMut(&[usize]) -> UfuncResult<()>,
    {
        let strides: Vec<&[isize]> = self.strides.iter().map(|s| s.as_slice()).collect();
        walk_strided(&self.shape, &strides, &self.offsets, range, visit)
    }
}
