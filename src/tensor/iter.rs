//! Row-major traversal of one or more strided operands over a shared shape

use std::ops::Range;

use crate::error::UfuncResult;

/// Visit the flat row-major positions `range` of `shape`, handing `visit`
/// the element offset of every operand at each position.
///
/// `strides[k]` and `bases[k]` describe operand `k`; a stride of zero
/// revisits the same element along that axis. Offsets are advanced
/// incrementally, last axis fastest.
pub fn walk_strided<F>(
    shape: &[usize],
    strides: &[&[isize]],
    bases: &[usize],
    range: Range<usize>,
    mut visit: F,
) -> UfuncResult<()>
where
    F: FnMut(&[usize]) -> UfuncResult<()>,
{
    if range.is_empty() {
        return Ok(());
    }
    let ndim = shape.len();
    let operands = strides.len();

    let mut index = vec![0usize; ndim];
    let mut rest = range.start;
    for axis in (0..ndim).rev() {
        index[axis] = rest % shape[axis];
        rest /= shape[axis];
    }

    let mut offsets: Vec<isize> = (0..operands)
        .map(|k| {
            bases[k] as isize
                + index
                    .iter()
                    .zip(strides[k].iter())
                    .map(|(&i, &s)| i as isize * s)
                    .sum::<isize>()
        })
        .collect();
    let mut current = vec![0usize; operands];

    let steps = range.len();
    for step in 0..steps {
        for (slot, &offset) in current.iter_mut().zip(offsets.iter()) {
            *slot = offset as usize;
        }
        visit(&current)?;
        if step + 1 == steps {
            break;
        }

        let mut axis = ndim;
        while axis > 0 {
            axis -= 1;
            index[axis] += 1;
            for k in 0..operands {
                offsets[k] += strides[k][axis];
            }
            if index[axis] < shape[axis] {
                break;
            }
            for k in 0..operands {
                offsets[k] -= strides[k][axis] * shape[axis] as isize;
            }
            index[axis] = 0;
        }
    }
    Ok(())
}

/// Row-major element strides for a contiguous `shape`
pub fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = 1isize;
    for axis in (0..shape.len()).rev() {
        strides[axis] = step;
        step *= shape[axis].max(1) as isize;
    }
    strides
}

/// Column-major (Fortran) element strides for a contiguous `shape`
pub fn column_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = 1isize;
    for axis in 0..shape.len() {
        strides[axis] = step;
        step *= shape[axis].max(1) as isize;
    }
    strides
}
