//! Loop bodies the runtime hands to a strategy: element maps, axis
//! reductions and running accumulations.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{UfuncError, UfuncResult};
use crate::strategy::{chunk_fn, LoopStrategy};
use crate::tensor::iter::{row_major_strides, walk_strided};
use crate::tensor::{DType, NdArray, Scalar};
use super::broadcast::ExecutionPlan;
use super::compiler::Kernel;

/// Broadcast `inputs` and apply `kernel` at every position
pub(crate) fn elementwise(
    strategy: &dyn LoopStrategy,
    kernel: &Arc<dyn Kernel>,
    inputs: &[NdArray],
    restype: DType,
) -> UfuncResult<NdArray> {
    let staged = strategy.stage(inputs)?;
    let plan = {
        let refs: Vec<&NdArray> = staged.iter().collect();
        ExecutionPlan::new(&refs)?
    };
    let shape = plan.shape().to_vec();
    let len = plan.len();

    let kernel = kernel.clone();
    let work = chunk_fn(move |range| evaluate_elements(kernel.as_ref(), &staged, &plan, range));
    let values = strategy.map(len, 1, work)?;
    NdArray::from_scalars(&values, &shape, restype)
}

fn evaluate_elements(
    kernel: &dyn Kernel,
    inputs: &[NdArray],
    plan: &ExecutionPlan,
    range: Range<usize>,
) -> UfuncResult<Vec<Scalar>> {
    let buffers: Vec<_> = inputs.iter().map(|a| a.storage().read()).collect();
    let dtypes: Vec<DType> = inputs.iter().map(|a| a.dtype()).collect();
    let mut args: Vec<Scalar> = dtypes.iter().map(|t| Scalar::zero(*t)).collect();
    let mut values = Vec::with_capacity(range.len());
    plan.walk(range, |offsets| {
        for (k, arg) in args.iter_mut().enumerate() {
            let at = offsets[k] * dtypes[k].size();
            *arg = Scalar::read_le(dtypes[k], &buffers[k][at..]);
        }
        values.push(kernel.invoke(&args)?);
        Ok(())
    })?;
    Ok(values)
}

/// One array seen as lanes running along `axis`
struct AxisLanes {
    array: NdArray,
    lane_shape: Vec<usize>,
    lane_strides: Vec<isize>,
    axis_stride: isize,
    axis_len: usize,
}

impl AxisLanes {
    fn new(array: NdArray, axis: usize) -> Self {
        let mut lane_shape = array.shape().to_vec();
        let axis_len = lane_shape.remove(axis);
        let mut lane_strides = array.strides().to_vec();
        let axis_stride = lane_strides.remove(axis);
        Self {
            array,
            lane_shape,
            lane_strides,
            axis_stride,
            axis_len,
        }
    }

    fn lanes(&self) -> usize {
        self.lane_shape.iter().product()
    }

    fn offset_at(&self, position: usize) -> usize {
        (self.array.offset() as isize + position as isize * self.axis_stride) as usize
    }

    /// Partial reduction of axis positions `range`, one value per lane
    fn fold_positions(&self, kernel: &dyn Kernel, range: Range<usize>, restype: DType) -> UfuncResult<Vec<Scalar>> {
        let bytes = self.array.storage().read();
        let dtype = self.array.dtype();
        let read = |offset: usize| Scalar::read_le(dtype, &bytes[offset * dtype.size()..]);
        let strides = [self.lane_strides.as_slice()];
        let lanes = self.lanes();

        let mut acc = Vec::with_capacity(lanes);
        walk_strided(&self.lane_shape, &strides, &[self.offset_at(range.start)], 0..lanes, |offsets| {
            acc.push(read(offsets[0]).cast(restype));
            Ok(())
        })?;
        for position in range.start + 1..range.end {
            let mut lane = 0;
            walk_strided(&self.lane_shape, &strides, &[self.offset_at(position)], 0..lanes, |offsets| {
                acc[lane] = kernel.invoke(&[acc[lane], read(offsets[0])])?;
                lane += 1;
                Ok(())
            })?;
        }
        Ok(acc)
    }

    /// Running results of lanes `range`, each lane's values contiguous
    fn scan_lanes(&self, kernel: &dyn Kernel, range: Range<usize>, restype: DType) -> UfuncResult<Vec<Scalar>> {
        let bytes = self.array.storage().read();
        let dtype = self.array.dtype();
        let read = |offset: usize| Scalar::read_le(dtype, &bytes[offset * dtype.size()..]);

        let mut values = Vec::with_capacity(range.len() * self.axis_len);
        walk_strided(
            &self.lane_shape,
            &[self.lane_strides.as_slice()],
            &[self.array.offset()],
            range,
            |offsets| {
                let mut acc = read(offsets[0]).cast(restype);
                values.push(acc);
                for k in 1..self.axis_len {
                    let at = (offsets[0] as isize + k as isize * self.axis_stride) as usize;
                    acc = kernel.invoke(&[acc, read(at)])?;
                    values.push(acc);
                }
                Ok(())
            },
        )?;
        Ok(values)
    }
}

fn stage_one(strategy: &dyn LoopStrategy, array: &NdArray) -> UfuncResult<NdArray> {
    strategy
        .stage(std::slice::from_ref(array))?
        .into_iter()
        .next()
        .ok_or_else(|| UfuncError::Internal("staging dropped the input".to_string()))
}

/// Fold `axis` away with the binary `kernel`. Chunks of axis positions
/// reduce independently and their partials merge left to right.
pub(crate) fn reduce(
    strategy: &dyn LoopStrategy,
    kernel: &Arc<dyn Kernel>,
    array: &NdArray,
    axis: usize,
    restype: DType,
) -> UfuncResult<NdArray> {
    let lanes = AxisLanes::new(stage_one(strategy, array)?, axis);
    let out_shape = lanes.lane_shape.clone();
    let len = lanes.axis_len;
    let unit_cost = lanes.lanes().max(1);

    let fold_kernel = kernel.clone();
    let work = chunk_fn(move |range| lanes.fold_positions(fold_kernel.as_ref(), range, restype));
    let merge = |left: Vec<Scalar>, right: Vec<Scalar>| -> UfuncResult<Vec<Scalar>> {
        left.into_iter()
            .zip(right)
            .map(|(a, b)| kernel.invoke(&[a, b]))
            .collect()
    };
    let values = strategy.fold(len, unit_cost, work, &merge)?;
    NdArray::from_scalars(&values, &out_shape, restype)
}

/// Running application of `kernel` along `axis`; same shape as the input
pub(crate) fn accumulate(
    strategy: &dyn LoopStrategy,
    kernel: &Arc<dyn Kernel>,
    array: &NdArray,
    axis: usize,
    restype: DType,
) -> UfuncResult<NdArray> {
    let lanes = AxisLanes::new(stage_one(strategy, array)?, axis);
    let shape = lanes.array.shape().to_vec();
    let lane_shape = lanes.lane_shape.clone();
    let lane_count = lanes.lanes();
    let axis_len = lanes.axis_len;
    if lane_count == 0 || axis_len == 0 {
        return Ok(NdArray::zeros(&shape, restype));
    }

    let kernel = kernel.clone();
    let work = chunk_fn(move |range| lanes.scan_lanes(kernel.as_ref(), range, restype));
    let chunks = strategy.partition(lane_count, axis_len);
    let scanned: Vec<Scalar> = strategy
        .run_chunks(chunks, work)?
        .into_iter()
        .flat_map(|output| output.values)
        .collect();

    // lanes come back lane-major; scatter them into row-major order
    let mut lane_strides = row_major_strides(&shape);
    let axis_stride = lane_strides.remove(axis);
    let mut ordered = vec![Scalar::zero(restype); scanned.len()];
    let mut lane = 0;
    walk_strided(&lane_shape, &[lane_strides.as_slice()], &[0], 0..lane_count, |offsets| {
        for k in 0..axis_len {
            let at = (offsets[0] as isize + k as isize * axis_stride) as usize;
            ordered[at] = scanned[lane * axis_len + k];
        }
        lane += 1;
        Ok(())
    })?;
    NdArray::from_scalars(&ordered, &shape, restype)
}
