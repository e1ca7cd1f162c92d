use std::sync::Arc;

use vectorize::device::{DeviceFault, EmulatedDevice};
use vectorize::ufunc::{broadcast_shapes, Kernel, KernelCompiler};
use vectorize::{
    ConfigBuilder, DType, Device, MemoryLayout, NdArray, Scalar, ScalarFunction, Signature, StrategyKind, Ufunc,
    UfuncError, UfuncResult, VectorizeConfig, Vectorizer,
};

const STRATEGIES: [StrategyKind; 4] = [
    StrategyKind::Basic,
    StrategyKind::Parallel,
    StrategyKind::Stream,
    StrategyKind::Device,
];

/// Small chunk sizes so every strategy really splits the test arrays
fn test_config() -> VectorizeConfig {
    ConfigBuilder::new()
        .parallel(|p| {
            p.num_worker_threads = 4;
            p.min_chunk_len = 16;
        })
        .stream(|s| {
            s.chunk_len = 16;
            s.max_in_flight = 2;
        })
        .device(|d| {
            d.device = Device::Emulated(0);
            d.chunk_len = 32;
            d.threads_per_block = 8;
            d.fallback_to_host = false;
        })
        .build()
        .unwrap()
}

fn add() -> ScalarFunction {
    ScalarFunction::elementwise("add", 2, |args| args[0] + args[1])
}

fn add_multiple_args() -> ScalarFunction {
    ScalarFunction::elementwise("add_multiple_args", 4, |args| args[0] + args[1] + args[2] + args[3])
}

fn build(function: ScalarFunction, strategy: StrategyKind, signatures: &[&str]) -> Ufunc {
    let mut vectorizer = Vectorizer::new(function)
        .with_config(test_config())
        .with_strategy(strategy);
    for text in signatures {
        vectorizer.add_signature(text.parse().unwrap()).unwrap();
    }
    vectorizer.build().unwrap()
}

/// a: 8x10 row-major, b: a copy, c: Fortran-ordered copy, d: every other
/// row and column of a 16x20 array
fn fixtures() -> (NdArray, NdArray, NdArray, NdArray) {
    let a = NdArray::arange(80, DType::F32).reshape(&[8, 10]).unwrap();
    let b = a.to_layout(MemoryLayout::RowMajor);
    let c = a.to_layout(MemoryLayout::ColumnMajor);
    let d = NdArray::arange(16 * 20, DType::F32)
        .reshape(&[16, 20])
        .unwrap()
        .slice_axis(0, 0, 16, 2)
        .unwrap()
        .slice_axis(1, 0, 20, 2)
        .unwrap();
    (a, b, c, d)
}

/// Elementwise sum of `inputs` after broadcasting each to the common shape
fn reference_sum(inputs: &[&NdArray]) -> (Vec<usize>, Vec<f32>) {
    let shapes: Vec<&[usize]> = inputs.iter().map(|a| a.shape()).collect();
    let shape = broadcast_shapes(&shapes).unwrap();
    let len: usize = shape.iter().product();
    let mut total = vec![0f32; len];
    for input in inputs {
        let values = input.broadcast_to(&shape).unwrap().to_vec::<f32>();
        for (slot, v) in total.iter_mut().zip(values) {
            *slot += v;
        }
    }
    (shape, total)
}

fn reference_accumulate(a: &NdArray) -> Vec<f32> {
    let inner: usize = a.shape()[1..].iter().product();
    let mut values = a.to_vec::<f32>();
    for i in inner..values.len() {
        values[i] += values[i - inner];
    }
    values
}

fn reduce_fully(ufunc: &Ufunc, mut array: NdArray) -> Scalar {
    while array.ndim() > 0 {
        array = ufunc.reduce(&array).unwrap();
    }
    array.item().unwrap()
}

fn check_ufunc_attributes(strategy: StrategyKind, a: &NdArray, b: &NdArray) {
    let ufunc = build(add(), strategy, &["f4(f4, f4)"]);
    let info = format!("{:?} {:?}", strategy, a.shape());

    let (shape, expected) = reference_sum(&[a, b]);
    let out = ufunc.call(&[a, b]).unwrap();
    assert_eq!(out.shape(), shape.as_slice(), "{}", info);
    assert_eq!(out.to_vec::<f32>(), expected, "{}", info);

    let total: f32 = a.to_vec::<f32>().iter().sum();
    assert_eq!(reduce_fully(&ufunc, a.clone()), Scalar::F32(total), "{}", info);

    let running = ufunc.accumulate(a).unwrap();
    assert_eq!(running.shape(), a.shape(), "{}", info);
    assert_eq!(running.to_vec::<f32>(), reference_accumulate(a), "{}", info);

    let outer = ufunc.outer(a, b).unwrap();
    let mut outer_shape = a.shape().to_vec();
    outer_shape.extend_from_slice(b.shape());
    assert_eq!(outer.shape(), outer_shape.as_slice(), "{}", info);
    let bv = b.to_vec::<f32>();
    let expected: Vec<f32> = a
        .to_vec::<f32>()
        .into_iter()
        .flat_map(|x| bv.iter().map(move |y| x + y))
        .collect();
    assert_eq!(outer.to_vec::<f32>(), expected, "{}", info);
}

#[test]
fn test_ufunc_attributes() {
    let (a, b, _, _) = fixtures();
    for strategy in STRATEGIES {
        check_ufunc_attributes(strategy, &a.index_axis(0, 0).unwrap(), &b.index_axis(0, 0).unwrap());
        check_ufunc_attributes(strategy, &a, &b);
        check_ufunc_attributes(strategy, &a.insert_axis(1).unwrap(), &b.insert_axis(0).unwrap());
    }
}

#[test]
fn test_broadcasting() {
    let (a, b, c, d) = fixtures();
    let row = |x: &NdArray| x.index_axis(0, 0).unwrap();
    let cases = vec![
        [row(&a), row(&b), row(&c), row(&d)],
        [a.clone(), b.clone(), c.clone(), d.clone()],
        [
            a.insert_axis(1).unwrap(),
            b.insert_axis(0).unwrap(),
            c.insert_axis(1).unwrap(),
            d.insert_axis(0).unwrap(),
        ],
    ];
    for strategy in STRATEGIES {
        let ufunc = build(add_multiple_args(), strategy, &["f4(f4, f4, f4, f4)"]);
        for [w, x, y, z] in &cases {
            let (shape, expected) = reference_sum(&[w, x, y, z]);
            let out = ufunc.call(&[w, x, y, z]).unwrap();
            assert_eq!(out.shape(), shape.as_slice(), "{:?}", strategy);
            assert_eq!(out.to_vec::<f32>(), expected, "{:?} {:?}", strategy, shape);
        }
    }
}

#[test]
fn test_implicit_broadcasting() {
    let (a, b, _, _) = fixtures();
    let broadcasting_b = b
        .insert_axis(0)
        .unwrap()
        .insert_axis(2)
        .unwrap()
        .insert_axis(3)
        .unwrap();
    assert_eq!(broadcasting_b.shape(), &[1, 8, 1, 1, 10]);
    for strategy in STRATEGIES {
        let ufunc = build(add(), strategy, &["f4(f4, f4)"]);
        let out = ufunc.call(&[&a, &broadcasting_b]).unwrap();
        let (shape, expected) = reference_sum(&[&a, &broadcasting_b]);
        assert_eq!(shape, vec![1, 8, 1, 8, 10]);
        assert_eq!(out.shape(), shape.as_slice());
        assert_eq!(out.to_vec::<f32>(), expected);
    }
}

#[test]
fn test_broadcast_rules() {
    let (a, _, _, _) = fixtures();
    let ufunc = build(add(), StrategyKind::Basic, &["f4(f4, f4)"]);

    let row = NdArray::arange(10, DType::F32).reshape(&[1, 10]).unwrap();
    let out = ufunc.call(&[&a, &row]).unwrap();
    assert_eq!(out.shape(), &[8, 10]);
    assert_eq!(out.get(&[3, 4]).unwrap(), Scalar::F32(34.0 + 4.0));

    let short = NdArray::zeros(&[7, 10], DType::F32);
    match ufunc.call(&[&a, &short]) {
        Err(UfuncError::ShapeBroadcast { axis, shapes }) => {
            assert_eq!(axis, 0);
            assert!(shapes.contains("[8, 10]") && shapes.contains("[7, 10]"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn dot() -> ScalarFunction {
    ScalarFunction::core("dot", 2, |args| {
        let x = args[0].to_scalars();
        let y = args[1].to_scalars();
        let total = x
            .into_iter()
            .zip(y)
            .fold(Scalar::zero(args[0].dtype()), |acc, (p, q)| acc + p * q);
        Ok(NdArray::scalar(total))
    })
}

#[test]
fn test_gufunc() {
    let mut vectorizer = Vectorizer::generalized(dot(), "(m)(m)->()").unwrap();
    vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap();
    let ufunc = vectorizer.build().unwrap();
    assert_eq!(ufunc.strategy(), StrategyKind::Generalized);
    assert_eq!(ufunc.layout().unwrap().to_string(), "(m),(m)->()");

    let a = NdArray::arange(12 * 10, DType::F32).reshape(&[12, 10]).unwrap();
    let b = NdArray::arange(10, DType::F32);
    let out = ufunc.call(&[&a, &b]).unwrap();
    assert_eq!(out.shape(), &[12]);

    let bv = b.to_vec::<f32>();
    let expected: Vec<f32> = (0..12)
        .map(|i| {
            a.index_axis(0, i)
                .unwrap()
                .to_vec::<f32>()
                .iter()
                .zip(&bv)
                .map(|(x, y)| x * y)
                .sum()
        })
        .collect();
    assert_eq!(out.to_vec::<f32>(), expected);

    let wrong = NdArray::arange(12, DType::F32);
    assert!(matches!(
        ufunc.call(&[&a, &wrong]),
        Err(UfuncError::CoreDimension { expected: 10, got: 12, .. })
    ));
    assert!(matches!(ufunc.reduce(&a), Err(UfuncError::UnsupportedOperation(_))));
    assert!(matches!(ufunc.accumulate(&a), Err(UfuncError::UnsupportedOperation(_))));
    assert!(matches!(ufunc.outer(&a, &b), Err(UfuncError::UnsupportedOperation(_))));
}

#[test]
fn test_gufunc_loop_dims_broadcast_over_strided_views() {
    let mut vectorizer = Vectorizer::generalized(dot(), "(m),(m)->()").unwrap();
    vectorizer.add(DType::F64, &[DType::F64, DType::F64]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    // transposed core axis: the kernel sees non-contiguous views
    let a = NdArray::arange(6, DType::F64)
        .reshape(&[3, 2])
        .unwrap()
        .to_layout(MemoryLayout::ColumnMajor);
    let b = NdArray::from_vec(vec![1.0f64, 10.0], &[2]).unwrap().insert_axis(0).unwrap();
    let out = ufunc.call(&[&a, &b]).unwrap();
    assert_eq!(out.shape(), &[3]);
    assert_eq!(out.to_vec::<f64>(), vec![10.0, 32.0, 54.0]);
}

#[test]
fn test_type_resolution_order() {
    let ufunc = build(add(), StrategyKind::Basic, &["f4(f4, f4)", "f8(f8, f8)"]);
    let ints = NdArray::arange(4, DType::I32);
    assert_eq!(ufunc.call(&[&ints, &ints]).unwrap().dtype(), DType::F32);

    let doubles = NdArray::arange(4, DType::F64);
    assert_eq!(ufunc.call(&[&doubles, &doubles]).unwrap().dtype(), DType::F64);

    let narrow = build(add(), StrategyKind::Basic, &["f4(f4, f4)"]);
    assert!(matches!(
        narrow.call(&[&doubles, &ints]),
        Err(UfuncError::TypeMismatch { .. })
    ));
}

#[test]
fn test_arity_and_build_errors() {
    let ufunc = build(add(), StrategyKind::Basic, &["f4(f4, f4)"]);
    let x = NdArray::arange(3, DType::F32);
    assert!(matches!(
        ufunc.call(&[&x, &x, &x]),
        Err(UfuncError::Arity { expected: 2, got: 3, .. })
    ));

    let mut vectorizer = Vectorizer::new(add());
    assert!(matches!(
        vectorizer.add(DType::F32, &[DType::F32]),
        Err(UfuncError::Arity { .. })
    ));
    vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap();
    assert!(matches!(
        vectorizer.add(DType::F32, &[DType::F32, DType::F32]),
        Err(UfuncError::DuplicateSignature(_))
    ));
    assert_eq!(vectorizer.len(), 1);

    let empty = Vectorizer::new(add());
    assert!(matches!(empty.build(), Err(UfuncError::InvalidState(_))));

    let mut core_on_elementwise = Vectorizer::new(dot());
    assert!(matches!(
        core_on_elementwise.add(DType::F32, &[DType::F32, DType::F32]),
        Err(UfuncError::Compilation { .. })
    ));
}

struct RejectingCompiler;

impl KernelCompiler for RejectingCompiler {
    fn compile(&self, signature: &Signature, _function: &ScalarFunction) -> UfuncResult<Arc<dyn Kernel>> {
        Err(UfuncError::compilation(signature, "unsupported target"))
    }
}

#[test]
fn test_compilation_failure_leaves_table_unchanged() {
    let mut vectorizer = Vectorizer::new(add()).with_compiler(Arc::new(RejectingCompiler));
    let err = vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap_err();
    assert!(err.to_string().contains("unsupported target"));
    assert!(vectorizer.is_empty());
}

#[test]
fn test_reduce_errors() {
    let ufunc = build(add(), StrategyKind::Basic, &["f4(f4, f4)"]);
    let empty = NdArray::zeros(&[0, 3], DType::F32);
    assert!(matches!(ufunc.reduce(&empty), Err(UfuncError::InvalidInput(_))));
    let zero_d = NdArray::scalar(Scalar::F32(1.0));
    assert!(matches!(ufunc.reduce(&zero_d), Err(UfuncError::InvalidInput(_))));
    let a = NdArray::arange(6, DType::F32).reshape(&[2, 3]).unwrap();
    assert!(matches!(
        ufunc.reduce_axis(&a, 2),
        Err(UfuncError::AxisOutOfBounds { axis: 2, ndim: 2 })
    ));

    let quad = build(add_multiple_args(), StrategyKind::Basic, &["f4(f4, f4, f4, f4)"]);
    assert!(matches!(quad.reduce(&a), Err(UfuncError::Arity { expected: 2, got: 4, .. })));

    // the f8 result cannot be fed back as an f4 accumulator
    let widening = build(add(), StrategyKind::Basic, &["f8(f4, f4)"]);
    assert!(widening.call(&[&a, &a]).is_ok());
    assert!(matches!(widening.reduce(&a), Err(UfuncError::TypeMismatch { .. })));
}

#[test]
fn test_accumulate_over_empty_axis_keeps_shape() {
    for strategy in STRATEGIES {
        let ufunc = build(add(), strategy, &["i64(i64, i64)"]);
        let empty_rows = NdArray::zeros(&[0, 2], DType::I64);
        let out = ufunc.accumulate(&empty_rows).unwrap();
        assert_eq!(out.shape(), &[0, 2], "{:?}", strategy);
        assert!(out.is_empty());

        let empty_cols = NdArray::zeros(&[2, 0], DType::I64);
        assert_eq!(ufunc.accumulate(&empty_cols).unwrap().shape(), &[2, 0]);
        assert_eq!(ufunc.accumulate_axis(&empty_cols, 1).unwrap().shape(), &[2, 0]);

        // reduce still has nothing to return
        assert!(matches!(ufunc.reduce(&empty_rows), Err(UfuncError::InvalidInput(_))));
    }
}

#[test]
fn test_ufunc_reusable_after_failed_call() {
    let ufunc = build(add(), StrategyKind::Stream, &["f4(f4, f4)"]);
    let (a, _, _, _) = fixtures();
    let short = NdArray::zeros(&[7, 10], DType::F32);
    assert!(matches!(ufunc.call(&[&a, &short]), Err(UfuncError::ShapeBroadcast { .. })));
    let doubles = NdArray::arange(4, DType::F64);
    assert!(matches!(ufunc.call(&[&doubles, &doubles]), Err(UfuncError::TypeMismatch { .. })));

    let out = ufunc.call(&[&a, &a]).unwrap();
    let expected: Vec<f32> = a.to_vec::<f32>().iter().map(|x| x + x).collect();
    assert_eq!(out.to_vec::<f32>(), expected);
    assert_eq!(ufunc.reduce(&a).unwrap().shape(), &[10]);
}

#[test]
fn test_gufunc_rejects_wrong_core_result_shape() {
    let pair = ScalarFunction::core("pair", 2, |args| Ok(NdArray::zeros(&[2], args[0].dtype())));
    let mut vectorizer = Vectorizer::generalized(pair, "(m),(m)->()").unwrap();
    vectorizer.add(DType::F64, &[DType::F64, DType::F64]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    let x = NdArray::arange(6, DType::F64).reshape(&[2, 3]).unwrap();
    match ufunc.call(&[&x, &x]) {
        Err(UfuncError::InvalidInput(message)) => assert!(message.contains("[2]")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_device_call_accounts_staged_inputs() {
    let device = Arc::new(EmulatedDevice::new(Device::Emulated(0), 2));
    let mut vectorizer = Vectorizer::new(add())
        .with_config(test_config())
        .with_strategy(StrategyKind::Device)
        .with_device(device.clone());
    vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    let x = NdArray::arange(100, DType::F32);
    let out = ufunc.call(&[&x, &x]).unwrap();
    assert_eq!(out.device(), Device::Cpu);
    // both staged inputs were resident at once
    assert!(device.memory().peak() >= 2 * 100 * 4);
    assert_eq!(device.memory().allocated(), 0);
}

#[test]
fn test_random_reductions_agree_across_strategies() {
    let mut rng = fastrand::Rng::with_seed(7);
    let reference = build(add(), StrategyKind::Basic, &["i64(i64, i64)"]);
    let others: Vec<Ufunc> = STRATEGIES[1..]
        .iter()
        .map(|s| build(add(), *s, &["i64(i64, i64)"]))
        .collect();

    for _ in 0..8 {
        let shape: Vec<usize> = (0..rng.usize(1..4)).map(|_| rng.usize(1..24)).collect();
        let len: usize = shape.iter().product();
        let data: Vec<i64> = (0..len).map(|_| rng.i64(-1000..1000)).collect();
        let array = NdArray::from_vec(data, &shape).unwrap();
        let axis = rng.usize(0..shape.len());

        let expected = reference.reduce_axis(&array, axis).unwrap().to_vec::<i64>();
        let running = reference.accumulate_axis(&array, axis).unwrap().to_vec::<i64>();
        for ufunc in &others {
            assert_eq!(ufunc.reduce_axis(&array, axis).unwrap().to_vec::<i64>(), expected);
            assert_eq!(ufunc.accumulate_axis(&array, axis).unwrap().to_vec::<i64>(), running);
        }
    }
}

#[test]
fn test_device_falls_back_to_host() {
    let config = ConfigBuilder::new()
        .device(|d| {
            d.device = Device::Cuda(0);
            d.fallback_to_host = true;
        })
        .build()
        .unwrap();
    let mut vectorizer = Vectorizer::new(add())
        .with_config(config)
        .with_strategy(StrategyKind::Device);
    vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    let x = NdArray::arange(5, DType::F32);
    let (out, report) = ufunc.call_reported(&[&x, &x]).unwrap();
    assert_eq!(out.to_vec::<f32>(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    assert!(report.fell_back);
    assert_eq!(report.strategy, StrategyKind::Basic);
    assert!(report.warnings[0].contains("cuda:0"));
}

#[test]
fn test_device_failure_without_fallback() {
    let device = Arc::new(EmulatedDevice::new(Device::Emulated(0), 2).with_fault(DeviceFault::Launch { after: 1 }));
    let mut vectorizer = Vectorizer::new(add())
        .with_config(test_config())
        .with_strategy(StrategyKind::Device)
        .with_device(device.clone());
    vectorizer.add(DType::F32, &[DType::F32, DType::F32]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    let x = NdArray::arange(100, DType::F32);
    let err = ufunc.call(&[&x, &x]).unwrap_err();
    assert!(matches!(err, UfuncError::Device(_)));
    assert_eq!(device.memory().allocated(), 0);
}

#[test]
fn test_device_fault_mid_run_falls_back() {
    let device = Arc::new(EmulatedDevice::new(Device::Emulated(0), 2).with_fault(DeviceFault::Download { after: 1 }));
    let mut config = test_config();
    config.device.fallback_to_host = true;
    let mut vectorizer = Vectorizer::new(add())
        .with_config(config)
        .with_strategy(StrategyKind::Device)
        .with_device(device.clone());
    vectorizer.add(DType::I32, &[DType::I32, DType::I32]).unwrap();
    let ufunc = vectorizer.build().unwrap();

    let x = NdArray::arange(100, DType::I32);
    let (out, report) = ufunc.reduce_reported(&x, 0).unwrap();
    assert_eq!(out.item().unwrap(), Scalar::I32(4950));
    assert!(report.fell_back);
    assert_eq!(device.memory().allocated(), 0);
}

#[test]
fn test_ufunc_is_shared_across_threads() {
    let ufunc = Arc::new(build(add(), StrategyKind::Parallel, &["f8(f8, f8)"]));
    let x = NdArray::arange(500, DType::F64);
    let expected = ufunc.call(&[&x, &x]).unwrap().to_vec::<f64>();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let ufunc = ufunc.clone();
            let (x, expected) = (&x, &expected);
            scope.spawn(move || {
                assert_eq!(ufunc.call(&[x, x]).unwrap().to_vec::<f64>(), *expected);
            });
        }
    });
}

#[test]
fn test_stream_rejects_async_context() {
    let ufunc = build(add(), StrategyKind::Stream, &["f4(f4, f4)"]);
    let x = NdArray::arange(64, DType::F32);
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let result = runtime.block_on(async { ufunc.call(&[&x, &x]) });
    assert!(matches!(result, Err(UfuncError::InvalidState(_))));
}
