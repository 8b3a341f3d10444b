//! Kernel-level benchmarks for the convolution layers
//!
//! Run with: cargo bench --bench kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use deconv::kernels::im2col::{im2col, im2col_fast, im2col_fast_par, im2col_indices};
use deconv::{ConvLayer, FilterGeometry, ImageShape, Layer, LayerConfig, Matrix, TransConvAlgorithm, TransConvLayer};

fn sample(rows: usize, cols: usize) -> Matrix<f32> {
    Matrix::from_fn(rows, cols, |i, j| ((i * 31 + j * 7) % 10) as f32 * 0.1)
}

fn batch(depth: usize, spatial: usize, n: usize) -> Vec<Matrix<f32>> {
    (0..n).map(|_| sample(depth, spatial)).collect()
}

// ============================================================================
// Gather Benchmarks
// ============================================================================

fn bench_gather(c: &mut Criterion) {
    let mut group = c.benchmark_group("im2col");

    // (depth, height, width, filter, stride, padding)
    let shapes = [(3, 32, 32, 3, 1, 1), (16, 28, 28, 5, 1, 2), (32, 16, 16, 3, 2, 1)];

    for &(depth, height, width, f, s, p) in &shapes {
        let image = ImageShape::new(depth, height, width);
        let filter = FilterGeometry {
            depth,
            height: f,
            width: f,
            stride_rows: s,
            stride_cols: s,
            padding_height: p,
            padding_width: p,
        };
        let (rows, cols) = filter.local_view_dims(image);
        let input = sample(depth, image.spatial());
        let indices = im2col_indices(image, &filter);
        let mut output = Matrix::new(rows * cols, filter.local_view_pixels());
        let label = format!("{}x{}x{}_f{}_s{}", depth, height, width, f, s);

        group.throughput(Throughput::Elements(output.len() as u64));
        group.bench_with_input(BenchmarkId::new("direct", &label), &label, |bencher, _| {
            bencher.iter(|| im2col(&mut output, black_box(&input), image, &filter));
        });
        group.bench_with_input(BenchmarkId::new("index_map", &label), &label, |bencher, _| {
            bencher.iter(|| im2col_fast(&mut output, black_box(&input), &indices));
        });
        group.bench_with_input(BenchmarkId::new("index_map_par", &label), &label, |bencher, _| {
            bencher.iter(|| im2col_fast_par(&mut output, black_box(&input), &indices));
        });
    }

    group.finish();
}

// ============================================================================
// Forward Benchmarks
// ============================================================================

fn bench_conv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_forward");

    let config = LayerConfig::new(8, 16, 28, 28, 32, 3, 3).with_padding(1, 1).with_seed(1);
    let Ok(mut layer) = ConvLayer::<f32>::new(config) else {
        return;
    };
    let input = batch(16, 28 * 28, 8);

    group.bench_function("16x28x28_to_32", |bencher| {
        bencher.iter(|| layer.forward(black_box(&input)));
    });

    group.finish();
}

fn bench_trans_conv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("trans_conv_forward");

    // (input depth, size, filters, filter, stride, padding)
    let shapes = [(32, 7, 16, 4, 2, 1), (16, 14, 8, 4, 2, 1), (8, 8, 8, 3, 1, 1)];

    for &(depth, size, filters, f, s, p) in &shapes {
        let input = batch(depth, size * size, 4);
        for algorithm in [TransConvAlgorithm::Scatter, TransConvAlgorithm::Dense] {
            let config = LayerConfig::new(4, depth, size, size, filters, f, f)
                .with_stride(s, s)
                .with_padding(p, p)
                .with_algorithm(algorithm)
                .with_seed(2);
            let Ok(mut layer) = TransConvLayer::<f32>::new(config) else {
                continue;
            };
            let label = format!("{}x{}x{}_to_{}_s{}", depth, size, size, filters, s);
            group.bench_with_input(BenchmarkId::new(format!("{:?}", algorithm), &label), &label, |bencher, _| {
                bencher.iter(|| layer.forward(black_box(&input)));
            });
        }
    }

    group.finish();
}

// ============================================================================
// Backward Benchmarks
// ============================================================================

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("backward");

    let input = batch(32, 7 * 7, 4);
    let config = LayerConfig::new(4, 32, 7, 7, 16, 4, 4)
        .with_stride(2, 2)
        .with_padding(1, 1)
        .with_seed(3);
    if let Ok(mut layer) = TransConvLayer::<f32>::new(config) {
        let out = layer.state().output_shape();
        let mut gradients = vec![Matrix::new(32, 7 * 7); 4];
        group.bench_function("trans_conv_32x7x7_to_16", |bencher| {
            bencher.iter(|| {
                layer.forward(&input);
                layer
                    .state_mut()
                    .activation_gradients_mut()
                    .iter_mut()
                    .for_each(|g| *g = sample(out.depth, out.spatial()));
                layer.backward(&mut gradients, black_box(&input));
            });
        });
    }

    let input = batch(16, 15 * 15, 4);
    let config = LayerConfig::new(4, 16, 15, 15, 16, 3, 3)
        .with_stride(2, 2)
        .with_padding(1, 1)
        .with_seed(4);
    if let Ok(mut layer) = ConvLayer::<f32>::new(config) {
        let out = layer.state().output_shape();
        let mut gradients = vec![Matrix::new(16, 15 * 15); 4];
        group.bench_function("conv_16x15x15_stride2", |bencher| {
            bencher.iter(|| {
                layer.forward(&input);
                layer
                    .state_mut()
                    .activation_gradients_mut()
                    .iter_mut()
                    .for_each(|g| *g = sample(out.depth, out.spatial()));
                layer.backward(&mut gradients, black_box(&input));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gather, bench_conv_forward, bench_trans_conv_forward, bench_backward);
criterion_main!(benches);
