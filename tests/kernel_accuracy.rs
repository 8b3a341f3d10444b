// Kernel accuracy tests - compare layer outputs with hand-computed references
mod common;

use approx::assert_abs_diff_eq;
use common::{assert_batches_close, assert_close, init_tracing};
use deconv::backend::{Cpu, Reference};
use deconv::kernels::gemm::OnesVector;
use deconv::kernels::trans_conv::{generate_conv_matrix, trans_conv_layer_forward};
use deconv::kernels::ActivationFunction;
use deconv::{ConvLayer, Initialization, Layer, LayerConfig, Matrix, TransConvAlgorithm, TransConvLayer};

const IMAGE: [f64; 4] = [2.0, 1.0, 4.0, 4.0];
const FILTER: [f64; 9] = [1.0, 4.0, 1.0, 1.0, 4.0, 3.0, 3.0, 3.0, 1.0];
const EXPECTED: [f64; 16] = [
    2.0, 9.0, 6.0, 1.0, //
    6.0, 29.0, 30.0, 7.0, //
    10.0, 29.0, 33.0, 13.0, //
    12.0, 24.0, 16.0, 4.0,
];

fn fixture_config() -> LayerConfig {
    LayerConfig::new(1, 1, 2, 2, 1, 3, 3)
        .with_initialization(Initialization::Zero)
        .with_seed(0)
}

#[test]
fn test_trans_conv_forward_fixture() {
    init_tracing();
    for algorithm in [TransConvAlgorithm::Scatter, TransConvAlgorithm::Dense] {
        let mut layer = TransConvLayer::<f64>::new(fixture_config().with_algorithm(algorithm)).unwrap();
        *layer.state_mut().weights_mut() = Matrix::from_row_major(1, 9, &FILTER);

        let input = vec![Matrix::from_row_major(1, 4, &IMAGE)];
        layer.forward(&input);

        let output = &layer.state().output()[0];
        assert_eq!(output.shape(), (1, 16));
        assert_close(&output.to_row_major(), &EXPECTED, 1e-4, "trans conv fixture");
        // identity activation caches unit derivatives
        assert!(layer.state().derivatives()[0].as_slice().iter().all(|&d| d == 1.0));
    }
}

#[test]
fn test_trans_conv_forward_fixture_f32() {
    let mut layer = TransConvLayer::<f32>::new(fixture_config()).unwrap();
    let filter: Vec<f32> = FILTER.iter().map(|&v| v as f32).collect();
    let image: Vec<f32> = IMAGE.iter().map(|&v| v as f32).collect();
    *layer.state_mut().weights_mut() = Matrix::from_row_major(1, 9, &filter);

    layer.forward(&[Matrix::from_row_major(1, 4, &image)]);

    for (got, want) in layer.state().output()[0].to_row_major().iter().zip(EXPECTED) {
        assert_abs_diff_eq!(*got, want as f32, epsilon = 1e-4);
    }
}

#[test]
fn test_trans_conv_two_channels_two_filters() {
    // filter 0 only sees channel 0, filter 1 sees both copies of the image
    let config = LayerConfig::new(1, 2, 2, 2, 2, 3, 3)
        .with_initialization(Initialization::Zero)
        .with_seed(0);
    let mut layer = TransConvLayer::<f64>::new(config).unwrap();
    let weights = layer.state_mut().weights_mut();
    for (k, &w) in FILTER.iter().enumerate() {
        weights[(0, k)] = w;
        weights[(1, k)] = w;
        weights[(1, 9 + k)] = w;
    }
    *layer.state_mut().biases_mut() = Matrix::from_row_major(2, 1, &[0.5, -1.0]);

    let image = Matrix::from_fn(2, 4, |_, j| IMAGE[j]);
    layer.forward(&[image]);

    let output = &layer.state().output()[0];
    let row0: Vec<f64> = EXPECTED.iter().map(|e| e + 0.5).collect();
    let row1: Vec<f64> = EXPECTED.iter().map(|e| 2.0 * e - 1.0).collect();
    let rows = output.to_row_major();
    assert_close(&rows[..16], &row0, 1e-10, "filter 0");
    assert_close(&rows[16..], &row1, 1e-10, "filter 1");
}

#[test]
fn test_conv_with_rotated_filter_matches_trans_conv() {
    // a transpose convolution is a full-padding convolution with the flipped kernel
    let mut layer = ConvLayer::<f64>::new(fixture_config().with_padding(2, 2)).unwrap();
    let rotated: Vec<f64> = FILTER.iter().rev().copied().collect();
    *layer.state_mut().weights_mut() = Matrix::from_row_major(1, 9, &rotated);

    layer.forward(&[Matrix::from_row_major(1, 4, &IMAGE)]);

    assert_eq!(layer.state().output_shape().spatial(), 16);
    assert_close(&layer.state().output()[0].to_row_major(), &EXPECTED, 1e-10, "rotated conv");
}

#[test]
fn test_strided_trans_conv_replicates_pixels() {
    // 2x2 all-ones kernel with stride 2 paints each input pixel into its own block
    let mut layer = TransConvLayer::<f64>::new(LayerConfig::new(1, 1, 2, 2, 1, 2, 2).with_stride(2, 2)).unwrap();
    layer.state_mut().weights_mut().fill(1.0);
    layer.state_mut().biases_mut().fill(0.0);

    layer.forward(&[Matrix::from_row_major(1, 4, &[1.0, 2.0, 3.0, 4.0])]);

    let expected = [
        1.0, 1.0, 2.0, 2.0, //
        1.0, 1.0, 2.0, 2.0, //
        3.0, 3.0, 4.0, 4.0, //
        3.0, 3.0, 4.0, 4.0,
    ];
    assert_close(&layer.state().output()[0].to_row_major(), &expected, 1e-12, "stride 2");
}

#[test]
fn test_activation_and_derivative_cache() {
    let config = fixture_config().with_activation(ActivationFunction::Tanh);
    let mut layer = TransConvLayer::<f64>::new(config).unwrap();
    let scaled: Vec<f64> = FILTER.iter().map(|w| w * 0.05).collect();
    *layer.state_mut().weights_mut() = Matrix::from_row_major(1, 9, &scaled);

    layer.forward(&[Matrix::from_row_major(1, 4, &IMAGE)]);

    let output = layer.state().output()[0].to_row_major();
    let derivatives = layer.state().derivatives()[0].to_row_major();
    for ((y, d), e) in output.iter().zip(&derivatives).zip(EXPECTED) {
        let pre = 0.05 * e;
        assert_abs_diff_eq!(*y, pre.tanh(), epsilon = 1e-12);
        assert_abs_diff_eq!(*d, 1.0 - pre.tanh().powi(2), epsilon = 1e-12);
    }
}

#[test]
fn test_dense_conv_matrix_layout() {
    let layer = TransConvLayer::<f64>::new(fixture_config()).unwrap();
    let weights = Matrix::from_row_major(1, 9, &FILTER);
    let m = generate_conv_matrix(&weights, layer.state().params());
    assert_eq!(m.shape(), (16, 4));

    // input pixel (0, 0) lands the kernel in the top-left corner of the output
    let rows = [0, 1, 2, 4, 5, 6, 8, 9, 10];
    for (k, &r) in rows.iter().enumerate() {
        assert_eq!(m[(r, 0)], FILTER[k]);
    }
    assert_eq!(m.column(0).iter().filter(|&&v| v != 0.0).count(), 9);

    // multiplying by the flattened image reproduces the fixture
    let x = Matrix::from_row_major(4, 1, &IMAGE);
    let y: Vec<f64> = (0..16).map(|r| (0..4).map(|c| m[(r, c)] * x[(c, 0)]).sum()).collect();
    assert_close(&y, &EXPECTED, 1e-12, "dense fixture");
}

#[test]
fn test_reference_backend_matches_cpu() {
    let layer = TransConvLayer::<f64>::new(
        LayerConfig::new(3, 2, 4, 3, 3, 3, 2)
            .with_stride(2, 1)
            .with_padding(1, 0)
            .with_seed(11),
    )
    .unwrap();
    let state = layer.state();
    let params = *state.params();
    let out = state.output_shape();
    let input: Vec<Matrix<f64>> = (0..3).map(|i| common::sample(2, 12, i as f64)).collect();
    let biases = common::sample(3, 1, 0.3);
    let ones = OnesVector::new(out.spatial());

    let run = |reference: bool| {
        let mut y = vec![Matrix::new(out.depth, out.spatial()); 3];
        let mut df = y.clone();
        let mut scratch = state.forward_matrices().to_vec();
        if reference {
            trans_conv_layer_forward(
                &Reference,
                &mut y,
                &mut df,
                &input,
                state.weights(),
                &biases,
                &params,
                ActivationFunction::Sigmoid,
                TransConvAlgorithm::Scatter,
                &mut scratch,
                &ones,
            );
        } else {
            trans_conv_layer_forward(
                &Cpu,
                &mut y,
                &mut df,
                &input,
                state.weights(),
                &biases,
                &params,
                ActivationFunction::Sigmoid,
                TransConvAlgorithm::Scatter,
                &mut scratch,
                &ones,
            );
        }
        (y, df)
    };
    let (y_ref, df_ref) = run(true);
    let (y_cpu, df_cpu) = run(false);
    assert_batches_close(&y_cpu, &y_ref, 1e-12, "output");
    assert_batches_close(&df_cpu, &df_ref, 1e-12, "derivatives");
}
