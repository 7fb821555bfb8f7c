// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the heatmap post-processing model

use std::collections::HashMap;

use half::f16;
use heatmap_postprocess::{
    DecodeConfig, HeatmapPostprocessor, InferenceError, InferenceRequest, ServingModel, Tensor,
    tile_calibration,
};
use ndarray::{Array4, ArrayD, IxDyn};

const JOINTS: usize = 17;
const HEIGHT: usize = 64;
const WIDTH: usize = 48;

fn host_args() -> HashMap<String, String> {
    let model_config = r#"{
        "name": "postprocess",
        "backend": "python",
        "max_batch_size": 16,
        "input": [{"name": "post_input", "data_type": "TYPE_FP32", "dims": [17, 64, 48]}],
        "output": [{"name": "post_output", "data_type": "TYPE_FP32", "dims": [17, 2]}]
    }"#;
    HashMap::from([
        ("model_config".to_string(), model_config.to_string()),
        ("model_instance_kind".to_string(), "KIND_CPU".to_string()),
        ("model_instance_device_id".to_string(), "0".to_string()),
        ("model_repository".to_string(), "/models/postprocess".to_string()),
        ("model_version".to_string(), "1".to_string()),
        ("model_name".to_string(), "postprocess".to_string()),
    ])
}

/// Smooth single-peak heatmaps with a different peak per joint and image.
fn heatmaps(batch: usize) -> Array4<f32> {
    Array4::from_shape_fn((batch, JOINTS, HEIGHT, WIDTH), |(n, k, y, x)| {
        let mx = 8.0 + k as f32 * 1.7 + n as f32 * 0.3;
        let my = 12.0 + k as f32 * 2.1;
        let d2 = (x as f32 - mx).powi(2) + (y as f32 - my).powi(2);
        (-d2 / 8.0).exp()
    })
}

fn request(batch: usize) -> InferenceRequest {
    InferenceRequest::new(vec![Tensor::new("post_input", heatmaps(batch).into_dyn())])
}

#[test]
fn test_batch_size_preserved() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    for batch in [1, 2, 5, 16] {
        let responses = model.execute(&[request(batch)]).unwrap();
        assert_eq!(responses.len(), 1);
        let output = responses[0].output("post_output").unwrap();
        assert_eq!(output.data().shape(), &[batch, JOINTS, 2]);
    }
    model.finalize();
}

#[test]
fn test_responses_in_request_order() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    let requests: Vec<_> = [3, 1, 4].into_iter().map(request).collect();
    let responses = model.execute(&requests).unwrap();

    let batches: Vec<usize> = responses
        .iter()
        .map(|r| r.output("post_output").unwrap().data().shape()[0])
        .collect();
    assert_eq!(batches, vec![3, 1, 4]);
}

#[test]
fn test_repeated_execution_is_bit_identical() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    let first = model.execute(&[request(4)]).unwrap();
    let second = model.execute(&[request(4)]).unwrap();
    assert_eq!(first, second);

    let a = first[0].output("post_output").unwrap().as_f32().unwrap();
    let b = second[0].output("post_output").unwrap().as_f32().unwrap();
    assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn test_each_image_decoded_independently() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    let batched = model.execute(&[request(3)]).unwrap();
    let batched = batched[0].output("post_output").unwrap().as_f32().unwrap().clone();

    let single = model.execute(&[request(1)]).unwrap();
    let single = single[0].output("post_output").unwrap().as_f32().unwrap().clone();

    for k in 0..JOINTS {
        for c in 0..2 {
            assert_eq!(batched[[0, k, c]].to_bits(), single[[0, k, c]].to_bits());
        }
    }
}

#[test]
fn test_half_precision_input() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    let half_maps = heatmaps(2).mapv(f16::from_f32).into_dyn();
    let request = InferenceRequest::new(vec![Tensor::new("post_input", half_maps)]);

    let responses = model.execute(&[request]).unwrap();
    let output = responses[0].output("post_output").unwrap();
    assert_eq!(output.data().data_type(), "TYPE_FP32");
    assert_eq!(output.data().shape(), &[2, JOINTS, 2]);
}

#[test]
fn test_malformed_input_propagates_error() {
    let model = HeatmapPostprocessor::initialize(&host_args()).unwrap();
    let flat = InferenceRequest::new(vec![Tensor::new(
        "post_input",
        ArrayD::<f32>::zeros(IxDyn(&[2, JOINTS * HEIGHT * WIDTH])),
    )]);
    let err = model.execute(&[request(1), flat]).unwrap_err();
    assert!(matches!(err, InferenceError::ShapeError(_)));
}

#[test]
fn test_keypoints_land_in_image_space() {
    // Calibration for a 192x256 crop centered at (96, 128), without UDP.
    let config = DecodeConfig::new()
        .with_center(96.0, 128.0)
        .with_scale(192.0, 256.0)
        .with_udp(false);
    let model = HeatmapPostprocessor::from_config(config).unwrap();

    let mut maps = Array4::<f32>::zeros((1, 1, HEIGHT, WIDTH));
    maps[[0, 0, 20, 30]] = 1.0;
    let request = InferenceRequest::new(vec![Tensor::new("post_input", maps.into_dyn())]);

    let responses = model.execute(&[request]).unwrap();
    let output = responses[0].output("post_output").unwrap().as_f32().unwrap();
    // Heatmap stride is 4 in both directions.
    assert!((output[[0, 0, 0]] - 120.0).abs() < 1e-4);
    assert!((output[[0, 0, 1]] - 80.0).abs() < 1e-4);
}

#[test]
fn test_tiled_calibration_matches_batch() {
    for batch in 1..=8 {
        let center = tile_calibration([128.0, 96.0], batch);
        let scale = tile_calibration([192.0, 256.0], batch);
        assert_eq!(center.dim(), (batch, 2));
        assert_eq!(scale.dim(), (batch, 2));
    }
}
