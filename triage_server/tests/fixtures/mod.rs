//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use prost::Message;
use safetensors::{tensor::TensorView, Dtype};
use tract_onnx::pb;

/// Head that separates bright from dark images: class 1 for bright, class 0 for dark.
pub const BRIGHT_IS_ACNE_WEIGHT: [f32; 6] = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
pub const ZERO_BIAS: [f32; 2] = [0.0, 0.0];

/// Fresh directory per test, tests of one binary share a process.
pub fn fixture_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "triage-server-{}-{}",
        std::process::id(),
        test_name
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Linear classification head on globally pooled channels.
///
/// `logits = weight · mean(input, spatial) + bias`, with `weight` of shape `[classes, 3]`.
/// An unused `features.0.weight` initializer stands in for the body of the network.
pub fn pooled_linear_model(weight: &[f32], bias: &[f32]) -> pb::ModelProto {
    let classes = bias.len() as i64;
    assert_eq!(weight.len() as i64, classes * 3);

    pb::ModelProto {
        ir_version: 7,
        opset_import: vec![pb::OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        graph: Some(pb::GraphProto {
            name: "pooled_linear".into(),
            node: vec![
                node("GlobalAveragePool", &["input"], &["pooled"], vec![]),
                node("Flatten", &["pooled"], &["flat"], vec![int_attr("axis", 1)]),
                node(
                    "Gemm",
                    &["flat", "classifier.1.weight", "classifier.1.bias"],
                    &["logits"],
                    vec![int_attr("transB", 1)],
                ),
            ],
            initializer: vec![
                float_tensor("features.0.weight", &[3], &[1.0, 1.0, 1.0]),
                float_tensor("classifier.1.weight", &[classes, 3], weight),
                float_tensor("classifier.1.bias", &[classes], bias),
            ],
            input: vec![value_info("input", &[1, 3, 224, 224])],
            output: vec![value_info("logits", &[1, classes])],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn write_model(dir: &Path, file_name: &str, model: &pb::ModelProto) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, model.encode_to_vec()).unwrap();
    path
}

/// Write the 2-class bright/dark classifier as a full ONNX model.
pub fn write_bright_model(dir: &Path) -> PathBuf {
    write_model(
        dir,
        "model.onnx",
        &pooled_linear_model(&BRIGHT_IS_ACNE_WEIGHT, &ZERO_BIAS),
    )
}

/// One entry of a safetensors state dict.
pub struct Param {
    name: String,
    dtype: Dtype,
    shape: Vec<usize>,
    data: Vec<u8>,
}

pub fn f32_param(name: &str, shape: &[usize], values: &[f32]) -> Param {
    Param {
        name: name.into(),
        dtype: Dtype::F32,
        shape: shape.to_vec(),
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

pub fn i64_param(name: &str, shape: &[usize], values: &[i64]) -> Param {
    Param {
        name: name.into(),
        dtype: Dtype::I64,
        shape: shape.to_vec(),
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

pub fn write_state_dict(dir: &Path, file_name: &str, params: &[Param]) -> PathBuf {
    let views: Vec<(String, TensorView)> = params
        .iter()
        .map(|param| {
            let view = TensorView::new(param.dtype, param.shape.clone(), &param.data).unwrap();
            (param.name.clone(), view)
        })
        .collect();

    let path = dir.join(file_name);
    std::fs::write(&path, safetensors::serialize(views, &None).unwrap()).unwrap();
    path
}

pub fn png_bytes(color: [u8; 3], width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    encode_png(image)
}

/// Horizontal gradient, so predictions depend on the resize.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        let v = (x * 255 / width.max(1)) as u8;
        Rgb([v, 255 - v, v / 2])
    });
    encode_png(image)
}

fn encode_png(image: RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn node(
    op_type: &str,
    inputs: &[&str],
    outputs: &[&str],
    attribute: Vec<pb::AttributeProto>,
) -> pb::NodeProto {
    pb::NodeProto {
        name: format!("{op_type}_0"),
        op_type: op_type.into(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        attribute,
        ..Default::default()
    }
}

fn int_attr(name: &str, value: i64) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.into(),
        r#type: pb::attribute_proto::AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

fn float_tensor(name: &str, dims: &[i64], values: &[f32]) -> pb::TensorProto {
    pb::TensorProto {
        name: name.into(),
        dims: dims.to_vec(),
        data_type: pb::tensor_proto::DataType::Float as i32,
        float_data: values.to_vec(),
        ..Default::default()
    }
}

fn value_info(name: &str, shape: &[i64]) -> pb::ValueInfoProto {
    let dim = shape
        .iter()
        .map(|d| pb::tensor_shape_proto::Dimension {
            value: Some(pb::tensor_shape_proto::dimension::Value::DimValue(*d)),
            ..Default::default()
        })
        .collect();

    pb::ValueInfoProto {
        name: name.into(),
        r#type: Some(pb::TypeProto {
            value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                elem_type: pb::tensor_proto::DataType::Float as i32,
                shape: Some(pb::TensorShapeProto {
                    dim,
                    ..Default::default()
                }),
                ..Default::default()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}
