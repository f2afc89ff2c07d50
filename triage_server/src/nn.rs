use common::protocol::Label;
use image::RgbImage;
use ndarray::s;
use tract_onnx::prelude::*;

use crate::error::TriageError;

pub(crate) type NnModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Per-channel normalization constants of the ImageNet training set.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Confidence reported with a degraded `unknown` answer.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Label and confidence of a single image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
}

impl Prediction {
    pub fn unknown() -> Self {
        Self {
            label: Label::Unknown,
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    /// Map the argmax of the 2-class head to a label.
    pub fn from_class_index(index: usize, confidence: f32) -> Result<Self, TriageError> {
        let label = match index {
            0 => Label::Other,
            1 => Label::Acne,
            _ => {
                return Err(TriageError::Prediction(format!(
                    "class index {index} has no label"
                )))
            }
        };

        Ok(Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

pub trait InferModel {
    fn run(&self, input: &RgbImage) -> Result<Prediction, TriageError>;
}

/// Binary skin classifier on top of a runnable tract plan.
pub struct Classifier {
    model: NnModel,
    width: u32,
    height: u32,
    num_classes: usize,
}

impl Classifier {
    pub(crate) fn new(model: NnModel, width: u32, height: u32, num_classes: usize) -> Self {
        Self {
            model,
            width,
            height,
            num_classes,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Turn the `[1, num_classes]` logits into a label and confidence.
    fn postproc(&self, logits: &Tensor) -> Result<Prediction, TriageError> {
        let view = logits.to_array_view::<f32>().map_err(TriageError::prediction)?;

        if view.shape() != [1, self.num_classes].as_slice() {
            return Err(TriageError::Prediction(format!(
                "expected output shape [1, {}], got {:?}",
                self.num_classes,
                view.shape()
            )));
        }

        let logits = view.slice(s![0, ..]).to_vec();
        let probabilities = softmax(&logits);
        let (index, confidence) = argmax(&probabilities)
            .ok_or_else(|| TriageError::Prediction("empty model output".into()))?;

        log::debug!(
            "Output shape: {:?}, pred index: {}, confidence: {:.4}",
            view.shape(),
            index,
            confidence
        );

        Prediction::from_class_index(index, confidence)
    }
}

impl InferModel for Classifier {
    fn run(&self, input: &RgbImage) -> Result<Prediction, TriageError> {
        let valid_input = tvec!(preprocess(input, self.width, self.height).into());
        let raw_nn_out = self.model.run(valid_input).map_err(TriageError::prediction)?;
        let logits = raw_nn_out
            .first()
            .ok_or_else(|| TriageError::Prediction("model produced no output".into()))?;

        self.postproc(logits)
    }
}

/// Decode raw upload bytes into an RGB image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, TriageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Resize to the network input and normalize into a `(1, 3, height, width)` tensor.
pub fn preprocess(input: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized: RgbImage = image::imageops::resize(
        input,
        width,
        height,
        image::imageops::FilterType::Triangle,
    );

    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| (resized[(x as _, y as _)][c] as f32 / 255.0 - MEAN[c]) / STD[c],
    )
    .into()
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|x| x / sum).collect()
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
