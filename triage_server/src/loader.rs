//! Loading of the classifier from its weights artifact.
//!
//! The artifact is either a safetensors parameter mapping ("state dict"), which is poured
//! into an ONNX architecture template, or a complete ONNX model used as is.
use std::{collections::HashMap, fs, io::Cursor, sync::Arc};

use clap::ValueEnum;
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use tokio::sync::OnceCell;
use tract_onnx::{pb, prelude::*};

use crate::{config::LoaderConfig, error::TriageError, nn::Classifier};

/// Training-only buffers of batch norm layers, absent from inference graphs.
const BATCHES_TRACKED_SUFFIX: &str = ".num_batches_tracked";

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ArtifactFormat {
    /// Safetensors mapping from parameter name to tensor.
    StateDict,
    /// Complete ONNX model.
    FullModel,
}

impl ArtifactFormat {
    /// Guess the format from the first bytes of the artifact.
    ///
    /// Safetensors files start with the little-endian length of a JSON header, followed by
    /// the header itself. Everything else is handed to the ONNX parser.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() > 8 && bytes[8] == b'{' {
            let mut len = [0_u8; 8];
            len.copy_from_slice(&bytes[..8]);
            let header_len = u64::from_le_bytes(len);
            if header_len > 0 && header_len <= (bytes.len() - 8) as u64 {
                return ArtifactFormat::StateDict;
            }
        }

        ArtifactFormat::FullModel
    }
}

/// Owner of the classifier, loaded on first use and kept for the lifetime of the loader.
pub struct ModelLoader {
    config: LoaderConfig,
    classifier: OnceCell<Arc<Classifier>>,
}

impl ModelLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            classifier: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.initialized()
    }

    /// Get the classifier, loading it if this is the first call.
    ///
    /// Concurrent first calls wait for a single load. A failed load is not remembered, the
    /// next call tries again.
    pub async fn load(&self) -> Result<Arc<Classifier>, TriageError> {
        let classifier = self
            .classifier
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let classifier = tokio::task::spawn_blocking(move || load_classifier(&config))
                    .await
                    .map_err(|e| TriageError::Load(format!("loader task failed: {e}")))??;

                Ok::<_, TriageError>(Arc::new(classifier))
            })
            .await?;

        Ok(Arc::clone(classifier))
    }
}

/// Read the weights artifact and build a runnable classifier from it.
pub fn load_classifier(config: &LoaderConfig) -> Result<Classifier, TriageError> {
    let weights_path = config.weights_path();
    if !weights_path.exists() {
        return Err(TriageError::NotFound(weights_path));
    }

    let bytes = fs::read(&weights_path)?;
    let format = config
        .artifact_format
        .unwrap_or_else(|| ArtifactFormat::detect(&bytes));
    log::info!(
        "Loading {:?} artifact from {}",
        format,
        weights_path.display()
    );

    let onnx = tract_onnx::onnx();
    let proto = match format {
        ArtifactFormat::FullModel => onnx
            .proto_model_for_read(&mut Cursor::new(bytes.as_slice()))
            .map_err(TriageError::load)?,
        ArtifactFormat::StateDict => {
            let architecture_path = config.architecture_path();
            if !architecture_path.exists() {
                return Err(TriageError::NotFound(architecture_path));
            }

            let mut proto = onnx
                .proto_model_for_path(&architecture_path)
                .map_err(TriageError::load)?;
            let state_dict = SafeTensors::deserialize(&bytes)
                .map_err(|e| TriageError::Load(format!("invalid state dict: {e:?}")))?;
            load_state_dict(&mut proto, &state_dict, config)?;

            proto
        }
    };

    let model = onnx.model_for_proto_model(&proto).map_err(TriageError::load)?;

    into_classifier(model, config)
}

/// Fix the input geometry, then type and optimize the graph for inference.
fn into_classifier(
    model: InferenceModel,
    config: &LoaderConfig,
) -> Result<Classifier, TriageError> {
    let (width, height) = (config.input_width, config.input_height);
    let input_fact = InferenceFact::dt_shape(
        f32::datum_type(),
        tvec!(1, 3, height as usize, width as usize),
    );

    // The declared output may still carry the shape of the template head.
    let typed = model
        .with_input_fact(0, input_fact)
        .map_err(TriageError::load)?
        .with_output_fact(0, InferenceFact::default())
        .map_err(TriageError::load)?
        .into_typed()
        .map_err(TriageError::load)?;

    let optimized = match typed.clone().into_optimized() {
        Ok(optimized) => optimized,
        Err(e) => {
            log::warn!("Could not optimize model for inference, running it as is: {e:#}");
            typed
        }
    };

    let plan = optimized.into_runnable().map_err(TriageError::load)?;
    log::info!("Model ready for {width}x{height} inputs");

    Ok(Classifier::new(plan, width, height, config.num_classes))
}

/// Overwrite the template initializers with the parameters of a state dict.
///
/// Unknown parameters, shape mismatches outside of the classification head and non-f32
/// tensors fail the load. Template initializers without a parameter keep their values.
fn load_state_dict(
    proto: &mut pb::ModelProto,
    state_dict: &SafeTensors,
    config: &LoaderConfig,
) -> Result<(), TriageError> {
    let mut params: HashMap<String, TensorView> = HashMap::new();
    for (key, view) in state_dict.tensors() {
        let name = strip_parallel_prefix(&key, &config.parallel_prefix);
        if name.ends_with(BATCHES_TRACKED_SUFFIX) {
            continue;
        }
        params.insert(name.to_owned(), view);
    }

    check_head(&params, config)?;

    let graph = proto
        .graph
        .as_mut()
        .ok_or_else(|| TriageError::Load("architecture has no graph".into()))?;

    let mut missing = vec![];
    for initializer in graph.initializer.iter_mut() {
        let name = initializer.name.clone();
        let Some(view) = params.remove(&name) else {
            missing.push(name);
            continue;
        };

        let dims = view.shape().iter().map(|d| *d as i64).collect::<Vec<_>>();
        if dims != initializer.dims && !is_head(&name, config) {
            return Err(TriageError::Load(format!(
                "shape mismatch for {name}: state dict has {:?}, architecture has {:?}",
                dims, initializer.dims
            )));
        }

        *initializer = to_initializer(&name, &view)?;
    }

    if !params.is_empty() {
        let mut unexpected: Vec<_> = params.into_keys().collect();
        unexpected.sort();
        return Err(TriageError::Load(format!(
            "unexpected keys in state dict: {}",
            unexpected.join(", ")
        )));
    }

    if !missing.is_empty() {
        log::warn!(
            "{} initializers not in state dict, keeping architecture values: {}",
            missing.len(),
            missing.join(", ")
        );
    }

    // Intermediate shape annotations describe the template head.
    graph.value_info.clear();

    Ok(())
}

/// The re-shaped head has no template values, so it has to come from the state dict.
fn check_head(
    params: &HashMap<String, TensorView>,
    config: &LoaderConfig,
) -> Result<(), TriageError> {
    for suffix in ["weight", "bias"] {
        let name = format!("{}.{}", config.head_prefix, suffix);
        let view = params.get(&name).ok_or_else(|| {
            TriageError::Load(format!(
                "state dict has no {name} for the classification head"
            ))
        })?;

        if view.shape().first() != Some(&config.num_classes) {
            return Err(TriageError::Load(format!(
                "{name} has shape {:?}, expected {} output classes",
                view.shape(),
                config.num_classes
            )));
        }
    }

    Ok(())
}

fn is_head(name: &str, config: &LoaderConfig) -> bool {
    name.strip_prefix(config.head_prefix.as_str())
        .map_or(false, |rest| rest.starts_with('.'))
}

fn strip_parallel_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

fn to_initializer(name: &str, view: &TensorView) -> Result<pb::TensorProto, TriageError> {
    if view.dtype() != Dtype::F32 {
        return Err(TriageError::Load(format!(
            "{name} has dtype {:?}, only F32 parameters are supported",
            view.dtype()
        )));
    }

    Ok(pb::TensorProto {
        name: name.to_owned(),
        dims: view.shape().iter().map(|d| *d as i64).collect(),
        data_type: pb::tensor_proto::DataType::Float as i32,
        raw_data: view.data().to_vec(),
        ..Default::default()
    })
}
