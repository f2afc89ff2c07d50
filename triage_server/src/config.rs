//! Configuration of the model loader and the prediction policy.
//!
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::loader::ArtifactFormat;

/// What to answer when a prediction fails internally.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum FallbackPolicy {
    /// Log the failure and answer `unknown` with confidence 0.5.
    #[default]
    Lenient,
    /// Hand the failure to the caller.
    Strict,
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Weights artifact, either a safetensors state dict or a full ONNX model.
    pub weights_path: PathBuf,
    /// ONNX graph the state dict is loaded into.
    pub architecture_path: PathBuf,
    /// Directory relative paths are resolved against. Defaults to the directory of the
    /// running executable.
    pub model_dir: Option<PathBuf>,
    /// Skip format detection.
    pub artifact_format: Option<ArtifactFormat>,
    /// Parameter name prefix of the final classification layer.
    pub head_prefix: String,
    /// Prefix left on parameter names by distributed training wrappers.
    pub parallel_prefix: String,
    pub num_classes: usize,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("model.onnx"),
            architecture_path: PathBuf::from("efficientnet_b0.onnx"),
            model_dir: None,
            artifact_format: None,
            head_prefix: "classifier.1".into(),
            parallel_prefix: "module.".into(),
            num_classes: 2,
            input_width: 224,
            input_height: 224,
        }
    }
}

impl LoaderConfig {
    pub fn with_weights(weights_path: impl Into<PathBuf>) -> Self {
        Self {
            weights_path: weights_path.into(),
            ..Default::default()
        }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.resolve(&self.weights_path)
    }

    pub fn architecture_path(&self) -> PathBuf {
        self.resolve(&self.architecture_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }

        match self.model_dir.clone().or_else(executable_dir) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}

fn executable_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_model_dir() {
        let config = LoaderConfig {
            model_dir: Some(PathBuf::from("/opt/models")),
            ..LoaderConfig::with_weights("model.safetensors")
        };
        assert_eq!(
            config.weights_path(),
            PathBuf::from("/opt/models/model.safetensors")
        );
        assert_eq!(
            config.architecture_path(),
            PathBuf::from("/opt/models/efficientnet_b0.onnx")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let absolute = std::env::temp_dir().join("weights.onnx");
        let config = LoaderConfig {
            model_dir: Some(PathBuf::from("/opt/models")),
            ..LoaderConfig::with_weights(&absolute)
        };
        assert_eq!(config.weights_path(), absolute);
    }

    #[test]
    fn relative_paths_default_to_executable_dir() {
        let config = LoaderConfig::default();
        let exe_dir = executable_dir().unwrap();
        assert_eq!(config.weights_path(), exe_dir.join("model.onnx"));
    }
}
