//! Thin wrapper around an ONNX Runtime session with a single image input.

use super::ModelError;
use anyhow::Result;
use ndarray::Array4;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Memory layout of a model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, height, width]`
    Nchw,
    /// `[1, height, width, 3]`
    Nhwc,
}

/// Location and tensor names of an ONNX model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub input: String,
    pub outputs: Vec<String>,
    #[serde(default = "ModelSpec::default_layout")]
    pub layout: TensorLayout,
}

impl ModelSpec {
    fn default_layout() -> TensorLayout {
        TensorLayout::Nchw
    }

    pub fn palm_default() -> Self {
        Self {
            path: PathBuf::from("models/palm_detection.onnx"),
            input: "input".to_string(),
            outputs: vec!["regressors".to_string(), "classificators".to_string()],
            layout: TensorLayout::Nchw,
        }
    }

    pub fn landmark_default() -> Self {
        Self {
            path: PathBuf::from("models/hand_landmark.onnx"),
            input: "input_1".to_string(),
            outputs: vec![
                "Identity".to_string(),
                "Identity_1".to_string(),
                "Identity_2".to_string(),
            ],
            layout: TensorLayout::Nchw,
        }
    }
}

/// Accelerators to try before falling back to the CPU, depending on platform and enabled features.
fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    #[cfg(feature = "rocm")]
    providers.push(ort::execution_providers::ROCmExecutionProvider::default().build());
    #[cfg(target_os = "macos")]
    providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
    #[cfg(target_os = "windows")]
    providers.push(ort::execution_providers::DirectMLExecutionProvider::default().build());
    debug!("Requested {} execution providers", providers.len());
    providers
}

/// A dense `f32` output tensor copied out of the session.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Checks that the tensor holds exactly `expected` elements.
    pub fn expect_len(&self, name: &str, expected: usize) -> Result<&[f32], ModelError> {
        if self.data.len() != expected {
            return Err(ModelError::UnexpectedShape {
                name: name.to_string(),
                expected,
                actual: self.shape.clone(),
            });
        }
        Ok(&self.data)
    }
}

pub struct OnnxModel {
    name: String,
    session: Session,
    spec: ModelSpec,
}

impl OnnxModel {
    /// Initialize the ONNX Runtime environment.
    /// This should be called once at startup.
    pub fn init() -> Result<()> {
        ort::init().with_name("handhold").commit();
        Ok(())
    }

    pub fn load(spec: &ModelSpec, intra_threads: usize) -> Result<Self> {
        if !spec.path.exists() {
            return Err(ModelError::NotFound(spec.path.clone()).into());
        }

        info!("Loading model from {:?}", spec.path);
        let session = Session::builder()?
            .with_execution_providers(execution_providers())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(&spec.path)?;

        let name = spec
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            session,
            spec: spec.clone(),
        })
    }

    pub fn layout(&self) -> TensorLayout {
        self.spec.layout
    }

    /// Runs the model and returns its outputs in the order listed in the [`ModelSpec`].
    pub fn run(&mut self, input: Array4<f32>) -> Result<Vec<Tensor>> {
        let shape = input.shape().iter().map(|&x| x as i64).collect::<Vec<_>>();
        let data = input.into_raw_vec();
        let input_value = Value::from_array((shape, data))?;
        let inputs = ort::inputs![self.spec.input.as_str() => &input_value];
        let outputs = self.session.run(inputs)?;

        let mut tensors = Vec::with_capacity(self.spec.outputs.len());
        for name in &self.spec.outputs {
            let Some(value) = outputs.get(name.as_str()) else {
                return Err(ModelError::MissingOutput {
                    model: self.name.clone(),
                    name: name.clone(),
                }
                .into());
            };
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            tensors.push(Tensor {
                shape: shape.iter().map(|&d| d as usize).collect(),
                data: data.to_vec(),
            });
        }
        debug!(
            "{} outputs: {:?}",
            self.name,
            tensors.iter().map(|t| &t.shape).collect::<Vec<_>>()
        );

        Ok(tensors)
    }
}
