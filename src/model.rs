use std::{collections::BTreeMap, fs, path::Path};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use thiserror::Error;

pub const UNKNOWN_CLASS: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid class indices: {0}")]
    ClassIndices(String),
    #[error("cannot identify image file: {0}")]
    Image(#[from] image::ImageError),
    #[error("tensorflow: {0}")]
    Tensorflow(#[from] tensorflow::Status),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("expected {expected} input values, got {actual}")]
    InputShape { expected: usize, actual: usize },
    #[error("model returned no scores")]
    EmptyOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    /// Percentage in `[0, 100]`.
    pub probability: f32,
}

/// Index → class name table, read from the `{"name": index}` JSON written at training time.
#[derive(Debug, Clone, Default)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let indices: BTreeMap<String, i64> =
            serde_json::from_str(raw).map_err(|e| ModelError::ClassIndices(e.to_string()))?;

        let mut slots: Vec<Option<String>> = vec![None; indices.len()];
        for (name, index) in indices {
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .ok_or_else(|| {
                    ModelError::ClassIndices(format!("index {} of '{}' is out of range", index, name))
                })?;
            if let Some(existing) = slot {
                return Err(ModelError::ClassIndices(format!(
                    "index {} is shared by '{}' and '{}'",
                    index, existing, name
                )));
            }
            *slot = Some(name);
        }

        // Every slot is filled: n distinct indices in 0..n.
        Ok(ClassLabels {
            labels: slots.into_iter().flatten().collect(),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Decodes an uploaded image into a flattened `size x size x 3` tensor scaled to `[0, 1]`.
pub fn preprocess(image_data: &[u8], size: u32) -> Result<Vec<f32>, ModelError> {
    let img = image::load_from_memory(image_data)?;
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    Ok(resized
        .as_raw()
        .iter()
        .map(|&channel| channel as f32 / 255.0)
        .collect())
}

/// Runs the external network on one preprocessed image and returns a score per class.
pub trait Classifier: Send + Sync {
    fn classify(&self, input: &[f32], size: u32) -> Result<Vec<f32>, ModelError>;
}

/// Frozen TensorFlow graph with a single image input and a softmax output.
pub struct TfClassifier {
    graph: Graph,
    session: Session,
    input_op: String,
    output_op: String,
}

impl TfClassifier {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_op: &str,
        output_op: &str,
    ) -> Result<Self, ModelError> {
        let model_bytes = fs::read(model_path)?;

        let mut graph = Graph::new();
        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        for name in [input_op, output_op] {
            graph
                .operation_by_name(name)
                .map_err(tensorflow::Status::from)?
                .ok_or_else(|| ModelError::MissingOperation(name.to_string()))?;
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(TfClassifier {
            graph,
            session,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }
}

impl Classifier for TfClassifier {
    fn classify(&self, input: &[f32], size: u32) -> Result<Vec<f32>, ModelError> {
        let side = u64::from(size);
        let input_tensor = Tensor::<f32>::new(&[1, side, side, 3]).with_values(input)?;

        let input_operation = self
            .graph
            .operation_by_name(&self.input_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| ModelError::MissingOperation(self.input_op.clone()))?;
        let output_operation = self
            .graph
            .operation_by_name(&self.output_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| ModelError::MissingOperation(self.output_op.clone()))?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        Ok(output_tensor.to_vec())
    }
}

pub struct Model {
    classifier: Box<dyn Classifier>,
    labels: ClassLabels,
    image_size: u32,
}

impl Model {
    pub fn new(classifier: Box<dyn Classifier>, labels: ClassLabels, image_size: u32) -> Self {
        Model {
            classifier,
            labels,
            image_size,
        }
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Runs a blank image through the network and checks the output width against the labels.
    pub fn warm_up(&self) -> Result<usize, ModelError> {
        let side = self.image_size as usize;
        let blank = vec![0.0; side * side * 3];
        let scores = self.classifier.classify(&blank, self.image_size)?;

        tracing::info!(
            input_size = self.image_size,
            outputs = scores.len(),
            classes = self.labels.len(),
            "Model warm-up finished"
        );
        if scores.len() != self.labels.len() {
            tracing::warn!(
                "Model produces {} scores but {} class labels are loaded",
                scores.len(),
                self.labels.len()
            );
        }
        Ok(scores.len())
    }

    /// Classifies a raw image and returns every class ranked by probability.
    pub fn predict(&self, image_data: &[u8]) -> Result<Vec<Prediction>, ModelError> {
        let input = preprocess(image_data, self.image_size)?;
        self.predict_tensor(&input)
    }

    pub fn predict_tensor(&self, input: &[f32]) -> Result<Vec<Prediction>, ModelError> {
        let side = self.image_size as usize;
        let expected = side * side * 3;
        if input.len() != expected {
            return Err(ModelError::InputShape {
                expected,
                actual: input.len(),
            });
        }

        let scores = self.classifier.classify(input, self.image_size)?;
        if scores.is_empty() {
            return Err(ModelError::EmptyOutput);
        }

        let mut predictions: Vec<Prediction> = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| Prediction {
                class: self.labels.label(i).unwrap_or(UNKNOWN_CLASS).to_string(),
                probability: score * 100.0,
            })
            .collect();

        // Stable sort: equal scores keep index order, so the head is the argmax.
        predictions.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(predictions)
    }
}
