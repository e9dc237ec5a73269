use std::path::Path;
use std::sync::Arc;

use tract_onnx::prelude::*;

use crate::error::BotError;
use crate::indicators::{calculate_rsi, calculate_sma};
use crate::models::Signal;

use super::SignalConfig;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Pretrained classifier over the indicator vector `[MA_short, MA_long, RSI]`.
///
/// The ONNX graph is loaded once at startup. When the file is missing or
/// unreadable the classifier stays disabled for the whole session and every
/// evaluation votes Hold; one vote degrades, the rest of the pipeline keeps
/// running.
#[derive(Clone)]
pub struct AiClassifier {
    model: Option<Arc<RunnableModel>>,
}

impl AiClassifier {
    pub fn load(model_path: &str) -> Self {
        let path = Path::new(model_path);
        let model = if path.exists() {
            match Self::load_model(model_path) {
                Ok(plan) => {
                    tracing::info!("✓ Loaded classifier from {}", model_path);
                    Some(Arc::new(plan))
                }
                Err(e) => {
                    tracing::warn!(
                        "✗ Failed to load classifier from {}: {}. AI voting disabled for this session.",
                        model_path,
                        e
                    );
                    None
                }
            }
        } else {
            tracing::warn!(
                "✗ Classifier not found at {}. AI voting disabled for this session.",
                model_path
            );
            None
        };

        Self { model }
    }

    /// A classifier that always abstains
    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn load_model(path: &str) -> TractResult<RunnableModel> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .into_optimized()?
            .into_runnable()
    }

    /// Vote for the given close series. Any failure (disabled model, short
    /// history, inference error) degrades to Hold.
    pub fn signal(&self, closes: &[f64], config: &SignalConfig) -> Signal {
        if self.model.is_none() {
            return Signal::Hold;
        }

        let Some(features) = build_features(closes, config) else {
            tracing::debug!(
                "classifier: {} closes is too short for features, voting Hold",
                closes.len()
            );
            return Signal::Hold;
        };

        match self.predict(&features) {
            Ok(score) => {
                if score >= 0.5 {
                    Signal::Buy
                } else {
                    Signal::Sell
                }
            }
            Err(e) => {
                tracing::warn!("classifier prediction failed, voting Hold: {}", e);
                Signal::Hold
            }
        }
    }

    /// Raw class score in [0, 1] for an up move
    fn predict(&self, features: &[f32]) -> Result<f32, BotError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BotError::model("classifier not loaded"))?;

        let tensor =
            tract_ndarray::Array::from_shape_vec((1, features.len()), features.to_vec())
                .map_err(|e| BotError::model(format!("bad feature shape: {e}")))?
                .into_tensor();

        let outputs = model
            .run(tvec!(tensor.into()))
            .map_err(|e| BotError::model(format!("inference failed: {e}")))?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| BotError::model(format!("unexpected output tensor: {e}")))?;

        view.iter()
            .next()
            .copied()
            .ok_or_else(|| BotError::model("empty model output"))
    }
}

/// Indicator vector fed to the classifier: short MA, long MA, RSI
fn build_features(closes: &[f64], config: &SignalConfig) -> Option<Vec<f32>> {
    let ma_short = calculate_sma(closes, config.short_ma_period)?;
    let ma_long = calculate_sma(closes, config.long_ma_period)?;
    let rsi = calculate_rsi(closes, config.rsi_period)?;

    Some(vec![ma_short as f32, ma_long as f32, rsi as f32])
}
