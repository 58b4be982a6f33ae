use serde::{Deserialize, Serialize};

/// One prediction for one frame. The payload is opaque to the streaming
/// pipeline; only the optional confidence is ever inspected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Whether the label survives a confidence threshold. Labels without a
    /// confidence are always kept.
    pub fn passes(&self, confidence_thresh: Option<f64>) -> bool {
        match (confidence_thresh, self.confidence) {
            (Some(thresh), Some(confidence)) => confidence >= thresh,
            _ => true,
        }
    }
}
