//! Turns ranked model output into the response the client shows: a readable
//! disease name, a rounded confidence and the matching advice.

use serde::Serialize;

use crate::model::Prediction;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 60.0;
const TOP_PREDICTIONS: usize = 3;

const LOW_CONFIDENCE_SUGGESTION: &str = "The AI is not very confident about this prediction. Please try:\n\
• Take a clearer photo with good lighting\n\
• Ensure the entire leaf/plant is visible\n\
• Upload multiple angles\n\
• Consult with agricultural expert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advice {
    pub treatment: &'static str,
    pub prevention: &'static str,
    pub organic: &'static str,
}

const GENERIC_ADVICE: Advice = Advice {
    treatment: "Consult local agricultural expert for specific recommendations.",
    prevention: "Practice crop rotation and maintain plant health.",
    organic: "Use integrated pest management approaches.",
};

/// Static advice keyed by the raw class name the model was trained with.
pub fn advice_for(class: &str) -> Advice {
    match class {
        "Potato_Early_blight" => Advice {
            treatment: "Apply Chlorothalonil (Bravo) or Mancozeb fungicides every 7-10 days.",
            prevention: "Remove infected leaves, improve air circulation, avoid overhead watering.",
            organic: "Use copper-based fungicides and practice crop rotation.",
        },
        "Potato_healthy" => Advice {
            treatment: "No treatment needed! Your plant is healthy.",
            prevention: "Continue current practices. Monitor regularly for early signs.",
            organic: "Maintain organic practices with proper spacing and soil health.",
        },
        "Potato_Late_blight" => Advice {
            treatment: "Apply metalaxyl-based fungicides. Destroy severely infected plants.",
            prevention: "Use certified disease-free seed potatoes. Avoid planting in wet areas.",
            organic: "Apply copper sprays preventatively and ensure good drainage.",
        },
        "Tomato_Bacterial_spot" => Advice {
            treatment: "Apply copper-based bactericides early in the morning.",
            prevention: "Use disease-free seeds, avoid working with wet plants.",
            organic: "Copper sprays and resistant varieties work best.",
        },
        "Tomato_Early_blight" => Advice {
            treatment: "Apply Chlorothalonil or Mancozeb fungicides weekly.",
            prevention: "Remove lower leaves, practice 3-year crop rotation.",
            organic: "Use copper fungicides and improve plant spacing.",
        },
        "Tomato_healthy" => Advice {
            treatment: "No treatment needed! Your tomato plant is thriving.",
            prevention: "Maintain consistent watering and proper fertilization.",
            organic: "Continue organic practices with regular monitoring.",
        },
        "Tomato_Late_blight" => Advice {
            treatment: "Apply fungicides containing chlorothalonil or mancozeb immediately.",
            prevention: "Destroy infected plants, avoid overhead irrigation.",
            organic: "Use copper-based products and resistant varieties.",
        },
        _ => GENERIC_ADVICE,
    }
}

pub fn display_name(class: &str) -> String {
    class.replace('_', " ")
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPrediction {
    pub disease: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub disease: String,
    pub confidence: f32,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_predictions: Option<Vec<TopPrediction>>,
}

impl Diagnosis {
    fn bare(disease: &str, suggestion: String) -> Self {
        Diagnosis {
            disease: disease.to_string(),
            confidence: 0.0,
            suggestion,
            prevention: None,
            organic: None,
            warning: None,
            top_predictions: None,
        }
    }

    pub fn model_unavailable() -> Self {
        Self::bare("Model Error", "AI model not loaded properly.".to_string())
    }

    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::bare("Error", format!("Prediction failed: {}", reason))
    }
}

/// Builds the client-facing diagnosis from predictions ranked best-first.
pub fn diagnose(predictions: &[Prediction], threshold: f32) -> Diagnosis {
    let Some(best) = predictions.first() else {
        return Diagnosis::failed("model returned no scores");
    };

    let confidence = round2(best.probability);
    let top_predictions = predictions
        .iter()
        .take(TOP_PREDICTIONS)
        .map(|p| TopPrediction {
            disease: display_name(&p.class),
            confidence: round2(p.probability),
        })
        .collect();

    if best.probability < threshold {
        return Diagnosis {
            disease: "Uncertain - Low Confidence".to_string(),
            confidence,
            suggestion: LOW_CONFIDENCE_SUGGESTION.to_string(),
            prevention: None,
            organic: None,
            warning: Some("low_confidence".to_string()),
            top_predictions: Some(top_predictions),
        };
    }

    let advice = advice_for(&best.class);
    Diagnosis {
        disease: display_name(&best.class),
        confidence,
        suggestion: advice.treatment.to_string(),
        prevention: Some(advice.prevention.to_string()),
        organic: Some(advice.organic.to_string()),
        warning: None,
        top_predictions: Some(top_predictions),
    }
}
