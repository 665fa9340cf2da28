use serde::Serialize;

/// Outcome of a finished interview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub weights: Vec<f64>,
    pub final_score: f64,
    pub average_score: f64,
    pub narrative: String,
}

pub fn uniform_weights(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    vec![1.0 / count as f64; count]
}

/// `Σ score_i * weight_i`, folded left to right. Extra entries on either side are ignored.
pub fn weighted_score(scores: &[u8], weights: &[f64]) -> f64 {
    scores
        .iter()
        .zip(weights)
        .fold(0.0, |acc, (score, weight)| acc + f64::from(*score) * weight)
}

pub fn average_score(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64
}
