//! Temperature-scaled probabilities.
//!
//! The temperature is fit offline and shipped with the artifact; at runtime it
//! is a constant. Every logit is divided by it before sigmoid or softmax.

use std::collections::BTreeMap;

use crate::utils::math::{sigmoid, softmax};

/// Whether `t` is usable as a calibration temperature.
pub fn valid_temperature(t: f32) -> bool {
    t.is_finite() && t > 0.0
}

/// Independent per-source probability: `sigmoid(logit / T)`.
pub fn calibrated_sigmoid(logit: f32, temperature: f32) -> f32 {
    sigmoid(logit / temperature)
}

/// Calibrated distribution over labels, in label order.
pub fn calibrated_softmax(logits: &BTreeMap<String, f32>, temperature: f32) -> Vec<(String, f32)> {
    let scaled: Vec<f32> = logits.values().map(|l| l / temperature).collect();
    logits.keys().cloned().zip(softmax(&scaled)).collect()
}

/// Most probable label and its calibrated probability. Equal probabilities
/// resolve to the lexicographically first label.
pub fn calibrated_argmax(logits: &BTreeMap<String, f32>, temperature: f32) -> Option<(String, f32)> {
    calibrated_softmax(logits, temperature)
        .into_iter()
        .fold(None, |best, (label, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((label, p)),
        })
}
