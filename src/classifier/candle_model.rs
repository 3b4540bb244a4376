//! On-disk classifier artifact: BERT encoder plus linear heads.
//!
//! Directory layout:
//! - `config.json`, `tokenizer.json`, `model.safetensors`: the encoder
//! - `heads.safetensors`: `source.weight`/`source.bias` and
//!   `intent.<source>.weight`/`intent.<source>.bias`
//! - `labels.json`: version, source order, intent labels per source, temperature

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{anyhow, Context};
use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::calibration::valid_temperature;
use crate::classifier::ClassifierModel;
use crate::embedding::candle_backend::{select_device, BertEncoder, ModelFiles};
use crate::models::Source;
use crate::LorekeepError;

/// Contents of `labels.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLabels {
    pub version: String,
    /// Row order of the source head.
    pub sources: Vec<Source>,
    /// Row order of each intent head.
    pub intents: BTreeMap<Source, Vec<String>>,
    pub temperature: f32,
}

impl ArtifactLabels {
    pub fn load(path: &Path) -> Result<Self, LorekeepError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LorekeepError::ClassifierUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let labels: ArtifactLabels = serde_json::from_str(&contents).map_err(|e| {
            LorekeepError::ClassifierUnavailable(format!("{}: {}", path.display(), e))
        })?;
        if !valid_temperature(labels.temperature) {
            return Err(LorekeepError::ClassifierUnavailable(format!(
                "Invalid calibration temperature {}",
                labels.temperature
            )));
        }
        Ok(labels)
    }
}

/// Linear heads over the pooled sentence vector.
pub struct ClassifierHeads {
    source: Linear,
    intents: BTreeMap<Source, Linear>,
}

fn linear(
    tensors: &HashMap<String, Tensor>,
    prefix: &str,
    rows: usize,
    hidden: usize,
) -> anyhow::Result<Linear> {
    let weight = tensors
        .get(&format!("{prefix}.weight"))
        .with_context(|| format!("heads.safetensors missing {prefix}.weight"))?
        .clone();
    let bias = tensors
        .get(&format!("{prefix}.bias"))
        .with_context(|| format!("heads.safetensors missing {prefix}.bias"))?
        .clone();
    if weight.dims() != [rows, hidden] {
        return Err(anyhow!(
            "{prefix}.weight has shape {:?}, expected [{rows}, {hidden}]",
            weight.dims()
        ));
    }
    if bias.dims() != [rows] {
        return Err(anyhow!(
            "{prefix}.bias has shape {:?}, expected [{rows}]",
            bias.dims()
        ));
    }
    Ok(Linear::new(weight, Some(bias)))
}

impl ClassifierHeads {
    pub fn load(
        path: &Path,
        labels: &ArtifactLabels,
        hidden: usize,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let tensors = candle_core::safetensors::load(path, device)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source = linear(&tensors, "source", labels.sources.len(), hidden)?;
        let mut intents = BTreeMap::new();
        for source_id in &labels.sources {
            let rows = labels
                .intents
                .get(source_id)
                .map(Vec::len)
                .with_context(|| format!("labels.json has no intents for {source_id}"))?;
            let head = linear(&tensors, &format!("intent.{}", source_id.as_str()), rows, hidden)?;
            intents.insert(*source_id, head);
        }
        Ok(Self { source, intents })
    }

    /// Source logits for a `[1, hidden]` pooled vector.
    pub fn source_logits(&self, pooled: &Tensor) -> anyhow::Result<Vec<f32>> {
        Ok(self.source.forward(pooled)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    pub fn intent_logits(&self, pooled: &Tensor, source: Source) -> anyhow::Result<Vec<f32>> {
        let head = self
            .intents
            .get(&source)
            .with_context(|| format!("No intent head for {source}"))?;
        Ok(head.forward(pooled)?.squeeze(0)?.to_vec1::<f32>()?)
    }
}

/// Recently pooled query vectors. A gated prediction asks for source logits
/// and then intent logits per passing source; all of them share one encode.
struct PooledCache {
    cache: Cache<String, Tensor>,
}

impl PooledCache {
    const CAPACITY: u64 = 64;

    fn new() -> Self {
        Self {
            cache: Cache::new(Self::CAPACITY),
        }
    }

    fn get_or_encode(
        &self,
        text: &str,
        encode: impl FnOnce(&str) -> anyhow::Result<Tensor>,
    ) -> anyhow::Result<Tensor> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let pooled = encode(text)?;
        self.cache.insert(text.to_string(), pooled.clone());
        Ok(pooled)
    }
}

/// A trained classifier loaded from disk. Read-only after load.
pub struct CandleClassifierArtifact {
    encoder: BertEncoder,
    heads: ClassifierHeads,
    labels: ArtifactLabels,
    pooled: PooledCache,
}

impl CandleClassifierArtifact {
    /// Load an artifact directory. Blocking; call from `spawn_blocking`.
    ///
    /// Any missing or corrupt file yields `ClassifierUnavailable`.
    pub fn load(dir: &Path) -> Result<Self, LorekeepError> {
        let unavailable = |e: anyhow::Error| LorekeepError::ClassifierUnavailable(format!("{:#}", e));

        let files = ModelFiles::in_dir(dir);
        if let Some(missing) = files.missing() {
            return Err(LorekeepError::ClassifierUnavailable(format!(
                "Missing artifact file {}",
                missing.display()
            )));
        }
        let labels = ArtifactLabels::load(&dir.join("labels.json"))?;
        let device = select_device();
        let encoder = BertEncoder::new(&files, device.clone()).map_err(unavailable)?;
        let heads = ClassifierHeads::load(
            &dir.join("heads.safetensors"),
            &labels,
            encoder.hidden_size(),
            &device,
        )
        .map_err(unavailable)?;

        info!(
            version = %labels.version,
            temperature = labels.temperature,
            "Loaded classifier artifact from {}",
            dir.display()
        );
        Ok(Self {
            encoder,
            heads,
            labels,
            pooled: PooledCache::new(),
        })
    }

    pub fn labels(&self) -> &ArtifactLabels {
        &self.labels
    }

    fn pooled(&self, text: &str) -> anyhow::Result<Tensor> {
        self.pooled
            .get_or_encode(text, |t| self.encoder.encode(&[t.to_string()]))
    }
}

fn inference_error(e: anyhow::Error) -> LorekeepError {
    LorekeepError::ClassifierUnavailable(format!("Inference failed: {:#}", e))
}

impl ClassifierModel for CandleClassifierArtifact {
    fn version(&self) -> &str {
        &self.labels.version
    }

    fn source_logits(&self, text: &str) -> Result<BTreeMap<Source, f32>, LorekeepError> {
        let pooled = self.pooled(text).map_err(inference_error)?;
        let logits = self.heads.source_logits(&pooled).map_err(inference_error)?;
        Ok(self.labels.sources.iter().copied().zip(logits).collect())
    }

    fn intent_logits(
        &self,
        text: &str,
        source: Source,
    ) -> Result<BTreeMap<String, f32>, LorekeepError> {
        let labels = self.labels.intents.get(&source).ok_or_else(|| {
            LorekeepError::ClassifierUnavailable(format!("No intent labels for {}", source))
        })?;
        let pooled = self.pooled(text).map_err(inference_error)?;
        let logits = self
            .heads
            .intent_logits(&pooled, source)
            .map_err(inference_error)?;
        Ok(labels.iter().cloned().zip(logits).collect())
    }

    fn temperature(&self) -> f32 {
        self.labels.temperature
    }
}
