//! Candle inference backend shared by the embedding service and the
//! classifier artifact.
//!
//! Pure-Rust ML runtime with Metal GPU acceleration on macOS.
//! [`BertEncoder`] produces mean-pooled, L2-normalized sentence vectors
//! (BGE-small/base/large compatible); the classifier heads sit on top of it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};

/// Paths to BERT model files (downloaded or shipped in an artifact directory).
pub struct ModelFiles {
    pub config_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub weights_path: PathBuf,
}

impl ModelFiles {
    /// Model files laid out flat in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILE),
            tokenizer_path: dir.join(TOKENIZER_FILE),
            weights_path: dir.join(WEIGHTS_FILE),
        }
    }

    /// First missing file, if any.
    pub fn missing(&self) -> Option<&Path> {
        [&self.config_path, &self.tokenizer_path, &self.weights_path]
            .into_iter()
            .find(|p| !p.exists())
            .map(PathBuf::as_path)
    }
}

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Fetch a BERT checkpoint from the HuggingFace Hub (cached under
/// `~/.cache/huggingface/hub/`).
///
/// Blocking; run it on `spawn_blocking`.
pub fn download_model(repo_id: &str) -> Result<ModelFiles> {
    let api = hf_hub::api::sync::Api::new().context("HuggingFace Hub API unavailable")?;
    let repo = api.model(repo_id.to_string());
    let fetch = |name: &str| {
        repo.get(name)
            .with_context(|| format!("Failed to fetch {name} from {repo_id}"))
    };

    Ok(ModelFiles {
        config_path: fetch(CONFIG_FILE)?,
        tokenizer_path: fetch(TOKENIZER_FILE)?,
        weights_path: fetch(WEIGHTS_FILE)?,
    })
}

/// Pick a GPU when one is compiled in and can run layer-norm, else the CPU.
pub fn select_device() -> Device {
    for (name, device) in gpu_candidates() {
        if supports_layer_norm(&device) {
            tracing::info!(device = name, "Running inference on GPU");
            return device;
        }
        tracing::warn!(device = name, "GPU lacks layer-norm support; skipping");
    }
    tracing::info!("Running inference on CPU");
    Device::Cpu
}

#[allow(unused_mut)]
fn gpu_candidates() -> Vec<(&'static str, Device)> {
    let mut found = Vec::new();
    #[cfg(target_os = "macos")]
    {
        if let Ok(device) = Device::new_metal(0) {
            found.push(("metal", device));
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            found.push(("cuda", device));
        }
    }
    found
}

fn supports_layer_norm(device: &Device) -> bool {
    let probe = || -> candle_core::Result<Tensor> {
        let norm = LayerNorm::new(
            Tensor::ones(4, DType::F32, device)?,
            Tensor::zeros(4, DType::F32, device)?,
            1e-5,
        );
        norm.forward(&Tensor::randn(0f32, 1.0, (1, 4), device)?)
    };
    probe().is_ok()
}

/// Average token states over the attention mask, then scale each row to
/// unit length. `hidden` is `[batch, seq, dim]`, `mask` is `[batch, seq]`.
fn mean_pool_normalized(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let pooled = hidden
        .broadcast_mul(&mask)?
        .sum(1)?
        .broadcast_div(&mask.sum(1)?)?;
    let lengths = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
    pooled.broadcast_div(&lengths)
}

/// BERT sentence encoder.
pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl BertEncoder {
    /// Load a BERT model from its files.
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let raw = std::fs::read_to_string(&files.config_path)
            .with_context(|| format!("Cannot read {}", files.config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw).context("Invalid BERT config")?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw)?["hidden_size"]
            .as_u64()
            .context("BERT config has no hidden_size")? as usize;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        // SAFETY: the weights are memory-mapped and must not change on disk
        // while the encoder is alive.
        let weights = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, &device)
                .context("Cannot map BERT weights")?
        };
        let model = BertModel::load(weights, &config).context("Cannot build BERT model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
            hidden_size,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Mean-pooled, L2-normalized sentence vectors as a `[batch, hidden]` tensor.
    pub fn encode(&self, texts: &[String]) -> Result<Tensor> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let rows = encodings.len();
        let width = encodings.first().map_or(0, |e| e.get_ids().len());

        // Padding is BatchLongest, so every encoding has `width` tokens.
        let stack = |field: fn(&tokenizers::Encoding) -> &[u32]| {
            let flat: Vec<u32> = encodings.iter().flat_map(|e| field(e).to_vec()).collect();
            Tensor::from_vec(flat, (rows, width), &self.device)
        };
        let ids = stack(tokenizers::Encoding::get_ids)?;
        let types = stack(tokenizers::Encoding::get_type_ids)?;
        let mask = stack(tokenizers::Encoding::get_attention_mask)?;

        let hidden = self.model.forward(&ids, &types, Some(&mask))?;
        Ok(mean_pool_normalized(&hidden, &mask)?)
    }

    /// Sentence embeddings, one vector per input text.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.encode(texts)?
            .to_vec2::<f32>()
            .context("Cannot read embeddings back from device")
    }
}
