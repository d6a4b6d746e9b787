//! Domain tier: `ProsusAI/finbert` served by the Hugging Face inference API.
//!
//! Loading fetches the model descriptor (`config.json`, for its label map)
//! once, preferring the copy in the injected cache directory and writing it
//! there after a download. Per-article inference failures are returned as
//! errors so the engine can fall through to the next tier.

use super::HUGGINGFACE;
use crate::config::ProviderConfig;
use crate::providers::http_client::HttpClient;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MODEL_ID: &str = "ProsusAI/finbert";

/// Inputs longer than this are truncated (character count).
const MAX_INPUT_CHARS: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelDescriptor {
    id2label: BTreeMap<String, String>,
}

impl ModelDescriptor {
    fn validate(&self) -> Result<()> {
        let labels: Vec<String> = self.id2label.values().map(|l| l.to_lowercase()).collect();
        for required in ["positive", "negative"] {
            if !labels.iter().any(|l| l == required) {
                bail!("model descriptor has no {:?} label", required);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// The inference API nests results one level deeper for batched inputs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

pub struct FinbertTier {
    client: HttpClient,
    endpoint: String,
    api_key: String,
    /// `LABEL_n` → lowercase label name.
    labels: BTreeMap<String, String>,
}

impl FinbertTier {
    /// One-time initialisation. Any failure means the tier is unavailable
    /// for this process.
    pub async fn load(
        providers: &ProviderConfig,
        cache_dir: &Path,
        api_key: &str,
    ) -> Result<Self> {
        let client = HttpClient::new(providers)?;
        let descriptor = load_descriptor(&client, &providers.hub_url, cache_dir).await?;
        descriptor.validate()?;

        let labels = descriptor
            .id2label
            .iter()
            .map(|(id, name)| (format!("LABEL_{id}"), name.to_lowercase()))
            .collect();

        info!("FinBERT tier ready ({})", MODEL_ID);
        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}",
                providers.inference_url.trim_end_matches('/'),
                MODEL_ID
            ),
            api_key: api_key.to_string(),
            labels,
        })
    }

    /// P(positive) − P(negative).
    pub async fn score(&self, text: &str) -> Result<f64> {
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let body = serde_json::json!({ "inputs": input });

        let resp: InferenceResponse = self
            .client
            .post_json(HUGGINGFACE, &self.endpoint, &self.api_key, &body)
            .await?;

        let scores = match resp {
            InferenceResponse::Nested(mut outer) if !outer.is_empty() => outer.swap_remove(0),
            InferenceResponse::Nested(_) => bail!("empty inference response"),
            InferenceResponse::Flat(scores) => scores,
        };

        let mut positive = None;
        let mut negative = None;
        for s in &scores {
            let raw = s.label.to_lowercase();
            let name = self.labels.get(&s.label).cloned().unwrap_or(raw);
            match name.as_str() {
                "positive" => positive = Some(s.score),
                "negative" => negative = Some(s.score),
                _ => {}
            }
        }

        match (positive, negative) {
            (Some(p), Some(n)) => Ok(p - n),
            _ => bail!("inference response lacks positive/negative scores"),
        }
    }
}

fn descriptor_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MODEL_ID.replace('/', "--")).join("config.json")
}

async fn load_descriptor(client: &HttpClient, hub_url: &str, cache_dir: &Path) -> Result<ModelDescriptor> {
    let path = descriptor_path(cache_dir);

    match std::fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str::<ModelDescriptor>(&text) {
            Ok(descriptor) => {
                debug!("Using cached model descriptor {:?}", path);
                return Ok(descriptor);
            }
            Err(e) => warn!("Ignoring unreadable model descriptor {:?}: {}", path, e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not read {:?}: {}", path, e),
    }

    let url = format!(
        "{}/{}/resolve/main/config.json",
        hub_url.trim_end_matches('/'),
        MODEL_ID
    );
    info!("Downloading model descriptor from {}", url);
    let descriptor: ModelDescriptor = client
        .get_json(HUGGINGFACE, &url, &[])
        .await
        .context("model descriptor download failed")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&descriptor)?)
        .with_context(|| format!("Could not write {:?}", path))?;

    Ok(descriptor)
}
