//! Known local models: static catalog of selectable model variants.
//!
//! Each entry carries the repository reference, quantization tag, the
//! weights artifact, and the extra end-of-sequence markers the generation
//! loop must honour. Ships with SmolLM and MobileLLM variants.
//!
//! Only SmolLM has a published GGUF. The MobileLLM repositories ship PyTorch
//! checkpoints, so their weights must be converted locally (llama.cpp's
//! `convert_hf_to_gguf.py`) and placed in the models directory under
//! `weights_file`.

use super::error::CatalogError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of one selectable model variant.
///
/// Discriminants index into `MODELS`; keep both in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelId {
    SmolLm135M4Bit,
    MobileLlm125M,
    MobileLlm350M,
    MobileLlm600M,
    MobileLlm1B,
}

impl ModelId {
    /// Every model, in picker order.
    pub const ALL: [ModelId; 5] = [
        ModelId::SmolLm135M4Bit,
        ModelId::MobileLlm125M,
        ModelId::MobileLlm350M,
        ModelId::MobileLlm600M,
        ModelId::MobileLlm1B,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SmolLm135M4Bit => "smollm-135m-4bit",
            Self::MobileLlm125M => "mobilellm-125m",
            Self::MobileLlm350M => "mobilellm-350m",
            Self::MobileLlm600M => "mobilellm-600m",
            Self::MobileLlm1B => "mobilellm-1b",
        }
    }

    pub fn configuration(self) -> &'static ModelConfiguration {
        &MODELS[self as usize]
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownModel(s.to_string()))
    }
}

impl Serialize for ModelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Weight precision of a published artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quantization {
    #[serde(rename = "q4")]
    Q4,
    #[serde(rename = "q4_k_m")]
    Q4KM,
    #[serde(rename = "q8_0")]
    Q8,
    #[serde(rename = "f16")]
    F16,
}

/// How role-tagged messages are turned into prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    /// `<|im_start|>role\n…<|im_end|>` turns, used by instruct-tuned SmolLM.
    ChatMl,
    /// Bare content, for base models without a chat format.
    Plain,
}

/// Where a model's GGUF weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightsSource {
    /// `weights_file` is published in `repo_id` and can be downloaded.
    Published,
    /// `repo_id` has no GGUF; `weights_file` must be converted locally.
    LocalConversion,
}

/// Download and runtime parameters for a model.
#[derive(Debug, Clone)]
pub struct ModelConfiguration {
    pub id: ModelId,
    pub name: &'static str,
    pub repo_id: &'static str,
    pub quantization: Option<Quantization>,
    pub weights_file: &'static str,
    pub weights_source: WeightsSource,
    pub size_bytes: u64,
    /// SHA-256 of `weights_file`, once recorded.
    pub sha256: Option<&'static str>,
    pub context_length: u32,
    pub chat_template: ChatTemplate,
    pub extra_eos_tokens: &'static [&'static str],
    pub description: &'static str,
}

impl ModelConfiguration {
    /// HuggingFace URL of the weights artifact, if one is published.
    pub fn download_url(&self) -> Option<String> {
        match self.weights_source {
            WeightsSource::Published => Some(format!(
                "https://huggingface.co/{}/resolve/main/{}",
                self.repo_id, self.weights_file
            )),
            WeightsSource::LocalConversion => None,
        }
    }
}

static MODELS: [ModelConfiguration; 5] = [
    ModelConfiguration {
        id: ModelId::SmolLm135M4Bit,
        name: "SmolLM 135M (4-bit)",
        repo_id: "bartowski/SmolLM2-135M-Instruct-GGUF",
        quantization: Some(Quantization::Q4KM),
        weights_file: "SmolLM2-135M-Instruct-Q4_K_M.gguf",
        weights_source: WeightsSource::Published,
        size_bytes: 105_000_000, // ~100 MB
        sha256: None,
        context_length: 2048,
        chat_template: ChatTemplate::ChatMl,
        extra_eos_tokens: &["<|im_end|>"],
        description: "Tiny instruct model. Downloads fast, runs anywhere.",
    },
    ModelConfiguration {
        id: ModelId::MobileLlm125M,
        name: "MobileLLM 125M",
        repo_id: "facebook/MobileLLM-125M",
        quantization: None,
        weights_file: "mobilellm-125m-f16.gguf",
        weights_source: WeightsSource::LocalConversion,
        size_bytes: 250_000_000,
        sha256: None,
        context_length: 2048,
        chat_template: ChatTemplate::Plain,
        extra_eos_tokens: &["</s>"],
        description: "Smallest MobileLLM base model.",
    },
    ModelConfiguration {
        id: ModelId::MobileLlm350M,
        name: "MobileLLM 350M",
        repo_id: "facebook/MobileLLM-350M",
        quantization: None,
        weights_file: "mobilellm-350m-f16.gguf",
        weights_source: WeightsSource::LocalConversion,
        size_bytes: 700_000_000,
        sha256: None,
        context_length: 2048,
        chat_template: ChatTemplate::Plain,
        extra_eos_tokens: &["</s>"],
        description: "MobileLLM base model, 350M parameters.",
    },
    ModelConfiguration {
        id: ModelId::MobileLlm600M,
        name: "MobileLLM 600M",
        repo_id: "facebook/MobileLLM-600M",
        quantization: None,
        weights_file: "mobilellm-600m-f16.gguf",
        weights_source: WeightsSource::LocalConversion,
        size_bytes: 1_200_000_000,
        sha256: None,
        context_length: 2048,
        chat_template: ChatTemplate::Plain,
        extra_eos_tokens: &["</s>"],
        description: "MobileLLM base model, 600M parameters.",
    },
    ModelConfiguration {
        id: ModelId::MobileLlm1B,
        name: "MobileLLM 1B",
        repo_id: "facebook/MobileLLM-1B",
        quantization: None,
        weights_file: "mobilellm-1b-f16.gguf",
        weights_source: WeightsSource::LocalConversion,
        size_bytes: 2_000_000_000, // ~1.9 GB
        sha256: None,
        context_length: 2048,
        chat_template: ChatTemplate::Plain,
        extra_eos_tokens: &["</s>"],
        description: "Largest MobileLLM variant. Needs ~3 GB free RAM.",
    },
];

/// Return all available models.
pub fn available_models() -> &'static [ModelConfiguration] {
    &MODELS
}

/// The model selected when the chat surface opens.
pub fn default_model() -> &'static ModelConfiguration {
    ModelId::SmolLm135M4Bit.configuration()
}

/// Look up a model by its string id.
pub fn find_model(id: &str) -> Option<&'static ModelConfiguration> {
    MODELS.iter().find(|m| m.id.as_str() == id)
}
