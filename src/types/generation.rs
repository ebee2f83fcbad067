//! Generation configuration and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings controlling generation, carried on every `LlmRequest`.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerateContentConfig {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    /// Assembled system instruction text.
    pub system_instruction: Option<String>,
    /// Declared tools, in declaration order.
    #[builder(default)]
    #[serde(default)]
    pub tools: Vec<FunctionDeclaration>,
    pub response_mime_type: Option<String>,
    pub response_schema: Option<serde_json::Value>,
}

/// Schema description of a callable tool, as sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    MalformedFunctionCall,
    Other,
}

/// How the model boundary should deliver output.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StreamingMode {
    /// One complete response per model call.
    #[default]
    None,
    /// Partial responses followed by one aggregated final response.
    Sse,
    /// Bidirectional live session.
    Bidi,
}
