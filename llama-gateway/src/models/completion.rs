use crate::services::GenerationParams;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_max_tokens() -> i32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.9
}

impl CompletionRequest {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
}

impl FinishReason {
    /// `Length` once the text has at least `max_tokens` words.
    ///
    /// Words stand in for tokens; the backend does not report its own count.
    /// A negative `max_tokens` (no limit) always yields `Length`.
    pub fn classify(text: &str, max_tokens: i32) -> Self {
        if word_count(text) as i64 >= i64::from(max_tokens) {
            FinishReason::Length
        } else {
            FinishReason::Stop
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub text: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn from_texts(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = word_count(prompt);
        let completion_tokens = word_count(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Body of a `POST /v1/completions` response.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn new(prompt: &str, text: String, max_tokens: i32) -> Self {
        let finish_reason = FinishReason::classify(&text, max_tokens);
        let usage = Usage::from_texts(prompt, &text);
        Self {
            choices: vec![Choice {
                text,
                finish_reason,
            }],
            usage,
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
