// src/synthesis/extractor.rs
//! Conversation -> extracted facts, summary, contradictions (spec §4.8).
//! The LLM is an opaque text->JSON collaborator (spec §1); this module only
//! owns parsing, filtering, capping, and the retry/backoff policy around it.

use async_trait::async_trait;
use tracing::warn;

use crate::episodic::{Conversation, Message};
use crate::semantic::{MemoryCategory, SemanticMemory};

use super::types::*;

#[async_trait]
pub trait ExtractorProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Production collaborator: a chat-completion HTTP endpoint, prompted to
/// answer with the strict JSON object the extractor's `parse_and_filter`
/// expects (spec §1/§4.8 — the LLM itself is out of scope for this crate).
pub struct HttpExtractorProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl HttpExtractorProvider {
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
        }
    }
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl ExtractorProvider for HttpExtractorProvider {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&serde_json::json!({
                "model": self.model,
                "response_format": { "type": "json_object" },
                "messages": [{ "role": "user", "content": prompt }],
            }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?.error_for_status()?;
        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("extractor returned no choices"))?;
        Ok(content)
    }
}

pub struct LlmExtractor {
    provider: std::sync::Arc<dyn ExtractorProvider>,
    pub min_confidence: f32,
    pub max_facts: usize,
}

impl LlmExtractor {
    pub fn new(provider: std::sync::Arc<dyn ExtractorProvider>) -> Self {
        Self {
            provider,
            min_confidence: 0.6,
            max_facts: 20,
        }
    }

    /// Up to 3 attempts with exponential backoff on network/5xx; on final
    /// failure, returns an empty result — never surfaces the exception
    /// (spec §4.8).
    pub async fn extract(
        &self,
        conversation: &Conversation,
        messages: &[Message],
        existing: &[SemanticMemory],
    ) -> ExtractionResult {
        let prompt = build_prompt(conversation, messages, existing);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.complete(&prompt).await {
                Ok(raw) => return self.parse_and_filter(&raw),
                Err(err) => {
                    warn!(attempt, %err, "extractor call failed");
                    if attempt >= 3 {
                        return ExtractionResult::default();
                    }
                    let delay = std::time::Duration::from_secs(2u64.pow(attempt));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Facts must parse from a strict JSON array; non-conforming output
    /// yields an empty array, never a crash (spec §4.8).
    fn parse_and_filter(&self, raw: &str) -> ExtractionResult {
        let parsed: RawExtraction = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(err) => {
                warn!(%err, "extractor returned non-conforming JSON");
                return ExtractionResult::default();
            }
        };

        let mut facts = Vec::new();
        for raw_fact in parsed.facts {
            let Some(content) = raw_fact.content.filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            let Some(category) = raw_fact
                .category
                .as_deref()
                .and_then(MemoryCategory::from_str)
            else {
                continue;
            };
            let confidence = raw_fact.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
            if confidence < self.min_confidence {
                continue;
            }
            facts.push(ExtractedFact {
                content,
                category,
                confidence,
                topics: raw_fact.topics,
                supersedes: raw_fact.supersedes,
            });
            if facts.len() >= self.max_facts {
                break;
            }
        }

        let contradictions = parsed
            .contradictions
            .into_iter()
            .filter_map(|c| {
                let existing_memory_id = c.existing_memory_id?;
                let new_fact_index = c.new_fact_index?;
                let resolution = match c.resolution.as_deref() {
                    Some("keep_existing") => ContradictionResolution::KeepExisting,
                    Some("replace_with_new") => ContradictionResolution::ReplaceWithNew,
                    Some("keep_both") => ContradictionResolution::KeepBoth,
                    _ => return None,
                };
                Some(Contradiction {
                    existing_memory_id,
                    new_fact_index,
                    resolution,
                })
            })
            .collect();

        ExtractionResult {
            facts,
            summary: parsed.summary,
            contradictions,
        }
    }
}

fn build_prompt(conversation: &Conversation, messages: &[Message], existing: &[SemanticMemory]) -> String {
    let transcript: String = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let existing_facts: String = existing
        .iter()
        .map(|m| format!("- [{}] {} (id={})", m.category.as_str(), m.content, m.id))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Conversation {}:\n{}\n\nExisting memories:\n{}\n\nRespond with a strict JSON object: {{\"facts\": [...], \"summary\": \"...\", \"contradictions\": [...]}}",
        conversation.id, transcript, existing_facts
    )
}
