use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{
    analyzer::Role,
    generation::{GenerationBackend, GenerationPrompt, PromptTurn},
    text::{
        algo::score_sentences,
        helper::{fit_to_budget, split_sentences},
    },
};

/// One message of the span being condensed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLine {
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// Input of a summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// Messages to condense, oldest first.
    pub lines: Vec<SummaryLine>,
    /// Target output/input length ratio, in `(0, 1]`.
    pub compression_ratio: f64,
    /// Entity names introduced in the span, most salient first.
    pub salient_entities: Vec<String>,
}

impl SummaryRequest {
    /// Total characters of message content.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.lines
            .iter()
            .map(|line| line.content.chars().count())
            .sum()
    }

    /// Maximum output length: `ceil(input_len × compression_ratio)`.
    #[must_use]
    pub fn budget(&self) -> usize {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let budget = ((self.input_len() as f64) * self.compression_ratio - 1e-9)
            .ceil()
            .max(0.0) as usize;
        budget
    }

    fn validate(&self) -> Result<(), SummarizerError> {
        let ratio = self.compression_ratio;
        if ratio.is_finite() && ratio > 0.0 && ratio <= 1.0 {
            Ok(())
        } else {
            Err(SummarizerError::InvalidRatio(ratio))
        }
    }
}

/// Errors raised by summarizers.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Ratio outside `(0, 1]`.
    #[error("compression ratio must be in (0, 1], got {0}")]
    InvalidRatio(f64),
    /// Backend failure without a usable fallback.
    #[error("summarizer backend failed: {0}")]
    Backend(String),
}

/// Condenses a message span into text no longer than
/// [`SummaryRequest::budget`], listing salient entities first as far as the
/// budget allows.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produces the condensed text.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError>;
}

/// Deterministic extractive strategy: entity tag followed by the most
/// salient sentences in their original order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    /// Synchronous core of the strategy. Assumes a valid ratio.
    #[must_use]
    pub fn condense(&self, request: &SummaryRequest) -> String {
        let budget = request.budget();
        let tag = entity_tag(&request.salient_entities, budget);
        let remaining = if tag.is_empty() {
            budget
        } else {
            budget.saturating_sub(tag.chars().count() + 1)
        };

        let sentences: Vec<String> = request
            .lines
            .iter()
            .flat_map(|line| split_sentences(&line.content))
            .collect();
        let ranked = score_sentences(&sentences, &request.salient_entities);
        let mut chosen = Vec::new();
        let mut used = 0;
        for scored in &ranked {
            let len = sentences[scored.index].chars().count() + usize::from(!chosen.is_empty());
            if used + len <= remaining {
                chosen.push(scored.index);
                used += len;
            }
        }
        let body = if chosen.is_empty() {
            ranked
                .first()
                .map(|best| fit_to_budget(&sentences[best.index], remaining))
                .unwrap_or_default()
        } else {
            chosen.sort_unstable();
            chosen
                .iter()
                .map(|&i| sentences[i].as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        join_within(&tag, &body, budget)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        request.validate()?;
        Ok(self.condense(request))
    }
}

/// Summarizer delegating to a generation backend, clamping the reply to the
/// budget and falling back to [`ExtractiveSummarizer`] when the backend fails.
#[derive(Clone)]
pub struct LlmSummarizer {
    backend: Arc<dyn GenerationBackend>,
    fallback: ExtractiveSummarizer,
}

impl fmt::Debug for LlmSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSummarizer").finish_non_exhaustive()
    }
}

impl LlmSummarizer {
    /// Creates a summarizer backed by `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            fallback: ExtractiveSummarizer,
        }
    }

    fn prompt(request: &SummaryRequest, budget: usize) -> GenerationPrompt {
        let mut instruction = format!(
            "Summarize the conversation below in at most {budget} characters."
        );
        if !request.salient_entities.is_empty() {
            instruction.push_str(" Mention: ");
            instruction.push_str(&request.salient_entities.join(", "));
            instruction.push('.');
        }
        let turns = request
            .lines
            .iter()
            .map(|line| PromptTurn {
                role: line.role,
                content: line.content.clone(),
            })
            .collect();
        GenerationPrompt {
            max_tokens: u32::try_from(budget.div_ceil(2)).unwrap_or(u32::MAX).max(16),
            temperature: 0.3,
            ..GenerationPrompt::new(instruction, turns)
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        request.validate()?;
        let budget = request.budget();
        if budget == 0 {
            return Ok(String::new());
        }
        match self.backend.complete(&Self::prompt(request, budget)).await {
            Ok(completion) if !completion.text.trim().is_empty() => {
                let tag = entity_tag(&request.salient_entities, budget);
                Ok(join_within(&tag, completion.text.trim(), budget))
            }
            Ok(_) => {
                warn!("summarizer backend returned nothing; using extractive fallback");
                Ok(self.fallback.condense(request))
            }
            Err(err) => {
                warn!(error = %err, "summarizer backend failed; using extractive fallback");
                Ok(self.fallback.condense(request))
            }
        }
    }
}

/// `[entities: a, b]` with as many names as fit in `budget` characters.
fn entity_tag(entities: &[String], budget: usize) -> String {
    let mut fitted: Vec<&str> = Vec::new();
    for name in entities {
        fitted.push(name);
        let candidate = format!("[entities: {}]", fitted.join(", "));
        if candidate.chars().count() > budget {
            fitted.pop();
            break;
        }
    }
    if fitted.is_empty() {
        String::new()
    } else {
        format!("[entities: {}]", fitted.join(", "))
    }
}

fn join_within(tag: &str, body: &str, budget: usize) -> String {
    let joined = match (tag.is_empty(), body.is_empty()) {
        (true, _) => body.to_string(),
        (false, true) => tag.to_string(),
        (false, false) => format!("{tag} {body}"),
    };
    fit_to_budget(&joined, budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Completion, GenerationError};

    fn request(ratio: f64, entities: &[&str]) -> SummaryRequest {
        let texts = [
            "I started a new job at the office this week. My boss is kind.",
            "That sounds exciting! How do you feel about it?",
            "Honestly a bit anxious. My family keeps asking about work.",
            "Family support matters. What helps you relax?",
            "Music helps. I play guitar every evening after work.",
        ];
        SummaryRequest {
            lines: texts
                .iter()
                .enumerate()
                .map(|(i, text)| SummaryLine {
                    role: if i % 2 == 0 { Role::User } else { Role::Dopple },
                    content: (*text).to_string(),
                })
                .collect(),
            compression_ratio: ratio,
            salient_entities: entities.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn extractive_output_respects_budget() {
        for ratio in [0.05, 0.2, 0.5, 0.7, 1.0] {
            let req = request(ratio, &["work", "family", "afraid"]);
            let out = ExtractiveSummarizer.summarize(&req).await.unwrap();
            assert!(out.chars().count() <= req.budget(), "ratio {ratio}: {out}");
        }
    }

    #[tokio::test]
    async fn extractive_lists_entities_first() {
        let req = request(0.5, &["work", "family"]);
        let out = ExtractiveSummarizer.summarize(&req).await.unwrap();
        assert!(out.starts_with("[entities: work, family]"));
        assert!(out.len() > "[entities: work, family]".len());
    }

    #[test]
    fn budget_is_ceiling_of_ratio() {
        let req = SummaryRequest {
            lines: vec![SummaryLine {
                role: Role::User,
                content: "a".repeat(100),
            }],
            compression_ratio: 0.7,
            salient_entities: Vec::new(),
        };
        assert_eq!(req.budget(), 70);
        let req = SummaryRequest {
            compression_ratio: 0.333,
            ..req
        };
        assert_eq!(req.budget(), 34);
    }

    #[test]
    fn tag_drops_names_that_do_not_fit() {
        let names = vec!["curiosity".to_string(), "family".to_string()];
        assert_eq!(entity_tag(&names, 21), "[entities: curiosity]");
        assert_eq!(entity_tag(&names, 5), "");
    }

    #[tokio::test]
    async fn rejects_invalid_ratio() {
        let req = request(1.5, &[]);
        assert!(matches!(
            ExtractiveSummarizer.summarize(&req).await,
            Err(SummarizerError::InvalidRatio(_))
        ));
    }

    struct Failing;

    #[async_trait]
    impl GenerationBackend for Failing {
        async fn complete(&self, _: &GenerationPrompt) -> Result<Completion, GenerationError> {
            Err(GenerationError::Backend("offline".into()))
        }
    }

    struct Verbose;

    #[async_trait]
    impl GenerationBackend for Verbose {
        async fn complete(&self, _: &GenerationPrompt) -> Result<Completion, GenerationError> {
            Ok(Completion {
                text: "word ".repeat(500),
            })
        }
    }

    #[tokio::test]
    async fn llm_falls_back_to_extractive() {
        let req = request(0.5, &["work"]);
        let out = LlmSummarizer::new(Arc::new(Failing))
            .summarize(&req)
            .await
            .unwrap();
        assert_eq!(out, ExtractiveSummarizer.condense(&req));
    }

    #[tokio::test]
    async fn llm_output_is_clamped() {
        let req = request(0.3, &["work"]);
        let out = LlmSummarizer::new(Arc::new(Verbose))
            .summarize(&req)
            .await
            .unwrap();
        assert!(out.starts_with("[entities: work] word"));
        assert!(out.chars().count() <= req.budget());
    }
}
