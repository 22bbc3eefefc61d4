//! Generator collaborator contract
//!
//! The text-completion backend is external. The chain only relies on
//! [`Generator::complete`] returning scored completions; retry, rate limiting
//! and timeouts belong to the implementation.

use crate::error::GeneratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text a backend returns when it gives up instead of erroring
pub const PLACEHOLDER_COMPLETION: &str = "PLACEHOLDER";

/// One sampled continuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Completion text
    pub text: String,
    /// Log score; confidence is `exp(log_score)`
    pub log_score: f64,
}

impl Completion {
    /// Create new completion
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>, log_score: f64) -> Self {
        Self {
            text: text.into(),
            log_score,
        }
    }

    /// Degraded single response for persistent backend failure
    #[inline]
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_COMPLETION, 0.0)
    }

    /// `exp(log_score)`
    #[inline]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.log_score.exp()
    }
}

/// Sampling options for one call
///
/// Missing fields deserialize from [`GenerationOptions::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Sampling temperature
    pub temperature: f32,
    /// Output token budget per completion
    pub max_output_tokens: u32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Number of completions requested
    pub sample_count: u32,
    /// Optional stop sequence
    pub stop: Option<String>,
}

impl GenerationOptions {
    /// Greedy single-sample options
    #[inline]
    #[must_use]
    pub fn greedy(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens,
            top_p: 1.0,
            sample_count: 1,
            stop: None,
        }
    }

    /// With sampling temperature and sample count
    #[inline]
    #[must_use]
    pub fn sampled(mut self, temperature: f32, sample_count: u32) -> Self {
        self.temperature = temperature;
        self.sample_count = sample_count;
        self
    }

    /// With stop sequence
    #[inline]
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    /// Same options forced to one sample
    #[inline]
    #[must_use]
    pub fn single(&self) -> Self {
        Self {
            sample_count: 1,
            ..self.clone()
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::greedy(150)
    }
}

/// Stochastic text-completion oracle
///
/// Implementations return `sample_count` completions, most preferred first
/// by convention. Ranking in the chain uses `log_score` only.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete a prompt
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<Completion>, GeneratorError>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "generator"
    }
}

/// Single greedy continuation text (empty when the backend returned nothing)
///
/// # Errors
/// Propagates the backend error.
pub async fn complete_text<G: Generator + ?Sized>(
    generator: &G,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String, GeneratorError> {
    let completions = generator.complete(prompt, &options.single()).await?;
    Ok(completions.into_iter().next().map(|c| c.text).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        async fn complete(
            &self,
            prompt: &str,
            options: &GenerationOptions,
        ) -> Result<Vec<Completion>, GeneratorError> {
            Ok((0..options.sample_count)
                .map(|i| Completion::new(format!("{prompt}-{i}"), 0.0))
                .collect())
        }
    }

    #[test]
    fn confidence_is_exp_of_score() {
        assert!((Completion::new("x", 0.0).confidence() - 1.0).abs() < 1e-12);
        assert!((Completion::new("x", 2f64.ln()).confidence() - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn complete_text_forces_single_sample() {
        let options = GenerationOptions::greedy(10).sampled(0.5, 8);
        let text = complete_text(&Echo, "p", &options).await.unwrap();
        assert_eq!(text, "p-0");
    }

    #[test]
    fn options_builders() {
        let options = GenerationOptions::greedy(200).with_stop("\n\n");
        assert_eq!(options.sample_count, 1);
        assert_eq!(options.stop.as_deref(), Some("\n\n"));
    }
}
