use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, warn};

use reqres_core::config::GenerationConfig;
use reqres_core::error::{Error, Result};
use reqres_core::traits::Generator;
use reqres_core::types::{GenerationRequest, Query, ResolutionResult};

use crate::context::AssembledContext;

const ROLE: &str = "You are a requirements engineer. Rewrite the ambiguous requirement so that it is precise, measurable and testable.";
const GROUNDED: &str = "Use only the numbered reference material below. Do not introduce thresholds or terms it does not support.";
const UNGROUNDED: &str = "No reference material is available; rely on general requirements-engineering practice.";
const REWRITE_ONLY: &str = "Respond with the rewritten requirement only.";
const EXPLAIN: &str = "First explain briefly why the requirement is ambiguous, then give the rewritten requirement on a line starting with \"Rewrite:\".";

/// Builds the request for one sentence. `context == None` is the ungrounded fallback.
pub fn build_request(sentence: &str, context: Option<&str>, include_explanation: bool) -> GenerationRequest {
    let grounding = if context.is_some() { GROUNDED } else { UNGROUNDED };
    let answer = if include_explanation { EXPLAIN } else { REWRITE_ONLY };
    GenerationRequest {
        instructions: format!("{ROLE} {grounding} {answer}"),
        context: context.map(str::to_string),
        target_sentence: sentence.to_string(),
    }
}

/// User-turn text: reference material (if any) followed by the requirement.
pub fn user_message(request: &GenerationRequest) -> String {
    match &request.context {
        Some(context) => format!("Reference material:\n{context}\n\nRequirement:\n{}", request.target_sentence),
        None => format!("Requirement:\n{}", request.target_sentence),
    }
}

/// Issues one grounded generation call per sentence and packages the result with its evidence.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    include_explanation: bool,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration, include_explanation: bool) -> Self {
        Self { generator, timeout, include_explanation }
    }

    pub fn from_config(generator: Arc<dyn Generator>, config: &GenerationConfig) -> Self {
        Self::new(generator, Duration::from_secs(config.timeout_secs), config.include_explanation)
    }

    /// Generates a rewrite of `query`. An empty context falls back to an ungrounded request
    /// with no evidence. Timeouts, call failures and blank responses are `Error::Generation`;
    /// nothing is retried here.
    pub async fn resolve(&self, query: &Query, context: &AssembledContext) -> Result<ResolutionResult> {
        let fallback_used = context.is_empty();
        if fallback_used {
            warn!(sentence = %query.sentence, "no evidence within budget; generating without grounding");
        }
        let request = build_request(&query.sentence, (!fallback_used).then_some(context.block.as_str()), self.include_explanation);

        let text = tokio::time::timeout(self.timeout, self.generator.generate(&request))
            .await
            .map_err(|_| Error::Generation(format!("no response within {}s", self.timeout.as_secs())))??;
        let rewrite_text = text.trim();
        if rewrite_text.is_empty() {
            return Err(Error::Generation("generator returned an empty response".into()));
        }
        debug!(evidence = context.evidence.len(), fallback_used, "resolved");

        Ok(ResolutionResult {
            original_sentence: query.sentence.clone(),
            confidence: query.confidence,
            rewrite_text: rewrite_text.to_string(),
            evidence: if fallback_used { Vec::new() } else { context.evidence.clone() },
            fallback_used,
        })
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint (Gemini's by default).
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::InvalidConfig(format!("environment variable {} is not set", config.api_key_env)))?;
        let openai_config = OpenAIConfig::new().with_api_base(&config.api_base).with_api_key(api_key);
        Ok(Self { client: Client::with_config(openai_config), model: config.model.clone() })
    }

    fn chat_request(&self, request: &GenerationRequest) -> Result<CreateChatCompletionRequest> {
        CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .temperature(0.2)
            .messages([
                ChatCompletionRequestSystemMessage::from(request.instructions.as_str()).into(),
                ChatCompletionRequestUserMessage::from(user_message(request)).into(),
            ])
            .build()
            .map_err(|e| Error::Generation(e.to_string()))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let chat = self.chat_request(request)?;
        let response = self.client.chat().create(chat).await.map_err(|e| Error::Generation(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Generation("no content found in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqres_core::types::{ChunkMeta, DocumentFormat, Evidence};
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String>,
        delay: Duration,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn replying(reply: Result<String>) -> Arc<Self> {
            Arc::new(Self { reply, delay: Duration::ZERO, seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().expect("lock").push(request.clone());
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Generation(e.to_string())),
            }
        }
    }

    fn context() -> AssembledContext {
        AssembledContext {
            block: "[1] (source: rules.json)\nReplace 'fast' with a latency bound.".into(),
            evidence: vec![Evidence {
                chunk_id: "rules.json:0:abc".into(),
                source: "rules.json".into(),
                format: DocumentFormat::Rule,
                meta: ChunkMeta::default(),
                relevance_score: 0.8,
                excerpt: "Replace 'fast' with a latency bound.".into(),
            }],
        }
    }

    #[tokio::test]
    async fn grounded_result_carries_evidence_unchanged() {
        let generator = Scripted::replying(Ok("  The system shall respond within 200 ms.\n".into()));
        let orchestrator = Orchestrator::new(generator.clone(), Duration::from_secs(5), false);
        let query = Query::new("The system should be fast.").with_confidence(0.9);
        let result = orchestrator.resolve(&query, &context()).await.expect("resolve");
        assert_eq!(result.rewrite_text, "The system shall respond within 200 ms.");
        assert_eq!(result.evidence, context().evidence);
        assert_eq!(result.confidence, Some(0.9));
        assert!(!result.fallback_used);

        let seen = generator.seen.lock().expect("lock");
        assert_eq!(seen[0].context.as_deref(), Some(context().block.as_str()));
        assert!(seen[0].instructions.contains(REWRITE_ONLY));
    }

    #[tokio::test]
    async fn empty_context_falls_back_without_evidence() {
        let generator = Scripted::replying(Ok("Respond within 2 s.".into()));
        let orchestrator = Orchestrator::new(generator.clone(), Duration::from_secs(5), true);
        let result = orchestrator.resolve(&Query::new("Be quick."), &AssembledContext::default()).await.expect("resolve");
        assert!(result.fallback_used);
        assert!(result.evidence.is_empty());
        let seen = generator.seen.lock().expect("lock");
        assert_eq!(seen[0].context, None);
        assert!(seen[0].instructions.contains(UNGROUNDED));
        assert!(seen[0].instructions.contains(EXPLAIN));
    }

    #[tokio::test]
    async fn blank_response_is_a_generation_error() {
        let orchestrator = Orchestrator::new(Scripted::replying(Ok(" \n ".into())), Duration::from_secs(5), false);
        let err = orchestrator.resolve(&Query::new("Be quick."), &context()).await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn oracle_failure_is_surfaced() {
        let orchestrator = Orchestrator::new(Scripted::replying(Err(Error::Generation("quota".into()))), Duration::from_secs(5), false);
        let err = orchestrator.resolve(&Query::new("Be quick."), &context()).await.unwrap_err();
        assert!(err.to_string().contains("quota"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out() {
        let generator = Arc::new(Scripted { reply: Ok("late".into()), delay: Duration::from_secs(60), seen: Mutex::new(Vec::new()) });
        let orchestrator = Orchestrator::new(generator, Duration::from_secs(1), false);
        let err = orchestrator.resolve(&Query::new("Be quick."), &context()).await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("1s")));
    }

    #[test]
    fn user_message_lists_context_before_requirement() {
        let request = build_request("Be quick.", Some("[1] ctx"), false);
        assert_eq!(user_message(&request), "Reference material:\n[1] ctx\n\nRequirement:\nBe quick.");
        assert_eq!(user_message(&build_request("Be quick.", None, false)), "Requirement:\nBe quick.");
    }
}
