use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;

/// Cleaned-body prefix sent to the completion service, in characters. Bounds
/// request size; postings longer than this lose their tail.
pub const BODY_CHAR_LIMIT: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobLocation {
    pub city: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub remote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PayRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// "hour", "day", "year"...
    pub unit: Option<String>,
}

// Deserialized through `From<String>` so an unrecognized label degrades to
// `Unknown` instead of failing the whole posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String")]
pub enum ContractType {
    #[serde(rename = "w2")]
    W2,
    #[serde(rename = "c2c")]
    CorpToCorp,
    #[serde(rename = "1099")]
    Independent,
    #[serde(rename = "full_time")]
    FullTime,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl From<String> for ContractType {
    fn from(raw: String) -> Self {
        match raw.to_lowercase().as_str() {
            "w2" => ContractType::W2,
            "c2c" | "corp to corp" | "corp-to-corp" => ContractType::CorpToCorp,
            "1099" => ContractType::Independent,
            "full_time" | "full-time" | "fulltime" | "permanent" => ContractType::FullTime,
            _ => ContractType::Unknown,
        }
    }
}

/// Best-effort structured record extracted from a posting. Used for logging
/// only; never persisted, and its absence never blocks a forward.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobPosting {
    pub title: Option<String>,
    pub location: Option<JobLocation>,
    pub pay: Option<PayRange>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub contract_type: Option<ContractType>,
    pub due_date: Option<String>,
    pub duration: Option<String>,
    pub start_date: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// The completion-service boundary: a prompt in, generated text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str, max_tokens: u32)
        -> anyhow::Result<String>;
}

/// OpenAI-style chat-completions client.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, endpoint: String) -> Self {
        OpenAiCompletion {
            client: reqwest::Client::new(),
            api_key,
            endpoint,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("sending completion request")?
            .error_for_status()
            .context("completion request rejected")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("decoding completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion response contained no content"))
    }
}

/// Extracts a `JobPosting` from a cleaned body via the completion service.
///
/// Constructed only when a credential is configured; callers hold
/// `Option<JobExtractor>` and skip enrichment entirely otherwise.
pub struct JobExtractor {
    service: Box<dyn CompletionService>,
    model: String,
    max_tokens: u32,
}

impl JobExtractor {
    pub fn new(config: &CompletionConfig) -> Self {
        JobExtractor {
            service: Box::new(OpenAiCompletion::new(
                config.api_key.clone(),
                config.endpoint.clone(),
            )),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// For tests and alternative backends.
    pub fn with_service(service: Box<dyn CompletionService>, model: &str, max_tokens: u32) -> Self {
        JobExtractor {
            service,
            model: model.to_string(),
            max_tokens,
        }
    }

    /// Best-effort extraction. Every failure path (transport, service, JSON
    /// location, parse) logs and returns `None`; this never propagates an
    /// error to the forwarding pipeline.
    pub async fn extract(&self, cleaned_body: &str, subject: &str) -> Option<JobPosting> {
        let prompt = build_prompt(cleaned_body, subject);
        match self
            .service
            .complete(&prompt, &self.model, self.max_tokens)
            .await
        {
            Ok(text) => parse_job_posting(&text),
            Err(e) => {
                log::warn!("enrichment call failed: {e:#}");
                None
            }
        }
    }
}

fn build_prompt(cleaned_body: &str, subject: &str) -> String {
    let body: String = cleaned_body.chars().take(BODY_CHAR_LIMIT).collect();
    format!(
        "Extract the job posting below into a single JSON object with exactly these keys: \
         title, location {{city, region, remote}}, pay {{min, max, unit}}, skills (array of \
         strings), contract_type (one of \"w2\", \"c2c\", \"1099\", \"full_time\", \
         \"unknown\"), due_date, duration, start_date, confidence (0.0 to 1.0). \
         Use null for any value the posting does not state, [] for skills if none, \
         and always a number for confidence. \
         Respond with ONLY the JSON object, no prose.\n\n\
         Subject: {subject}\n\n{body}"
    )
}

/// Locate the first top-level JSON object in `text` by brace matching.
///
/// The service is asked for bare JSON but routinely wraps it in prose or code
/// fences, so this scans for the first balanced object, skipping braces
/// inside string literals.
pub(crate) fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the service's reply into a `JobPosting`; `None` on any mismatch.
pub(crate) fn parse_job_posting(text: &str) -> Option<JobPosting> {
    let object = match first_json_object(text) {
        Some(object) => object,
        None => {
            log::warn!("enrichment response contained no JSON object");
            return None;
        }
    };
    match serde_json::from_str::<JobPosting>(object) {
        Ok(mut posting) => {
            posting.confidence = posting.confidence.clamp(0.0, 1.0);
            Some(posting)
        }
        Err(e) => {
            log::warn!("enrichment response did not parse as a job posting: {e}");
            None
        }
    }
}
