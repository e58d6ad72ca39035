//! rig-core integration for LLM-backed file analysis.
//!
//! Uses rig-core's provider clients and Agent abstraction. Supports
//! Anthropic, OpenAI, and any OpenAI-compatible API.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use crate::config::AnalyzerConfig;
use crate::models::{Issue, PrFile, ProviderName};

use super::{Analyzer, AnalyzerError};

/// Maximum tokens per completion response.
///
/// Set high enough to accommodate thinking models that consume part of
/// the budget for internal reasoning tokens.
const MAX_TOKENS: u64 = 65536;

/// Maximum length of LLM response text to include in parse error messages.
const PARSE_ERROR_PREVIEW_LEN: usize = 2000;

/// System prompt for the per-file reviewer.
const SYSTEM_PROMPT: &str = "You are an experienced code reviewer. You analyze one file at a \
     time and report concrete, actionable issues. You never invent issues to fill space; an \
     empty list is a valid answer.";

/// Build an agent from a rig-core client and prompt it.
///
/// Always sets `max_tokens`; without it some providers default to a
/// low limit that truncates responses.
macro_rules! prompt_agent {
    ($client:expr, $model:expr, $user:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.0)
            .max_tokens(MAX_TOKENS)
            .output_schema::<Vec<Issue>>()
            .build();
        agent
            .prompt($user)
            .await
            .map_err(|e| AnalyzerError::ApiError(format!("{} API error: {e}", $label)))
    }};
}

/// rig-core based analyzer.
///
/// Wraps rig-core's multi-provider client system. The provider name in
/// config selects which rig-core provider to use.
pub struct RigAnalyzer {
    config: AnalyzerConfig,
}

impl RigAnalyzer {
    /// Create a new RigAnalyzer with the given configuration.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        if config.api_key.is_none() {
            return Err(AnalyzerError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or the provider-specific env var.",
                config.name,
                crate::constants::ENV_API_KEY
            )));
        }
        Ok(Self { config })
    }

    /// Get the API key or return an error.
    fn api_key(&self) -> Result<&str, AnalyzerError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| AnalyzerError::NotConfigured("missing API key".to_string()))
    }

    /// Make a completion call through rig-core and return the raw response text.
    async fn call_rig(&self, user_prompt: &str) -> Result<String, AnalyzerError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        AnalyzerError::ApiError(format!("failed to create Anthropic client: {e}"))
                    })?;
                prompt_agent!(client, model, user_prompt, "Anthropic")
            }
            ProviderName::OpenAI | ProviderName::OpenAICompatible => {
                let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
                if let Some(ref base_url) = self.config.base_url {
                    builder = builder.base_url(base_url);
                } else if self.config.name == ProviderName::OpenAICompatible {
                    return Err(AnalyzerError::NotConfigured(
                        "openai-compatible provider requires base_url to be set".to_string(),
                    ));
                }
                let client: providers::openai::CompletionsClient =
                    builder.build().map_err(|e| {
                        AnalyzerError::ApiError(format!("failed to create OpenAI client: {e}"))
                    })?;
                prompt_agent!(client, model, user_prompt, "OpenAI")
            }
        }
    }
}

#[async_trait]
impl Analyzer for RigAnalyzer {
    async fn analyze(&self, file: &PrFile) -> Result<Vec<Issue>, AnalyzerError> {
        let prompt = build_prompt(file);
        let response = self.call_rig(&prompt).await?;
        parse_issues_response(&response)
    }
}

/// Build the user prompt for a single file analysis.
fn build_prompt(file: &PrFile) -> String {
    let language = file.language.as_deref().unwrap_or("unknown");
    format!(
        "## File: {path}\n\
         Language: {language}\n\n\
         ```{language}\n{content}\n```\n\n\
         ## Instructions\n\n\
         Review the file above. Return your findings as a JSON array. For each issue include:\n\
         - \"file\": the file path (\"{path}\")\n\
         - \"line\": the line number the issue refers to\n\
         - \"severity\": MUST be exactly one of: \"error\", \"warning\", \"info\"\n\
         - \"type\": a short category such as \"bug\", \"security\", \"performance\", \"style\"\n\
         - \"description\": detailed explanation of the issue\n\
         - \"suggestion\": (optional) suggested fix\n\n\
         IMPORTANT: The \"severity\" field must be one of \"error\", \"warning\", or \"info\". \
         Do NOT use values like \"critical\", \"major\", \"minor\", \"high\", or \"low\".\n\n\
         If there are no issues, return an empty array: []\n",
        path = file.path,
        language = language,
        content = file.content,
    )
}

/// Parse the LLM response text into structured issues.
///
/// With `output_schema` enforcing the JSON schema at the provider level,
/// the response is expected to be valid JSON. We still handle an empty
/// response or a `{"issues": [...]}` wrapper gracefully.
///
/// Some providers may return JSON wrapped in markdown code fences
/// (e.g. ```json ... ```), so we extract the inner content first.
fn parse_issues_response(response: &str) -> Result<Vec<Issue>, AnalyzerError> {
    let trimmed = response.trim();

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    for candidate in extract_json_candidates(trimmed) {
        // Try parsing as a direct array of issues
        if let Ok(issues) = serde_json::from_str::<Vec<Issue>>(&candidate) {
            return Ok(issues);
        }

        // Try parsing as {"issues": [...]}
        if let Ok(wrapper) = serde_json::from_str::<serde_json::Value>(&candidate) {
            if let Some(arr) = wrapper.get("issues") {
                if let Ok(issues) = serde_json::from_value::<Vec<Issue>>(arr.clone()) {
                    return Ok(issues);
                }
            }
        }
    }

    Err(AnalyzerError::ParseError(format!(
        "could not parse analyzer response as issues JSON. Response: {}",
        &response[..response.len().min(PARSE_ERROR_PREVIEW_LEN)]
    )))
}

/// Regex for extracting content inside markdown code fences.
///
/// The closing ``` must appear at the start of a line (`\n````) to avoid
/// matching triple-backticks embedded inside JSON string values (e.g.
/// suggestion fields containing code examples).
static FENCE_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap());

/// Extract candidate JSON strings from a response.
///
/// Returns the trimmed response itself, a first-`[`-to-last-`]` slice,
/// plus any content inside markdown code fences.
fn extract_json_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    // First candidate: the raw text
    candidates.push(text.to_string());

    // Second: bracket extraction. This is the most robust strategy when
    // the response contains nested code fences inside JSON string values.
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            candidates.push(text[start..=end].to_string());
        }
    }

    // Third: extract content from markdown code fences.
    for cap in FENCE_RE.captures_iter(text) {
        if let Some(inner) = cap.get(1) {
            let inner_trimmed = inner.as_str().trim();
            if !inner_trimmed.is_empty() {
                candidates.push(inner_trimmed.to_string());
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_array() {
        let response = r#"[
            {
                "file": "src/main.rs",
                "line": 42,
                "severity": "error",
                "type": "bug",
                "description": "This is a bug",
                "suggestion": "Fix it"
            }
        ]"#;
        let issues = parse_issues_response(response).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "src/main.rs");
        assert_eq!(issues[0].kind, "bug");
    }

    #[test]
    fn parse_wrapped_json() {
        let response = r#"{
    "issues": [
        {
            "file": "test.rs",
            "line": 1,
            "severity": "warning",
            "type": "style",
            "description": "Problem here"
        }
    ]
}"#;
        let issues = parse_issues_response(response).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn parse_empty_response() {
        assert!(parse_issues_response("").unwrap().is_empty());
        assert!(parse_issues_response("   \n\n  ").unwrap().is_empty());
    }

    #[test]
    fn parse_empty_json_array() {
        assert!(parse_issues_response("[]").unwrap().is_empty());
    }

    #[test]
    fn parse_unparseable_response() {
        let result = parse_issues_response("This is random text with no JSON.");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("could not parse"));
    }

    #[test]
    fn parse_markdown_fenced_json() {
        let response = "Here are the issues:\n```json\n[\n  {\n    \"file\": \"src/lib.rs\",\n    \"line\": 5,\n    \"severity\": \"warning\",\n    \"type\": \"style\",\n    \"description\": \"This import is unused\"\n  }\n]\n```\n";
        let issues = parse_issues_response(response).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "src/lib.rs");
    }

    #[test]
    fn parse_json_embedded_in_prose() {
        // LLM returns prose with a JSON array buried in the middle.
        let response = "I found one issue:\n[{\"file\":\"a.rs\",\"line\":1,\"severity\":\"info\",\"type\":\"style\",\"description\":\"M\"}]\nThat's all.";
        let issues = parse_issues_response(response).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn extract_json_candidates_returns_raw_first() {
        let text = r#"[{"a":1}]"#;
        let candidates = extract_json_candidates(text);
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0], text);
    }

    #[test]
    fn build_prompt_includes_content_and_path() {
        let file = PrFile::new("src/handler.rs", "fn main() {}");
        let prompt = build_prompt(&file);
        assert!(prompt.contains("src/handler.rs"));
        assert!(prompt.contains("fn main() {}"));
        assert!(prompt.contains("rust"));
    }

    #[test]
    fn new_analyzer_missing_api_key() {
        let config = AnalyzerConfig {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
        };
        match RigAnalyzer::new(config) {
            Err(e) => assert!(e.to_string().contains("API key"), "got: {e}"),
            Ok(_) => panic!("expected error for missing API key"),
        }
    }

    #[test]
    fn new_analyzer_with_api_key() {
        let config = AnalyzerConfig {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: Some("sk-test-key".to_string()),
        };
        assert!(RigAnalyzer::new(config).is_ok());
    }
}
