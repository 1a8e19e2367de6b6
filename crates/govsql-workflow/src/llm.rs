//! Language model protocol
//!
//! Every model call in the workflow goes through [`LanguageModel`] with
//! a JSON-schema-constrained response, so step code deserializes typed
//! structs instead of scraping free text. Transport failures and
//! schema violations are distinct error variants; both are fatal for
//! the run.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model transport error: {0}")]
    Transport(String),

    #[error("Model response violated the response schema: {0}")]
    SchemaViolation(String),

    #[error("Model returned no content")]
    EmptyResponse,
}

impl From<async_openai::error::OpenAIError> for LlmError {
    fn from(e: async_openai::error::OpenAIError) -> Self {
        LlmError::Transport(e.to_string())
    }
}

/// One schema-constrained completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Stable name of the expected response shape; also the JSON
    /// schema name sent to the provider.
    pub response_name: &'static str,
    pub response_schema: serde_json::Value,
    pub temperature: f32,
}

/// Capability interface the workflow consumes; the OpenAI client is
/// one implementation, test doubles are another.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run the completion and return the parsed JSON content.
    async fn complete(&self, request: CompletionRequest) -> Result<serde_json::Value, LlmError>;
}

/// Run a completion and deserialize the structured content into `T`.
pub async fn complete_typed<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    request: CompletionRequest,
) -> Result<T, LlmError> {
    let value = model.complete(request).await?;
    serde_json::from_value(value).map_err(|e| LlmError::SchemaViolation(e.to_string()))
}

/// OpenAI-backed model.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<serde_json::Value, LlmError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user_prompt)
                    .build()?,
            ),
        ];

        let api_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(request.temperature)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: request.response_name.to_string(),
                    schema: Some(request.response_schema),
                    strict: Some(true),
                },
            })
            .build()?;

        let response = self.client.chat().create(api_request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::debug!(response = %request.response_name, "model call completed");

        serde_json::from_str(content).map_err(|e| LlmError::SchemaViolation(e.to_string()))
    }
}

/// Schema for an object with a single required string field.
fn string_field_schema(field: &str, description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "description": description }
        },
        "required": [field],
        "additionalProperties": false
    })
}

/// The SQL query corresponding to the user's question.
#[derive(Debug, Deserialize)]
pub struct SqlTranslation {
    pub sql_query: String,
}

impl SqlTranslation {
    pub const NAME: &'static str = "sql_translation";

    pub fn schema() -> serde_json::Value {
        string_field_schema(
            "sql_query",
            "The SQL query corresponding to the user's natural language question.",
        )
    }
}

/// YES/NO answer on whether the question fits the schema.
#[derive(Debug, Deserialize)]
pub struct RelevanceVerdict {
    pub is_relevant: String,
}

impl RelevanceVerdict {
    pub const NAME: &'static str = "relevance_verdict";

    pub fn schema() -> serde_json::Value {
        string_field_schema(
            "is_relevant",
            "Whether the question is related to the database schema. 'YES' or 'NO'.",
        )
    }
}

/// Result set rendered as a markdown table.
#[derive(Debug, Deserialize)]
pub struct RenderedTable {
    pub display_result: String,
}

impl RenderedTable {
    pub const NAME: &'static str = "rendered_table";

    pub fn schema() -> serde_json::Value {
        string_field_schema(
            "display_result",
            "The result set converted into a table in markdown syntax.",
        )
    }
}

/// Semantics-preserving reformulation of the question.
#[derive(Debug, Deserialize)]
pub struct RewrittenQuestion {
    pub new_question: String,
}

impl RewrittenQuestion {
    pub const NAME: &'static str = "rewritten_question";

    pub fn schema() -> serde_json::Value {
        string_field_schema(
            "new_question",
            "Reformulated question to gain a valid SQL transformation.",
        )
    }
}

/// User-facing explanation for a terminal failure branch.
#[derive(Debug, Deserialize)]
pub struct InfoReply {
    pub info: String,
}

impl InfoReply {
    pub const NAME: &'static str = "user_info";

    pub fn schema() -> serde_json::Value {
        string_field_schema("info", "Short explanation addressed to the user.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedModel(serde_json::Value);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn any_request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            response_name: SqlTranslation::NAME,
            response_schema: SqlTranslation::schema(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn complete_typed_deserializes_matching_content() {
        let model = CannedModel(json!({"sql_query": "SELECT 1"}));

        let translation: SqlTranslation =
            complete_typed(&model, any_request()).await.unwrap();

        assert_eq!(translation.sql_query, "SELECT 1");
    }

    #[tokio::test]
    async fn complete_typed_flags_schema_violations() {
        let model = CannedModel(json!({"unexpected": true}));

        let result: Result<SqlTranslation, _> = complete_typed(&model, any_request()).await;

        assert!(matches!(result, Err(LlmError::SchemaViolation(_))));
    }

    #[test]
    fn response_schemas_require_their_field() {
        for (schema, field) in [
            (SqlTranslation::schema(), "sql_query"),
            (RelevanceVerdict::schema(), "is_relevant"),
            (RenderedTable::schema(), "display_result"),
            (RewrittenQuestion::schema(), "new_question"),
            (InfoReply::schema(), "info"),
        ] {
            assert_eq!(schema["required"][0], field);
            assert!(schema["properties"][field].is_object());
        }
    }
}
