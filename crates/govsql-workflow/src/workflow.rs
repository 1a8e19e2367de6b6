//! Workflow orchestrator
//!
//! Drives one [`RunState`] through the translation graph:
//!
//! ```text
//! check_relevance --YES--> transform_into_sql --> check_sql_is_allowed
//! check_relevance --NO---> info_query_not_relevant          [terminal]
//! check_sql_is_allowed --YES--> execute_query --> check_sql_valid
//! check_sql_is_allowed --NO---> info_unable_query_type      [terminal]
//! check_sql_valid --YES--> show_answer                      [terminal]
//! check_sql_valid --NO---> check_max_tries
//! check_max_tries --NO---> correct_query --> transform_into_sql
//! check_max_tries --YES--> info_unable_create_sql           [terminal]
//! ```
//!
//! Domain outcomes (irrelevant question, refused statement, failed
//! execution) are routed through the graph; only infrastructure
//! failures escape as errors.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use govsql_history::{HistoryError, HistoryStore, NewRecord, RecordOrigin};

use crate::backend::{QueryBackend, SchemaUnavailable};
use crate::llm::{
    complete_typed, CompletionRequest, InfoReply, LanguageModel, LlmError, RelevanceVerdict,
    RenderedTable, RewrittenQuestion, SqlTranslation,
};
use crate::prompts;
use crate::state::{RunState, Verdict};

/// Translation attempts before the run gives up.
const MAX_ATTEMPTS: u32 = 3;

const TEMPERATURE_RELEVANCE: f32 = 0.0;
const TEMPERATURE_TRANSLATION: f32 = 0.0;
const TEMPERATURE_RENDERING: f32 = 0.0;
const TEMPERATURE_REWRITE: f32 = 0.7;
const TEMPERATURE_INFO_RELEVANCE: f32 = 0.5;
const TEMPERATURE_INFO: f32 = 0.7;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Introspection(#[from] SchemaUnavailable),
}

/// Tunables that vary per deployment. The retry ceiling is fixed; the
/// two similarity constants are deliberately separate knobs.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Hint threshold: a prior question within this distance is shown
    /// to the model as a worked example.
    pub similarity_distance: f32,
    /// Near-duplicate threshold for the write-through: at or below
    /// this distance the existing record is touched, not duplicated.
    pub near_duplicate_epsilon: f32,
    /// Database user recorded on write-through history records.
    pub user: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            similarity_distance: 0.25,
            near_duplicate_epsilon: 1e-4,
            user: "govsql".to_string(),
        }
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Successful execution; `rendered_result` is the markdown table.
    Answer {
        rendered_result: String,
        sql: String,
        row_count: usize,
    },
    /// The question does not fit the schema; never retried.
    NotRelevant { info_message: String },
    /// The generated statement kind is refused; a hard stop, never
    /// routed into the retry loop.
    StatementNotAllowed { info_message: String },
    /// No valid SQL within the attempt ceiling.
    TranslationExhausted { info_message: String },
}

/// One row of the audit search result.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryMatch {
    pub question: String,
    pub sql: String,
    pub schema_name: String,
    pub updated_at: chrono::DateTime<Utc>,
    pub distance: f32,
}

/// Workflow steps; each `run` drives this machine to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CheckRelevance,
    TransformIntoSql,
    CheckSqlAllowed,
    ExecuteQuery,
    CheckSqlValid,
    CheckMaxTries,
    CorrectQuery,
    ShowAnswer,
    InfoNotRelevant,
    InfoUnableQueryType,
    InfoUnableCreateSql,
}

pub struct Workflow {
    translator: Arc<dyn LanguageModel>,
    renderer: Arc<dyn LanguageModel>,
    backend: Arc<dyn QueryBackend>,
    history: Arc<Mutex<HistoryStore>>,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(
        translator: Arc<dyn LanguageModel>,
        renderer: Arc<dyn LanguageModel>,
        backend: Arc<dyn QueryBackend>,
        history: Arc<Mutex<HistoryStore>>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            translator,
            renderer,
            backend,
            history,
            settings,
        }
    }

    /// Translate a question, execute the result, and render it.
    ///
    /// Domain failures come back as [`RunOutcome`] variants; only
    /// infrastructure failures are `Err`.
    pub async fn translate_and_execute(
        &self,
        question: &str,
        schema_name: &str,
    ) -> Result<RunOutcome, WorkflowError> {
        let mut state = RunState::new(question, schema_name);
        let mut step = Step::CheckRelevance;

        tracing::info!(schema = %schema_name, "translation run started");

        loop {
            tracing::debug!(step = ?step, attempt = state.attempt_count, "entering step");

            step = match step {
                Step::CheckRelevance => {
                    self.check_relevance(&mut state).await?;
                    if state.is_relevant.is_yes() {
                        Step::TransformIntoSql
                    } else {
                        Step::InfoNotRelevant
                    }
                }
                Step::TransformIntoSql => {
                    self.transform_into_sql(&mut state).await?;
                    Step::CheckSqlAllowed
                }
                Step::CheckSqlAllowed => {
                    self.check_sql_is_allowed(&mut state);
                    if state.is_allowed.is_yes() {
                        Step::ExecuteQuery
                    } else {
                        Step::InfoUnableQueryType
                    }
                }
                Step::ExecuteQuery => {
                    self.execute_query(&mut state).await;
                    Step::CheckSqlValid
                }
                Step::CheckSqlValid => {
                    state.sql_is_valid = if state.execution_error.is_none() {
                        Verdict::Yes
                    } else {
                        Verdict::No
                    };
                    if state.sql_is_valid.is_yes() {
                        Step::ShowAnswer
                    } else {
                        Step::CheckMaxTries
                    }
                }
                Step::CheckMaxTries => {
                    if state.attempt_count >= MAX_ATTEMPTS {
                        Step::InfoUnableCreateSql
                    } else {
                        Step::CorrectQuery
                    }
                }
                Step::CorrectQuery => {
                    self.correct_query(&mut state).await?;
                    Step::TransformIntoSql
                }
                Step::ShowAnswer => {
                    self.show_answer(&mut state).await?;
                    tracing::info!(rows = state.row_count, "translation run answered");
                    return Ok(RunOutcome::Answer {
                        rendered_result: state.rendered_result,
                        sql: state.candidate_sql,
                        row_count: state.row_count,
                    });
                }
                Step::InfoNotRelevant => {
                    self.phrase_info(
                        &mut state,
                        prompts::NOT_RELEVANT_MESSAGE,
                        TEMPERATURE_INFO_RELEVANCE,
                    )
                    .await?;
                    tracing::info!("translation run ended: question not relevant");
                    return Ok(RunOutcome::NotRelevant {
                        info_message: state.info_message,
                    });
                }
                Step::InfoUnableQueryType => {
                    self.phrase_info(&mut state, prompts::QUERY_TYPE_MESSAGE, TEMPERATURE_INFO)
                        .await?;
                    tracing::info!("translation run ended: statement kind refused");
                    return Ok(RunOutcome::StatementNotAllowed {
                        info_message: state.info_message,
                    });
                }
                Step::InfoUnableCreateSql => {
                    self.phrase_info(
                        &mut state,
                        prompts::UNABLE_CREATE_SQL_MESSAGE,
                        TEMPERATURE_INFO,
                    )
                    .await?;
                    tracing::info!(
                        attempts = state.attempt_count,
                        "translation run ended: attempts exhausted"
                    );
                    return Ok(RunOutcome::TranslationExhausted {
                        info_message: state.info_message,
                    });
                }
            };
        }
    }

    /// Semantic search over the accepted-translation history.
    pub async fn search_history(
        &self,
        search_text: &str,
        schema_name: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMatch>, HistoryError> {
        let history = self.history.lock().await;
        let hits = history.search(search_text, schema_name, limit).await?;

        Ok(hits
            .into_iter()
            .map(|hit| HistoryMatch {
                question: hit.record.question,
                sql: hit.record.sql,
                schema_name: hit.record.schema_name,
                updated_at: hit.record.updated_at,
                distance: hit.distance,
            })
            .collect())
    }

    /// Store a curated (question, SQL) pair without executing it.
    pub async fn teach(
        &self,
        question: &str,
        sql_statement: &str,
        schema_name: &str,
    ) -> Result<String, HistoryError> {
        let mut history = self.history.lock().await;
        history
            .insert(NewRecord {
                question: question.to_string(),
                sql: sql_statement.to_string(),
                schema_name: schema_name.to_string(),
                user: "system".to_string(),
                origin: RecordOrigin::Taught,
            })
            .await?;

        Ok("Question / SQL statement combination stored!".to_string())
    }

    /// Fetch the schema description once per run; later steps reuse
    /// the cached text.
    async fn schema_description(&self, state: &mut RunState) -> Result<String, WorkflowError> {
        if let Some(description) = &state.schema_description {
            return Ok(description.clone());
        }

        let description = self.backend.describe_schema(&state.schema_name).await?;
        state.schema_description = Some(description.clone());
        Ok(description)
    }

    async fn check_relevance(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let schema = self.schema_description(state).await?;
        let system_prompt = prompts::render(
            prompts::RELEVANCE_PROMPT,
            &[("question", &state.question), ("schema", &schema)],
        );
        let user_prompt =
            prompts::render(prompts::QUESTION_USER_PROMPT, &[("question", &state.question)]);

        let verdict: RelevanceVerdict = complete_typed(
            self.translator.as_ref(),
            CompletionRequest {
                system_prompt,
                user_prompt,
                response_name: RelevanceVerdict::NAME,
                response_schema: RelevanceVerdict::schema(),
                temperature: TEMPERATURE_RELEVANCE,
            },
        )
        .await?;

        state.is_relevant = Verdict::from_yes_no(&verdict.is_relevant);
        tracing::debug!(relevant = ?state.is_relevant, "relevance checked");
        Ok(())
    }

    async fn transform_into_sql(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        // Counted before generation so a failed attempt still counts.
        state.attempt_count += 1;

        let schema = self.schema_description(state).await?;
        let mut system_prompt = prompts::render(
            prompts::TRANSLATION_PROMPT,
            &[("db_schema", &state.schema_name), ("schema", &schema)],
        );

        // A close prior question becomes a worked example. A broken
        // history store only costs us the hint.
        match self.history.lock().await.nearest(&state.question).await {
            Ok(Some(hit)) if hit.distance <= self.settings.similarity_distance => {
                tracing::debug!(distance = hit.distance, "similar prior question found");
                system_prompt.push_str(&prompts::render(
                    prompts::SIMILAR_EXAMPLE_SUFFIX,
                    &[("sql", &hit.record.sql)],
                ));
            }
            Ok(_) => {}
            Err(e) => tracing::error!("history lookup failed: {}", e),
        }

        let user_prompt =
            prompts::render(prompts::QUESTION_USER_PROMPT, &[("question", &state.question)]);

        let translation: SqlTranslation = complete_typed(
            self.translator.as_ref(),
            CompletionRequest {
                system_prompt,
                user_prompt,
                response_name: SqlTranslation::NAME,
                response_schema: SqlTranslation::schema(),
                temperature: TEMPERATURE_TRANSLATION,
            },
        )
        .await?;

        state.candidate_sql = translation.sql_query;
        tracing::debug!(attempt = state.attempt_count, sql = %state.candidate_sql, "sql candidate generated");
        Ok(())
    }

    fn check_sql_is_allowed(&self, state: &mut RunState) {
        // Recomputed from the candidate every pass; never carried over
        // from a previous attempt.
        state.is_allowed = if govsql_policy::is_allowed_statement(&state.candidate_sql) {
            Verdict::Yes
        } else {
            Verdict::No
        };
        tracing::debug!(allowed = ?state.is_allowed, "statement classified");
    }

    async fn execute_query(&self, state: &mut RunState) {
        match self
            .backend
            .execute(&state.schema_name, &state.candidate_sql)
            .await
        {
            Ok(result) => {
                let mut rows = Vec::with_capacity(result.rows.len() + 1);
                rows.push(
                    result
                        .columns
                        .iter()
                        .map(|name| serde_json::Value::String(name.clone()))
                        .collect(),
                );
                rows.extend(result.rows);

                state.execution_rows = rows;
                state.row_count = result.row_count;
                state.execution_error = None;

                self.record_success(state).await;
            }
            Err(message) => {
                tracing::error!(error = %message, "sql execution failed");
                state.execution_error = Some(message);
            }
        }
    }

    /// Write-through after a successful execution: insert the pair, or
    /// touch the timestamp when the same question is already stored.
    /// Failures degrade translation quality but never the run.
    async fn record_success(&self, state: &RunState) {
        let mut history = self.history.lock().await;

        let probe = history
            .nearest_for(&state.question, &self.settings.user, &state.schema_name)
            .await;

        let outcome = match probe {
            Ok(Some(hit)) if hit.distance <= self.settings.near_duplicate_epsilon => {
                history.update_timestamp(&hit.record.id, Utc::now())
            }
            Ok(_) => history
                .insert(NewRecord {
                    question: state.question.clone(),
                    sql: state.candidate_sql.clone(),
                    schema_name: state.schema_name.clone(),
                    user: self.settings.user.clone(),
                    origin: RecordOrigin::Interactive,
                })
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            tracing::error!("history write-through failed: {}", e);
        }
    }

    async fn correct_query(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let user_prompt =
            prompts::render(prompts::CORRECTION_REQUEST, &[("question", &state.question)]);

        let rewrite: RewrittenQuestion = complete_typed(
            self.translator.as_ref(),
            CompletionRequest {
                system_prompt: prompts::CORRECTION_PROMPT.to_string(),
                user_prompt,
                response_name: RewrittenQuestion::NAME,
                response_schema: RewrittenQuestion::schema(),
                temperature: TEMPERATURE_REWRITE,
            },
        )
        .await?;

        tracing::debug!(rewritten = %rewrite.new_question, "question reformulated");
        state.question = rewrite.new_question;
        Ok(())
    }

    async fn show_answer(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let schema = self.schema_description(state).await?;
        let system_prompt = prompts::render(
            prompts::RENDER_PROMPT,
            &[("db_schema", &state.schema_name), ("schema", &schema)],
        );

        let result_set = serde_json::to_string(&state.execution_rows).unwrap_or_default();
        let user_prompt = prompts::render(prompts::RENDER_REQUEST, &[("result_set", &result_set)]);

        let rendered: RenderedTable = complete_typed(
            self.renderer.as_ref(),
            CompletionRequest {
                system_prompt,
                user_prompt,
                response_name: RenderedTable::NAME,
                response_schema: RenderedTable::schema(),
                temperature: TEMPERATURE_RENDERING,
            },
        )
        .await?;

        state.rendered_result = rendered.display_result;
        Ok(())
    }

    /// Phrase one of the fixed terminal explanations for the user.
    async fn phrase_info(
        &self,
        state: &mut RunState,
        message: &str,
        temperature: f32,
    ) -> Result<(), WorkflowError> {
        let reply: InfoReply = complete_typed(
            self.translator.as_ref(),
            CompletionRequest {
                system_prompt: prompts::INFO_PROMPT.to_string(),
                user_prompt: prompts::render(
                    prompts::QUESTION_USER_PROMPT,
                    &[("question", message)],
                ),
                response_name: InfoReply::NAME,
                response_schema: InfoReply::schema(),
                temperature,
            },
        )
        .await?;

        state.info_message = reply.info;
        Ok(())
    }
}
