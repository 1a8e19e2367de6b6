//! Mutable run state threaded through the workflow

/// Three-valued check result. Steps write `Yes`/`No`; `Unset` means the
/// check has not run yet in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    Yes,
    No,
    #[default]
    Unset,
}

impl Verdict {
    pub fn is_yes(self) -> bool {
        self == Verdict::Yes
    }

    /// Interpret a model's textual YES/NO answer; anything that is not
    /// a case-insensitive "YES" counts as no.
    pub fn from_yes_no(answer: &str) -> Self {
        if answer.trim().eq_ignore_ascii_case("yes") {
            Verdict::Yes
        } else {
            Verdict::No
        }
    }
}

/// The single mutable record for one translation run.
///
/// Created once per incoming question, owned by the orchestrator for
/// the run's lifetime, and discarded after the terminal step returns.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Current natural-language question; rewritten on retry.
    pub question: String,
    /// Target database schema identifier.
    pub schema_name: String,
    /// Catalog description for `schema_name`, fetched once per run.
    pub schema_description: Option<String>,
    /// Most recently generated SQL statement.
    pub candidate_sql: String,
    /// Translation attempts so far; incremented only by the
    /// translation step.
    pub attempt_count: u32,
    pub is_relevant: Verdict,
    /// Recomputed from `candidate_sql` at the policy gate every pass.
    pub is_allowed: Verdict,
    /// Raw result rows of a successful execution, header row first.
    pub execution_rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    /// Last execution error, verbatim from the driver.
    pub execution_error: Option<String>,
    /// Derived solely from `execution_error`.
    pub sql_is_valid: Verdict,
    /// Final human-facing rendering (markdown).
    pub rendered_result: String,
    /// User-facing explanation, set only on terminal failure branches.
    pub info_message: String,
}

impl RunState {
    pub fn new(question: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            schema_name: schema_name.into(),
            schema_description: None,
            candidate_sql: String::new(),
            attempt_count: 0,
            is_relevant: Verdict::Unset,
            is_allowed: Verdict::Unset,
            execution_rows: Vec::new(),
            row_count: 0,
            execution_error: None,
            sql_is_valid: Verdict::Unset,
            rendered_result: String::new(),
            info_message: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parses_model_answers() {
        assert_eq!(Verdict::from_yes_no("YES"), Verdict::Yes);
        assert_eq!(Verdict::from_yes_no("yes"), Verdict::Yes);
        assert_eq!(Verdict::from_yes_no(" Yes "), Verdict::Yes);
        assert_eq!(Verdict::from_yes_no("NO"), Verdict::No);
        assert_eq!(Verdict::from_yes_no("maybe"), Verdict::No);
        assert_eq!(Verdict::from_yes_no(""), Verdict::No);
    }

    #[test]
    fn fresh_state_has_no_verdicts() {
        let state = RunState::new("how many users", "sales");

        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.is_relevant, Verdict::Unset);
        assert_eq!(state.is_allowed, Verdict::Unset);
        assert_eq!(state.sql_is_valid, Verdict::Unset);
        assert!(state.execution_error.is_none());
        assert!(state.schema_description.is_none());
    }
}
