//! Prompt templates
//!
//! Fixed texts parameterized by pure `{name}` substitution; no control
//! logic lives here. The translation and rendering prompts carry the
//! schema description; the terminal info instructions are constants.

/// Substitute `{name}` placeholders. Unknown placeholders are left in
/// place so a missing variable is visible in logs rather than silent.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut text = template.to_string();
    for (name, value) in vars {
        text = text.replace(&format!("{{{}}}", name), value);
    }
    text
}

/// System prompt for question-to-SQL translation.
pub const TRANSLATION_PROMPT: &str = r#"You are an expert SQL developer. You translate natural language questions into a single SQL statement for the database schema '{db_schema}'.

The schema contains the following tables and columns:

{schema}

Rules:
1. Generate exactly one SELECT statement answering the question.
2. Use only tables and columns that appear in the schema above.
3. Qualify table names with the schema name where ambiguous.
4. Prefer explicit column lists over SELECT * when the question names specific values.
5. Return ONLY the SQL statement, no commentary and no markdown fences.
"#;

/// Appended to the translation prompt when the history store holds a
/// sufficiently close prior question.
pub const SIMILAR_EXAMPLE_SUFFIX: &str = r#"
For a similar natural language question you have created the following SQL statement:

{sql}
"#;

/// User message wrapper shared by the translation-style calls.
pub const QUESTION_USER_PROMPT: &str = "Question: {question}";

/// System prompt for the relevance check.
pub const RELEVANCE_PROMPT: &str = r#"You are an assistant that checks if the given human question:

{question}

relates to the following database schema

{schema}

Answer with "YES" if the question relates to the given schema, otherwise answer with "NO", only!
"#;

/// System prompt for result rendering.
pub const RENDER_PROMPT: &str = r#"You present SQL query results to a human. The results come from the database schema '{db_schema}':

{schema}

Render the dataset you are given as a clean table in markdown syntax. The first row of the dataset holds the column names. Do not invent, drop or reorder values.
"#;

/// User message for result rendering; `{result_set}` is the raw row
/// data including the header row.
pub const RENDER_REQUEST: &str = r#"Transform the dataset below into a table in markdown syntax. For a result with one value only, build a table with one column:

{result_set}
"#;

/// System prompt for the question rewrite on retry.
pub const CORRECTION_PROMPT: &str =
    "You are a correcting assistant and re-write the question, but keep the semantics.";

/// User message for the question rewrite.
pub const CORRECTION_REQUEST: &str = "Rewrite the following question: {question}";

/// System prompt shared by the terminal info steps.
pub const INFO_PROMPT: &str = "You are an educative assistant who responds in a strict manner.";

/// Fixed context messages for the three terminal info steps.
pub const NOT_RELEVANT_MESSAGE: &str =
    "The human question and the database schema do not fit together!";
pub const UNABLE_CREATE_SQL_MESSAGE: &str =
    "The text-to-SQL tool cannot create a valid SQL statement; explain that the SQL dialect does not work.";
pub const QUERY_TYPE_MESSAGE: &str = "Explain: The SQL query type is not allowed.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_occurrences() {
        let text = render("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
        assert_eq!(text, "x and y and x");
    }

    #[test]
    fn render_leaves_unknown_placeholders_visible() {
        let text = render("{known} {unknown}", &[("known", "v")]);
        assert_eq!(text, "v {unknown}");
    }

    #[test]
    fn translation_prompt_takes_schema_description() {
        let text = render(
            TRANSLATION_PROMPT,
            &[("db_schema", "sales"), ("schema", "Table 'sales.users'")],
        );
        assert!(text.contains("'sales'"));
        assert!(text.contains("Table 'sales.users'"));
        assert!(!text.contains("{schema}"));
    }
}
