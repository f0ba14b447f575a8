//! Prompt construction and output clean-up for the two LLM calls.
//!
//! Everything here is deterministic: the same state always yields the same
//! prompt, and [`clean_sql`] is idempotent.

pub const DEFAULT_SYSTEM_PREAMBLE: &str =
    "You are an SQL expert for the connected database. You have permission to query.";

pub const SQL_RULES: &str = "Rule: Return ONLY SQL. No markdown. No semicolon. Generate the SQL with proper aliases so that we do not get Ambiguous column names error.";

pub const ANSWER_INSTRUCTIONS: &str = "You are a data analyst. Provide a clear, natural language answer to the user's question using ONLY the following database results.";

const FENCE: &str = "```";

// Info strings stripped after an opening fence. Any other word is kept as SQL.
const SQL_LANGUAGE_TAGS: [&str; 8] = [
    "sql",
    "sqlite",
    "postgresql",
    "postgres",
    "mysql",
    "plsql",
    "tsql",
    "oracle",
];

/// Appended to the question when the previous attempt failed.
pub fn error_context(error: &str) -> String {
    format!(
        "\n\nPREVIOUS ERROR: {error}\nINSTRUCTION: Fix the SQL to avoid this error. Check table definitions carefully."
    )
}

pub fn sql_prompt(
    preamble: &str,
    schema_info: &str,
    question: &str,
    error: Option<&str>,
) -> String {
    let error_context = error.map(error_context).unwrap_or_default();
    format!(
        "{preamble}\n\nSchema: {schema_info}\nQuestion: {question}{error_context}\n\n{SQL_RULES}\nSQL:"
    )
}

pub fn answer_prompt(question: &str, db_result: &str) -> String {
    format!(
        "{ANSWER_INSTRUCTIONS}\n\nUser Question: {question}\nDatabase Result: {db_result}\n\nFinal Answer:"
    )
}

/// Strips Markdown code fences (with their language tag) and trailing
/// statement terminators from raw model output.
pub fn clean_sql(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    while let Some(start) = text.find(FENCE) {
        let after = start + FENCE.len();
        let tag_len = language_tag_len(&text[after..]);
        text.replace_range(start..after + tag_len, "");
    }
    text.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

fn language_tag_len(rest: &str) -> usize {
    let word_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    let word = &rest[..word_len];
    if word_len > 0 && SQL_LANGUAGE_TAGS.iter().any(|tag| word.eq_ignore_ascii_case(tag)) {
        word_len
    } else {
        0
    }
}
