use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::Question;
use crate::validation::FieldErrors;

/// Trailing window for the "popular searches" aggregate.
pub const POPULAR_SEARCH_WINDOW_DAYS: i64 = 30;
pub const POPULAR_SEARCH_LIMIT: i64 = 10;

/// Which fields a free-text query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIn {
    #[default]
    All,
    Title,
    Content,
    Answer,
    Tags,
    Files,
}

impl SearchIn {
    pub fn parse(raw: Option<&str>) -> Result<Self, FieldErrors> {
        match raw.map(str::trim).unwrap_or("") {
            "" | "all" => Ok(SearchIn::All),
            "title" => Ok(SearchIn::Title),
            "content" => Ok(SearchIn::Content),
            "answer" => Ok(SearchIn::Answer),
            "tags" => Ok(SearchIn::Tags),
            "files" => Ok(SearchIn::Files),
            other => Err(FieldErrors::single(
                "search_in",
                format!("Select a valid choice. '{other}' is not one of the available choices."),
            )),
        }
    }

    pub fn includes(&self, field: SearchIn) -> bool {
        *self == SearchIn::All || *self == field
    }
}

pub fn popular_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(POPULAR_SEARCH_WINDOW_DAYS)
}

/// Case-insensitive containment of `query` in the selected fields.
/// `file_names` are the display names of the question's attachments.
pub fn question_matches(question: &Question, file_names: &[&str], query: &str, fields: SearchIn) -> bool {
    let needle = query.to_lowercase();
    let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);

    (fields.includes(SearchIn::Title) && hit(&question.title))
        || (fields.includes(SearchIn::Content) && hit(&question.content))
        || (fields.includes(SearchIn::Answer) && hit(&question.answer))
        || (fields.includes(SearchIn::Tags) && question.tags.iter().any(|t| hit(t)))
        || (fields.includes(SearchIn::Files) && file_names.iter().any(|n| hit(n)))
}

/// Escape `%`, `_` and `\` for a SQL `LIKE`/`ILIKE` pattern and wrap it for
/// substring matching.
pub fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
