//! Query text helpers for the catalog's full-text and LIKE lookups.

/// Columns that hold paths. They are stored for display and lookup but never
/// take part in term matching, otherwise every directory name would match.
pub const EXCLUDED_COLUMNS: &[&str] = &["path", "album_relative_path"];

/// Wrap a raw FTS5 expression so it is evaluated against every column except
/// the path-like ones.
pub fn match_expression(query: &str) -> String {
    format!("- {{{}}} : ({})", EXCLUDED_COLUMNS.join(" "), query.trim())
}

/// Turn free user text into a single FTS5 phrase. Double quotes cannot be
/// escaped inside a phrase, so they become single quotes.
pub fn phrase_query(text: &str) -> String {
    format!("\"{}\"", text.trim().replace('"', "'"))
}

/// Build a `%substring%` pattern for `LIKE ... ESCAPE '\'` that matches the
/// text literally.
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
