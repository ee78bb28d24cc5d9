//! Canonical form of free text for comparison.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const LEADING_ARTICLE: &str = "the ";

/// Lowercases, strips diacritics, collapses every run of non-alphanumeric
/// characters into one space, removes a leading "the " and trims.
///
/// - "Café Society" → "cafe society"
/// - "The Office (US)" → "office us"
/// - "  Grey's   Anatomy!" → "grey s anatomy"
///
/// The result is a fixed point: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    // Leading separators are dropped; a trailing one survives so that a
    // bare "the " still reads as the article.
    let mut collapsed = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_alphanumeric() {
            collapsed.push(c);
        } else if !collapsed.is_empty() && !collapsed.ends_with(' ') {
            collapsed.push(' ');
        }
    }

    // Stripping repeatedly keeps inputs like "the the office" stable under
    // a second pass.
    let mut rest = collapsed.as_str();
    while let Some(stripped) = rest.strip_prefix(LEADING_ARTICLE) {
        rest = stripped;
    }
    rest.trim_end().to_string()
}
