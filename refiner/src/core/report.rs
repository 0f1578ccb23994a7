//! Reporter output classification.

use crate::core::normalize::strip_code_fences;
use crate::core::types::Report;

/// Prefix marking a reporter line as the next problem statement.
pub const REFINEMENT_MARKER: &str = "REFINEMENT:";

/// Classify reporter text into a [`Report`].
///
/// Returns `None` for output the loop cannot use: empty text, or a marker
/// with nothing after it. The caller substitutes its default refinement.
pub fn parse_report(raw: &str) -> Option<Report> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return None;
    }
    match text.strip_prefix(REFINEMENT_MARKER) {
        Some(rest) => {
            let statement = rest.trim();
            if statement.is_empty() {
                None
            } else {
                Some(Report::Refinement(statement.to_string()))
            }
        }
        None => Some(Report::Plain(text)),
    }
}
