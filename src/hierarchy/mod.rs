//! Hierarchy builder: division outline for the map stage, article
//! segmentation and paragraph trees for the extract stage.

mod articles;
mod outline;
mod paragraphs;
mod patterns;

#[cfg(test)]
mod tests;

pub use articles::{ArticleDraft, ExtractOptions, SourceExtraction, extract_articles};
pub use outline::build_skeleton;
pub use patterns::LinePatterns;

use crate::util::normalize_whitespace;

/// Feeds a line following a division heading that carried no name. Returns
/// `None` when the line is not part of the name, otherwise whether further
/// lines may still extend it (long uppercase names wrap).
fn absorb_name_line(name: &mut String, line: &str) -> Option<bool> {
    let line = normalize_whitespace(line);
    if line.is_empty() {
        return Some(name.is_empty());
    }
    let uppercase = !line.chars().any(char::is_lowercase);

    if name.is_empty() {
        *name = line;
        return Some(uppercase && !name.ends_with('.'));
    }
    if !uppercase {
        return None;
    }

    name.push(' ');
    name.push_str(&line);
    Some(!line.ends_with('.'))
}
