use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@(\w+)>").expect("mention pattern is a valid regex"));

fn mention_ids(text: &str) -> impl Iterator<Item = String> + '_ {
    MENTION_PATTERN.captures_iter(text).map(|captures| captures[1].to_owned())
}

/// Returns every `<@IDENTIFIER>` referenced in `text`, duplicates collapsed.
///
/// Set form for membership checks. The pipeline uses [`mentions_in_order`] because the
/// first mentioned bot becomes the `bot_id` identity key.
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    mention_ids(text).collect()
}

/// Same identifiers as [`extract_mentions`], in order of first appearance.
pub fn mentions_in_order(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    mention_ids(text).filter(|id| seen.insert(id.clone())).collect()
}
