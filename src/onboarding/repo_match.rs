//! Resolve a user-typed repository reference against `owner/repo` candidates.

/// Repo-name segment of `owner/repo` (the whole string if there is no `/`).
fn repo_segment(full_name: &str) -> &str {
    full_name.rsplit('/').next().unwrap_or(full_name)
}

/// Return the single candidate `items` selects, or `None` on zero or several.
fn unique<'a>(mut items: impl Iterator<Item = &'a String>) -> Option<&'a String> {
    let first = items.next()?;
    match items.next() {
        Some(_) => None,
        None => Some(first),
    }
}

/// Match `input` to one of `candidates`.
///
/// Markdown emphasis (`*`, `**`) is stripped and the comparison is
/// case-insensitive. Tiers, first success wins:
/// 1. exact `owner/repo` match;
/// 2. exact repo-name match, only if exactly one candidate has that name;
/// 3. substring of the repo name, only if exactly one candidate contains it.
///
/// Ambiguity at a tier yields `None` rather than a guess.
pub fn match_repo_name(input: &str, candidates: &[String]) -> Option<String> {
    let needle = input.replace('*', "").trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(exact) = candidates.iter().find(|c| c.to_lowercase() == needle) {
        return Some(exact.clone());
    }

    let by_name: Vec<&String> = candidates
        .iter()
        .filter(|c| repo_segment(c).to_lowercase() == needle)
        .collect();
    if !by_name.is_empty() {
        return unique(by_name.into_iter()).cloned();
    }

    unique(
        candidates
            .iter()
            .filter(|c| repo_segment(c).to_lowercase().contains(&needle)),
    )
    .cloned()
}
