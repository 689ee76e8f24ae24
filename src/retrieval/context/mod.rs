// Rendering of retrieved chunks into the prompt's context block


use itertools::Itertools;

use crate::database::SearchResult;

/// Placeholder for any missing or empty field
pub const NOT_AVAILABLE: &str = "Not available";

/// Context used for a turn whose retrieval failed
pub const RETRIEVAL_ERROR_CONTEXT: &str = "Error retrieving context information.";

fn or_not_available(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        NOT_AVAILABLE
    } else {
        trimmed
    }
}

fn list_or_not_available(values: &[String]) -> String {
    let joined = values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .join(", ");
    if joined.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        joined
    }
}

/// Render one retrieved chunk. Every line is always present.
#[inline]
pub fn render_block(result: &SearchResult) -> String {
    let meta = &result.metadata;

    let mitigations = if meta.mitigations.is_empty() {
        format!("- {}", NOT_AVAILABLE)
    } else {
        meta.mitigations
            .iter()
            .map(|m| {
                format!(
                    "- {}: {}",
                    or_not_available(&m.name),
                    or_not_available(&m.description)
                )
            })
            .join("\n")
    };

    format!(
        "Technique: {name} (ID: {id})\n\
         Tactics: {tactics}\n\
         Description: {description}\n\
         Detection: {detection}\n\
         Data sources: {datasources}\n\
         Required permissions: {permissions}\n\
         Mitigation methods:\n\
         {mitigations}\n\
         URL: {url}",
        name = or_not_available(&meta.name),
        id = or_not_available(&meta.technique_id),
        tactics = list_or_not_available(&meta.tactics),
        description = or_not_available(&result.content),
        detection = or_not_available(meta.detection.as_deref().unwrap_or_default()),
        datasources = list_or_not_available(&meta.datasources),
        permissions = list_or_not_available(&meta.permissions_required),
        url = or_not_available(&meta.url),
    )
}

/// Blocks in rank order separated by a blank line; no results renders as ""
#[inline]
pub fn render_context(results: &[SearchResult]) -> String {
    results.iter().map(render_block).join("\n\n")
}
