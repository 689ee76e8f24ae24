// Single-message prompt assembly

#[cfg(test)]
mod tests;

use itertools::Itertools;

use super::transcript::{Role, Turn};

/// Persona and answer structure placed at the top of every prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert assistant in MITRE ATT&CK. \
Provide clear and precise information about attack techniques, tactics, and countermeasures \
based on the MITRE knowledge base. You can also remember relevant details from the conversation \
to respond more efficiently and contextually in case previously seen cases are asked about. \
Use simple and direct language to save tokens. When responding, follow this structure:\n\
1. Relevant technique: Identify the technique or techniques related to the query. \
Provide the name, technique ID, and associated tactic.\n\
2. Explanation: Describe how the scenario relates to the identified MITRE ATT&CK technique.\n\
3. Mitigations: Provide specific and practical steps to mitigate risks related to the technique.\n\
Structure your responses clearly and professionally, focusing on the user's needs.\n\
Use simple, clear, and direct language to ensure the user can easily implement the recommendations.";

/// `User: …` / `Assistant: …` lines; system turns are left out
#[inline]
pub fn render_history<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> String {
    turns
        .into_iter()
        .filter(|turn| turn.role != Role::System)
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .join("\n")
}

#[inline]
pub fn build_prompt(system_prompt: &str, history: &str, context: &str, question: &str) -> String {
    format!(
        "{}\n\nConversation history:\n{}\n\nRelevant context:\n{}\n\nQuestion: {}",
        system_prompt, history, context, question
    )
}
