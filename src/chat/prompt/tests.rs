use super::*;
use crate::chat::transcript::Transcript;

#[test]
fn system_prompt_requires_answer_structure() {
    assert!(DEFAULT_SYSTEM_PROMPT.starts_with("You are an expert assistant in MITRE ATT&CK."));
    assert!(DEFAULT_SYSTEM_PROMPT.contains("\n1. Relevant technique:"));
    assert!(DEFAULT_SYSTEM_PROMPT.contains("\n2. Explanation:"));
    assert!(DEFAULT_SYSTEM_PROMPT.contains("\n3. Mitigations:"));
}

#[test]
fn history_skips_system_turns() {
    let mut transcript = Transcript::new(20);
    transcript.push(Role::User, "What is T1059?");
    transcript.push(Role::Assistant, "A scripting technique.");

    assert_eq!(
        render_history(transcript.turns()),
        "User: What is T1059?\nAssistant: A scripting technique."
    );
    assert_eq!(render_history(Transcript::new(20).turns()), "");
}

#[test]
fn prompt_layout() {
    let prompt = build_prompt(
        "SYSTEM",
        "User: hi\nAssistant: hello",
        "Technique: X (ID: T1)",
        "How is it detected?",
    );

    assert_eq!(
        prompt,
        "SYSTEM\n\nConversation history:\nUser: hi\nAssistant: hello\n\n\
         Relevant context:\nTechnique: X (ID: T1)\n\nQuestion: How is it detected?"
    );
}

#[test]
fn empty_sections_keep_their_headers() {
    let prompt = build_prompt("SYSTEM", "", "", "q?");
    assert_eq!(
        prompt,
        "SYSTEM\n\nConversation history:\n\n\nRelevant context:\n\n\nQuestion: q?"
    );
}
