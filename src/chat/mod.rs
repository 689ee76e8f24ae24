// Chat side of the pipeline: transcript, prompt, model client and session loop

pub mod model;
pub mod prompt;
pub mod session;
pub mod transcript;

pub use model::{ChatMessage, ChatModel, OpenAiChatModel};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, build_prompt, render_history};
pub use session::{
    ChatSession, LineReceiver, SHUTDOWN_GRACE, SessionEnd, SessionOptions, SessionState,
    TurnOutcome, spawn_line_reader,
};
pub use transcript::{CheckpointStore, Role, Transcript, Turn};
