// Interactive question/answer loop over retrieval and the chat model


use console::style;
use std::future::Future;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::model::{ChatMessage, ChatModel};
use super::prompt::{build_prompt, render_history};
use super::transcript::{CheckpointStore, Role, Transcript};
use crate::config::ChatConfig;
use crate::retrieval::{RETRIEVAL_ERROR_CONTEXT, Retriever};
use crate::text::{MAX_QUERY_LENGTH, MIN_QUERY_LENGTH, QueryRejection, truncate_text, validate_query};
use crate::Result;

/// Prefix of the assistant turn recorded when the model call fails
pub const MODEL_ERROR_PREFIX: &str = "❌ Error calling language model:";
pub const FAREWELL: &str = "Thank you for using the MITRE ATT&CK Expert Chatbot. Goodbye!";
pub const INTERRUPTED: &str = "Session interrupted. Goodbye!";
pub const EMPTY_INPUT_HINT: &str = "Please enter a question or use an exit command.";

/// How long the runtime waits for abandoned blocking calls when the binary
/// exits
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Lines of user input, fed by [`spawn_line_reader`]
pub type LineReceiver = mpsc::Receiver<std::io::Result<String>>;

/// Read lines from `reader` on a dedicated thread. The thread stops at end of
/// input, on a read error (which is forwarded), or once the receiver is
/// dropped. It is never joined, so a read blocked on a terminal cannot hold
/// up process exit.
#[inline]
pub fn spawn_line_reader<R>(reader: R) -> LineReceiver
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(1);

    let spawned = std::thread::Builder::new()
        .name("input-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if sender.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start input reader: {}", e);
    }

    receiver
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Processing,
    Terminated,
}

/// What happened to one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered(String),
    /// The model call failed; holds the error turn that was recorded
    ModelFailed(String),
    Blank,
    Rejected(QueryRejection),
    Exit,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ExitCommand,
    EndOfInput,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub num_similar: usize,
    pub turn_timeout: Duration,
    pub max_history_turns: usize,
    pub system_prompt: String,
    pub exit_commands: Vec<String>,
}

impl SessionOptions {
    #[inline]
    pub fn from_config(config: &ChatConfig, num_similar: usize) -> Self {
        Self {
            num_similar,
            turn_timeout: Duration::from_secs(config.turn_timeout_secs),
            max_history_turns: config.max_history_turns,
            system_prompt: config.system_prompt.clone(),
            exit_commands: config.exit_commands.clone(),
        }
    }
}

impl Default for SessionOptions {
    #[inline]
    fn default() -> Self {
        Self::from_config(&ChatConfig::default(), crate::retrieval::DEFAULT_NUM_SIMILAR)
    }
}

pub struct ChatSession {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    options: SessionOptions,
    transcript: Transcript,
    state: SessionState,
    checkpoint: Option<(CheckpointStore, String)>,
}

impl ChatSession {
    #[inline]
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>, options: SessionOptions) -> Self {
        let transcript = Transcript::new(options.max_history_turns);
        Self {
            retriever,
            model,
            options,
            transcript,
            state: SessionState::AwaitingInput,
            checkpoint: None,
        }
    }

    /// Persist the transcript under `thread_id` after every turn, resuming
    /// it first if it was saved before
    #[inline]
    pub async fn with_checkpoint(mut self, store: CheckpointStore, thread_id: &str) -> Result<Self> {
        if let Some(transcript) = store
            .load(thread_id, self.options.max_history_turns)
            .await?
        {
            self.transcript = transcript;
        }
        self.checkpoint = Some((store, thread_id.to_string()));
        Ok(self)
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[inline]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    #[inline]
    pub fn is_exit_command(&self, input: &str) -> bool {
        let input = input.trim();
        self.options
            .exit_commands
            .iter()
            .any(|command| command.eq_ignore_ascii_case(input))
    }

    /// Process one line of input. Model and retrieval failures are recorded
    /// in the transcript rather than returned.
    #[inline]
    pub async fn handle_input(&mut self, input: &str) -> TurnOutcome {
        if self.state == SessionState::Terminated {
            return TurnOutcome::Exit;
        }

        let question = input.trim();
        if self.is_exit_command(question) {
            self.state = SessionState::Terminated;
            return TurnOutcome::Exit;
        }
        if question.is_empty() {
            return TurnOutcome::Blank;
        }
        if let Err(rejection) = validate_query(question, MIN_QUERY_LENGTH, MAX_QUERY_LENGTH) {
            debug!("Rejected input: {}", rejection);
            return TurnOutcome::Rejected(rejection);
        }

        self.state = SessionState::Processing;
        let history = render_history(self.transcript.conversation());

        let outcome = match tokio::time::timeout(
            self.options.turn_timeout,
            self.answer(question, &history),
        )
        .await
        {
            Ok(Ok(reply)) => TurnOutcome::Answered(reply),
            Ok(Err(e)) => TurnOutcome::ModelFailed(format!("{} {:#}", MODEL_ERROR_PREFIX, e)),
            Err(_) => TurnOutcome::ModelFailed(format!(
                "{} no response within {} seconds",
                MODEL_ERROR_PREFIX,
                self.options.turn_timeout.as_secs()
            )),
        };

        self.transcript.push(Role::User, question);
        match &outcome {
            TurnOutcome::Answered(reply) => self.transcript.push(Role::Assistant, reply.as_str()),
            TurnOutcome::ModelFailed(message) => {
                warn!("{}", message);
                self.transcript.push(Role::Assistant, message.as_str());
            }
            _ => {}
        }
        self.save_checkpoint().await;

        self.state = SessionState::AwaitingInput;
        outcome
    }

    async fn answer(&self, question: &str, history: &str) -> anyhow::Result<String> {
        let context = match self
            .retriever
            .build_context(question, self.options.num_similar)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!("Error building context: {}", e);
                RETRIEVAL_ERROR_CONTEXT.to_string()
            }
        };
        debug!("Context:\n{}", truncate_text(&context, 2000, "..."));

        let prompt = build_prompt(&self.options.system_prompt, history, &context, question);
        let model = Arc::clone(&self.model);
        let messages = vec![ChatMessage::system(prompt)];

        tokio::task::spawn_blocking(move || model.complete(&messages))
            .await
            .map_err(|e| anyhow::anyhow!("model task failed: {}", e))?
    }

    async fn save_checkpoint(&self) {
        if let Some((store, thread_id)) = &self.checkpoint {
            if let Err(e) = store.save(thread_id, &self.transcript).await {
                warn!("Failed to checkpoint thread {}: {}", thread_id, e);
            }
        }
    }

    /// Read questions line by line until an exit command, end of input or
    /// `interrupt` resolves. Answers and notices are written to `output`.
    #[inline]
    pub async fn run<W, I>(
        &mut self,
        mut input: LineReceiver,
        output: &mut W,
        interrupt: I,
    ) -> Result<SessionEnd>
    where
        W: Write + Send,
        I: Future<Output = ()> + Send,
    {
        tokio::pin!(interrupt);
        self.write_banner(output)?;

        let end = loop {
            write!(output, "\n{} ", style("You:").cyan().bold())?;
            output.flush()?;

            let line = tokio::select! {
                () = &mut interrupt => break SessionEnd::Interrupted,
                line = input.recv() => line.transpose()?,
            };
            let Some(line) = line else {
                writeln!(output)?;
                break SessionEnd::EndOfInput;
            };

            let outcome = tokio::select! {
                () = &mut interrupt => break SessionEnd::Interrupted,
                outcome = self.handle_input(&line) => outcome,
            };

            match outcome {
                TurnOutcome::Answered(reply) => {
                    writeln!(output, "\n{} {}", style("Assistant:").green().bold(), reply)?;
                }
                TurnOutcome::ModelFailed(message) => {
                    writeln!(output, "\n{} {}", style("Assistant:").green().bold(), message)?;
                }
                TurnOutcome::Blank => writeln!(output, "{}", style(EMPTY_INPUT_HINT).yellow())?,
                TurnOutcome::Rejected(reason) => {
                    writeln!(output, "{}", style(format!("⚠️ {}", reason)).yellow())?;
                }
                TurnOutcome::Exit => break SessionEnd::ExitCommand,
            }
        };

        self.state = SessionState::Terminated;
        let farewell = if end == SessionEnd::Interrupted {
            INTERRUPTED
        } else {
            FAREWELL
        };
        writeln!(output, "\n{} {}", style("Assistant:").green().bold(), farewell)?;
        output.flush()?;

        info!("Chat session ended: {:?}", end);
        Ok(end)
    }

    fn write_banner<W: Write>(&self, output: &mut W) -> Result<()> {
        let rule = "=".repeat(60);
        writeln!(output, "{}", rule)?;
        writeln!(output, "{}", style("MITRE ATT&CK EXPERT CHATBOT").bold())?;
        writeln!(output, "{}", rule)?;
        writeln!(
            output,
            "Ask me questions about tactics, techniques, or countermeasures."
        )?;
        writeln!(
            output,
            "End the session with: {}",
            self.options.exit_commands.join(", ")
        )?;
        writeln!(output, "{}", rule)?;
        Ok(())
    }
}
