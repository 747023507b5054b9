use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::model::ChatMessage;
use crate::model_client::ModelClient;
use crate::workflow::{ChatWorkflow, Continuation, decide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    BlankLine,
    ExitKeyword,
    EndOfInput,
    Interrupted,
}

/// Drives one interactive conversation until the user leaves.
///
/// `interrupt` resolves when the session should stop immediately; it is
/// raced against both reading input and a pending model call.
pub async fn run_session<C, R, W, I>(
    workflow: &mut ChatWorkflow<C>,
    mut input: R,
    out: &mut W,
    interrupt: I,
) -> Result<SessionEnd>
where
    C: ModelClient,
    R: AsyncBufRead + Unpin,
    W: Write,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut raw = Vec::new();

    writeln!(out, "Chat agent started! Type 'quit' to exit.")?;
    writeln!(out, "model: {}", workflow.params().model)?;
    writeln!(
        out,
        "'/history' shows the conversation, '/reset' starts over, an empty line ends the session"
    )?;

    loop {
        write!(out, "\nYou: ")?;
        out.flush().context("Failed to flush stdout")?;

        raw.clear();
        let read = tokio::select! {
            read = input.read_until(b'\n', &mut raw) => read.context("Failed to read stdin")?,
            _ = &mut interrupt => {
                return interrupted(workflow, out);
            }
        };
        if read == 0 {
            writeln!(out)?;
            info!("input closed; ending session");
            return Ok(SessionEnd::EndOfInput);
        }
        let Ok(line) = std::str::from_utf8(&raw) else {
            warn!(bytes = raw.len(), "discarding input line that is not valid UTF-8");
            writeln!(out, "Error: input was not valid UTF-8")?;
            continue;
        };

        let prompt = line.trim();
        if decide(prompt) == Continuation::End {
            workflow.finish();
            return Ok(if prompt.is_empty() {
                SessionEnd::BlankLine
            } else {
                SessionEnd::ExitKeyword
            });
        }
        if prompt.eq_ignore_ascii_case("/reset") {
            workflow.reset();
            writeln!(out, "conversation reset")?;
            continue;
        }
        if prompt.eq_ignore_ascii_case("/history") {
            print_history(out, workflow.state().messages())?;
            continue;
        }

        let outcome = tokio::select! {
            result = workflow.submit(prompt) => Some(result),
            _ = &mut interrupt => None,
        };
        match outcome {
            Some(Ok(reply)) => writeln!(out, "Assistant: {}", reply.content().trim())?,
            Some(Err(err)) => {
                warn!(error = %err, "turn failed");
                writeln!(out, "Error: {err}")?;
            }
            None => {
                workflow.cancel_pending();
                return interrupted(workflow, out);
            }
        }
    }
}

fn interrupted<C, W>(workflow: &mut ChatWorkflow<C>, out: &mut W) -> Result<SessionEnd>
where
    C: ModelClient,
    W: Write,
{
    workflow.finish();
    writeln!(out, "\nChat session ended by user.")?;
    out.flush().context("Failed to flush stdout")?;
    Ok(SessionEnd::Interrupted)
}

fn print_history<W: Write>(out: &mut W, history: &[ChatMessage]) -> Result<()> {
    if history.is_empty() {
        writeln!(out, "(history is empty)")?;
        return Ok(());
    }

    for (idx, msg) in history.iter().enumerate() {
        writeln!(out, "[{}] {}: {}", idx, msg.role().as_str(), msg.content())?;
    }
    Ok(())
}
