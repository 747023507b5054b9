//! Conversation workflow: a two-phase turn machine around one model call.
//!
//! A turn starts in [`TurnPhase::AwaitingResponse`] once the user message
//! has been validated and ends in [`TurnPhase::Done`] whether the model
//! answered or not. State is committed only when a turn succeeds.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TurnError;
use crate::handler;
use crate::model::{ChatMessage, ChatState, GenerationParams, Role};
use crate::model_client::{ModelClient, ModelRequest};

const EXIT_KEYWORDS: [&str; 3] = ["quit", "exit", "bye"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingResponse,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    UserSubmitted,
    ResponseReceived,
    RequestFailed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    End,
}

pub fn transition(phase: TurnPhase, event: TurnEvent) -> TurnPhase {
    match (phase, event) {
        (TurnPhase::Done, TurnEvent::UserSubmitted) => TurnPhase::AwaitingResponse,
        (
            TurnPhase::AwaitingResponse,
            TurnEvent::ResponseReceived | TurnEvent::RequestFailed | TurnEvent::Cancelled,
        ) => TurnPhase::Done,
        (phase, _) => phase,
    }
}

/// Decides whether a line of user input should start a turn or end the
/// session. Blank input and the exit keywords end it.
pub fn decide(input: &str) -> Continuation {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || EXIT_KEYWORDS
            .iter()
            .any(|keyword| trimmed.eq_ignore_ascii_case(keyword))
    {
        return Continuation::End;
    }
    Continuation::Continue
}

pub struct ChatWorkflow<C> {
    client: C,
    params: GenerationParams,
    system_prompt: Option<ChatMessage>,
    state: ChatState,
    phase: TurnPhase,
}

impl<C> ChatWorkflow<C>
where
    C: ModelClient,
{
    pub fn new(client: C, cfg: &Config) -> Self {
        Self::with_params(client, cfg.generation_params(), &cfg.system_prompt)
    }

    pub fn with_params(client: C, params: GenerationParams, system_prompt: &str) -> Self {
        let system_prompt = handler::validate_content(system_prompt)
            .ok()
            .map(ChatMessage::system);
        Self {
            client,
            params,
            system_prompt,
            state: ChatState::new(),
            phase: TurnPhase::Done,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Runs one turn: appends `user_input`, asks the model, appends the
    /// reply. On any error the conversation is left exactly as it was.
    pub async fn submit(&mut self, user_input: &str) -> Result<ChatMessage, TurnError> {
        if self.state.is_finished() {
            return Err(TurnError::SessionEnded);
        }
        if self.phase == TurnPhase::AwaitingResponse {
            // A previous submit future was dropped without cancel_pending.
            self.apply(TurnEvent::Cancelled);
        }

        let pending = handler::append(&self.state, Role::User, user_input)?;
        self.apply(TurnEvent::UserSubmitted);

        let mut outbound = Vec::with_capacity(pending.len() + 1);
        outbound.extend(self.system_prompt.iter().cloned());
        outbound.extend_from_slice(pending.messages());
        debug!(
            model = %self.params.model,
            history_len = pending.len(),
            "awaiting model response"
        );

        let result = self
            .client
            .complete(ModelRequest {
                messages: &outbound,
                params: &self.params,
            })
            .await;
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.apply(TurnEvent::RequestFailed);
                warn!(error = %err, "model call failed; conversation unchanged");
                return Err(err.into());
            }
        };

        let committed = match handler::append(&pending, Role::Assistant, reply.content()) {
            Ok(committed) => committed,
            Err(err) => {
                self.apply(TurnEvent::RequestFailed);
                return Err(err.into());
            }
        };
        self.state = committed;
        self.apply(TurnEvent::ResponseReceived);
        debug!(history_len = self.state.len(), "turn completed");
        Ok(reply)
    }

    /// Marks a turn whose submit future was dropped as finished.
    pub fn cancel_pending(&mut self) {
        self.apply(TurnEvent::Cancelled);
    }

    pub fn finish(&mut self) {
        self.state.mark_finished();
        info!(history_len = self.state.len(), "conversation finished");
    }

    pub fn reset(&mut self) {
        self.state = ChatState::new();
        self.phase = TurnPhase::Done;
    }

    fn apply(&mut self, event: TurnEvent) {
        let next = transition(self.phase, event);
        debug!(from = ?self.phase, to = ?next, event = ?event, "turn transition");
        self.phase = next;
    }
}
