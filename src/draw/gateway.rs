use serde::{Deserialize, Serialize};

use crate::domain::DrawCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GatewayState {
    Idle,
    InFlight { command: DrawCommand, ticket: u64 },
    /// The reveal request returned; waiting for its animation pipeline.
    AwaitingPipeline,
}

/// Proof that a command was admitted; required to settle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandTicket {
    pub command: DrawCommand,
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{0} request still in flight")]
    CommandInFlight(DrawCommand),
    #[error("reveal animation still in progress")]
    AnimationInProgress,
    #[error("drawing engine disposed")]
    Disposed,
}

/// Transient, dismissible command failure surfaced to the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub command: DrawCommand,
    pub message: String,
}

#[derive(Debug)]
pub struct CommandGateway {
    state: GatewayState,
    next_ticket: u64,
    last_error: Option<CommandFailure>,
}

impl Default for CommandGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandGateway {
    pub fn new() -> Self {
        Self {
            state: GatewayState::Idle,
            next_ticket: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn last_error(&self) -> Option<&CommandFailure> {
        self.last_error.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.state != GatewayState::Idle
    }

    /// Whether `command` would be admitted right now.
    pub fn can_issue(&self, command: DrawCommand, pipeline_busy: bool) -> bool {
        self.admission(command, pipeline_busy).is_ok()
    }

    /// Admits `command` and locks the gateway.
    ///
    /// A reset is admitted while an animation pipeline runs, since it is the
    /// recovery path; start and reveal are not. Nothing is admitted while
    /// another request is in flight.
    pub fn try_issue(
        &mut self,
        command: DrawCommand,
        pipeline_busy: bool,
    ) -> Result<CommandTicket, GatewayError> {
        self.admission(command, pipeline_busy)?;
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.state = GatewayState::InFlight { command, ticket: id };
        self.last_error = None;
        Ok(CommandTicket { command, id })
    }

    pub fn is_current(&self, ticket: &CommandTicket) -> bool {
        matches!(self.state, GatewayState::InFlight { ticket: id, .. } if id == ticket.id)
    }

    /// Settles a successful request. Stays locked while `pipeline_busy`.
    pub fn succeeded(&mut self, ticket: &CommandTicket, pipeline_busy: bool) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = if pipeline_busy {
            GatewayState::AwaitingPipeline
        } else {
            GatewayState::Idle
        };
        true
    }

    /// Settles a failed request and restores issuability.
    pub fn failed(
        &mut self,
        ticket: &CommandTicket,
        message: impl Into<String>,
        pipeline_busy: bool,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.last_error = Some(CommandFailure {
            command: ticket.command,
            message: message.into(),
        });
        self.state = if pipeline_busy {
            GatewayState::AwaitingPipeline
        } else {
            GatewayState::Idle
        };
        true
    }

    /// Returns `true` if this unlocked the gateway.
    pub fn pipeline_drained(&mut self) -> bool {
        if self.state == GatewayState::AwaitingPipeline {
            self.state = GatewayState::Idle;
            return true;
        }
        false
    }

    pub fn dismiss_error(&mut self) -> bool {
        self.last_error.take().is_some()
    }

    /// Drops any in-flight request so its late completion is ignored.
    pub fn abandon(&mut self) {
        self.state = GatewayState::Idle;
        self.last_error = None;
    }

    fn admission(&self, command: DrawCommand, pipeline_busy: bool) -> Result<(), GatewayError> {
        match self.state {
            GatewayState::InFlight { command: current, .. } => {
                Err(GatewayError::CommandInFlight(current))
            }
            _ if command == DrawCommand::Reset => Ok(()),
            GatewayState::AwaitingPipeline => Err(GatewayError::AnimationInProgress),
            GatewayState::Idle if pipeline_busy => Err(GatewayError::AnimationInProgress),
            GatewayState::Idle => Ok(()),
        }
    }
}
