//! Error types for interlock.
//!
//! Uses thiserror for derive macros. Protocol violations are ordinary values
//! here: the coordinator logs and rejects them, it never aborts on them.

use crate::exit_codes;
use crate::ledger::PairState;
use crate::table::ActorId;
use thiserror::Error;

/// Main error type for interlock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterlockError {
    /// A request named a resource that is not in the table.
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    /// A request came from an actor the coordinator was not configured with.
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),

    /// ACQUIRE for a resource the actor already holds.
    #[error("train {actor} already holds {resource}")]
    AlreadyHeld { actor: ActorId, resource: String },

    /// RELEASE for a resource the actor does not hold.
    #[error("train {actor} does not hold {resource}")]
    NotHeld { actor: ActorId, resource: String },

    /// ACQUIRE for a resource the actor is already waiting on.
    #[error("train {actor} already has a pending request for {resource}")]
    AlreadyRequested { actor: ActorId, resource: String },

    /// Request from an actor that was terminated as a recovery victim.
    #[error("train {0} was terminated and may not issue requests")]
    ActorTerminated(ActorId),

    /// Ledger bookkeeping was asked for a transition its current state forbids.
    #[error("invalid ledger transition for train {actor} on {resource} (currently {state})")]
    InvalidTransition {
        actor: ActorId,
        resource: String,
        state: PairState,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("{0}")]
    ConfigError(String),

    /// An input file could not be read or failed validation.
    #[error("{0}")]
    ParseError(String),

    /// User provided invalid arguments or a file operation failed.
    #[error("{0}")]
    UserError(String),

    /// The simulation threads could not be driven to completion.
    #[error("simulation failed: {0}")]
    SimulationError(String),
}

impl InterlockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterlockError::ConfigError(_) | InterlockError::ParseError(_) => {
                exit_codes::INPUT_FAILURE
            }
            InterlockError::SimulationError(_) | InterlockError::InvalidTransition { .. } => {
                exit_codes::SIMULATION_FAILURE
            }
            _ => exit_codes::USER_ERROR,
        }
    }

    /// Whether this error is a caller protocol violation: reported, rejected,
    /// and otherwise harmless to the coordinator.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            InterlockError::UnknownResource(_)
                | InterlockError::UnknownActor(_)
                | InterlockError::AlreadyHeld { .. }
                | InterlockError::NotHeld { .. }
                | InterlockError::AlreadyRequested { .. }
                | InterlockError::ActorTerminated(_)
        )
    }
}

/// Result type alias for interlock operations.
pub type Result<T> = std::result::Result<T, InterlockError>;
