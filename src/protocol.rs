//! Messages exchanged between actors and the coordinator.
//!
//! The contract is transport-agnostic. Actors send [`Request`]s; the
//! coordinator answers with [`Notice`]s addressed to one actor each. GRANT is
//! the only reply to an accepted ACQUIRE. A rejected ACQUIRE is answered with
//! [`Reply::Rejected`] so the caller is never left waiting, and a recovery
//! victim is told [`Reply::Terminated`]. RELEASE has no reply.

use crate::table::ActorId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Acquire,
    Release,
    Shutdown,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Acquire => write!(f, "ACQUIRE"),
            RequestKind::Release => write!(f, "RELEASE"),
            RequestKind::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// A message from an actor (or the simulation driver) to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    pub actor: ActorId,
    /// Absent for SHUTDOWN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Request {
    pub fn acquire(actor: ActorId, resource: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Acquire,
            actor,
            resource: Some(resource.into()),
        }
    }

    pub fn release(actor: ActorId, resource: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Release,
            actor,
            resource: Some(resource.into()),
        }
    }

    pub fn shutdown() -> Self {
        Self {
            kind: RequestKind::Shutdown,
            actor: 0,
            resource: None,
        }
    }
}

/// A message from the coordinator to one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    Grant { resource: String },
    Rejected { resource: String, reason: String },
    Terminated,
}

/// A reply together with the actor it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub actor: ActorId,
    pub reply: Reply,
}

impl Notice {
    pub fn grant(actor: ActorId, resource: impl Into<String>) -> Self {
        Self {
            actor,
            reply: Reply::Grant {
                resource: resource.into(),
            },
        }
    }

    pub fn rejected(
        actor: ActorId,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            reply: Reply::Rejected {
                resource: resource.into(),
                reason: reason.into(),
            },
        }
    }

    pub fn terminated(actor: ActorId) -> Self {
        Self {
            actor,
            reply: Reply::Terminated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_has_no_resource() {
        let request = Request::shutdown();
        assert_eq!(request.kind, RequestKind::Shutdown);
        assert!(request.resource.is_none());

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"kind":"SHUTDOWN","actor":0}"#);
    }

    #[test]
    fn request_kinds_display_as_message_names() {
        assert_eq!(RequestKind::Acquire.to_string(), "ACQUIRE");
        assert_eq!(RequestKind::Release.to_string(), "RELEASE");
    }

    #[test]
    fn reply_is_tagged_by_kind() {
        let json = serde_json::to_string(&Reply::Grant {
            resource: "A".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"GRANT","resource":"A"}"#);

        let json = serde_json::to_string(&Reply::Terminated).unwrap();
        assert_eq!(json, r#"{"kind":"TERMINATED"}"#);
    }
}
