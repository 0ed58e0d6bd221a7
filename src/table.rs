//! Resource table: per-resource capacity and current holders.
//!
//! This is the domain model of "who holds what". It carries no OS locking of
//! its own; the coordinator guards the whole table behind one mutex so that
//! the detector always sees a consistent picture across every resource.
//!
//! # Resource Kinds
//!
//! - **Exclusive** (capacity 1): granted only while nobody holds it.
//! - **Shared** (capacity > 1): granted while `holders < capacity`.

use crate::error::{InterlockError, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Actor (train) identifier. Assigned `1..=n` in route-file order.
pub type ActorId = u32;

/// Column index of a resource in the table and in the ledger matrices.
pub type ResourceId = usize;

/// Whether a resource behaves like a mutex or a counting semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Exclusive,
    Shared,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Exclusive => write!(f, "exclusive"),
            ResourceKind::Shared => write!(f, "shared"),
        }
    }
}

/// A named, capacity-limited resource (an intersection).
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub capacity: u32,
    holders: BTreeSet<ActorId>,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            holders: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        if self.capacity == 1 {
            ResourceKind::Exclusive
        } else {
            ResourceKind::Shared
        }
    }

    pub fn holders(&self) -> &BTreeSet<ActorId> {
        &self.holders
    }

    pub fn is_held_by(&self, actor: ActorId) -> bool {
        self.holders.contains(&actor)
    }

    /// Units not currently held.
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.holders.len() as u32)
    }

    fn has_room(&self) -> bool {
        match self.kind() {
            ResourceKind::Exclusive => self.holders.is_empty(),
            ResourceKind::Shared => (self.holders.len() as u32) < self.capacity,
        }
    }
}

/// Outcome of [`ResourceTable::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted,
    /// At capacity. Not an error: the caller waits for a release.
    Blocked,
}

/// Outcome of [`ResourceTable::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The caller was not a holder. Nothing changed.
    NotHeld,
}

/// The fixed set of resources for a run.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    resources: Vec<Resource>,
    index: HashMap<String, ResourceId>,
}

impl ResourceTable {
    /// Build a table from `(name, capacity)` pairs. Column order follows the
    /// input order. A repeated name keeps its first column and takes the
    /// later capacity.
    pub fn new<I, S>(specs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, capacity) in specs {
            let name = name.into();
            match table.index.get(&name) {
                Some(&id) => table.resources[id].capacity = capacity,
                None => {
                    table.index.insert(name.clone(), table.resources.len());
                    table.resources.push(Resource::new(name, capacity));
                }
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve a resource name to its column.
    pub fn lookup(&self, name: &str) -> Result<ResourceId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| InterlockError::UnknownResource(name.to_string()))
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn name(&self, id: ResourceId) -> &str {
        self.resources
            .get(id)
            .map(|r| r.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.resources.iter().enumerate()
    }

    /// Try to take one unit of `id` for `actor`.
    ///
    /// Acquiring a resource the actor already holds is a protocol error and
    /// leaves the table untouched.
    pub fn try_acquire(&mut self, actor: ActorId, id: ResourceId) -> Result<AcquireOutcome> {
        let resource = self.resource_mut(id)?;
        if resource.is_held_by(actor) {
            return Err(InterlockError::AlreadyHeld {
                actor,
                resource: resource.name.clone(),
            });
        }
        if !resource.has_room() {
            return Ok(AcquireOutcome::Blocked);
        }
        resource.holders.insert(actor);
        Ok(AcquireOutcome::Granted)
    }

    /// Give back the unit of `id` held by `actor`.
    pub fn release(&mut self, actor: ActorId, id: ResourceId) -> Result<ReleaseOutcome> {
        let resource = self.resource_mut(id)?;
        if resource.holders.remove(&actor) {
            Ok(ReleaseOutcome::Released)
        } else {
            Ok(ReleaseOutcome::NotHeld)
        }
    }

    /// Resources currently held by `actor`, in column order.
    pub fn held_by(&self, actor: ActorId) -> Vec<ResourceId> {
        self.iter()
            .filter(|(_, r)| r.is_held_by(actor))
            .map(|(id, _)| id)
            .collect()
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| InterlockError::UnknownResource(format!("#{}", id)))
    }
}
