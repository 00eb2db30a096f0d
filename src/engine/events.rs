//! Timeline events.

use serde::Serialize;
use std::sync::Arc;

use crate::model::{CheckResult, Status};

/// A status transition, or a message posted with a result.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    pub result: Arc<CheckResult>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    pub fn timestamp(&self) -> i64 {
        self.result.timestamp
    }

    pub fn is_message(&self) -> bool {
        self.message.is_some()
    }
}

/// Hands out event ids. Ids only ever grow.
#[derive(Debug)]
pub struct EventIds {
    next: u64,
}

impl Default for EventIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl EventIds {
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
