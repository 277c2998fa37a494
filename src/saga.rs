//! Ordered multi-document writes with compensations.
//!
//! Each successful step records how to undo it. When a later step fails the
//! recorded undos run newest first. If one of them fails too, the caller gets
//! `Error::PartialFailure` instead of the original error.

use std::future::Future;

use log::{error, warn};
use mongodb::bson::Document;

use crate::error::{Error, Result};
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    Delete {
        collection: &'static str,
        id: String,
    },
    RestoreFields {
        collection: &'static str,
        id: String,
        fields: Document,
    },
}

impl Compensation {
    async fn apply(&self, store: &dyn DocumentStore) -> Result<()> {
        match self {
            Compensation::Delete { collection, id } => store.delete(collection, id).await,
            Compensation::RestoreFields { collection, id, fields } => {
                store.update_fields(collection, id, fields.clone()).await
            }
        }
    }
}

pub struct Saga {
    operation: &'static str,
    completed: Vec<Compensation>,
}

impl Saga {
    pub fn new(operation: &'static str) -> Self {
        Self { operation, completed: Vec::new() }
    }

    pub fn record(&mut self, undo: Compensation) {
        self.completed.push(undo);
    }

    pub fn pending_compensations(&self) -> &[Compensation] {
        &self.completed
    }

    /// Runs `step`; on success remembers `undo`, on failure rolls back.
    pub async fn run<T, F>(
        &mut self,
        store: &dyn DocumentStore,
        step: F,
        undo: Option<Compensation>,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match step.await {
            Ok(value) => {
                if let Some(undo) = undo {
                    self.record(undo);
                }
                Ok(value)
            }
            Err(cause) => Err(self.abort(store, cause).await),
        }
    }

    pub async fn abort(&mut self, store: &dyn DocumentStore, cause: Error) -> Error {
        error!("{} failed: {}", self.operation, cause);
        let steps = std::mem::take(&mut self.completed);
        for undo in steps.into_iter().rev() {
            if let Err(e) = undo.apply(store).await {
                error!("{}: compensation {:?} failed: {}", self.operation, undo, e);
                return Error::PartialFailure {
                    operation: self.operation,
                    detail: format!("{}; rollback failed: {}", cause, e),
                };
            }
            warn!("{}: rolled back {:?}", self.operation, undo);
        }
        cause
    }
}
