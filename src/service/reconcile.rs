//! Snapshot diffing for the polling reconciler.
//!
//! Only status changes and membership changes count as deltas. A fetched status
//! that moves backwards (or out of a terminal state) is refused: the previously
//! known document is kept so observed statuses only ever move forward.
//! Rearmed ids (explicit requeues) may move backwards once.

use crate::types::{Document, DocumentStatus, Transition};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    Added(Document),
    StatusChanged {
        from: DocumentStatus,
        document: Document,
    },
    Removed(Document),
}

impl DocumentChange {
    pub fn document(&self) -> &Document {
        match self {
            Self::Added(d) | Self::Removed(d) => d,
            Self::StatusChanged { document, .. } => document,
        }
    }

    pub fn id(&self) -> &str {
        &self.document().id
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Candidate snapshot, in the order the server listed the documents.
    pub snapshot: Vec<Document>,
    pub changes: Vec<DocumentChange>,
    /// Ids whose fetched status was refused as a regression.
    pub refused: Vec<String>,
    /// Rearmed ids whose status moved; they are held to the forward rule again.
    pub rearm_consumed: Vec<String>,
}

impl Reconciliation {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

pub fn reconcile(
    previous: &[Document],
    fetched: Vec<Document>,
    rearmed: &HashSet<String>,
) -> Reconciliation {
    let known: HashMap<&str, &Document> = previous.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(fetched.len());
    let mut out = Reconciliation::default();

    for doc in fetched {
        if !seen.insert(doc.id.clone()) {
            continue;
        }
        let Some(prev) = known.get(doc.id.as_str()) else {
            out.changes.push(DocumentChange::Added(doc.clone()));
            out.snapshot.push(doc);
            continue;
        };
        let requeued = rearmed.contains(&doc.id);
        match prev.status.transition_to(doc.status) {
            Transition::Unchanged => out.snapshot.push(doc),
            Transition::Regression if requeued => {
                debug!(id = %doc.id, from = %prev.status, to = %doc.status, "accepting requeued status");
                out.rearm_consumed.push(doc.id.clone());
                out.changes.push(DocumentChange::StatusChanged {
                    from: prev.status,
                    document: doc.clone(),
                });
                out.snapshot.push(doc);
            }
            Transition::Forward => {
                if requeued {
                    out.rearm_consumed.push(doc.id.clone());
                }
                out.changes.push(DocumentChange::StatusChanged {
                    from: prev.status,
                    document: doc.clone(),
                });
                out.snapshot.push(doc);
            }
            Transition::Regression => {
                warn!(
                    id = %doc.id,
                    known = %prev.status,
                    fetched = %doc.status,
                    "ignoring status regression"
                );
                out.refused.push(doc.id);
                out.snapshot.push((*prev).clone());
            }
        }
    }

    out.changes.extend(
        previous
            .iter()
            .filter(|d| !seen.contains(&d.id))
            .cloned()
            .map(DocumentChange::Removed),
    );
    out
}
