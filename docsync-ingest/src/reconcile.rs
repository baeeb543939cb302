//! Record reconciliation
//!
//! Applies normalized records to the document store, one upsert per record,
//! keyed by the record's `_id: {"$oid": ...}` identifier.

use tracing::{debug, warn};

use crate::db::{DocumentStore, UpsertKind};
use crate::document::{Document, RecordId, Value};
use crate::error::{ImportError, ImportFailure};

/// Field holding the record identifier
pub const ID_FIELD: &str = "_id";

const OID_WRAPPER: &str = "$oid";

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { id: RecordId },
    Updated { id: RecordId },
    /// The record had no `_id: {"$oid": <string>}`; the store was not called
    SkippedNoIdentifier { position: usize },
}

impl UpsertOutcome {
    /// True for outcomes that wrote to the store
    pub fn is_upsert(&self) -> bool {
        !matches!(self, UpsertOutcome::SkippedNoIdentifier { .. })
    }
}

/// Outcomes of one upload, in record order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub outcomes: Vec<UpsertOutcome>,
}

impl ImportReport {
    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::Inserted { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::SkippedNoIdentifier { .. }))
    }

    fn count(&self, predicate: impl Fn(&UpsertOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}

/// Applies records to one collection of a store
pub struct Reconciler<'a, S: ?Sized> {
    store: &'a S,
    collection: &'a str,
}

impl<'a, S: DocumentStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, collection: &'a str) -> Self {
        Self { store, collection }
    }

    /// Upsert every qualifying record, strictly in order
    ///
    /// Stops at the first failing record. Upserts before it stay committed
    /// and are reported in [`ImportFailure::committed`].
    pub async fn reconcile(&self, records: Vec<Value>) -> Result<ImportReport, ImportFailure> {
        let mut report = ImportReport::default();

        for (position, record) in records.into_iter().enumerate() {
            match self.reconcile_record(position, record).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(source) => return Err(ImportFailure::at(position, report.outcomes, source)),
            }
        }

        Ok(report)
    }

    async fn reconcile_record(&self, position: usize, record: Value) -> Result<UpsertOutcome, ImportError> {
        let Some((id_text, body)) = split_identifier(record) else {
            warn!(
                position,
                collection = self.collection,
                "Skipping record without valid _id"
            );
            return Ok(UpsertOutcome::SkippedNoIdentifier { position });
        };

        let id: RecordId = id_text
            .parse()
            .map_err(|_| ImportError::InvalidIdentifier { value: id_text })?;

        let kind = self.store.upsert_by_id(self.collection, &id, &body).await?;
        debug!(
            position,
            %id,
            collection = self.collection,
            fields = body.len(),
            ?kind,
            "Record upserted"
        );

        Ok(match kind {
            UpsertKind::Inserted => UpsertOutcome::Inserted { id },
            UpsertKind::Updated => UpsertOutcome::Updated { id },
        })
    }
}

/// Split a qualifying record into its `$oid` text and the body without `_id`
///
/// Returns `None` when the record is not an object, has no `_id`, or its
/// `_id` is not an object carrying a string `$oid`.
fn split_identifier(record: Value) -> Option<(String, Document)> {
    let Value::Object(mut body) = record else {
        return None;
    };

    let id_text = body
        .get(ID_FIELD)?
        .as_object()?
        .get(OID_WRAPPER)?
        .as_str()?
        .to_string();
    body.shift_remove(ID_FIELD);

    Some((id_text, body))
}
