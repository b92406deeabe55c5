//! Backup and restore of whole collections.
//!
//! A backup is a JSON array of prepared records with `_id` stripped. Restoring
//! replays every entry through the normal save pipeline, so records get fresh
//! ids and are validated again.

use tracing::{debug, info};

use kevlayer_core::{
    backend::{ID_FIELD, Record},
    collection::Collection,
    document::DocumentType,
    error::DocumentStoreResult,
};

/// Renders every record of the collection as a JSON array.
pub async fn export<D: DocumentType>(collection: &Collection<'_, D>) -> DocumentStoreResult<String> {
    let records: Vec<Record> = collection
        .objects()
        .into_vec()
        .await?
        .iter()
        .map(|document| document.to_backup_record())
        .collect();

    info!(collection = collection.name(), records = records.len(), "exported backup");
    Ok(serde_json::to_string(&records)?)
}

/// Saves every entry of a JSON backup as a new document, returning how many
/// were restored.
///
/// # Errors
///
/// Fails on malformed JSON, on entries that are not objects, and on the first
/// entry the save pipeline rejects. Entries before it stay saved.
pub async fn restore<D: DocumentType>(collection: &Collection<'_, D>, json: &str) -> DocumentStoreResult<usize> {
    let entries: Vec<Record> = serde_json::from_str(json)?;

    let mut restored = 0;
    for mut record in entries {
        record.remove(ID_FIELD);

        collection.create(record).await?;
        restored += 1;
    }

    debug!(collection = collection.name(), restored, "restored backup");
    Ok(restored)
}
