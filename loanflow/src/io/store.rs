//! Record store gateway abstraction.
//!
//! The [`RecordStore`] trait decouples workflow orchestration from the remote
//! store. The store has no queries, joins or transactions: callers fetch a
//! whole table and post whole records. Posting a record whose `id` matches an
//! existing row overwrites that row; posting without an `id` creates a new one.
//! Timeouts and retries belong to implementations, not callers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::core::records::{self, Record};
use crate::error::StoreError;

/// Response to a successful post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostedRecord {
    pub id: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record of `table`, in store order.
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    /// Create or overwrite (matched by `id`) one record.
    async fn post_record(&self, table: &str, record: Record) -> Result<PostedRecord, StoreError>;
}

/// Fetch `table` and return the record whose `id` is `id`.
pub async fn fetch_by_id<S: RecordStore + ?Sized>(
    store: &S,
    table: &str,
    id: &str,
) -> Result<Option<Record>, StoreError> {
    let rows = store.fetch_table(table).await?;
    Ok(rows
        .into_iter()
        .find(|record| records::id(record).as_deref() == Some(id)))
}

/// Decode a table payload into records.
///
/// Accepts a bare array or an object wrapping the array under `records`.
/// Rows shaped `{ "id": ..., "fields": { ... } }` are flattened so the id sits
/// beside the columns.
pub fn decode_table_payload(table: &str, payload: Value) -> Result<Vec<Record>, StoreError> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(mut wrapper) => match wrapper.remove("records") {
            Some(Value::Array(rows)) => rows,
            Some(_) | None => {
                return Err(StoreError::Decode {
                    table: table.to_string(),
                    message: "expected an array or an object with a `records` array".to_string(),
                });
            }
        },
        _ => {
            return Err(StoreError::Decode {
                table: table.to_string(),
                message: "expected an array or an object with a `records` array".to_string(),
            });
        }
    };

    rows.into_iter()
        .map(|row| match row {
            Value::Object(mut object) => {
                if let Some(Value::Object(fields)) = object.remove("fields") {
                    for (key, value) in fields {
                        object.entry(key).or_insert(value);
                    }
                }
                Ok(object)
            }
            other => Err(StoreError::Decode {
                table: table.to_string(),
                message: format!("row is not an object: {other}"),
            }),
        })
        .collect()
}
