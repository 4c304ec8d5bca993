//! Test-only helpers: an in-memory record store, a fixed form resolver and
//! record fixtures.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::policy::WorkflowPolicy;
use crate::core::records::{self, Record};
use crate::core::types::Status;
use crate::core::validation::{FieldDescriptor, FieldType};
use crate::error::StoreError;
use crate::io::config::TableNames;
use crate::io::forms::FormConfigResolver;
use crate::io::store::{PostedRecord, RecordStore};
use crate::workflow::Workflow;

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Record>>,
    next_id: u64,
    failing_posts: HashSet<String>,
    posts: Vec<(String, Record)>,
}

/// Record store backed by memory.
///
/// Tables keep insertion order. Posting a record whose `id` matches a row
/// replaces it in place; posting without one appends and assigns `rec<n>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert rows directly, bypassing failure injection and the post log.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Record>) {
        let mut tables = self.lock();
        tables.rows.entry(table.to_string()).or_default().extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Record> {
        self.rows(table)
            .into_iter()
            .find(|record| records::id(record).as_deref() == Some(id))
    }

    /// Make every later post to `table` fail with an HTTP 503.
    pub fn fail_posts_to(&self, table: &str) {
        self.lock().failing_posts.insert(table.to_string());
    }

    pub fn heal(&self) {
        self.lock().failing_posts.clear();
    }

    /// Number of successful posts to `table`.
    pub fn post_count(&self, table: &str) -> usize {
        self.lock().posts.iter().filter(|(t, _)| t == table).count()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self.rows(table))
    }

    async fn post_record(&self, table: &str, mut record: Record) -> Result<PostedRecord, StoreError> {
        let mut tables = self.lock();
        if tables.failing_posts.contains(table) {
            return Err(StoreError::Status {
                table: table.to_string(),
                status: 503,
                body: "injected failure".to_string(),
            });
        }

        let id = match records::id(&record) {
            Some(id) => id,
            None => {
                tables.next_id += 1;
                let id = format!("rec{}", tables.next_id);
                record.insert(records::ID.to_string(), Value::String(id.clone()));
                id
            }
        };
        tables.posts.push((table.to_string(), record.clone()));

        let rows = tables.rows.entry(table.to_string()).or_default();
        match rows
            .iter()
            .position(|row| records::id(row).as_deref() == Some(id.as_str()))
        {
            Some(index) => rows[index] = record,
            None => rows.push(record),
        }
        Ok(PostedRecord { id })
    }
}

/// Resolver returning the same field list for every client and product, or
/// failing when built with [`StaticForms::unavailable`].
#[derive(Debug, Clone, Default)]
pub struct StaticForms {
    fields: Option<Vec<FieldDescriptor>>,
}

impl StaticForms {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self {
            fields: Some(fields),
        }
    }

    pub fn unavailable() -> Self {
        Self { fields: None }
    }
}

#[async_trait]
impl FormConfigResolver for StaticForms {
    async fn resolve(&self, _client_id: &str, _product_id: &str) -> Result<Vec<FieldDescriptor>> {
        self.fields
            .clone()
            .ok_or_else(|| anyhow!("form configuration service unreachable"))
    }
}

/// Build an uncategorised field descriptor with display order 0.
pub fn field(id: &str, label: &str, field_type: FieldType, mandatory: bool) -> FieldDescriptor {
    FieldDescriptor {
        id: id.to_string(),
        label: label.to_string(),
        field_type,
        mandatory,
        category: None,
        display_order: 0,
    }
}

/// An application record owned by `client_id` with the given status and
/// form data.
pub fn application_record(id: &str, client_id: &str, status: Status, form_data: Value) -> Record {
    let value = json!({
        "id": id,
        "File ID": format!("SF-{id}"),
        "Client": client_id,
        "Applicant Name": "Asha Rao",
        "Loan Product": "business_loan",
        "Requested Loan Amount": 500000,
        "Form Data": form_data.to_string(),
        "Status": status.as_str(),
    });
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

/// A workflow over `store` and `forms` with the standard policy and default
/// table names.
pub fn workflow(store: Arc<MemoryStore>, forms: StaticForms) -> Workflow<MemoryStore, StaticForms> {
    Workflow::new(
        store,
        Arc::new(forms),
        Arc::new(WorkflowPolicy::standard()),
        TableNames::default(),
    )
}
