//! Form configuration resolvers and the validation entry point.
//!
//! A resolver turns a (client, product) pair into the ordered field list the
//! validation gate checks. Any resolver failure is reported as
//! [`WorkflowError::ConfigUnavailable`], distinct from a failing verdict.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::core::records::{self, Record, form_field};
use crate::core::validation::{
    DocumentLinks, FieldDescriptor, FieldType, ValidationVerdict, validate_mandatory_fields,
};
use crate::error::WorkflowError;
use crate::io::store::RecordStore;

const FORM_CONFIG_SCHEMA: &str = include_str!("../../schemas/form_config.schema.json");

#[async_trait]
pub trait FormConfigResolver: Send + Sync {
    /// Ordered fields for `client_id` applying for `product_id`. Field ids are
    /// unique within the returned list.
    async fn resolve(&self, client_id: &str, product_id: &str) -> Result<Vec<FieldDescriptor>>;
}

/// Resolve the field list and run the mandatory-field gate.
pub async fn validate<F: FormConfigResolver + ?Sized>(
    resolver: &F,
    form_data: &Map<String, Value>,
    client_id: &str,
    product_id: &str,
    documents: &DocumentLinks,
) -> Result<ValidationVerdict, WorkflowError> {
    let fields = resolver
        .resolve(client_id, product_id)
        .await
        .map_err(|err| WorkflowError::ConfigUnavailable {
            client_id: client_id.to_string(),
            product_id: product_id.to_string(),
            message: format!("{err:#}"),
        })?;
    debug!(client_id, product_id, fields = fields.len(), "form configuration resolved");
    Ok(validate_mandatory_fields(&fields, form_data, documents))
}

/// Reads field rows from the store's form-fields table.
///
/// A row applies when its `Product` is blank or equals the product, and its
/// `Client` is blank or equals the client. When several rows share a field id
/// the most specific wins (client beats product beats generic). Fields are
/// ordered by `Display Order`, then table order.
pub struct StoreFormResolver<S> {
    store: Arc<S>,
    table: String,
}

impl<S: RecordStore> StoreFormResolver<S> {
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

#[async_trait]
impl<S: RecordStore> FormConfigResolver for StoreFormResolver<S> {
    #[instrument(skip(self))]
    async fn resolve(&self, client_id: &str, product_id: &str) -> Result<Vec<FieldDescriptor>> {
        let rows = self
            .store
            .fetch_table(&self.table)
            .await
            .with_context(|| format!("fetch {}", self.table))?;
        Ok(fields_from_rows(&rows, client_id, product_id))
    }
}

/// Select and order the field rows that apply to a client/product pair.
pub fn fields_from_rows(rows: &[Record], client_id: &str, product_id: &str) -> Vec<FieldDescriptor> {
    let mut chosen: HashMap<String, (u8, usize, FieldDescriptor)> = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        let Some(id) = records::non_blank(row, form_field::FIELD_ID) else {
            warn!(row = index, "form field row without a field id; skipping");
            continue;
        };
        let Some(specificity) = row_specificity(row, client_id, product_id) else {
            continue;
        };
        let descriptor = FieldDescriptor {
            label: records::non_blank(row, form_field::LABEL).unwrap_or_else(|| id.clone()),
            field_type: FieldType::parse(
                &records::text(row, form_field::TYPE).unwrap_or_default(),
            ),
            mandatory: records::flag(row, form_field::MANDATORY),
            category: records::non_blank(row, form_field::CATEGORY),
            display_order: records::number(row, form_field::DISPLAY_ORDER)
                .map(|order| order as i64)
                .unwrap_or(i64::MAX),
            id: id.clone(),
        };
        match chosen.get(&id) {
            Some((existing, _, _)) if *existing > specificity => {}
            _ => {
                chosen.insert(id, (specificity, index, descriptor));
            }
        }
    }

    let mut ordered: Vec<(usize, FieldDescriptor)> = chosen
        .into_values()
        .map(|(_, index, descriptor)| (index, descriptor))
        .collect();
    ordered.sort_by(|(a_index, a), (b_index, b)| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a_index.cmp(b_index))
    });
    ordered.into_iter().map(|(_, descriptor)| descriptor).collect()
}

fn row_specificity(row: &Record, client_id: &str, product_id: &str) -> Option<u8> {
    let matches = |column: &str, wanted: &str| -> Option<bool> {
        match records::non_blank(row, column) {
            None => Some(false),
            Some(value) if value.trim().eq_ignore_ascii_case(wanted.trim()) => Some(true),
            Some(_) => None,
        }
    };
    let client_specific = matches(form_field::CLIENT, client_id)?;
    let product_specific = matches(form_field::PRODUCT, product_id)?;
    Some(u8::from(client_specific) * 2 + u8::from(product_specific))
}

#[derive(Debug, Clone, Deserialize)]
struct FormConfigFile {
    #[serde(default)]
    default: Vec<FieldDescriptor>,
    products: BTreeMap<String, ProductForm>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProductForm {
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    clients: BTreeMap<String, Vec<FieldDescriptor>>,
}

/// Form configuration loaded once from a JSON file.
///
/// Client overrides replace the product field with the same id or are
/// appended. Products without an entry fall back to `default`; if that is
/// empty too, resolution fails.
#[derive(Debug, Clone)]
pub struct FileFormResolver {
    config: FormConfigFile,
}

impl FileFormResolver {
    /// Load and schema-validate a form configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("load form config {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents).context("parse form config json")?;
        validate_schema(&value)?;
        let config: FormConfigFile =
            serde_json::from_value(value).context("deserialize form config")?;
        Ok(Self { config })
    }

    fn fields_for(&self, client_id: &str, product_id: &str) -> Result<Vec<FieldDescriptor>> {
        let Some(product) = self.config.products.get(product_id.trim()) else {
            if self.config.default.is_empty() {
                return Err(anyhow!("no form configuration for product '{product_id}'"));
            }
            return Ok(ordered_unique(self.config.default.clone()));
        };

        let mut fields = product.fields.clone();
        if let Some(overrides) = product.clients.get(client_id.trim()) {
            for field in overrides {
                match fields.iter().position(|existing| existing.id == field.id) {
                    Some(index) => fields[index] = field.clone(),
                    None => fields.push(field.clone()),
                }
            }
        }
        Ok(ordered_unique(fields))
    }
}

#[async_trait]
impl FormConfigResolver for FileFormResolver {
    async fn resolve(&self, client_id: &str, product_id: &str) -> Result<Vec<FieldDescriptor>> {
        self.fields_for(client_id, product_id)
    }
}

/// Stable sort by display order, keeping the last definition of a repeated id.
fn ordered_unique(fields: Vec<FieldDescriptor>) -> Vec<FieldDescriptor> {
    let mut unique: Vec<FieldDescriptor> = Vec::with_capacity(fields.len());
    for field in fields {
        match unique.iter().position(|existing| existing.id == field.id) {
            Some(index) => unique[index] = field,
            None => unique.push(field),
        }
    }
    unique.sort_by_key(|field| field.display_order);
    unique
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(FORM_CONFIG_SCHEMA).context("parse form config schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        return Err(anyhow!(
            "form config schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn ids(fields: &[FieldDescriptor]) -> Vec<&str> {
        fields.iter().map(|field| field.id.as_str()).collect()
    }

    #[test]
    fn store_rows_filter_and_order() {
        let rows = vec![
            row(json!({"Field ID": "income", "Field Label": "Income", "Field Type": "number", "Is Mandatory": "True", "Display Order": 2, "Product": "HL"})),
            row(json!({"Field ID": "PAN", "Field Label": "PAN Card", "Field Type": "file", "Is Mandatory": "True", "Display Order": 1})),
            row(json!({"Field ID": "car", "Field Label": "Car model", "Display Order": 0, "Product": "AUTO"})),
            row(json!({"Field ID": "gst", "Field Label": "GST", "Display Order": 0, "Client": "OTHER"})),
            row(json!({"Field Label": "no id"})),
        ];
        let fields = fields_from_rows(&rows, "C1", "HL");
        assert_eq!(ids(&fields), vec!["PAN", "income"]);
        assert_eq!(fields[0].field_type, FieldType::File);
        assert!(fields[0].mandatory);
        assert_eq!(fields[1].label, "Income");
    }

    /// A client-specific row overrides the generic row with the same id.
    #[test]
    fn client_row_overrides_generic() {
        let rows = vec![
            row(json!({"Field ID": "PAN", "Field Label": "PAN", "Is Mandatory": "False", "Display Order": 1})),
            row(json!({"Field ID": "PAN", "Field Label": "PAN (required)", "Is Mandatory": "True", "Display Order": 1, "Client": "C1"})),
        ];
        let for_c1 = fields_from_rows(&rows, "C1", "HL");
        assert_eq!(for_c1.len(), 1);
        assert!(for_c1[0].mandatory);

        let for_c2 = fields_from_rows(&rows, "C2", "HL");
        assert_eq!(for_c2.len(), 1);
        assert!(!for_c2[0].mandatory);
    }

    const FILE_CONFIG: &str = r#"{
        "default": [{"id": "name", "label": "Name", "type": "text", "mandatory": true}],
        "products": {
            "HL": {
                "fields": [
                    {"id": "income", "label": "Income", "type": "number", "mandatory": true, "display_order": 2},
                    {"id": "PAN", "label": "PAN Card", "type": "file", "mandatory": true, "display_order": 1}
                ],
                "clients": {
                    "C1": [
                        {"id": "income", "label": "Income", "type": "number", "mandatory": false, "display_order": 2},
                        {"id": "gst", "label": "GST", "type": "text", "mandatory": true, "display_order": 3}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn file_resolver_applies_client_overrides() {
        let resolver = FileFormResolver::from_json(FILE_CONFIG).expect("load");
        let fields = resolver.fields_for("C1", "HL").expect("fields");
        assert_eq!(ids(&fields), vec!["PAN", "income", "gst"]);
        assert!(!fields[1].mandatory);

        let generic = resolver.fields_for("C2", "HL").expect("fields");
        assert_eq!(ids(&generic), vec!["PAN", "income"]);
        assert!(generic[1].mandatory);
    }

    #[test]
    fn file_resolver_falls_back_to_default() {
        let resolver = FileFormResolver::from_json(FILE_CONFIG).expect("load");
        let fields = resolver.fields_for("C1", "PL").expect("fields");
        assert_eq!(ids(&fields), vec!["name"]);
    }

    #[test]
    fn file_resolver_rejects_schema_violations() {
        let err = FileFormResolver::from_json(r#"{"products": {"HL": {"fields": [{"id": "x"}]}}}"#)
            .expect_err("schema");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn file_resolver_load_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forms.json");
        fs::write(&path, FILE_CONFIG).expect("write");
        let resolver = FileFormResolver::load(&path).expect("load");
        assert_eq!(resolver.fields_for("C9", "HL").expect("fields").len(), 2);
    }

    /// Unknown products without a default are a configuration failure.
    #[tokio::test]
    async fn validate_reports_config_unavailable() {
        let resolver =
            FileFormResolver::from_json(r#"{"products": {}}"#).expect("load");
        let err = validate(&resolver, &Map::new(), "C1", "HL", &DocumentLinks::new())
            .await
            .expect_err("unavailable");
        assert!(matches!(err, WorkflowError::ConfigUnavailable { .. }));
    }

    #[tokio::test]
    async fn validate_runs_gate_on_resolved_fields() {
        let resolver = FileFormResolver::from_json(FILE_CONFIG).expect("load");
        let form = json!({"income": 50000}).as_object().cloned().unwrap_or_default();
        let verdict = validate(&resolver, &form, "C2", "HL", &DocumentLinks::new())
            .await
            .expect("verdict");
        assert!(!verdict.passed);
        assert_eq!(verdict.missing_ids(), vec!["PAN"]);
        assert_eq!(verdict.missing[0].label, "PAN Card");
    }
}
