//! HTTP record store gateway.
//!
//! Talks to the store's table endpoints:
//! - `GET  {base_url}/tables/{table}` returns the table payload
//! - `POST {base_url}/tables/{table}` with a JSON record returns `{ "id": ... }`

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url, header};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::records::Record;
use crate::error::StoreError;
use crate::io::config::StoreConfig;
use crate::io::store::{PostedRecord, RecordStore, decode_table_payload};

#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    base_url: Url,
    http: Client,
}

impl HttpRecordStore {
    /// Build a client from config. The bearer token is read from the
    /// environment variable named by `api_key_env`, when set.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("parse store base_url '{}'", config.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("store base_url '{}' cannot be a base", config.base_url));
        }

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        match env::var(&config.api_key_env) {
            Ok(token) if !token.trim().is_empty() => {
                let value = header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                    .context("build authorization header")?;
                default_headers.insert(header::AUTHORIZATION, value);
            }
            _ => warn!(env = %config.api_key_env, "no store api key set; sending unauthenticated requests"),
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;

        Ok(Self { base_url, http })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Transport {
                table: table.to_string(),
                message: "base url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push("tables")
            .push(table);
        Ok(url)
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    #[instrument(skip(self))]
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let url = self.table_url(table)?;
        debug!(%url, "fetching table");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| transport(table, err))?;
        let payload: Value = read_json(table, response).await?;
        let rows = decode_table_payload(table, payload)?;
        debug!(rows = rows.len(), "table fetched");
        Ok(rows)
    }

    #[instrument(skip(self, record), fields(id = record.get("id").and_then(serde_json::Value::as_str)))]
    async fn post_record(&self, table: &str, record: Record) -> Result<PostedRecord, StoreError> {
        let url = self.table_url(table)?;
        debug!(%url, "posting record");
        let response = self
            .http
            .post(url)
            .json(&record)
            .send()
            .await
            .map_err(|err| transport(table, err))?;
        let payload: Value = read_json(table, response).await?;
        let id = payload
            .get("id")
            .and_then(|id| match id {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| StoreError::MissingId {
                table: table.to_string(),
            })?;
        Ok(PostedRecord { id })
    }
}

async fn read_json(table: &str, response: reqwest::Response) -> Result<Value, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(table, status = status.as_u16(), "record store request failed");
        return Err(StoreError::Status {
            table: table.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response.json::<Value>().await.map_err(|err| StoreError::Decode {
        table: table.to_string(),
        message: err.to_string(),
    })
}

fn transport(table: &str, err: reqwest::Error) -> StoreError {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    StoreError::Transport {
        table: table.to_string(),
        message,
    }
}
