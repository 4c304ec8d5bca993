//! Query metadata embedded in the free-text message column.
//!
//! Wire format: `[[parent:<entryId>]][[status:<open|resolved>]] <message>`.
//! Writers always emit the parent token first (omitted for roots), then the
//! status token, then one space, then the body. Readers accept tokens in any
//! order but only as one contiguous leading run; the first whitespace ends
//! it. Unknown or malformed tokens are ignored and plain text without tokens
//! is an open root.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::QueryStatus;
use crate::error::WorkflowError;

const PARENT_KEY: &str = "parent";
const STATUS_KEY: &str = "status";

/// Decoded form of a message column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryContent {
    pub parent: Option<String>,
    pub status: QueryStatus,
    pub message: String,
}

impl QueryContent {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Serialize a new query message. Blank messages are rejected.
pub fn build_content(
    message: &str,
    parent: Option<&str>,
    status: QueryStatus,
) -> Result<String, WorkflowError> {
    if message.trim().is_empty() {
        return Err(WorkflowError::EmptyMessage);
    }
    Ok(encode(parent, status, message))
}

/// Decode a message column. Never fails.
pub fn parse_content(raw: &str) -> QueryContent {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\[\[([A-Za-z_]+):([^\[\]]*)\]\]").unwrap());

    let mut parent: Option<String> = None;
    let mut status: Option<QueryStatus> = None;
    let mut rest = raw;
    let mut saw_token = false;

    while let Some(caps) = TOKEN_RE.captures(rest) {
        saw_token = true;
        let key = caps[1].to_ascii_lowercase();
        let value = caps[2].trim();
        match key.as_str() {
            PARENT_KEY if parent.is_none() && !value.is_empty() => {
                parent = Some(value.to_string());
            }
            STATUS_KEY if status.is_none() => status = QueryStatus::parse(value),
            _ => {}
        }
        rest = &rest[caps[0].len()..];
    }

    if saw_token {
        rest = rest.strip_prefix(' ').unwrap_or(rest);
    }

    QueryContent {
        parent,
        status: status.unwrap_or_default(),
        message: rest.to_string(),
    }
}

/// Rewrite the status token, keeping the parent reference and message as-is.
pub fn update_status(raw: &str, status: QueryStatus) -> String {
    let content = parse_content(raw);
    encode(content.parent.as_deref(), status, &content.message)
}

/// Parent entry id embedded in `raw`, if any.
pub fn parent_id(raw: &str) -> Option<String> {
    parse_content(raw).parent
}

fn encode(parent: Option<&str>, status: QueryStatus, message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 48);
    if let Some(parent) = parent {
        out.push_str("[[");
        out.push_str(PARENT_KEY);
        out.push(':');
        out.push_str(parent);
        out.push_str("]]");
    }
    out.push_str("[[");
    out.push_str(STATUS_KEY);
    out.push(':');
    out.push_str(status.as_str());
    out.push_str("]] ");
    out.push_str(message);
    out
}
