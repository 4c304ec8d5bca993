//! Thread reconstruction from flat audit-log entries.
//!
//! Threads are one level deep: a root (no parent) and the replies whose
//! parent is that root. Replies are ordered by timestamp ascending; entries
//! with a missing or unparseable timestamp sort first, and ties keep the
//! order the store returned them in.

use std::collections::HashSet;

use crate::core::model::QueryEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryThread {
    pub root: QueryEntry,
    pub replies: Vec<QueryEntry>,
    pub is_resolved: bool,
}

/// Every thread of a collection plus replies whose parent is missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThreadIndex {
    /// Roots ordered by timestamp ascending.
    pub threads: Vec<QueryThread>,
    pub orphans: Vec<QueryEntry>,
}

impl ThreadIndex {
    pub fn open_count(&self) -> usize {
        self.threads.iter().filter(|thread| !thread.is_resolved).count()
    }
}

/// Rebuild the thread rooted at `root_id`, or `None` if no query entry has
/// that id.
pub fn build_thread(entries: &[QueryEntry], root_id: &str) -> Option<QueryThread> {
    let root = entries
        .iter()
        .find(|entry| entry.action.is_query() && entry.id == root_id)?;

    let mut replies: Vec<QueryEntry> = entries
        .iter()
        .filter(|entry| entry.action.is_query() && entry.parent() == Some(root_id))
        .cloned()
        .collect();
    // Stable sort; `None` orders before any `Some`.
    replies.sort_by_key(|entry| entry.timestamp);

    Some(QueryThread {
        is_resolved: root.is_resolved(),
        root: root.clone(),
        replies,
    })
}

/// Group every query entry of a collection into threads.
///
/// Replies whose parent is not a root query entry in `entries` (a missing
/// id, or another reply in data written before replies were flattened) are
/// reported as orphans rather than dropped.
pub fn build_thread_index(entries: &[QueryEntry]) -> ThreadIndex {
    let queries: Vec<&QueryEntry> = entries.iter().filter(|e| e.action.is_query()).collect();

    let mut roots: Vec<&QueryEntry> = queries.iter().copied().filter(|e| e.parent().is_none()).collect();
    roots.sort_by_key(|entry| entry.timestamp);
    let root_ids: HashSet<&str> = roots.iter().map(|entry| entry.id.as_str()).collect();

    let threads = roots
        .into_iter()
        .filter_map(|root| build_thread(entries, &root.id))
        .collect();

    let mut orphans: Vec<QueryEntry> = queries
        .iter()
        .filter(|entry| entry.parent().is_some_and(|parent| !root_ids.contains(parent)))
        .map(|entry| (*entry).clone())
        .collect();
    orphans.sort_by_key(|entry| entry.timestamp);

    ThreadIndex { threads, orphans }
}

/// Id of the thread root that a reply to `target_id` should attach to.
///
/// Replying to a reply attaches to that reply's root, keeping threads one
/// level deep. Returns `None` when `target_id` is not a query entry.
pub fn reply_anchor<'a>(entries: &'a [QueryEntry], target_id: &str) -> Option<&'a QueryEntry> {
    let target = entries
        .iter()
        .find(|entry| entry.action.is_query() && entry.id == target_id)?;
    match target.parent() {
        None => Some(target),
        Some(parent) => entries
            .iter()
            .find(|entry| entry.action.is_query() && entry.id == parent)
            .or(Some(target)),
    }
}
