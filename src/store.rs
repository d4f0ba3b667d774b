//! Experiment data store
//!
//! Trial records live in a key-value store partitioned by identity ID and sorted by
//! `experimentDateTime` (`<experiment>|<timestamp>`). Participants are known to the
//! study by a short human ID, which maps to a user ID and from there to the identity
//! the data is stored under.

use crate::error::CogError;
use crate::types::TrialRecord;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Continuation cursor returned with a page; `None` once the query is exhausted
pub type Cursor = Option<usize>;

/// One page of a paginated query
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Cursor,
}

/// A registered study participant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub human_id: String,
    pub user_id: String,
}

/// Operations needed from the experiment store.
///
/// Implementations report failures as [`CogError::Store`].
pub trait ExperimentStore {
    /// Scan users whose human ID equals `human_id`, one page at a time.
    fn scan_users(&self, human_id: &str, start: Cursor) -> Result<Page<UserRecord>, CogError>;

    /// Identity the user's experiment data is stored under, if they have any data.
    fn identity_for_user(&self, user_id: &str) -> Result<Option<String>, CogError>;

    /// Records for an identity whose sort key starts with `prefix`, one page at a time.
    fn query_experiment(
        &self,
        identity_id: &str,
        prefix: &str,
        start: Cursor,
    ) -> Result<Page<TrialRecord>, CogError>;
}

/// Resolve a human ID to a user ID; exactly one user must match.
pub fn resolve_user(store: &dyn ExperimentStore, human_id: &str) -> Result<String, CogError> {
    let mut matches = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.scan_users(human_id, cursor)?;
        matches.extend(page.items);
        cursor = page.next;
        if cursor.is_none() {
            break;
        }
    }
    match matches.as_slice() {
        [user] => Ok(user.user_id.clone()),
        _ => Err(CogError::store(
            format!("resolve user {}", human_id),
            format!("expected one user, found {}", matches.len()),
        )),
    }
}

/// Resolve a human ID all the way to the identity the data is stored under.
pub fn resolve_identity(store: &dyn ExperimentStore, human_id: &str) -> Result<String, CogError> {
    let user_id = resolve_user(store, human_id)?;
    store.identity_for_user(&user_id)?.ok_or_else(|| {
        CogError::store(
            format!("resolve identity {}", human_id),
            format!("no experiment data for user {}", user_id),
        )
    })
}

/// Fetch every record for an experiment, following cursors until exhausted.
pub fn fetch_all(
    store: &dyn ExperimentStore,
    identity_id: &str,
    experiment: &str,
) -> Result<Vec<TrialRecord>, CogError> {
    let mut records = Vec::new();
    let mut cursor = None;
    let mut pages = 0usize;
    loop {
        let page = store.query_experiment(identity_id, experiment, cursor)?;
        pages += 1;
        records.extend(page.items);
        cursor = page.next;
        if cursor.is_none() {
            break;
        }
    }
    debug!(identity_id, experiment, pages, records = records.len(), "Fetched experiment data");
    Ok(records)
}

/// Store backed by JSON exports of the users and experiment-data tables
#[derive(Debug, Clone)]
pub struct JsonExportStore {
    users: Vec<UserRecord>,
    experiments: Vec<TrialRecord>,
    page_size: usize,
}

impl JsonExportStore {
    /// Build a store from in-memory tables. Experiment records are kept in sort-key order.
    pub fn new(users: Vec<UserRecord>, mut experiments: Vec<TrialRecord>, page_size: usize) -> Self {
        experiments.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Self {
            users,
            experiments,
            page_size: page_size.max(1),
        }
    }

    /// Load the two table exports, each a JSON array.
    pub fn load(users_file: &Path, experiments_file: &Path, page_size: usize) -> Result<Self, CogError> {
        let users: Vec<UserRecord> = serde_json::from_str(&read(users_file)?)
            .map_err(|e| CogError::store(format!("load {}", users_file.display()), e))?;
        let experiments = TrialRecord::parse_array(&read(experiments_file)?)
            .map_err(|e| CogError::store(format!("load {}", experiments_file.display()), e))?;
        Ok(Self::new(users, experiments, page_size))
    }

    fn page<T: Clone>(&self, items: Vec<&T>, start: Cursor) -> Page<T> {
        let offset = start.unwrap_or(0);
        let end = (offset + self.page_size).min(items.len());
        let page: Vec<T> = items
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|item| (*item).clone())
            .collect();
        Page {
            items: page,
            next: (end < items.len()).then_some(end),
        }
    }
}

fn read(path: &Path) -> Result<String, CogError> {
    fs::read_to_string(path).map_err(|e| CogError::store(format!("read {}", path.display()), e))
}

fn sort_key(record: &TrialRecord) -> (&str, &str) {
    let identity = record.get("identityId").and_then(|v| v.as_str()).unwrap_or("");
    let key = record.get("experimentDateTime").and_then(|v| v.as_str()).unwrap_or("");
    (identity, key)
}

impl ExperimentStore for JsonExportStore {
    fn scan_users(&self, human_id: &str, start: Cursor) -> Result<Page<UserRecord>, CogError> {
        // Scans page over the whole table and are filtered afterwards; pages may come back short.
        let offset = start.unwrap_or(0);
        let end = (offset + self.page_size).min(self.users.len());
        let items = self
            .users
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .filter(|u| u.human_id == human_id)
            .cloned()
            .collect();
        Ok(Page {
            items,
            next: (end < self.users.len()).then_some(end),
        })
    }

    fn identity_for_user(&self, user_id: &str) -> Result<Option<String>, CogError> {
        Ok(self
            .experiments
            .iter()
            .find(|r| r.user_id() == Some(user_id))
            .and_then(|r| r.get("identityId"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    fn query_experiment(
        &self,
        identity_id: &str,
        prefix: &str,
        start: Cursor,
    ) -> Result<Page<TrialRecord>, CogError> {
        let matching: Vec<&TrialRecord> = self
            .experiments
            .iter()
            .filter(|r| {
                let (identity, key) = sort_key(r);
                identity == identity_id && key.starts_with(prefix)
            })
            .collect();
        Ok(self.page(matching, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user(human: &str, user: &str) -> UserRecord {
        UserRecord {
            human_id: human.to_string(),
            user_id: user.to_string(),
        }
    }

    fn trial(identity: &str, user: &str, key: &str) -> TrialRecord {
        TrialRecord::from(json!({
            "identityId": identity,
            "userId": user,
            "experimentDateTime": key,
            "results": {}
        }))
    }

    fn store(page_size: usize) -> JsonExportStore {
        let users = vec![user("AvidJar", "u-1"), user("BoldCup", "u-2"), user("Twin", "u-3"), user("Twin", "u-4")];
        let mut experiments = Vec::new();
        for i in 0..5 {
            experiments.push(trial("id-1", "u-1", &format!("panas|2023-03-0{}T10:00:00.000Z", i + 1)));
        }
        experiments.push(trial("id-1", "u-1", "n-back|2023-03-01T11:00:00.000Z"));
        experiments.push(trial("id-2", "u-2", "panas|2023-03-01T10:00:00.000Z"));
        JsonExportStore::new(users, experiments, page_size)
    }

    #[test]
    fn test_fetch_all_follows_cursor() {
        let store = store(2);
        let records = fetch_all(&store, "id-1", "panas").unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(
            records[0].get("experimentDateTime").unwrap(),
            "panas|2023-03-01T10:00:00.000Z"
        );

        let first = store.query_experiment("id-1", "panas", None).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next, Some(2));
    }

    #[test]
    fn test_resolve_identity() {
        let store = store(1);
        assert_eq!(resolve_user(&store, "BoldCup").unwrap(), "u-2");
        assert_eq!(resolve_identity(&store, "AvidJar").unwrap(), "id-1");
    }

    #[test]
    fn test_resolve_requires_exactly_one_user() {
        let store = store(3);
        let none = resolve_user(&store, "Nobody").unwrap_err();
        assert!(none.is_remote());
        let many = resolve_user(&store, "Twin").unwrap_err();
        assert!(many.to_string().contains("found 2"));
    }

    #[test]
    fn test_user_without_data_has_no_identity() {
        let store = store(10);
        assert_eq!(store.identity_for_user("u-3").unwrap(), None);
        assert!(resolve_identity(&store, "Twin").is_err());
    }

    #[test]
    fn test_load_missing_export_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonExportStore::load(&dir.path().join("users.json"), &dir.path().join("x.json"), 10)
            .unwrap_err();
        assert!(err.is_remote());
    }
}
