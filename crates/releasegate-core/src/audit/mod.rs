//! Append-only history of promotions.

pub mod db;
pub mod store;

pub use db::RedbStore;
pub use store::{KeyPage, KvStore, MemoryStore, NoopStore, MAX_LIST_PAGE};

use crate::config::AuditConfig;
use crate::error::Result;
use crate::types::{DeployEvent, EVENT_KEY_PREFIX};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub app: Option<String>,
    pub env: Option<String>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => n.min(MAX_HISTORY_LIMIT),
            _ => DEFAULT_HISTORY_LIMIT,
        }
    }

    fn matches(&self, event: &DeployEvent) -> bool {
        let app_ok = self
            .app
            .as_deref()
            .filter(|a| !a.is_empty())
            .map_or(true, |a| event.app == a);
        let env_ok = self
            .env
            .as_deref()
            .filter(|e| !e.is_empty())
            .map_or(true, |e| event.env == e);
        app_ok && env_ok
    }
}

pub struct AuditLog {
    store: Box<dyn KvStore>,
}

impl AuditLog {
    pub fn new(store: impl KvStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Audit log that records nothing.
    pub fn disabled() -> Self {
        Self::new(NoopStore)
    }

    /// redb at `audit.path` when set, otherwise disabled.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        match &config.path {
            Some(path) => {
                tracing::info!("audit log at {}", path.display());
                Ok(Self::new(RedbStore::open(path)?))
            }
            None => {
                tracing::warn!("no audit store configured; deploy history disabled");
                Ok(Self::disabled())
            }
        }
    }

    pub fn append(&self, event: &DeployEvent) -> Result<String> {
        let key = event.store_key();
        let value = serde_json::to_vec(event)?;
        self.store.put(&key, &value)?;
        Ok(key)
    }

    /// Most-recent-first, filtered, bounded to [`MAX_HISTORY_LIMIT`].
    ///
    /// Every stored event is decoded and ordered by (ts, id) before filters
    /// and the limit apply; store key order is not relied on.
    pub fn list(&self, query: &HistoryQuery) -> Result<Vec<DeployEvent>> {
        let mut events = Vec::new();
        for key in self.all_keys()? {
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            match serde_json::from_slice::<DeployEvent>(&raw) {
                Ok(e) => events.push(e),
                Err(e) => tracing::warn!("skipping unreadable audit entry {key}: {e}"),
            }
        }
        events.sort_by(|a, b| (b.ts, b.id).cmp(&(a.ts, a.id)));

        Ok(events
            .into_iter()
            .filter(|e| query.matches(e))
            .take(query.effective_limit())
            .collect())
    }

    /// Delete every event. Returns how many keys were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        loop {
            // Deleting as we go means each pass restarts from the prefix.
            let page = self.store.list(EVENT_KEY_PREFIX, None, MAX_LIST_PAGE)?;
            if page.keys.is_empty() {
                break;
            }
            for key in &page.keys {
                self.store.delete(key)?;
                removed += 1;
            }
            if page.cursor.is_none() {
                break;
            }
        }
        Ok(removed)
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .list(EVENT_KEY_PREFIX, cursor.as_deref(), MAX_LIST_PAGE)?;
            keys.extend(page.keys);
            match page.cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HookResult, ResolvedCommit};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn event_at(app: &str, env: &str, secs: i64) -> DeployEvent {
        DeployEvent {
            id: Uuid::new_v4(),
            ts: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
            kind: "deploy".to_string(),
            app: app.to_string(),
            env: env.to_string(),
            commit_sha: format!("{secs:040x}"),
            commit_msg: format!("commit {secs}"),
            actor: Some("ops@example.com".to_string()),
            result: HookResult {
                hook_status: Some(200),
                hook_ok: true,
                release_branch: format!("release/{app}-{env}"),
            },
        }
    }

    fn log_with(events: &[DeployEvent]) -> AuditLog {
        let log = AuditLog::new(MemoryStore::new());
        for e in events {
            log.append(e).unwrap();
        }
        log
    }

    #[test]
    fn list_is_newest_first() {
        let log = log_with(&[
            event_at("app-a", "dev", 10),
            event_at("app-a", "dev", 30),
            event_at("app-b", "prod", 20),
        ]);
        let events = log.list(&HistoryQuery::default()).unwrap();
        let secs: Vec<_> = events.iter().map(|e| e.commit_msg.as_str()).collect();
        assert_eq!(secs, vec!["commit 30", "commit 20", "commit 10"]);
        assert!(events.windows(2).all(|w| w[0].ts >= w[1].ts));
    }

    #[test]
    fn limit_applies_after_ordering_by_timestamp() {
        // Keys sort opposite to the event timestamps.
        let store = MemoryStore::new();
        let old = event_at("app-a", "dev", 10);
        let new = event_at("app-a", "dev", 20);
        store
            .put("event:zzz-old", &serde_json::to_vec(&old).unwrap())
            .unwrap();
        store
            .put("event:aaa-new", &serde_json::to_vec(&new).unwrap())
            .unwrap();
        let log = AuditLog::new(store);

        let events = log
            .list(&HistoryQuery {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, new.id);
    }

    #[test]
    fn list_filters_by_app_and_env() {
        let log = log_with(&[
            event_at("app-a", "dev", 1),
            event_at("app-a", "prod", 2),
            event_at("app-b", "dev", 3),
        ]);
        let only_a = log
            .list(&HistoryQuery {
                app: Some("app-a".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|e| e.app == "app-a"));

        let a_prod = log
            .list(&HistoryQuery {
                app: Some("app-a".into()),
                env: Some("prod".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(a_prod.len(), 1);
        assert_eq!(a_prod[0].env, "prod");
    }

    #[test]
    fn empty_filter_strings_are_ignored() {
        let log = log_with(&[event_at("app-a", "dev", 1), event_at("app-b", "dev", 2)]);
        let all = log
            .list(&HistoryQuery {
                app: Some(String::new()),
                env: Some(String::new()),
                limit: None,
            })
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn limit_is_applied_after_sorting() {
        let events: Vec<_> = (0..10).map(|i| event_at("app-a", "dev", i)).collect();
        let log = log_with(&events);
        let top = log
            .list(&HistoryQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        let msgs: Vec<_> = top.iter().map(|e| e.commit_msg.as_str()).collect();
        assert_eq!(msgs, vec!["commit 9", "commit 8", "commit 7"]);
    }

    #[test]
    fn limit_is_capped() {
        let events: Vec<_> = (0..(MAX_HISTORY_LIMIT as i64 + 20))
            .map(|i| event_at("app-a", "dev", i))
            .collect();
        let log = log_with(&events);
        let page = log
            .list(&HistoryQuery {
                limit: Some(10_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), MAX_HISTORY_LIMIT);
        let default_page = log.list(&HistoryQuery::default()).unwrap();
        assert_eq!(default_page.len(), DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn clear_removes_everything_across_pages() {
        let events: Vec<_> = (0..(MAX_LIST_PAGE as i64 + 5))
            .map(|i| event_at("app-a", "dev", i))
            .collect();
        let log = log_with(&events);
        let removed = log.clear().unwrap();
        assert_eq!(removed, MAX_LIST_PAGE + 5);
        assert!(log.list(&HistoryQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn disabled_log_is_silent() {
        let log = AuditLog::disabled();
        let commit = ResolvedCommit {
            sha: "abc1234".into(),
            message: "m".into(),
        };
        log.append(&DeployEvent::deploy("app-a", "dev", &commit, None, 200, "r"))
            .unwrap();
        assert!(log.list(&HistoryQuery::default()).unwrap().is_empty());
        assert_eq!(log.clear().unwrap(), 0);
    }

    #[test]
    fn redb_backed_log_round_trips_events() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = AuditLog::from_config(&AuditConfig {
            path: Some(dir.path().join("audit.redb")),
        })
        .unwrap();
        let e = event_at("app-b", "prod", 42);
        log.append(&e).unwrap();
        let events = log.list(&HistoryQuery::default()).unwrap();
        assert_eq!(events, vec![e]);
    }
}
