//! Status service with long-polling
//!
//! Composes the store and the exploration cache into the public status
//! envelope. A long poll never busy-polls the store: the waiter parks on the
//! task's change notifier and rebuilds the snapshot only when a mutation
//! signals it, returning as soon as any observable field differs from the
//! first snapshot or the deadline passes.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use dredgestore::{DomainRuleRow, Store, TaskRow};

use crate::bus::ChangeBus;
use crate::config::StatusConfig;
use crate::errors::ToolError;
use crate::state::{ExplorationCache, ExplorationSnapshot};

/// Hard ceiling on the long-poll wait parameter, in seconds
pub const MAX_WAIT_SECS: f64 = 60.0;

/// Level of detail in the status envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detail {
    #[default]
    Summary,
    Full,
}

impl std::str::FromStr for Detail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "full" => Ok(Self::Full),
            _ => Err(format!("Unknown detail level: {}", s)),
        }
    }
}

/// Public status view over store + exploration state
#[derive(Clone)]
pub struct StatusService {
    store: Store,
    bus: ChangeBus,
    exploration: ExplorationCache,
    config: StatusConfig,
}

impl StatusService {
    pub fn new(store: Store, bus: ChangeBus, exploration: ExplorationCache, config: StatusConfig) -> Self {
        Self {
            store,
            bus,
            exploration,
            config,
        }
    }

    /// Build the status envelope, optionally blocking up to `wait` seconds
    /// for an observable change.
    pub async fn get_status(&self, task_id: &str, wait: f64, detail: Detail) -> Result<Value, ToolError> {
        if task_id.is_empty() {
            return Err(ToolError::invalid_params(
                "task_id is required and cannot be empty",
                "task_id",
                "non-empty task id",
            ));
        }

        let wait = wait.clamp(0.0, MAX_WAIT_SECS);
        let notify = self.bus.for_task(task_id);

        // Register interest before the first snapshot so a change committing
        // between snapshot and park cannot be missed.
        let mut notified = Box::pin(notify.notified());
        notified.as_mut().enable();

        let (envelope, fingerprint) = self.snapshot(task_id, detail).await?;
        if wait == 0.0 {
            return Ok(envelope);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(wait);
        let mut current = envelope;

        loop {
            tokio::select! {
                _ = notified.as_mut() => {
                    let (rebuilt, new_fingerprint) = self.snapshot(task_id, detail).await?;
                    current = rebuilt;
                    if new_fingerprint != fingerprint {
                        debug!(%task_id, "get_status: observable change, waking poller");
                        return Ok(current);
                    }
                    notified = Box::pin(notify.notified());
                    notified.as_mut().enable();
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%task_id, "get_status: wait elapsed");
                    return Ok(current);
                }
            }
        }
    }

    /// One status snapshot plus the fingerprint of its observable fields
    async fn snapshot(&self, task_id: &str, detail: Detail) -> Result<(Value, String), ToolError> {
        let task = self.store.get_task(task_id).await?.ok_or_else(|| ToolError::task_not_found(task_id))?;
        let exploration = self.exploration.snapshot(task_id).await?;
        let counts = self.store.job_state_counts(task_id).await?;
        let (pending_auth, high_auth) = self.store.intervention_counts(Some(task_id)).await?;
        let blocked = self.store.blocked_domains().await?;

        let elapsed = elapsed_seconds(&task);
        let warnings = self.warnings(&task, &exploration, elapsed);

        let mut by_status = [0i64; 4]; // satisfied, partial, pending, exhausted
        for search in &exploration.searches {
            match search.status.as_str() {
                "satisfied" => by_status[0] += 1,
                "partial" => by_status[1] += 1,
                "exhausted" => by_status[3] += 1,
                _ => by_status[2] += 1,
            }
        }

        let searches: Vec<Value> = exploration
            .searches
            .iter()
            .map(|s| {
                json!({
                    "id": &s.id,
                    "query": &s.query,
                    "status": &s.status,
                    "pages_fetched": s.pages_fetched,
                    "useful_fragments": s.useful_fragments,
                    "independent_sources": s.independent_sources,
                    "has_primary_source": s.has_primary_source,
                    "satisfaction_score": s.satisfaction_score,
                    "harvest_rate": s.harvest_rate,
                })
            })
            .collect();

        let blocked_domains: Vec<Value> = blocked.iter().map(blocked_domain_entry).collect();

        let pages_limit = task.budget_pages;
        let remaining_percent = if pages_limit > 0 {
            (((pages_limit - exploration.total_pages).max(0) as f64 / pages_limit as f64) * 100.0).round() as i64
        } else {
            0
        };

        let mut queue = json!({
            "depth": counts.queued,
            "running": counts.running,
        });
        if detail == Detail::Full {
            let entries: Vec<Value> = self
                .store
                .live_jobs(task_id)
                .await?
                .iter()
                .map(|job| {
                    json!({
                        "id": &job.id,
                        "kind": &job.kind,
                        "state": job.state,
                        "priority": job.priority,
                        "queued_at": &job.queued_at,
                    })
                })
                .collect();
            queue["entries"] = Value::Array(entries);
        }

        let auth_queue = if pending_auth > 0 {
            json!({"pending_count": pending_auth, "high_priority_count": high_auth})
        } else {
            Value::Null
        };

        let envelope = json!({
            "ok": true,
            "task_id": task.id,
            "status": task.status,
            "query": task.query,
            "searches": searches,
            "metrics": {
                "satisfied_count": by_status[0],
                "partial_count": by_status[1],
                "pending_count": by_status[2],
                "exhausted_count": by_status[3],
                "total_searches": by_status.iter().sum::<i64>(),
                "total_pages": exploration.total_pages,
                "total_fragments": exploration.total_fragments,
                "total_claims": exploration.total_claims,
                "elapsed_seconds": elapsed,
            },
            "budget": {
                "pages_used": exploration.total_pages,
                "pages_limit": pages_limit,
                "time_used_seconds": elapsed,
                "time_limit_seconds": task.max_seconds,
                "remaining_percent": remaining_percent,
            },
            "auth_queue": auth_queue,
            "warnings": warnings,
            "blocked_domains": blocked_domains,
            "idle_seconds": exploration.idle_seconds,
            "progress": {"queue": queue},
        });

        // Observable fields only: clock-derived values are excluded so the
        // fingerprint is stable while nothing actually changes.
        let fingerprint = json!([
            task.status,
            [counts.queued, counts.running, counts.completed, counts.failed, counts.cancelled],
            exploration.searches.iter().map(|s| json!([&s.id, &s.status, s.pages_fetched, s.useful_fragments])).collect::<Vec<_>>(),
            [exploration.total_pages, exploration.total_fragments, exploration.total_claims],
            [pending_auth, high_auth],
            blocked.iter().map(|b| b.domain.clone()).collect::<Vec<_>>(),
        ])
        .to_string();

        Ok((envelope, fingerprint))
    }

    fn warnings(&self, task: &TaskRow, exploration: &ExplorationSnapshot, elapsed: f64) -> Vec<String> {
        let mut warnings = Vec::new();

        if task.budget_pages > 0 {
            let used = exploration.total_pages;
            if used >= task.budget_pages {
                warnings.push(format!(
                    "Budget limit reached: {}/{} pages used. Call stop_task or raise the budget.",
                    used, task.budget_pages
                ));
            } else if used * 5 >= task.budget_pages * 4 {
                let pct = (used as f64 / task.budget_pages as f64 * 100.0).round() as i64;
                warnings.push(format!("Budget limit approaching: {}% of page budget used.", pct));
            }
        }

        if task.max_seconds > 0 && elapsed >= task.max_seconds as f64 {
            warnings.push(format!(
                "Budget limit reached: time budget of {}s exhausted.",
                task.max_seconds
            ));
        }

        if exploration.idle_seconds > self.config.idle_warn_secs {
            warnings.push(format!(
                "Task idle for {} seconds (timeout: {}s). Consider resuming or stopping.",
                exploration.idle_seconds, self.config.idle_warn_secs
            ));
        }

        for search in &exploration.searches {
            if search.status != "satisfied"
                && search.pages_fetched >= self.config.harvest_min_pages
                && search.harvest_rate < self.config.low_harvest_rate
            {
                warnings.push(format!(
                    "Search '{}' shows diminishing returns (harvest rate {:.2}).",
                    search.id, search.harvest_rate
                ));
            }
        }

        warnings
    }
}

fn blocked_domain_entry(rule: &DomainRuleRow) -> Value {
    json!({
        "domain": &rule.domain,
        "domain_block_reason": &rule.reason,
        "domain_unblock_risk": &rule.risk,
        "reason": rule.note.clone().unwrap_or_else(|| format!("Blocked ({})", rule.reason)),
        "cause_id": &rule.cause_id,
    })
}

fn elapsed_seconds(task: &TaskRow) -> f64 {
    chrono::DateTime::parse_from_rfc3339(&task.created_at)
        .map(|created| {
            let delta = chrono::Utc::now().signed_duration_since(created.with_timezone(&chrono::Utc));
            (delta.num_milliseconds() as f64 / 1000.0).max(0.0)
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Target};
    use crate::errors::ErrorKind;
    use crate::queue::JobQueue;
    use dredgestore::SearchRow;
    use std::time::Instant;

    struct Fixture {
        store: Store,
        bus: ChangeBus,
        service: StatusService,
        queue: JobQueue,
    }

    async fn fixture() -> Fixture {
        fixture_with(StatusConfig::default()).await
    }

    async fn fixture_with(config: StatusConfig) -> Fixture {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "Test research question", 120, 1200).await.unwrap();
        let bus = ChangeBus::new();
        let exploration = ExplorationCache::new(store.clone(), Duration::from_secs(1800));
        let service = StatusService::new(store.clone(), bus.clone(), exploration, config);
        let queue = JobQueue::new(store.clone(), bus.clone());
        Fixture {
            store,
            bus,
            service,
            queue,
        }
    }

    fn query_target(q: &str) -> Target {
        Target::parse(&json!({"kind": "query", "query": q}), 0).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_task_summary() {
        let f = fixture().await;

        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();

        assert_eq!(status["ok"], true);
        assert_eq!(status["task_id"], "task_001");
        assert_eq!(status["status"], "created");
        assert_eq!(status["query"], "Test research question");
        assert_eq!(status["searches"], json!([]));
        assert_eq!(status["metrics"]["total_searches"], 0);
        assert_eq!(status["metrics"]["total_claims"], 0);
        assert_eq!(status["budget"]["pages_used"], 0);
        assert_eq!(status["budget"]["pages_limit"], 120);
        assert_eq!(status["budget"]["remaining_percent"], 100);
        assert_eq!(status["warnings"], json!([]));
        assert_eq!(status["blocked_domains"], json!([]));
        assert_eq!(status["auth_queue"], Value::Null);
        assert_eq!(status["progress"]["queue"]["depth"], 0);
        assert_eq!(status["progress"]["queue"]["running"], 0);
        assert!(status["idle_seconds"].as_f64().unwrap() < 2.0);
    }

    #[tokio::test]
    async fn test_empty_task_id_is_invalid_params() {
        let f = fixture().await;
        let err = f.service.get_status("", 0.0, Detail::Summary).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert!(err.message.contains("task_id"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_task_not_found() {
        let f = fixture().await;
        let err = f.service.get_status("nonexistent_task", 0.0, Detail::Summary).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskNotFound);
        assert_eq!(err.details.unwrap()["task_id"], "nonexistent_task");
    }

    #[tokio::test]
    async fn test_search_fields_and_metrics_mapping() {
        let f = fixture().await;
        for (id, status) in [("sq_001", "satisfied"), ("sq_002", "pending")] {
            f.store
                .upsert_search(&SearchRow {
                    id: id.to_string(),
                    task_id: "task_001".to_string(),
                    query: format!("Search query {}", id),
                    status: status.to_string(),
                    pages_fetched: 15,
                    useful_fragments: 8,
                    independent_sources: 3,
                    has_primary_source: true,
                    satisfaction_score: 0.82,
                    harvest_rate: 0.53,
                })
                .await
                .unwrap();
        }

        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();

        assert_eq!(status["searches"].as_array().unwrap().len(), 2);
        let search = &status["searches"][0];
        assert_eq!(search["id"], "sq_001");
        // Internal subquery text surfaces as `query`
        assert_eq!(search["query"], "Search query sq_001");
        assert_eq!(search["status"], "satisfied");
        assert_eq!(search["pages_fetched"], 15);
        assert_eq!(search["useful_fragments"], 8);
        assert_eq!(search["has_primary_source"], true);
        assert_eq!(search["harvest_rate"], 0.53);

        // total_searches equals the sum of the four status counters
        assert_eq!(status["metrics"]["satisfied_count"], 1);
        assert_eq!(status["metrics"]["pending_count"], 1);
        assert_eq!(status["metrics"]["total_searches"], 2);
    }

    #[tokio::test]
    async fn test_queue_depth_reflects_live_jobs() {
        let f = fixture().await;
        f.queue
            .enqueue_targets(
                "task_001",
                &[query_target("a"), query_target("b")],
                &json!({}),
                Priority::Medium,
            )
            .await
            .unwrap();
        f.queue.fetch_next(crate::queue::NETWORK_SLOT).await.unwrap();

        let status = f.service.get_status("task_001", 0.0, Detail::Full).await.unwrap();
        assert_eq!(status["progress"]["queue"]["depth"], 1);
        assert_eq!(status["progress"]["queue"]["running"], 1);
        let entries = status["progress"]["queue"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0]["id"].as_str().unwrap().starts_with("tq_"));
    }

    #[tokio::test]
    async fn test_summary_omits_queue_entries() {
        let f = fixture().await;
        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();
        assert!(status["progress"]["queue"].get("entries").is_none());
    }

    #[tokio::test]
    async fn test_blocked_domains_shape() {
        let f = fixture().await;
        f.store
            .upsert_domain_rule("spam-site.com", "block", "high_rejection_rate", "low", Some("abc123"), None)
            .await
            .unwrap();

        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();
        let blocked = &status["blocked_domains"][0];
        assert_eq!(blocked["domain"], "spam-site.com");
        assert_eq!(blocked["domain_block_reason"], "high_rejection_rate");
        assert_eq!(blocked["domain_unblock_risk"], "low");
        assert_eq!(blocked["cause_id"], "abc123");
        assert!(blocked["reason"].is_string());
    }

    #[tokio::test]
    async fn test_auth_queue_counts() {
        let f = fixture().await;
        f.store
            .insert_intervention("iq_1", "task_001", "https://example.com/a", "example.com", "login", "high")
            .await
            .unwrap();
        f.store
            .insert_intervention("iq_2", "task_001", "https://example.com/b", "example.com", "login", "medium")
            .await
            .unwrap();

        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();
        assert_eq!(status["auth_queue"]["pending_count"], 2);
        assert_eq!(status["auth_queue"]["high_priority_count"], 1);
    }

    #[tokio::test]
    async fn test_budget_warning_at_limit() {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "q", 10, 1200).await.unwrap();
        let bus = ChangeBus::new();
        let exploration = ExplorationCache::new(store.clone(), Duration::from_secs(1800));
        exploration.record_progress("task_001", 10, 0, 0).await.unwrap();
        let service = StatusService::new(store, bus, exploration, StatusConfig::default());

        let status = service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();
        let warnings = status["warnings"].as_array().unwrap();
        assert!(!warnings.is_empty());
        assert!(warnings[0].as_str().unwrap().contains("Budget limit"));
        assert_eq!(status["budget"]["remaining_percent"], 0);
    }

    #[tokio::test]
    async fn test_diminishing_returns_warning() {
        let f = fixture().await;
        f.store
            .upsert_search(&SearchRow {
                id: "sq_low".to_string(),
                task_id: "task_001".to_string(),
                query: "weak search".to_string(),
                status: "partial".to_string(),
                pages_fetched: 20,
                useful_fragments: 1,
                independent_sources: 1,
                has_primary_source: false,
                satisfaction_score: 0.2,
                harvest_rate: 0.05,
            })
            .await
            .unwrap();

        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();
        let warnings = status["warnings"].as_array().unwrap();
        assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("diminishing returns")));
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_enqueue() {
        let f = fixture().await;
        let service = f.service.clone();

        let poll = tokio::spawn(async move { service.get_status("task_001", 5.0, Detail::Summary).await });

        // Enqueue 100ms into the poll; the waiter must return well before 5s
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        f.queue
            .enqueue_targets("task_001", &[query_target("wake")], &json!({}), Priority::Medium)
            .await
            .unwrap();

        let status = tokio::time::timeout(Duration::from_secs(2), poll)
            .await
            .expect("long poll must wake early")
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(status["progress"]["queue"]["depth"], 1);
        assert_eq!(status["status"], "exploring");
    }

    #[tokio::test]
    async fn test_long_poll_times_out_without_changes() {
        let f = fixture().await;

        let started = Instant::now();
        let status = f.service.get_status("task_001", 0.3, Detail::Summary).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(280), "returned too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "overshot the wait bound: {:?}", elapsed);
        assert_eq!(status["ok"], true);
    }

    #[tokio::test]
    async fn test_long_poll_ignores_unobservable_signals() {
        let f = fixture().await;
        let service = f.service.clone();
        let bus = f.bus.clone();

        // A spurious signal with no state change must not wake the poller
        let poll = tokio::spawn(async move { service.get_status("task_001", 0.4, Detail::Summary).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        bus.signal("task_001");

        poll.await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_idle_warning_when_threshold_exceeded() {
        let f = fixture_with(StatusConfig {
            idle_warn_secs: 0,
            ..Default::default()
        })
        .await;

        // Threshold 0: any nonzero idle triggers; force idle_seconds > 0
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let status = f.service.get_status("task_001", 0.0, Detail::Summary).await.unwrap();

        let warnings = status["warnings"].as_array().unwrap();
        assert!(
            warnings.iter().any(|w| w.as_str().unwrap().to_lowercase().contains("idle")),
            "expected idle warning in {:?}",
            warnings
        );
    }
}
