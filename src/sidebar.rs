//! Site-wide statistics shown next to every page, recomputed at most once
//! per TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{CategoryCount, SearchCount, TagCount, Task};
use crate::repo::{Repo, RepoResult};
use crate::search::{popular_window_start, POPULAR_SEARCH_LIMIT};

pub const SIDEBAR_CACHE_KEY: &str = "sidebar_context";
pub const POPULAR_TAG_LIMIT: usize = 10;
pub const RECENT_TASK_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SidebarStats {
    pub categories: Vec<CategoryCount>,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub unanswered_questions: i64,
    pub popular_searches: Vec<SearchCount>,
    pub popular_tags: Vec<TagCount>,
    pub total_tasks: i64,
    pub recent_tasks: Vec<Task>,
    pub generated_at: DateTime<Utc>,
}

/// Most used first, ties by name, at most `limit`.
pub fn rank_tags(mut counts: Vec<TagCount>, limit: usize) -> Vec<TagCount> {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts.truncate(limit);
    counts
}

pub async fn compute(repo: &dyn Repo) -> RepoResult<SidebarStats> {
    let now = Utc::now();
    let (total_questions, answered_questions) = repo.question_totals().await?;
    Ok(SidebarStats {
        categories: repo.category_counts().await?,
        total_questions,
        answered_questions,
        unanswered_questions: total_questions - answered_questions,
        popular_searches: repo.popular_searches(popular_window_start(now), POPULAR_SEARCH_LIMIT).await?,
        popular_tags: rank_tags(repo.tag_frequencies().await?, POPULAR_TAG_LIMIT),
        total_tasks: repo.count_tasks().await?,
        recent_tasks: repo.recent_tasks(RECENT_TASK_LIMIT).await?,
        generated_at: now,
    })
}

/// Time-boxed cache of [`SidebarStats`]. Writes never invalidate it; readers
/// see data at most `ttl` old.
#[derive(Clone)]
pub struct SidebarCache {
    entries: Arc<DashMap<&'static str, (Instant, Arc<SidebarStats>)>>,
    ttl: Duration,
}

impl SidebarCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(DashMap::new()), ttl }
    }

    /// Cached stats if still fresh.
    pub fn get(&self) -> Option<Arc<SidebarStats>> {
        let entry = self.entries.get(SIDEBAR_CACHE_KEY)?;
        let (stored_at, stats) = entry.value();
        let fresh = (stored_at.elapsed() < self.ttl).then(|| stats.clone());
        fresh
    }

    pub fn put(&self, stats: SidebarStats) -> Arc<SidebarStats> {
        let stats = Arc::new(stats);
        self.entries.insert(SIDEBAR_CACHE_KEY, (Instant::now(), stats.clone()));
        stats
    }

    pub async fn get_or_compute(&self, repo: &dyn Repo) -> RepoResult<Arc<SidebarStats>> {
        if let Some(stats) = self.get() {
            return Ok(stats);
        }
        let stats = compute(repo).await?;
        tracing::debug!("sidebar statistics recomputed");
        Ok(self.put(stats))
    }
}
