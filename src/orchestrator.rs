//! Drives multi-page scrapes and batch runs over profession/state/city tasks.
//!
//! All work is strictly sequential: one outbound fetch at a time, one task at
//! a time. The fixed inter-request delays are load-shedding by construction,
//! since the upstream engine penalizes bursty traffic.

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::error::FetchError;
use crate::extractor::EmailExtractor;
use crate::fetcher::PageFetcher;
use crate::models::{
    BatchOutcome, BatchRequest, CancelFlag, EmailOrigin, EmailRecord, QueryLogic, ScrapeResult,
    ScrapeTask, SearchCriteria, TaskReport,
};
use crate::query::{build_query, normalize_site};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::sleep;

/// Stateful controller that walks result pages for one criteria at a time,
/// applying the early-stop and retry policy, and aggregates batch runs.
#[derive(Debug, Clone)]
pub(crate) struct Scraper<F> {
    config: Arc<Config>,
    extractor: EmailExtractor,
    fetcher: F,
}

impl<F: PageFetcher> Scraper<F> {
    pub(crate) fn new(config: Arc<Config>, fetcher: F) -> Self {
        let extractor = EmailExtractor::from_config(&config);
        Self {
            config,
            extractor,
            fetcher,
        }
    }

    /// Runs one orchestrated scrape for one SearchCriteria.
    ///
    /// Pages are fetched in strictly increasing offset order. A page whose
    /// fetch attempts are all exhausted counts as empty. The walk stops once
    /// accumulated unique emails exceed the configured threshold or the
    /// consecutive-empty-page cap is reached, whichever comes first.
    ///
    /// Zero emails is a success; `error_reason` is set only when at least one
    /// page fetch actually failed, so callers can tell "nothing found" from
    /// "couldn't look".
    pub(crate) async fn scrape(&self, criteria: &SearchCriteria) -> ScrapeResult {
        if let Err(reason) = validate_criteria(criteria) {
            tracing::warn!(target: "scrape_task", "Rejecting criteria: {}", reason);
            return ScrapeResult::failed(reason);
        }

        let query = build_query(criteria);
        let source = self.source_label(criteria);
        tracing::info!(target: "scrape_task", "Search query: {}", query);

        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered: Vec<String> = Vec::new();
        let mut empty_streak: u32 = 0;
        let mut fetch_failures: u32 = 0;
        let mut last_error: Option<String> = None;

        let page_limit = criteria.page_limit.clamp(1, crate::config::MAX_PAGE_LIMIT);
        for page in 0..page_limit {
            match self.fetch_page_with_retry(&query, page).await {
                Ok(html) => {
                    let found = self.extractor.extract(&html);
                    if found.is_empty() {
                        empty_streak += 1;
                        tracing::debug!(
                            target: "scrape_task",
                            "Page {} yielded no emails ({} consecutive empty).",
                            page,
                            empty_streak
                        );
                    } else {
                        empty_streak = 0;
                        for address in found {
                            if seen.insert(address.clone()) {
                                ordered.push(address);
                            }
                        }
                        tracing::debug!(
                            target: "scrape_task",
                            "Page {} done, {} unique emails accumulated.",
                            page,
                            ordered.len()
                        );
                    }
                }
                Err(e) => {
                    fetch_failures += 1;
                    empty_streak += 1;
                    last_error = Some(e.to_string());
                }
            }

            if ordered.len() > self.config.early_stop_threshold {
                tracing::info!(
                    target: "scrape_task",
                    "Accumulated {} unique emails, past threshold {}; stopping early.",
                    ordered.len(),
                    self.config.early_stop_threshold
                );
                break;
            }
            if empty_streak >= self.config.max_consecutive_empty_pages {
                tracing::info!(
                    target: "scrape_task",
                    "{} consecutive empty pages; stopping early.",
                    empty_streak
                );
                break;
            }
        }

        // Second full dedup + rejection pass over the accumulated list. The
        // final output must contain no placeholder emails even if a per-page
        // filtering regression slips through.
        let filtered = self.extractor.filter_unique(ordered);

        let error_reason = if filtered.is_empty() && fetch_failures > 0 {
            last_error
        } else {
            None
        };

        let emails: Vec<EmailRecord> = filtered
            .into_iter()
            .map(|address| EmailRecord {
                address,
                source_domain: source.clone(),
            })
            .collect();

        tracing::info!(
            target: "scrape_task",
            "Finished scrape for '{}': {} emails ({} fetch failures).",
            query,
            emails.len(),
            fetch_failures
        );

        ScrapeResult {
            succeeded: true,
            emails,
            error_reason,
        }
    }

    /// Processes a batch of tasks sequentially, reporting progress before each
    /// task starts and checkpointing after each task completes.
    ///
    /// Cancellation is checked between tasks only; results of completed tasks
    /// are always preserved in the returned outcome. One task's failure never
    /// aborts the batch.
    pub(crate) async fn run_batch<P, C>(
        &self,
        request: &BatchRequest,
        mut progress: P,
        cancel: &CancelFlag,
        checkpoint: &C,
    ) -> BatchOutcome
    where
        P: FnMut(f64, &ScrapeTask),
        C: CheckpointStore,
    {
        let total = request.tasks.len();
        let mut outcome = BatchOutcome::default();
        if total == 0 {
            return outcome;
        }

        let mut seen_per_file: HashMap<(String, String), HashSet<String>> = HashMap::new();

        for (index, task) in request.tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    target: "batch_task",
                    "Cancellation observed; stopping before task {}/{}.",
                    index + 1,
                    total
                );
                outcome.cancelled = true;
                break;
            }

            let percent = (index + 1) as f64 * 100.0 / total as f64;
            progress(percent, task);

            tracing::info!(
                target: "batch_task",
                "Processing {}/{}: {} in {}, {}",
                index + 1,
                total,
                task.profession,
                task.city,
                task.state
            );

            let report = self
                .run_task(task, request, &mut outcome, &mut seen_per_file)
                .await;

            let emails = outcome
                .results
                .get(&task.profession)
                .and_then(|states| states.get(&task.state))
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            if let Err(e) = checkpoint.save(&task.profession, &task.state, emails) {
                tracing::warn!(target: "batch_task", "Failed to save checkpoint: {}", e);
            }

            match (&report.succeeded, &report.error) {
                (true, _) => tracing::info!(
                    target: "batch_task",
                    "Task completed: {} emails ({}).",
                    report.emails_found,
                    report.source
                ),
                (false, Some(reason)) => {
                    tracing::warn!(target: "batch_task", "Task failed: {}", reason)
                }
                (false, None) => tracing::warn!(target: "batch_task", "Task failed."),
            }
            outcome.history.push(report);

            if index + 1 < total {
                sleep(self.config.delay_between_tasks).await;
            }
        }

        outcome
    }

    /// Runs one (profession, state, city) task: one general scrape when no
    /// sites are listed, otherwise one scrape per site so the source of each
    /// email is attributable.
    async fn run_task(
        &self,
        task: &ScrapeTask,
        request: &BatchRequest,
        outcome: &mut BatchOutcome,
        seen_per_file: &mut HashMap<(String, String), HashSet<String>>,
    ) -> TaskReport {
        let mut added_total = 0;
        let mut last_error: Option<String> = None;

        if request.sites.is_empty() {
            let criteria = task_criteria(task, &[], request);
            let result = self.scrape(&criteria).await;
            added_total += merge_result(task, &result, outcome, seen_per_file);
            if let Some(reason) = result.error_reason {
                last_error = Some(reason);
            }
        } else {
            for (index, site) in request.sites.iter().enumerate() {
                let criteria = task_criteria(task, std::slice::from_ref(site), request);
                let result = self.scrape(&criteria).await;
                let added = merge_result(task, &result, outcome, seen_per_file);
                added_total += added;
                tracing::debug!(
                    target: "batch_task",
                    "Found {} new emails from {}.",
                    added,
                    site
                );
                if let Some(reason) = result.error_reason {
                    last_error = Some(reason);
                }
                if index + 1 < request.sites.len() {
                    sleep(self.config.delay_between_sites).await;
                }
            }
        }

        let source = match request.sites.as_slice() {
            [] => self.config.search_engine_domain.clone(),
            [only] => normalize_site(only)
                .trim_start_matches("site:")
                .to_string(),
            _ => "multiple sites".to_string(),
        };

        if added_total > 0 {
            TaskReport {
                task: task.clone(),
                emails_found: added_total,
                source,
                succeeded: true,
                error: None,
            }
        } else {
            TaskReport {
                task: task.clone(),
                emails_found: 0,
                source,
                succeeded: false,
                error: Some(last_error.unwrap_or_else(|| "No emails found".to_string())),
            }
        }
    }

    /// Fetches one page, retrying up to the configured attempt count. Delays
    /// follow every attempt; a failed attempt waits longer than a successful
    /// one.
    async fn fetch_page_with_retry(
        &self,
        query: &str,
        page: u32,
    ) -> std::result::Result<String, FetchError> {
        let mut last_error = FetchError::Unknown("no fetch attempt made".to_string());
        for attempt in 1..=self.config.max_fetch_attempts {
            match self.fetcher.fetch_page(query, page).await {
                Ok(html) => {
                    sleep(self.config.delay_after_success).await;
                    return Ok(html);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "scrape_task",
                        "Fetch attempt {}/{} for page {} failed: {}",
                        attempt,
                        self.config.max_fetch_attempts,
                        page,
                        e
                    );
                    last_error = e;
                    sleep(self.config.delay_after_failure).await;
                }
            }
        }
        Err(last_error)
    }

    /// The source domain recorded on extracted emails: the single restricted
    /// site when there is exactly one, otherwise the engine's own domain.
    fn source_label(&self, criteria: &SearchCriteria) -> String {
        let sites: Vec<String> = criteria
            .sites
            .iter()
            .map(|s| normalize_site(s))
            .filter(|s| !s.is_empty())
            .collect();
        match sites.as_slice() {
            [only] => only.trim_start_matches("site:").to_string(),
            _ => self.config.search_engine_domain.clone(),
        }
    }
}

/// Rejects criteria with empty required fields before any network call. A
/// task is one profession × state × city combination, so all three are
/// required.
fn validate_criteria(criteria: &SearchCriteria) -> std::result::Result<(), String> {
    let mut missing = Vec::new();
    if criteria.profession.trim().is_empty() {
        missing.push("profession");
    }
    if criteria.state.trim().is_empty() {
        missing.push("state");
    }
    if criteria.city.trim().is_empty() {
        missing.push("city");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Missing {}", missing.join(", ")))
    }
}

fn task_criteria(task: &ScrapeTask, sites: &[String], request: &BatchRequest) -> SearchCriteria {
    SearchCriteria {
        sites: sites.to_vec(),
        email_domains: request.email_domains.clone(),
        profession: task.profession.clone(),
        city: task.city.clone(),
        state: task.state.clone(),
        logic: QueryLogic::Or,
        page_limit: request.page_limit,
    }
}

/// Folds one scrape result into the batch aggregation: per-(profession,
/// state) lists stay unique in first-seen order, and the attribution map
/// records the first (city, source) each address was observed in.
fn merge_result(
    task: &ScrapeTask,
    result: &ScrapeResult,
    outcome: &mut BatchOutcome,
    seen_per_file: &mut HashMap<(String, String), HashSet<String>>,
) -> usize {
    let seen = seen_per_file
        .entry((task.profession.clone(), task.state.clone()))
        .or_default();
    let per_state = outcome
        .results
        .entry(task.profession.clone())
        .or_default()
        .entry(task.state.clone())
        .or_default();

    let mut added = 0;
    for record in &result.emails {
        outcome
            .attribution
            .entry(record.address.clone())
            .or_insert_with(|| EmailOrigin {
                city: task.city.clone(),
                source: record.source_domain.clone(),
            });
        if seen.insert(record.address.clone()) {
            per_state.push(record.clone());
            added += 1;
        }
    }
    added
}
