//! Defines the core data structures used in the serp-leads application.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Combinator applied between email-domain terms in a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum QueryLogic {
    #[default]
    Or,
    And,
}

impl QueryLogic {
    /// Parses a free-text logic selector. Anything that is not "AND"
    /// (case-insensitive) falls back to OR.
    pub(crate) fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("and") {
            QueryLogic::And
        } else {
            QueryLogic::Or
        }
    }

    /// The operator inserted between quoted email-domain terms.
    pub(crate) fn separator(&self) -> &'static str {
        match self {
            QueryLogic::Or => " OR ",
            QueryLogic::And => " AND ",
        }
    }
}

impl Serialize for QueryLogic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueryLogic::Or => serializer.serialize_str("OR"),
            QueryLogic::And => serializer.serialize_str("AND"),
        }
    }
}

impl<'de> Deserialize<'de> for QueryLogic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QueryLogic::parse(&raw))
    }
}

fn default_page_limit() -> u32 {
    2
}

/// Immutable, caller-supplied input for one orchestrated scrape.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchCriteria {
    /// Site restrictions (free text, normalized before query building).
    /// An empty list means an unrestricted search.
    #[serde(default)]
    pub sites: Vec<String>,
    /// Email domains to target, each normalized to start with `@`.
    #[serde(default)]
    pub email_domains: Vec<String>,
    pub profession: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub logic: QueryLogic,
    /// Number of result pages to walk, 1-based count of 100-result pages.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

/// A single email address found in scraped result pages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmailRecord {
    /// The extracted address, casing preserved from the source HTML.
    pub address: String,
    /// The domain the search was restricted to when this address was found,
    /// or the search engine's own domain for unrestricted searches.
    pub source_domain: String,
}

/// Terminal output of one orchestrated scrape for one SearchCriteria.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScrapeResult {
    pub succeeded: bool,
    pub emails: Vec<EmailRecord>,
    /// Set when the pipeline could not run or no emails were found because of
    /// fetch failures. Unset for a clean zero-result outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl ScrapeResult {
    pub(crate) fn failed(reason: String) -> Self {
        Self {
            succeeded: false,
            emails: Vec::new(),
            error_reason: Some(reason),
        }
    }
}

/// One (profession, state, city) combination processed by the batch orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScrapeTask {
    pub profession: String,
    pub state: String,
    pub city: String,
}

/// Input to one batch run: the task list plus the shared site and email-domain
/// selections applied to every task.
#[derive(Debug, Clone)]
pub(crate) struct BatchRequest {
    pub tasks: Vec<ScrapeTask>,
    /// Sites to search one by one per task (source attribution follows the
    /// site). Empty means one general, engine-attributed search per task.
    pub sites: Vec<String>,
    pub email_domains: Vec<String>,
    pub page_limit: u32,
}

/// Where an email address was first observed during a batch run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmailOrigin {
    pub city: String,
    pub source: String,
}

/// Caller-visible history entry for one processed task.
#[derive(Debug, Clone)]
pub(crate) struct TaskReport {
    pub task: ScrapeTask,
    pub emails_found: usize,
    /// Human-readable label of where the task searched.
    pub source: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Aggregated output of a batch run, owned by the caller for CSV export.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    /// profession -> state -> emails, first-seen order, unique per (profession, state).
    pub results: BTreeMap<String, BTreeMap<String, Vec<EmailRecord>>>,
    /// address -> first (city, source) it was observed in, for per-city CSV breakdowns.
    pub attribution: HashMap<String, EmailOrigin>,
    /// One entry per started task, successful or not.
    pub history: Vec<TaskReport>,
    /// True when the run stopped early because cancellation was observed.
    pub cancelled: bool,
}

/// Persisted partial result enabling recovery after an interruption.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecoveredData {
    pub profession: String,
    pub state: String,
    pub emails: Vec<EmailRecord>,
    pub date: String,
    pub auto_save: bool,
}

/// Shape of the JSON batch plan consumed by the `batch` subcommand.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchPlan {
    pub professions: Vec<String>,
    /// state -> list of cities.
    pub states: BTreeMap<String, Vec<String>>,
    /// Omitted falls back to the configured default sites; an explicit empty
    /// list means one general (unrestricted) search per task.
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    /// Omitted falls back to the configured default email domains.
    #[serde(default)]
    pub email_domains: Option<Vec<String>>,
    /// Overrides the configured page limit for this plan.
    #[serde(default)]
    pub page_limit: Option<u32>,
}

impl BatchPlan {
    /// Expands the plan into the profession × state × city cross-product,
    /// preserving plan order.
    pub(crate) fn tasks(&self) -> Vec<ScrapeTask> {
        let mut tasks = Vec::new();
        for profession in &self.professions {
            for (state, cities) in &self.states {
                for city in cities {
                    tasks.push(ScrapeTask {
                        profession: profession.clone(),
                        state: state.clone(),
                        city: city.clone(),
                    });
                }
            }
        }
        tasks
    }
}

/// Cooperative cancellation flag checked by the batch loop between tasks.
/// In-flight fetches are not aborted; no new task starts once set.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_parse_defaults_to_or() {
        assert_eq!(QueryLogic::parse("AND"), QueryLogic::And);
        assert_eq!(QueryLogic::parse(" and "), QueryLogic::And);
        assert_eq!(QueryLogic::parse("OR"), QueryLogic::Or);
        assert_eq!(QueryLogic::parse("nonsense"), QueryLogic::Or);
        assert_eq!(QueryLogic::parse(""), QueryLogic::Or);
    }

    #[test]
    fn test_criteria_deserializes_with_defaults() {
        let criteria: SearchCriteria = serde_json::from_str(
            r#"{"profession":"realtor","city":"Dallas","state":"Texas"}"#,
        )
        .unwrap();
        assert!(criteria.sites.is_empty());
        assert!(criteria.email_domains.is_empty());
        assert_eq!(criteria.logic, QueryLogic::Or);
        assert_eq!(criteria.page_limit, 2);
    }

    #[test]
    fn test_malformed_logic_deserializes_to_or() {
        let criteria: SearchCriteria = serde_json::from_str(
            r#"{"profession":"realtor","city":"Dallas","state":"Texas","logic":"XOR"}"#,
        )
        .unwrap();
        assert_eq!(criteria.logic, QueryLogic::Or);
    }

    #[test]
    fn test_batch_plan_cross_product_order() {
        let plan: BatchPlan = serde_json::from_str(
            r#"{
                "professions": ["realtor", "plumber"],
                "states": {"Texas": ["Dallas", "Austin"]}
            }"#,
        )
        .unwrap();
        assert!(plan.sites.is_none());
        assert!(plan.email_domains.is_none());
        let tasks = plan.tasks();
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].profession, "realtor");
        assert_eq!(tasks[0].city, "Dallas");
        assert_eq!(tasks[1].city, "Austin");
        assert_eq!(tasks[2].profession, "plumber");
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
