//! Defines the configuration settings for the serp-leads application.

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    /// Path to configuration file (TOML format)
    #[arg(long, env = "SERP_LEADS_CONFIG", global = true)]
    pub config_file: Option<String>,

    /// Bearer token for the SERP proxy service
    #[arg(long, env = "SERP_LEADS_PROXY_TOKEN", global = true)]
    pub proxy_token: Option<String>,

    /// Proxy zone identifier passed with every request
    #[arg(long, env = "SERP_LEADS_PROXY_ZONE", global = true)]
    pub proxy_zone: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SERP_LEADS_REQUEST_TIMEOUT", global = true)]
    pub request_timeout: Option<u64>,

    /// Result pages to walk per search (1-5)
    #[arg(long, env = "SERP_LEADS_PAGE_LIMIT", global = true)]
    pub page_limit: Option<u32>,

    /// Stop a search once this many unique emails have been exceeded
    #[arg(long, env = "SERP_LEADS_EARLY_STOP_THRESHOLD", global = true)]
    pub early_stop_threshold: Option<usize>,

    /// Fetch attempts per page before it counts as empty
    #[arg(long, env = "SERP_LEADS_MAX_FETCH_ATTEMPTS", global = true)]
    pub max_fetch_attempts: Option<u32>,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    proxy: Option<ProxyConfig>,
    scraping: Option<ScrapingConfig>,
    filters: Option<FilterConfig>,
    delays: Option<DelayConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct ProxyConfig {
    endpoint: Option<String>,
    zone: Option<String>,
    token: Option<String>,
    request_timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct ScrapingConfig {
    search_engine_domain: Option<String>,
    results_per_page: Option<u32>,
    page_limit: Option<u32>,
    early_stop_threshold: Option<usize>,
    max_consecutive_empty_pages: Option<u32>,
    max_fetch_attempts: Option<u32>,
    default_sites: Option<Vec<String>>,
    default_email_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct FilterConfig {
    placeholder_locals: Option<Vec<String>>,
    public_email_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct DelayConfig {
    after_success: Option<f32>,
    after_failure: Option<f32>,
    between_sites: Option<f32>,
    between_tasks: Option<f32>,
}

/// Upper bound on result pages per search, wherever the limit comes from.
pub(crate) const MAX_PAGE_LIMIT: u32 = 5;

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Endpoint of the third-party SERP proxy service.
    pub proxy_endpoint: String,
    /// Proxy zone identifier sent with every request.
    pub proxy_zone: String,
    /// Bearer credential for the proxy. Required for any network-touching command.
    pub proxy_token: Option<String>,
    /// Timeout for individual proxy requests.
    pub request_timeout: Duration,
    /// Domain of the upstream search engine the proxy forwards to.
    pub search_engine_domain: String,
    /// Results per page requested from the engine; page offsets advance in
    /// this unit.
    pub results_per_page: u32,
    /// Result pages to walk per search when the criteria don't say otherwise.
    pub page_limit: u32,
    /// Stop walking pages once accumulated unique emails exceed this count.
    pub early_stop_threshold: usize,
    /// Stop walking pages after this many consecutive empty or failed pages.
    pub max_consecutive_empty_pages: u32,
    /// Attempts per page (first try included) before it counts as empty.
    pub max_fetch_attempts: u32,
    /// Delay applied after a successful fetch attempt.
    pub delay_after_success: Duration,
    /// Longer delay applied after a failed fetch attempt.
    pub delay_after_failure: Duration,
    /// Delay between per-site sub-searches inside one batch task.
    pub delay_between_sites: Duration,
    /// Delay between tasks in a batch.
    pub delay_between_tasks: Duration,
    /// Local-parts treated as placeholders, optionally followed by digits.
    pub placeholder_locals: Vec<String>,
    /// Public mail providers used by the `x<digits>` placeholder heuristic.
    pub public_email_domains: Vec<String>,
    /// Sites offered to batch plans that don't list their own.
    pub default_sites: Vec<String>,
    /// Email domains offered to batch plans that don't list their own.
    pub default_email_domains: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let placeholder_locals = ["test", "example", "sample", "user", "admin"];
        let public_email_domains = ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];
        let default_sites = [
            "facebook.com",
            "linkedin.com",
            "twitter.com",
            "instagram.com",
            "yelp.com",
            "angieslist.com",
            "homeadvisor.com",
            "thumbtack.com",
        ];
        let default_email_domains = ["@gmail.com", "@yahoo.com", "@hotmail.com"];

        Config {
            proxy_endpoint: "https://api.brightdata.com/request".to_string(),
            proxy_zone: "serp_api1".to_string(),
            proxy_token: None,
            request_timeout: Duration::from_secs(30),
            search_engine_domain: "google.com".to_string(),
            results_per_page: 100,
            page_limit: 2,
            early_stop_threshold: 30,
            max_consecutive_empty_pages: 2,
            max_fetch_attempts: 2,
            delay_after_success: Duration::from_secs(3),
            delay_after_failure: Duration::from_secs(5),
            delay_between_sites: Duration::from_secs(2),
            delay_between_tasks: Duration::from_secs(1),
            placeholder_locals: placeholder_locals.iter().map(|s| s.to_string()).collect(),
            public_email_domains: public_email_domains
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_sites: default_sites.iter().map(|s| s.to_string()).collect(),
            default_email_domains: default_email_domains
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(proxy) = &file_config.proxy {
        if let Some(endpoint) = &proxy.endpoint {
            config.proxy_endpoint = endpoint.clone();
        }
        if let Some(zone) = &proxy.zone {
            config.proxy_zone = zone.clone();
        }
        if let Some(token) = &proxy.token {
            config.proxy_token = Some(token.clone());
        }
        if let Some(timeout) = proxy.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(scraping) = &file_config.scraping {
        if let Some(domain) = &scraping.search_engine_domain {
            config.search_engine_domain = domain.clone();
        }
        if let Some(per_page) = scraping.results_per_page {
            config.results_per_page = per_page;
        }
        if let Some(limit) = scraping.page_limit {
            config.page_limit = limit;
        }
        if let Some(threshold) = scraping.early_stop_threshold {
            config.early_stop_threshold = threshold;
        }
        if let Some(cap) = scraping.max_consecutive_empty_pages {
            config.max_consecutive_empty_pages = cap;
        }
        if let Some(attempts) = scraping.max_fetch_attempts {
            config.max_fetch_attempts = attempts;
        }
        if let Some(sites) = &scraping.default_sites {
            config.default_sites = sites.clone();
        }
        if let Some(domains) = &scraping.default_email_domains {
            config.default_email_domains = domains.clone();
        }
    }

    if let Some(filters) = &file_config.filters {
        if let Some(locals) = &filters.placeholder_locals {
            config.placeholder_locals = locals.clone();
        }
        if let Some(domains) = &filters.public_email_domains {
            config.public_email_domains = domains.clone();
        }
    }

    if let Some(delays) = &file_config.delays {
        if let Some(secs) = delays.after_success {
            config.delay_after_success = Duration::from_secs_f32(secs);
        }
        if let Some(secs) = delays.after_failure {
            config.delay_after_failure = Duration::from_secs_f32(secs);
        }
        if let Some(secs) = delays.between_sites {
            config.delay_between_sites = Duration::from_secs_f32(secs);
        }
        if let Some(secs) = delays.between_tasks {
            config.delay_between_tasks = Duration::from_secs_f32(secs);
        }
    }
}

/// Apply command line overrides to the Config instance
fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(token) = &overrides.proxy_token {
        config.proxy_token = Some(token.clone());
    }
    if let Some(zone) = &overrides.proxy_zone {
        config.proxy_zone = zone.clone();
    }
    if let Some(timeout) = overrides.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(limit) = overrides.page_limit {
        config.page_limit = limit;
    }
    if let Some(threshold) = overrides.early_stop_threshold {
        config.early_stop_threshold = threshold;
    }
    if let Some(attempts) = overrides.max_fetch_attempts {
        config.max_fetch_attempts = attempts;
    }
}

fn validate_config(config: &mut Config) {
    if config.page_limit == 0 {
        config.page_limit = 1;
        tracing::warn!("Page limit was set to 0. Setting to 1.");
    }
    if config.page_limit > MAX_PAGE_LIMIT {
        config.page_limit = MAX_PAGE_LIMIT;
        tracing::warn!(
            "Page limit exceeded maximum ({}). Setting to {}.",
            MAX_PAGE_LIMIT,
            MAX_PAGE_LIMIT
        );
    }
    if config.max_fetch_attempts == 0 {
        config.max_fetch_attempts = 1;
        tracing::warn!("Max fetch attempts was set to 0. Setting to 1.");
    }
    if config.results_per_page == 0 {
        config.results_per_page = 100;
        tracing::warn!("Results per page was set to 0. Setting to 100.");
    }
    if config.delay_after_failure < config.delay_after_success {
        config.delay_after_failure = config.delay_after_success;
        tracing::warn!(
            "Failure delay was shorter than success delay. Setting both to {:?}",
            config.delay_after_success
        );
    }
}

pub(crate) fn build_config(overrides: &ConfigOverrides) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = overrides.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./serp-leads.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_overrides(&mut config, overrides);
    validate_config(&mut config);

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.page_limit, 2);
        assert_eq!(config.early_stop_threshold, 30);
        assert_eq!(config.max_consecutive_empty_pages, 2);
        assert_eq!(config.max_fetch_attempts, 2);
        assert_eq!(config.delay_after_success, Duration::from_secs(3));
        assert_eq!(config.delay_after_failure, Duration::from_secs(5));
        assert_eq!(config.search_engine_domain, "google.com");
    }

    #[test]
    fn test_validate_clamps_page_limit() {
        let mut config = Config {
            page_limit: 9,
            ..Config::default()
        };
        validate_config(&mut config);
        assert_eq!(config.page_limit, 5);

        config.page_limit = 0;
        validate_config(&mut config);
        assert_eq!(config.page_limit, 1);
    }

    #[test]
    fn test_file_config_overlay() {
        let file_config: ConfigFile = toml::from_str(
            r#"
            [proxy]
            zone = "serp_zone_2"

            [scraping]
            page_limit = 3
            early_stop_threshold = 50

            [delays]
            after_success = 1.5
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        apply_file_config(&mut config, &file_config);
        assert_eq!(config.proxy_zone, "serp_zone_2");
        assert_eq!(config.page_limit, 3);
        assert_eq!(config.early_stop_threshold, 50);
        assert_eq!(config.delay_after_success, Duration::from_secs_f32(1.5));
        // Untouched sections keep their defaults.
        assert_eq!(config.max_fetch_attempts, 2);
    }
}
