//! API server exposing the scrape pipeline over HTTP.

use crate::config::Config;
use crate::fetcher::ProxyFetcher;
use crate::models::{ScrapeResult, SearchCriteria};
use crate::orchestrator::Scraper;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};
use serde::{Deserialize, Serialize};

/// API response structure
#[derive(Serialize, Deserialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ScrapeResult>,
}

/// Start the API server
pub(crate) async fn start_api_server(
    config: Arc<Config>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = ProxyFetcher::new(config.clone())?;
    let scraper = Arc::new(Scraper::new(config, fetcher));
    let scraper_filter = warp::any().map(move || scraper.clone());

    // The upstream proxy rate-limits aggressively, so at most one scrape
    // runs at a time; concurrent requests queue on the permit.
    let semaphore = Arc::new(Semaphore::new(1));
    let semaphore_filter = warp::any().map(move || semaphore.clone());

    // Health check endpoint
    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&ApiResponse {
            success: true,
            message: "serp-leads API is running".to_string(),
            result: None,
        })
    });

    // Single scrape endpoint
    let scrape = warp::path("scrape")
        .and(warp::post())
        .and(warp::body::json())
        .and(scraper_filter)
        .and(semaphore_filter)
        .and_then(handle_scrape);

    let routes = health
        .or(scrape)
        .recover(handle_rejection)
        .with(warp::cors().allow_any_origin());

    tracing::info!("Starting API server on port {}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}

/// Handle a single scrape request
async fn handle_scrape(
    criteria: SearchCriteria,
    scraper: Arc<Scraper<ProxyFetcher>>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Processing scrape request for '{}'", criteria.profession);
    let result = scraper.scrape(&criteria).await;

    let message = if result.succeeded {
        format!("Scrape finished with {} emails", result.emails.len())
    } else {
        "Scrape rejected".to_string()
    };
    Ok(warp::reply::json(&ApiResponse {
        success: result.succeeded,
        message,
        result: Some(result),
    }))
}

/// Custom error type for API rejections
#[derive(Debug)]
struct ApiError;

impl warp::reject::Reject for ApiError {}

/// Handle API rejections
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if err.is_not_found() {
        Ok(warp::reply::with_status(
            warp::reply::json(&ApiResponse {
                success: false,
                message: "Not Found".to_string(),
                result: None,
            }),
            StatusCode::NOT_FOUND,
        ))
    } else if err.find::<ApiError>().is_some() {
        Ok(warp::reply::with_status(
            warp::reply::json(&ApiResponse {
                success: false,
                message: "Server error".to_string(),
                result: None,
            }),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else {
        Ok(warp::reply::with_status(
            warp::reply::json(&ApiResponse {
                success: false,
                message: "Bad request".to_string(),
                result: None,
            }),
            StatusCode::BAD_REQUEST,
        ))
    }
}
