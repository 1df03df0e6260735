use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dealscout_core::models::QuotaState;

use crate::{ApiError, CredentialCache, Result};

/// Developer analytics wire shape: context -> resources -> rate entries
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitsResponse {
    #[serde(default)]
    rate_limits: Vec<ApiRateLimits>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRateLimits {
    #[serde(default)]
    resources: Vec<ResourceRates>,
}

#[derive(Debug, Deserialize)]
struct ResourceRates {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rates: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateEntry {
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    remaining: u64,
    /// RFC3339 string; parsed by hand so a bad timestamp fails with
    /// something more useful than a generic decode error
    #[serde(default)]
    reset: String,
    #[serde(default)]
    time_window: u64,
}

/// Read-only client for the authoritative quota snapshot of one resource
///
/// Never touches the governor itself; a scheduled job (or the `quota` CLI
/// subcommand) is expected to feed the snapshot into `RateGovernor::sync`.
pub struct RateLimitsClient {
    client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    base_url: String,
    api_context: String,
    api_name: String,
    resource: String,
}

impl RateLimitsClient {
    pub fn new(
        credentials: Arc<CredentialCache>,
        base_url: impl Into<String>,
        api_context: impl Into<String>,
        api_name: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DealScout/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            credentials,
            base_url: base_url.into(),
            api_context: api_context.into(),
            api_name: api_name.into(),
            resource: resource.into(),
        }
    }

    /// Fetch the authoritative quota snapshot for the configured resource
    pub async fn get_quota(&self) -> Result<QuotaState> {
        let token = self.credentials.token().await?;
        let url = format!("{}/rate_limit", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("api_context", self.api_context.as_str()),
                ("api_name", self.api_name.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body: crate::browse::truncate_body(&body),
            });
        }

        let body = response.text().await?;
        let parsed: RateLimitsResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("rate limits response: {}", e)))?;

        extract_quota(&parsed, &self.resource)
    }
}

/// Walk the nested response down to the first rate entry of the named
/// resource. Exact name match only - a miss usually means a misconfigured
/// resource name, not a transient fault.
fn extract_quota(response: &RateLimitsResponse, resource: &str) -> Result<QuotaState> {
    let entry = response
        .rate_limits
        .iter()
        .flat_map(|api| api.resources.iter())
        .find(|r| r.name == resource)
        .ok_or_else(|| ApiError::QuotaResourceNotFound(resource.to_string()))?;

    let rate = entry
        .rates
        .first()
        .ok_or_else(|| ApiError::QuotaNoRates(resource.to_string()))?;

    let reset_at = DateTime::parse_from_rfc3339(&rate.reset)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ApiError::Parse(format!(
                "reset timestamp {:?} for resource {}: {}",
                rate.reset, resource, e
            ))
        })?;

    Ok(QuotaState {
        resource: resource.to_string(),
        count: rate.limit.saturating_sub(rate.remaining),
        limit: rate.limit,
        remaining: rate.remaining,
        reset_at,
        time_window_secs: rate.time_window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(resource_name: &str, rates: &str) -> RateLimitsResponse {
        let json = format!(
            r#"{{
                "rateLimits": [
                    {{
                        "apiContext": "buy",
                        "apiName": "browse",
                        "resources": [
                            {{ "name": "{}", "rates": {} }}
                        ]
                    }}
                ]
            }}"#,
            resource_name, rates
        );
        serde_json::from_str(&json).expect("fixture should parse")
    }

    #[test]
    fn extracts_first_rate_entry_for_matching_resource() {
        let response = sample_response(
            "buy.browse",
            r#"[{"limit": 5000, "remaining": 4890, "reset": "2026-08-31T12:00:00.000Z", "timeWindow": 86400},
               {"limit": 1, "remaining": 1, "reset": "2026-08-31T12:00:00.000Z", "timeWindow": 60}]"#,
        );

        let quota = extract_quota(&response, "buy.browse").expect("quota extracted");
        assert_eq!(quota.limit, 5000);
        assert_eq!(quota.remaining, 4890);
        assert_eq!(quota.count, 110);
        assert_eq!(quota.time_window_secs, 86400);

        let expected = DateTime::parse_from_rfc3339("2026-08-31T12:00:00Z")
            .expect("fixture timestamp")
            .with_timezone(&Utc);
        assert_eq!(quota.reset_at, expected);
    }

    #[test]
    fn missing_resource_is_a_not_found_error() {
        let response = sample_response(
            "buy.browse",
            r#"[{"limit": 10, "remaining": 10, "reset": "2026-08-31T12:00:00Z", "timeWindow": 86400}]"#,
        );

        let err = extract_quota(&response, "buy.feed").expect_err("must miss");
        assert!(matches!(err, ApiError::QuotaResourceNotFound(name) if name == "buy.feed"));
    }

    #[test]
    fn resource_with_empty_rates_is_a_distinct_error() {
        let response = sample_response("buy.browse", "[]");

        let err = extract_quota(&response, "buy.browse").expect_err("must fail");
        assert!(matches!(err, ApiError::QuotaNoRates(name) if name == "buy.browse"));
    }

    #[test]
    fn garbage_reset_timestamp_fails_descriptively() {
        let response = sample_response(
            "buy.browse",
            r#"[{"limit": 10, "remaining": 5, "reset": "next tuesday", "timeWindow": 86400}]"#,
        );

        let err = extract_quota(&response, "buy.browse").expect_err("must fail");
        match err {
            ApiError::Parse(msg) => {
                assert!(msg.contains("next tuesday"));
                assert!(msg.contains("buy.browse"));
            }
            other => panic!("expected Parse, got {:?}", other),
        }
    }
}
