use crate::config::GithubConfig;
use crate::errors::AnalyzerError;
use crate::logging::append_run_log;
use crate::runtime::{HttpRequest, HttpResponse, HttpTransport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "stargazers_count", default)]
    pub stars: u64,
    #[serde(rename = "forks_count", default)]
    pub forks: u64,
    #[serde(rename = "private", default)]
    pub is_private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositoryListing {
    pub repositories: Vec<RepositoryRecord>,
    pub pages_fetched: u32,
    /// Lowest `X-RateLimit-Remaining` seen while paging, if reported.
    pub min_rate_limit_remaining: Option<u64>,
    /// Set when a page after the first failed; `repositories` then holds
    /// everything fetched before it.
    pub truncated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
}

pub struct GithubClient<'a> {
    transport: &'a dyn HttpTransport,
    config: &'a GithubConfig,
    token: String,
}

impl<'a> GithubClient<'a> {
    pub fn new(
        transport: &'a dyn HttpTransport,
        config: &'a GithubConfig,
        token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            token: token.into(),
        }
    }

    /// Preflight check: a 401 means the token is rejected and the run must stop.
    pub fn validate_token(&self) -> Result<Option<AuthenticatedUser>, AnalyzerError> {
        append_run_log(
            "info",
            "github.token.validate.started",
            json!({ "api_base": self.config.api_base }),
        );
        let response = self.transport.get(self.request("/user")).map_err(|e| {
            append_run_log(
                "error",
                "github.token.validate.transport_failed",
                json!({ "error": e.to_string() }),
            );
            AnalyzerError::Http(format!("error validating GitHub token: {e}"))
        })?;
        if response.status == 401 {
            append_run_log(
                "error",
                "github.token.validate.rejected",
                json!({ "status": response.status }),
            );
            return Err(AnalyzerError::Auth("Invalid GitHub token".to_string()));
        }
        let user = serde_json::from_str::<AuthenticatedUser>(&response.body).ok();
        append_run_log(
            "info",
            "github.token.validate.accepted",
            json!({
                "status": response.status,
                "login": user.as_ref().map(|u| u.login.as_str()),
            }),
        );
        Ok(user)
    }

    /// Pages through the owner's repositories until an empty page comes back.
    ///
    /// `on_low_rate_limit` is called with the remaining quota for every page
    /// that reports less than `rate_limit_warn_below`. A failure on the first
    /// page is an error; a later failure stops paging and keeps what was
    /// already collected.
    pub fn list_repositories(
        &self,
        owner: &str,
        on_low_rate_limit: &mut dyn FnMut(u64) -> Result<(), AnalyzerError>,
    ) -> Result<RepositoryListing, AnalyzerError> {
        let mut listing = RepositoryListing::default();
        let mut page = 1u32;
        loop {
            let batch = match self.fetch_page(owner, page, &mut listing, on_low_rate_limit) {
                Ok(batch) => batch,
                Err(error) if listing.repositories.is_empty() => return Err(error),
                Err(error) => {
                    append_run_log(
                        "warn",
                        "github.repos.listing_truncated",
                        json!({
                            "owner": owner,
                            "page": page,
                            "kept": listing.repositories.len(),
                            "error": error.to_string(),
                        }),
                    );
                    listing.truncated_by = Some(error.to_string());
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            listing.repositories.extend(batch);
            page += 1;
        }

        append_run_log(
            "info",
            "github.repos.listed",
            json!({
                "owner": owner,
                "count": listing.repositories.len(),
                "pages": listing.pages_fetched,
                "truncated": listing.truncated_by.is_some(),
            }),
        );
        Ok(listing)
    }

    fn fetch_page(
        &self,
        owner: &str,
        page: u32,
        listing: &mut RepositoryListing,
        on_low_rate_limit: &mut dyn FnMut(u64) -> Result<(), AnalyzerError>,
    ) -> Result<Vec<RepositoryRecord>, AnalyzerError> {
        let request = self
            .request(&format!("/users/{owner}/repos"))
            .query("per_page", self.config.per_page)
            .query("page", page)
            .query("type", "owner")
            .query("sort", "updated");
        let response = self.transport.get(request)?;
        if !response.is_success() {
            append_run_log(
                "warn",
                "github.repos.page_failed",
                json!({
                    "owner": owner,
                    "page": page,
                    "status": response.status,
                }),
            );
            return Err(AnalyzerError::Http(format!(
                "listing repositories for {owner} failed with status {}",
                response.status
            )));
        }

        let batch: Vec<RepositoryRecord> = serde_json::from_str(&response.body)
            .map_err(|e| AnalyzerError::Parse(format!("invalid repository page {page}: {e}")))?;
        listing.pages_fetched += 1;
        if let Some(remaining) = self.track_rate_limit(&response, listing, page) {
            on_low_rate_limit(remaining)?;
        }
        append_run_log(
            "debug",
            "github.repos.page_fetched",
            json!({
                "owner": owner,
                "page": page,
                "count": batch.len(),
            }),
        );
        Ok(batch)
    }

    /// Records the page's remaining quota; returns it when it is below the
    /// warning threshold.
    fn track_rate_limit(
        &self,
        response: &HttpResponse,
        listing: &mut RepositoryListing,
        page: u32,
    ) -> Option<u64> {
        let remaining = response
            .header("x-ratelimit-remaining")
            .and_then(|value| value.trim().parse::<u64>().ok())?;
        listing.min_rate_limit_remaining = Some(
            listing
                .min_rate_limit_remaining
                .map_or(remaining, |seen| seen.min(remaining)),
        );
        if remaining >= self.config.rate_limit_warn_below {
            return None;
        }
        append_run_log(
            "warn",
            "github.rate_limit.low",
            json!({ "page": page, "remaining": remaining }),
        );
        Some(remaining)
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.config.api_base.trim_end_matches('/')))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::runtime::FakeHttpTransport;
    use std::collections::BTreeMap;

    fn repo_json(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "full_name": format!("octo/{name}"),
            "description": null,
            "language": "Rust",
            "updated_at": "2026-01-01T00:00:00Z",
            "size": 12,
            "stargazers_count": 3,
            "forks_count": 1,
            "private": false,
            "default_branch": "main"
        })
    }

    #[test]
    fn listing_pages_until_an_empty_page() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_json(200, json!([repo_json("api"), repo_json("web")]).to_string());
        http.push_json(200, json!([repo_json("worker")]).to_string());
        http.push_json(200, "[]");

        let client = GithubClient::new(&http, &cfg.github, "tok");
        let listing = client
            .list_repositories("octo", &mut |_| Ok(()))
            .expect("listing");
        let names: Vec<_> = listing.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web", "worker"]);
        assert_eq!(listing.pages_fetched, 3);
        assert_eq!(listing.truncated_by, None);

        let requests = http.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, "https://api.github.com/users/octo/repos");
        assert!(requests[1]
            .query
            .contains(&("page".to_string(), "2".to_string())));
        assert!(requests[0]
            .headers
            .contains(&("Authorization".to_string(), "token tok".to_string())));
    }

    fn page_with_remaining(body: serde_json::Value, remaining: &str) -> HttpResponse {
        let mut headers = BTreeMap::new();
        headers.insert("x-ratelimit-remaining".to_string(), remaining.to_string());
        HttpResponse {
            status: 200,
            headers,
            body: body.to_string(),
        }
    }

    #[test]
    fn low_rate_limits_are_reported_for_each_page_as_it_arrives() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_response(Ok(page_with_remaining(json!([repo_json("api")]), "9")));
        http.push_response(Ok(page_with_remaining(json!([repo_json("web")]), "50")));
        http.push_response(Ok(page_with_remaining(json!([]), "7")));

        let client = GithubClient::new(&http, &cfg.github, "tok");
        let mut warnings = Vec::new();
        let listing = client
            .list_repositories("octo", &mut |remaining| {
                warnings.push(remaining);
                Ok(())
            })
            .expect("listing");
        assert_eq!(warnings, vec![9, 7]);
        assert_eq!(listing.min_rate_limit_remaining, Some(7));
    }

    #[test]
    fn first_page_failures_are_errors() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_json(404, "{\"message\":\"Not Found\"}");
        let client = GithubClient::new(&http, &cfg.github, "tok");
        let err = client
            .list_repositories("ghost", &mut |_| Ok(()))
            .expect_err("404");
        assert!(err.to_string().contains("status 404"));
    }

    #[test]
    fn later_page_failures_keep_the_repositories_already_fetched() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_json(200, json!([repo_json("api"), repo_json("web")]).to_string());
        http.push_json(502, "bad gateway");

        let client = GithubClient::new(&http, &cfg.github, "tok");
        let listing = client
            .list_repositories("o", &mut |_| Ok(()))
            .expect("partial listing");
        let names: Vec<_> = listing.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
        assert_eq!(listing.pages_fetched, 1);
        assert!(listing
            .truncated_by
            .as_deref()
            .is_some_and(|reason| reason.contains("status 502")));

        http.push_json(200, json!([repo_json("api")]).to_string());
        http.push_response(Err(AnalyzerError::Http("connection reset".to_string())));
        let listing = client
            .list_repositories("o", &mut |_| Ok(()))
            .expect("partial listing");
        assert_eq!(listing.repositories.len(), 1);
        assert!(listing.truncated_by.is_some());
    }

    #[test]
    fn missing_optional_fields_deserialize_to_none() {
        let record: RepositoryRecord =
            serde_json::from_str(r#"{"name":"x","full_name":"o/x"}"#).expect("record");
        assert_eq!(record.description, None);
        assert_eq!(record.language, None);
        assert_eq!(record.stars, 0);
    }

    #[test]
    fn token_validation_rejects_401_only() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_json(401, "{\"message\":\"Bad credentials\"}");
        http.push_json(200, "{\"login\":\"octo\"}");
        http.push_json(403, "{}");

        let client = GithubClient::new(&http, &cfg.github, "tok");
        let err = client.validate_token().expect_err("rejected");
        assert!(matches!(err, AnalyzerError::Auth(_)));

        let user = client.validate_token().expect("accepted");
        assert_eq!(user.map(|u| u.login), Some("octo".to_string()));

        assert_eq!(client.validate_token().expect("not a 401"), None);
        assert_eq!(http.requests()[0].url, "https://api.github.com/user");
    }

    #[test]
    fn token_validation_transport_failure_is_fatal() {
        let cfg = AppConfig::default();
        let http = FakeHttpTransport::default();
        http.push_response(Err(AnalyzerError::Http("dns".to_string())));
        let client = GithubClient::new(&http, &cfg.github, "tok");
        let err = client.validate_token().expect_err("transport");
        assert!(err.to_string().contains("error validating GitHub token"));
    }
}
