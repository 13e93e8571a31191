//! Site adapters for subscription news sources.
//!
//! Each adapter knows how to log in to one site, page through its search
//! results, and pull the structured fields out of a single article page.
//! The pipeline only sees the [`SourceAdapter`] trait; concrete adapters are
//! chosen at startup by profile name through [`build_adapter`].
//!
//! # Supported Sources
//!
//! | Profile | Module | Search | Login |
//! |---------|--------|--------|-------|
//! | `zeit` | [`zeit`] | HTML search page | CSRF cookie + multipart form |
//! | `spiegel` | [`spiegel`] | JSON site search | CSRF form field + multipart form |
//!
//! # Common Patterns
//!
//! Adapters share:
//! - One `reqwest::Client` per adapter with its own cookie jar, which holds
//!   the session after [`SourceAdapter::authenticate`]
//! - A per-request timeout; the pipeline itself never times out a call
//! - HTTP 429 on an article is reported as a rate-limited record, not an error
//! - An article page without a headline is reported as
//!   [`AdapterError::ArticleNotFound`]

use crate::error::{AdapterError, ConfigError};
use crate::models::{CandidateItem, ExtractedRecord};
use crate::utils::normalize_text;
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub mod spiegel;
pub mod zeit;

/// Capabilities the pipeline needs from a news source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Profile name, used in logs.
    fn name(&self) -> &'static str;

    /// Log in and keep the session cookies for later requests.
    async fn authenticate(&self) -> Result<(), AdapterError>;

    /// Article URLs on search results page `page` (1-based).
    ///
    /// Returns [`AdapterError::NotFound`] once there are no more pages.
    async fn search_page(&self, page: u32) -> Result<Vec<String>, AdapterError>;

    /// Download one article and extract its fields.
    ///
    /// A throttled request comes back as `Ok` with `rate_limited` set.
    async fn fetch_and_extract(&self, item: &CandidateItem) -> Result<ExtractedRecord, AdapterError>;

    /// Release adapter-local resources at the end of a run.
    async fn shutdown(&self) -> Result<(), AdapterError>;
}

/// Login credentials for a subscription site.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Everything an adapter may need to build itself.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub login: Option<String>,
    pub password: Option<String>,
    /// Zeit search mode (e.g. `7` for the last seven days).
    pub zeit_mode: String,
    /// Zeit content type filter (e.g. `article`).
    pub zeit_type: String,
    /// Spiegel search term.
    pub spiegel_term: String,
    /// Spiegel search window in days, ending now.
    pub spiegel_days: u32,
    /// Spiegel fields the search term is matched against.
    pub spiegel_fields: String,
    /// Spiegel site segments to search.
    pub spiegel_segments: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            login: None,
            password: None,
            zeit_mode: String::new(),
            zeit_type: String::new(),
            spiegel_term: String::new(),
            spiegel_days: 7,
            spiegel_fields: "content".to_string(),
            spiegel_segments: "spon".to_string(),
            request_timeout: Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SourceOptions {
    /// Both login and password, or a configuration error naming the profile.
    pub fn credentials(&self, profile: &'static str) -> Result<Credentials, ConfigError> {
        match (self.login.as_deref(), self.password.as_deref()) {
            (Some(login), Some(password)) if !login.is_empty() && !password.is_empty() => {
                Ok(Credentials {
                    login: login.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(ConfigError::MissingCredentials(profile)),
        }
    }
}

type AdapterFactory = fn(&SourceOptions) -> Result<Arc<dyn SourceAdapter>, ConfigError>;

const PROFILES: &[(&str, AdapterFactory)] = &[
    (zeit::PROFILE, zeit_adapter),
    (spiegel::PROFILE, spiegel_adapter),
];

fn zeit_adapter(options: &SourceOptions) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    let adapter: Arc<dyn SourceAdapter> = Arc::new(zeit::Zeit::new(options)?);
    Ok(adapter)
}

fn spiegel_adapter(options: &SourceOptions) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    let adapter: Arc<dyn SourceAdapter> = Arc::new(spiegel::Spiegel::new(options)?);
    Ok(adapter)
}

/// Names of all registered profiles.
pub fn profile_names() -> Vec<&'static str> {
    PROFILES.iter().map(|(name, _)| *name).collect()
}

/// Build the adapter registered under `profile`.
///
/// # Errors
///
/// [`ConfigError::UnknownProfile`] for an unregistered name, or whatever the
/// adapter reports while validating `options` (missing credentials, HTTP
/// client setup).
#[instrument(level = "info", skip(options))]
pub fn build_adapter(
    profile: &str,
    options: &SourceOptions,
) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    let (_, factory) = PROFILES
        .iter()
        .find(|(name, _)| *name == profile)
        .ok_or_else(|| {
            ConfigError::UnknownProfile(profile.to_string(), profile_names().join(", "))
        })?;
    factory(options)
}

/// HTTP client bound to `jar`, so every request carries the session cookies.
pub(crate) fn session_client(jar: Arc<Jar>, options: &SourceOptions) -> Result<Client, ConfigError> {
    Client::builder()
        .cookie_provider(jar)
        .timeout(options.request_timeout)
        .user_agent(options.user_agent.clone())
        .build()
        .map_err(ConfigError::HttpClient)
}

/// Whether the jar holds a cookie for any of `urls` whose name matches.
pub(crate) fn has_cookie(jar: &Jar, urls: &[&Url], matches: impl Fn(&str) -> bool) -> bool {
    urls.iter()
        .filter_map(|url| jar.cookies(url))
        .filter_map(|header| header.to_str().map(str::to_owned).ok())
        .any(|header| {
            header
                .split(';')
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(name, _)| matches(name))
        })
}

/// Download a search results page.
///
/// A 404 means the search ran past its last page.
#[instrument(level = "debug", skip(client))]
pub(crate) async fn get_search_page(client: &Client, url: &str) -> Result<String, AdapterError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(AdapterError::NotFound);
    }
    if !status.is_success() {
        return Err(AdapterError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(resp.text().await?)
}

/// Download an article page and run `extract` over its HTML.
#[instrument(level = "debug", skip_all, fields(url = %item.identifier))]
pub(crate) async fn fetch_article(
    client: &Client,
    item: &CandidateItem,
    extract: fn(&str) -> crate::models::ArticleFields,
) -> Result<ExtractedRecord, AdapterError> {
    let resp = client.get(&item.identifier).send().await?;
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Ok(ExtractedRecord::rate_limited(item));
    }
    if !status.is_success() {
        return Err(AdapterError::Status {
            url: item.identifier.clone(),
            status,
        });
    }

    let body = resp.text().await?;
    let fields = extract(&body);
    if fields.title.is_empty() {
        return Err(AdapterError::ArticleNotFound(item.identifier.clone()));
    }
    debug!(
        subtitles = fields.subtitles.len(),
        captions = fields.image_captions.len(),
        "Parsed article"
    );
    Ok(ExtractedRecord::extracted(item, fields))
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Text of every element matching `selector`, concatenated and normalised.
pub(crate) fn select_text(doc: &Html, selector: &Selector) -> String {
    let joined = doc
        .select(selector)
        .flat_map(|element| element.text())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined)
}

/// Normalised text of each element matching `selector`, skipping empty ones.
pub(crate) fn select_texts(doc: &Html, selector: &Selector) -> Vec<String> {
    doc.select(selector)
        .map(|element| normalize_text(&element.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with_credentials() -> SourceOptions {
        SourceOptions {
            login: Some("reader@example.com".to_string()),
            password: Some("secret".to_string()),
            ..SourceOptions::default()
        }
    }

    #[test]
    fn test_registry_lists_profiles() {
        assert_eq!(profile_names(), vec!["zeit", "spiegel"]);
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let err = build_adapter("faz", &options_with_credentials()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownProfile(ref name, _) if name == "faz"));
        assert!(err.to_string().contains("zeit, spiegel"));
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let options = SourceOptions {
            login: Some("reader@example.com".to_string()),
            ..SourceOptions::default()
        };
        let err = build_adapter("spiegel", &options).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredentials("spiegel")));
    }

    #[test]
    fn test_empty_password_counts_as_missing() {
        let options = SourceOptions {
            password: Some(String::new()),
            ..options_with_credentials()
        };
        assert!(options.credentials("zeit").is_err());
    }

    #[test]
    fn test_build_known_profiles() {
        let options = options_with_credentials();
        assert_eq!(build_adapter("zeit", &options).unwrap().name(), "zeit");
        assert_eq!(build_adapter("spiegel", &options).unwrap().name(), "spiegel");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = options_with_credentials().credentials("zeit").unwrap();
        let shown = format!("{creds:?}");
        assert!(shown.contains("reader@example.com"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_has_cookie_matches_by_name() {
        let jar = Jar::default();
        let url = Url::parse("https://www.zeit.de/").unwrap();
        jar.add_cookie_str("zeit_sso_201501=abc; Path=/", &url);

        assert!(has_cookie(&jar, &[&url], |name| name.contains("zeit_sso_")));
        assert!(!has_cookie(&jar, &[&url], |name| name == "accessInfo"));
    }

    #[test]
    fn test_select_text_and_texts() {
        let doc = Html::parse_document(
            "<div><h3> Eins </h3><h3>\n</h3><h3>Zwei\n  Drei</h3></div>",
        );
        let h3 = selector("h3");
        assert_eq!(select_texts(&doc, &h3), vec!["Eins", "Zwei Drei"]);
        assert_eq!(select_text(&doc, &h3), "Eins Zwei Drei");
    }
}
