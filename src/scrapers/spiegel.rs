//! DER SPIEGEL adapter.
//!
//! Logs in through the `gruppenkonto.spiegel.de` account form, searches via
//! the JSON site-search endpoint and extracts headline, kicker, lead,
//! section headings and image captions from article pages.

use super::{
    Credentials, SourceAdapter, SourceOptions, fetch_article, get_search_page, has_cookie,
    select_text, select_texts, selector,
};
use crate::error::{AdapterError, ConfigError};
use crate::models::{ArticleFields, CandidateItem, ExtractedRecord};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use reqwest::multipart::Form;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use urlencoding::encode;

pub const PROFILE: &str = "spiegel";

const TARGET_URL: &str = "https://www.spiegel.de";
const SEARCH_URL: &str = "https://www.spiegel.de/services/sitesearch/search";
const AUTH_URL: &str = "https://gruppenkonto.spiegel.de/anmelden.html";
const SESSION_COOKIE: &str = "accessInfo";
const PAGE_SIZE: u32 = 50;

static CSRF_INPUT: Lazy<Selector> = Lazy::new(|| selector(r#"#loginform input[name="_csrf"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("main article header h2 .align-middle"));
static OVER_TITLE: Lazy<Selector> =
    Lazy::new(|| selector("main article header h2 .text-primary-base"));
static LEAD: Lazy<Selector> = Lazy::new(|| selector("main article header .leading-loose"));
static SUBTITLES: Lazy<Selector> = Lazy::new(|| selector("main article section h3"));
static CAPTIONS: Lazy<Selector> = Lazy::new(|| selector("main article figcaption p"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    url: Option<String>,
}

pub struct Spiegel {
    client: Client,
    jar: Arc<Jar>,
    credentials: Credentials,
    target: Url,
    term: String,
    days: u32,
    fields: String,
    segments: String,
}

impl Spiegel {
    pub fn new(options: &SourceOptions) -> Result<Self, ConfigError> {
        let credentials = options.credentials(PROFILE)?;
        let jar = Arc::new(Jar::default());
        let client = super::session_client(Arc::clone(&jar), options)?;
        let target = Url::parse(TARGET_URL).map_err(|e| ConfigError::InvalidSetting {
            name: "spiegel target url",
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            jar,
            credentials,
            target,
            term: options.spiegel_term.clone(),
            days: options.spiegel_days,
            fields: options.spiegel_fields.clone(),
            segments: options.spiegel_segments.clone(),
        })
    }

    /// Search URL for `page`, covering the last `days` days up to `before`
    /// (unix seconds).
    fn search_url(&self, page: u32, before: i64) -> String {
        let after = before - Duration::days(i64::from(self.days)).num_seconds();
        format!(
            "{SEARCH_URL}?segments={}&fields={}&q={}&after={after}&before={before}&page_size={PAGE_SIZE}&page={page}",
            encode(&self.segments),
            encode(&self.fields),
            encode(&self.term),
        )
    }
}

impl std::fmt::Debug for Spiegel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spiegel")
            .field("credentials", &self.credentials)
            .field("term", &self.term)
            .field("days", &self.days)
            .field("fields", &self.fields)
            .field("segments", &self.segments)
            .finish()
    }
}

#[async_trait]
impl SourceAdapter for Spiegel {
    fn name(&self) -> &'static str {
        PROFILE
    }

    #[instrument(level = "info", skip_all, fields(login = %self.credentials.login))]
    async fn authenticate(&self) -> Result<(), AdapterError> {
        let login_page = self.client.get(AUTH_URL).send().await?.text().await?;
        let csrf_token = extract_csrf_token(&login_page)
            .ok_or_else(|| AdapterError::Auth("csrf token not found".to_string()))?;

        let form = Form::new()
            .text("loginform", "loginform")
            .text("_csrf", csrf_token)
            .text("targetUrl", TARGET_URL)
            .text("requestAccessToken", "true")
            .text("loginform:step", "passwort")
            .text("loginform:username", self.credentials.login.clone())
            .text("loginform:password", self.credentials.password.clone())
            .text("loginform:submit", "")
            .text("javax.faces.ViewState", "stateless");
        let resp = self
            .client
            .post(AUTH_URL)
            .header(REFERER, AUTH_URL)
            .multipart(form)
            .send()
            .await?;
        debug!(status = %resp.status(), "Submitted login form");

        let auth_url = Url::parse(AUTH_URL)?;
        if !has_cookie(&self.jar, &[&auth_url, &self.target], |name| {
            name == SESSION_COOKIE
        }) {
            return Err(AdapterError::Auth("session cookie not found".to_string()));
        }

        info!("Logged in to DER SPIEGEL");
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn search_page(&self, page: u32) -> Result<Vec<String>, AdapterError> {
        let url = self.search_url(page, Utc::now().timestamp());
        let body = get_search_page(&self.client, &url).await?;
        let urls = match parse_search_results(&body, &self.target) {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, body = %truncate_for_log(&body, 300), "Search response did not parse");
                return Err(e.into());
            }
        };
        if urls.is_empty() {
            return Err(AdapterError::NotFound);
        }
        info!(count = urls.len(), "Indexed SPIEGEL article URLs");
        Ok(urls)
    }

    async fn fetch_and_extract(&self, item: &CandidateItem) -> Result<ExtractedRecord, AdapterError> {
        fetch_article(&self.client, item, extract_article).await
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        info!("SPIEGEL session closed");
        Ok(())
    }
}

fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&CSRF_INPUT)
        .filter_map(|input| input.value().attr("value"))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Absolute result URLs of a site-search response, without repeats.
fn parse_search_results(body: &str, base: &Url) -> Result<Vec<String>, serde_json::Error> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .results
        .into_iter()
        .filter_map(|result| result.url)
        .filter(|url| !url.trim().is_empty())
        .filter_map(|url| base.join(url.trim()).ok())
        .map(|url| url.to_string())
        .unique()
        .collect())
}

pub(crate) fn extract_article(html: &str) -> ArticleFields {
    let document = Html::parse_document(html);
    ArticleFields {
        title: select_text(&document, &TITLE),
        over_title: select_text(&document, &OVER_TITLE),
        lead: select_text(&document, &LEAD),
        subtitles: select_texts(&document, &SUBTITLES),
        image_captions: select_texts(&document, &CAPTIONS),
    }
}
