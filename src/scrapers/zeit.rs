//! ZEIT ONLINE adapter.
//!
//! Logs in through the `meine.zeit.de` form, pages through
//! `https://www.zeit.de/suche/index` and extracts headline, kicker, summary
//! and subheadings from article pages.
//!
//! # Login Flow
//!
//! 1. `GET /anmelden` sets a `csrf_token` cookie
//! 2. `POST /anmelden` with a multipart form echoing that token
//! 3. Success leaves a `zeit_sso_*` session cookie in the jar; a consent
//!    cookie is added so article pages skip the cookie wall
//!
//! # Search Results
//!
//! Teasers marked with the Z+ logo are paywalled beyond our subscription
//! tier and are skipped.

use super::{
    Credentials, SourceAdapter, SourceOptions, fetch_article, get_search_page, has_cookie,
    select_text, select_texts, selector,
};
use crate::error::{AdapterError, ConfigError};
use crate::models::{ArticleFields, CandidateItem, ExtractedRecord};
use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use reqwest::multipart::Form;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;
use urlencoding::encode;

pub const PROFILE: &str = "zeit";

const BASE_URL: &str = "https://www.zeit.de";
const SEARCH_URL: &str = "https://www.zeit.de/suche/index";
const AUTH_URL: &str = "https://meine.zeit.de/anmelden";
const CSRF_COOKIE: &str = "csrf_token";
const SESSION_COOKIE_PREFIX: &str = "zeit_sso_";
const CONSENT_COOKIE: &str = "zonconsent=2023-03-14T16:29:12.611Z; Domain=.zeit.de; Path=/; Secure";

static TEASER_LINK: Lazy<Selector> = Lazy::new(|| selector("a.zon-teaser-standard__faux-link"));
static ZPLUS_MARK: Lazy<Selector> =
    Lazy::new(|| selector(".zon-teaser-standard__heading svg.zplus-logo"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector(".article-header h1 .article-heading__title"));
static OVER_TITLE: Lazy<Selector> =
    Lazy::new(|| selector(".article-header .article-heading__kicker"));
static LEAD: Lazy<Selector> = Lazy::new(|| selector(".article-header .summary"));
static SUBTITLES: Lazy<Selector> = Lazy::new(|| selector("h2.article__subheading"));
static CAPTIONS: Lazy<Selector> = Lazy::new(|| selector("figure figcaption"));

pub struct Zeit {
    client: Client,
    jar: Arc<Jar>,
    credentials: Credentials,
    base: Url,
    mode: String,
    kind: String,
}

impl Zeit {
    pub fn new(options: &SourceOptions) -> Result<Self, ConfigError> {
        let credentials = options.credentials(PROFILE)?;
        let jar = Arc::new(Jar::default());
        let client = super::session_client(Arc::clone(&jar), options)?;
        let base = Url::parse(BASE_URL).map_err(|e| ConfigError::InvalidSetting {
            name: "zeit base url",
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            jar,
            credentials,
            base,
            mode: options.zeit_mode.clone(),
            kind: options.zeit_type.clone(),
        })
    }

    fn search_url(&self, page: u32) -> String {
        format!(
            "{SEARCH_URL}?q=&mode={}&type={}&p={page}",
            encode(&self.mode),
            encode(&self.kind)
        )
    }
}

impl std::fmt::Debug for Zeit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zeit")
            .field("credentials", &self.credentials)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl SourceAdapter for Zeit {
    fn name(&self) -> &'static str {
        PROFILE
    }

    #[instrument(level = "info", skip_all, fields(login = %self.credentials.login))]
    async fn authenticate(&self) -> Result<(), AdapterError> {
        let resp = self.client.get(AUTH_URL).send().await?;
        let csrf_token = resp
            .cookies()
            .find(|cookie| cookie.name() == CSRF_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| AdapterError::Auth("csrf token not found".to_string()))?;

        let form = Form::new()
            .text("entry_service", "sonstige")
            .text("product_id", "sonstige")
            .text("return_url", "")
            .text("email", self.credentials.login.clone())
            .text("pass", self.credentials.password.clone())
            .text("permanent", "on")
            .text("csrf_token", csrf_token);
        let resp = self
            .client
            .post(AUTH_URL)
            .header(REFERER, AUTH_URL)
            .multipart(form)
            .send()
            .await?;
        debug!(status = %resp.status(), "Submitted login form");

        let auth_url = Url::parse(AUTH_URL)?;
        if !has_cookie(&self.jar, &[&auth_url, &self.base], |name| {
            name.contains(SESSION_COOKIE_PREFIX)
        }) {
            return Err(AdapterError::Auth("session cookie not found".to_string()));
        }
        self.jar.add_cookie_str(CONSENT_COOKIE, &self.base);

        info!("Logged in to ZEIT ONLINE");
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn search_page(&self, page: u32) -> Result<Vec<String>, AdapterError> {
        let html = get_search_page(&self.client, &self.search_url(page)).await?;
        let urls = extract_search_links(&html, &self.base);
        if urls.is_empty() {
            return Err(AdapterError::NotFound);
        }
        info!(count = urls.len(), "Indexed ZEIT article URLs");
        Ok(urls)
    }

    async fn fetch_and_extract(&self, item: &CandidateItem) -> Result<ExtractedRecord, AdapterError> {
        fetch_article(&self.client, item, extract_article).await
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        info!("ZEIT session closed");
        Ok(())
    }
}

/// Absolute URLs of the free articles on a search results page, in page
/// order and without repeats.
pub(crate) fn extract_search_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&TEASER_LINK)
        .filter(|link| !is_paywalled(link))
        .filter_map(|link| link.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string())
        .unique()
        .collect()
}

fn is_paywalled(link: &ElementRef) -> bool {
    link.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|teaser| teaser.select(&ZPLUS_MARK).next().is_some())
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

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
        <html><body>
          <article class="zon-teaser-standard">
            <h3 class="zon-teaser-standard__heading">Frei</h3>
            <a class="zon-teaser-standard__faux-link" href="https://www.zeit.de/politik/2024-05/frei"></a>
          </article>
          <article class="zon-teaser-standard">
            <h3 class="zon-teaser-standard__heading"><svg class="zplus-logo"></svg>Bezahlt</h3>
            <a class="zon-teaser-standard__faux-link" href="https://www.zeit.de/politik/2024-05/zplus"></a>
          </article>
          <article class="zon-teaser-standard">
            <a class="zon-teaser-standard__faux-link" href="/wirtschaft/2024-05/relativ"></a>
          </article>
          <article class="zon-teaser-standard">
            <a class="zon-teaser-standard__faux-link" href="https://www.zeit.de/politik/2024-05/frei"></a>
            <a class="zon-teaser-standard__faux-link" href=""></a>
          </article>
        </body></html>
    "#;

    const ARTICLE_FIXTURE: &str = r#"
        <html><body>
          <header class="article-header">
            <h1>
              <span class="article-heading__kicker">Haushaltsstreit</span>
              <span class="article-heading__title">Die Koalition
                 ringt um Milliarden</span>
            </h1>
            <div class="summary"> Der Finanzminister legt einen Entwurf vor. </div>
          </header>
          <h2 class="article__subheading article__item">Wer zahlt?</h2>
          <h2 class="article__subheading article__item">  </h2>
          <h2 class="article__subheading article__item">Was folgt</h2>
          <figure><img src="x.jpg"><figcaption>Der Bundestag in Berlin</figcaption></figure>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse(BASE_URL).unwrap()
    }

    #[test]
    fn test_extract_search_links_skips_paywalled_and_repeats() {
        let urls = extract_search_links(SEARCH_FIXTURE, &base());
        assert_eq!(
            urls,
            vec![
                "https://www.zeit.de/politik/2024-05/frei",
                "https://www.zeit.de/wirtschaft/2024-05/relativ",
            ]
        );
    }

    #[test]
    fn test_extract_search_links_empty_page() {
        assert!(extract_search_links("<html><body></body></html>", &base()).is_empty());
    }

    #[test]
    fn test_extract_article_fields() {
        let fields = extract_article(ARTICLE_FIXTURE);
        assert_eq!(fields.title, "Die Koalition ringt um Milliarden");
        assert_eq!(fields.over_title, "Haushaltsstreit");
        assert_eq!(fields.lead, "Der Finanzminister legt einen Entwurf vor.");
        assert_eq!(fields.subtitles, vec!["Wer zahlt?", "Was folgt"]);
        assert_eq!(fields.image_captions, vec!["Der Bundestag in Berlin"]);
    }

    #[test]
    fn test_extract_article_without_headline() {
        let fields = extract_article("<html><body><p>Seite nicht gefunden</p></body></html>");
        assert!(fields.title.is_empty());
    }

    #[test]
    fn test_search_url_encodes_filters() {
        let options = SourceOptions {
            login: Some("a".to_string()),
            password: Some("b".to_string()),
            zeit_mode: "7".to_string(),
            zeit_type: "article video".to_string(),
            ..SourceOptions::default()
        };
        let zeit = Zeit::new(&options).unwrap();
        assert_eq!(
            zeit.search_url(3),
            "https://www.zeit.de/suche/index?q=&mode=7&type=article%20video&p=3"
        );
    }
}
