//! HTTP client for a Prismic-style content API

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::{ApiInfo, ContentSource, CmsError, Cursor, Document, Query, ReleaseRef, Result, SearchResponse};
use crate::config::CmsConfig;

/// Remote content API client
pub struct PrismicClient {
    http: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
    retries: u32,
    backoff: Duration,
    master_ref: OnceCell<String>,
}

impl PrismicClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &CmsConfig) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim())
            .map_err(|e| CmsError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(CmsError::InvalidEndpoint(config.endpoint.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            retries: config.retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            master_ref: OnceCell::new(),
        })
    }

    /// URL of the search endpoint for `query`, pinned to `reference`
    pub fn search_url(&self, query: &Query, reference: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CmsError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["documents", "search"]);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("ref", reference);
            pairs.append_pair("q", &query.predicate());
            pairs.append_pair("pageSize", &query.page_size.to_string());
            if query.page > 1 {
                pairs.append_pair("page", &query.page.to_string());
            }
            if let Some(orderings) = query.orderings_param() {
                pairs.append_pair("orderings", &orderings);
            }
            if let Some(after) = &query.after {
                pairs.append_pair("after", after);
            }
            if let Some(token) = &self.access_token {
                pairs.append_pair("access_token", token);
            }
        }

        Ok(url)
    }

    /// URL looking a single document up by uid
    fn uid_url(&self, document_type: &str, uid: &str, reference: &str) -> Result<Url> {
        let mut url = self.search_url(&Query::new(document_type).page_size(1), reference)?;
        let predicate = format!("[[at(my.{}.uid, \"{}\")]]", document_type, uid);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                if k == "q" {
                    (k.into_owned(), predicate.clone())
                } else {
                    (k.into_owned(), v.into_owned())
                }
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        Ok(url)
    }

    /// Ref to query with: the preview release when given, else master
    async fn resolve_ref(&self, release: Option<&ReleaseRef>) -> Result<String> {
        if let Some(release) = release {
            return Ok(release.as_str().to_string());
        }

        let master = self
            .master_ref
            .get_or_try_init(|| async {
                let mut url = self.endpoint.clone();
                if let Some(token) = &self.access_token {
                    url.query_pairs_mut().append_pair("access_token", token);
                }
                let info: ApiInfo = self.get_json(url).await?;
                let master = info
                    .refs
                    .into_iter()
                    .find(|r| r.is_master_ref)
                    .map(|r| r.reference)
                    .ok_or_else(|| CmsError::InvalidEndpoint("API root lists no master ref".to_string()))?;
                tracing::debug!("Resolved master ref {}", master);
                Ok::<_, CmsError>(master)
            })
            .await?;

        Ok(master.clone())
    }

    /// GET a JSON document, retrying transient failures
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.get_once(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff * attempt;
                    tracing::warn!(
                        "Request to {} failed ({}), retry {}/{} in {:?}",
                        redacted(&url),
                        e,
                        attempt,
                        self.retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        tracing::debug!("GET {}", redacted(url));
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status {
                status: status.as_u16(),
                url: redacted(url),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ContentSource for PrismicClient {
    async fn query(&self, query: &Query) -> Result<SearchResponse> {
        let reference = self.resolve_ref(query.release.as_ref()).await?;
        let url = self.search_url(query, &reference)?;
        self.get_json(url).await
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchResponse> {
        let url = Url::parse(cursor.as_str())
            .map_err(|e| CmsError::InvalidCursor(format!("{}: {}", cursor, e)))?;
        if url.host_str() != self.endpoint.host_str() {
            return Err(CmsError::InvalidCursor(format!(
                "{} does not belong to {}",
                redacted(&url),
                self.endpoint
            )));
        }
        self.get_json(url).await
    }

    async fn get_by_uid(
        &self,
        document_type: &str,
        uid: &str,
        release: Option<&ReleaseRef>,
    ) -> Result<Document> {
        let reference = self.resolve_ref(release).await?;
        let url = self.uid_url(document_type, uid, &reference)?;
        let response: SearchResponse = self.get_json(url).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| CmsError::NotFound(uid.to_string()))
    }
}

/// URL as a loggable string with the access token masked
fn redacted(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "access_token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "access_token" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::Ordering;
    use axum::{
        extract::{Query as Params, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::{Arc, Mutex};

    fn client(token: Option<&str>) -> PrismicClient {
        let config = CmsConfig {
            endpoint: "https://spacetraveling.cdn.prismic.io/api/v2".to_string(),
            access_token: token.map(String::from),
            ..CmsConfig::default()
        };
        PrismicClient::new(&config).unwrap()
    }

    fn param(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_search_url() {
        let query = Query::new("post")
            .page_size(4)
            .order_by(Ordering::newest_first());
        let url = client(None).search_url(&query, "master-ref").unwrap();

        assert_eq!(url.path(), "/api/v2/documents/search");
        assert_eq!(param(&url, "ref").as_deref(), Some("master-ref"));
        assert_eq!(
            param(&url, "q").as_deref(),
            Some("[[at(document.type, \"post\")]]")
        );
        assert_eq!(param(&url, "pageSize").as_deref(), Some("4"));
        assert_eq!(
            param(&url, "orderings").as_deref(),
            Some("[document.first_publication_date desc]")
        );
        assert!(param(&url, "after").is_none());
        assert!(param(&url, "access_token").is_none());
    }

    #[test]
    fn test_search_url_with_anchor_and_token() {
        let query = Query::new("post")
            .page_size(1)
            .order_by(Ordering::oldest_first())
            .after("YFz2sBIAACIAzFyq");
        let url = client(Some("secret")).search_url(&query, "r").unwrap();
        assert_eq!(param(&url, "after").as_deref(), Some("YFz2sBIAACIAzFyq"));
        assert_eq!(param(&url, "access_token").as_deref(), Some("secret"));
        assert!(!redacted(&url).contains("secret"));
    }

    #[test]
    fn test_uid_url() {
        let url = client(None)
            .uid_url("post", "como-utilizar-hooks", "r")
            .unwrap();
        assert_eq!(
            param(&url, "q").as_deref(),
            Some("[[at(my.post.uid, \"como-utilizar-hooks\")]]")
        );
        assert_eq!(param(&url, "pageSize").as_deref(), Some("1"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = CmsConfig {
            endpoint: "not a url".to_string(),
            ..CmsConfig::default()
        };
        assert!(matches!(
            PrismicClient::new(&config),
            Err(CmsError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_cursor_is_rejected() {
        let cursor = Cursor::new("https://elsewhere.example.com/documents/search?page=2");
        let err = client(None).fetch_page(&cursor).await.unwrap_err();
        assert!(matches!(err, CmsError::InvalidCursor(_)));
    }

    /// Stand-in content API: counts requests and fails the first searches
    /// with the queued statuses
    #[derive(Default)]
    struct MockApi {
        root_hits: AtomicUsize,
        search_hits: AtomicUsize,
        failures: Vec<u16>,
        results: Vec<serde_json::Value>,
        last_ref: Mutex<Option<String>>,
    }

    async fn api_root(State(api): State<Arc<MockApi>>) -> Json<serde_json::Value> {
        api.root_hits.fetch_add(1, AtomicOrdering::SeqCst);
        Json(serde_json::json!({
            "refs": [
                { "id": "release", "ref": "release-ref", "label": "Next", "isMasterRef": false },
                { "id": "master", "ref": "master-ref", "label": "Master", "isMasterRef": true }
            ]
        }))
    }

    async fn search(
        State(api): State<Arc<MockApi>>,
        Params(params): Params<HashMap<String, String>>,
    ) -> Response {
        let hit = api.search_hits.fetch_add(1, AtomicOrdering::SeqCst);
        *api.last_ref.lock().unwrap() = params.get("ref").cloned();

        if let Some(status) = api.failures.get(hit) {
            return StatusCode::from_u16(*status).unwrap().into_response();
        }
        Json(serde_json::json!({
            "page": 1,
            "results_per_page": 20,
            "results_size": api.results.len(),
            "total_results_size": api.results.len(),
            "total_pages": 1,
            "next_page": null,
            "prev_page": null,
            "results": api.results,
        }))
        .into_response()
    }

    /// Serve `api` on an ephemeral port and return a client for it
    async fn serve(api: Arc<MockApi>, retries: u32) -> PrismicClient {
        let app = Router::new()
            .route("/api/v2", get(api_root))
            .route("/api/v2/documents/search", get(search))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = CmsConfig {
            endpoint: format!("http://{}/api/v2", addr),
            retries,
            retry_backoff_ms: 1,
            timeout: 5,
            ..CmsConfig::default()
        };
        let mut client = PrismicClient::new(&config).unwrap();
        // Loopback must not go through a proxy from the environment
        client.http = reqwest::Client::builder().no_proxy().build().unwrap();
        client
    }

    fn post_json(uid: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("id-{}", uid),
            "uid": uid,
            "type": "post",
            "first_publication_date": "2021-03-15T19:25:28+0000",
            "last_publication_date": "2021-03-15T19:25:28+0000",
            "data": { "title": uid }
        })
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let api = Arc::new(MockApi {
            failures: vec![503],
            results: vec![post_json("a")],
            ..MockApi::default()
        });
        let client = serve(api.clone(), 2).await;

        let response = client.query(&Query::new("post")).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(api.search_hits.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let api = Arc::new(MockApi {
            failures: vec![401],
            ..MockApi::default()
        });
        let client = serve(api.clone(), 2).await;

        let err = client.query(&Query::new("post")).await.unwrap_err();
        assert!(matches!(err, CmsError::Status { status: 401, .. }));
        assert_eq!(api.search_hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let api = Arc::new(MockApi {
            failures: vec![503, 503],
            ..MockApi::default()
        });
        let client = serve(api.clone(), 0).await;

        let err = client.query(&Query::new("post")).await.unwrap_err();
        assert!(matches!(err, CmsError::Status { status: 503, .. }));
        assert_eq!(api.search_hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let api = Arc::new(MockApi {
            failures: vec![500, 500, 500, 500],
            ..MockApi::default()
        });
        let client = serve(api.clone(), 2).await;

        assert!(client.query(&Query::new("post")).await.is_err());
        assert_eq!(api.search_hits.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_master_ref_is_fetched_once() {
        let api = Arc::new(MockApi::default());
        let client = serve(api.clone(), 0).await;

        client.query(&Query::new("post")).await.unwrap();
        client.query(&Query::new("post").page_size(4)).await.unwrap();

        assert_eq!(api.root_hits.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(api.search_hits.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(api.last_ref.lock().unwrap().as_deref(), Some("master-ref"));
    }

    #[tokio::test]
    async fn test_release_ref_is_sent_as_is() {
        let api = Arc::new(MockApi::default());
        let client = serve(api.clone(), 0).await;

        let query = Query::new("post").release(Some(ReleaseRef::new("release-ref")));
        client.query(&query).await.unwrap();

        assert_eq!(api.root_hits.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(api.last_ref.lock().unwrap().as_deref(), Some("release-ref"));
    }

    #[tokio::test]
    async fn test_get_by_uid() {
        let api = Arc::new(MockApi {
            results: vec![post_json("como-utilizar-hooks")],
            ..MockApi::default()
        });
        let client = serve(api, 0).await;

        let doc = client
            .get_by_uid("post", "como-utilizar-hooks", None)
            .await
            .unwrap();
        assert_eq!(doc.uid.as_deref(), Some("como-utilizar-hooks"));
    }

    #[tokio::test]
    async fn test_empty_search_is_not_found() {
        let api = Arc::new(MockApi::default());
        let client = serve(api, 0).await;

        let err = client.get_by_uid("post", "missing", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_preview_ref_skips_master_lookup() {
        let release = ReleaseRef::new("preview-ref");
        let reference = client(None).resolve_ref(Some(&release)).await.unwrap();
        assert_eq!(reference, "preview-ref");
    }
}
