//! The concrete network [`Fetcher`] used outside of tests.
//!
//! This is the adapter over the explicitly out-of-scope HTTP layer: it
//! owns no retry policy, caching, or crawl orchestration of its own, it
//! just performs one request (optionally `HEAD`) and reports whether the
//! response was itself a redirect, leaving the façade to decide what to do
//! about that.

use crate::classifier::{FetchedResponse, Fetcher};
use crate::error::{CoreError, CoreResult};
use reqwest::Client;
use std::time::Duration;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> CoreResult<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::External(format!("failed to build http client: {e}")))?;
        Ok(HttpFetcher { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new().expect("default reqwest client configuration is always valid")
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        referer: Option<&str>,
        head: bool,
    ) -> CoreResult<FetchedResponse> {
        let mut request = if head {
            self.client.head(url)
        } else {
            self.client.get(url)
        };
        if let Some(referer) = referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::External(format!("fetch {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let redirect_location = if response.status().is_redirection() {
            response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        } else {
            None
        };
        let final_url = response.url().to_string();

        let body_sniff = if head {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map(|b| b.into_iter().take(512).collect())
                .unwrap_or_default()
        };

        Ok(FetchedResponse {
            final_url,
            status,
            redirect_location,
            body_sniff,
        })
    }
}
