/// TMDB catalog provider
///
/// All requests carry the API key and a fixed `en-US` language so embedding
/// source texts stay stable across calls. Responses with non-success status
/// codes are surfaced as `ExternalApi` errors; batch callers decide whether
/// to skip or propagate.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    models::{TmdbMovie, TmdbMovieDetails, TmdbPage},
    services::catalog::{CatalogFeed, MovieCatalog},
};

const CATALOG_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
}

impl TmdbCatalog {
    pub fn new(api_key: String, base_url: String) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(CATALOG_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("language", "en-US".to_string()),
        ];
        query.extend(params.iter().cloned());

        let response = self.http_client.get(&url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbCatalog {
    async fn movie_details(&self, movie_id: i32) -> AppResult<TmdbMovieDetails> {
        self.get_json(&format!("/movie/{}", movie_id), &[]).await
    }

    async fn feed_page(&self, feed: CatalogFeed, page: u32) -> AppResult<Vec<TmdbMovie>> {
        let page: TmdbPage = self
            .get_json(feed.path(), &[("page", page.to_string())])
            .await?;
        Ok(page.results)
    }

    async fn search(&self, query: &str) -> AppResult<Vec<TmdbMovie>> {
        let page: TmdbPage = self
            .get_json(
                "/search/movie",
                &[
                    ("query", query.to_string()),
                    ("page", "1".to_string()),
                    ("include_adult", "false".to_string()),
                ],
            )
            .await?;
        Ok(page.results)
    }
}
