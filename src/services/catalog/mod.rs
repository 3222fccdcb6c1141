/// Movie catalog provider abstraction
///
/// The recommender treats the third-party movie catalog as a read-only data
/// source. The trait keeps the engine testable and leaves room for a second
/// provider without touching the scoring code.
use crate::{
    error::AppResult,
    models::{TmdbMovie, TmdbMovieDetails},
};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

/// Catalog feeds the candidate pool is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogFeed {
    Popular,
    TopRated,
    TrendingWeek,
    NowPlaying,
}

impl CatalogFeed {
    pub fn path(self) -> &'static str {
        match self {
            CatalogFeed::Popular => "/movie/popular",
            CatalogFeed::TopRated => "/movie/top_rated",
            CatalogFeed::TrendingWeek => "/trending/movie/week",
            CatalogFeed::NowPlaying => "/movie/now_playing",
        }
    }
}

/// Trait for movie catalog providers
///
/// Single-entity lookups propagate failures to the caller; feed pages are
/// fetched one page at a time so batch callers can skip a failing page and
/// keep going.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Fetch the full record for one movie in a fixed language
    async fn movie_details(&self, movie_id: i32) -> AppResult<TmdbMovieDetails>;

    /// Fetch one page of a catalog feed
    async fn feed_page(&self, feed: CatalogFeed, page: u32) -> AppResult<Vec<TmdbMovie>>;

    /// Search movies by free-text query
    async fn search(&self, query: &str) -> AppResult<Vec<TmdbMovie>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_paths() {
        assert_eq!(CatalogFeed::Popular.path(), "/movie/popular");
        assert_eq!(CatalogFeed::TopRated.path(), "/movie/top_rated");
        assert_eq!(CatalogFeed::TrendingWeek.path(), "/trending/movie/week");
        assert_eq!(CatalogFeed::NowPlaying.path(), "/movie/now_playing");
    }
}
