pub mod address;
pub mod cache;
pub mod geo;
pub mod provider;
mod searcher;

use std::fmt;

pub use address::{Address, BBox, Components, Context, LatLon, RegionBias, Suggestion};
pub use provider::{Provider, ProviderError};
pub use searcher::{cache_key, Options, SearchFuture, Searcher};

/// Errors surfaced by [`Searcher::search`].
///
/// Only genuine provider failures end up here. Superseded, too-short and
/// cancelled requests resolve to an empty list instead.
#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}
