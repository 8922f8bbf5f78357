//! Tile source abstraction
//!
//! The pipeline fetches raw tile bytes through the [`TileSource`] trait.
//! Implementations:
//!
//! - [`UrlTemplateSource`]: HTTP tile servers addressed by a URL template
//! - [`SyntheticSource`]: locally rendered tiles for demos and tests
//!
//! ```ignore
//! use quadstream::provider::{ReqwestClient, UrlTemplate, UrlTemplateSource};
//! use quadstream::tile::Scheme;
//!
//! let template = UrlTemplate::new("https://tiles.example.org/{z}/{x}/{y}.png", Scheme::NorthUp)
//!     .expect("template has all placeholders");
//! let source = UrlTemplateSource::new(ReqwestClient::new()?, template);
//! ```

mod http;
mod synthetic;
mod template;
mod types;

pub use http::{AsyncHttpClient, ReqwestClient, DEFAULT_HTTP_TIMEOUT};
pub use synthetic::{SyntheticSource, DEFAULT_SYNTHETIC_TILE_SIZE};
pub use template::{UrlTemplate, UrlTemplateSource};
pub use types::{into_tile_layer, FetchError, TileSource};

#[cfg(test)]
pub use http::tests::MockHttpClient;
