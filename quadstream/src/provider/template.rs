//! URL-template tile source.
//!
//! Most tile servers address tiles with a URL containing zoom, column and row,
//! e.g. `https://tiles.example.org/{z}/{x}/{y}.png`. The template's scheme
//! decides whether `{y}` counts from the north (XYZ) or the south (TMS).

use bytes::Bytes;

use super::http::AsyncHttpClient;
use super::types::{FetchError, TileSource};
use crate::tile::{Scheme, TileId};

/// A URL pattern with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    pattern: String,
    scheme: Scheme,
}

impl UrlTemplate {
    /// Creates a template. Returns `None` if a placeholder is missing.
    pub fn new(pattern: impl Into<String>, scheme: Scheme) -> Option<Self> {
        let pattern = pattern.into();
        let complete = ["{z}", "{x}", "{y}"].iter().all(|p| pattern.contains(p));
        complete.then_some(Self { pattern, scheme })
    }

    /// The raw pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Row convention expected by the server.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Expands the template for one tile.
    pub fn url_for(&self, id: TileId) -> String {
        let id = id.to_scheme(self.scheme);
        self.pattern
            .replace("{z}", &id.zoom.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &id.y.to_string())
    }
}

/// Tile source that fetches tiles over HTTP from a URL template.
pub struct UrlTemplateSource<C: AsyncHttpClient> {
    http_client: C,
    template: UrlTemplate,
    name: String,
}

impl<C: AsyncHttpClient> UrlTemplateSource<C> {
    pub fn new(http_client: C, template: UrlTemplate) -> Self {
        let name = template
            .pattern()
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or("http")
            .to_string();
        Self {
            http_client,
            template,
            name,
        }
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }
}

impl<C: AsyncHttpClient> TileSource for UrlTemplateSource<C> {
    async fn fetch(&self, id: TileId) -> Result<Bytes, FetchError> {
        let url = self.template.url_for(id);
        tracing::trace!(tile = %id, url = %url, "Fetching tile");
        self.http_client.get(&url).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
