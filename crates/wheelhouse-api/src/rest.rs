// ── Paged-list REST client ──
//
// One endpoint shape serves every resource collection:
//
//   GET /api/{resource}?page={index}&page_size={size}[&profile_id={id}]
//     -> { "items": [...], "total": n }
//
// Items stay as raw JSON values here; the core crate deserializes them
// into typed resources.

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// One page of a resource listing, items still untyped.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    pub total_count: u64,
}

/// Wire shape of a paged listing response.
#[derive(Debug, Deserialize)]
struct PageBody {
    items: Vec<serde_json::Value>,
    total: u64,
}

/// Client for the paged-list endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: Url, config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            base_url,
        })
    }

    /// Fetch one page of the given resource listing.
    ///
    /// `resource` is the wire tag of the collection (`"router"`,
    /// `"dns_provider"`, ...). `profile_id` narrows the listing to one
    /// profile; `None` requests the caller's global view.
    pub async fn list_page(
        &self,
        resource: &str,
        profile_id: Option<&str>,
        page_size: u32,
        page_index: u32,
    ) -> Result<Page, Error> {
        let mut url = self.base_url.join(&format!("api/{resource}"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page_index.to_string());
            query.append_pair("page_size", &page_size.to_string());
            if let Some(id) = profile_id {
                query.append_pair("profile_id", id);
            }
        }

        tracing::debug!(%url, "fetching resource page");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(Error::Authentication { message });
            }
            return Err(Error::Api {
                message,
                status: status.as_u16(),
            });
        }

        let body: PageBody = response.json().await.map_err(|e| Error::Deserialization {
            message: e.to_string(),
        })?;

        Ok(Page {
            items: body.items,
            total_count: body.total,
        })
    }
}
