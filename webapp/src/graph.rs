//! Directory client used when the id token reports a groups overage.

use crate::error::AppError;
use serde::Deserialize;
use std::time::Duration;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";

/// Upper bound on followed `@odata.nextLink` pages
const MAX_PAGES: usize = 50;

/// Directory (Microsoft Graph) client.
pub struct GraphClient {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DirectoryObject {
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    id: String,
}

#[derive(Debug, Deserialize)]
struct MemberOfPage {
    #[serde(default)]
    value: Vec<DirectoryObject>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

impl GraphClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Ids of the groups the signed-in user is a direct member of.
    pub async fn member_of_group_ids(&self, access_token: &str) -> Result<Vec<String>, AppError> {
        let mut url = format!("{}/me/memberOf", self.base_url);
        let mut group_ids = Vec::new();

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(&url, access_token).await?;
            group_ids.extend(
                page.value
                    .into_iter()
                    .filter(|obj| obj.odata_type.as_deref() == Some(GROUP_ODATA_TYPE))
                    .map(|obj| obj.id),
            );

            match page.next_link {
                Some(next) => url = next,
                None => return Ok(group_ids),
            }
        }

        tracing::warn!(pages = MAX_PAGES, "memberOf paging limit reached, group list truncated");
        Ok(group_ids)
    }

    async fn fetch_page(&self, url: &str, access_token: &str) -> Result<MemberOfPage, AppError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Graph(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| AppError::Graph(format!("Failed to parse memberOf response: {}", e))),
            401 => Err(AppError::Graph("Unauthorized (401): token may be expired".to_string())),
            403 => Err(AppError::Graph(
                "Forbidden (403): GroupMember.Read.All consent missing".to_string(),
            )),
            429 => Err(AppError::Graph("Rate limited (429)".to_string())),
            // Don't expose raw API error details - just the status code
            status => Err(AppError::Graph(format!("HTTP {}", status))),
        }
    }
}
