//! Predis video job client.

use super::{decode_json, join_url, send};
use crate::errors::ProviderError;
use crate::providers::{JobFilter, VideoJob, VideoProvider};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const PROVIDER: &str = "video";

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    post_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    post_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    generated_media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    url: Option<String>,
}

impl From<Post> for VideoJob {
    fn from(post: Post) -> Self {
        Self {
            id: post.post_id,
            status: post.status,
            media_url: post
                .generated_media
                .into_iter()
                .next()
                .and_then(|media| media.url),
        }
    }
}

/// Video provider client.
///
/// Job creation authenticates with the raw API key; listing uses a bearer
/// token carrying the same key.
#[derive(Debug, Clone)]
pub struct PredisClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PredisClient {
    /// Creates a client against `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl VideoProvider for PredisClient {
    async fn create(&self, brand_id: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
        let request = self
            .client
            .post(join_url(&self.base_url, "create_content/"))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .form(&[
                ("brand_id", brand_id),
                ("text", prompt),
                ("media_type", "video"),
            ]);
        let response = send(PROVIDER, request).await?;
        let body: CreateResponse = decode_json(PROVIDER, response).await?;
        let job_id = body.post_ids.into_iter().next().filter(|id| !id.is_empty());
        debug!(job_id = ?job_id, "Video job submitted");
        Ok(job_id)
    }

    async fn list_jobs(
        &self,
        brand_id: &str,
        filter: &JobFilter,
    ) -> Result<Vec<VideoJob>, ProviderError> {
        let page = filter.page.to_string();
        let items = filter.items.to_string();
        let request = self
            .client
            .get(join_url(&self.base_url, "get_posts/"))
            .bearer_auth(&self.api_key)
            .query(&[
                ("brand_id", brand_id),
                ("media_type", filter.media_type.as_str()),
                ("page_n", page.as_str()),
                ("items_n", items.as_str()),
            ]);
        let response = send(PROVIDER, request).await?;
        let body: ListResponse = decode_json(PROVIDER, response).await?;
        Ok(body.posts.into_iter().map(VideoJob::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_response_without_ids() {
        let body: CreateResponse = serde_json::from_value(json!({"errors": []})).unwrap();
        assert!(body.post_ids.is_empty());
    }

    #[test]
    fn test_posts_map_to_jobs() {
        let body: ListResponse = serde_json::from_value(json!({
            "posts": [
                {
                    "post_id": "job-1",
                    "status": "completed",
                    "generated_media": [{"url": "https://cdn.example.com/a.mp4"}, {"url": "ignored"}]
                },
                {"post_id": "job-2", "status": "inProgress"}
            ]
        }))
        .unwrap();

        let jobs: Vec<VideoJob> = body.posts.into_iter().map(VideoJob::from).collect();
        assert_eq!(jobs[0].completed_url("job-1"), Some("https://cdn.example.com/a.mp4"));
        assert_eq!(jobs[1].id, "job-2");
        assert!(jobs[1].media_url.is_none());
        assert!(jobs[1].completed_url("job-2").is_none());
    }
}
