//! Typed transport client for the paper/entity backend
//!
//! One method per REST endpoint, each surfacing the server's structured
//! error payload when present. No automatic retries: a failed call fails
//! once and reports upward; the mutation coordinator decides what to do.

use async_trait::async_trait;
use paperscope_common::{
    models::{DeleteAck, Entity, GraphPayload, Paper},
    ClientError, Result,
};
use reqwest::multipart::{Form, Part};
use uuid::Uuid;

/// The backend surface the store depends on.
///
/// A trait seam so the store can run against an in-memory fake in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_papers(&self) -> Result<Vec<Paper>>;
    async fn get_paper(&self, paper_id: i64) -> Result<Paper>;
    async fn upload_paper(&self, filename: &str, bytes: Vec<u8>) -> Result<Paper>;
    async fn delete_paper(&self, paper_id: i64) -> Result<DeleteAck>;
    async fn list_entities(&self) -> Result<Vec<Entity>>;
    async fn search_entities(&self, query: &str, entity_type: Option<&str>)
        -> Result<Vec<Entity>>;
    async fn graph(&self) -> Result<GraphPayload>;
}

/// HTTP implementation of [`Backend`] over reqwest.
///
/// Resource paths follow the backend's trailing-slash convention for
/// collection routes.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client. `base_url` includes the API prefix, e.g.
    /// `http://localhost:8000/api/v1`.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request_id = Uuid::new_v4();
        let response = request
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request_id, error = %e, "transport failure");
                ClientError::network(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason();
        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_response(status.as_u16(), reason, &body);
        tracing::warn!(
            request_id = %request_id,
            status = status.as_u16(),
            error = %err,
            "backend returned an error"
        );
        Err(err)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.url(path))).await?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status().as_u16();
    response.json::<T>().await.map_err(|e| ClientError::Server {
        status,
        message: format!("invalid response body: {}", e),
    })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_papers(&self) -> Result<Vec<Paper>> {
        self.get_json("/papers/").await
    }

    async fn get_paper(&self, paper_id: i64) -> Result<Paper> {
        self.get_json(&format!("/papers/{}", paper_id)).await
    }

    async fn upload_paper(&self, filename: &str, bytes: Vec<u8>) -> Result<Paper> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .send(self.client.post(self.url("/papers/upload/")).multipart(form))
            .await?;
        decode(response).await
    }

    async fn delete_paper(&self, paper_id: i64) -> Result<DeleteAck> {
        let response = self
            .send(self.client.delete(self.url(&format!("/papers/{}", paper_id))))
            .await?;
        decode(response).await
    }

    async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.get_json("/entities/").await
    }

    async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let mut params: Vec<(&str, &str)> = vec![("query", query)];
        if let Some(ty) = entity_type {
            params.push(("type", ty));
        }
        let response = self
            .send(
                self.client
                    .get(self.url("/entities/search/"))
                    .query(&params),
            )
            .await?;
        decode(response).await
    }

    async fn graph(&self) -> Result<GraphPayload> {
        self.get_json("/graph/").await
    }
}
