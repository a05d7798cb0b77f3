//! Supabase Storage client.
//!
//! Objects are written with the service key and read back through the public URL
//! `{supabase}/storage/v1/object/public/{bucket}/{path}`.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use super::{build_http_client, endpoint};
use crate::config::SupabaseConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Supabase service key is not configured")]
    MissingServiceKey,

    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid storage URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    base_url: Url,
    service_key: Option<String>,
}

impl StorageClient {
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<Self, StorageError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config.url.clone(),
            service_key: config.service_key.clone(),
        })
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url, StorageError> {
        Ok(endpoint(&self.base_url, &format!("storage/v1/object/public/{bucket}/{path}"))?)
    }

    /// Upload (overwriting) an object and return its public URL
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    pub async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<Url, StorageError> {
        let service_key = self.service_key.as_deref().ok_or(StorageError::MissingServiceKey)?;
        let url = endpoint(&self.base_url, &format!("storage/v1/object/{bucket}/{path}"))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(service_key)
            .header("apikey", service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let public = self.public_url(bucket, path)?;
        debug!(url = %public, "Uploaded object");
        Ok(public)
    }

    /// Fetch any URL (reference images supplied by URL, model outputs)
    #[instrument(skip(self), err)]
    pub async fn download(&self, url: &str) -> Result<Bytes, StorageError> {
        let url = Url::parse(url)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> StorageClient {
        StorageClient::new(
            &SupabaseConfig {
                url: Url::parse(&server.uri()).unwrap(),
                service_key: key.map(str::to_string),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/reference/u1/g1/combined.jpg"))
            .and(header("authorization", "Bearer service"))
            .and(header("apikey", "service"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/jpeg"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Key": "reference/u1/g1/combined.jpg"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server, Some("service"))
            .upload("reference", "u1/g1/combined.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(
            url.as_str(),
            format!("{}/storage/v1/object/public/reference/u1/g1/combined.jpg", server.uri())
        );
    }

    #[tokio::test]
    async fn test_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bucket not found"))
            .mount(&server)
            .await;

        let err = client(&server, Some("service"))
            .upload("missing", "a.jpg", vec![0], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8, 8, 7]))
            .mount(&server)
            .await;

        let bytes = client(&server, None)
            .download(&format!("{}/img.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[9, 8, 7]);
    }
}
