use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{BlobStore, BlobStoreError};

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1/b";
const UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 120;

/// Google Cloud Storage bucket backend.
///
/// Authenticates with a service account key file when one is configured,
/// otherwise with the instance metadata server. The token never leaves the
/// process.
pub struct GcsStore {
    bucket: String,
    client: Client,
    token: tokio::sync::RwLock<AccessToken>,
    credentials_file: Option<String>,
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let store = Self {
            bucket: bucket.to_string(),
            client,
            token: tokio::sync::RwLock::new(AccessToken {
                value: String::new(),
                expires_at: Utc::now(),
            }),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<AccessToken, anyhow::Error> {
        let resp = if let Some(ref creds_path) = self.credentials_file {
            self.token_from_service_account(creds_path).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let token = AccessToken {
            value: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in),
        };

        let mut lock = self.token.write().await;
        *lock = token.clone();
        tracing::debug!(bucket = %self.bucket, expires_at = %token.expires_at, "Refreshed GCS token");
        Ok(token)
    }

    /// Current bearer token, refreshed when close to expiry.
    async fn bearer(&self) -> Result<String, BlobStoreError> {
        {
            let token = self.token.read().await;
            if token.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        self.refresh_token()
            .await
            .map(|t| t.value)
            .map_err(|e| BlobStoreError::Unavailable(format!("GCS token refresh failed: {e}")))
    }

    async fn token_from_service_account(&self, path: &str) -> Result<TokenResponse, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    fn upload_url(&self, key: &str) -> Result<Url, BlobStoreError> {
        let base = format!("{UPLOAD_API}/{}/o", self.bucket);
        Url::parse_with_params(&base, &[("uploadType", "media"), ("name", key)])
            .map_err(|e| BlobStoreError::InvalidKey(format!("{key}: {e}")))
    }

    /// Object URL with the key as a single percent-encoded path segment.
    fn object_url(&self, key: &str) -> Result<Url, BlobStoreError> {
        let mut url = Url::parse(&format!("{STORAGE_API}/{}/o", self.bucket))
            .map_err(|e| BlobStoreError::InvalidKey(format!("{key}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| BlobStoreError::InvalidKey(key.to_string()))?
            .push(key);
        Ok(url)
    }

    fn media_url(&self, key: &str) -> Result<Url, BlobStoreError> {
        let mut url = self.object_url(key)?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

fn transport_error(e: reqwest::Error) -> BlobStoreError {
    BlobStoreError::Unavailable(e.to_string())
}

async fn status_error(action: &str, resp: reqwest::Response) -> BlobStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    BlobStoreError::Unavailable(format!("GCS {action} failed ({status}): {body}"))
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .post(self.upload_url(key)?)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error("upload", resp).await);
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(self.media_url(key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BlobStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            return Err(status_error("download", resp).await);
        }

        resp.bytes().await.map_err(transport_error)
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .delete(self.object_url(key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(status_error("delete", resp).await);
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(self.object_url(key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error("metadata lookup", resp).await),
        }
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &der_b64)?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GcsStore {
        GcsStore {
            bucket: "temple-media".to_string(),
            client: Client::new(),
            token: tokio::sync::RwLock::new(AccessToken {
                value: "token".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            }),
            credentials_file: None,
        }
    }

    #[test]
    fn object_url_encodes_key_as_one_segment() {
        let url = store().object_url("album_images/photo-1.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/temple-media/o/album_images%2Fphoto-1.jpg"
        );
    }

    #[test]
    fn upload_url_carries_name_parameter() {
        let url = store().upload_url("0190a1b2.png").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("uploadType".to_string(), "media".to_string())));
        assert!(pairs.contains(&("name".to_string(), "0190a1b2.png".to_string())));
    }

    #[test]
    fn media_url_requests_raw_bytes() {
        let url = store().media_url("a.pdf").unwrap();
        assert_eq!(url.query(), Some("alt=media"));
    }

    #[tokio::test]
    async fn bearer_reuses_fresh_token() {
        assert_eq!(store().bearer().await.unwrap(), "token");
    }
}
