//! Remote background-removal services
//!
//! Both the self-hosted backend and the third-party API take a multipart image
//! upload and answer with PNG bytes of the cutout.

use crate::{
    config::{RemovalMode, Timeouts},
    error::{IdPhotoError, Result},
};
use image::{DynamicImage, ImageFormat, RgbaImage};
use reqwest::{multipart, Client, StatusCode};
use std::io::Cursor;
use std::time::Duration;

/// Request timeout for the removal upload itself
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Which wire contract the endpoint speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteKind {
    /// Self-hosted backend, multipart field `image`
    Backend,
    /// Third-party API, `X-Api-Key` header and multipart field `image_file`
    ThirdParty { api_key: String },
}

impl RemoteKind {
    fn field_name(&self) -> &'static str {
        match self {
            Self::Backend => "image",
            Self::ThirdParty { .. } => "image_file",
        }
    }
}

/// Whether an availability probe response means the service is reachable
///
/// An empty POST is answered with 400 by a live service.
#[must_use]
pub fn probe_status_reachable(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status.is_success()
}

/// Client for one remote removal endpoint
#[derive(Debug, Clone)]
pub struct RemoteRemovalService {
    client: Client,
    endpoint: String,
    kind: RemoteKind,
    probe_timeout: Duration,
}

impl RemoteRemovalService {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(endpoint: impl Into<String>, kind: RemoteKind, probe_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| IdPhotoError::network_error("Failed to create HTTP client", &e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            kind,
            probe_timeout,
        })
    }

    /// Build the service a removal mode points at, `None` for local and skip modes
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn from_mode(mode: &RemovalMode, timeouts: &Timeouts) -> Result<Option<Self>> {
        let service = match mode {
            RemovalMode::Local | RemovalMode::Skip => return Ok(None),
            RemovalMode::Remote { endpoint } => {
                Self::new(endpoint.clone(), RemoteKind::Backend, timeouts.probe())?
            },
            RemovalMode::ThirdParty { endpoint, api_key } => Self::new(
                endpoint.clone(),
                RemoteKind::ThirdParty {
                    api_key: api_key.clone(),
                },
                timeouts.probe(),
            )?,
        };
        Ok(Some(service))
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn kind(&self) -> &RemoteKind {
        &self.kind
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let request = self.client.post(&self.endpoint);
        match &self.kind {
            RemoteKind::Backend => request,
            RemoteKind::ThirdParty { api_key } => request.header("X-Api-Key", api_key),
        }
    }

    /// Short POST without a body; any transport failure counts as unavailable
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn probe(&self) -> bool {
        match self.post().timeout(self.probe_timeout).send().await {
            Ok(response) => {
                let reachable = probe_status_reachable(response.status());
                tracing::info!(status = %response.status(), reachable, "service probe");
                reachable
            },
            Err(error) => {
                tracing::info!(%error, "service probe failed");
                false
            },
        }
    }

    /// Upload PNG bytes and return the service's PNG response
    ///
    /// # Errors
    /// - `RemoteService` for a non-2xx status, with the body text as detail
    /// - `Network` for transport failures
    pub async fn remove_bytes(&self, png: Vec<u8>) -> Result<Vec<u8>> {
        let part = multipart::Part::bytes(png)
            .file_name("photo.png")
            .mime_str("image/png")
            .map_err(|e| IdPhotoError::network_error("Failed to build upload", &e))?;
        let form = multipart::Form::new().part(self.kind.field_name(), part);

        let response = self
            .post()
            .multipart(form)
            .send()
            .await
            .map_err(|e| IdPhotoError::network_error("Background removal upload failed", &e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.ok().filter(|t| !t.trim().is_empty());
            return Err(IdPhotoError::RemoteService {
                status: status.as_u16(),
                detail,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IdPhotoError::network_error("Failed to read removal response", &e))?;
        Ok(bytes.to_vec())
    }

    /// Remove the background of `image` remotely
    ///
    /// # Errors
    /// - Same as [`Self::remove_bytes`]
    /// - `Image` when the response is not a decodable image
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoint, width = image.width(), height = image.height()))]
    pub async fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let response = self.remove_bytes(png).await?;
        let cutout = image::load_from_memory(&response)?.to_rgba8();
        tracing::info!(bytes = response.len(), "remote background removal complete");
        Ok(cutout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Single-connection HTTP server answering with a canned response
    async fn serve_once(
        status_line: &'static str,
        body: Vec<u8>,
    ) -> (String, Arc<Mutex<Vec<u8>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 4096];

            // Read headers, then exactly Content-Length body bytes
            let header_end = loop {
                let n = socket.read(&mut buffer).await.unwrap();
                request.extend_from_slice(&buffer[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                if n == 0 {
                    break request.len();
                }
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while request.len() < header_end + length {
                let n = socket.read(&mut buffer).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..n]);
            }
            sink.lock().unwrap().extend_from_slice(&request);

            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();
        });

        (format!("http://{address}/remove"), captured)
    }

    fn tiny_png() -> Vec<u8> {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(3, 2))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn test_probe_status_rules() {
        assert!(probe_status_reachable(StatusCode::OK));
        assert!(probe_status_reachable(StatusCode::NO_CONTENT));
        assert!(probe_status_reachable(StatusCode::BAD_REQUEST));
        assert!(!probe_status_reachable(StatusCode::NOT_FOUND));
        assert!(!probe_status_reachable(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_probe_treats_400_as_available() {
        let (url, _) = serve_once("400 Bad Request", b"No image provided".to_vec()).await;
        let service = RemoteRemovalService::new(url, RemoteKind::Backend, Duration::from_secs(3)).unwrap();
        assert!(service.probe().await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_false() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let service = RemoteRemovalService::new(
            format!("http://{address}/remove"),
            RemoteKind::Backend,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(!service.probe().await);
    }

    #[tokio::test]
    async fn test_backend_upload_uses_image_field() {
        let (url, captured) = serve_once("200 OK", tiny_png()).await;
        let service = RemoteRemovalService::new(url, RemoteKind::Backend, Duration::from_secs(3)).unwrap();

        let cutout = service
            .remove(&DynamicImage::ImageRgb8(image::RgbImage::new(5, 5)))
            .await
            .unwrap();

        assert_eq!(cutout.dimensions(), (3, 2));
        let request = String::from_utf8_lossy(&captured.lock().unwrap()).to_string();
        assert!(request.contains("name=\"image\""));
        assert!(!request.to_lowercase().contains("x-api-key"));
    }

    #[tokio::test]
    async fn test_third_party_sends_api_key() {
        let (url, captured) = serve_once("200 OK", tiny_png()).await;
        let service = RemoteRemovalService::new(
            url,
            RemoteKind::ThirdParty {
                api_key: "secret-key".to_string(),
            },
            Duration::from_secs(3),
        )
        .unwrap();

        service.remove_bytes(tiny_png()).await.unwrap();

        let request = String::from_utf8_lossy(&captured.lock().unwrap()).to_string();
        assert!(request.contains("name=\"image_file\""));
        assert!(request.to_lowercase().contains("x-api-key: secret-key"));
    }

    #[tokio::test]
    async fn test_non_success_carries_detail() {
        let (url, _) = serve_once("503 Service Unavailable", b"not configured".to_vec()).await;
        let service = RemoteRemovalService::new(url, RemoteKind::Backend, Duration::from_secs(3)).unwrap();

        match service.remove_bytes(tiny_png()).await {
            Err(IdPhotoError::RemoteService { status, detail }) => {
                assert_eq!(status, 503);
                assert_eq!(detail.as_deref(), Some("not configured"));
            },
            other => panic!("expected RemoteService error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_mode() {
        let timeouts = Timeouts::default();
        assert!(RemoteRemovalService::from_mode(&RemovalMode::Local, &timeouts)
            .unwrap()
            .is_none());
        let service = RemoteRemovalService::from_mode(
            &RemovalMode::ThirdParty {
                endpoint: "https://api.example.com/v1.0/removebg".to_string(),
                api_key: "k".to_string(),
            },
            &timeouts,
        )
        .unwrap()
        .unwrap();
        assert_eq!(service.endpoint(), "https://api.example.com/v1.0/removebg");
        assert!(matches!(service.kind(), RemoteKind::ThirdParty { .. }));
    }
}
