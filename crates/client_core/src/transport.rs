//! Transport to the remote colorization service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Client,
};
use shared::{
    error::TransportError,
    protocol::{is_image_mime, quality_flag, COLORIZE_PATH, FILE_FIELD, HIGH_QUALITY_FIELD},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{asset_holder::SourceImage, ColorizationRequest};

/// Image bytes handed back by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait ColorizeBackend: Send + Sync {
    async fn colorize(
        &self,
        request: &ColorizationRequest,
    ) -> Result<ColorizedImage, TransportError>;
}

pub struct MissingColorizeBackend;

#[async_trait]
impl ColorizeBackend for MissingColorizeBackend {
    async fn colorize(
        &self,
        _request: &ColorizationRequest,
    ) -> Result<ColorizedImage, TransportError> {
        Err(TransportError::Unavailable)
    }
}

#[derive(Debug, Error)]
pub enum BackendConfigError {
    #[error("invalid colorization service url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct HttpColorizeBackend {
    http: Client,
    endpoint: Url,
}

impl HttpColorizeBackend {
    pub fn new(service_url: &str, timeout: Option<Duration>) -> Result<Self, BackendConfigError> {
        let endpoint = colorize_endpoint(service_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn colorize_endpoint(service_url: &str) -> Result<Url, BackendConfigError> {
    let invalid = |source| BackendConfigError::InvalidUrl {
        url: service_url.to_string(),
        source,
    };
    let mut base = Url::parse(service_url.trim()).map_err(invalid)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(COLORIZE_PATH).map_err(invalid)
}

fn file_part(source: &SourceImage) -> Part {
    let part = Part::bytes(source.bytes.to_vec()).file_name(source.file_name.clone());
    let Some(mime_type) = source.mime_type.as_deref() else {
        return part;
    };
    match part.mime_str(mime_type) {
        Ok(part) => part,
        Err(err) => {
            warn!("dropping unusable mime type '{mime_type}' from upload: {err}");
            Part::bytes(source.bytes.to_vec()).file_name(source.file_name.clone())
        }
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Network(format!("request timed out: {err}"))
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl ColorizeBackend for HttpColorizeBackend {
    async fn colorize(
        &self,
        request: &ColorizationRequest,
    ) -> Result<ColorizedImage, TransportError> {
        let form = Form::new()
            .part(FILE_FIELD, file_part(&request.source))
            .text(HIGH_QUALITY_FIELD, quality_flag(request.high_quality));

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(mime_type) = mime_type.as_deref() {
            if !is_image_mime(mime_type) {
                return Err(TransportError::Malformed(format!(
                    "expected an image, got content type '{mime_type}'"
                )));
            }
        }

        let bytes = response.bytes().await.map_err(network_error)?;
        if bytes.is_empty() {
            return Err(TransportError::Malformed("empty response body".to_string()));
        }

        debug!(
            request_id = %request.id,
            size = bytes.len(),
            "colorization service responded"
        );
        Ok(ColorizedImage {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
