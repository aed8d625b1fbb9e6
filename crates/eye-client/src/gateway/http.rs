//! reqwest transport

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use super::{ApiRequest, Gateway, RawResponse};
use crate::config::ClientConfig;
use crate::error::{EyeError, Result};

/// Gateway that talks to the service over HTTP
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_uri: String,
    bearer: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| EyeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_uri: config.base_uri(),
            bearer: config.bearer.clone(),
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }
}

fn transport_error(err: reqwest::Error) -> EyeError {
    if err.is_timeout() {
        EyeError::Timeout
    } else {
        EyeError::Transport(err.to_string())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_uri, request.endpoint.path());

        let mut builder = self
            .client
            .request(request.endpoint.method(), url)
            .bearer_auth(&self.bearer);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        Ok(RawResponse { status, body })
    }
}
