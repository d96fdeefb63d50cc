use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AppError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Rejects requests whose `X-API-Key` does not match the configured key.
///
/// Only SHA-256 digests are compared, so response timing says nothing about
/// the key itself.
#[derive(Clone)]
pub struct ApiKeyLayer {
    digest: Arc<[u8; 32]>,
}

impl ApiKeyLayer {
    pub fn new(api_key: &str) -> Self {
        Self {
            digest: Arc::new(key_digest(api_key)),
        }
    }
}

fn key_digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

impl<S> tower::Layer<S> for ApiKeyLayer {
    type Service = ApiKeyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyService {
            inner,
            digest: self.digest.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyService<S> {
    inner: S,
    digest: Arc<[u8; 32]>,
}

impl<S, B> tower::Service<axum::http::Request<B>> for ApiKeyService<S>
where
    S: tower::Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: axum::http::Request<B>) -> Self::Future {
        let expected = self.digest.clone();
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(key_digest);

            if provided.as_ref() != Some(&*expected) {
                return Ok(AppError::Unauthorized.into_response());
            }

            inner.call(req).await
        })
    }
}
