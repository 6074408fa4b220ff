//! The verb-level capability consumed by endpoint wrappers and the bulk controller.

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::Context;
use crate::error::Result;
use crate::request::{ApiRequest, RequestBody, RequestMethod};
use crate::transport::HttpResponse;

/// Authenticated calls over (context, path, body).
///
/// [`RequestExecutor`](crate::RequestExecutor) is the production
/// implementation; anything that can answer `call` can stand in for it.
#[async_trait]
pub trait HttpApi: Send + Sync {
    /// Execute a request and return the successful response.
    async fn call(&self, ctx: &Context, request: ApiRequest) -> Result<HttpResponse>;

    async fn get(&self, ctx: &Context, path: &str) -> Result<Bytes> {
        let response = self
            .call(ctx, ApiRequest::new(RequestMethod::Get, path))
            .await?;
        Ok(response.body)
    }

    async fn post(&self, ctx: &Context, path: &str, body: RequestBody) -> Result<Bytes> {
        let response = self
            .call(ctx, ApiRequest::new(RequestMethod::Post, path).body(body))
            .await?;
        Ok(response.body)
    }

    async fn patch(&self, ctx: &Context, path: &str, body: RequestBody) -> Result<Bytes> {
        let response = self
            .call(ctx, ApiRequest::new(RequestMethod::Patch, path).body(body))
            .await?;
        Ok(response.body)
    }

    async fn put(&self, ctx: &Context, path: &str, body: RequestBody) -> Result<Bytes> {
        let response = self
            .call(ctx, ApiRequest::new(RequestMethod::Put, path).body(body))
            .await?;
        Ok(response.body)
    }

    async fn delete(&self, ctx: &Context, path: &str) -> Result<Bytes> {
        let response = self
            .call(ctx, ApiRequest::new(RequestMethod::Delete, path))
            .await?;
        Ok(response.body)
    }
}
