//! Response hooks
//!
//! A hook builds the response for a path that has no file behind it. Hooks
//! are registered under their path relative to the document root before the
//! server starts; lookups use the translated (lowercased) request path.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;

use crate::paths::Translated;

/// What a hook gets to see of the request
#[derive(Debug, Clone)]
pub struct HookRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Request body; empty unless the request was a POST
    pub body: Bytes,
}

impl HookRequest {
    /// Value of the first `name=value` pair in the query string
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then(|| {
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string())
            })
        })
    }
}

pub trait ResponseHook: Send + Sync {
    fn respond(&self, request: &HookRequest) -> anyhow::Result<Response>;
}

impl<F> ResponseHook for F
where
    F: Fn(&HookRequest) -> anyhow::Result<Response> + Send + Sync,
{
    fn respond(&self, request: &HookRequest) -> anyhow::Result<Response> {
        self(request)
    }
}

/// Path to hook table, filled once before the server starts
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn ResponseHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `echo` and `status` hooks
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Echo);
        registry.register("status", Status);
        registry
    }

    /// Register `hook` for `path`, which is normalized the same way
    /// request paths are
    pub fn register(&mut self, path: &str, hook: impl ResponseHook + 'static) {
        let key = Translated::new(path).relative;
        self.hooks.insert(key, Arc::new(hook));
    }

    pub fn get(&self, relative: &str) -> Option<Arc<dyn ResponseHook>> {
        self.hooks.get(relative).cloned()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.hooks.keys().collect();
        paths.sort();
        f.debug_struct("HookRegistry").field("paths", &paths).finish()
    }
}

/// Reflects the request back as JSON
pub struct Echo;

#[derive(Serialize)]
struct EchoBody<'a> {
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    headers: BTreeMap<&'a str, String>,
    body: String,
}

impl ResponseHook for Echo {
    fn respond(&self, request: &HookRequest) -> anyhow::Result<Response> {
        let echo = EchoBody {
            method: request.method.as_str(),
            path: &request.path,
            query: request.query.as_deref(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
                .collect(),
            body: String::from_utf8_lossy(&request.body).into_owned(),
        };
        let json = serde_json::to_string(&echo)?;
        Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
    }
}

/// Responds with the status given as `?code=N`
pub struct Status;

impl ResponseHook for Status {
    fn respond(&self, request: &HookRequest) -> anyhow::Result<Response> {
        let code = request
            .query_param("code")
            .ok_or_else(|| anyhow!("status hook needs a code parameter"))?;
        let code: u16 = code
            .parse()
            .with_context(|| format!("invalid status code {code:?}"))?;
        let status = StatusCode::from_u16(code)?;
        Ok((status, format!("status {}\n", status.as_u16())).into_response())
    }
}
