//! In-memory backing object store.
//!
//! [`MemoryStore`] implements [`Backend`] with the account, container and
//! object semantics the gateway relies on:
//!
//! - `PUT`/`POST`/`HEAD`/`GET`/`DELETE` on `/v1/<account>/<container>`,
//!   with `X-Container-Meta-*` metadata
//! - `PUT`/`POST`/`HEAD`/`GET`/`DELETE` on objects, with `X-Object-Meta-*`
//!   metadata replaced wholesale on `POST`
//! - single-range `GET` (`bytes=a-b`, `bytes=a-`, `bytes=-n`) answered
//!   with 206
//! - an optional required token, answered with 401 when missing
//! - percent-decoded addressing, so `o.txt` and `o%2Etxt` are one object
//!
//! Every request that reaches the store is recorded, so tests can assert
//! what the gateway actually sent.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    ETAG, RANGE,
};
use http::{Method, StatusCode};
use mnemosyne_core::headers::{CONTAINER_META_PREFIX, OBJECT_META_PREFIX};
use mnemosyne_core::ObjectPath;
use mnemosyne_middleware::subrequest::SubrequestSource;
use mnemosyne_middleware::types::{collect_body, full};
use mnemosyne_middleware::{
    Backend, BoxFuture, MiddlewareContext, Request, Response, TransportError,
};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};

/// One request as the store received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Stage that issued the request, for sub-requests.
    pub source: Option<&'static str>,
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object bytes as stored.
    pub data: Bytes,
    /// User metadata, keyed by full lowercase header name.
    pub meta: BTreeMap<String, String>,
    /// Content type supplied on upload.
    pub content_type: Option<String>,
    /// Hex SHA-1 of the stored bytes.
    pub etag: String,
}

impl StoredObject {
    /// Returns a metadata value by full header name.
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct Container {
    meta: BTreeMap<String, String>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct Inner {
    containers: Mutex<BTreeMap<String, Container>>,
    requests: Mutex<Vec<RecordedRequest>>,
    auth_token: Option<String>,
}

/// In-memory object store.
///
/// Cloning yields another handle on the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that requires `X-Auth-Token: <token>`.
    pub fn with_auth_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth_token: Some(token.into()),
                ..Inner::default()
            }),
        }
    }

    /// Creates a container directly, bypassing the request log.
    ///
    /// `meta` pairs are given without the `x-container-meta-` prefix.
    pub fn create_container(&self, path: &str, meta: &[(&str, &str)]) {
        let mut containers = self.inner.containers.lock();
        let container = containers.entry(container_key(path)).or_default();
        for (name, value) in meta {
            container
                .meta
                .insert(name.to_ascii_lowercase(), (*value).to_string());
        }
    }

    /// Returns a stored object by full path.
    pub fn object(&self, path: &str) -> Option<StoredObject> {
        let (container, object) = split_object_path(path)?;
        self.inner
            .containers
            .lock()
            .get(&container)
            .and_then(|c| c.objects.get(&object))
            .cloned()
    }

    /// Returns the object names in a container, in order.
    pub fn object_names(&self, container: &str) -> Vec<String> {
        self.inner
            .containers
            .lock()
            .get(&container_key(container))
            .map(|c| c.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().clone()
    }

    /// Returns how many requests were received.
    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Forgets recorded requests.
    pub fn clear_requests(&self) {
        self.inner.requests.lock().clear();
    }

    fn record(&self, request: &Request) {
        self.inner.requests.lock().push(RecordedRequest {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers: request.headers().clone(),
            source: request
                .extensions()
                .get::<SubrequestSource>()
                .map(|source| source.0),
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.inner.auth_token {
            None => true,
            Some(token) => headers
                .get("x-auth-token")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == token),
        }
    }

    async fn handle(&self, request: Request) -> Response {
        self.record(&request);

        if !self.authorized(request.headers()) {
            return status_only(StatusCode::UNAUTHORIZED);
        }

        let Some(path) = decoded_path(request.uri().path()) else {
            return status_only(StatusCode::BAD_REQUEST);
        };

        match (path.container_path(), path.object()) {
            (Some(container), Some(object)) => {
                let (parts, body) = request.into_parts();
                let body = match collect_body(body).await {
                    Ok(body) => body,
                    Err(_) => return status_only(StatusCode::BAD_REQUEST),
                };
                self.object_request(&parts.method, &parts.headers, &container, object, body)
            }
            (Some(container), None) => {
                self.container_request(request.method(), request.headers(), &container)
            }
            (None, _) => match *request.method() {
                Method::GET | Method::HEAD => status_only(StatusCode::NO_CONTENT),
                _ => status_only(StatusCode::METHOD_NOT_ALLOWED),
            },
        }
    }

    fn container_request(&self, method: &Method, headers: &HeaderMap, path: &str) -> Response {
        let mut containers = self.inner.containers.lock();

        match *method {
            Method::PUT => {
                let created = !containers.contains_key(path);
                let container = containers.entry(path.to_string()).or_default();
                merge_meta(&mut container.meta, headers, CONTAINER_META_PREFIX, true);
                status_only(if created {
                    StatusCode::CREATED
                } else {
                    StatusCode::ACCEPTED
                })
            }
            Method::POST => match containers.get_mut(path) {
                Some(container) => {
                    merge_meta(&mut container.meta, headers, CONTAINER_META_PREFIX, true);
                    status_only(StatusCode::NO_CONTENT)
                }
                None => status_only(StatusCode::NOT_FOUND),
            },
            Method::HEAD | Method::GET => {
                let Some(container) = containers.get(path) else {
                    return status_only(StatusCode::NOT_FOUND);
                };
                let listing: String = container
                    .objects
                    .keys()
                    .map(|name| format!("{name}\n"))
                    .collect();
                let mut response_headers = HeaderMap::new();
                for (name, value) in &container.meta {
                    insert_header(
                        &mut response_headers,
                        &format!("{CONTAINER_META_PREFIX}{name}"),
                        value,
                    );
                }
                insert_header(
                    &mut response_headers,
                    "x-container-object-count",
                    &container.objects.len().to_string(),
                );
                let (status, body) = if *method == Method::HEAD || listing.is_empty() {
                    (StatusCode::NO_CONTENT, Bytes::new())
                } else {
                    (StatusCode::OK, Bytes::from(listing))
                };
                respond(status, response_headers, body)
            }
            Method::DELETE => match containers.get(path) {
                None => status_only(StatusCode::NOT_FOUND),
                Some(container) if !container.objects.is_empty() => {
                    status_only(StatusCode::CONFLICT)
                }
                Some(_) => {
                    containers.remove(path);
                    status_only(StatusCode::NO_CONTENT)
                }
            },
            _ => status_only(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn object_request(
        &self,
        method: &Method,
        headers: &HeaderMap,
        container: &str,
        object: &str,
        body: Bytes,
    ) -> Response {
        let mut containers = self.inner.containers.lock();
        let Some(container) = containers.get_mut(container) else {
            return status_only(StatusCode::NOT_FOUND);
        };

        match *method {
            Method::PUT => {
                let mut meta = BTreeMap::new();
                merge_meta(&mut meta, headers, OBJECT_META_PREFIX, false);
                let stored = StoredObject {
                    etag: hex::encode(Sha1::digest(&body)),
                    content_type: headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    data: body,
                    meta,
                };
                let mut response_headers = HeaderMap::new();
                insert_header(&mut response_headers, ETAG.as_str(), &stored.etag);
                container.objects.insert(object.to_string(), stored);
                respond(StatusCode::CREATED, response_headers, Bytes::new())
            }
            Method::POST => match container.objects.get_mut(object) {
                Some(stored) => {
                    stored.meta.clear();
                    merge_meta(&mut stored.meta, headers, OBJECT_META_PREFIX, false);
                    status_only(StatusCode::ACCEPTED)
                }
                None => status_only(StatusCode::NOT_FOUND),
            },
            Method::DELETE => match container.objects.remove(object) {
                Some(_) => status_only(StatusCode::NO_CONTENT),
                None => status_only(StatusCode::NOT_FOUND),
            },
            Method::GET | Method::HEAD => {
                let Some(stored) = container.objects.get(object) else {
                    return status_only(StatusCode::NOT_FOUND);
                };
                let range = match *method {
                    Method::GET => headers.get(RANGE).and_then(|v| v.to_str().ok()),
                    _ => None,
                };
                read_object(stored, *method == Method::HEAD, range)
            }
            _ => status_only(StatusCode::METHOD_NOT_ALLOWED),
        }
    }
}

impl Backend for MemoryStore {
    fn call<'a>(
        &'a self,
        _ctx: &'a MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin(async move { Ok(self.handle(request).await) })
    }
}

/// Backend whose every call fails at the transport level.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

impl Backend for UnreachableStore {
    fn call<'a>(
        &'a self,
        _ctx: &'a MiddlewareContext,
        _request: Request,
    ) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin(async { Err(TransportError::new("connection refused")) })
    }
}

fn read_object(stored: &StoredObject, head: bool, range: Option<&str>) -> Response {
    let total = stored.data.len();
    let mut headers = HeaderMap::new();
    for (name, value) in &stored.meta {
        insert_header(&mut headers, name, value);
    }
    insert_header(&mut headers, ETAG.as_str(), &stored.etag);
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(content_type) = &stored.content_type {
        insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type);
    }

    let selected = match range.map(|r| parse_range(r, total)) {
        None | Some(ByteRange::Ignored) => None,
        Some(ByteRange::Unsatisfiable) => {
            let mut headers = HeaderMap::new();
            insert_header(&mut headers, CONTENT_RANGE.as_str(), &format!("bytes */{total}"));
            return respond(StatusCode::RANGE_NOT_SATISFIABLE, headers, Bytes::new());
        }
        Some(ByteRange::Bytes(start, end)) => Some((start, end)),
    };

    let (status, data) = match selected {
        Some((start, end)) => {
            insert_header(
                &mut headers,
                CONTENT_RANGE.as_str(),
                &format!("bytes {start}-{end}/{total}"),
            );
            (StatusCode::PARTIAL_CONTENT, stored.data.slice(start..=end))
        }
        None => (StatusCode::OK, stored.data.clone()),
    };

    headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
    let body = if head { Bytes::new() } else { data };
    respond(status, headers, body)
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Bytes(usize, usize),
    Unsatisfiable,
    Ignored,
}

/// Parses a single byte range against an object of `total` bytes.
///
/// Malformed or multi-range headers are ignored and the full object is
/// served.
fn parse_range(value: &str, total: usize) -> ByteRange {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Ignored;
    };
    if ranges.contains(',') {
        return ByteRange::Ignored;
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return ByteRange::Ignored;
    };

    let (start, end) = match (start.trim(), end.trim()) {
        ("", suffix) => match suffix.parse::<usize>() {
            Ok(0) => return ByteRange::Unsatisfiable,
            Ok(n) => (total.saturating_sub(n), total.saturating_sub(1)),
            Err(_) => return ByteRange::Ignored,
        },
        (start, "") => match start.parse::<usize>() {
            Ok(s) => (s, total.saturating_sub(1)),
            Err(_) => return ByteRange::Ignored,
        },
        (start, end) => match (start.parse::<usize>(), end.parse::<usize>()) {
            (Ok(s), Ok(e)) if s <= e => (s, e.min(total.saturating_sub(1))),
            _ => return ByteRange::Ignored,
        },
    };

    if total == 0 || start >= total {
        ByteRange::Unsatisfiable
    } else {
        ByteRange::Bytes(start, end)
    }
}

fn merge_meta(
    meta: &mut BTreeMap<String, String>,
    headers: &HeaderMap,
    prefix: &str,
    strip_prefix: bool,
) {
    for (name, value) in headers {
        let Some(short) = name.as_str().strip_prefix(prefix) else {
            continue;
        };
        let key = if strip_prefix { short } else { name.as_str() };
        match value.to_str() {
            Ok("") => {
                meta.remove(key);
            }
            Ok(value) => {
                meta.insert(key.to_string(), value.to_string());
            }
            Err(_) => {}
        }
    }
}

fn decoded_path(raw: &str) -> Option<ObjectPath> {
    ObjectPath::parse(&ObjectPath::parse(raw)?.decoded())
}

fn container_key(path: &str) -> String {
    decoded_path(path)
        .and_then(|p| p.container_path())
        .unwrap_or_else(|| path.trim_end_matches('/').to_string())
}

fn split_object_path(path: &str) -> Option<(String, String)> {
    let path = decoded_path(path)?;
    Some((path.container_path()?, path.object()?.to_string()))
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

fn respond(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = http::Response::new(full(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn status_only(status: StatusCode) -> Response {
    respond(status, HeaderMap::new(), Bytes::new())
}
