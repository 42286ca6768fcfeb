use super::{EventKind, StorageClient, StorageEvent};
use crate::route::Route;
use crate::service::Service;
use async_trait::async_trait;
use base64::Engine;
use bytes::BytesMut;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// etcd v3 HTTP/JSON gateway client, scoped to the two prefixes this
/// system cares about: routes and services. Talks to the gRPC-Gateway
/// REST surface (`/v3/kv/range`, `/v3/watch`) rather than linking a gRPC
/// stack — no protoc dependency.
#[derive(Clone)]
pub struct EtcdStorage {
    http: reqwest::Client,
    base_url: String,
    route_prefix: String,
    service_prefix: String,
}

#[derive(Serialize)]
struct RangeRequest {
    key: String,
    range_end: String,
}

#[derive(Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Deserialize)]
struct KeyValue {
    #[serde(default)]
    value: String,
}

#[derive(Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct DeleteRangeRequest {
    key: String,
}

#[derive(Serialize)]
struct WatchCreateRequest {
    create_request: WatchCreate,
}

#[derive(Serialize)]
struct WatchCreate {
    key: String,
    range_end: String,
}

#[derive(Deserialize)]
struct WatchResponse {
    #[serde(default)]
    result: Option<WatchResult>,
}

#[derive(Deserialize)]
struct WatchResult {
    #[serde(default)]
    events: Vec<WatchEvent>,
}

#[derive(Deserialize)]
struct WatchEvent {
    #[allow(dead_code)]
    kv: Option<KeyValue>,
}

struct EtcdWatchState {
    byte_stream: std::pin::Pin<Box<dyn futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    buf: BytesMut,
}

fn b64_encode(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}

fn b64_decode(s: &str) -> anyhow::Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
    Ok(String::from_utf8(bytes)?)
}

/// etcd `range_end` for a prefix scan: the prefix with its last byte
/// incremented, so `range(prefix, prefix_range_end(prefix))` covers every
/// key under that prefix.
fn prefix_range_end(prefix: &str) -> String {
    let mut end = prefix.as_bytes().to_vec();
    for i in (0..end.len()).rev() {
        if end[i] < 0xff {
            end[i] += 1;
            end.truncate(i + 1);
            return b64_encode(&String::from_utf8_lossy(&end));
        }
    }
    String::new()
}

impl EtcdStorage {
    pub fn new(base_url: impl Into<String>, key_prefix: &str) -> Self {
        let key_prefix = key_prefix.trim_end_matches('/');
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            route_prefix: format!("{key_prefix}/routes/"),
            service_prefix: format!("{key_prefix}/services/"),
        }
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("etcd {} failed: {} - {}", path, status, body);
        }
        Ok(resp.json().await?)
    }

    async fn list_prefix<T: for<'de> Deserialize<'de>>(&self, prefix: &str) -> anyhow::Result<Vec<T>> {
        let resp: RangeResponse = self
            .post_json(
                "/v3/kv/range",
                &RangeRequest {
                    key: b64_encode(prefix),
                    range_end: prefix_range_end(prefix),
                },
            )
            .await?;

        let mut out = Vec::with_capacity(resp.kvs.len());
        for kv in resp.kvs {
            let raw = b64_decode(&kv.value)?;
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => out.push(value),
                Err(e) => tracing::error!(%e, "etcd: dropping undecodable value"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageClient for EtcdStorage {
    async fn list_routes(&self) -> anyhow::Result<Vec<Route>> {
        self.list_prefix(&self.route_prefix).await
    }

    async fn list_services(&self) -> anyhow::Result<Vec<Service>> {
        self.list_prefix(&self.service_prefix).await
    }

    async fn write_route(&self, route: Route) -> anyhow::Result<()> {
        let key = format!("{}{}", self.route_prefix, route.id);
        let value = serde_json::to_string(&route)?;
        let _: serde_json::Value = self
            .post_json(
                "/v3/kv/put",
                &PutRequest {
                    key: b64_encode(&key),
                    value: b64_encode(&value),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_route(&self, id: &str) -> anyhow::Result<()> {
        let key = format!("{}{}", self.route_prefix, id);
        let _: serde_json::Value = self
            .post_json(
                "/v3/kv/deleterange",
                &DeleteRangeRequest {
                    key: b64_encode(&key),
                },
            )
            .await?;
        Ok(())
    }

    async fn watch(&self) -> anyhow::Result<BoxStream<'static, StorageEvent>> {
        let url = format!("{}/v3/watch", self.base_url);
        // A single watch covers both prefixes via their common parent; any
        // key under either prefix triggers a rebuild regardless of which
        // collection changed, so the watched range is the shorter of the
        // two prefixes' common ancestor rather than two separate streams.
        let common_prefix = common_ancestor(&self.route_prefix, &self.service_prefix);
        let resp = self
            .http
            .post(&url)
            .json(&WatchCreateRequest {
                create_request: WatchCreate {
                    key: b64_encode(&common_prefix),
                    range_end: prefix_range_end(&common_prefix),
                },
            })
            .send()
            .await?;

        let state = EtcdWatchState {
            byte_stream: Box::pin(resp.bytes_stream()),
            buf: BytesMut::with_capacity(4096),
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(pos) = state.buf.iter().position(|&b| b == b'\n') {
                    let line_bytes = state.buf.split_to(pos + 1);
                    let line = String::from_utf8_lossy(&line_bytes).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WatchResponse>(&line) {
                        Ok(WatchResponse {
                            result: Some(result),
                        }) if !result.events.is_empty() => {
                            let event = StorageEvent {
                                kind: EventKind::RouteChanged,
                            };
                            return Some((event, state));
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::error!(%e, %line, "etcd: watch response parse failed");
                            continue;
                        }
                    }
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => state.buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        tracing::error!(%e, "etcd: watch stream error");
                        return None;
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

fn common_ancestor(a: &str, b: &str) -> String {
    let mut out = String::new();
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca == cb {
            out.push(ca);
        } else {
            break;
        }
    }
    out
}
