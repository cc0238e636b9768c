//! Request broker
//!
//! Long-running server owning one store connection and one [`DataApi`].
//! The accept loop is strictly sequential: one request is fully handled,
//! lock waits included, before the next connection is accepted. Scale-out
//! means running more broker processes, not more threads in this one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::api::DataApi;
use crate::common::config::BrokerConfig;
use crate::common::wire::{Request, Response, CODE_MALFORMED, CODE_UNAVAILABLE};
use crate::common::Result;
use crate::store::{CoordinationStore, StoreState};

/// Admissible root paths for the administrative `setpath` operation.
static SETPATH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(/[A-Za-z0-9_]+)+/?$").unwrap());

struct Shared {
    running: AtomicBool,
    notify: Notify,
}

/// Handle for stopping a running broker from another task.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        // notify_one keeps a permit when the loop is not parked on accept
        // yet, so a stop can never be lost to that race.
        self.shared.notify.notify_one();
    }
}

/// One broker instance: accept socket, store handle, data layer.
pub struct Broker<S> {
    listener: TcpListener,
    store: Arc<S>,
    api: DataApi<S>,
    shared: Arc<Shared>,
    idle_timeout: Duration,
}

impl<S: CoordinationStore> Broker<S> {
    /// Bind the request channel and bind the data layer to `config.root_path`.
    pub async fn bind(config: &BrokerConfig, store: Arc<S>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let mut api = DataApi::new(Arc::clone(&store), config.lock_timeout());
        api.set_root_path(&config.root_path).await?;
        Ok(Self {
            listener,
            store,
            api,
            shared: Arc::new(Shared {
                running: AtomicBool::new(true),
                notify: Notify::new(),
            }),
            idle_timeout: config.idle_timeout(),
        })
    }

    /// Actual bound address (relevant when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the accept loop until the stop handle fires.
    ///
    /// Accepted connections get a short idle window to produce a request;
    /// silent peers are dropped without reply. Every parsed request gets
    /// exactly one reply before the connection closes.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("Starting broker");
        tracing::info!("  Request channel: {}", self.listener.local_addr()?);
        tracing::info!("  Store: {} ({})", self.store.endpoint(), self.store.state());
        tracing::info!("  Root path: {}", self.api.root_path());

        while self.shared.running.load(Ordering::SeqCst) {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("accept failed: {}", e);
                        continue;
                    }
                },
                _ = self.shared.notify.notified() => break,
            };
            tracing::trace!("connection from {}", peer);
            if let Err(e) = self.handle_connection(stream).await {
                tracing::warn!("connection from {} failed: {}", peer, e);
            }
        }

        // Accept socket and store connection are dropped here.
        tracing::info!("Broker stopped");
        Ok(())
    }

    async fn handle_connection(&mut self, stream: TcpStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        match timeout(self.idle_timeout, reader.read_line(&mut line)).await {
            // Nothing within the idle window: drop the stalled peer.
            Err(_) => return Ok(()),
            Ok(read) => {
                if read? == 0 {
                    return Ok(());
                }
            }
        }

        let response = self.process(line.trim()).await;
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
        write_half.flush().await?;
        Ok(())
    }

    /// Turn one raw request line into a reply envelope. Nothing escapes to
    /// the transport: every failure becomes a negative code plus a
    /// description.
    async fn process(&mut self, raw: &str) -> Response {
        if self.store.state() != StoreState::Connected {
            return Response::error(CODE_UNAVAILABLE, "store unavailable");
        }

        let request = match Request::decode(raw) {
            Ok(request) => request,
            Err(e) => return Response::error(CODE_MALFORMED, format!("invalid request: {e}")),
        };

        let operation = request.operation();
        match self.dispatch(request).await {
            Ok(data) => Response::ok(data),
            Err(err) => {
                tracing::debug!("operation {} failed: {}", operation, err);
                Response::error(err.wire_code(), err.to_string())
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Value> {
        match request {
            Request::Create {
                name,
                modality,
                password,
                players,
            } => {
                let path = self
                    .api
                    .create_tournament(&name, modality, &password, &players)
                    .await?;
                Ok(Value::String(path))
            }
            Request::Update {
                id,
                version,
                classification,
                password,
            } => {
                self.api
                    .update_tournament(id, version, &classification, &password)
                    .await?;
                Ok(Value::Bool(true))
            }
            Request::Delete { id, password } => {
                self.api.delete_tournament(id, &password).await?;
                Ok(json!(0))
            }
            Request::Get { id } => Ok(serde_json::to_value(self.api.get_tournament(id).await?)?),
            Request::GetList {} => Ok(serde_json::to_value(self.api.get_tournament_list().await?)?),
            Request::Setpath { path } => {
                if !SETPATH_PATTERN.is_match(&path) {
                    return Err(crate::Error::MalformedRequest(format!(
                        "malformed path: {path}"
                    )));
                }
                self.api.set_root_path(&path).await?;
                Ok(Value::String(path))
            }
            Request::Status {} => Ok(json!({
                "status": self.store.state(),
                "address": self.store.endpoint(),
            })),
            Request::Dummy {} => Ok(Value::String("OK".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    async fn test_broker() -> Broker<MemoryStore> {
        let config = BrokerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        Broker::bind(&config, Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_request_code() {
        let mut broker = test_broker().await;
        let response = broker.process("not json at all").await;
        assert_eq!(response.code, CODE_MALFORMED);

        let response = broker
            .process(r#"{"operation":"explode","data":{}}"#)
            .await;
        assert_eq!(response.code, CODE_MALFORMED);
    }

    #[tokio::test]
    async fn test_store_down_short_circuits() {
        let config = BrokerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new());
        let mut broker = Broker::bind(&config, Arc::clone(&store)).await.unwrap();

        store.set_connected(false);
        // Even a well-formed request must not reach the data layer.
        let response = broker.process(r#"{"operation":"get_list"}"#).await;
        assert_eq!(response.code, CODE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_setpath_validation() {
        let mut broker = test_broker().await;

        let response = broker
            .process(r#"{"operation":"setpath","data":{"path":"/custom/area_51"}}"#)
            .await;
        assert_eq!(response.code, 0);
        assert_eq!(broker.api.root_path(), "/custom/area_51");

        for bad in ["relative/path", "/spaces here", "/semi;colon", ""] {
            let raw = format!(
                r#"{{"operation":"setpath","data":{{"path":"{bad}"}}}}"#
            );
            let response = broker.process(&raw).await;
            assert_eq!(response.code, CODE_MALFORMED, "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn test_status_and_dummy() {
        let mut broker = test_broker().await;

        let response = broker.process(r#"{"operation":"status"}"#).await;
        assert_eq!(response.code, 0);
        assert_eq!(response.data["status"], "connected");
        assert_eq!(response.data["address"], "memory://local");

        // The canonical envelope spells the empty mapping out.
        let response = broker.process(r#"{"operation":"status","data":{}}"#).await;
        assert_eq!(response.code, 0);
        let response = broker.process(r#"{"operation":"get_list","data":{}}"#).await;
        assert_eq!(response.code, 0);

        let response = broker.process(r#"{"operation":"dummy"}"#).await;
        assert_eq!(response.code, 0);
        assert_eq!(response.data, "OK");
    }
}
