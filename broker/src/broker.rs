// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mqtt_codec::SubTopic;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};

use crate::client::{Client, ClientId};
use crate::config::Config;
use crate::connection;
use crate::error::Error;
use crate::subscription::SubscriptionTree;

/// Owns the client table and the subscription index, and spawns one
/// task per accepted connection.
///
/// The client table is behind a `Mutex`: connections insert and
/// remove entries but rarely iterate it together. The subscription
/// tree is behind a `RwLock`: many connection tasks read it to match
/// a PUBLISH topic against filters, while writes only happen on
/// SUBSCRIBE/UNSUBSCRIBE/teardown -- the read-heavy/write-light shape
/// the tree's design note calls for.
pub struct Broker {
    clients: Mutex<HashMap<ClientId, Client>>,
    subscriptions: RwLock<SubscriptionTree>,
    next_id: AtomicU64,
    read_chunk_size: usize,
}

impl Broker {
    pub fn new(config: &Config) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            subscriptions: RwLock::new(SubscriptionTree::new()),
            next_id: AtomicU64::new(1),
            read_chunk_size: config.listener().read_chunk_size(),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn insert_client(&self, client: Client) {
        let id = client.id();
        log::info!(
            "Registering client {} ({})",
            id.value(),
            client.client_identifier()
        );
        self.clients.lock().await.insert(id, client);
    }

    pub async fn remove_client(&self, id: ClientId) {
        let removed = self.clients.lock().await.remove(&id);
        if removed.is_some() {
            self.subscriptions.write().await.remove_client(id);
            log::info!("Removed client {}", id.value());
        }
    }

    pub async fn touch_client(&self, id: ClientId) {
        if let Some(client) = self.clients.lock().await.get_mut(&id) {
            client.touch();
        }
    }

    pub async fn subscribe(&self, id: ClientId, filter: SubTopic) {
        if let Some(client) = self.clients.lock().await.get_mut(&id) {
            client.record_subscription(filter.as_str().to_string());
        }
        self.subscriptions.write().await.subscribe(filter, id);
    }

    /// Binds the listener and accepts connections until the process
    /// is terminated. Only a bind failure propagates out of here, per
    /// the error-handling design's "only allocator failure and
    /// listener-bind failure propagate out of start".
    pub async fn start(self: Arc<Self>, config: &Config) -> Result<(), Error> {
        let listener = self.bind(config).await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Binds the configured listener address without accepting yet,
    /// split out from `start` so tests can bind an ephemeral port
    /// (`bind_port = 0`) and discover it via `TcpListener::local_addr`.
    pub async fn bind(&self, config: &Config) -> Result<TcpListener, Error> {
        let addr = format!(
            "{}:{}",
            config.listener().bind_address(),
            config.listener().bind_port()
        );
        let listener = TcpListener::bind(&addr).await?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accepts connections from an already-bound listener forever,
    /// spawning one task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    log::warn!("Failed to accept connection: {err}");
                    continue;
                }
            };
            log::debug!("Accepted raw connection from {peer_addr}");
            let broker = Arc::clone(&self);
            let read_chunk_size = self.read_chunk_size;
            tokio::spawn(async move {
                connection::run(broker, stream, read_chunk_size).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_ids_are_assigned_monotonically() {
        let broker = Broker::new(&Config::default());
        let first = broker.next_client_id();
        let second = broker.next_client_id();
        assert!(second.value() > first.value());
    }

    #[tokio::test]
    async fn removing_a_client_clears_its_subscriptions() {
        let broker = Broker::new(&Config::default());
        let id = broker.next_client_id();
        let client = Client::new(
            id,
            "test01".to_string(),
            mqtt_codec::ProtocolVersion::V3_1_1,
            "127.0.0.1:1883".parse().unwrap(),
            true,
            60,
            None,
            None,
            None,
        );
        broker.insert_client(client).await;
        broker.subscribe(id, SubTopic::new("a/b").unwrap()).await;
        assert!(broker.subscriptions.read().await.matching("a/b").contains(&id));
        broker.remove_client(id).await;
        assert!(!broker.subscriptions.read().await.matching("a/b").contains(&id));
    }
}
