//! In-process transport.
//!
//! A [`MemoryNetwork`] is a shared fabric that any number of
//! [`MemoryTransport`]s attach to. Hosts are addressed as `mem://<n>`.
//! Messages travel over unbounded channels, so delivery is ordered and
//! reliable for as long as both ends are alive.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::transport::{
    Connection, Inbound, JoinHandler, Message, Outbound, PingHandler, RemoteHost, Transport,
};
use crate::types::Game;
use crate::{Result, SyncError};

const SCHEME: &str = "mem://";

struct HostEntry<G: Game> {
    ping: Option<PingHandler>,
    join: Option<JoinHandler>,
    incoming: mpsc::UnboundedSender<Connection<G>>,
    /// Hosts this one already has a connection with.
    linked: BTreeSet<u64>,
}

struct Fabric<G: Game> {
    hosts: BTreeMap<u64, HostEntry<G>>,
    next_host: u64,
}

/// Shared in-process network.
pub struct MemoryNetwork<G: Game> {
    fabric: Arc<Mutex<Fabric<G>>>,
}

impl<G: Game> Clone for MemoryNetwork<G> {
    fn clone(&self) -> Self {
        Self { fabric: Arc::clone(&self.fabric) }
    }
}

impl<G: Game> Default for MemoryNetwork<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Game> MemoryNetwork<G> {
    pub fn new() -> Self {
        Self { fabric: Arc::new(Mutex::new(Fabric { hosts: BTreeMap::new(), next_host: 0 })) }
    }

    /// Attach a new host to the fabric. It does not answer pings until
    /// [`Transport::host`] is called.
    pub fn transport(&self) -> MemoryTransport<G> {
        let (tx, incoming) = mpsc::unbounded_channel();
        let mut fabric = self.fabric.lock();
        let id = fabric.next_host;
        fabric.next_host += 1;
        fabric.hosts.insert(
            id,
            HostEntry { ping: None, join: None, incoming: tx, linked: BTreeSet::new() },
        );
        debug!("Attached {}{} to memory network", SCHEME, id);
        MemoryTransport { network: self.clone(), id, incoming }
    }

    fn address(id: u64) -> String {
        format!("{SCHEME}{id}")
    }

    fn parse(address: &str) -> Result<u64> {
        address
            .strip_prefix(SCHEME)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| SyncError::transport_failed(format!("Not a memory address: {address}")))
    }
}

/// One host on a [`MemoryNetwork`].
pub struct MemoryTransport<G: Game> {
    network: MemoryNetwork<G>,
    id: u64,
    incoming: mpsc::UnboundedReceiver<Connection<G>>,
}

impl<G: Game> MemoryTransport<G> {
    pub fn address(&self) -> String {
        MemoryNetwork::<G>::address(self.id)
    }
}

struct ChannelOutbound<G: Game> {
    tx: Mutex<Option<mpsc::UnboundedSender<Message<G>>>>,
    peer: String,
}

#[async_trait::async_trait]
impl<G: Game> Outbound<G> for ChannelOutbound<G> {
    async fn send(&self, message: Message<G>) -> Result<()> {
        let tx = self.tx.lock().clone();
        let tx = tx.ok_or_else(|| SyncError::connection_closed(&self.peer))?;
        tx.send(message).map_err(|_| SyncError::connection_closed(&self.peer))
    }

    async fn close(&self) {
        self.tx.lock().take();
    }
}

struct ChannelInbound<G: Game> {
    rx: mpsc::UnboundedReceiver<Message<G>>,
}

#[async_trait::async_trait]
impl<G: Game> Inbound<G> for ChannelInbound<G> {
    async fn recv(&mut self) -> Option<Message<G>> {
        self.rx.recv().await
    }
}

fn connection_pair<G: Game>(a: String, b: String) -> (Connection<G>, Connection<G>) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    // Each side's connection is labeled with the address of the other side.
    let a_side = Connection::new(
        Box::new(ChannelOutbound { tx: Mutex::new(Some(a_tx)), peer: b.clone() }),
        Box::new(ChannelInbound { rx: a_rx }),
        b,
    );
    let b_side = Connection::new(
        Box::new(ChannelOutbound { tx: Mutex::new(Some(b_tx)), peer: a.clone() }),
        Box::new(ChannelInbound { rx: b_rx }),
        a,
    );
    (a_side, b_side)
}

#[async_trait::async_trait]
impl<G: Game> Transport<G> for MemoryTransport<G> {
    fn host(&self, ping: Option<PingHandler>, join: Option<JoinHandler>) {
        let mut fabric = self.network.fabric.lock();
        if let Some(entry) = fabric.hosts.get_mut(&self.id) {
            info!("{} hosting: {}", self.address(), ping.is_some() || join.is_some());
            entry.ping = ping;
            entry.join = join;
        }
    }

    async fn ping(&self, data: &[u8]) -> Result<Vec<RemoteHost>> {
        let handlers: Vec<(u64, PingHandler)> = {
            let fabric = self.network.fabric.lock();
            fabric
                .hosts
                .iter()
                .filter(|(id, _)| **id != self.id)
                .filter_map(|(id, entry)| entry.ping.clone().map(|ping| (*id, ping)))
                .collect()
        };

        // Handlers run outside the lock so they may use the network themselves.
        Ok(handlers
            .into_iter()
            .map(|(id, ping)| {
                let address = MemoryNetwork::<G>::address(id);
                match ping(data) {
                    Ok(data) => RemoteHost { address, data, error: None },
                    Err(reason) => RemoteHost { address, data: Vec::new(), error: Some(reason) },
                }
            })
            .collect())
    }

    async fn join(&self, remote: &RemoteHost, data: &[u8]) -> Result<Connection<G>> {
        let target = MemoryNetwork::<G>::parse(&remote.address)?;
        if target == self.id {
            return Err(SyncError::join_failed("cannot join self"));
        }

        let handler = {
            let fabric = self.network.fabric.lock();
            let entry = fabric
                .hosts
                .get(&target)
                .ok_or_else(|| SyncError::join_failed(format!("{} is gone", remote.address)))?;
            if entry.linked.contains(&self.id) {
                return Err(SyncError::join_failed(format!("already joined {}", remote.address)));
            }
            entry
                .join
                .clone()
                .ok_or_else(|| SyncError::join_failed(format!("{} is not hosting", remote.address)))?
        };

        handler(data).map_err(|reason| SyncError::JoinRejected {
            host: remote.address.clone(),
            reason,
        })?;

        let mut fabric = self.network.fabric.lock();
        let (ours, theirs) = connection_pair(self.address(), remote.address.clone());
        let entry = fabric
            .hosts
            .get_mut(&target)
            .ok_or_else(|| SyncError::join_failed(format!("{} is gone", remote.address)))?;
        entry
            .incoming
            .send(theirs)
            .map_err(|_| SyncError::join_failed(format!("{} stopped accepting", remote.address)))?;
        entry.linked.insert(self.id);
        if let Some(me) = fabric.hosts.get_mut(&self.id) {
            me.linked.insert(target);
        }

        debug!("{} joined {}", self.address(), remote.address);
        Ok(ours)
    }

    async fn accept(&mut self) -> Option<Connection<G>> {
        self.incoming.recv().await
    }

    fn shutdown(&self) {
        let mut fabric = self.network.fabric.lock();
        fabric.hosts.remove(&self.id);
        for entry in fabric.hosts.values_mut() {
            entry.linked.remove(&self.id);
        }
        debug!("{} left memory network", self.address());
    }
}

impl<G: Game> Drop for MemoryTransport<G> {
    fn drop(&mut self) {
        Transport::<G>::shutdown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestGame;

    fn open_host(transport: &MemoryTransport<TestGame>, name: &'static str) {
        transport.host(
            Some(Arc::new(move |_| Ok(name.as_bytes().to_vec()))),
            Some(Arc::new(|data| if data == b"let me in" { Ok(()) } else { Err("wrong password".into()) })),
        );
    }

    #[tokio::test]
    async fn ping_lists_other_hosts() -> anyhow::Result<()> {
        let network = MemoryNetwork::<TestGame>::new();
        let a = network.transport();
        let b = network.transport();
        let c = network.transport();
        open_host(&a, "alpha");
        open_host(&b, "beta");
        c.host(Some(Arc::new(|_| Err("busy".into()))), None);

        let hosts = a.ping(b"hi").await?;
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].data, b"beta");
        assert!(hosts[1].error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn join_connects_both_sides() -> anyhow::Result<()> {
        let network = MemoryNetwork::<TestGame>::new();
        let mut host = network.transport();
        let guest = network.transport();
        open_host(&host, "alpha");

        let remote = guest.ping(b"").await?.remove(0);
        let mut to_host = guest.join(&remote, b"let me in").await?;
        let mut to_guest = host.accept().await.ok_or_else(|| anyhow::anyhow!("no connection"))?;
        assert_eq!(to_guest.peer(), guest.address());
        assert_eq!(to_host.peer(), host.address());

        to_host.send(Message::Ready).await?;
        assert_eq!(to_guest.recv().await.map(|m| m.kind()), Some("ready"));

        to_guest.close().await;
        assert!(to_host.recv().await.is_none());
        assert!(to_guest.send(Message::Ready).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn join_refusals() -> anyhow::Result<()> {
        let network = MemoryNetwork::<TestGame>::new();
        let host = network.transport();
        let guest = network.transport();
        open_host(&host, "alpha");
        let remote = RemoteHost { address: host.address(), data: Vec::new(), error: None };

        let wrong = guest.join(&remote, b"guess").await.unwrap_err();
        assert!(matches!(wrong, SyncError::JoinRejected { .. }));

        let own = RemoteHost { address: guest.address(), data: Vec::new(), error: None };
        assert!(guest.join(&own, b"let me in").await.is_err());

        guest.join(&remote, b"let me in").await?;
        assert!(guest.join(&remote, b"let me in").await.is_err(), "duplicate join");

        let bogus = RemoteHost { address: "tcp://1".into(), data: Vec::new(), error: None };
        assert!(matches!(guest.join(&bogus, b"").await, Err(SyncError::Transport { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() -> anyhow::Result<()> {
        let network = MemoryNetwork::<TestGame>::new();
        let mut host = network.transport();
        let guest = network.transport();
        open_host(&host, "alpha");

        host.shutdown();
        assert!(guest.ping(b"").await?.is_empty());
        assert!(host.accept().await.is_none());
        Ok(())
    }
}
