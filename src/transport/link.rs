//! UDP link layer.
//!
//! Each datagram carries a two-byte link header in front of the PDU:
//!
//! ```text
//! +--------+--------+----------------------+
//! | Src ID | Dst ID | PDU (codec-encoded)  |
//! | 1 byte | 1 byte | ...                  |
//! +--------+--------+----------------------+
//! ```
//!
//! Datagrams addressed to another node are ignored, so several nodes may
//! share a broadcast medium.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::frame;
use super::inbox::Inbox;
use crate::core::{
    ArqError, ArqResult, LINK_HEADER_SIZE, LinkLayer, NodeId, PduKind, ReceivedPdu,
};
use crate::fsm::{Event, EventRegistry};

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 2048;

/// Maps node ids to socket addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    routes: HashMap<NodeId, SocketAddr>,
}

impl AddressBook {
    /// Create an empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a route.
    pub fn insert(&mut self, id: NodeId, addr: SocketAddr) -> Option<SocketAddr> {
        self.routes.insert(id, addr)
    }

    /// Add a route, builder style.
    pub fn with_route(mut self, id: NodeId, addr: SocketAddr) -> Self {
        self.insert(id, addr);
        self
    }

    /// Look up the address of a node.
    pub fn resolve(&self, id: NodeId) -> ArqResult<SocketAddr> {
        self.routes.get(&id).copied().ok_or(ArqError::UnknownNode(id))
    }

    /// Number of known routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no route is known.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(NodeId, SocketAddr)> for AddressBook {
    fn from_iter<I: IntoIterator<Item = (NodeId, SocketAddr)>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// Prepend the link header to a PDU.
pub fn encode_datagram(src: NodeId, dest: NodeId, pdu: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LINK_HEADER_SIZE + pdu.len());
    buf.push(src.as_byte());
    buf.push(dest.as_byte());
    buf.extend_from_slice(pdu);
    buf
}

/// Split a datagram into source, destination and PDU.
pub fn decode_datagram(datagram: &[u8]) -> Option<(NodeId, NodeId, &[u8])> {
    if datagram.len() < LINK_HEADER_SIZE {
        return None;
    }
    Some((
        NodeId(datagram[0]),
        NodeId(datagram[1]),
        &datagram[LINK_HEADER_SIZE..],
    ))
}

/// Link layer over a tokio UDP socket.
///
/// Sends run on spawned tasks and raise `DataTxDone`/`AckTxDone` when the
/// datagram has been handed to the OS (or the attempt failed). A background
/// task receives datagrams and raises `DataReceived`/`AckReceived`.
#[derive(Debug)]
pub struct UdpLink {
    local_id: NodeId,
    socket: Arc<UdpSocket>,
    routes: AddressBook,
    registry: Arc<EventRegistry>,
    inbox: Arc<Inbox>,
    runtime: Handle,
    receiver: JoinHandle<()>,
}

impl UdpLink {
    /// Bind a socket and start receiving for `local_id`.
    pub async fn bind(
        local_id: NodeId,
        addr: SocketAddr,
        routes: AddressBook,
        registry: Arc<EventRegistry>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(local_id, socket, routes, registry))
    }

    /// Wrap an existing socket and start receiving for `local_id`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn from_socket(
        local_id: NodeId,
        socket: UdpSocket,
        routes: AddressBook,
        registry: Arc<EventRegistry>,
    ) -> Self {
        let socket = Arc::new(socket);
        let inbox = Arc::new(Inbox::new());
        let runtime = Handle::current();
        let receiver = runtime.spawn(receive_loop(
            local_id,
            Arc::clone(&socket),
            Arc::clone(&registry),
            Arc::clone(&inbox),
        ));

        Self {
            local_id,
            socket,
            routes,
            registry,
            inbox,
            runtime,
            receiver,
        }
    }

    /// Address of this node.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Local socket address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Known routes.
    pub fn routes(&self) -> &AddressBook {
        &self.routes
    }

    /// Add or replace a route.
    pub fn add_route(&mut self, id: NodeId, addr: SocketAddr) {
        self.routes.insert(id, addr);
    }
}

impl LinkLayer for UdpLink {
    fn send(&mut self, pdu: &[u8], dest: NodeId, kind: PduKind) -> ArqResult<()> {
        let addr = self.routes.resolve(dest)?;
        let datagram = encode_datagram(self.local_id, dest, pdu);
        let socket = Arc::clone(&self.socket);
        let registry = Arc::clone(&self.registry);

        self.runtime.spawn(async move {
            if let Err(e) = socket.send_to(&datagram, addr).await {
                // The frame is lost; retransmission covers data, the peer covers acks.
                warn!(%dest, %addr, error = %e, "datagram send failed");
            } else {
                trace!(%dest, %addr, len = datagram.len(), "datagram sent");
            }
            registry.set(match kind {
                PduKind::Data => Event::DataTxDone,
                PduKind::Ack => Event::AckTxDone,
            });
        });
        Ok(())
    }

    fn received_data(&self) -> Option<ReceivedPdu> {
        self.inbox.data()
    }

    fn received_ack(&self) -> Option<ReceivedPdu> {
        self.inbox.ack()
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(
    local_id: NodeId,
    socket: Arc<UdpSocket>,
    registry: Arc<EventRegistry>,
    inbox: Arc<Inbox>,
) {
    let mut buf = vec![0u8; DEFAULT_RECV_BUFFER_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                debug!(error = %e, "ignoring transient receive error");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "receive failed, link is deaf");
                break;
            }
        };

        let Some((src, dest, pdu)) = decode_datagram(&buf[..len]) else {
            trace!(%from, len, "dropping runt datagram");
            continue;
        };
        if dest != local_id {
            trace!(%from, %src, %dest, "dropping datagram for another node");
            continue;
        }
        let kind = match frame::frame_kind(pdu) {
            Ok(kind) => kind,
            Err(e) => {
                debug!(%from, %src, error = %e, "dropping malformed PDU");
                continue;
            }
        };

        trace!(%from, %src, ?kind, len = pdu.len(), "PDU received");
        inbox.deliver(&registry, kind, ReceivedPdu::new(src, pdu));
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    async fn wait_for(registry: &EventRegistry, event: Event) {
        tokio::time::timeout(WAIT, async {
            while !registry.check(event) {
                registry.notified().await;
            }
        })
        .await
        .expect("event not raised in time");
    }

    async fn pair() -> (UdpLink, Arc<EventRegistry>, UdpLink, Arc<EventRegistry>) {
        let a_registry = Arc::new(EventRegistry::new());
        let b_registry = Arc::new(EventRegistry::new());
        let mut a = UdpLink::bind(
            NodeId(1),
            "127.0.0.1:0".parse().unwrap(),
            AddressBook::new(),
            a_registry.clone(),
        )
        .await
        .unwrap();
        let mut b = UdpLink::bind(
            NodeId(2),
            "127.0.0.1:0".parse().unwrap(),
            AddressBook::new(),
            b_registry.clone(),
        )
        .await
        .unwrap();
        a.add_route(NodeId(2), b.local_addr().unwrap());
        b.add_route(NodeId(1), a.local_addr().unwrap());
        (a, a_registry, b, b_registry)
    }

    #[test]
    fn test_datagram_header() {
        let datagram = encode_datagram(NodeId(3), NodeId(4), &frame::encode_ack(9));
        assert_eq!(hex::encode(&datagram), "03040109");
        let (src, dest, pdu) = decode_datagram(&datagram).unwrap();
        assert_eq!((src, dest), (NodeId(3), NodeId(4)));
        assert_eq!(pdu, &frame::encode_ack(9));
        assert!(decode_datagram(&[3]).is_none());
    }

    #[test]
    fn test_address_book() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let book = AddressBook::new().with_route(NodeId(1), addr);
        assert_eq!(book.resolve(NodeId(1)).unwrap(), addr);
        assert!(matches!(
            book.resolve(NodeId(2)),
            Err(ArqError::UnknownNode(NodeId(2)))
        ));
    }

    #[tokio::test]
    async fn test_data_send_and_receive() {
        let (mut a, a_registry, b, b_registry) = pair().await;

        let pdu = frame::encode_data(0, b"hello");
        a.send(&pdu, NodeId(2), PduKind::Data).unwrap();

        wait_for(&a_registry, Event::DataTxDone).await;
        wait_for(&b_registry, Event::DataReceived).await;
        assert!(!a_registry.check(Event::AckTxDone));

        let received = b.received_data().unwrap();
        assert_eq!(received.src, NodeId(1));
        assert_eq!(received.bytes, pdu);
    }

    #[tokio::test]
    async fn test_ack_send_and_receive() {
        let (a, a_registry, mut b, b_registry) = pair().await;

        b.send(&frame::encode_ack(4), NodeId(1), PduKind::Ack).unwrap();

        wait_for(&b_registry, Event::AckTxDone).await;
        wait_for(&a_registry, Event::AckReceived).await;
        assert_eq!(frame::decode_seq(&a.received_ack().unwrap().bytes).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let (mut a, a_registry, _b, _) = pair().await;
        let err = a.send(&frame::encode_ack(0), NodeId(9), PduKind::Ack).unwrap_err();
        assert!(matches!(err, ArqError::UnknownNode(NodeId(9))));
        assert!(a_registry.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_destination_ignored() {
        let (a, _, b, b_registry) = pair().await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let foreign = encode_datagram(NodeId(1), NodeId(7), &frame::encode_data(0, b"x"));
        let ours = encode_datagram(NodeId(1), NodeId(2), &frame::encode_ack(1));
        let b_addr = b.local_addr().unwrap();
        sender.send_to(&foreign, b_addr).await.unwrap();
        sender.send_to(&ours, b_addr).await.unwrap();

        wait_for(&b_registry, Event::AckReceived).await;
        assert!(!b_registry.check(Event::DataReceived));
        drop(a);
    }
}
