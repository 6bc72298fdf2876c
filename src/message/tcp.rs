use std::collections::hash_map::{Entry, HashMap};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::backoff::{ExponentialBackoff, Retry};
use super::comm::{check_rank, Communicator, Envelope};
use super::mailbox::Mailbox;
use super::util;
use crate::error::{Error, Result};

const CXN_W_TIMEOUT_MS: Duration = Duration::from_millis(250);
const RETRY_WAIT_MS: Duration = Duration::from_millis(250);
const RETRY_MAX_WAIT_MS: Duration = Duration::from_millis(5000);
const CONNECT_ATTEMPTS: usize = 20;

type Outbound = crossbeam_channel::Sender<(usize, Envelope)>;
type Inbound = crossbeam_channel::Sender<Envelope>;

/// A bound listener that has not yet joined a group. Binding first lets
/// every rank learn its address (port 0 is allowed) before the peer table
/// is assembled.
pub struct Endpoint {
    listener: TcpListener,
}

impl Endpoint {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Join the group described by `peers` as `rank`. This starts the
    /// listener thread and the serial sender thread; connections to peers
    /// are opened lazily on first send.
    pub fn connect(self, rank: usize, peers: Vec<SocketAddr>) -> Result<TcpCommunicator> {
        check_rank(rank, peers.len())?;
        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let (send_sink, send_src) = crossbeam_channel::unbounded();

        start_listener(self.listener, recv_sink.clone());
        start_serial_sender(peers.clone(), send_src);

        Ok(TcpCommunicator {
            rank,
            peers,
            context: 0,
            name: "world".to_string(),
            send_sink,
            recv_sink,
            mailbox: Mailbox::new(recv_src),
        })
    }
}

/// Delivers queued messages one at a time. The first failed delivery stops
/// the thread, after which `post` to any peer reports the peer as
/// disconnected. A frame is never written twice.
fn start_serial_sender(
    peers: Vec<SocketAddr>,
    send_src: crossbeam_channel::Receiver<(usize, Envelope)>,
) {
    thread::spawn(move || {
        let mut table: HashMap<usize, TcpStream> = HashMap::new();

        for (rank, envelope) in send_src {
            if let Err(e) = deliver(&mut table, &peers, rank, &envelope) {
                error!("Failed to deliver message to {}: {}, sender stopping", peers[rank], e);
                return;
            }
        }
        info!("Outbound channel closed, sender shutting down")
    });
}

fn deliver(
    table: &mut HashMap<usize, TcpStream>,
    peers: &[SocketAddr],
    rank: usize,
    envelope: &Envelope,
) -> Result<()> {
    let frame = encode_frame(envelope)?;

    let client = match table.entry(rank) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => entry.insert(connect_with_retry(peers[rank])?),
    };
    Ok(util::write_frame_acked(client, &frame)?)
}

fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    ciborium::ser::into_writer(envelope, &mut frame).map_err(|e| Error::Frame(e.to_string()))?;
    Ok(frame)
}

fn decode_frame(bytes: &[u8]) -> Result<Envelope> {
    ciborium::de::from_reader(bytes).map_err(|e| Error::Frame(e.to_string()))
}

fn start_listener(listener: TcpListener, recv_sink: Inbound) {
    thread::spawn(move || {
        match listener.local_addr() {
            Ok(addr) => info!("Listening to: {}", addr),
            Err(e) => warn!("Listening on an unknown address: {}", e),
        }
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    handle_connection(stream, recv_sink.clone());
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    });
}

/// Read one frame, pass it on, and acknowledge it with its size.
fn receive_frame(stream: &mut TcpStream, recv_sink: &Inbound) -> Result<()> {
    let size = util::read_usize(stream)?;
    let bytes = util::read_bytes_vec(stream, size)?;
    recv_sink
        .send(decode_frame(&bytes)?)
        .map_err(|_| Error::InboxClosed)?;
    Ok(io::Write::write_all(stream, &size.to_le_bytes())?)
}

fn handle_connection(mut stream: TcpStream, recv_sink: Inbound) {
    let remote = stream.peer_addr().ok();
    info!("Receiving connection from {:?}", remote);

    thread::spawn(move || loop {
        match receive_frame(&mut stream, &recv_sink) {
            Ok(()) => (),
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Connection from {:?} closed", remote);
                break;
            }
            Err(e) => {
                error!("Connection from {:?} failed: {}", remote, e);
                break;
            }
        }
    });
}

fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut with_retries =
        ExponentialBackoff::new(RETRY_WAIT_MS, RETRY_MAX_WAIT_MS, 2).take(CONNECT_ATTEMPTS);

    let stream = with_retries
        .retry(
            || TcpStream::connect(addr),
            |e, delay| {
                warn!("Connect to {} failed: {}, retrying in {:?}", addr, e, delay);
                thread::sleep(delay)
            },
        )
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "no connection attempts")))?;

    stream.set_write_timeout(Some(CXN_W_TIMEOUT_MS))?;
    Ok(stream)
}

/////////////////////////////////////////////////////
/////////////////////////////////////////////////////
/////////////////////////////////////////////////////
/////////////////////////////////////////////////////

/// A rank of a process group whose members talk over TCP. Messages to
/// other ranks are queued to a background sender thread, so `post` never
/// blocks; messages to self bypass the socket.
pub struct TcpCommunicator {
    rank: usize,
    peers: Vec<SocketAddr>,
    context: u64,
    name: String,
    send_sink: Outbound,
    recv_sink: Inbound,
    mailbox: Mailbox,
}

impl TcpCommunicator {
    /// Rename the group, and give it a context number to tell it apart from
    /// other groups over the same peers.
    pub fn with_identity(mut self, name: &str, context: u64) -> Self {
        self.name = name.to_string();
        self.context = context;
        self
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> u64 {
        self.context
    }

    fn members(&self) -> Vec<String> {
        self.peers.iter().map(SocketAddr::to_string).collect()
    }

    fn post(&self, rank: usize, envelope: Envelope) -> Result<()> {
        check_rank(rank, self.size())?;
        if rank == self.rank {
            self.recv_sink
                .send(envelope)
                .map_err(|_| Error::Disconnected(rank))
        } else {
            self.send_sink
                .send((rank, envelope))
                .map_err(|_| Error::Disconnected(rank))
        }
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}
