//! The per-server connection pool (C2, spec §4.2 `ConnectionList`).
//!
//! A `Pool` is a mutex-guarded, append-only vector of `ConnNode`s standing in
//! for the original's singly-linked list: the dispatcher only ever appends
//! (`insert`), and listeners only ever flip a node's `busy`/`connected` flags
//! and bump the counters, all while holding the pool's lock. Node identity
//! is a stable `usize` index rather than a pointer, since the vector is
//! append-only and indices never move.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Mutex;

use socket2::Socket;

use crate::error::Error;

/// One backend the dispatcher can fan a request out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    pub addr: SocketAddr,
}

impl ServerEndpoint {
    pub fn new(addr: SocketAddr) -> ServerEndpoint {
        ServerEndpoint { addr }
    }
}

/// A leased or leasable connection slot. The read half of the socket is
/// handed to a listener thread at insert time and isn't kept here;
/// `write_sock` is what the dispatcher writes flow descriptors to, and is
/// reused across every flow the connection ever carries.
struct ConnNode {
    write_sock: Socket,
    connected: bool,
    busy: bool,
}

struct PoolState {
    nodes: Vec<ConnNode>,
    available_len: usize,
    flow_finished: u64,
}

impl PoolState {
    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// An opaque handle to a leased connection, returned by `lease` and handed
/// back to `release`/`retire`. Carries no lock; the lease itself is what
/// makes it safe for the dispatcher to use the node exclusively.
#[derive(Debug, Clone, Copy)]
pub struct ConnHandle(usize);

impl ConnHandle {
    /// Wraps the index `insert` handed back for a newly opened node, so the
    /// caller can spawn that node's listener thread.
    pub(crate) fn from_index(index: usize) -> ConnHandle {
        ConnHandle(index)
    }
}

pub struct Pool {
    pub server: ServerEndpoint,
    state: Mutex<PoolState>,
}

impl Pool {
    /// `Init(list, server_id, addr, port)`: an empty pool with its counters
    /// zeroed and its mutex created.
    pub fn new(server: ServerEndpoint) -> Pool {
        Pool {
            server,
            state: Mutex::new(PoolState {
                nodes: Vec::new(),
                available_len: 0,
                flow_finished: 0,
            }),
        }
    }

    /// `Insert(list, n)`: atomically extends the pool by `n` connections.
    /// Returns the new nodes' indices (in insertion order) so the caller can
    /// spawn a listener on each one, along with the owned read half of each
    /// socket to hand to that listener thread.
    ///
    /// On partial failure, any connections already opened in this call are
    /// dropped (which closes their sockets) and the pool's counters are left
    /// unchanged, as if `insert` had never been called.
    pub fn insert(&self, n: usize) -> Result<Vec<(usize, TcpStream)>, Error> {
        let mut opened: Vec<(TcpStream, Socket)> = Vec::with_capacity(n);
        for _ in 0..n {
            match self.connect_one() {
                Ok(pair) => opened.push(pair),
                Err(e) => {
                    // Partial failure: everything opened in `opened` is
                    // dropped here, closing those sockets, and nothing is
                    // appended to the pool.
                    return Err(Error::Resource(format!(
                        "connecting to {}: {e}",
                        self.server.addr
                    )));
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        let start_index = state.len();
        let mut new_indices = Vec::with_capacity(n);
        let mut handed_to_caller = Vec::with_capacity(n);
        for (read_half, write_sock) in opened {
            let index = state.len();
            state.nodes.push(ConnNode {
                write_sock,
                connected: true,
                busy: false,
            });
            new_indices.push(index);
            handed_to_caller.push((index, read_half));
        }
        state.available_len += n;
        debug_assert_eq!(state.len(), start_index + n);
        Ok(handed_to_caller)
    }

    fn connect_one(&self) -> io::Result<(TcpStream, Socket)> {
        let stream = TcpStream::connect(self.server.addr)?;
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;
        let write_sock = Socket::from(stream);
        Ok((read_half, write_sock))
    }

    /// `Lease(list, n)`: selects the first `n` nodes in insertion order with
    /// `connected && !busy`, flips `busy = true`, and returns their handles.
    /// Fails (returning `None`) if fewer than `n` are available; on failure
    /// no node's state is touched.
    pub fn lease(&self, n: usize) -> Option<Vec<ConnHandle>> {
        let mut state = self.state.lock().unwrap();
        if state.available_len < n {
            return None;
        }

        let mut handles = Vec::with_capacity(n);
        for (index, node) in state.nodes.iter_mut().enumerate() {
            if handles.len() == n {
                break;
            }
            if node.connected && !node.busy {
                node.busy = true;
                handles.push(ConnHandle(index));
            }
        }
        debug_assert_eq!(handles.len(), n);
        state.available_len -= n;
        Some(handles)
    }

    /// Writes a flow descriptor to a leased connection, first setting the
    /// outgoing DS byte to `header.flow_tos`. Flow rate is transmitted but
    /// never enforced client-side (the server honors it).
    ///
    /// The lock is held only long enough to duplicate the node's socket;
    /// `set_tos` and the actual write happen on that duplicate after the
    /// guard is dropped, so one flow thread's blocking write can never
    /// stall another connection's `lease`/`release`/`retire` on the same
    /// pool.
    pub fn send_descriptor(&self, handle: ConnHandle, header: &crate::wire::FlowHeader) -> io::Result<()> {
        let mut sock = {
            let state = self.state.lock().unwrap();
            state.nodes[handle.0].write_sock.try_clone()?
        };
        sock.set_tos(header.flow_tos)?;
        sock.write_all(&header.to_bytes())
    }

    /// `Release(node)`: called by the listener on a non-terminator flow's
    /// completion. Marks the node idle again and bumps the finished count.
    pub fn release(&self, handle: ConnHandle) {
        let mut state = self.state.lock().unwrap();
        let node = &mut state.nodes[handle.0];
        node.busy = false;
        state.available_len += 1;
        state.flow_finished += 1;
    }

    /// `Retire(node)`: called by the listener on the terminator flow (or a
    /// fatal I/O error). The connection is gone for good; `available_len` is
    /// *not* incremented, since there's nothing left to lease.
    pub fn retire(&self, handle: ConnHandle) {
        let mut state = self.state.lock().unwrap();
        let node = &mut state.nodes[handle.0];
        node.connected = false;
        node.busy = false;
    }

    /// Number of idle, connected nodes right now. A hint for the dispatcher
    /// to decide whether it needs to grow the pool before leasing; `lease`
    /// remains the authority on whether enough connections actually exist.
    pub fn available_len(&self) -> usize {
        self.state.lock().unwrap().available_len
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flow_finished(&self) -> u64 {
        self.state.lock().unwrap().flow_finished
    }

    /// Every node that is still connected, for sending terminator flows at
    /// shutdown (spec §4.5's termination step).
    pub fn connected_handles(&self) -> Vec<ConnHandle> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.connected)
            .map(|(i, _)| ConnHandle(i))
            .collect()
    }

    /// Invariant check used by tests: `available_len` equals the number of
    /// connected-and-idle nodes, and `len` equals the total node count.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        let state = self.state.lock().unwrap();
        let actually_available = state.nodes.iter().filter(|n| n.connected && !n.busy).count();
        assert_eq!(state.available_len, actually_available);
    }
}
