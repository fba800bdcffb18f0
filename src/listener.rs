//! The completion listener (C3, spec §4.3): one thread per `Connection`,
//! blocking on the socket read. Stamps completion times and hands the
//! connection back to the pool (or retires it) when a flow's response
//! finishes arriving.

use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;

use log::{debug, warn};

use crate::pool::{ConnHandle, Pool};
use crate::timing::{Clock, TimingTables};
use crate::wire::FlowHeader;

/// Runs until the connection is retired, either by a terminator flow or an
/// I/O error. Meant to be the body of a dedicated `std::thread`.
pub fn run(pool: Arc<Pool>, handle: ConnHandle, mut read_half: TcpStream, timing: Arc<TimingTables>, clock: Arc<Clock>) {
    let mut scratch = Vec::new();

    loop {
        let header = match FlowHeader::read_from(&mut read_half) {
            Ok(h) => h,
            Err(e) => {
                warn!("{}: error reading flow header: {e}", pool.server.addr);
                pool.retire(handle);
                return;
            }
        };

        if scratch.len() < header.flow_size as usize {
            scratch.resize(header.flow_size as usize, 0);
        }
        if let Err(e) = read_half.read_exact(&mut scratch[..header.flow_size as usize]) {
            warn!("{}: error reading flow body: {e}", pool.server.addr);
            pool.retire(handle);
            return;
        }

        if header.is_terminator() {
            debug!("{}: received terminator, retiring connection", pool.server.addr);
            pool.retire(handle);
            return;
        }

        let now = clock.now_us();
        timing.mark_flow_stop(header.flow_id, now);
        let request_index = timing.request_of(header.flow_id);
        timing.mark_req_stop(request_index, now);
        pool.release(handle);
    }
}
