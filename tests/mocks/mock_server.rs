//! A minimal peer that honors the wire protocol (spec §6): echoes the
//! 16-byte flow header back verbatim, followed by `flow_size` zero bytes,
//! then either waits for the next flow or (if told to) closes the
//! connection after every Nth flow it serves, to exercise the listener's
//! retire-and-reconnect path.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use incast_gen::wire::{FlowHeader, HEADER_LEN};

/// Starts the listener on an OS-assigned port and returns its address. The
/// accept loop and every connection handler run as detached threads; they
/// exit on their own once every connection they're serving is closed.
pub fn spawn_echo_server(close_every_nth: Option<u32>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().expect("local_addr");
    let served = Arc::new(AtomicU32::new(0));

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let served = served.clone();
            thread::spawn(move || handle_connection(stream, close_every_nth, served));
        }
    });

    addr
}

fn handle_connection(mut stream: TcpStream, close_every_nth: Option<u32>, served: Arc<AtomicU32>) {
    stream.set_nodelay(true).ok();
    loop {
        let mut buf = [0u8; HEADER_LEN];
        if stream.read_exact(&mut buf).is_err() {
            return;
        }
        let header = FlowHeader::from_bytes(&buf);

        if header.is_terminator() {
            let _ = stream.write_all(&FlowHeader::terminator().to_bytes());
            return;
        }

        let response_body = vec![0u8; header.flow_size as usize];
        if header.write_to(&mut stream).is_err() || stream.write_all(&response_body).is_err() {
            return;
        }

        let n = served.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(every) = close_every_nth {
            if every > 0 && n % every == 0 {
                return;
            }
        }
    }
}
