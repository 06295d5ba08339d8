//! Connection Handler (C6, §4.6).
//!
//! One blocking read loop per accepted socket, running on a pool worker
//! thread. Drives a [`FrameParser`] and dispatches each recognized frame;
//! any invalid frame, a `terminate` line, EOF, or a read error ends the
//! connection.

use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::frame::{FrameEvent, FrameParser};
use crate::journal::JournalProducer;

const READ_BUFFER_SIZE: usize = 4096;

/// Services one connection until it closes, is rejected, or the server
/// begins a global shutdown (`shutdown_flag`). Forcing `stream` to
/// shutdown from elsewhere (C8) unblocks a read in progress.
pub fn handle_connection(
    mut stream: TcpStream,
    producer: &JournalProducer,
    shutdown_flag: &Arc<AtomicBool>,
) {
    let peer = stream.peer_addr().ok();
    let mut parser = FrameParser::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                debug!(?peer, "connection closed by peer");
                return;
            }
            Ok(n) => n,
            Err(err) => {
                if shutdown_flag.load(Ordering::Acquire) {
                    debug!(?peer, "read interrupted by shutdown");
                } else {
                    warn!(?peer, %err, "connection read error");
                }
                return;
            }
        };

        let mut write_failed = false;
        let halted = parser.feed(&buf[..n], |event| match event {
            FrameEvent::ValidDigits(frame) => {
                if write_failed {
                    return;
                }
                if let Err(err) = producer.write(frame) {
                    warn!(?peer, %err, "dropping connection: journal pipeline rejected frame");
                    write_failed = true;
                }
            }
            FrameEvent::Terminate => {
                debug!(?peer, "terminate received, stopping server");
                shutdown_flag.store(true, Ordering::Release);
            }
            FrameEvent::InvalidFrame => {
                warn!(?peer, "invalid frame, closing connection");
            }
        });

        if write_failed || halted {
            return;
        }
    }
}
