//! Receiver module - pumps raw radio frames into the node
//!
//! The pump owns nothing but the socket read loop. Oversized datagrams are
//! discarded here; everything else is queued as-is and left to the relay to
//! decode. When the node's queue is full the frame is dropped, which the
//! protocol already tolerates from a lossy radio.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::MAX_FRAME_SIZE;

/// Frames queued between the pump and the node before dropping
pub const RECEIVE_QUEUE_DEPTH: usize = 64;

/// Counters kept by the receive pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub frames: u64,
    pub oversized: u64,
    pub queue_full: u64,
}

/// Hand a datagram to the node queue, updating stats
pub fn enqueue_frame(
    frame: &[u8],
    tx: &mpsc::Sender<Vec<u8>>,
    stats: &mut ReceiveStats,
) -> bool {
    stats.frames += 1;
    if frame.len() > MAX_FRAME_SIZE {
        stats.oversized += 1;
        debug!(len = frame.len(), "discarding oversized datagram");
        return false;
    }
    match tx.try_send(frame.to_vec()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            stats.queue_full += 1;
            trace!("node queue full, frame dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Spawn the UDP read loop; it ends on shutdown or when the node hangs up
pub fn spawn_udp_receiver(
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<ReceiveStats> {
    tokio::spawn(async move {
        let mut stats = ReceiveStats::default();
        // one spare byte so oversized datagrams are detectable
        let mut buf = vec![0u8; MAX_FRAME_SIZE + 1];

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            trace!(%from, len, "datagram");
                            enqueue_frame(&buf[..len], &tx, &mut stats);
                            if tx.is_closed() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "radio receive failed"),
                    }
                }
            }
        }

        debug!(?stats, "receive pump stopped");
        stats
    })
}
