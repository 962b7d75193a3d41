//! Transmitter module - the radio broadcast seam
//!
//! The core only needs fire-and-forget broadcast. [`UdpRadio`] stands in for
//! ESP-NOW on a LAN by sending datagrams to a broadcast address; an
//! unbounded mpsc sender is also a radio, which is what in-process meshes and
//! tests use.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::{Result, SuraxitError};
use crate::MAX_FRAME_SIZE;

/// Best-effort broadcast primitive. No delivery confirmation, no blocking.
pub trait Radio: Send {
    fn broadcast(&self, frame: &[u8]) -> Result<usize>;
}

/// Reject frames the radio cannot carry
pub fn check_frame_size(frame: &[u8]) -> Result<()> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(SuraxitError::FrameTooLarge {
            size: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// UDP broadcast radio
#[derive(Debug, Clone)]
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl UdpRadio {
    /// Bind a broadcast-enabled socket; frames go to `target`
    pub async fn bind(bind_addr: SocketAddr, target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        info!(local = %socket.local_addr()?, %target, "udp radio bound");
        Ok(Self {
            socket: Arc::new(socket),
            target,
        })
    }

    /// Shared socket for the receive pump
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Radio for UdpRadio {
    fn broadcast(&self, frame: &[u8]) -> Result<usize> {
        check_frame_size(frame)?;
        Ok(self.socket.try_send_to(frame, self.target)?)
    }
}

impl Radio for mpsc::UnboundedSender<Vec<u8>> {
    fn broadcast(&self, frame: &[u8]) -> Result<usize> {
        check_frame_size(frame)?;
        self.send(frame.to_vec())
            .map_err(|_| SuraxitError::ChannelClosed)?;
        Ok(frame.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_limit() {
        assert!(check_frame_size(&[0u8; MAX_FRAME_SIZE]).is_ok());
        assert!(matches!(
            check_frame_size(&[0u8; MAX_FRAME_SIZE + 1]),
            Err(SuraxitError::FrameTooLarge { size: 251, max: 250 })
        ));
    }

    #[test]
    fn test_channel_radio() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(tx.broadcast(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);

        drop(rx);
        assert!(matches!(tx.broadcast(&[1]), Err(SuraxitError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_udp_radio_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();
        let radio = UdpRadio::bind("127.0.0.1:0".parse().unwrap(), target)
            .await
            .unwrap();

        radio.broadcast(&[0x03; 15]).unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 15);
        assert_eq!(from, radio.local_addr().unwrap());
        assert_eq!(&buf[..len], &[0x03; 15]);
    }
}
