use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::ReceiverConfig;
use crate::sink::Sink;
use crate::wire::Measurement;

/// Largest possible UDP payload; one receive buffer covers any datagram.
const MAX_DATAGRAM_LEN: usize = 65536;

/// Binds the listen port and forwards every decodable datagram to the sink.
/// A malformed datagram is dropped and the loop continues; a socket error is
/// fatal. The socket is released when this returns, so the port can be
/// rebound afterwards.
pub fn run(config: &ReceiverConfig, sink: &mut impl Sink) -> anyhow::Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port))
        .with_context(|| format!("failed to bind udp port {}", config.port))?;
    info!("listening for load datagrams on port {}", config.port);

    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        let (len, peer) = socket
            .recv_from(&mut buf)
            .context("failed to receive datagram")?;
        dispatch(&buf[..len], peer, sink);
    }
}

fn dispatch(payload: &[u8], peer: SocketAddr, sink: &mut impl Sink) {
    match Measurement::decode(payload) {
        Ok(measurement) => sink.accept(&measurement),
        // Best-effort transport: a corrupted datagram is dropped, never
        // allowed to crash or desynchronize the display.
        Err(err) => debug!(%peer, %err, "discarding malformed datagram"),
    }
}
