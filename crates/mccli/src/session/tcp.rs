//! TCP transport to a companion bridge.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::LinkChannels;
use crate::error::SessionResult;

/// Connect to `host:port` and pump bytes between the socket and the
/// returned channels until either side closes.
pub async fn connect(host: &str, port: u16) -> SessionResult<LinkChannels> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    debug!(host, port, "tcp connected");

    let (rx_sender, inbound) = mpsc::channel::<Vec<u8>>(256);
    let (outbound, mut tx_receiver) = mpsc::channel::<Vec<u8>>(256);

    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, &mut tx_receiver, &rx_sender).await {
            warn!("tcp link error: {}", e);
        }
        debug!("tcp link closed");
    });

    Ok(LinkChannels { inbound, outbound })
}

/// Forward socket reads to `rx_sender` and queued writes to the socket.
async fn handle_connection(
    mut stream: TcpStream,
    tx_receiver: &mut mpsc::Receiver<Vec<u8>>,
    rx_sender: &mpsc::Sender<Vec<u8>>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                match result? {
                    0 => return Ok(()),
                    n => {
                        if rx_sender.send(read_buf[..n].to_vec()).await.is_err() {
                            // Session dropped
                            return Ok(());
                        }
                    }
                }
            }

            queued = tx_receiver.recv() => {
                let Some(data) = queued else {
                    return Ok(());
                };
                writer.write_all(&data).await?;
                writer.flush().await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_link_moves_bytes_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            socket.write_all(b"pong").await.unwrap();
        });

        let mut link = connect("127.0.0.1", port).await.unwrap();
        link.outbound.send(b"ping".to_vec()).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 4 {
            received.extend(link.inbound.recv().await.unwrap());
        }
        assert_eq!(received, b"pong");
        bridge.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(connect("127.0.0.1", port).await.is_err());
    }
}
