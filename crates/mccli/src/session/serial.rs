//! Serial transport.
//!
//! `serialport` is blocking, so the port is driven by two plain threads:
//! one reads with a short timeout and forwards chunks, the other drains the
//! outbound queue. Both stop once the session side of their channel is gone.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::LinkChannels;
use crate::error::SessionResult;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Open `path` at `baud` (8N1) and start the bridge threads.
pub fn open(path: &str, baud: u32) -> SessionResult<LinkChannels> {
    let mut port = serialport::new(path, baud)
        .timeout(READ_TIMEOUT)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()?;
    // ESP32 boards reset unless DTR/RTS are asserted
    let _ = port.write_data_terminal_ready(true);
    let _ = port.write_request_to_send(true);
    let mut writer = port.try_clone()?;
    debug!(path, baud, "serial port open");

    let (rx_sender, inbound) = mpsc::channel::<Vec<u8>>(256);
    let (outbound, mut tx_receiver) = mpsc::channel::<Vec<u8>>(256);

    thread::Builder::new()
        .name("serial-rx".into())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            loop {
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        if rx_sender.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                        if rx_sender.is_closed() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("serial read error: {}", e);
                        break;
                    }
                }
            }
            debug!("serial reader stopped");
        })?;

    thread::Builder::new()
        .name("serial-tx".into())
        .spawn(move || {
            while let Some(data) = tx_receiver.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    warn!("serial write error: {}", e);
                    break;
                }
            }
            debug!("serial writer stopped");
        })?;

    Ok(LinkChannels { inbound, outbound })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[test]
    fn test_missing_port_is_a_serial_error() {
        match open("/dev/mccli-does-not-exist", 115_200) {
            Err(SessionError::Serial(_)) | Err(SessionError::Io(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("port should not open"),
        }
    }
}
