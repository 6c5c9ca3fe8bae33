// Transport module - Moves assembled frames to the LED controller, either
// over a spidev device node or as UDP datagrams for bench testing
use anyhow::{anyhow, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::UdpSocket;

pub trait Transport {
    // Pushes one whole frame; an error fails the current capture cycle
    fn transfer(&mut self, buffer: &[u8]) -> Result<()>;
}

// Writes frames to a kernel spidev node (e.g. /dev/spidev0.0). The bus
// clocking parameters are configured out of band; a plain write is a full
// transfer at the device's configured speed.
pub struct SpiDevTransport {
    device: File,
    path: String,
}

impl SpiDevTransport {
    pub fn open(path: &str) -> Result<Self> {
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| anyhow!("Failed to open SPI device {}: {}", path, e))?;
        Ok(SpiDevTransport {
            device,
            path: path.to_string(),
        })
    }
}

impl Transport for SpiDevTransport {
    fn transfer(&mut self, buffer: &[u8]) -> Result<()> {
        self.device
            .write_all(buffer)
            .map_err(|e| anyhow!("SPI transfer to {} failed: {}", self.path, e))?;
        Ok(())
    }
}

// Sends each frame as a single datagram; used when developing against a
// listener instead of the suit hardware
pub struct UdpTransport {
    socket: UdpSocket,
    destination: String,
}

impl UdpTransport {
    pub fn connect(destination: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(UdpTransport {
            socket,
            destination: destination.to_string(),
        })
    }
}

impl Transport for UdpTransport {
    fn transfer(&mut self, buffer: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send_to(buffer, &self.destination)
            .map_err(|e| anyhow!("UDP transfer to {} failed: {}", self.destination, e))?;
        if sent != buffer.len() {
            return Err(anyhow!(
                "UDP transfer truncated: sent {} of {} bytes",
                sent,
                buffer.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spi_open_missing_device_fails() {
        assert!(SpiDevTransport::open("/dev/does-not-exist-spidev").is_err());
    }

    #[test]
    fn test_udp_transfer_round_trip() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let destination = receiver.local_addr().unwrap().to_string();
        let mut transport = UdpTransport::connect(&destination).unwrap();

        transport.transfer(&[0x80, 0x00, 1, 2, 3]).unwrap();

        let mut buffer = [0u8; 16];
        let (received, _) = receiver.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..received], &[0x80, 0x00, 1, 2, 3]);
    }
}
