#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use sosh_driver::console::Console;
use sosh_driver::driver::{Driver, DriverError};
use sosh_driver::session::Session;
use sosh_driver::transport::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A running driver on loopback plus a fake remote shell talking to it.
pub struct Harness {
    /// Plays the remote shell.
    pub peer: UdpSocket,
    pub driver_addr: SocketAddr,
    /// Write end of the driver's console.
    pub console: DuplexStream,
    /// Read end of the driver's mirrored output.
    pub output: DuplexStream,
    pub shutdown: CancellationToken,
    handle: JoinHandle<Result<Session, DriverError>>,
}

/// Start a driver for `session` on an ephemeral loopback port.
pub async fn start(session: Session) -> Harness {
    let transport = Transport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");
    let driver_addr = transport.local_addr();

    let (console, console_rx) = tokio::io::duplex(4096);
    let (output_tx, output) = tokio::io::duplex(64 * 1024);
    let driver = Driver::new(
        transport,
        Console::new(BufReader::new(console_rx)),
        output_tx,
        session,
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));
    let peer = UdpSocket::bind("127.0.0.1:0").await.expect("bind peer");

    Harness {
        peer,
        driver_addr,
        console,
        output,
        shutdown,
        handle,
    }
}

impl Harness {
    /// Send a datagram from the fake remote.
    pub async fn send(&self, payload: &[u8]) {
        self.peer
            .send_to(payload, self.driver_addr)
            .await
            .expect("peer send");
    }

    /// Next datagram the driver sent to the fake remote.
    pub async fn recv(&self) -> String {
        let mut buf = vec![0u8; 65_535];
        let (n, from) = tokio::time::timeout(RECV_TIMEOUT, self.peer.recv_from(&mut buf))
            .await
            .expect("timed out waiting for driver")
            .expect("peer recv");
        assert_eq!(from, self.driver_addr);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    /// Collect `n` datagrams.
    pub async fn recv_n(&self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.recv().await);
        }
        out
    }

    /// Assert nothing arrives for `wait`.
    pub async fn expect_silence(&self, wait: Duration) {
        let mut buf = vec![0u8; 65_535];
        if let Ok(Ok((n, _))) = tokio::time::timeout(wait, self.peer.recv_from(&mut buf)).await {
            panic!(
                "expected silence, got {:?}",
                String::from_utf8_lossy(&buf[..n])
            );
        }
    }

    /// Type a line on the driver's console.
    pub async fn type_line(&mut self, line: &str) {
        self.console
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("console write");
    }

    /// Write raw bytes to the driver's console.
    pub async fn type_raw(&mut self, bytes: &[u8]) {
        self.console.write_all(bytes).await.expect("console write");
    }

    /// Read exactly `len` bytes of mirrored output.
    pub async fn read_output(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(RECV_TIMEOUT, self.output.read_exact(&mut buf))
            .await
            .expect("timed out waiting for mirrored output")
            .expect("output read");
        buf
    }

    /// Give the driver a moment to work through queued events.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// Stop the driver and return its final session.
    pub async fn stop(self) -> Session {
        self.shutdown.cancel();
        tokio::time::timeout(RECV_TIMEOUT, self.handle)
            .await
            .expect("driver did not stop")
            .expect("driver task panicked")
            .expect("driver failed")
    }
}
