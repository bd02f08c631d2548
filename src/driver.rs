//! The driver loop.
//!
//! One cooperative loop owns the transport, the console and the session.
//! Each iteration waits for whichever comes first of a shutdown request, an
//! inbound datagram or an operator line, and handles exactly that event
//! before waiting again.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::console::{Console, ConsoleInput};
use crate::session::Session;
use crate::transport::Transport;

/// Pause after a wakeup that produced no datagram.
const SPURIOUS_WAKEUP_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to write to operator output: {0}")]
    Output(#[source] io::Error),
}

pub struct Driver<R, W> {
    transport: Transport,
    /// `None` once the operator's input has ended.
    console: Option<Console<R>>,
    /// Where inbound traffic is mirrored for the operator.
    output: W,
    session: Session,
    directive_marker: char,
}

impl<R, W> Driver<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(transport: Transport, console: Console<R>, output: W, session: Session) -> Self {
        Self {
            transport,
            console: Some(console),
            output,
            session,
            directive_marker: '/',
        }
    }

    pub fn with_directive_marker(mut self, marker: char) -> Self {
        self.directive_marker = marker;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until `shutdown` is cancelled, then hand back the session.
    ///
    /// Reaching the target run count does not stop the loop: traffic keeps
    /// being mirrored and console input keeps being forwarded.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<Session, DriverError> {
        tracing::info!(
            addr = %self.transport.local_addr(),
            target_runs = self.session.target_runs(),
            "awaiting remote connection"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping driver");
                    break;
                }
                ready = self.transport.readable() => {
                    match ready {
                        Ok(()) => {
                            self.handle_datagram().await?;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "transport readiness failed");
                            tokio::time::sleep(SPURIOUS_WAKEUP_BACKOFF).await;
                        }
                    }
                }
                line = next_console_line(&mut self.console) => {
                    match line {
                        Ok(Some(line)) => self.handle_console_line(&line).await,
                        Ok(None) => {
                            tracing::warn!("console input closed, continuing without it");
                            self.console = None;
                        }
                        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                            tracing::warn!(error = %e, "ignoring unreadable console line");
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                "console read failed, continuing without it"
                            );
                            self.console = None;
                        }
                    }
                }
            }
        }

        tracing::info!(
            runs = self.session.completed_runs(),
            state = ?self.session.state(),
            "driver stopped"
        );
        Ok(self.session)
    }

    /// Receive one datagram and react to it.
    ///
    /// Returns `false` when the wakeup turned out to be spurious (nothing
    /// queued, an empty payload or a receive error).
    pub async fn handle_datagram(&mut self) -> Result<bool, DriverError> {
        let datagram = match self.transport.try_recv() {
            Ok(Some(d)) if !d.payload.is_empty() => d,
            Ok(_) => {
                tokio::time::sleep(SPURIOUS_WAKEUP_BACKOFF).await;
                return Ok(false);
            }
            Err(e) => {
                // ICMP errors for earlier sends surface here on some platforms.
                tracing::warn!(error = %e, "receive failed");
                tokio::time::sleep(SPURIOUS_WAKEUP_BACKOFF).await;
                return Ok(false);
            }
        };

        self.output
            .write_all(&datagram.payload)
            .await
            .map_err(DriverError::Output)?;
        self.output.flush().await.map_err(DriverError::Output)?;

        let reaction = self.session.on_datagram(&datagram.payload, datagram.sender);
        for command in &reaction.commands {
            tracing::debug!(remote = %datagram.sender, %command, "sending command");
            self.transport.send_line(datagram.sender, command).await;
        }
        if reaction.finished {
            tracing::info!(
                remote = %datagram.sender,
                runs = self.session.completed_runs(),
                "target reached, automated commands stopped"
            );
        }
        Ok(true)
    }

    /// Apply one operator line: a restart directive or text for the remote.
    ///
    /// Forwarded lines go out byte for byte, terminator included.
    pub async fn handle_console_line(&mut self, line: &str) {
        match ConsoleInput::parse(line, self.directive_marker) {
            ConsoleInput::Restart => {
                self.session.restart();
                tracing::info!("session restarted by operator");
            }
            ConsoleInput::Forward(text) => match self.session.remote() {
                Some(remote) => {
                    tracing::debug!(%remote, line = text.trim_end(), "forwarding console line");
                    self.transport.send(remote, text.as_bytes()).await;
                }
                None => {
                    tracing::warn!("remote not connected, dropping console line");
                }
            },
        }
    }
}

/// Next console line, or never if the console is gone.
async fn next_console_line<R: AsyncBufRead + Unpin>(
    console: &mut Option<Console<R>>,
) -> io::Result<Option<String>> {
    match console {
        Some(console) => console.next_line().await,
        None => std::future::pending().await,
    }
}
