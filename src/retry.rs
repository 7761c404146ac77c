//! Keeps the printer connected: retries failed attempts forever with a fixed
//! backoff and reconnects after link loss.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::connector::ConnectionState;
use crate::encoder;
use crate::radio::RadioCapability;
use crate::session::SharedSession;

async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = sleep(duration) => false,
    }
}

pub struct RetryScheduler<R: RadioCapability> {
    session: SharedSession<R>,
    backoff: Duration,
    token: CancellationToken,
}

impl<R: RadioCapability> RetryScheduler<R> {
    pub fn new(session: SharedSession<R>, backoff: Duration) -> Self {
        Self {
            session,
            backoff,
            token: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the loop at its next await point.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let connector = self.session.connector();
        let mut state = connector.watch_state();

        loop {
            log::info!(target: "retry", "Attempting to connect to the printer...");
            let connected = tokio::select! {
                _ = self.token.cancelled() => {
                    // release the scan or half-open link of the abandoned attempt
                    connector.disconnect().await;
                    break;
                }
                res = connector.connect() => res,
            };

            match connected {
                Ok(()) => {
                    log::info!(target: "retry", "Successfully connected to the printer.");
                    match self.session.write(&encoder::startup_sequence()).await {
                        Ok(()) => log::info!(target: "retry", "Startup message printed."),
                        Err(e) => log::warn!(target: "retry", "startup message failed: {}", e),
                    }

                    // a lost link counts as a failed attempt
                    let closed = tokio::select! {
                        _ = self.token.cancelled() => break,
                        res = state.wait_for(|s| *s != ConnectionState::Ready) => res.is_err(),
                    };
                    if closed {
                        break;
                    }
                    log::warn!(target: "retry", "Printer link lost.");
                }
                Err(e) => {
                    log::error!(target: "retry", "Failed to connect to the printer: {}", e);
                }
            }

            log::info!(target: "retry", "Retrying in {} seconds...", self.backoff.as_secs());
            if sleep_or_cancel(&self.token, self.backoff).await {
                break;
            }
        }

        log::info!(target: "retry", "Printer retry loop stopped");
    }
}
