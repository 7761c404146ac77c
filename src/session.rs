//! The print facade handed to the routing layer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::connector::DeviceConnector;
use crate::encoder::{self, Alignment, CommandSequence, PrintJob};
use crate::error::{PrintError, ValidationError};
use crate::radio::RadioCapability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub connected: bool,
}

/// Owns the connector and serializes every write onto its link.
pub struct PrintSession<R: RadioCapability> {
    connector: DeviceConnector<R>,
    // one command sequence on the wire at a time; tokio's mutex is FIFO
    write_lock: Mutex<()>,
}

impl<R: RadioCapability> PrintSession<R> {
    pub fn new(connector: DeviceConnector<R>) -> Self {
        Self {
            connector,
            write_lock: Mutex::new(()),
        }
    }

    pub fn connector(&self) -> &DeviceConnector<R> {
        &self.connector
    }

    pub fn status(&self) -> Status {
        Status {
            connected: self.connector.is_ready(),
        }
    }

    /// Validate and encode `job`, then write it in a single characteristic write.
    pub async fn submit(&self, job: &PrintJob) -> Result<(), PrintError> {
        let commands = encoder::encode(job)?;
        self.write(&commands).await?;
        log::info!(target: "session", "{} printed ({} bytes)", job.kind(), commands.len());
        Ok(())
    }

    pub async fn submit_text(&self, text: &str, align: &str, bold: bool) -> Result<(), PrintError> {
        let alignment: Alignment = align.parse()?;
        self.submit(&PrintJob::text(text, alignment, bold)).await
    }

    pub async fn submit_qr(&self, data: &str, size: u32) -> Result<(), PrintError> {
        self.submit(&PrintJob::qr(data, size)).await
    }

    pub async fn submit_barcode(&self, kind: &str, data: &str) -> Result<(), PrintError> {
        if data.is_empty() {
            return Err(ValidationError::MissingData("Barcode").into());
        }
        self.submit(&PrintJob::barcode(kind, data)?).await
    }

    /// Write an already encoded sequence onto the active link.
    pub async fn write(&self, commands: &CommandSequence) -> Result<(), PrintError> {
        let _guard = self.write_lock.lock().await;

        // checked under the lock so a link lost while queued is noticed
        let link = self.connector.link().ok_or(PrintError::NotConnected)?;
        let bytes = commands.to_bytes();

        log::debug!(target: "session", "writing {} bytes to {}", bytes.len(), link.address);
        self.connector
            .radio()
            .write(&link.peripheral, &link.characteristic, &bytes, true)
            .await
            .map_err(|e| {
                log::error!(target: "session", "write failed: {}", e);
                PrintError::Write(e)
            })
    }
}

pub type SharedSession<R> = Arc<PrintSession<R>>;
