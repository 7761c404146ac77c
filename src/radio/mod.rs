//! Abstraction over the wireless stack.
//!
//! The connector only talks to the radio through [`RadioCapability`]:
//! actions are async methods, and everything the stack reports on its own
//! (power state, discoveries, link loss) arrives on the event stream
//! returned by [`RadioCapability::subscribe`]. Dropping that stream is the
//! unsubscribe.

pub mod btle;

use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::RadioError;

pub use btle::BtleRadio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    PoweredOn,
    PoweredOff,
    Unknown,
}

#[derive(Debug, Clone)]
pub enum RadioEvent<P> {
    StateChange(RadioState),
    Discovered { peripheral: P, address: String },
    Disconnected { address: String },
}

/// Which advertisements a scan reports. Empty means a general scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
}

#[async_trait]
pub trait RadioCapability: Send + Sync + 'static {
    type Peripheral: Clone + Debug + Send + Sync + 'static;
    type Service: Clone + Debug + Send + Sync + 'static;
    type Characteristic: Clone + Debug + Send + Sync + 'static;

    /// Start receiving radio events. Each call yields an independent stream.
    async fn subscribe(&self) -> Result<BoxStream<'static, RadioEvent<Self::Peripheral>>, RadioError>;

    async fn scan(&self, filter: ScanFilter, allow_duplicates: bool) -> Result<(), RadioError>;

    async fn stop_scan(&self) -> Result<(), RadioError>;

    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<(), RadioError>;

    async fn disconnect(&self, peripheral: &Self::Peripheral) -> Result<(), RadioError>;

    async fn discover_services(
        &self,
        peripheral: &Self::Peripheral,
        services: &[Uuid],
    ) -> Result<Vec<Self::Service>, RadioError>;

    /// An empty filter returns every characteristic of the service.
    async fn discover_characteristics(
        &self,
        service: &Self::Service,
        filter: &[Uuid],
    ) -> Result<Vec<Self::Characteristic>, RadioError>;

    async fn write(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        bytes: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError>;
}
