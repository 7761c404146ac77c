use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use super::{RadioCapability, RadioEvent, RadioState, ScanFilter};
use crate::error::RadioError;

/// [`RadioCapability`] backed by the first adapter btleplug finds.
#[derive(Clone)]
pub struct BtleRadio {
    adapter: Adapter,
}

async fn get_central(manager: &Manager) -> Result<Adapter, RadioError> {
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(RadioError::NoAdapter)
}

impl BtleRadio {
    pub async fn new() -> Result<Self, RadioError> {
        let manager = Manager::new().await?;
        let adapter = get_central(&manager).await?;

        if let Ok(info) = adapter.adapter_info().await {
            log::info!(target: "radio", "using bluetooth adapter {}", info);
        }

        Ok(Self { adapter })
    }
}

#[async_trait]
impl RadioCapability for BtleRadio {
    type Peripheral = Peripheral;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn subscribe(&self) -> Result<BoxStream<'static, RadioEvent<Peripheral>>, RadioError> {
        let events = self.adapter.events().await?;
        let adapter = self.adapter.clone();

        let events = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let peripheral = adapter.peripheral(&id).await.ok()?;
                        let address = peripheral.address().to_string();
                        Some(RadioEvent::Discovered {
                            peripheral,
                            address,
                        })
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let peripheral = adapter.peripheral(&id).await.ok()?;
                        Some(RadioEvent::Disconnected {
                            address: peripheral.address().to_string(),
                        })
                    }
                    _ => None,
                }
            }
        });

        // btleplug only hands out adapters that are up
        let powered = stream::once(async { RadioEvent::StateChange(RadioState::PoweredOn) });

        Ok(powered.chain(events).boxed())
    }

    async fn scan(&self, filter: ScanFilter, allow_duplicates: bool) -> Result<(), RadioError> {
        log::debug!(
            target: "radio",
            "start scan (services: {:?}, duplicates: {})",
            filter.services,
            allow_duplicates
        );
        // btleplug reports every advertisement as DeviceUpdated, so duplicates are always on
        self.adapter
            .start_scan(btleplug::api::ScanFilter {
                services: filter.services,
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), RadioError> {
        peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self, peripheral: &Peripheral) -> Result<(), RadioError> {
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(
        &self,
        peripheral: &Peripheral,
        services: &[Uuid],
    ) -> Result<Vec<Service>, RadioError> {
        peripheral.discover_services().await?;

        Ok(peripheral
            .services()
            .into_iter()
            .filter(|s| services.is_empty() || services.contains(&s.uuid))
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: &Service,
        filter: &[Uuid],
    ) -> Result<Vec<Characteristic>, RadioError> {
        Ok(service
            .characteristics
            .iter()
            .filter(|c| filter.is_empty() || filter.contains(&c.uuid))
            .cloned()
            .collect())
    }

    async fn write(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        bytes: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError> {
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(characteristic, bytes, write_type).await?;
        Ok(())
    }
}
