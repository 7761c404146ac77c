#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use uuid::Uuid;

use ble_escpos::instruction::PRINTER_SERVICE;
use ble_escpos::{
    ConnectionState, DeviceConnector, DeviceIdentity, PrintSession, RadioCapability, RadioError,
    RadioEvent, RadioState, ScanFilter,
};

pub const PRINTER: &str = "5A:4A:F4:00:0B:BF";
pub const STRANGER: &str = "11:22:33:44:55:66";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePeripheral {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeService {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCharacteristic {
    pub name: &'static str,
}

/// What the radio will answer. Tweak before connecting.
#[derive(Debug, Clone)]
pub struct Script {
    pub powered: bool,
    pub advertise: Vec<String>,
    pub connect_error: Option<RadioError>,
    pub services: Result<Vec<FakeService>, RadioError>,
    pub characteristics: Result<Vec<FakeCharacteristic>, RadioError>,
    pub write_error: Option<RadioError>,
    /// Deliver writes to the wire one byte at a time, yielding in between.
    pub trickle_writes: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            powered: true,
            advertise: vec![STRANGER.to_string(), PRINTER.to_string()],
            connect_error: None,
            services: Ok(vec![FakeService {
                uuid: PRINTER_SERVICE,
            }]),
            characteristics: Ok(vec![
                FakeCharacteristic { name: "write" },
                FakeCharacteristic { name: "notify" },
            ]),
            write_error: None,
            trickle_writes: false,
        }
    }
}

#[derive(Default)]
pub struct FakeRadio {
    pub script: Mutex<Script>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RadioEvent<FakePeripheral>>>>,
    calls: Mutex<Vec<(String, Option<ConnectionState>)>>,
    writes: Mutex<Vec<(FakeCharacteristic, Vec<u8>)>>,
    wire: Mutex<Vec<u8>>,
    probe: Mutex<Option<watch::Receiver<ConnectionState>>>,
}

impl FakeRadio {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Default::default()
        })
    }

    /// Record the connector state alongside every call from now on.
    pub fn probe(&self, state: watch::Receiver<ConnectionState>) {
        *self.probe.lock().unwrap() = Some(state);
    }

    pub fn emit(&self, event: RadioEvent<FakePeripheral>) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    pub fn discover(&self, address: &str) {
        self.emit(RadioEvent::Discovered {
            peripheral: FakePeripheral {
                address: address.to_string(),
            },
            address: address.to_string(),
        });
    }

    pub fn live_subscribers(&self) -> usize {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn calls_with_state(&self) -> Vec<(String, Option<ConnectionState>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().iter().map(|(_, w)| w.clone()).collect()
    }

    pub fn written_to(&self) -> Vec<FakeCharacteristic> {
        self.writes.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn wire(&self) -> Vec<u8> {
        self.wire.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        let state = self.probe.lock().unwrap().as_ref().map(|rx| *rx.borrow());
        self.calls.lock().unwrap().push((call.to_string(), state));
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }
}

#[async_trait]
impl RadioCapability for FakeRadio {
    type Peripheral = FakePeripheral;
    type Service = FakeService;
    type Characteristic = FakeCharacteristic;

    async fn subscribe(
        &self,
    ) -> Result<BoxStream<'static, RadioEvent<FakePeripheral>>, RadioError> {
        self.record("subscribe");
        let (tx, rx) = mpsc::unbounded();
        if self.script().powered {
            let _ = tx.unbounded_send(RadioEvent::StateChange(RadioState::PoweredOn));
        }
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }

    async fn scan(&self, _filter: ScanFilter, _allow_duplicates: bool) -> Result<(), RadioError> {
        self.record("scan");
        for address in self.script().advertise {
            self.discover(&address);
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.record("stop_scan");
        Ok(())
    }

    async fn connect(&self, _peripheral: &FakePeripheral) -> Result<(), RadioError> {
        self.record("connect");
        match self.script().connect_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn disconnect(&self, _peripheral: &FakePeripheral) -> Result<(), RadioError> {
        self.record("disconnect");
        Ok(())
    }

    async fn discover_services(
        &self,
        _peripheral: &FakePeripheral,
        services: &[Uuid],
    ) -> Result<Vec<FakeService>, RadioError> {
        self.record("discover_services");
        Ok(self
            .script()
            .services?
            .into_iter()
            .filter(|s| services.contains(&s.uuid))
            .collect())
    }

    async fn discover_characteristics(
        &self,
        _service: &FakeService,
        _filter: &[Uuid],
    ) -> Result<Vec<FakeCharacteristic>, RadioError> {
        self.record("discover_characteristics");
        self.script().characteristics
    }

    async fn write(
        &self,
        _peripheral: &FakePeripheral,
        characteristic: &FakeCharacteristic,
        bytes: &[u8],
        _with_response: bool,
    ) -> Result<(), RadioError> {
        self.record("write");
        let script = self.script();
        if let Some(e) = script.write_error {
            return Err(e);
        }
        if script.trickle_writes {
            for b in bytes {
                self.wire.lock().unwrap().push(*b);
                tokio::task::yield_now().await;
            }
        } else {
            self.wire.lock().unwrap().extend_from_slice(bytes);
        }
        self.writes
            .lock()
            .unwrap()
            .push((characteristic.clone(), bytes.to_vec()));
        Ok(())
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(20);
pub const BACKOFF: Duration = Duration::from_secs(10);

pub fn connector(radio: &Arc<FakeRadio>) -> DeviceConnector<FakeRadio> {
    let connector = DeviceConnector::new(radio.clone(), DeviceIdentity::default(), TIMEOUT);
    radio.probe(connector.watch_state());
    connector
}

pub fn session(radio: &Arc<FakeRadio>) -> Arc<PrintSession<FakeRadio>> {
    Arc::new(PrintSession::new(connector(radio)))
}
