//! Bridge between HTTP print requests and an ESC/POS printer reached over
//! Bluetooth LE.

pub mod config;
pub mod connector;
pub mod encoder;
pub mod error;
pub mod hex;
pub mod instruction;
pub mod radio;
pub mod retry;
pub mod routes;
pub mod session;

pub use config::{AppConfig, DeviceIdentity};
pub use connector::{ActiveLink, AttemptId, ConnectionState, DeviceConnector};
pub use encoder::{encode, Alignment, BarcodeType, CommandSequence, PrintJob};
pub use error::{ConnectionCause, ConnectionError, PrintError, RadioError, ValidationError};
pub use radio::{RadioCapability, RadioEvent, RadioState, ScanFilter};
pub use retry::RetryScheduler;
pub use session::{PrintSession, Status};
