use std::time::Duration;

use lazy_static::lazy_static;
use uuid::Uuid;

use crate::hex::decode_hex;

// printer identity
pub const PRINTER_ADDRESS: &str = "5a:4a:f4:00:0b:bf";
pub const PRINTER_SERVICE: Uuid = Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2);

// timing
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const RETRY_BACKOFF: Duration = Duration::from_secs(10);

pub const STARTUP_BANNER: &str = "Printer Ready!\n----------------\nServer is up and running.\n\n";

// barcode layout
pub const BARCODE_HEIGHT_DOTS: u8 = 50;
pub const BARCODE_WIDTH_DOTS: u8 = 2;
pub const BARCODE_HRI_BELOW: u8 = 2;

pub const QR_MIN_SIZE: u8 = 1;
pub const QR_MAX_SIZE: u8 = 16;

// command
lazy_static! {
    // ESC @
    pub static ref RESET: Vec<u8> = "1B 40".to_hex();
    // ESC a n
    pub static ref ALIGN_SELECT: Vec<u8> = "1B 61".to_hex();
    // ESC E 1
    pub static ref BOLD_ON: Vec<u8> = "1B 45 01".to_hex();
    // ESC d 3
    pub static ref FEED_PAPER: Vec<u8> = "1B 64 03".to_hex();

    // GS ( k
    pub static ref QR_SELECT_MODEL: Vec<u8> = "1D 28 6B 04 00 31 41 32 00".to_hex();
    pub static ref QR_MODULE_SIZE: Vec<u8> = "1D 28 6B 03 00 31 43".to_hex();
    pub static ref QR_ERROR_CORRECTION: Vec<u8> = "1D 28 6B 03 00 31 45 30".to_hex();
    pub static ref QR_STORE_HEADER: Vec<u8> = "1D 28 6B".to_hex();
    pub static ref QR_STORE_TAG: Vec<u8> = "31 50 30".to_hex();
    pub static ref QR_PRINT: Vec<u8> = "1D 28 6B 03 00 31 51 30".to_hex();

    // GS h / GS w / GS H / GS k
    pub static ref BARCODE_HEIGHT: Vec<u8> = "1D 68".to_hex();
    pub static ref BARCODE_WIDTH: Vec<u8> = "1D 77".to_hex();
    pub static ref BARCODE_HRI: Vec<u8> = "1D 48".to_hex();
    pub static ref BARCODE_PRINT: Vec<u8> = "1D 6B".to_hex();
}

pub const LINE_FEED: u8 = b'\n';

trait EnhanceString {
    fn to_hex(&self) -> Vec<u8>;
}

impl EnhanceString for str {
    fn to_hex(&self) -> Vec<u8> {
        decode_hex(&self.replace(' ', "")).unwrap()
    }
}
