//! ESC/POS command encoding for text, QR and barcode jobs.
//!
//! Encoding is a pure function of the job: every job is validated in full
//! before the first byte is produced, so a failed job never yields a
//! partial command sequence.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::instruction::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    fn code(self) -> u8 {
        match self {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        }
    }
}

impl FromStr for Alignment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            _ => Err(ValidationError::UnknownAlignment(s.to_string())),
        }
    }
}

/// Symbologies accepted by `GS k`, with their function-B type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BarcodeType {
    UpcA = 0x41,
    UpcE = 0x42,
    Ean13 = 0x43,
    Ean8 = 0x44,
    Code39 = 0x45,
    Itf = 0x46,
    Codebar = 0x47,
    Code93 = 0x48,
    #[default]
    Code128 = 0x49,
}

impl BarcodeType {
    pub const ALL: [BarcodeType; 9] = [
        BarcodeType::UpcA,
        BarcodeType::UpcE,
        BarcodeType::Ean13,
        BarcodeType::Ean8,
        BarcodeType::Code39,
        BarcodeType::Itf,
        BarcodeType::Codebar,
        BarcodeType::Code93,
        BarcodeType::Code128,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            BarcodeType::UpcA => "UPC-A",
            BarcodeType::UpcE => "UPC-E",
            BarcodeType::Ean13 => "EAN13",
            BarcodeType::Ean8 => "EAN8",
            BarcodeType::Code39 => "CODE39",
            BarcodeType::Itf => "ITF",
            BarcodeType::Codebar => "CODEBAR",
            BarcodeType::Code93 => "CODE93",
            BarcodeType::Code128 => "CODE128",
        }
    }
}

impl FromStr for BarcodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BarcodeType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| ValidationError::UnknownBarcodeType(s.to_string()))
    }
}

impl fmt::Display for BarcodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintJob {
    Text {
        text: String,
        alignment: Alignment,
        bold: bool,
    },
    Qr {
        data: Vec<u8>,
        size: u32,
    },
    Barcode {
        kind: BarcodeType,
        data: Vec<u8>,
    },
}

impl PrintJob {
    pub fn text(text: impl Into<String>, alignment: Alignment, bold: bool) -> Self {
        PrintJob::Text {
            text: text.into(),
            alignment,
            bold,
        }
    }

    pub fn qr(data: impl Into<Vec<u8>>, size: u32) -> Self {
        PrintJob::Qr {
            data: data.into(),
            size,
        }
    }

    /// Resolve `kind` through the barcode type table.
    pub fn barcode(kind: &str, data: impl Into<Vec<u8>>) -> Result<Self, ValidationError> {
        Ok(PrintJob::Barcode {
            kind: kind.parse()?,
            data: data.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PrintJob::Text { .. } => "text",
            PrintJob::Qr { .. } => "QR code",
            PrintJob::Barcode { .. } => "barcode",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            PrintJob::Text { .. } => Ok(()),
            PrintJob::Qr { data, size } => {
                if data.is_empty() {
                    return Err(ValidationError::MissingData("QR"));
                }
                if !(QR_MIN_SIZE as u32..=QR_MAX_SIZE as u32).contains(size) {
                    return Err(ValidationError::SizeOutOfRange {
                        size: *size,
                        min: QR_MIN_SIZE,
                        max: QR_MAX_SIZE,
                    });
                }
                let max = u16::MAX as usize - 3;
                if data.len() > max {
                    return Err(ValidationError::DataTooLong {
                        kind: "QR",
                        len: data.len(),
                        max,
                    });
                }
                Ok(())
            }
            PrintJob::Barcode { data, .. } => {
                if data.is_empty() {
                    return Err(ValidationError::MissingData("Barcode"));
                }
                let max = u8::MAX as usize;
                if data.len() > max {
                    return Err(ValidationError::DataTooLong {
                        kind: "Barcode",
                        len: data.len(),
                        max,
                    });
                }
                Ok(())
            }
        }
    }
}

/// Ordered byte chunks; concatenation order is wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSequence {
    chunks: Vec<Vec<u8>>,
}

impl CommandSequence {
    fn push(&mut self, chunk: impl Into<Vec<u8>>) -> &mut Self {
        self.chunks.push(chunk.into());
        self
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// Reset, center, banner, feed. Sent once after each successful connection.
pub fn startup_sequence() -> CommandSequence {
    let mut seq = CommandSequence::default();
    seq.push(RESET.clone())
        .push(align(Alignment::Center))
        .push(STARTUP_BANNER.as_bytes())
        .push(FEED_PAPER.clone());
    seq
}

pub fn encode(job: &PrintJob) -> Result<CommandSequence, ValidationError> {
    job.validate()?;

    let mut seq = CommandSequence::default();
    match job {
        PrintJob::Text {
            text,
            alignment,
            bold,
        } => {
            seq.push(RESET.clone()).push(align(*alignment));
            if *bold {
                seq.push(BOLD_ON.clone());
            }
            let mut line = text.clone().into_bytes();
            line.push(LINE_FEED);
            seq.push(line).push(FEED_PAPER.clone());
        }
        PrintJob::Qr { data, size } => {
            // validated: fits in pL/pH and size fits in a byte
            let stored = (data.len() + 3) as u16;
            let mut module_size = QR_MODULE_SIZE.clone();
            module_size.push(*size as u8);

            let mut store = QR_STORE_HEADER.clone();
            store.extend_from_slice(&stored.to_le_bytes());
            store.extend_from_slice(&QR_STORE_TAG);

            seq.push(QR_SELECT_MODEL.clone())
                .push(module_size)
                .push(QR_ERROR_CORRECTION.clone())
                .push(store)
                .push(data.clone())
                .push(QR_PRINT.clone())
                .push(FEED_PAPER.clone());
        }
        PrintJob::Barcode { kind, data } => {
            let mut print = BARCODE_PRINT.clone();
            print.push(kind.code());
            print.push(data.len() as u8);
            print.extend_from_slice(data);

            seq.push(with_arg(&BARCODE_HEIGHT, BARCODE_HEIGHT_DOTS))
                .push(with_arg(&BARCODE_WIDTH, BARCODE_WIDTH_DOTS))
                .push(with_arg(&BARCODE_HRI, BARCODE_HRI_BELOW))
                .push(print)
                .push([LINE_FEED]);
        }
    }

    Ok(seq)
}

fn align(alignment: Alignment) -> Vec<u8> {
    with_arg(&ALIGN_SELECT, alignment.code())
}

fn with_arg(command: &[u8], arg: u8) -> Vec<u8> {
    let mut out = command.to_vec();
    out.push(arg);
    out
}
