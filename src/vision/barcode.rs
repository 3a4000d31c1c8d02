//! Barcode decoding through `zbarimg`

use image::{DynamicImage, ImageFormat};
use std::process::Command;
use tracing::debug;

use super::BarcodeDecoder;
use crate::error::{SampleError, SampleResult};

/// zbarimg exit status when the image holds no symbols
const ZBAR_NO_SYMBOLS: i32 = 4;

/// Hands the in-memory image to `zbarimg --raw -q` as a scratch PNG
pub struct ZbarDecoder {
    command: String,
}

impl ZbarDecoder {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl BarcodeDecoder for ZbarDecoder {
    fn decode(&self, image: &DynamicImage) -> SampleResult<Vec<String>> {
        let scratch = tempfile::Builder::new()
            .prefix("barcode-")
            .suffix(".png")
            .tempfile()?;
        image
            .to_luma8()
            .save_with_format(scratch.path(), ImageFormat::Png)
            .map_err(|e| SampleError::Barcode(format!("writing scratch image: {}", e)))?;

        let output = Command::new(&self.command)
            .args(["--raw", "-q"])
            .arg(scratch.path())
            .output()
            .map_err(|e| SampleError::Barcode(format!("running {}: {}", self.command, e)))?;

        match output.status.code() {
            Some(0) => {
                let payloads = parse_payloads(&String::from_utf8_lossy(&output.stdout));
                debug!("zbarimg decoded {} symbols", payloads.len());
                Ok(payloads)
            }
            Some(ZBAR_NO_SYMBOLS) => Ok(Vec::new()),
            _ => Err(SampleError::Barcode(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// One payload per output line, blank lines dropped
fn parse_payloads(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
