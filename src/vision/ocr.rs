//! OCR through the tesseract command line tool

use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::ocr_preprocess::prepare_for_ocr;
use super::OcrEngine;
use crate::config::OcrConfig;
use crate::error::{SampleError, SampleResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pipes a prepared PNG into `tesseract stdin stdout -l <lang>`
pub struct TesseractCli {
    command: String,
    language: String,
    timeout: Duration,
    gamma: f32,
}

impl TesseractCli {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            command: config.tesseract_command.clone(),
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            gamma: config.gamma,
        }
    }

    fn encode(&self, image: &DynamicImage) -> SampleResult<Vec<u8>> {
        let prepared = prepare_for_ocr(image, self.gamma);
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(prepared)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| SampleError::Ocr(format!("encoding image: {}", e)))?;
        Ok(png)
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> SampleResult<String> {
        let png = self.encode(image)?;

        let mut child = match Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Could not start {}: {}", self.command, e);
                return Ok(String::new());
            }
        };

        // Output is read on its own thread so a full pipe never stalls the child
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stdout.read_to_string(&mut text);
                text
            })
        });

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&png) {
                debug!("tesseract closed its input early: {}", e);
            }
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    warn!("OCR timed out after {:?}", self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(String::new());
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let text = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(SampleError::Ocr(format!("{} exited with {}", self.command, status)));
        }
        Ok(text.trim().to_string())
    }
}
