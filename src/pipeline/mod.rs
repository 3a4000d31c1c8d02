//! Per-sample pipeline
//!
//! Runs one sample through rotate, barcode decoding, text-area detection,
//! OCR, lexeme analysis, identifier resolution and persistence. Every stage
//! is gated by configuration. Anticipated failures are logged where they
//! happen and the sample carries on; anything else is returned to the
//! worker.

pub mod settle;
pub mod worker;

use chrono::Local;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, Rotation};
use crate::error::SampleResult;
use crate::identifier::{self, ocr_text::identifiers_from_text};
use crate::ingest::TEXT_AREA_MARKER;
use crate::rename::{rename_directory, rename_files};
use crate::sample::{load_sample, SampleEvent, SampleImage, TextArea, TIMESTAMP_OUTPUT_FORMAT};
use crate::storage::properties::{PropertiesFile, PROPERTIES_FILE_NAME};
use crate::storage::record::write_record;
use crate::storage::table::TableWriter;
use crate::vision::Collaborators;

use settle::{wait_until_settled, Settle};

/// Log an anticipated failure and carry on; hand anything else back
fn guarded<T>(name: &str, stage: &str, result: SampleResult<T>) -> SampleResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_recoverable() => {
            warn!("{}: {} failed: {}", name, stage, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Shared, read-only state every worker runs samples against
pub struct Pipeline {
    config: Arc<AppConfig>,
    collaborators: Collaborators,
    table: Option<Arc<TableWriter>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<AppConfig>,
        collaborators: Collaborators,
        table: Option<Arc<TableWriter>>,
    ) -> Self {
        Self {
            config,
            collaborators,
            table,
        }
    }

    /// Handle one queue token from detection to persisted record.
    ///
    /// Returns `None` when the token was skipped.
    pub fn process_token(&self, token: &Path) -> SampleResult<Option<SampleEvent>> {
        let pp = &self.config.postprocessor;
        match wait_until_settled(token, pp.settle_delay(), pp.settle_max_wait()) {
            Settle::Ready => {}
            Settle::Gone => {
                warn!("{:?} no longer exists, skipped", token);
                return Ok(None);
            }
            Settle::StillChanging => {
                warn!(
                    "{:?} was still being written after {:?}, skipped",
                    token,
                    pp.settle_max_wait()
                );
                return Ok(None);
            }
        }

        let sample = match load_sample(token, &self.config) {
            Ok(sample) => sample,
            Err(e) if e.is_recoverable() => {
                warn!("Could not load a sample from {:?}: {}", token, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.process_sample(sample).map(Some)
    }

    /// Run every enabled stage on a loaded sample
    pub fn process_sample(&self, mut sample: SampleEvent) -> SampleResult<SampleEvent> {
        info!("Postprocessing sample {}", sample.name);
        let pp = &self.config.postprocessor;

        if pp.rotate_before_processing != Rotation::None {
            self.rotate(&mut sample, pp.rotate_before_processing)?;
        }

        let barcodes = if pp.read_barcodes {
            self.read_barcodes(&mut sample)?
        } else {
            Vec::new()
        };

        if pp.find_text_areas {
            self.find_text_areas(&mut sample)?;
        }

        let ocr_text = if pp.ocr {
            Some(self.ocr(&mut sample)?)
        } else {
            None
        };

        let ocr_identifiers = match &ocr_text {
            Some(text) => {
                let found = identifiers_from_text(text);
                if !found.is_empty() {
                    sample.meta.add_logged(&sample.name, "OCR identifiers", found.clone());
                }
                found
            }
            None => Vec::new(),
        };

        let fields = self.analyze(&mut sample, ocr_text.as_deref());
        self.resolve(&mut sample, &barcodes, &ocr_identifiers);
        self.persist(&mut sample, ocr_text.as_deref(), &fields)?;
        Ok(sample)
    }

    fn rotate(&self, sample: &mut SampleEvent, rotation: Rotation) -> SampleResult<()> {
        for image in sample.images.iter_mut() {
            debug!("{}: rotating image {}", sample.name, image.camera());
            guarded(&sample.name, "rotation", image.rotate(rotation))?;
        }
        Ok(())
    }

    /// Payloads decoded from every image, in image order
    fn read_barcodes(&self, sample: &mut SampleEvent) -> SampleResult<Vec<String>> {
        let mut all = Vec::new();
        for image in sample.images.iter_mut() {
            let decoded = match image.pixels() {
                Ok(pixels) => self.collaborators.decoder.decode(pixels),
                Err(e) => Err(e),
            };
            let Some(payloads) = guarded(&sample.name, "barcode detection", decoded)? else {
                continue;
            };
            image
                .meta_mut()
                .add_logged(&sample.name, "Barcode contents", payloads.clone());
            all.extend(payloads);
        }
        Ok(all)
    }

    fn find_text_areas(&self, sample: &mut SampleEvent) -> SampleResult<()> {
        let save = self.config.postprocessor.save_text_area_images;
        for image in sample.images.iter_mut().filter(|i| i.has_labels()) {
            debug!("{}: searching for text areas in {}", sample.name, image.camera());
            let detected = match image.pixels() {
                Ok(pixels) => self.collaborators.detector.detect(pixels),
                Err(e) => Err(e),
            };
            let Some(areas) = guarded(&sample.name, "text area detection", detected)? else {
                continue;
            };
            let listed: Vec<Value> = areas.iter().map(Value::from).collect();
            image.meta_mut().add_logged(&sample.name, "Text areas found", listed);
            image.set_text_areas(areas);

            if save {
                guarded(
                    &sample.name,
                    "saving text area images",
                    image.save_text_areas(TEXT_AREA_MARKER),
                )?;
            }
        }
        Ok(())
    }

    /// Text of every label-bearing image, space-joined
    fn ocr(&self, sample: &mut SampleEvent) -> SampleResult<String> {
        let force_full_frame = self.config.postprocessor.ocr_force_full_frame;
        let mut fragments: Vec<String> = Vec::new();
        for image in sample.images.iter_mut().filter(|i| i.has_labels()) {
            let result = self.ocr_image(image, force_full_frame);
            let Some(text) = guarded(&sample.name, "OCR", result)? else {
                continue;
            };
            image.meta_mut().add("OCR text", text.as_str());
            if !text.is_empty() {
                fragments.push(text);
            }
        }
        let combined = fragments.join(" ");
        sample
            .meta
            .add_logged(&sample.name, "Combined OCR result for all images", combined.as_str());
        Ok(combined)
    }

    fn ocr_image(&self, image: &mut SampleImage, force_full_frame: bool) -> SampleResult<String> {
        let areas: Vec<TextArea> = image.text_areas().map(<[TextArea]>::to_vec).unwrap_or_default();
        if areas.is_empty() || force_full_frame {
            let pixels = image.pixels()?;
            return Ok(self.collaborators.ocr.recognize(pixels)?.trim().to_string());
        }

        let mut parts = Vec::with_capacity(areas.len());
        for area in &areas {
            let crop = image.sub_image(area)?;
            let text = self.collaborators.ocr.recognize(&crop)?;
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
        Ok(parts.join(" "))
    }

    /// Lexeme analysis of the combined OCR text, when enabled
    fn analyze(&self, sample: &mut SampleEvent, ocr_text: Option<&str>) -> Vec<(String, String)> {
        let enabled = self.config.postprocessor.ocr_analysis;
        match (ocr_text, &self.collaborators.analyzer) {
            (Some(text), Some(analyzer)) if enabled => {
                let fields = analyzer.analyze(text);
                debug!("{}: OCR analysis output: {:?}", sample.name, fields);
                let listed: Vec<Value> = fields
                    .iter()
                    .map(|(field, value)| Value::from(vec![field.as_str(), value.as_str()]))
                    .collect();
                sample.meta.add("OCR analysis", listed);
                fields
            }
            _ => {
                debug!("{}: no OCR analysis attempted", sample.name);
                Vec::new()
            }
        }
    }

    fn resolve(&self, sample: &mut SampleEvent, barcodes: &[String], ocr_identifiers: &[String]) {
        let existing = sample.identifier().map(str::to_string);
        let resolution = identifier::resolve(
            &sample.name,
            barcodes,
            existing.as_deref(),
            ocr_identifiers,
            self.config.postprocessor.ocr_identifier_fallback,
        );
        sample.set_identifier(resolution.identifier().map(str::to_string));

        if let Some(id) = sample.identifier() {
            info!("{}: identifier {}", sample.name, id);
            if !identifier::is_well_formed(id, &self.config.basic.allowed_uri_prefixes) {
                error!(
                    "{}: MALFORMED IDENTIFIER {} (URI prefix {:?})",
                    sample.name,
                    id,
                    identifier::prefix(id)
                );
            }
        }
    }

    fn persist(&self, sample: &mut SampleEvent, ocr_text: Option<&str>, fields: &[(String, String)]) -> SampleResult<()> {
        let basic = &self.config.basic;
        let name = sample.name.clone();

        if let (Some(table), Some(id)) = (&self.table, sample.identifier()) {
            if self.config.postprocessor.ocr_analysis_to_table && !fields.is_empty() {
                let mut row = vec![("identifier".to_string(), id.to_string())];
                row.extend(fields.iter().cloned());
                guarded(&name, "table output", table.append(&row))?;
            }
        }

        if sample.identifier().is_some() {
            if basic.directories_rename_by_barcode_id {
                if sample.format.is_line() {
                    let result =
                        rename_directory(sample, basic.rename_base(), basic.create_subdirectory_per_sample);
                    guarded(&name, "directory rename", result)?;
                } else {
                    debug!("{}: directory renaming applies to line layouts only", name);
                }
            }
            if basic.files_rename_by_barcode_id {
                guarded(&name, "file rename", rename_files(sample))?;
            }
        } else if basic.directories_rename_by_barcode_id || basic.files_rename_by_barcode_id {
            info!("{}: renaming skipped, no unique identifier", name);
        }

        sample.unload_images();
        if basic.save_json {
            guarded(&name, "metadata record", write_record(sample, &basic.json_extension))?;
        }
        if sample.format.is_line() {
            guarded(&name, "properties file", self.write_properties(sample, ocr_text))?;
        }
        Ok(())
    }

    /// Update `postprocessor.properties` in the sample directory
    fn write_properties(&self, sample: &SampleEvent, ocr_text: Option<&str>) -> SampleResult<PathBuf> {
        let path = sample.data_path.join(PROPERTIES_FILE_NAME);
        let mut props = if path.is_file() {
            PropertiesFile::read(&path)?
        } else {
            PropertiesFile::new()
        };

        let (full, short, format_ok) = match (sample.identifier(), sample.short_identifier()) {
            (Some(id), Some(short)) => (
                id,
                short,
                identifier::is_well_formed(id, &self.config.basic.allowed_uri_prefixes),
            ),
            _ => {
                warn!("{}: no readable QR code, or several QR codes", sample.name);
                ("", "", false)
            }
        };
        let sf = &self.config.sampleformat;
        let timestamp = sample
            .original_timestamp(&sf.timestamp_marker, &sf.timestamp_format)
            .map(|t| t.format(TIMESTAMP_OUTPUT_FORMAT).to_string())
            .unwrap_or_default();

        props.set_header(format!("# {}", Local::now().format("%Y-%m-%d %H:%M:%S%.6f")));
        props.update("full_barcode_data", full);
        props.update("identifier", short);
        props.update("timestamp", timestamp);
        props.update("URI_format_OK", if format_ok { "True" } else { "False" });
        // Manual annotation slots; existing annotations are kept
        for key in ["Q-sharp", "Q-color"] {
            if props.get(key).is_none() {
                props.update(key, "");
            }
        }
        if let Some(text) = ocr_text {
            props.update("OCR_result", text.replace(['\n', '\r'], " "));
        }

        props.save(&path)?;
        debug!("{}: properties written to {:?}", sample.name, path);
        Ok(path)
    }
}
