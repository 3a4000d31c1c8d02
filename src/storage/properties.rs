//! Digitization properties sidecar (`postprocessor.properties`)
//!
//! Line-oriented `key=value` file with one optional header line, consumed
//! by the downstream collection management system.

use indexmap::IndexMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Fixed file name inside the sample data directory
pub const PROPERTIES_FILE_NAME: &str = "postprocessor.properties";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertiesFile {
    header: String,
    entries: IndexMap<String, String>,
}

impl PropertiesFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file content. The first line is the header unless it is a
    /// `key=value` pair; other lines without `=` are ignored.
    pub fn parse(content: &str) -> Self {
        let mut file = Self::new();
        for (index, line) in content.lines().enumerate() {
            match line.split_once('=') {
                Some((key, value)) => {
                    file.entries.insert(key.to_string(), value.to_string());
                }
                None if index == 0 => file.header = line.to_string(),
                None => {}
            }
        }
        file
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Set a value; existing keys keep their position
    pub fn update(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn set_header(&mut self, header: impl Into<String>) {
        self.header = header.into();
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Header line, then one `key=value` line per entry with values trimmed
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", self.header)?;
        for (key, value) in &self.entries {
            writeln!(writer, "{}={}", key, value.trim())?;
        }
        writer.flush()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        self.write(io::BufWriter::new(file))
    }
}
