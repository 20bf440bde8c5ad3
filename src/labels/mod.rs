//! Address label table: a `dapp,contract,address` CSV shared by both pipelines.

use crate::error::LabelError;
use crate::model::{normalize_address, AddressLabel};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// In-memory label table keyed by normalized address.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    rows: Vec<AddressLabel>,
    index: HashMap<String, usize>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows; the first row for an address wins.
    pub fn from_labels(labels: impl IntoIterator<Item = AddressLabel>) -> Self {
        let mut table = LabelTable::new();
        for label in labels {
            table.insert(label);
        }
        table
    }

    /// Load the table from disk. A missing file is an empty table.
    ///
    /// `dapp` is kept verbatim, as the labeler wrote it; `contract` and
    /// `address` are trimmed.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        if !path.exists() {
            return Ok(LabelTable::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(path)?;
        let mut table = LabelTable::new();
        let mut duplicates = 0usize;
        for row in rdr.deserialize::<AddressLabel>() {
            let mut label = row?;
            label.contract = label.contract.trim().to_string();
            if !table.insert(label) {
                duplicates += 1;
            }
        }
        tracing::debug!(
            path = %path.display(),
            rows = table.len(),
            duplicates,
            "label table loaded"
        );
        Ok(table)
    }

    /// Insert unless the address is already present. Returns whether it was inserted.
    pub fn insert(&mut self, label: AddressLabel) -> bool {
        let key = normalize_address(&label.address);
        if key.is_empty() || self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.rows.len());
        self.rows.push(AddressLabel {
            address: key,
            ..label
        });
        true
    }

    pub fn get(&self, address: &str) -> Option<&AddressLabel> {
        self.index
            .get(&normalize_address(address))
            .map(|&i| &self.rows[i])
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(&normalize_address(address))
    }

    /// Label that attributes gas to a dapp; `Unknown` rows do not.
    pub fn dapp_for(&self, address: &str) -> Option<&AddressLabel> {
        self.get(address).filter(|l| l.is_known())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only writer. Each row is flushed before `append` returns.
pub struct LabelWriter {
    writer: csv::Writer<File>,
}

impl LabelWriter {
    /// Open for appending. Writes the header into a new or empty file, and
    /// terminates a last row that was saved without a trailing newline.
    pub fn open(path: &Path) -> Result<Self, LabelError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let needs_header = file.metadata()?.len() == 0;
        if !needs_header && !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(["dapp", "contract", "address"])?;
            writer.flush()?;
        }
        Ok(LabelWriter { writer })
    }

    pub fn append(&mut self, label: &AddressLabel) -> Result<(), LabelError> {
        self.writer.write_record([
            label.dapp.as_str(),
            label.contract.as_str(),
            normalize_address(&label.address).as_str(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
