use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub type CsvRow = BTreeMap<String, String>;

/// One row of a listing page, resolved into a full record on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// 1-based position within the whole source listing.
    pub position: u64,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<PendingRecord>,
    /// Listing rows returned, including any that could not become entries.
    pub listed: u64,
    pub total: u64,
    /// Set when the source gave up after its retry ceiling rather than running out of records.
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Atom { slug: String, detail: Value },
    Csv { position: u64, row: CsvRow },
}

pub trait RecordSource {
    fn name(&self) -> &'static str;

    /// Fetch the listing page starting at `offset`.
    fn next_page(&mut self, offset: u64, limit: u64) -> Result<Page>;

    /// Load the full record for a listing entry; `None` means it could not be
    /// obtained and should be skipped.
    fn resolve(&mut self, entry: &PendingRecord) -> Option<SourceRecord>;
}

/// Local tabular export: read once, served in file order.
pub struct CsvSource {
    rows: Vec<CsvRow>,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_bytes(&data).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers = reader
            .headers()
            .context("failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("failed to parse CSV row {}", idx + 2))?;
            let row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect::<CsvRow>();
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn non_empty<'a>(row: &'a CsvRow, column: &str) -> Option<&'a str> {
    row.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl RecordSource for CsvSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn next_page(&mut self, offset: u64, limit: u64) -> Result<Page> {
        let total = self.rows.len() as u64;
        let start = offset.min(total);
        let end = offset.saturating_add(limit).min(total);
        let entries: Vec<PendingRecord> = (start..end)
            .map(|idx| {
                let row = &self.rows[idx as usize];
                let position = idx + 1;
                let label = non_empty(row, "referenceCode")
                    .or_else(|| non_empty(row, "identifier"))
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| position.to_string());
                PendingRecord { position, label }
            })
            .collect();
        Ok(Page {
            listed: entries.len() as u64,
            entries,
            total,
            exhausted: false,
        })
    }

    fn resolve(&mut self, entry: &PendingRecord) -> Option<SourceRecord> {
        let idx = usize::try_from(entry.position.checked_sub(1)?).ok()?;
        let row = self.rows.get(idx)?.clone();
        Some(SourceRecord::Csv {
            position: entry.position,
            row,
        })
    }
}
