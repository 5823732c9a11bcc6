use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::BatchError;
use crate::identity::models::normalize_id;
use crate::ledger::models::{parse_amount, ResourceKind};

/// Column holding the external account id
pub const ID_COLUMN: &str = "EpicID";

/// Header of a batch file, in export order
pub const BATCH_COLUMNS: [&str; 4] = [ID_COLUMN, "Points", "OilPoints", "EnergyPoints"];

/// One distribution target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRow {
    /// 1-based line in the uploaded file
    pub line: u64,
    /// Normalized (trimmed, lowercased) external account id
    pub external_account_id: String,
    pub dp: Decimal,
    pub oil: Decimal,
    pub energy: Decimal,
}

impl BatchRow {
    pub fn amount(&self, kind: ResourceKind) -> Decimal {
        match kind {
            ResourceKind::Dp => self.dp,
            ResourceKind::Oil => self.oil,
            ResourceKind::Energy => self.energy,
        }
    }
}

/// A row that could not be turned into a `BatchRow`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFault {
    pub line: u64,
    pub external_account_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Row(BatchRow),
    Fault(RowFault),
}

/// Parsed batch file, entries in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn rows(&self) -> impl Iterator<Item = &BatchRow> {
        self.entries.iter().filter_map(|e| match e {
            BatchEntry::Row(row) => Some(row),
            BatchEntry::Fault(_) => None,
        })
    }

    pub fn faults(&self) -> impl Iterator<Item = &RowFault> {
        self.entries.iter().filter_map(|e| match e {
            BatchEntry::Fault(fault) => Some(fault),
            BatchEntry::Row(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<BatchEntry> for Batch {
    fn from_iter<I: IntoIterator<Item = BatchEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Column positions resolved from the header row
struct Layout {
    id: usize,
    amounts: [(ResourceKind, usize); 3],
}

impl Layout {
    fn resolve(headers: &StringRecord) -> Result<Self, BatchError> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };

        let missing: Vec<String> = BATCH_COLUMNS
            .iter()
            .filter(|name| position(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BatchError::MissingColumns(missing));
        }

        let column = |kind: ResourceKind| (kind, position(kind.column()).unwrap_or_default());
        Ok(Self {
            id: position(ID_COLUMN).unwrap_or_default(),
            amounts: [
                column(ResourceKind::Dp),
                column(ResourceKind::Oil),
                column(ResourceKind::Energy),
            ],
        })
    }

    fn entry(&self, record: &StringRecord, line: u64) -> BatchEntry {
        let raw_id = record.get(self.id).unwrap_or_default();
        let external_account_id = normalize_id(raw_id);

        let fault = |reason: String| {
            BatchEntry::Fault(RowFault {
                line,
                external_account_id: external_account_id.clone(),
                reason,
            })
        };

        if external_account_id.is_empty() {
            return fault(format!("missing {}", ID_COLUMN));
        }

        let mut amounts = [Decimal::ZERO; 3];
        for (slot, (kind, index)) in amounts.iter_mut().zip(self.amounts.iter()) {
            match parse_cell(record.get(*index).unwrap_or_default()) {
                Ok(amount) => *slot = amount,
                Err(reason) => return fault(format!("{} {}", kind.column(), reason)),
            }
        }

        BatchEntry::Row(BatchRow {
            line,
            external_account_id,
            dp: amounts[0],
            oil: amounts[1],
            energy: amounts[2],
        })
    }
}

/// Empty cells count as zero; anything else must be a non-negative number
fn parse_cell(raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let amount = parse_amount(raw).map_err(|_| format!("value '{}' is not a number", raw))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("value '{}' is negative", raw));
    }
    Ok(amount)
}

/// Parse an uploaded batch file.
///
/// Missing required columns reject the whole file. A row with a bad
/// amount or an empty id becomes a `RowFault` in its position and the
/// remaining rows are still returned.
pub fn parse(bytes: &[u8]) -> Result<Batch, BatchError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let layout = Layout::resolve(reader.headers()?)?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let entry = layout.entry(&record, line);
        if let BatchEntry::Fault(fault) = &entry {
            warn!("Batch line {}: {}", fault.line, fault.reason);
        }
        entries.push(entry);
    }

    debug!("Parsed batch with {} entries", entries.len());
    Ok(Batch { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ID_A: &str = "0123456789ABCDEF0123456789ABCDEF";

    #[test]
    fn test_parse_rows() {
        let csv = format!(
            "EpicID,Points,OilPoints,EnergyPoints\n {} ,10,0,2.5\nbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb,1,2,3\n",
            ID_A
        );
        let batch = parse(csv.as_bytes()).unwrap();
        let rows: Vec<&BatchRow> = batch.rows().collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].external_account_id, ID_A.to_lowercase());
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].dp, dec!(10));
        assert_eq!(rows[0].amount(ResourceKind::Energy), dec!(2.5));
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn test_headers_trimmed_and_reordered() {
        let csv = format!(" EnergyPoints , EpicID ,OilPoints,Points \n3,{},2,1\n", ID_A);
        let batch = parse(csv.as_bytes()).unwrap();
        let row = batch.rows().next().unwrap();

        assert_eq!((row.dp, row.oil, row.energy), (dec!(1), dec!(2), dec!(3)));
    }

    #[test]
    fn test_missing_column_rejects_file() {
        let csv = format!("EpicID,Points,EnergyPoints\n{},1,1\n", ID_A);
        assert_eq!(
            parse(csv.as_bytes()),
            Err(BatchError::MissingColumns(vec!["OilPoints".to_string()]))
        );
    }

    #[test]
    fn test_bad_amount_becomes_fault_in_place() {
        let csv = "EpicID,Points,OilPoints,EnergyPoints\n\
                   aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa,1,1,1\n\
                   bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb,ten,1,1\n\
                   cccccccccccccccccccccccccccccccc,1,-4,1\n\
                   ,1,1,1\n\
                   dddddddddddddddddddddddddddddddd,,,7\n";
        let batch = parse(csv.as_bytes()).unwrap();

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.rows().count(), 2);
        let faults: Vec<&RowFault> = batch.faults().collect();
        assert_eq!(faults.len(), 3);
        assert_eq!(faults[0].line, 3);
        assert!(faults[0].reason.contains("Points"));
        assert!(faults[1].reason.contains("negative"));
        assert!(faults[2].reason.contains(ID_COLUMN));
        assert!(matches!(batch.entries()[1], BatchEntry::Fault(_)));

        let last = batch.rows().last().unwrap();
        assert_eq!((last.dp, last.oil, last.energy), (Decimal::ZERO, Decimal::ZERO, dec!(7)));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let csv = format!("EpicID,Points,OilPoints,EnergyPoints\n{},5,x,1\n{},1,1,1\n", ID_A, ID_A);
        assert_eq!(parse(csv.as_bytes()), parse(csv.as_bytes()));
    }

    #[test]
    fn test_header_only_is_empty_batch() {
        let batch = parse(b"EpicID,Points,OilPoints,EnergyPoints\n").unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut bytes = b"EpicID,Points,OilPoints,EnergyPoints\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b',', b'1', b',', b'1', b',', b'1', b'\n']);
        assert!(matches!(parse(&bytes), Err(BatchError::Malformed(_))));
    }
}
