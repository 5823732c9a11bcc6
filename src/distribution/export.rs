use csv::Writer;

use crate::distribution::batch::BATCH_COLUMNS;
use crate::error::BatchError;
use crate::identity::models::IdentityRecord;

/// Batch template listing every registered id with zero amounts.
/// Operators fill in the amounts and upload it back for distribution.
pub fn export_template(records: &[IdentityRecord]) -> Result<Vec<u8>, BatchError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(BATCH_COLUMNS)?;
    for record in records {
        writer.write_record([record.external_account_id.as_str(), "0", "0", "0"])?;
    }
    writer
        .into_inner()
        .map_err(|e| BatchError::Malformed(e.to_string()))
}
