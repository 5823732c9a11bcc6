pub mod batch;
pub mod export;
pub mod orchestrator;
pub mod outcome;

pub use batch::{parse, Batch, BatchEntry, BatchRow, RowFault};
pub use export::export_template;
pub use orchestrator::Distributor;
pub use outcome::{DistributionOutcome, DistributionReport, OutcomeSummary};
