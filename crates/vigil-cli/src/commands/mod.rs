pub mod ingest;
pub mod simulate;

pub use ingest::IngestCommand;
pub use simulate::SimulateCommand;
