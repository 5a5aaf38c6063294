pub mod dialect;
mod dump;
mod mysql;
pub mod policy;
mod serialize;
pub mod source;
pub mod transform;

pub use dialect::SessionCheck;
pub use dump::{DumpObserver, DumpOptions, DumpOrchestrator, DumpRun, DumpSource, DEFAULT_BATCH_SIZE};
pub use mysql::MysqlSource;
pub use policy::{DumpDefinitionSet, DumpMode, TableDumpPolicy};
pub use source::{SchemaCatalog, Value};
pub use transform::{ColumnPolicy, ValueTransform};
