pub mod csv;
pub mod export;
pub mod import;

pub use csv::{parse_csv_results, to_csv, write_csv, CsvResults};
pub use export::{
    export_simulation, write_json, write_jsonl, ExportMetadata, ExportOptions, PropertySample, SerializedSimulation,
    StatisticsSample, FORMAT_VERSION,
};
pub use import::{import_graph, import_parameters, import_simulation, ImportedSimulation, ValidationMode};
