pub mod cycle_buffer;
pub mod field_extractor;
pub mod types;

pub use cycle_buffer::CycleBuffer;
pub use field_extractor::{extract, extract_fields, Extraction};
pub use types::{CycleFields, CycleRecord};
