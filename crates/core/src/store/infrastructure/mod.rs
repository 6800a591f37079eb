pub mod json_record_store;
pub mod memory_record_store;
