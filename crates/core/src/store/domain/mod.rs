pub mod profile;
pub mod record;
pub mod record_store;
