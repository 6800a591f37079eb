pub mod location_provider;
pub mod record_extractor;
