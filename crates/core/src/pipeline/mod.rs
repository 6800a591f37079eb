pub mod cluster_profiles_use_case;
pub mod pipeline_logger;
pub mod watch_stream_use_case;
