pub mod job;
pub mod job_manager;
pub mod job_registry;
pub mod staged_source;
