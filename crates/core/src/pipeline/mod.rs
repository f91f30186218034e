pub mod infrastructure;
pub mod pipeline_factory;
pub mod pipeline_logger;
pub mod select_portraits_use_case;
pub mod selection_config;
