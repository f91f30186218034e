pub mod cancellation;
pub mod constants;
pub mod frame;
pub mod model_resolver;
pub mod path_segment;
pub mod region;
pub mod video_metadata;
