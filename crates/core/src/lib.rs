pub mod delivery;
pub mod detection;
pub mod jobs;
pub mod pipeline;
pub mod scoring;
pub mod selection;
pub mod shared;
pub mod video;
