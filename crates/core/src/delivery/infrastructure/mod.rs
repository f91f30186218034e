pub mod http_upload_sink;
pub mod image_file_sink;
pub mod jpeg;
