use std::sync::Arc;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::Url;

use crate::delivery::domain::frame_sink::{FrameSink, StoreError, StoredFrame};
use crate::shared::frame::Frame;

use super::jpeg::{encode_jpeg, frame_file_name};

/// Uploads qualifying frames as multipart form posts.
///
/// Each frame is sent as field `file` to `<upload_url>?bucket=<job_id>`.
/// The HTTP client is constructed once by the caller and shared by every
/// job's sink.
pub struct HttpUploadSink {
    client: Arc<Client>,
    upload_url: Url,
}

impl HttpUploadSink {
    pub fn new(client: Arc<Client>, upload_url: Url) -> Self {
        Self { client, upload_url }
    }

    fn url_for(&self, job_id: &str) -> Url {
        let mut url = self.upload_url.clone();
        url.query_pairs_mut().append_pair("bucket", job_id);
        url
    }
}

impl FrameSink for HttpUploadSink {
    fn store(&self, job_id: &str, frame: &Frame) -> Result<StoredFrame, StoreError> {
        let file_name = frame_file_name(frame.index());
        let part = Part::bytes(encode_jpeg(frame)?)
            .file_name(file_name.clone())
            .mime_str("image/jpeg")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url_for(job_id))
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        Ok(StoredFrame {
            frame_index: frame.index(),
            location: format!("{job_id}/{file_name}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mock upload endpoint answering `POST /upload` with `status`.
    fn upload_server(rt: &Runtime, status: u16, body: &str) -> MockServer {
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/upload"))
                .respond_with(ResponseTemplate::new(status).set_body_string(body))
                .mount(&server)
                .await;
            server
        })
    }

    fn sink_for(server: &MockServer) -> HttpUploadSink {
        let url = Url::parse(&format!("{}/upload", server.uri())).unwrap();
        HttpUploadSink::new(Arc::new(Client::new()), url)
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![90u8; 16 * 16 * 3], 16, 16, index)
    }

    #[test]
    fn test_posts_multipart_file_with_bucket_query() {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/upload"))
                .and(query_param("bucket", "job-42"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
            server
        });

        let stored = sink_for(&server).store("job-42", &frame(7)).unwrap();

        assert_eq!(stored.frame_index, 7);
        assert_eq!(stored.location, "job-42/frame_000007.jpg");

        let requests = rt.block_on(server.received_requests()).unwrap();
        assert_eq!(requests.len(), 1);
        let body = &requests[0].body;
        let text = String::from_utf8_lossy(body).to_lowercase();
        assert!(text.contains("name=\"file\""));
        assert!(text.contains("filename=\"frame_000007.jpg\""));
        assert!(text.contains("content-type: image/jpeg"));
        assert!(body.windows(3).any(|w| w == [0xFF, 0xD8, 0xFF]));
        rt.block_on(server.verify());
    }

    #[test]
    fn test_non_success_status_is_upload_error() {
        let rt = Runtime::new().unwrap();
        let server = upload_server(&rt, 503, "bucket offline");

        let result = sink_for(&server).store("job", &frame(1));

        match result {
            Err(StoreError::Upload { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "bucket offline");
            }
            other => panic!("expected upload error, got {other:?}"),
        }
    }

    #[test]
    fn test_each_frame_is_a_separate_request() {
        let rt = Runtime::new().unwrap();
        let server = upload_server(&rt, 201, "");
        let sink = sink_for(&server);

        sink.store("job", &frame(3)).unwrap();
        sink.store("job", &frame(9)).unwrap();

        let requests = rt.block_on(server.received_requests()).unwrap();
        assert_eq!(requests.len(), 2);
        assert!(String::from_utf8_lossy(&requests[1].body).contains("frame_000009.jpg"));
    }

    #[test]
    fn test_unreachable_endpoint_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/upload")).unwrap();
        let sink = HttpUploadSink::new(Arc::new(Client::new()), url);

        assert!(matches!(sink.store("job", &frame(1)), Err(StoreError::Http(_))));
    }

    #[test]
    fn test_bucket_is_url_encoded() {
        let sink = HttpUploadSink::new(
            Arc::new(Client::new()),
            Url::parse("http://localhost/upload").unwrap(),
        );
        assert_eq!(
            sink.url_for("a b").as_str(),
            "http://localhost/upload?bucket=a+b"
        );
    }
}
