// Record submission and status lookup endpoints

use serde::Serialize;
use std::io;

use crate::error::Result;
use crate::http_client::{CoreApiClient, RequestOptions};
use crate::transport::{ApiResponse, FileUpload, Part};

const RECORD_PATH: &str = "/poa/";
const RECORD_WITH_FILE_PATH: &str = "/poe/";
const STATUSES_PATH: &str = "/transaction/statuses/";

impl CoreApiClient {
    /// POST `data` as JSON to the versioned record endpoint
    pub async fn submit_record<T: Serialize + ?Sized>(&self, data: &T) -> Result<ApiResponse> {
        let url = self.get_api_url(RECORD_PATH)?;
        tracing::debug!("Submitting record to {}", url);
        self.post(url.as_str(), RequestOptions::new().json(data)?)
            .await
    }

    /// POST a multipart form: `data` carries the JSON-encoded record, `file` the upload
    pub async fn submit_record_with_file<T: Serialize + ?Sized>(
        &self,
        data: &T,
        file: FileUpload,
    ) -> Result<ApiResponse> {
        let url = self.get_api_url(RECORD_WITH_FILE_PATH)?;
        tracing::debug!(
            file_name = %file.file_name,
            size = file.bytes.len(),
            "Submitting record with file to {}",
            url
        );

        let parts = vec![
            Part::Text {
                name: "data".to_string(),
                value: to_spaced_json(data)?,
            },
            Part::File {
                name: "file".to_string(),
                file,
            },
        ];
        self.post(url.as_str(), RequestOptions::new().multipart(parts))
            .await
    }

    /// GET statuses for `ids`; an empty slice sends `request_ids=`
    pub async fn get_statuses<S: AsRef<str>>(&self, ids: &[S]) -> Result<ApiResponse> {
        let url = self.get_api_url(STATUSES_PATH)?;
        let request_ids = ids
            .iter()
            .map(|id| id.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        self.get(url.as_str(), RequestOptions::new().query("request_ids", request_ids))
            .await
    }
}

/// `", "` and `": "` separators, matching what the API's other clients send
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn to_spaced_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    data.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
