use std::fs;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::ObjectStoreTarget;
use crate::domain::CellSets;
use crate::error::MigrationError;

/// Bucket holding one cell-set document per experiment id.
pub trait ObjectStore: Send + Sync {
    fn list_keys(&self) -> Result<Vec<String>, MigrationError>;
    fn get_object(&self, key: &str) -> Result<Vec<u8>, MigrationError>;
    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), MigrationError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn list_keys(&self) -> Result<Vec<String>, MigrationError> {
        (**self).list_keys()
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, MigrationError> {
        (**self).get_object(key)
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), MigrationError> {
        (**self).put_object(key, body)
    }
}

pub fn read_cell_sets(store: &dyn ObjectStore, key: &str) -> Result<CellSets, MigrationError> {
    let body = store.get_object(key)?;
    serde_json::from_slice(&body)
        .map_err(|err| MigrationError::Decode(format!("cell sets {key}: {err}")))
}

/// Overwrites the whole document in a single put.
pub fn write_cell_sets(
    store: &dyn ObjectStore,
    key: &str,
    cell_sets: &CellSets,
) -> Result<(), MigrationError> {
    let body = serde_json::to_vec(cell_sets)
        .map_err(|err| MigrationError::Decode(format!("cell sets {key}: {err}")))?;
    store.put_object(key, &body)
}

pub fn open(target: &ObjectStoreTarget) -> Result<Box<dyn ObjectStore>, MigrationError> {
    match target {
        ObjectStoreTarget::Directory(root) => Ok(Box::new(DirectoryObjectStore::new(root.clone()))),
        ObjectStoreTarget::Endpoint {
            endpoint,
            region,
            bucket,
        } => Ok(Box::new(S3HttpClient::new(endpoint, region, bucket)?)),
    }
}

/// Local mirror of a bucket: one file per object key.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: Utf8PathBuf,
}

impl DirectoryObjectStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<Utf8PathBuf, MigrationError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(MigrationError::MalformedReference(format!(
                "invalid object key: {key:?}"
            )));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for DirectoryObjectStore {
    fn list_keys(&self) -> Result<Vec<String>, MigrationError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MigrationError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, MigrationError> {
        let path = self.object_path(key)?;
        if !path.as_std_path().exists() {
            return Err(MigrationError::not_found("object", key));
        }
        fs::read(path.as_std_path()).map_err(|err| MigrationError::Filesystem(err.to_string()))
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), MigrationError> {
        let path = self.object_path(key)?;
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".cellset-object")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        temp.write_all(body)
            .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Path-style client for an S3-compatible endpoint that accepts unsigned
/// requests, such as a local emulator or a pre-authorized gateway.
#[derive(Clone)]
pub struct S3HttpClient {
    client: Client,
    endpoint: Url,
    region: String,
    bucket: String,
}

impl S3HttpClient {
    pub fn new(endpoint: &str, region: &str, bucket: &str) -> Result<Self, MigrationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cellset-migrate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MigrationError::StorageHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| MigrationError::StorageHttp(err.to_string()))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|err| MigrationError::InvalidConfig(format!("endpoint {endpoint}: {err}")))?;

        Ok(Self {
            client,
            endpoint,
            region: region.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn url(&self, key: Option<&str>) -> Result<Url, MigrationError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                MigrationError::InvalidConfig(format!("endpoint {} cannot be a base", self.endpoint))
            })?;
            segments.pop_if_empty().push(&self.bucket);
            if let Some(key) = key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    fn check_status(
        response: reqwest::blocking::Response,
        key: &str,
    ) -> Result<reqwest::blocking::Response, MigrationError> {
        let status = response.status().as_u16();
        if status == 404 {
            return Err(MigrationError::not_found("object", key));
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "object storage request failed".to_string());
            return Err(MigrationError::StorageStatus { status, message });
        }
        Ok(response)
    }
}

impl ObjectStore for S3HttpClient {
    fn list_keys(&self) -> Result<Vec<String>, MigrationError> {
        let url = self.url(None)?;
        let keys = collect_listing(|continuation| {
            let mut request = self.client.get(url.clone()).query(&[("list-type", "2")]);
            if let Some(token) = continuation {
                request = request.query(&[("continuation-token", token)]);
            }
            let response = request
                .send()
                .map_err(|err| MigrationError::StorageHttp(err.to_string()))?;
            Self::check_status(response, &self.bucket)?
                .text()
                .map_err(|err| MigrationError::StorageHttp(err.to_string()))
        })?;
        tracing::debug!(bucket = %self.bucket, region = %self.region, count = keys.len(), "listed objects");
        Ok(keys)
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, MigrationError> {
        let response = self
            .client
            .get(self.url(Some(key))?)
            .send()
            .map_err(|err| MigrationError::StorageHttp(err.to_string()))?;
        let bytes = Self::check_status(response, key)?
            .bytes()
            .map_err(|err| MigrationError::StorageHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), MigrationError> {
        let response = self
            .client
            .put(self.url(Some(key))?)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|err| MigrationError::StorageHttp(err.to_string()))?;
        Self::check_status(response, key)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListEntry>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextContinuationToken", default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = "Key")]
    key: String,
}

/// Follows continuation tokens until a page reports it is complete.
fn collect_listing<F>(mut fetch_page: F) -> Result<Vec<String>, MigrationError>
where
    F: FnMut(Option<&str>) -> Result<String, MigrationError>,
{
    let mut keys = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = parse_list_objects(&fetch_page(continuation.as_deref())?)?;
        keys.extend(page.contents.into_iter().map(|entry| entry.key));
        if !page.is_truncated {
            return Ok(keys);
        }
        match page.next_continuation_token {
            Some(token) => continuation = Some(token),
            None => {
                return Err(MigrationError::Decode(
                    "truncated listing without continuation token".to_string(),
                ));
            }
        }
    }
}

fn parse_list_objects(xml: &str) -> Result<ListBucketResult, MigrationError> {
    quick_xml::de::from_str(xml)
        .map_err(|err| MigrationError::Decode(format!("ListObjectsV2 response: {err}")))
}
