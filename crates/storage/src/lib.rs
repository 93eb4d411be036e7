//! Reads and writes whole files through `object_store`.
//!
//! A location string is parsed into a [`Location`], which is resolved to a
//! store and an object path. `s3://` locations go through the configured
//! alternate endpoint when one is set; HTTP and local locations always use
//! default resolution.

mod location;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::aws::AmazonS3Builder;
use object_store::http::HttpBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectStorePath;
use tracing::debug;

pub use location::Location;

/// Static S3 credentials, used instead of the `AWS_*` environment.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Options that change how locations are resolved.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Alternate endpoint for `s3://` locations.
    pub endpoint_url: Option<String>,

    /// Credentials for `s3://` locations. When unset they come from the
    /// environment.
    pub credentials: Option<S3Credentials>,
}

impl StorageOptions {
    #[must_use]
    pub fn with_endpoint(endpoint_url: Option<String>) -> Self {
        Self {
            endpoint_url,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: S3Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Resolves a location to the store that holds it and the object path
/// inside that store.
///
/// Local locations are rooted at the file's parent directory, which must
/// exist.
///
/// # Errors
///
/// Returns an error if the store cannot be built or the path is invalid.
pub fn open_store(
    location: &Location,
    options: &StorageOptions,
) -> Result<(Arc<dyn ObjectStore>, ObjectStorePath)> {
    if options.endpoint_url.is_some() && !location.is_object_storage() {
        debug!(%location, "Alternate endpoint does not apply, using default resolution");
    }

    match location {
        Location::S3 { bucket, key } => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

            if let Some(credentials) = &options.credentials {
                builder = builder
                    .with_access_key_id(&credentials.access_key_id)
                    .with_secret_access_key(&credentials.secret_access_key);
            }

            if let Some(endpoint) = &options.endpoint_url {
                debug!(%endpoint, %bucket, "Using alternate S3 endpoint");
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"))
                    .with_virtual_hosted_style_request(false);
            }

            let store = builder
                .build()
                .with_context(|| format!("Failed to create S3 store for bucket '{bucket}'"))?;
            let path = ObjectStorePath::parse(key)
                .with_context(|| format!("Invalid S3 object key '{key}'"))?;

            Ok((Arc::new(store), path))
        }
        Location::Http { base_url, path } => {
            let store = HttpBuilder::new()
                .with_url(base_url.as_str())
                .build()
                .with_context(|| format!("Failed to create HTTP store for '{base_url}'"))?;
            let path = ObjectStorePath::from_url_path(path)
                .with_context(|| format!("Invalid URL path '{path}'"))?;

            Ok((Arc::new(store), path))
        }
        Location::Local(file) => {
            let (parent, file_name) = split_local_path(file)?;
            let store = LocalFileSystem::new_with_prefix(parent).with_context(|| {
                format!("Failed to open local directory '{}'", parent.display())
            })?;

            Ok((Arc::new(store), ObjectStorePath::from(file_name)))
        }
    }
}

/// Splits a local file path into its directory and file name.
fn split_local_path(file: &Path) -> Result<(&Path, &str)> {
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Local location '{}' has no file name", file.display()))?;

    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    Ok((parent, file_name))
}

/// Reads an entire object and returns its bytes.
///
/// # Errors
///
/// Returns an error if the location is malformed or reading fails.
pub async fn read_location(location: &str, options: &StorageOptions) -> Result<Bytes> {
    let parsed: Location = location.parse()?;
    let (store, path) = open_store(&parsed, options)?;

    debug!(%parsed, "Reading object");

    store
        .get(&path)
        .await
        .with_context(|| format!("Failed to read '{location}'"))?
        .bytes()
        .await
        .with_context(|| format!("Failed to read bytes from '{location}'"))
}

/// Writes `data` as the whole object at `location`, replacing anything
/// already stored there.
///
/// # Errors
///
/// Returns an error if the location is malformed or writing fails.
pub async fn write_location(location: &str, options: &StorageOptions, data: Bytes) -> Result<()> {
    let parsed: Location = location.parse()?;

    if let Location::Local(file) = &parsed {
        let (parent, _) = split_local_path(file)?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }

    let (store, path) = open_store(&parsed, options)?;

    debug!(%parsed, bytes = data.len(), "Writing object");

    store
        .put(&path, data.into())
        .await
        .with_context(|| format!("Failed to write '{location}'"))?;

    Ok(())
}
