//! Parsing of input and output location strings.

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Where a file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// An object in an S3-compatible bucket, `s3://bucket/key`.
    S3 { bucket: String, key: String },

    /// A file served over plain HTTP(S). `base_url` is scheme and authority,
    /// `path` the rest of the URL without the leading slash.
    Http { base_url: String, path: String },

    /// A file on the local filesystem, given as a path or `file://` URL.
    Local(PathBuf),
}

impl Location {
    /// Returns true for object storage locations, the only kind that honors
    /// an alternate endpoint.
    #[must_use]
    pub const fn is_object_storage(&self) -> bool {
        matches!(self, Self::S3 { .. })
    }
}

impl FromStr for Location {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .with_context(|| format!("S3 location '{s}' has no object key"))?;
            if bucket.is_empty() || key.is_empty() {
                bail!("S3 location '{s}' must look like s3://bucket/key");
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            let authority_start = s.find("://").map_or(0, |i| i + 3);
            let path_start = s[authority_start..]
                .find('/')
                .map(|i| authority_start + i)
                .with_context(|| format!("HTTP location '{s}' has no file path"))?;
            let path = &s[path_start + 1..];
            if path.is_empty() {
                bail!("HTTP location '{s}' has no file path");
            }
            return Ok(Self::Http {
                base_url: s[..path_start].to_string(),
                path: path.to_string(),
            });
        }

        if let Some(rest) = s.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(rest)));
        }

        if let Some((scheme, _)) = s.split_once("://") {
            bail!("Unsupported location scheme '{scheme}' in '{s}'");
        }

        if s.is_empty() {
            bail!("Location is empty");
        }

        Ok(Self::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Http { base_url, path } => write!(f, "{base_url}/{path}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3() {
        let location: Location =
            "s3://nyc-duration-prediction-alexey/taxi_type=fhv/year=2021/month=02/predictions.parquet"
                .parse()
                .unwrap();

        assert_eq!(
            location,
            Location::S3 {
                bucket: "nyc-duration-prediction-alexey".to_string(),
                key: "taxi_type=fhv/year=2021/month=02/predictions.parquet".to_string(),
            }
        );
        assert!(location.is_object_storage());
    }

    #[test]
    fn test_parse_https() {
        let location: Location =
            "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2021-02.parquet"
                .parse()
                .unwrap();

        assert_eq!(
            location,
            Location::Http {
                base_url: "https://d37ci6vzurychx.cloudfront.net".to_string(),
                path: "trip-data/yellow_tripdata_2021-02.parquet".to_string(),
            }
        );
        assert!(!location.is_object_storage());
    }

    #[test]
    fn test_parse_local() {
        assert_eq!(
            "data/in.parquet".parse::<Location>().unwrap(),
            Location::Local(PathBuf::from("data/in.parquet"))
        );
        assert_eq!(
            "file:///tmp/in.parquet".parse::<Location>().unwrap(),
            Location::Local(PathBuf::from("/tmp/in.parquet"))
        );
    }

    #[test]
    fn test_display_round_trips_remote_locations() {
        for raw in [
            "s3://bucket/a/b.parquet",
            "http://localhost:8000/files/b.parquet",
        ] {
            assert_eq!(raw.parse::<Location>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed_locations() {
        assert!("s3://bucket-only".parse::<Location>().is_err());
        assert!("s3:///key".parse::<Location>().is_err());
        assert!("https://host-only".parse::<Location>().is_err());
        assert!("https://host/".parse::<Location>().is_err());
        assert!("gs://bucket/key".parse::<Location>().is_err());
        assert!("".parse::<Location>().is_err());
    }
}
