//! Settings for the duration prediction job, loaded from environment variables.
//!
//! Input and output locations are rendered from templates that take the
//! batch `year` and `month`. Both templates can be overridden through the
//! environment, which is how the job is pointed at local files or a test
//! object store.

use std::path::PathBuf;
use std::sync::LazyLock;

use thiserror::Error;

/// Template for the monthly trip data file.
pub const DEFAULT_INPUT_PATTERN: &str =
    "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_{year:04d}-{month:02d}.parquet";

/// Template for the predictions file.
pub const DEFAULT_OUTPUT_PATTERN: &str = "s3://nyc-duration-prediction-alexey/taxi_type=fhv/year={year:04d}/month={month:02d}/predictions.parquet";

/// Model artifact read when `MODEL_PATH` is not set.
pub const DEFAULT_MODEL_PATH: &str = "model.bin";

/// Global settings instance, lazily read from the environment.
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::from_env);

/// Errors raised while rendering a [`FilePattern`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The template names a field other than `year` or `month`.
    #[error("unknown field '{0}' in file pattern")]
    UnknownField(String),

    /// The format spec is not an integer spec like `04d`.
    #[error("unsupported format spec '{spec}' for field '{field}'")]
    UnsupportedFormat { field: String, spec: String },

    /// A `{` or `}` that is neither escaped nor part of a placeholder.
    #[error("unbalanced brace at byte {0} in file pattern")]
    UnbalancedBrace(usize),
}

/// A location template with `{year}` and `{month}` placeholders.
///
/// Placeholders accept an integer format spec: `{month:02d}` pads with
/// zeros to width 2, `{year:6d}` pads with spaces, `{year}` and
/// `{year:d}` print the bare number. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern(String);

impl FilePattern {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the template for the given batch.
    ///
    /// Year and month are not range checked; a month of 13 renders as `13`
    /// and the bad location surfaces when it is fetched.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the template is malformed.
    pub fn render(&self, year: i64, month: i64) -> Result<String, PatternError> {
        let mut out = String::with_capacity(self.0.len() + 8);
        let mut chars = self.0.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                    chars.next();
                    out.push('}');
                }
                '}' => return Err(PatternError::UnbalancedBrace(pos)),
                '{' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        if inner == '{' {
                            return Err(PatternError::UnbalancedBrace(pos));
                        }
                        placeholder.push(inner);
                    }
                    if !closed {
                        return Err(PatternError::UnbalancedBrace(pos));
                    }

                    let (field, spec) = placeholder
                        .split_once(':')
                        .unwrap_or((placeholder.as_str(), ""));
                    let value = match field {
                        "year" => year,
                        "month" => month,
                        other => return Err(PatternError::UnknownField(other.to_string())),
                    };
                    out.push_str(&format_integer(field, spec, value)?);
                }
                c => out.push(c),
            }
        }

        Ok(out)
    }
}

/// Formats `value` according to an integer spec of the form `[0][width][d]`.
fn format_integer(field: &str, spec: &str, value: i64) -> Result<String, PatternError> {
    let unsupported = || PatternError::UnsupportedFormat {
        field: field.to_string(),
        spec: spec.to_string(),
    };

    let digits = spec.strip_suffix('d').unwrap_or(spec);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(unsupported());
    }

    let (zero_pad, width) = match digits.strip_prefix('0') {
        Some(rest) => (true, rest),
        None => (false, digits),
    };
    let width: usize = if width.is_empty() {
        0
    } else {
        width.parse().map_err(|_| unsupported())?
    };

    Ok(if zero_pad {
        format!("{value:0width$}")
    } else {
        format!("{value:width$}")
    })
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Template for the input trip data location.
    pub input_pattern: FilePattern,

    /// Template for the output predictions location.
    pub output_pattern: FilePattern,

    /// Alternate endpoint for `s3://` locations, e.g. a localstack URL.
    /// An empty `S3_ENDPOINT_URL` counts as unset.
    pub s3_endpoint_url: Option<String>,

    /// Local path of the model artifact.
    pub model_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_pattern: FilePattern::new(DEFAULT_INPUT_PATTERN),
            output_pattern: FilePattern::new(DEFAULT_OUTPUT_PATTERN),
            s3_endpoint_url: None,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl Settings {
    /// Loads settings from environment variables.
    ///
    /// Optional environment variables:
    /// - `INPUT_FILE_PATTERN`: overrides the input location template
    /// - `OUTPUT_FILE_PATTERN`: overrides the output location template
    /// - `S3_ENDPOINT_URL`: routes `s3://` reads and writes through this endpoint
    /// - `MODEL_PATH`: model artifact path (default: `model.bin`)
    ///
    /// A `.env` file in the working directory is loaded first if present.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from a variable lookup, falling back to the defaults
    /// for every variable the lookup does not return.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            input_pattern: lookup("INPUT_FILE_PATTERN")
                .map_or(defaults.input_pattern, FilePattern::new),
            output_pattern: lookup("OUTPUT_FILE_PATTERN")
                .map_or(defaults.output_pattern, FilePattern::new),
            s3_endpoint_url: lookup("S3_ENDPOINT_URL").filter(|url| !url.is_empty()),
            model_path: lookup("MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
        }
    }

    /// Resolves the input location for a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the input template is malformed.
    pub fn input_path(&self, year: i64, month: i64) -> Result<String, PatternError> {
        self.input_pattern.render(year, month)
    }

    /// Resolves the output location for a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the output template is malformed.
    pub fn output_path(&self, year: i64, month: i64) -> Result<String, PatternError> {
        self.output_pattern.render(year, month)
    }
}
