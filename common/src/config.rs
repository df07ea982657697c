use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub transform: TransformSettings,
    #[serde(default)]
    pub s3: Option<S3Settings>,
}

/// Locations and tuning knobs for a single transform run.
#[derive(Debug, Deserialize, Clone)]
pub struct TransformSettings {
    pub input_root: String,
    pub output_root: String,
    #[serde(default = "default_catalog_prefix")]
    pub catalog_prefix: String,
    #[serde(default = "default_events_prefix")]
    pub events_prefix: String,
    /// Fraction of malformed records per source above which the run fails.
    #[serde(default = "default_malformed_threshold")]
    pub malformed_threshold: f64,
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance: f64,
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Settings {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    // Both keys absent means the default AWS credential chain is used.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

fn default_catalog_prefix() -> String {
    "song_data".to_string()
}

fn default_events_prefix() -> String {
    "log_data".to_string()
}

fn default_malformed_threshold() -> f64 {
    0.05
}

fn default_duration_tolerance() -> f64 {
    0.01
}

fn default_write_concurrency() -> usize {
    4
}

fn default_read_concurrency() -> usize {
    8
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

impl TransformSettings {
    pub fn new(input_root: impl Into<String>, output_root: impl Into<String>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            catalog_prefix: default_catalog_prefix(),
            events_prefix: default_events_prefix(),
            malformed_threshold: default_malformed_threshold(),
            duration_tolerance: default_duration_tolerance(),
            write_concurrency: default_write_concurrency(),
            read_concurrency: default_read_concurrency(),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.malformed_threshold) {
            return Err(crate::Error::InvalidInput(format!(
                "malformed_threshold must be within [0, 1], got {}",
                self.malformed_threshold
            )));
        }
        if !(self.duration_tolerance >= 0.0) {
            return Err(crate::Error::InvalidInput(format!(
                "duration_tolerance must be non-negative, got {}",
                self.duration_tolerance
            )));
        }
        if self.write_concurrency == 0 || self.read_concurrency == 0 {
            return Err(crate::Error::InvalidInput(
                "write_concurrency and read_concurrency must be at least 1".to_string(),
            ));
        }
        if self.input_root.trim().is_empty() || self.output_root.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "input_root and output_root must be set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Build the configuration
        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            input_root = %settings.transform.input_root,
            output_root = %settings.transform.output_root,
            s3 = settings.s3.is_some(),
            "Loaded transform settings"
        );

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_settings_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[transform]
input_root = "s3://udacity-dend/data"
output_root = "/tmp/star"
malformed_threshold = 0.1

[s3]
endpoint = "http://localhost:9000"
access_key = "minio"
secret_key = "minio123"
"#
        )
        .unwrap();

        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.transform.input_root, "s3://udacity-dend/data");
        assert_eq!(settings.transform.catalog_prefix, "song_data");
        assert_eq!(settings.transform.events_prefix, "log_data");
        assert_eq!(settings.transform.malformed_threshold, 0.1);
        assert_eq!(settings.transform.duration_tolerance, 0.01);
        assert_eq!(settings.transform.write_concurrency, 4);

        let s3 = settings.s3.unwrap();
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.access_key.as_deref(), Some("minio"));
        assert!(settings.transform.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut settings = TransformSettings::new("in", "out");
        settings.malformed_threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = TransformSettings::new("in", "out");
        settings.duration_tolerance = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = TransformSettings::new("in", "out");
        settings.write_concurrency = 0;
        assert!(settings.validate().is_err());
    }
}
