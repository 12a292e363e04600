//! Đọc file cấu hình `census.toml` và gộp với tham số dòng lệnh.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use census_core::CensusConfig;
use serde::{Deserialize, Serialize};

use crate::cli::{Args, Command};

/// Tên file cấu hình tìm trong thư mục hiện tại.
pub const DEFAULT_CONFIG_FILE: &str = "census.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub census: CensusConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// Vị trí ba tài liệu xuất ra (đường dẫn hoặc URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcesConfig {
    #[serde(default = "default_conditions")]
    pub conditions: String,
    #[serde(default = "default_patients")]
    pub patients: String,
    #[serde(default = "default_encounters")]
    pub encounters: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            conditions: default_conditions(),
            patients: default_patients(),
            encounters: default_encounters(),
        }
    }
}

fn default_conditions() -> String {
    "../data/mimic-fhir/Condition.json".to_string()
}

fn default_patients() -> String {
    "../data/mimic-fhir/Patient.json".to_string()
}

fn default_encounters() -> String {
    "../data/mimic-fhir/Encounter.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    /// Thời gian chờ tối đa cho mỗi yêu cầu HTTP.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Đọc cấu hình từ file TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Không đọc được file cấu hình {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("File cấu hình không hợp lệ {}", path.display()))
    }

    /// File được chỉ định phải tồn tại; nếu không chỉ định thì thử `census.toml`,
    /// không có thì dùng mặc định.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }

    /// Tham số dòng lệnh ưu tiên hơn file cấu hình.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(conditions) = &args.conditions {
            self.sources.conditions = conditions.clone();
        }
        if let Some(patients) = &args.patients {
            self.sources.patients = patients.clone();
        }
        if let Some(encounters) = &args.encounters {
            self.sources.encounters = encounters.clone();
        }
        if let Command::Top { limit: Some(limit) } = args.command {
            self.census.top_n = limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sources]
            conditions = "https://example.org/export/Condition.json"

            [census]
            top_n = 5
            "#,
        )
        .expect("parse config");

        assert_eq!(
            config.sources.conditions,
            "https://example.org/export/Condition.json"
        );
        assert_eq!(config.sources.patients, "../data/mimic-fhir/Patient.json");
        assert_eq!(config.census.top_n, 5);
        assert_eq!(config.census.fallback_label, "Unknown");
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[http]\ntimeout_seconds = 5").expect("write config");

        let config = Config::load_or_default(Some(file.path())).expect("load config");
        assert_eq!(config.http.timeout_seconds, 5);
        assert_eq!(config.sources, SourcesConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(Config::load_or_default(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn args_override_file_values() {
        let args = Args::try_parse_from([
            "census-cli",
            "top",
            "--limit",
            "3",
            "--conditions",
            "/tmp/Condition.json",
        ])
        .expect("parse args");

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.sources.conditions, "/tmp/Condition.json");
        assert_eq!(config.sources.encounters, "../data/mimic-fhir/Encounter.json");
        assert_eq!(config.census.top_n, 3);
    }
}
