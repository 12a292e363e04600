//! Tải các tài liệu JSON (file cục bộ hoặc URL) trước khi tổng hợp.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use census_core::CensusError;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::SourcesConfig;

/// Nơi chứa một tài liệu xuất ra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    File(PathBuf),
    Url(String),
}

impl FromStr for DataSource {
    type Err = CensusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CensusError::InvalidSource("nguồn dữ liệu rỗng".to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Url(trimmed.to_string()))
        } else if lower.contains("://") {
            Err(CensusError::InvalidSource(format!(
                "giao thức không được hỗ trợ: {trimmed}"
            )))
        } else {
            Ok(Self::File(PathBuf::from(trimmed)))
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Ba tài liệu cần cho trang chi tiết.
#[derive(Debug, Clone, PartialEq)]
pub struct DrilldownDocuments {
    pub conditions: Vec<Value>,
    pub patients: Vec<Value>,
    pub encounters: Vec<Value>,
}

pub struct Loader {
    http_client: reqwest::Client,
}

impl Loader {
    pub fn new(timeout: Duration) -> Result<Self, CensusError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CensusError::Fetch {
                location: "http client".to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self { http_client })
    }

    /// Tải một tài liệu và kiểm tra nó là mảng resource.
    pub async fn fetch_document(&self, source: &DataSource) -> Result<Vec<Value>, CensusError> {
        let body = match source {
            DataSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|err| fetch_error(source, err))?
            }
            DataSource::Url(url) => self.fetch_url(source, url).await?,
        };

        let records = census_fhir::parse_records(&body).map_err(|err| match err {
            CensusError::Parse(reason) => CensusError::Parse(format!("{source}: {reason}")),
            other => other,
        })?;

        debug!(source = %source, records = records.len(), "Loaded document");
        Ok(records)
    }

    async fn fetch_url(&self, source: &DataSource, url: &str) -> Result<String, CensusError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|err| fetch_error(source, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(source, format!("HTTP {status}")));
        }

        response.text().await.map_err(|err| fetch_error(source, err))
    }

    /// Trang tổng quan chỉ cần Condition.json.
    pub async fn load_conditions(&self, sources: &SourcesConfig) -> Result<Vec<Value>, CensusError> {
        let source: DataSource = sources.conditions.parse()?;
        self.fetch_document(&source).await.inspect_err(|err| {
            error!("Error fetching Condition document: {err}");
        })
    }

    /// Tải song song ba tài liệu; lỗi ở bất kỳ tài liệu nào hủy cả lượt tải.
    pub async fn load_drilldown(
        &self,
        sources: &SourcesConfig,
    ) -> Result<DrilldownDocuments, CensusError> {
        let conditions: DataSource = sources.conditions.parse()?;
        let patients: DataSource = sources.patients.parse()?;
        let encounters: DataSource = sources.encounters.parse()?;

        let (conditions, patients, encounters) = tokio::try_join!(
            self.fetch_document(&conditions),
            self.fetch_document(&patients),
            self.fetch_document(&encounters),
        )
        .inspect_err(|err| error!("Error fetching details: {err}"))?;

        Ok(DrilldownDocuments {
            conditions,
            patients,
            encounters,
        })
    }
}

fn fetch_error(source: &DataSource, reason: impl fmt::Display) -> CensusError {
    CensusError::Fetch {
        location: source.to_string(),
        reason: reason.to_string(),
    }
}
