//! Tham số dòng lệnh.

use std::path::PathBuf;

use census_core::condition_from_query;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "census-cli",
    version,
    about = "Thống kê chẩn đoán và bảng chéo giới tính / hình thức nhập viện từ dữ liệu FHIR JSON."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// File cấu hình TOML (mặc định: ./census.toml nếu có).
    #[arg(short, long, global = true, value_name = "FILE", env = "CENSUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Nguồn Condition.json (đường dẫn hoặc URL http/https).
    #[arg(long, global = true, value_name = "SOURCE")]
    pub conditions: Option<String>,

    /// Nguồn Patient.json.
    #[arg(long, global = true, value_name = "SOURCE")]
    pub patients: Option<String>,

    /// Nguồn Encounter.json.
    #[arg(long, global = true, value_name = "SOURCE")]
    pub encounters: Option<String>,

    /// Định dạng đầu ra.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Ghi log chi tiết.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Chỉ ghi log lỗi.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Xếp hạng các chẩn đoán thường gặp nhất.
    Top {
        /// Số chẩn đoán hiển thị (ghi đè cấu hình).
        #[arg(short, long, value_name = "COUNT")]
        limit: Option<usize>,
    },
    /// Bảng chéo giới tính / hình thức nhập viện cho một chẩn đoán.
    Drilldown {
        /// Tên chẩn đoán, khớp chính xác và phân biệt hoa thường.
        #[arg(long, value_name = "NAME", required_unless_present = "query")]
        condition: Option<String>,

        /// Chuỗi truy vấn của liên kết (ví dụ `?condition=Sepsis`).
        #[arg(long, value_name = "QUERY", conflicts_with = "condition")]
        query: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Mức log theo cờ `-v` / `-q`.
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::ERROR
        } else {
            Level::INFO
        }
    }
}

/// Tên chẩn đoán của lệnh `drilldown`: `--condition` trước, sau đó `--query`.
pub fn selected_condition(condition: Option<&str>, query: Option<&str>) -> Option<String> {
    condition
        .map(str::to_string)
        .or_else(|| query.and_then(condition_from_query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drilldown_accepts_query() {
        let args = Args::try_parse_from([
            "census-cli",
            "drilldown",
            "--query",
            "?condition=Sepsis",
            "--format",
            "json",
        ])
        .expect("parse args");

        assert_eq!(args.format, OutputFormat::Json);
        assert!(matches!(
            args.command,
            Command::Drilldown { condition: None, query: Some(ref q) } if q == "?condition=Sepsis"
        ));
    }

    #[test]
    fn drilldown_requires_condition_or_query() {
        assert!(Args::try_parse_from(["census-cli", "drilldown"]).is_err());
        assert!(Args::try_parse_from([
            "census-cli",
            "drilldown",
            "--condition",
            "Sepsis",
            "--query",
            "condition=Sepsis",
        ])
        .is_err());
    }

    #[test]
    fn verbose_raises_log_level() {
        let args =
            Args::try_parse_from(["census-cli", "top", "-v", "--limit", "5"]).expect("parse args");
        assert_eq!(args.log_level(), Level::DEBUG);
        assert!(matches!(args.command, Command::Top { limit: Some(5) }));
    }

    #[test]
    fn selected_condition_prefers_flag_then_query() {
        assert_eq!(
            selected_condition(Some("Sepsis"), None).as_deref(),
            Some("Sepsis")
        );
        assert_eq!(
            selected_condition(None, Some("?condition=Acute+%26+chronic+pain")).as_deref(),
            Some("Acute & chronic pain")
        );
        assert_eq!(selected_condition(None, Some("?page=2")), None);
        assert_eq!(selected_condition(None, None), None);
    }
}
