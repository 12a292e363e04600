//! Kiểu dữ liệu lõi cho thống kê chẩn đoán và bảng chéo giới tính / hình thức nhập viện.

use std::collections::{hash_map::Entry, HashMap};

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Số chẩn đoán mặc định trên biểu đồ tổng quan.
pub const DEFAULT_TOP_N: usize = 10;

/// Nhãn mặc định khi thiếu giới tính hoặc hình thức nhập viện.
pub const DEFAULT_FALLBACK_LABEL: &str = "Unknown";

/// Tên tham số truy vấn dùng khi chuyển sang trang chi tiết.
pub const CONDITION_QUERY_PARAM: &str = "condition";

/// Cấu hình xếp hạng và nhãn thay thế.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CensusConfig {
    /// Số chẩn đoán giữ lại sau khi xếp hạng.
    pub top_n: usize,
    /// Nhãn dùng khi bản ghi không có giới tính hoặc mã hình thức nhập viện.
    pub fallback_label: String,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_string(),
        }
    }
}

/// Cặp tham chiếu mẫu (bệnh nhân, lượt khám) của một chẩn đoán.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExemplarReference {
    pub subject: Option<String>,
    pub encounter: Option<String>,
}

/// Một dòng trong bảng xếp hạng chẩn đoán.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionFrequency {
    pub name: String,
    pub count: u32,
    pub details: ExemplarReference,
}

/// Bảng tần suất theo nhãn, giữ thứ tự xuất hiện đầu tiên.
///
/// Mỗi nhãn chỉ giữ một tham chiếu mẫu: lần ghi nhận sau ghi đè lần trước.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<ConditionFrequency>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tăng bộ đếm của nhãn và thay tham chiếu mẫu.
    pub fn record(&mut self, label: &str, exemplar: ExemplarReference) {
        match self.index.entry(label.to_string()) {
            Entry::Occupied(slot) => {
                let entry = &mut self.entries[*slot.get()];
                entry.count = entry.count.saturating_add(1);
                entry.details = exemplar;
            }
            Entry::Vacant(slot) => {
                slot.insert(self.entries.len());
                self.entries.push(ConditionFrequency {
                    name: label.to_string(),
                    count: 1,
                    details: exemplar,
                });
            }
        }
    }

    pub fn count(&self, label: &str) -> Option<u32> {
        self.index.get(label).map(|&pos| self.entries[pos].count)
    }

    pub fn exemplar(&self, label: &str) -> Option<&ExemplarReference> {
        self.index.get(label).map(|&pos| &self.entries[pos].details)
    }

    /// Số nhãn phân biệt.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tổng số lần ghi nhận của mọi nhãn.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|entry| u64::from(entry.count)).sum()
    }

    /// Duyệt theo thứ tự xuất hiện đầu tiên.
    pub fn iter(&self) -> impl Iterator<Item = &ConditionFrequency> {
        self.entries.iter()
    }

    /// Xếp hạng giảm dần theo số lần, giữ nguyên thứ tự xuất hiện khi bằng nhau,
    /// rồi cắt còn `limit` mục.
    pub fn into_ranked(self, limit: usize) -> Vec<ConditionFrequency> {
        let mut ranked = self.entries;
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(limit);
        ranked
    }
}

/// Bảng chéo hai chiều (giới tính -> hình thức nhập viện -> số lượng).
///
/// Khóa ở cả hai cấp giữ thứ tự xuất hiện đầu tiên.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossTabulation {
    rows: Vec<(String, Vec<(String, u32)>)>,
}

impl CrossTabulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tăng ô `[primary][secondary]`, khởi tạo nếu chưa có.
    pub fn increment(&mut self, primary: &str, secondary: &str) {
        let row = match self.rows.iter().position(|(key, _)| key == primary) {
            Some(pos) => pos,
            None => {
                self.rows.push((primary.to_string(), Vec::new()));
                self.rows.len() - 1
            }
        };

        let cells = &mut self.rows[row].1;
        match cells.iter_mut().find(|(key, _)| key == secondary) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => cells.push((secondary.to_string(), 1)),
        }
    }

    pub fn get(&self, primary: &str, secondary: &str) -> Option<u32> {
        self.row(primary)?
            .iter()
            .find(|(key, _)| key == secondary)
            .map(|(_, count)| *count)
    }

    /// Các ô của một giới tính, theo thứ tự xuất hiện.
    pub fn row(&self, primary: &str) -> Option<&[(String, u32)]> {
        self.rows
            .iter()
            .find(|(key, _)| key == primary)
            .map(|(_, cells)| cells.as_slice())
    }

    /// Các giá trị giới tính (trục X của biểu đồ nhóm).
    pub fn primaries(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(key, _)| key.as_str())
    }

    /// Hợp các hình thức nhập viện, theo thứ tự xuất hiện đầu tiên (chú giải màu).
    pub fn secondaries(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for (_, cells) in &self.rows {
            for (key, _) in cells {
                if !seen.contains(&key.as_str()) {
                    seen.push(key);
                }
            }
        }
        seen
    }

    /// Các dòng phẳng (giới tính, hình thức, số lượng) cho bảng chi tiết.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.rows.iter().flat_map(|(primary, cells)| {
            cells
                .iter()
                .map(move |(secondary, count)| (primary.as_str(), secondary.as_str(), *count))
        })
    }

    pub fn total(&self) -> u64 {
        self.cells().map(|(_, _, count)| u64::from(count)).sum()
    }

    /// Giá trị lớn nhất (miền trục Y).
    pub fn max_count(&self) -> Option<u32> {
        self.cells().map(|(_, _, count)| count).max()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Serialize for CrossTabulation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for (primary, cells) in &self.rows {
            map.serialize_entry(primary, &OrderedCounts(cells))?;
        }
        map.end()
    }
}

struct OrderedCounts<'a>(&'a [(String, u32)]);

impl Serialize for OrderedCounts<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, count) in self.0 {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// Kết quả tổng quan: bảng xếp hạng chẩn đoán.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConditionOverview {
    pub generated_at: DateTime<Utc>,
    pub records_scanned: usize,
    pub distinct_conditions: usize,
    pub conditions: Vec<ConditionFrequency>,
}

impl ConditionOverview {
    /// Khởi tạo từ bảng tần suất đã đếm xong.
    pub fn new(records_scanned: usize, table: FrequencyTable, config: &CensusConfig) -> Self {
        let distinct_conditions = table.len();
        Self {
            generated_at: Utc::now(),
            records_scanned,
            distinct_conditions,
            conditions: table.into_ranked(config.top_n),
        }
    }
}

/// Kết quả chi tiết cho một chẩn đoán.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConditionBreakdown {
    pub generated_at: DateTime<Utc>,
    pub condition: String,
    pub matched_conditions: usize,
    pub matched_patients: usize,
    pub matched_encounters: usize,
    pub cross_tab: CrossTabulation,
}

impl ConditionBreakdown {
    pub fn new(
        condition: &str,
        matched_conditions: usize,
        matched_patients: usize,
        matched_encounters: usize,
        cross_tab: CrossTabulation,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            condition: condition.to_string(),
            matched_conditions,
            matched_patients,
            matched_encounters,
            cross_tab,
        }
    }
}

/// Trạng thái kết thúc của trang chi tiết.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrilldownOutcome {
    /// Không có bản ghi nào khớp chẩn đoán. Không phải lỗi.
    NoData { condition: String },
    Found(ConditionBreakdown),
}

impl DrilldownOutcome {
    pub fn breakdown(&self) -> Option<&ConditionBreakdown> {
        match self {
            Self::Found(breakdown) => Some(breakdown),
            Self::NoData { .. } => None,
        }
    }
}

/// Lỗi chung khi tải và tổng hợp dữ liệu.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error("Không tải được dữ liệu từ {location}: {reason}")]
    Fetch { location: String, reason: String },
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
    #[error("Nguồn dữ liệu không hợp lệ: {0}")]
    InvalidSource(String),
}

/// Lấy id từ tham chiếu dạng `"Type/id"` (phần sau dấu `/` đầu tiên).
pub fn reference_id(reference: &str) -> Option<&str> {
    let (_, id) = reference.split_once('/')?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Tạo chuỗi truy vấn `condition=...` đã mã hóa phần trăm.
pub fn drilldown_query(condition: &str) -> Result<String, CensusError> {
    serde_urlencoded::to_string(&[(CONDITION_QUERY_PARAM, condition)])
        .map_err(|err| CensusError::Parse(err.to_string()))
}

/// Đọc giá trị `condition` từ chuỗi truy vấn (có hoặc không có tiền tố `?`, hoặc cả URL).
///
/// Nếu tham số lặp lại, lấy giá trị đầu tiên.
pub fn condition_from_query(query: &str) -> Option<String> {
    let query = query.split_once('?').map_or(query, |(_, rest)| rest);
    let query = query.split_once('#').map_or(query, |(head, _)| head);

    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == CONDITION_QUERY_PARAM)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exemplar(subject: &str, encounter: &str) -> ExemplarReference {
        ExemplarReference {
            subject: Some(subject.to_string()),
            encounter: Some(encounter.to_string()),
        }
    }

    #[test]
    fn frequency_table_keeps_last_exemplar() {
        let mut table = FrequencyTable::new();
        table.record("Sepsis", exemplar("Patient/1", "Encounter/1"));
        table.record("Sepsis", exemplar("Patient/2", "Encounter/2"));

        assert_eq!(table.count("Sepsis"), Some(2));
        assert_eq!(
            table.exemplar("Sepsis"),
            Some(&exemplar("Patient/2", "Encounter/2"))
        );
        assert_eq!(table.count("Pneumonia"), None);
    }

    #[test]
    fn count_saturates_instead_of_overflowing() {
        let mut table = FrequencyTable::new();
        table.record("Sepsis", ExemplarReference::default());
        table.entries[0].count = u32::MAX;
        table.record("Sepsis", exemplar("Patient/9", "Encounter/9"));

        assert_eq!(table.count("Sepsis"), Some(u32::MAX));
        assert_eq!(
            table.exemplar("Sepsis"),
            Some(&exemplar("Patient/9", "Encounter/9"))
        );
    }

    #[test]
    fn cross_tab_cell_saturates() {
        let mut tab = CrossTabulation::new();
        tab.increment("F", "EMER");
        tab.rows[0].1[0].1 = u32::MAX;
        tab.increment("F", "EMER");

        assert_eq!(tab.get("F", "EMER"), Some(u32::MAX));
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let mut table = FrequencyTable::new();
        for label in ["B", "A", "C", "A", "D", "C"] {
            table.record(label, ExemplarReference::default());
        }

        let names: Vec<_> = table
            .into_ranked(10)
            .into_iter()
            .map(|entry| (entry.name, entry.count))
            .collect();

        assert_eq!(
            names,
            vec![
                ("A".to_string(), 2),
                ("C".to_string(), 2),
                ("B".to_string(), 1),
                ("D".to_string(), 1),
            ]
        );
    }

    #[test]
    fn ranking_truncates_to_limit() {
        let mut table = FrequencyTable::new();
        for idx in 0..15 {
            table.record(&format!("Condition {idx}"), ExemplarReference::default());
        }
        assert_eq!(table.total(), 15);
        assert_eq!(table.into_ranked(DEFAULT_TOP_N).len(), DEFAULT_TOP_N);
    }

    #[test]
    fn cross_tab_preserves_first_appearance() {
        let mut tab = CrossTabulation::new();
        tab.increment("M", "ELEC");
        tab.increment("F", "EMER");
        tab.increment("M", "EMER");
        tab.increment("M", "ELEC");

        assert_eq!(tab.primaries().collect::<Vec<_>>(), vec!["M", "F"]);
        assert_eq!(tab.secondaries(), vec!["ELEC", "EMER"]);
        assert_eq!(tab.get("M", "ELEC"), Some(2));
        assert_eq!(tab.get("F", "ELEC"), None);
        assert_eq!(tab.total(), 4);
        assert_eq!(tab.max_count(), Some(2));
        assert_eq!(
            tab.cells().collect::<Vec<_>>(),
            vec![("M", "ELEC", 2), ("M", "EMER", 1), ("F", "EMER", 1)]
        );
    }

    #[test]
    fn cross_tab_serializes_as_nested_object() {
        let mut tab = CrossTabulation::new();
        tab.increment("F", "EMER");
        tab.increment("M", "ELEC");

        let json = serde_json::to_string(&tab).expect("serialize cross tab");
        assert_eq!(json, r#"{"F":{"EMER":1},"M":{"ELEC":1}}"#);
    }

    #[test]
    fn no_data_outcome_is_tagged() {
        let outcome = DrilldownOutcome::NoData {
            condition: "Gout".to_string(),
        };
        let value = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(
            value,
            serde_json::json!({ "status": "no_data", "condition": "Gout" })
        );
        assert!(outcome.breakdown().is_none());
    }

    #[test]
    fn reference_id_takes_text_after_first_slash() {
        assert_eq!(reference_id("Patient/123"), Some("123"));
        assert_eq!(reference_id("Encounter/abc/_history/2"), Some("abc/_history/2"));
        assert_eq!(reference_id("Patient/"), None);
        assert_eq!(reference_id("123"), None);
    }

    #[test]
    fn query_round_trip_handles_reserved_characters() {
        let name = "Sepsis, unspecified organism & shock = 50% / 100+";
        let query = drilldown_query(name).expect("encode query");

        assert!(query.starts_with("condition="));
        assert!(!query.contains('&'));
        assert_eq!(condition_from_query(&query).as_deref(), Some(name));
        assert_eq!(
            condition_from_query(&format!("../Conditions/index.html?{query}")).as_deref(),
            Some(name)
        );
    }

    #[test]
    fn query_without_condition_is_none() {
        assert_eq!(condition_from_query("?page=2"), None);
        assert_eq!(
            condition_from_query("?condition=Asthma%20attack&condition=Other").as_deref(),
            Some("Asthma attack")
        );
    }

    #[test]
    fn default_config_matches_chart_defaults() {
        let config = CensusConfig::default();
        assert_eq!(config.top_n, 10);
        assert_eq!(config.fallback_label, "Unknown");
    }
}
