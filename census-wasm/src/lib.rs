//! Bridge WASM <-> JavaScript cho hai luồng thống kê, trung lập framework.

use census_core::{CensusConfig, CensusError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsCensusConfig {
    #[serde(default)]
    top_n: Option<usize>,
    #[serde(default)]
    fallback_label: Option<String>,
}

impl From<JsCensusConfig> for CensusConfig {
    fn from(cfg: JsCensusConfig) -> Self {
        let mut base = CensusConfig::default();
        if let Some(top_n) = cfg.top_n {
            base.top_n = top_n;
        }
        if let Some(label) = cfg.fallback_label {
            base.fallback_label = label;
        }
        base
    }
}

/// Top chẩn đoán: mảng `{name, count, details: {subject, encounter}}`.
#[wasm_bindgen(js_name = topConditions)]
pub fn top_conditions(conditions: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let conditions = read_records(conditions, "Condition")?;
    let cfg = read_config(config)?;

    let top = census_fhir::top_conditions(&conditions, &cfg);
    to_js(&top)
}

/// Bảng chéo giới tính / hình thức nhập viện cho một chẩn đoán.
///
/// Trả về `{status: "no_data", condition}` khi không có bản ghi nào khớp.
#[wasm_bindgen(js_name = conditionBreakdown)]
pub fn condition_breakdown(
    conditions: JsValue,
    patients: JsValue,
    encounters: JsValue,
    condition: String,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let conditions = read_records(conditions, "Condition")?;
    let patients = read_records(patients, "Patient")?;
    let encounters = read_records(encounters, "Encounter")?;
    let cfg = read_config(config)?;

    let outcome =
        census_fhir::condition_breakdown(&conditions, &patients, &encounters, &condition, &cfg);
    to_js(&outcome)
}

/// Chuỗi truy vấn `condition=...` cho liên kết sang trang chi tiết.
#[wasm_bindgen(js_name = drilldownQuery)]
pub fn drilldown_query(condition: &str) -> Result<String, JsValue> {
    census_core::drilldown_query(condition).map_err(|err| JsValue::from_str(&format_census_error(err)))
}

/// Đọc tham số `condition` từ `window.location.search`.
#[wasm_bindgen(js_name = conditionFromQuery)]
pub fn condition_from_query(query: &str) -> Option<String> {
    census_core::condition_from_query(query)
}

fn read_records(input: JsValue, kind: &str) -> Result<Vec<Value>, JsValue> {
    let value = from_value::<Value>(input)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được JSON {kind}: {err}")))?;
    census_fhir::records_from_value(value).map_err(|err| JsValue::from_str(&format_census_error(err)))
}

fn read_config(config: Option<JsValue>) -> Result<CensusConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsCensusConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            Ok(CensusConfig::from(cfg))
        }
        _ => Ok(CensusConfig::default()),
    }
}

// Map lồng nhau phải ra object thường, không phải `Map` của JS.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Không serialize kết quả: {err}")))
}

fn format_census_error(err: CensusError) -> String {
    format!("Census error: {err}")
}
