use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("remote response could not be parsed: {0}")]
    Parse(String),
}

/// Rounds to the nearest integer, ties to even.
pub fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Result of one completed analysis. Field order is the wire and display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementRecord {
    pub id: i64,
    /// Local wall-clock time of creation, seconds since the Unix epoch.
    pub timestamp: i64,
    pub mean_hr: i64,
    pub mean_ppi: i64,
    pub rmssd: i64,
    pub sdnn: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phys_age: Option<Number>,
}

impl MeasurementRecord {
    /// Every field except `id` and `timestamp` as `(key, value)` text, in order.
    pub fn value_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("mean_hr", self.mean_hr.to_string()),
            ("mean_ppi", self.mean_ppi.to_string()),
            ("rmssd", self.rmssd.to_string()),
            ("sdnn", self.sdnn.to_string()),
        ];
        if let Some(sns) = &self.sns {
            fields.push(("sns", sns.clone()));
        }
        if let Some(pns) = &self.pns {
            fields.push(("pns", pns.clone()));
        }
        if let Some(age) = &self.phys_age {
            fields.push(("phys_age", age.to_string()));
        }
        fields
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisKind {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Interval submission to the remote analysis service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRequest {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<i32>,
    pub analysis: AnalysisKind,
}

impl RemoteRequest {
    pub fn readiness(id: i64, ppi: Vec<i32>) -> Self {
        Self {
            id,
            kind: "RRI".to_string(),
            data: ppi,
            analysis: AnalysisKind {
                kind: "readiness".to_string(),
            },
        }
    }
}

/// Maps a remote analysis response (`data.analysis`) onto a record stamped
/// with `stamp`.
pub fn parse_remote_response(
    response: &Value,
    stamp: i64,
) -> Result<MeasurementRecord, RecordError> {
    let analysis = response
        .pointer("/data/analysis")
        .and_then(Value::as_object)
        .ok_or_else(|| RecordError::Parse("missing data.analysis object".to_string()))?;
    let number = |key: &str| -> Result<f64, RecordError> {
        analysis
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| RecordError::Parse(format!("missing numeric field {key}")))
    };
    let phys_age = match analysis.get("physiological_age") {
        Some(Value::Number(n)) => n.clone(),
        _ => {
            return Err(RecordError::Parse(
                "missing numeric field physiological_age".to_string(),
            ))
        }
    };
    Ok(MeasurementRecord {
        id: stamp,
        timestamp: stamp,
        mean_hr: round_half_even(number("mean_hr_bpm")?),
        mean_ppi: round_half_even(number("mean_rr_ms")?),
        rmssd: round_half_even(number("rmssd_ms")?),
        sdnn: round_half_even(number("sdnn_ms")?),
        sns: Some(format!("{:.2}", number("sns_index")?)),
        pns: Some(format!("{:.2}", number("pns_index")?)),
        phys_age: Some(phys_age),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "id": 1_700_000_000,
            "data": {
                "status": "ok",
                "analysis": {
                    "mean_hr_bpm": 72.5,
                    "mean_rr_ms": 827.4,
                    "rmssd_ms": 41.5,
                    "sdnn_ms": 55.51,
                    "sns_index": -0.4567,
                    "pns_index": 1.2,
                    "physiological_age": 27
                }
            }
        })
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_half_even(72.5), 72);
        assert_eq!(round_half_even(73.5), 74);
        assert_eq!(round_half_even(-0.5), 0);
        assert_eq!(round_half_even(41.51), 42);
    }

    #[test]
    fn remote_response_maps_onto_record() {
        let record = parse_remote_response(&sample_response(), 1_700_000_100).unwrap();
        assert_eq!(record.id, 1_700_000_100);
        assert_eq!(record.timestamp, 1_700_000_100);
        assert_eq!(record.mean_hr, 72);
        assert_eq!(record.mean_ppi, 827);
        assert_eq!(record.rmssd, 42);
        assert_eq!(record.sdnn, 56);
        assert_eq!(record.sns.as_deref(), Some("-0.46"));
        assert_eq!(record.pns.as_deref(), Some("1.20"));
        assert_eq!(record.phys_age, Some(Number::from(27)));
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        assert!(parse_remote_response(&json!({}), 0).is_err());
        assert!(parse_remote_response(&json!({"data": {"analysis": []}}), 0).is_err());
        let mut missing = sample_response();
        missing["data"]["analysis"]
            .as_object_mut()
            .unwrap()
            .remove("sdnn_ms");
        let err = parse_remote_response(&missing, 0).unwrap_err();
        assert!(err.to_string().contains("sdnn_ms"));
        let mut text_age = sample_response();
        text_age["data"]["analysis"]["physiological_age"] = json!("27");
        assert!(parse_remote_response(&text_age, 0).is_err());
    }

    #[test]
    fn record_serializes_in_field_order_without_absent_remote_fields() {
        let record = MeasurementRecord {
            id: 5,
            timestamp: 5,
            mean_hr: 70,
            mean_ppi: 857,
            rmssd: 30,
            sdnn: 40,
            sns: None,
            pns: None,
            phys_age: None,
        };
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(
            text,
            r#"{"id":5,"timestamp":5,"mean_hr":70,"mean_ppi":857,"rmssd":30,"sdnn":40}"#
        );
        let back: MeasurementRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn readiness_request_wire_shape() {
        let request = RemoteRequest::readiness(42, vec![800, 810]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": 42, "type": "RRI", "data": [800, 810], "analysis": {"type": "readiness"}})
        );
    }
}
