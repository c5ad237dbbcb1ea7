use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use pulse_lib::io::history::entry_stamp;
use pulse_lib::io::record::MeasurementRecord;

/// Device time is kept as local wall-clock seconds, so no zone conversion.
fn local_time(stamp: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(stamp, 0).map(|dt| dt.naive_utc())
}

/// `meas_<stamp>` becomes `MEAS d/m/yyyy`. Other names are shown uppercased.
pub fn entry_label(name: &str) -> String {
    match entry_stamp(name).and_then(local_time) {
        Some(date) => format!("MEAS {}/{}/{}", date.day(), date.month(), date.year()),
        None => name.to_uppercase(),
    }
}

pub fn entry_labels(names: &[String]) -> Vec<String> {
    names.iter().map(|name| entry_label(name)).collect()
}

/// `TIME: h:mm` followed by one `KEY: value` line per field.
pub fn record_lines(record: &MeasurementRecord) -> Vec<String> {
    let time = local_time(record.timestamp)
        .map(|t| format!("{}:{:02}", t.hour(), t.minute()))
        .unwrap_or_else(|| "-".to_string());
    let mut lines = vec![format!("TIME: {time}")];
    lines.extend(
        record
            .value_fields()
            .into_iter()
            .map(|(key, value)| format!("{}: {}", key.to_uppercase(), value)),
    );
    lines
}

pub fn error_lines(message: &[&str]) -> Vec<String> {
    std::iter::once("ERROR")
        .chain(message.iter().copied())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_labels_show_the_day() {
        // 2024-03-05 09:07:00
        assert_eq!(entry_label("meas_1709629620"), "MEAS 5/3/2024");
        assert_eq!(entry_label("notes"), "NOTES");
    }

    #[test]
    fn record_lines_start_with_time_and_skip_id() {
        let record = MeasurementRecord {
            id: 1709629620,
            timestamp: 1709629620,
            mean_hr: 71,
            mean_ppi: 845,
            rmssd: 38,
            sdnn: 52,
            sns: Some("-0.46".into()),
            pns: Some("1.20".into()),
            phys_age: Some(serde_json::Number::from(27)),
        };
        assert_eq!(
            record_lines(&record),
            vec![
                "TIME: 9:07",
                "MEAN_HR: 71",
                "MEAN_PPI: 845",
                "RMSSD: 38",
                "SDNN: 52",
                "SNS: -0.46",
                "PNS: 1.20",
                "PHYS_AGE: 27",
            ]
        );
    }

    #[test]
    fn error_lines_prefix_the_message() {
        assert_eq!(
            error_lines(&["Kubios not", "reached"]),
            vec!["ERROR", "Kubios not", "reached"]
        );
    }
}
