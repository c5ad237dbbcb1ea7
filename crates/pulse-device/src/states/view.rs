use super::{Control, State};
use crate::display::{ScreenMode, TEXT_OFFSET};
use crate::format::{error_lines, record_lines};
use crate::hardware::Hardware;
use crate::input::Input;
use pulse_lib::io::history::HistoryError;
use pulse_lib::io::record::MeasurementRecord;

/// Message screen; confirm returns to the menu.
#[derive(Debug)]
pub struct ErrorView {
    lines: Vec<String>,
}

impl ErrorView {
    pub fn new(message: &[&str]) -> Self {
        Self {
            lines: error_lines(message),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Control for ErrorView {
    fn enter(&mut self, hw: &mut Hardware) {
        log::info!("error screen: {}", self.lines[1..].join(" "));
        hw.screen.items(&self.lines, TEXT_OFFSET);
        hw.screen.set_mode(ScreenMode::Static);
    }

    fn run(&mut self, _hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        (input == Some(Input::Confirm)).then(State::menu)
    }
}

/// Stores a fresh analysis result and shows it.
#[derive(Debug)]
pub struct ViewAnalysis {
    record: MeasurementRecord,
}

impl ViewAnalysis {
    pub fn new(record: MeasurementRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &MeasurementRecord {
        &self.record
    }
}

impl Control for ViewAnalysis {
    fn enter(&mut self, hw: &mut Hardware) {
        let now = hw.epoch_secs();
        match hw.history.write(&self.record, now) {
            Ok(name) => log::info!("stored analysis as {}", name),
            Err(err) => log::warn!("analysis not stored: {}", err),
        }
        hw.screen.items(&record_lines(&self.record), TEXT_OFFSET);
        hw.screen.set_mode(ScreenMode::Static);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        if input != Some(Input::Confirm) {
            return None;
        }
        Some(if hw.config.upload_after_view {
            State::upload_to_local(self.record.clone())
        } else {
            State::menu()
        })
    }
}

/// Shows one stored record.
#[derive(Debug)]
pub struct ReadHistory {
    name: String,
    failure: Option<&'static [&'static str]>,
}

impl ReadHistory {
    pub fn new(name: String) -> Self {
        Self {
            name,
            failure: None,
        }
    }
}

impl Control for ReadHistory {
    fn enter(&mut self, hw: &mut Hardware) {
        match hw.history.read(&self.name) {
            Ok(record) => {
                hw.screen.items(&record_lines(&record), TEXT_OFFSET);
                hw.screen.set_mode(ScreenMode::Static);
            }
            Err(err) => {
                log::warn!("{}", err);
                let message: &'static [&'static str] = match err {
                    HistoryError::NotFound(_) => &["Entry", "not found"],
                    HistoryError::Parse { .. } => &["Entry", "unreadable"],
                    HistoryError::Storage(_) | HistoryError::Encode(_) => &["Storage", "fault"],
                };
                self.failure = Some(message);
            }
        }
    }

    fn run(&mut self, _hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        if let Some(message) = self.failure {
            return Some(State::error(message));
        }
        (input == Some(Input::Confirm)).then(State::menu)
    }
}
