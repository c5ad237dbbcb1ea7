use super::{Control, State, Timeout};
use crate::display::{ScreenMode, TEXT_OFFSET};
use crate::hardware::Hardware;
use crate::input::Input;
use pulse_lib::io::record::{parse_remote_response, MeasurementRecord};

/// Polls for the remote analysis response.
#[derive(Debug, Default)]
pub struct WaitKubios {
    timeout: Timeout,
}

impl Control for WaitKubios {
    fn enter(&mut self, hw: &mut Hardware) {
        self.timeout = Timeout::new(hw.config.response_timeout_ms);
        self.timeout.arm(hw);
        hw.screen.items(&["Waiting", "for kubios"], TEXT_OFFSET);
        hw.screen.set_mode(ScreenMode::Loading);
    }

    fn run(&mut self, hw: &mut Hardware, _input: Option<Input>) -> Option<State> {
        if let Some(response) = hw.online.poll_remote_response() {
            return Some(match parse_remote_response(&response, hw.epoch_secs()) {
                Ok(record) => State::view_analysis(record),
                Err(err) => {
                    log::warn!("{}", err);
                    State::error(&["Data could", "not be parsed"])
                }
            });
        }
        if self.timeout.expired(hw) {
            log::warn!(
                "no analysis response within {} ms",
                hw.config.response_timeout_ms
            );
            return Some(State::error(&["Kubios not", "reached"]));
        }
        None
    }
}

/// Republishes a record on the local telemetry topic, then returns to the
/// menu.
#[derive(Debug)]
pub struct UploadToLocal {
    record: MeasurementRecord,
}

impl UploadToLocal {
    pub fn new(record: MeasurementRecord) -> Self {
        Self { record }
    }
}

impl Control for UploadToLocal {
    fn run(&mut self, hw: &mut Hardware, _input: Option<Input>) -> Option<State> {
        match hw.online.send_local(&self.record) {
            Ok(()) => Some(State::menu()),
            Err(err) => {
                log::warn!("local upload of {} failed: {}", self.record.id, err);
                Some(State::error(&["Local Upload", "Fail"]))
            }
        }
    }
}
