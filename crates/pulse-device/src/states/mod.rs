//! Control state machine.
//!
//! Exactly one [`State`] is live. The runner calls `enter` once when a state
//! is installed, `run` once per tick with at most one input, and `exit` once
//! when the state is replaced or the runner is dropped. `run` returns the
//! next state or `None` to stay.

mod boot;
mod measure;
mod menu;
mod remote;
mod view;

pub use boot::{Connect, Splash};
pub use measure::{HrvAnalysis, Kubios, MeasureHr, Measurement, PlotScaler};
pub use menu::{HistoryList, Menu, MENU_ITEMS};
pub use remote::{UploadToLocal, WaitKubios};
pub use view::{ErrorView, ReadHistory, ViewAnalysis};

use crate::config::DeviceConfig;
use crate::hardware::Hardware;
use crate::input::Input;
use pulse_lib::io::record::MeasurementRecord;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateKind {
    Splash,
    Connect,
    Menu,
    MeasureHr,
    HrvAnalysis,
    Kubios,
    WaitKubios,
    ViewAnalysis,
    UploadToLocal,
    History,
    ReadHistory,
    Error,
}

pub enum State {
    Splash(Splash),
    Connect(Connect),
    Menu(Menu),
    MeasureHr(MeasureHr),
    HrvAnalysis(HrvAnalysis),
    Kubios(Kubios),
    WaitKubios(WaitKubios),
    ViewAnalysis(ViewAnalysis),
    UploadToLocal(UploadToLocal),
    History(HistoryList),
    ReadHistory(ReadHistory),
    Error(ErrorView),
}

macro_rules! each_state {
    ($state:expr, $inner:ident => $body:expr) => {
        match $state {
            State::Splash($inner) => $body,
            State::Connect($inner) => $body,
            State::Menu($inner) => $body,
            State::MeasureHr($inner) => $body,
            State::HrvAnalysis($inner) => $body,
            State::Kubios($inner) => $body,
            State::WaitKubios($inner) => $body,
            State::ViewAnalysis($inner) => $body,
            State::UploadToLocal($inner) => $body,
            State::History($inner) => $body,
            State::ReadHistory($inner) => $body,
            State::Error($inner) => $body,
        }
    };
}

impl State {
    pub fn splash() -> Self {
        State::Splash(Splash::default())
    }

    pub fn connect() -> Self {
        State::Connect(Connect::default())
    }

    pub fn menu() -> Self {
        State::Menu(Menu::default())
    }

    pub fn measure_hr(config: &DeviceConfig) -> Self {
        State::MeasureHr(MeasureHr::new(config))
    }

    pub fn hrv_analysis(config: &DeviceConfig) -> Self {
        State::HrvAnalysis(HrvAnalysis::new(config))
    }

    pub fn kubios(config: &DeviceConfig) -> Self {
        State::Kubios(Kubios::new(config))
    }

    pub fn wait_kubios() -> Self {
        State::WaitKubios(WaitKubios::default())
    }

    pub fn view_analysis(record: MeasurementRecord) -> Self {
        State::ViewAnalysis(ViewAnalysis::new(record))
    }

    pub fn upload_to_local(record: MeasurementRecord) -> Self {
        State::UploadToLocal(UploadToLocal::new(record))
    }

    pub fn history() -> Self {
        State::History(HistoryList::default())
    }

    pub fn read_history(name: impl Into<String>) -> Self {
        State::ReadHistory(ReadHistory::new(name.into()))
    }

    /// Error screen showing `ERROR` above the message lines.
    pub fn error(message: &[&str]) -> Self {
        State::Error(ErrorView::new(message))
    }

    pub fn kind(&self) -> StateKind {
        match self {
            State::Splash(_) => StateKind::Splash,
            State::Connect(_) => StateKind::Connect,
            State::Menu(_) => StateKind::Menu,
            State::MeasureHr(_) => StateKind::MeasureHr,
            State::HrvAnalysis(_) => StateKind::HrvAnalysis,
            State::Kubios(_) => StateKind::Kubios,
            State::WaitKubios(_) => StateKind::WaitKubios,
            State::ViewAnalysis(_) => StateKind::ViewAnalysis,
            State::UploadToLocal(_) => StateKind::UploadToLocal,
            State::History(_) => StateKind::History,
            State::ReadHistory(_) => StateKind::ReadHistory,
            State::Error(_) => StateKind::Error,
        }
    }

    pub fn enter(&mut self, hw: &mut Hardware) {
        each_state!(self, s => s.enter(hw))
    }

    pub fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        each_state!(self, s => s.run(hw, input))
    }

    pub fn exit(&mut self, hw: &mut Hardware) {
        each_state!(self, s => s.exit(hw))
    }

    /// Message lines of an error state.
    pub fn error_lines(&self) -> Option<&[String]> {
        match self {
            State::Error(view) => Some(view.lines()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Per-state behaviour. `enter` and `exit` default to nothing.
trait Control {
    fn enter(&mut self, _hw: &mut Hardware) {}
    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State>;
    fn exit(&mut self, _hw: &mut Hardware) {}
}

/// Elapsed-time check against the tick clock, armed on state entry.
#[derive(Debug, Clone, Copy, Default)]
struct Timeout {
    start_ms: u64,
    limit_ms: u64,
}

impl Timeout {
    fn new(limit_ms: u64) -> Self {
        Self {
            start_ms: 0,
            limit_ms,
        }
    }

    fn arm(&mut self, hw: &Hardware) {
        self.start_ms = hw.now_ms();
    }

    fn expired(&self, hw: &Hardware) -> bool {
        hw.clock.elapsed_since(self.start_ms) > self.limit_ms
    }
}

/// Moves a list cursor by one rotary step, clamped to `len`.
fn step_cursor(cursor: usize, input: Input, len: usize) -> Option<usize> {
    let Input::Turn(dir) = input else {
        return None;
    };
    let last = len.saturating_sub(1);
    Some(if dir < 0 {
        cursor.saturating_sub(1)
    } else {
        (cursor + 1).min(last)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_is_clamped() {
        assert_eq!(step_cursor(0, Input::Turn(-1), 4), Some(0));
        assert_eq!(step_cursor(3, Input::Turn(1), 4), Some(3));
        assert_eq!(step_cursor(1, Input::Turn(1), 4), Some(2));
        assert_eq!(step_cursor(1, Input::Confirm, 4), None);
        assert_eq!(step_cursor(0, Input::Turn(1), 0), Some(0));
    }
}
