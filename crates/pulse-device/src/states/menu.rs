use super::{step_cursor, Control, State};
use crate::display::{ScreenMode, MENU_OFFSET};
use crate::format::entry_labels;
use crate::hardware::Hardware;
use crate::input::Input;

pub const MENU_ITEMS: [&str; 4] = ["MEASURE HR", "HRV ANALYSIS", "KUBIOS", "HISTORY"];

#[derive(Debug, Default)]
pub struct Menu {
    select: usize,
}

impl Menu {
    pub fn selection(&self) -> usize {
        self.select
    }
}

impl Control for Menu {
    fn enter(&mut self, hw: &mut Hardware) {
        self.select = 0;
        hw.screen.items(&MENU_ITEMS, MENU_OFFSET);
        hw.screen.cursor_pos(self.select);
        hw.screen.set_mode(ScreenMode::Menu);
        let online = hw.online.is_connected();
        hw.led.set(online);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        match input? {
            Input::Reconnect if !hw.online.is_connected() => Some(State::connect()),
            Input::Reconnect => None,
            Input::Confirm => Some(match self.select {
                0 => State::measure_hr(&hw.config),
                1 => State::hrv_analysis(&hw.config),
                2 => State::kubios(&hw.config),
                _ => State::history(),
            }),
            turn => {
                if let Some(select) = step_cursor(self.select, turn, MENU_ITEMS.len()) {
                    self.select = select;
                    hw.screen.cursor_pos(select);
                }
                None
            }
        }
    }
}

/// Stored entries, newest first.
#[derive(Debug, Default)]
pub struct HistoryList {
    select: usize,
    names: Vec<String>,
}

impl Control for HistoryList {
    fn enter(&mut self, hw: &mut Hardware) {
        self.select = 0;
        self.names = hw.history.newest_first().unwrap_or_else(|err| {
            log::warn!("history listing failed: {}", err);
            Vec::new()
        });
        hw.screen.items(&entry_labels(&self.names), MENU_OFFSET);
        hw.screen.cursor_pos(self.select);
        hw.screen.set_mode(ScreenMode::Menu);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        if self.names.is_empty() {
            return Some(State::error(&["No History"]));
        }
        match input? {
            Input::Confirm => Some(State::read_history(self.names[self.select].clone())),
            Input::Reconnect => None,
            turn => {
                if let Some(select) = step_cursor(self.select, turn, self.names.len()) {
                    self.select = select;
                    hw.screen.cursor_pos(select);
                }
                None
            }
        }
    }
}
