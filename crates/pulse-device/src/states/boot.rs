use super::{Control, State, Timeout};
use crate::display::{ScreenMode, TEXT_OFFSET};
use crate::hardware::Hardware;
use crate::input::Input;

/// Boot animation.
#[derive(Debug, Default)]
pub struct Splash {
    timeout: Timeout,
}

impl Control for Splash {
    fn enter(&mut self, hw: &mut Hardware) {
        self.timeout = Timeout::new(hw.config.splash_ms);
        self.timeout.arm(hw);
        hw.screen.set_mode(ScreenMode::Splash);
    }

    fn run(&mut self, hw: &mut Hardware, _input: Option<Input>) -> Option<State> {
        self.timeout.expired(hw).then(State::connect)
    }
}

/// Polls the messaging client until both broker channels are up.
#[derive(Debug, Default)]
pub struct Connect {
    timeout: Timeout,
}

impl Control for Connect {
    fn enter(&mut self, hw: &mut Hardware) {
        self.timeout = Timeout::new(hw.config.connect_timeout_ms);
        self.timeout.arm(hw);
        // Connection attempts may stall the loop briefly; turns made meanwhile
        // would land on the next screen.
        hw.rotary.disable();
        hw.screen.items(&["Connecting", "to network"], TEXT_OFFSET);
        hw.screen.set_mode(ScreenMode::Loading);
    }

    fn run(&mut self, hw: &mut Hardware, _input: Option<Input>) -> Option<State> {
        if hw.online.connect(hw.clock.as_ref()) {
            log::info!("online after {} ms", hw.clock.elapsed_since(self.timeout.start_ms));
            Some(State::menu())
        } else if self.timeout.expired(hw) {
            log::warn!("no connection within {} ms", self.timeout.limit_ms);
            Some(State::error(&["Wi-Fi not found"]))
        } else {
            None
        }
    }

    fn exit(&mut self, hw: &mut Hardware) {
        hw.rotary.enable();
    }
}
