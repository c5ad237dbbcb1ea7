use crate::hardware::Hardware;
use crate::states::{State, StateKind};
use crossbeam_channel::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

/// Cooperative control loop: one state, one input per tick.
pub struct PulseCheck {
    hw: Hardware,
    state: State,
}

impl PulseCheck {
    /// Installs `initial` and runs its entry action.
    pub fn new(mut hw: Hardware, mut initial: State) -> Self {
        log::info!("starting in {:?}", initial);
        initial.enter(&mut hw);
        Self { hw, state: initial }
    }

    /// Runs the live state once. On a transition the old state's exit action
    /// runs before the new state's entry action.
    pub fn tick(&mut self) -> StateKind {
        let input = self.hw.next_input();
        if let Some(mut next) = self.state.run(&mut self.hw, input) {
            self.state.exit(&mut self.hw);
            log::info!("{:?} -> {:?}", self.state, next);
            next.enter(&mut self.hw);
            self.state = next;
        }
        self.state.kind()
    }

    /// Ticks until `stop` fires or its sender goes away. Queued events and
    /// samples are handled back to back; the loop only sleeps, for at most
    /// `period`, when both queues are empty.
    pub fn run(&mut self, period: Duration, stop: &Receiver<()>) {
        loop {
            match stop.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break,
            }
            self.tick();
            if let Some(pause) = self.hw.backoff(period) {
                thread::sleep(pause);
            }
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut Hardware {
        &mut self.hw
    }
}

impl Drop for PulseCheck {
    fn drop(&mut self) {
        self.state.exit(&mut self.hw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::display::ScreenMode;
    use crate::input::ROT_PUSH;
    use crate::sim::{SimBoard, SimOptions};
    use crossbeam_channel::bounded;
    use pulse_lib::io::history::MemStorage;
    use pulse_net::config::LinkSettings;

    fn machine(initial: impl FnOnce(&DeviceConfig) -> State) -> (SimBoard, PulseCheck) {
        let config = DeviceConfig::default();
        let initial = initial(&config);
        let (board, hw) = SimBoard::build(
            config,
            LinkSettings::default(),
            Box::new(MemStorage::new()),
            &SimOptions::default(),
        );
        (board, PulseCheck::new(hw, initial))
    }

    #[test]
    fn one_input_per_tick() {
        let (board, mut pc) = machine(|_| State::menu());
        assert!(board.rotary.on_edge(true));
        assert!(board.rotary.on_edge(true));
        assert_eq!(pc.tick(), StateKind::Menu);
        assert_eq!(board.screen.peek().cursor, 1);
        assert_eq!(pc.tick(), StateKind::Menu);
        assert_eq!(board.screen.peek().cursor, 2);
        assert_eq!(pc.tick(), StateKind::Menu);
        assert_eq!(board.screen.peek().cursor, 2);
    }

    #[test]
    fn unknown_codes_are_consumed() {
        let (board, mut pc) = machine(|_| State::menu());
        assert!(board.events.push(99));
        assert!(board.events.push(ROT_PUSH));
        assert_eq!(pc.tick(), StateKind::Menu);
        assert_eq!(pc.tick(), StateKind::MeasureHr);
    }

    #[test]
    fn exit_runs_before_enter() {
        let (board, mut pc) = machine(State::measure_hr);
        assert!(board.timer.is_running());
        assert_eq!(board.screen.peek().mode, Some(ScreenMode::Measure));
        assert!(board.events.push(ROT_PUSH));
        assert_eq!(pc.tick(), StateKind::Menu);
        assert!(!board.timer.is_running());
        assert_eq!(board.screen.peek().mode, Some(ScreenMode::Menu));
    }

    #[test]
    fn splash_waits_for_the_clock() {
        let (board, mut pc) = machine(|_| State::splash());
        assert_eq!(pc.tick(), StateKind::Splash);
        board.clock.advance(2_201);
        assert_eq!(pc.tick(), StateKind::Connect);
    }

    #[test]
    fn run_returns_when_stopped() {
        let (_board, mut pc) = machine(|_| State::menu());
        let (tx, rx) = bounded(1);
        tx.send(()).unwrap();
        pc.run(Duration::from_millis(1), &rx);
        assert_eq!(pc.kind(), StateKind::Menu);

        drop(tx);
        pc.run(Duration::from_millis(1), &rx);
        assert_eq!(pc.kind(), StateKind::Menu);
    }

    #[test]
    fn live_sampling_keeps_up_with_the_timer() {
        let (board, mut pc) = machine(State::measure_hr);
        let timer = board.timer.clone();
        let (tx, rx) = bounded(1);
        let interrupt = thread::spawn(move || {
            for i in 0..250u16 {
                assert!(timer.fire(30_000 + i % 100), "sample {i} refused");
                thread::sleep(Duration::from_millis(4));
            }
            thread::sleep(Duration::from_millis(20));
            tx.send(()).unwrap();
        });

        pc.run(Duration::from_millis(10), &rx);
        interrupt.join().unwrap();
        assert_eq!(board.timer.dropped(), 0);
        assert!(!pc.hardware().sampler.pending());
        assert_eq!(pc.kind(), StateKind::MeasureHr);
    }

    #[test]
    fn backoff_waits_only_when_idle() {
        let (board, pc) = machine(|_| State::menu());
        let period = Duration::from_millis(10);
        assert_eq!(pc.hardware().backoff(period), Some(period));
        assert!(board.events.push(ROT_PUSH));
        assert_eq!(pc.hardware().backoff(period), None);

        let (board, pc) = machine(State::measure_hr);
        assert_eq!(pc.hardware().backoff(period), Some(Duration::from_millis(2)));
        assert!(board.timer.fire(30_000));
        assert_eq!(pc.hardware().backoff(period), None);
    }
}
