//! Semantic draw intents shared between the control loop and the render loop.
//!
//! The control loop only records what should be on screen; the render thread
//! snapshots those intents under the lock and paints outside it.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const SCREEN_WIDTH: i32 = 128;
pub const SCREEN_HEIGHT: i32 = 64;
/// Rows available to the pulse plot.
pub const PLOT_HEIGHT: i32 = 42;
/// Left margin of menu items, leaving room for the cursor.
pub const MENU_OFFSET: i32 = 10;
/// Left margin of static text.
pub const TEXT_OFFSET: i32 = 0;
/// Plot position that draws nothing on the next measuring screen.
pub const PLOT_PARKED: (i32, i32) = (-1, 16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScreenMode {
    /// Live plot with the heart-rate readout.
    Measure,
    /// Item list with a cursor.
    Menu,
    /// Live plot with an "Analysing" indicator.
    Analysing,
    /// Item list only.
    Static,
    /// Item list with a progress animation.
    Loading,
    Splash,
}

/// Everything the renderer needs for one repaint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub mode: Option<ScreenMode>,
    pub items: Vec<String>,
    pub offset: i32,
    pub cursor: usize,
    pub plot: (i32, i32),
    pub bpm: u32,
    /// A pulse was accepted since the previous frame.
    pub pulse: bool,
    /// The screen must be blanked before drawing.
    pub clear: bool,
    /// `items` changed since the previous frame.
    pub items_changed: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            mode: None,
            items: Vec::new(),
            offset: MENU_OFFSET,
            cursor: 0,
            plot: PLOT_PARKED,
            bpm: 0,
            pulse: false,
            clear: false,
            items_changed: false,
        }
    }
}

/// Control-loop handle to the shared draw state. Every intent holds the lock
/// only for the field update.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    state: Arc<Mutex<Frame>>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches the draw mode and requests a blank screen.
    pub fn set_mode(&self, mode: ScreenMode) {
        let mut state = self.state.lock();
        state.mode = Some(mode);
        state.clear = true;
    }

    pub fn items<S: AsRef<str>>(&self, items: &[S], offset: i32) {
        let items = items.iter().map(|s| s.as_ref().to_string()).collect();
        let mut state = self.state.lock();
        state.items = items;
        state.offset = offset;
        state.items_changed = true;
    }

    pub fn cursor_pos(&self, index: usize) {
        self.state.lock().cursor = index;
    }

    pub fn plot_point(&self, x: i32, y: i32) {
        self.state.lock().plot = (x, y);
    }

    pub fn heart_rate(&self, bpm: u32) {
        self.state.lock().bpm = bpm;
    }

    pub fn mark_pulse(&self) {
        self.state.lock().pulse = true;
    }

    pub fn clear(&self) {
        self.state.lock().clear = true;
    }

    /// Copies the current intents and consumes the one-shot flags.
    pub fn snapshot(&self) -> Frame {
        let mut state = self.state.lock();
        let frame = state.clone();
        state.pulse = false;
        state.clear = false;
        state.items_changed = false;
        frame
    }

    /// Copies the current intents without consuming anything.
    pub fn peek(&self) -> Frame {
        self.state.lock().clone()
    }
}

/// Pixel-level drawing of a frame. Implementations own the display driver.
pub trait Renderer: Send {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

/// Logs screen contents whenever mode or items change.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last: Option<(Option<ScreenMode>, Vec<String>)>,
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let current = (frame.mode, frame.items.clone());
        if self.last.as_ref() != Some(&current) {
            log::debug!("screen {:?}: {}", frame.mode, frame.items.join(" | "));
            self.last = Some(current);
        }
        if frame.pulse {
            log::trace!("pulse at {:?}, {} bpm", frame.plot, frame.bpm);
        }
        Ok(())
    }
}

/// Counters reported when the render loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub frames: u64,
    pub faults: u64,
}

/// Repaints from [`Screen`] intents on its own thread at a fixed period.
/// Renderer errors and panics are logged and counted, never fatal.
pub struct RenderLoop {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<RenderStats>>,
}

impl RenderLoop {
    pub fn start(screen: Screen, mut renderer: Box<dyn Renderer>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let handle = std::thread::spawn(move || {
            let mut stats = RenderStats::default();
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                let frame = screen.snapshot();
                match panic::catch_unwind(AssertUnwindSafe(|| renderer.render(&frame))) {
                    Ok(Ok(())) => stats.frames += 1,
                    Ok(Err(err)) => {
                        stats.faults += 1;
                        log::error!("render failed: {:#}", err);
                    }
                    Err(_) => {
                        stats.faults += 1;
                        log::error!("renderer panicked, continuing");
                    }
                }
            }
            stats
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) -> RenderStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> RenderStats {
        let _ = self.stop_tx.send(());
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn snapshot_consumes_one_shot_flags() {
        let screen = Screen::new();
        screen.items(&["MEASURE HR", "HISTORY"], MENU_OFFSET);
        screen.set_mode(ScreenMode::Menu);
        screen.mark_pulse();
        let first = screen.snapshot();
        assert!(first.clear && first.items_changed && first.pulse);
        assert_eq!(first.items, vec!["MEASURE HR", "HISTORY"]);
        let second = screen.snapshot();
        assert!(!second.clear && !second.items_changed && !second.pulse);
        assert_eq!(second.mode, Some(ScreenMode::Menu));
        assert_eq!(second.items, first.items);
    }

    #[test]
    fn peek_leaves_flags_alone() {
        let screen = Screen::new();
        screen.clear();
        assert!(screen.peek().clear);
        assert!(screen.peek().clear);
        assert_eq!(screen.peek().plot, PLOT_PARKED);
    }

    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    impl Renderer for Flaky {
        fn render(&mut self, _frame: &Frame) -> anyhow::Result<()> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => anyhow::bail!("bus timeout"),
                1 => panic!("driver fault"),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn render_loop_survives_errors_and_panics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let screen = Screen::new();
        let render = RenderLoop::start(
            screen.clone(),
            Box::new(Flaky {
                calls: Arc::clone(&calls),
            }),
            Duration::from_millis(1),
        );
        while calls.load(Ordering::SeqCst) < 5 {
            screen.heart_rate(60);
            std::thread::sleep(Duration::from_millis(1));
        }
        let stats = render.stop();
        assert_eq!(stats.faults, 2);
        assert!(stats.frames >= 3);
    }
}
