pub mod config;
pub mod display;
pub mod format;
pub mod hardware;
pub mod input;
pub mod runner;
pub mod sampler;
pub mod sim;
pub mod states;

pub use config::DeviceConfig;
pub use display::{Frame, LogRenderer, RenderLoop, Renderer, Screen, ScreenMode};
pub use hardware::{Hardware, Led};
pub use input::{Button, Debouncer, Input, Rotary};
pub use runner::PulseCheck;
pub use sampler::{QueueSampler, SampleTimer, Sampler};
pub use sim::{PpgSynth, SimBoard, SimOptions, Simulation};
pub use states::{State, StateKind};
