pub mod detectors;
pub mod events;
pub mod io;
pub mod metrics;
pub mod signal;
pub mod time;

pub use detectors::*;
pub use events::*;
pub use metrics::*;
pub use signal::*;
pub use time::*;
