pub mod history;
pub mod record;
pub mod text;

pub use history::*;
pub use record::*;
pub use text::*;
