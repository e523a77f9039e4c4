//! Core trait definitions

mod prober;
mod terminal;

pub use prober::Prober;
pub use terminal::Terminal;
