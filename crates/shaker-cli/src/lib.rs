pub mod input;
pub mod output;
pub mod progress;
pub mod runner;
