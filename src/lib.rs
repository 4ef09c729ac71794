//! Network diagnostics: a ping, jitter, download and upload check with a
//! bounded result history, plus locally observable connectivity facts.

pub mod engine;
pub mod errors;
pub mod fallback;
pub mod history;
pub mod lookup;
pub mod measurements;
pub mod network;
pub mod probes;
pub mod progress;
pub mod render;
pub mod results;
pub mod scheduler;
pub mod stats;
pub mod store;
