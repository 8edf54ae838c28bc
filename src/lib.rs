// Library surface for the reaction-time engine and its collaborators.
// The terminal UI lives in the binary and only talks to these modules.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod engine;
pub mod export;
pub mod input_guard;
pub mod logging;
pub mod normative;
pub mod records;
pub mod runtime;
pub mod stats;
pub mod util;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{ConfigError, TestConfig};
pub use engine::{Engine, EngineEvent, Phase};
pub use input_guard::InputVerdict;
pub use normative::{NormativeResult, Sex, Verdict};
pub use stats::{FinalResult, RoundSummary};
