//! Typing-effect scheduling.
//!
//! - `clock`: injectable delay source (`Clock`, `TokioClock`)
//! - `scheduler`: queue-based, cancellable token release
//!   (`TypingScheduler`)

mod clock;
mod scheduler;

pub use clock::{Clock, TokioClock};
pub use scheduler::{TypingScheduler, TypingSink, release_delay, tokenize};
