//! Tracing utilities for pipeline instrumentation
//!
//! Thin macros over `tracing` so call sites in the decode and render steps
//! stay one line long.
//!
//! # Usage
//!
//! ```rust,ignore
//! fn render_one() {
//!     let _guard = trace_enter!("render.png");
//!     // ... function body
//! }
//! ```

/// Create a `DEBUG` tracing span
#[macro_export]
macro_rules! trace_span {
    ($name:expr) => {
        tracing::span!(tracing::Level::DEBUG, $name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::span!(tracing::Level::DEBUG, $name, $($field)*)
    };
}

/// Enter a `DEBUG` tracing span, returning the guard
#[macro_export]
macro_rules! trace_enter {
    ($name:expr) => {
        tracing::span!(tracing::Level::DEBUG, $name).entered()
    };
    ($name:expr, $($field:tt)*) => {
        tracing::span!(tracing::Level::DEBUG, $name, $($field)*).entered()
    };
}

/// Log a `DEBUG` tracing event
#[macro_export]
macro_rules! trace_event {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

pub use trace_enter;
pub use trace_event;
pub use trace_span;

#[cfg(test)]
mod tests {

    #[test]
    fn test_trace_macros_compile() {
        let _span = trace_span!("test_span");
        let _guard = trace_enter!("test_enter");
        let _fielded = trace_enter!("test_enter_fields", utterance = "spk1_utt1");
        trace_event!("test event");
    }
}
