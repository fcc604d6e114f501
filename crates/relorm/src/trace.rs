//! Internal debug events, compiled out without the `tracing` feature.

/// `tracing::debug!` under the `relorm` target.
macro_rules! debug_event {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!(target: "relorm", $($arg)*);
        }
    };
}

pub(crate) use debug_event;
