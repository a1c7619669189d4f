//! Formatting shorthands for the `*_fmt` methods of
//! [`Logger`](crate::logger::Logger).
//!
//! The arguments are only formatted when the level is enabled.
//!
//! ```no_run
//! use log_shipper::{log_info, log_error_with};
//! use log_shipper::classify::KindedError;
//! # fn demo(logger: &log_shipper::logger::Logger) {
//! log_info!(logger, "user {} signed in", 42);
//! log_error_with!(logger, &KindedError::validation("bad email"), "signup for {} failed", "bob");
//! # }
//! ```

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debug_fmt(format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.info_fmt(format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warn_fmt(format_args!($($arg)+))
    };
}

/// Error with a formatted message; the second argument is the error.
#[macro_export]
macro_rules! log_error_with {
    ($logger:expr, $err:expr, $($arg:tt)+) => {
        $logger.error_fmt($err, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_panic {
    ($logger:expr, $($arg:tt)+) => {
        $logger.panic_fmt(format_args!($($arg)+))
    };
}
