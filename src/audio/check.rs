//! Host call checking
//!
//! Every call into the host audio subsystem goes through [`check`]. A failure
//! is logged with its label and translated message, then handed back as
//! `None`/`false`. Nothing here panics or decides what happens next; aborting
//! an open or falling back to another device is up to the caller.

use crate::audio::error::HostResult;

/// Unwrap a host result, logging the failure under `label`
pub fn check<T>(label: &str, result: HostResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log::error!("[WASAPI] {} (Message: {})", label, err);
            None
        }
    }
}

/// Same as [`check`] for calls without a payload
pub fn succeeded(label: &str, result: HostResult<()>) -> bool {
    check(label, result).is_some()
}

#[cfg(test)]
pub(crate) mod test_log {
    //! Capturing logger shared by the unit tests.
    //!
    //! Records are kept per thread, so tests running in parallel only see
    //! their own output.

    use std::cell::RefCell;

    use log::{Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::Lazy;

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let line = record.args().to_string();
            RECORDS.with(|r| r.borrow_mut().push((record.level(), line)));
        }

        fn flush(&self) {}
    }

    static INSTALLED: Lazy<()> = Lazy::new(|| {
        let _ = log::set_boxed_logger(Box::new(CaptureLogger));
        log::set_max_level(LevelFilter::Trace);
    });

    /// Install the logger (once per process) and clear this thread's records
    pub fn start() {
        Lazy::force(&INSTALLED);
        RECORDS.with(|r| r.borrow_mut().clear());
    }

    /// Records emitted on this thread at `level`
    pub fn lines(level: Level) -> Vec<String> {
        RECORDS.with(|r| {
            r.borrow()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        })
    }

    pub fn count_containing(level: Level, needle: &str) -> usize {
        lines(level).iter().filter(|l| l.contains(needle)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::error::{hresult, HostError};
    use log::Level;

    #[test]
    fn test_success_passes_value_through() {
        test_log::start();
        assert_eq!(check("Could not get device period", Ok(42)), Some(42));
        assert!(succeeded("Play failed", Ok(())));
        assert!(test_log::lines(Level::Error).is_empty());
    }

    #[test]
    fn test_failure_is_logged_with_label() {
        test_log::start();
        let result: HostResult<u32> =
            Err(HostError::from_code(hresult::AUDCLNT_E_DEVICE_INVALIDATED));
        assert_eq!(check("Could not activate device", result), None);

        let errors = test_log::lines(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("[WASAPI] Could not activate device (Message: "));
        assert!(errors[0].contains("unplugged or reconfigured"));
    }

    #[test]
    fn test_succeeded_returns_false_on_failure() {
        test_log::start();
        assert!(!succeeded(
            "Flush failed",
            Err(HostError::from_code(hresult::AUDCLNT_E_NOT_STOPPED))
        ));
        assert_eq!(test_log::count_containing(Level::Error, "Flush failed"), 1);
    }
}
