//! Percent progress bars for long loads, searches and exports.
//!
//! Without the `progress` feature the bar is a no-op stand-in with the same
//! interface.

use std::time::Duration;

#[cfg(feature = "progress")]
pub use indicatif::ProgressBar;

#[cfg(not(feature = "progress"))]
pub use self::noop::ProgressBar;

#[cfg(feature = "progress")]
const TEMPLATE: &str = "{msg:>10} [{bar:40.cyan/blue}] {pos:>3}%";

/// Bar counting from 0 to 100, or a hidden one
pub fn percent_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    apply_style(&bar);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

#[cfg(feature = "progress")]
fn apply_style(bar: &ProgressBar) {
    if let Ok(style) = indicatif::ProgressStyle::default_bar().template(TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
}

#[cfg(not(feature = "progress"))]
fn apply_style(_bar: &ProgressBar) {}

#[cfg(not(feature = "progress"))]
mod noop {
    use std::borrow::Cow;
    use std::time::Duration;

    #[derive(Clone)]
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn new(_len: u64) -> Self {
            ProgressBar
        }

        pub fn hidden() -> Self {
            ProgressBar
        }

        pub fn set_message(&self, _msg: impl Into<Cow<'static, str>>) {}
        pub fn enable_steady_tick(&self, _interval: Duration) {}
        pub fn set_position(&self, _pos: u64) {}
        pub fn finish_and_clear(&self) {}
    }
}
