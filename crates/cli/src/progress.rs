//! Per-phase progress bars.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const FALLBACK_TEMPLATE: &str = "{prefix} [{bar:40}] {pos}/{len} {msg}";

/// Create the bar for one pipeline phase. Hidden when `quiet` is set.
pub fn phase_bar(heading: &str, len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .or_else(|_| ProgressStyle::default_bar().template(FALLBACK_TEMPLATE))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar.set_prefix(heading.to_string());
    bar
}
