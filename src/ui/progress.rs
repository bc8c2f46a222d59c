//! Upload progress with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress of the upload phase.
///
/// Shows an indicatif bar in interactive mode; otherwise nothing per file,
/// and one summary line at the end.
pub struct UploadProgress {
    bar: Option<ProgressBar>,
    total: u64,
    done: u64,
}

impl UploadProgress {
    /// Create a progress indicator for `total` files
    pub fn new(ctx: &UiContext, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() && total > 0 {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} Uploading  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .map(|s| s.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            total,
            done: 0,
        }
    }

    /// Mark the start of one file
    pub fn start_file(&self, name: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(name.to_string());
        }
    }

    /// Mark one file as uploaded
    pub fn file_done(&mut self) {
        self.done += 1;
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    /// Finish and clear the bar; report the count in plain mode
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        } else if self.total > 0 {
            eprintln!(
                "{} Uploaded {}/{} files",
                style("[OK]").green(),
                self.done,
                self.total
            );
        }
    }
}
