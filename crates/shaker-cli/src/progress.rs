use indicatif::{ProgressBar, ProgressStyle};
use shaker_core::waiting::WaitingHandler;

/// Progress bar on stderr for the long passes of the features generator.
/// Runs are never canceled from the command line.
pub struct ProgressHandler {
    bar: ProgressBar,
}

impl ProgressHandler {
    pub fn new(visible: bool) -> Self {
        let bar = match visible {
            true => ProgressBar::new(0),
            false => ProgressBar::hidden(),
        };
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {msg} [{wide_bar:.cyan/blue}] {pos}/{len}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WaitingHandler for ProgressHandler {
    fn set_waiting_text(&self, text: &str) {
        log::trace!("{}", text);
        self.bar.set_message(text.to_string());
    }

    fn is_run_canceled(&self) -> bool {
        false
    }

    fn set_max_secondary_progress_counter(&self, max: usize) {
        self.bar.set_length(max as u64);
        self.bar.set_position(0);
    }

    fn increase_secondary_progress_counter(&self) {
        self.bar.inc(1);
    }
}
