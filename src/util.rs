//! Small progress-reporting helpers shared by the streaming passes
//! (`stats::dist`, `train::trainer`, `score::scorer`, `eval::evaluator`).
//! Row counts are not known upfront for any of these passes (the table is
//! read once, start to finish), so a spinner rather than a bounded bar is
//! the right shape here.

use indicatif::{ProgressBar, ProgressStyle};

/// A bounded progress bar for passes where the row count is already known
/// (e.g. a second pass over a file already counted once), mirroring the
/// teacher's `get_master_progress_bar`.
pub fn get_bar(n: u64) -> ProgressBar {
    let bar = ProgressBar::new(n);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/yellow} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    bar
}

/// A spinner ticking on row count, mirroring the teacher's `get_spinner`.
pub fn get_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {pos} {msg}")
            .unwrap()
            .tick_strings(&[
                "▹▹▹▹▹",
                "▸▹▹▹▹",
                "▹▸▹▹▹",
                "▹▹▸▹▹",
                "▹▹▹▸▹",
                "▹▹▹▹▸",
                "▪▪▪▪▪",
            ]),
    );
    spinner
}
