// UI layer: turns workflow events into console output. Status lines and URLs
// always go to stdout. Progress is drawn as `indicatif` bars on stderr when it
// is a terminal and printed as plain stdout lines otherwise. Errors are red on
// stderr and the final prompt uses `dialoguer`.

use crate::api::{JobState, JobStatus};
use crate::workflow::{PublishedAsset, Reporter};
use crossterm::style::Stylize;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Stdout, Write};

/// Bars count in hundredths of a percent.
const BAR_SCALE: f64 = 100.0;

/// Format a percentage with up to two decimals, dropping trailing zeros
/// (`12.5`, `33.33`, `100`).
pub fn format_percent(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {percent}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn new_bar(message: String, draw: bool) -> ProgressBar {
    let length = (100.0 * BAR_SCALE) as u64;
    let bar = if draw {
        ProgressBar::new(length)
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(length);
    bar.set_style(bar_style());
    bar.set_message(message);
    bar
}

fn set_percent(bar: &ProgressBar, percent: f64) {
    bar.set_position((percent.clamp(0.0, 100.0) * BAR_SCALE) as u64);
}

/// A bar for one named transfer (upload or download).
struct Transfer {
    file: String,
    bar: ProgressBar,
}

/// Console implementation of the workflow `Reporter`. Status lines always go
/// to `out` (stdout for the application).
pub struct ConsoleReporter<W: Write = Stdout> {
    out: W,
    draw_bars: bool,
    transfer: Option<Transfer>,
    job: Option<ProgressBar>,
    last_state: Option<JobState>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let mut reporter = Self::plain(io::stdout());
        reporter.draw_bars = true;
        reporter
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleReporter<W> {
    /// A reporter that never draws bars and prints progress as lines.
    pub fn plain(out: W) -> Self {
        Self {
            out,
            draw_bars: false,
            transfer: None,
            job: None,
            last_state: None,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn write_line(&mut self, text: &str) {
        // A closed stdout leaves nowhere to report to.
        let _ = writeln!(self.out, "{}", text);
    }

    /// Write a status line, clearing any visible bar while it is written.
    fn line(&mut self, text: &str) {
        let active = self
            .transfer
            .as_ref()
            .map(|t| &t.bar)
            .or(self.job.as_ref())
            .filter(|bar| !bar.is_hidden() && !bar.is_finished())
            .cloned();
        match active {
            Some(bar) => bar.suspend(|| self.write_line(text)),
            None => self.write_line(text),
        }
    }

    fn transfer_progress(&mut self, verb: &str, file: &str, percent: f64) {
        let same_file = self.transfer.as_ref().is_some_and(|t| t.file == file);
        if !same_file {
            if let Some(previous) = self.transfer.take() {
                previous.bar.finish();
            }
            self.transfer = Some(Transfer {
                file: file.to_string(),
                bar: new_bar(format!("{} '{}'", verb, file), self.draw_bars),
            });
        }

        let Some(bar) = self.transfer.as_ref().map(|t| t.bar.clone()) else {
            return;
        };
        set_percent(&bar, percent);
        if bar.is_hidden() {
            self.write_line(&format!("{} '{}' - progress: {}%", verb, file, format_percent(percent)));
        }
        if percent >= 100.0 {
            bar.finish();
        }
    }

    fn finish_all(&mut self) {
        if let Some(transfer) = self.transfer.take() {
            transfer.bar.finish();
        }
        if let Some(job) = self.job.take() {
            job.finish();
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn status(&mut self, line: &str) {
        self.finish_all();
        self.write_line(line);
    }

    fn upload_progress(&mut self, file: &str, percent: f64) {
        self.transfer_progress("Uploading", file, percent);
    }

    fn job_progress(&mut self, status: &JobStatus) {
        let draw = self.draw_bars;
        let bar = self
            .job
            .get_or_insert_with(|| new_bar(format!("Job state: {}", status.state), draw));
        bar.set_message(format!("Job state: {}", status.state));
        set_percent(bar, status.progress);
        let hidden = bar.is_hidden();

        if self.last_state != Some(status.state) {
            self.last_state = Some(status.state);
            self.line(&format!("Job state: {}", status.state));
        }
        if hidden {
            self.write_line(&format!("Job Progress: {}%", format_percent(status.progress)));
        }
    }

    fn published(&mut self, published: &PublishedAsset) {
        self.finish_all();
        match &published.streaming {
            Some(uris) => {
                self.write_line("Urls for Adaptive streaming:");
                self.write_line(&uris.smooth_streaming);
                self.write_line(&uris.hls);
                self.write_line(&uris.mpeg_dash);
            }
            None => self.write_line("The output asset has no streaming manifest; no adaptive streaming urls."),
        }
        self.write_line("");

        self.write_line("Progressive Download Urls");
        for uri in &published.progressive_download {
            self.write_line(&format!("{}\n", uri));
        }
        self.write_line("");
    }

    fn download_progress(&mut self, file: &str, percent: f64) {
        self.transfer_progress("Downloading", file, percent);
    }
}

/// Render an error and its causes, one line each.
pub fn error_lines(err: &anyhow::Error) -> Vec<String> {
    err.chain()
        .enumerate()
        .map(|(i, cause)| {
            if i == 0 {
                cause.to_string()
            } else {
                format!("  caused by: {}", cause)
            }
        })
        .collect()
}

/// Print an error to stderr in red.
pub fn report_error(err: &anyhow::Error) {
    for line in error_lines(err) {
        eprintln!("{}", line.as_str().red());
    }
}

/// Run the whole program body, reporting a failure exactly once through
/// `report`. Returns the process exit status: 0 on success, 1 on failure.
pub fn run_and_report_with<F, R>(body: F, mut report: R) -> u8
where
    F: FnOnce() -> anyhow::Result<()>,
    R: FnMut(&anyhow::Error),
{
    match body() {
        Ok(()) => 0,
        Err(err) => {
            report(&err);
            1
        }
    }
}

/// `run_and_report_with` printing the failure via `report_error`.
pub fn run_and_report<F>(body: F) -> u8
where
    F: FnOnce() -> anyhow::Result<()>,
{
    run_and_report_with(body, report_error)
}

/// Block until the user presses Enter. Without a terminal there is
/// nothing to wait for, so read failures are ignored.
pub fn wait_for_exit() {
    let _ = Input::<String>::new()
        .with_prompt("Press Enter to exit")
        .allow_empty(true)
        .interact_text();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use anyhow::Context;

    #[test]
    fn percent_drops_trailing_zeros() {
        assert_eq!(format_percent(12.5), "12.5");
        assert_eq!(format_percent(100.0), "100");
        assert_eq!(format_percent(33.3333), "33.33");
        assert_eq!(format_percent(0.0), "0");
    }

    #[test]
    fn error_lines_include_causes() {
        let service = ServiceError {
            status: 400,
            code: Some("InvalidJob".into()),
            message: "Bad preset".into(),
        };
        let err = Err::<(), _>(service).context("Submitting job").unwrap_err();
        let lines = error_lines(&err);
        assert_eq!(lines[0], "Submitting job");
        assert_eq!(lines[1], "  caused by: Bad preset (HTTP 400, code InvalidJob)");
    }

    fn job(state: JobState, progress: f64) -> JobStatus {
        JobStatus { state, progress }
    }

    #[test]
    fn job_state_lines_go_to_the_output() {
        let mut reporter = ConsoleReporter::plain(Vec::new());
        reporter.status("Submitting transcoding job...");
        reporter.job_progress(&job(JobState::Processing, 40.0));
        reporter.job_progress(&job(JobState::Processing, 80.0));
        reporter.job_progress(&job(JobState::Finished, 100.0));

        let text = String::from_utf8(reporter.into_output()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Submitting transcoding job...",
                "Job state: Processing",
                "Job Progress: 40%",
                "Job Progress: 80%",
                "Job state: Finished",
                "Job Progress: 100%",
            ]
        );
    }

    #[test]
    fn transfer_progress_lines_go_to_the_output() {
        let mut reporter = ConsoleReporter::plain(Vec::new());
        reporter.upload_progress("clip.mp4", 50.0);
        reporter.upload_progress("clip.mp4", 100.0);

        let text = String::from_utf8(reporter.into_output()).unwrap();
        assert!(text.contains("Uploading 'clip.mp4' - progress: 50%"));
        assert!(text.contains("Uploading 'clip.mp4' - progress: 100%"));
    }
}
