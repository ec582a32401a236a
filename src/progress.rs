//! Progress tracking for batch inspection
//!
//! Batch operations report stage transitions and completion counts through
//! [`ProgressCallback`]. [`ProgressTracker`] prints plain text progress lines;
//! the binary also has an `indicatif` bar for interactive terminals.

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

/// Receives progress from batch operations.
///
/// Called from worker threads, so implementations must be `Sync`.
pub trait ProgressCallback: Send + Sync {
    /// A stage begins
    fn on_step_start(&self, step: &str);

    /// `current` of `total` items are done
    fn on_step_progress(&self, current: usize, total: usize);

    /// A stage ends
    fn on_step_complete(&self, step: &str, message: &str);

    /// Extra detail for very verbose output
    fn on_debug(&self, message: &str);
}

/// Ignores all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_step_start(&self, _step: &str) {}
    fn on_step_progress(&self, _current: usize, _total: usize) {}
    fn on_step_complete(&self, _step: &str, _message: &str) {}
    fn on_debug(&self, _message: &str) {}
}

/// Batch processing stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingStage {
    #[default]
    Initializing,
    /// Normalizing raw scans into pages
    Cutting,
    /// Classifying page patches
    Classifying,
    /// Confirming candidates and writing collages
    Confirming,
    Completed,
}

impl ProcessingStage {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Initializing => "Initializing",
            ProcessingStage::Cutting => "Cutting",
            ProcessingStage::Classifying => "Classifying",
            ProcessingStage::Confirming => "Confirming",
            ProcessingStage::Completed => "Completed",
        }
    }

    /// Stage for a step label reported through [`ProgressCallback`]
    pub fn from_step(step: &str) -> Self {
        [
            ProcessingStage::Cutting,
            ProcessingStage::Classifying,
            ProcessingStage::Confirming,
            ProcessingStage::Completed,
        ]
        .into_iter()
        .find(|stage| step.starts_with(stage.name()))
        .unwrap_or_default()
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// No output
    Quiet,
    /// Stage lines only
    #[default]
    Normal,
    /// Item-level progress
    Verbose,
    /// Progress plus debug detail
    VeryVerbose,
}

impl OutputMode {
    pub fn from_verbosity(level: u8) -> Self {
        match level {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }
}

/// Progress bar width in characters
const PROGRESS_BAR_WIDTH: usize = 40;

/// Build a progress bar string
pub fn build_progress_bar(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = (percent as usize * PROGRESS_BAR_WIDTH) / 100;
    let empty = PROGRESS_BAR_WIDTH - filled;
    format!("[{}{}]", "=".repeat(filled), "-".repeat(empty))
}

/// Whole-number completion percentage
pub fn percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) as f64 / total as f64) * 100.0) as u8
}

#[derive(Debug)]
struct TrackerState {
    stage: ProcessingStage,
    current: usize,
    total: usize,
    stage_start: Instant,
}

/// Plain text progress printer
#[derive(Debug)]
pub struct ProgressTracker {
    output_mode: OutputMode,
    state: Mutex<TrackerState>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(OutputMode::Normal)
    }
}

impl ProgressTracker {
    pub fn new(output_mode: OutputMode) -> Self {
        Self {
            output_mode,
            state: Mutex::new(TrackerState {
                stage: ProcessingStage::Initializing,
                current: 0,
                total: 0,
                stage_start: Instant::now(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stage(&self) -> ProcessingStage {
        self.state().stage
    }

    /// Items done and total in the current stage
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state();
        (state.current, state.total)
    }

    /// Print final summary over all books
    pub fn print_summary(total_books: usize, ok_count: usize, error_count: usize) {
        println!();
        println!("{}", "=".repeat(80));
        println!("Inspection Summary");
        println!("{}", "=".repeat(80));
        println!("  Total books:  {}", total_books);
        println!("  Succeeded:    {}", ok_count);
        println!("  Errors:       {}", error_count);
        println!("{}", "=".repeat(80));
        println!();
    }
}

impl ProgressCallback for ProgressTracker {
    fn on_step_start(&self, step: &str) {
        {
            let mut state = self.state();
            state.stage = ProcessingStage::from_step(step);
            state.current = 0;
            state.total = 0;
            state.stage_start = Instant::now();
        }
        if self.output_mode.should_show(OutputMode::Normal) {
            println!("  Stage: {}", step);
        }
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        {
            let mut state = self.state();
            state.current = current;
            state.total = total;
        }
        if self.output_mode.should_show(OutputMode::Verbose) && total > 0 {
            let pct = percent(current, total);
            print!(
                "\r    {} {:3}% ({}/{})",
                build_progress_bar(pct),
                pct,
                current,
                total
            );
            let _ = io::stdout().flush();
        }
    }

    fn on_step_complete(&self, step: &str, message: &str) {
        let elapsed = {
            let mut state = self.state();
            state.stage = ProcessingStage::Completed;
            state.stage_start.elapsed()
        };
        if self.output_mode.should_show(OutputMode::Verbose) {
            println!();
        }
        if self.output_mode.should_show(OutputMode::Normal) {
            println!("    {}: {} ({:.2}s)", step, message, elapsed.as_secs_f64());
        }
    }

    fn on_debug(&self, message: &str) {
        if self.output_mode.should_show(OutputMode::VeryVerbose) {
            println!("    [DEBUG] {}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_progress_bar() {
        assert_eq!(build_progress_bar(0), "[----------------------------------------]");
        assert_eq!(build_progress_bar(50), "[====================--------------------]");
        assert_eq!(build_progress_bar(100), "[========================================]");
        // clamped
        assert_eq!(build_progress_bar(150), "[========================================]");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(12, 10), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_stage_from_step() {
        assert_eq!(ProcessingStage::from_step("Cutting B123"), ProcessingStage::Cutting);
        assert_eq!(
            ProcessingStage::from_step("Classifying B123"),
            ProcessingStage::Classifying
        );
        assert_eq!(ProcessingStage::from_step("whatever"), ProcessingStage::Initializing);
    }

    #[test]
    fn test_tracker_follows_callbacks() {
        let tracker = ProgressTracker::new(OutputMode::Quiet);
        tracker.on_step_start("Classifying B1");
        assert_eq!(tracker.stage(), ProcessingStage::Classifying);
        tracker.on_step_progress(3, 8);
        assert_eq!(tracker.counts(), (3, 8));
        tracker.on_step_complete("Classifying", "8 pages");
        assert_eq!(tracker.stage(), ProcessingStage::Completed);
    }

    #[test]
    fn test_output_mode_levels() {
        assert!(!OutputMode::Quiet.should_show(OutputMode::Normal));
        assert!(OutputMode::Normal.should_show(OutputMode::Normal));
        assert!(!OutputMode::Normal.should_show(OutputMode::Verbose));
        assert!(OutputMode::Verbose.should_show(OutputMode::Verbose));
        assert!(!OutputMode::Verbose.should_show(OutputMode::VeryVerbose));
        assert!(OutputMode::VeryVerbose.should_show(OutputMode::VeryVerbose));
    }

    #[test]
    fn test_output_mode_from_verbosity() {
        assert_eq!(OutputMode::from_verbosity(0), OutputMode::Normal);
        assert_eq!(OutputMode::from_verbosity(1), OutputMode::Verbose);
        assert_eq!(OutputMode::from_verbosity(7), OutputMode::VeryVerbose);
    }
}
