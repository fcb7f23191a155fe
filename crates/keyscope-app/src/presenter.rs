//! Terminal rendering of scan progress and results

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};
use keyscope_core::{Item, ScanProgress, ScanStatus};
use std::io::{self, Write};
use std::time::Duration;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/~{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

/// Message shown next to the spinner or bar
pub fn progress_message(progress: &ScanProgress) -> String {
    let mut message = format!(
        "{} keys, {} batches",
        progress.items_so_far, progress.batches
    );
    if progress.skipped > 0 {
        message.push_str(&format!(", {} skipped", progress.skipped));
    }
    message
}

/// Final status message, phrased for the user
pub fn summary_line(progress: &ScanProgress, visible: usize, predicate: &str) -> String {
    let shown = if predicate.is_empty() {
        format!("{} keys", visible)
    } else {
        format!("{} of {} keys match '{}'", visible, progress.items_so_far, predicate)
    };
    match &progress.status {
        ScanStatus::Completed => format!("Loaded {}", shown),
        ScanStatus::Cancelled => format!("Scan cancelled, showing {} fetched so far", shown),
        ScanStatus::Failed(err) => format!("Error loading keys: {} (showing {} fetched so far)", err, shown),
        other => format!("{} ({})", shown, other),
    }
}

/// Key listing; with metadata the columns are key, kind, TTL and size
pub fn items_table(items: &[Item], with_metadata: bool) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let headers: &[&str] = if with_metadata {
        &["Key", "Kind", "TTL", "Size"]
    } else {
        &["Key"]
    };
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for item in items {
        match (&item.metadata, with_metadata) {
            (Some(metadata), true) => table.add_row(vec![
                item.id.clone(),
                metadata.kind.to_string(),
                metadata.ttl.to_string(),
                metadata.size.to_string(),
            ]),
            (None, true) => table.add_row(vec![
                item.id.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]),
            _ => table.add_row(vec![item.id.clone()]),
        };
    }

    table
}

/// Drives the progress display on stderr and writes the key listing
///
/// Progress starts as a spinner and turns into a bar once the source reports
/// an estimated total. indicatif rate-limits redraws, so a snapshot per batch
/// never floods the terminal.
pub struct Presenter<E: Write, O: Write> {
    bar: ProgressBar,
    status_out: E,
    out: O,
    with_metadata: bool,
    plain: bool,
    sized: bool,
}

impl<E: Write, O: Write> Presenter<E, O> {
    pub fn new(status_out: E, out: O, with_metadata: bool, plain: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self::with_bar(bar, status_out, out, with_metadata, plain)
    }

    pub fn with_bar(bar: ProgressBar, status_out: E, out: O, with_metadata: bool, plain: bool) -> Self {
        Self {
            bar,
            status_out,
            out,
            with_metadata,
            plain,
            sized: false,
        }
    }

    pub fn render_progress(&mut self, progress: &ScanProgress) {
        if !self.sized
            && let Some(total) = progress.estimated_total.filter(|total| *total > 0)
        {
            self.bar.set_length(total);
            self.bar.set_style(bar_style());
            self.sized = true;
        }

        let position = progress.total_appended as u64;
        // The estimate is advisory and may be exceeded
        if self.sized && self.bar.length().is_some_and(|len| position > len) {
            self.bar.set_length(position);
        }
        self.bar.set_position(position);
        self.bar.set_message(progress_message(progress));
    }

    /// Remove the progress display before the listing is printed
    pub fn finish_progress(&self) {
        self.bar.finish_and_clear();
    }

    pub fn render_items(&mut self, items: &[Item]) -> io::Result<()> {
        if self.plain {
            for item in items {
                writeln!(self.out, "{}", item.id)?;
            }
        } else if !items.is_empty() {
            writeln!(self.out, "{}", items_table(items, self.with_metadata))?;
        }
        self.out.flush()
    }

    pub fn render_summary(
        &mut self,
        progress: &ScanProgress,
        visible: usize,
        predicate: &str,
    ) -> io::Result<()> {
        writeln!(self.status_out, "{}", summary_line(progress, visible, predicate))?;
        self.status_out.flush()
    }

    #[cfg(test)]
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (E, O) {
        (self.status_out, self.out)
    }
}
