//! 📊 progress.rs — "Are we there yet?" — every reindex, every time, forever.
//!
//! 🚀 Unlike most pipelines, a sync run actually KNOWS how many documents are
//! coming — the count phase asks the collection before population starts. So
//! the bar here is a real bar with a real end, not a spinner of cope.
//!
//! ⚠️  Warning: watching this progress bar will not make it go faster.
//! Neither will refreshing it. We've tried. Science says no.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants. there's a difference and I will die on this hill.
const MIB: u64 = 1024 * 1024;

/// 📦 Bytes, but for humans. "1073741824 bytes" is a war crime in a UI.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        // -- 🐛 raw bytes mode. small syncs need love too.
        format!("{} bytes", bytes)
    }
}

/// 🔢 Commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs" — you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Duration as MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 A snapshot of throughput at any given moment.
struct Rates {
    /// 🚀 documents per second (the headline metric)
    docs_per_sec: f64,
    /// 📦 MiB of bulk payload per second (the bandwidth-bill metric)
    mib_per_sec: f64,
}

/// 📊 Tracks documents synced, payload bytes shipped, and your sanity.
///
/// Uses a 5-second sliding window for rates so one slow batch doesn't read
/// like a seismograph. Position and percent are in documents, because the
/// count phase gave us a real denominator and we intend to use it.
pub(crate) struct ProgressMetrics {
    /// 🏷️ which index is being populated — the label in the panel
    index_name: String,
    /// 🔢 total documents the collection reported (0 = unknown)
    total_docs: u64,
    /// 📄 documents successfully dispatched so far — each one a tiny victory
    synced_docs: u64,
    /// 📦 bulk payload bytes shipped so far, accumulating like technical debt
    synced_bytes: u64,
    /// 🎨 the terminal bar (indicatif does the heavy lifting)
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, docs, bytes) samples
    rate_samples: VecDeque<(Instant, u64, u64)>,
    /// ⏱️ when this whole adventure started
    start_time: Instant,
}

// -- 🎭 custom Debug because ProgressBar is a diva and doesn't derive it
impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMetrics")
            .field("index_name", &self.index_name)
            .field("total_docs", &self.total_docs)
            .field("synced_docs", &self.synced_docs)
            .field("synced_bytes", &self.synced_bytes)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up the metrics, bar sized in documents.
    pub(crate) fn new(index_name: String, total_docs: u64) -> Self {
        let progress_bar = ProgressBar::new(total_docs);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .unwrap() // -- 🐛 safe unwrap: template string is hardcoded and valid, I checked, twice
                .progress_chars("=>-"),
        );

        let start_time = Instant::now();

        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            index_name,
            total_docs,
            synced_docs: 0,
            synced_bytes: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Record one successfully dispatched batch.
    pub(crate) fn update(&mut self, docs: u64, payload_bytes: u64) {
        self.synced_docs += docs;
        self.synced_bytes += payload_bytes;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.synced_docs);
    }

    /// ✅ Ring the bell. We made it. (Or the source ran dry. Same energy.)
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 📈 Rates over a 5-second sliding window.
    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        // 🔄 evict samples older than 5 seconds — a bouncer for data points
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }

        self.rate_samples
            .push_back((now, self.synced_docs, self.synced_bytes));

        if let Some(&(oldest_time, oldest_docs, oldest_bytes)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let docs_delta = self.synced_docs.saturating_sub(oldest_docs);
                let bytes_delta = self.synced_bytes.saturating_sub(oldest_bytes);
                return Rates {
                    docs_per_sec: docs_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }

        // -- 💤 not enough elapsed time yet — zeros, with composure
        Rates {
            docs_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    /// 🎨 Render the panel as a comfy-table message on the bar.
    ///
    /// ```text
    /// index: <name>
    /// | [=====>----------]
    ///   <docs/s>     <synced / total docs>
    ///   <MiB/s>      <payload shipped>
    ///   <elapsed>    <remaining>
    /// ```
    fn render(&self, rates: Rates) {
        let percent = if self.total_docs > 0 {
            (self.synced_docs as f64 / self.total_docs as f64) * 100.0
        } else {
            0.0
        };

        let docs_progress = format!(
            "{} / {} docs",
            format_number(self.synced_docs),
            format_number(self.total_docs)
        );

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation — assumes the future looks like the past.
            // historically a bad assumption, fine for a bulk load.
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        // 🍽️ two columns, right-aligned, no borders (preset: NOTHING —
        // we're minimalists, and also the borders looked bad)
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(rates.docs_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(docs_progress).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} shipped", format_bytes(self.synced_bytes)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%  ({} remaining)", percent, remaining))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("index: {}\n{}", self.index_name, table));
    }
}
