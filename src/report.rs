//! End-of-run summary and the plain-text acquisition report

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::admission::AdmissionSnapshot;
use crate::error::Result;
use crate::stats::StatisticsSnapshot;

const RATE_SAMPLE: usize = 5;
const ISSUE_SAMPLE: usize = 10;
const MIB: f64 = 1024.0 * 1024.0;

/// Everything known about a finished run
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Local time the run started
    pub started_at: DateTime<Local>,
    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Configured download limit (None = unlimited)
    pub limit: Option<u64>,
    /// Worker pool size
    pub threads: usize,
    /// Processed log used for the run
    pub processed_log: PathBuf,
    /// Hashes read from the processed log at startup
    pub loaded_from_log: usize,
    /// Final admission counters
    pub admission: AdmissionSnapshot,
    /// Final statistics
    pub statistics: StatisticsSnapshot,
}

impl RunSummary {
    /// Render the plain-text acquisition report
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// File name used by [`write_report`]
    pub fn report_file_name(&self) -> String {
        format!(
            "acquisition_report_{}.txt",
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }

    fn limit_line(&self) -> String {
        match self.limit {
            Some(n) => n.to_string(),
            None => "Unlimited (until feed ends)".to_string(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.statistics;
        let mut out = String::new();

        writeln!(
            out,
            "--- Acquisition Report ({}) ---",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(
            out,
            "Total Operation Duration: {:.2} seconds",
            self.duration.as_secs_f64()
        )?;
        writeln!(
            out,
            "Maximum Successful Acquisitions: {}",
            self.limit_line()
        )?;
        writeln!(out, "Threads Used: {}", self.threads)?;
        writeln!(out)?;

        writeln!(out, "Hash Feed Activity:")?;
        writeln!(out, "  Pages Fetched: {}", stats.pages_fetched)?;
        writeln!(out, "  Total Hashes Seen (raw count): {}", stats.hashes_seen)?;
        writeln!(out, "  Entries Without SHA256: {}", stats.malformed)?;
        writeln!(
            out,
            "  Loaded from '{}' at start: {}",
            self.processed_log.display(),
            self.loaded_from_log
        )?;
        writeln!(
            out,
            "  Skipped (already processed): {}",
            stats.skipped_processed
        )?;
        writeln!(out, "  Skipped (duplicate on page): {}", stats.page_duplicates)?;
        writeln!(
            out,
            "  Skipped (file already existed locally): {}",
            stats.already_present
        )?;
        writeln!(out)?;

        writeln!(out, "Download Outcome:")?;
        writeln!(
            out,
            "  Successfully Acquired (new files downloaded): {}",
            stats.downloaded
        )?;
        writeln!(
            out,
            "  Counted Toward Limit (downloaded or already present): {}",
            self.admission.succeeded
        )?;
        writeln!(
            out,
            "  Download Attempts Failed (after all retries): {}",
            self.admission.failed
        )?;

        if stats.downloaded > 0 {
            writeln!(
                out,
                "  Total Payload Acquired: {} bytes ({:.2} MB)",
                stats.bytes_downloaded,
                stats.bytes_downloaded as f64 / MIB
            )?;

            let with_rates = stats.transfers.iter().filter(|t| t.rate().is_some()).count();
            match stats.aggregate_rate() {
                Some(rate) => writeln!(
                    out,
                    "  Effective Aggregate Download Rate ({with_rates} files with rate data): {rate:.2} bytes/second"
                )?,
                None => {
                    let secs = self.duration.as_secs_f64();
                    let overall = if secs > 0.0 {
                        stats.bytes_downloaded as f64 / secs
                    } else {
                        0.0
                    };
                    writeln!(
                        out,
                        "  Overall Acquisition Rate (based on total duration): {overall:.2} bytes/second"
                    )?;
                }
            }

            if !stats.transfers.is_empty() {
                writeln!(out)?;
                writeln!(
                    out,
                    "  --- Sample of Individual Download Rates (first {RATE_SAMPLE}) ---"
                )?;
                for transfer in stats.transfers.iter().take(RATE_SAMPLE) {
                    writeln!(
                        out,
                        "    {}: {:.2} bytes/second ({:.2} MB)",
                        transfer.name,
                        transfer.rate().unwrap_or(0.0),
                        transfer.bytes as f64 / MIB
                    )?;
                }
                if stats.transfers.len() > RATE_SAMPLE {
                    writeln!(out, "    ... and more.")?;
                }
            }
        } else {
            writeln!(out, "  No new files were downloaded in this session.")?;
        }

        if !stats.status_codes.is_empty() {
            writeln!(out)?;
            writeln!(out, "--- HTTP Status Code Summary ---")?;
            for (code, count) in &stats.status_codes {
                writeln!(out, "  HTTP {code}: {count} times")?;
            }
        }

        if !stats.issues.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "--- Error/Issue Summary (first {ISSUE_SAMPLE} unique) ---"
            )?;
            for (kind, count) in stats.issues.iter().take(ISSUE_SAMPLE) {
                writeln!(out, "  {kind}: {count} times")?;
            }
            if stats.issues.len() > ISSUE_SAMPLE {
                writeln!(out, "  ... and more unique errors.")?;
            }
        }

        writeln!(out)?;
        write!(out, "--- End of Report ---")?;

        f.write_str(&out)
    }
}

/// Write the rendered report into `dir` and return the path written
///
/// # Errors
/// Returns error if the directory cannot be created or the file cannot be written
pub async fn write_report(summary: &RunSummary, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(summary.report_file_name());
    tokio::fs::write(&path, format!("{}\n", summary.render())).await?;
    tracing::info!(path = %path.display(), "Report saved");
    Ok(path)
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
