//! File job
//!
//! Reads one G-code file, runs the engine over it and swaps the result into
//! place. The input is only touched after the engine has succeeded and the
//! output has been written in full.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use skinnydip_core::{
    is_already_processed, Engine, EngineError, ProcessReport, SlicerVariables, HEADER_SIGNATURE,
};
use skinnydip_settings::{Config, OutputSettings};

/// Files involved in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    /// File being processed; holds the result afterwards
    pub input: PathBuf,
    /// Temporary output written before the swap
    pub output: PathBuf,
    /// Where the original goes when it is kept
    pub backup: PathBuf,
    /// Log file next to the input
    pub log: PathBuf,
}

impl JobPaths {
    /// Derive the sibling paths of `input`
    pub fn new(input: &Path, settings: &OutputSettings) -> Result<Self> {
        Ok(Self {
            input: input.to_path_buf(),
            output: with_stem_suffix(input, &settings.output_suffix)?,
            backup: with_stem_suffix(input, &settings.backup_suffix)?,
            log: input.with_file_name(&settings.log_file_name),
        })
    }
}

/// `dir/name.ext` -> `dir/name<suffix>.ext`
fn with_stem_suffix(path: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
    let mut name = format!("{}{}", stem, suffix);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    Ok(path.with_file_name(name))
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Files that were involved
    pub paths: JobPaths,
    /// Engine report
    pub report: ProcessReport,
    /// Whether the original was kept at `paths.backup`
    pub kept_original: bool,
}

/// Processes files according to the user configuration
#[derive(Debug, Clone, Default)]
pub struct FileJob {
    config: Config,
}

impl FileJob {
    /// Create a job runner
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process `input` in place
    ///
    /// A file that already carries the output header is refused before the
    /// engine runs. On an engine error the log is still written and the input
    /// is left untouched.
    pub fn run(&self, input: &Path) -> Result<JobOutcome> {
        let paths = JobPaths::new(input, &self.config.output)?;
        tracing::info!("Processing {}", input.display());

        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;

        // refused before the log of the earlier run is touched
        if is_already_processed(&text) {
            let e = EngineError::AlreadyProcessed {
                signature: HEADER_SIGNATURE.to_string(),
            };
            tracing::warn!("{}", e);
            return Err(anyhow::Error::new(e).context(format!("Refusing {}", input.display())));
        }

        let vars = SlicerVariables::from_document(&text);
        for name in vars.missing() {
            tracing::debug!("slicer variable {} not present", name);
        }

        let engine = Engine::new(self.config.engine.clone());
        let mut report = ProcessReport::new();
        let output = match engine.process_into(&text, &vars, &mut report) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("{}", e);
                self.write_log(&paths, &report, Some(&e))?;
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to process {}", input.display())));
            }
        };

        fs::write(&paths.output, &output)
            .with_context(|| format!("Failed to write {}", paths.output.display()))?;

        let keep = self.config.output.keep_original;
        if keep {
            fs::copy(input, &paths.backup).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    input.display(),
                    paths.backup.display()
                )
            })?;
            tracing::info!("Original kept as {}", paths.backup.display());
        }
        // replaces the input in one step
        fs::rename(&paths.output, input).with_context(|| {
            format!(
                "Failed to move {} to {}",
                paths.output.display(),
                input.display()
            )
        })?;

        self.write_log(&paths, &report, None)?;
        Ok(JobOutcome {
            paths,
            report,
            kept_original: keep,
        })
    }

    fn write_log(
        &self,
        paths: &JobPaths,
        report: &ProcessReport,
        error: Option<&EngineError>,
    ) -> Result<()> {
        if !self.config.output.write_log {
            return Ok(());
        }
        let mut log = String::new();
        let _ = writeln!(log, "Skinnydip v{}", crate::VERSION);
        let _ = writeln!(log, "Target file: {}", paths.input.display());
        let _ = writeln!(log, "Run at: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        log.push_str(&report.log_text());
        match error {
            Some(e) => {
                let _ = writeln!(log, "ERROR: {}", e);
                let _ = writeln!(log, "Input file left unchanged");
            }
            None => {
                let _ = writeln!(log, "Completed");
            }
        }
        fs::write(&paths.log, log)
            .with_context(|| format!("Failed to write log {}", paths.log.display()))
    }
}
