use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{error, info, warn};

use crate::error::{FlattenError, Result};
use crate::flattener::flatten;
use crate::normalizer::normalize;
use crate::record::read_records;
use crate::table::Table;
use crate::writer::{write_table, Compression};

pub const OUTPUT_EXTENSION: &str = "parquet";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Suffix (without the dot) of the files picked up from the input directory.
    pub input_extension: String,
    pub compression: Compression,
    /// Worker threads for independent artifacts; `None` uses rayon's default.
    pub num_threads: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            input_extension: "json".to_string(),
            compression: Compression::default(),
            num_threads: None,
        }
    }
}

/// What one successfully converted input produced.
#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub output: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// Columns whose values were serialized to text by the normalizer.
    pub serialized_columns: Vec<String>,
}

/// Terminal outcome for one input artifact.
#[derive(Debug)]
pub struct ArtifactOutcome<T> {
    pub input: PathBuf,
    pub result: Result<T>,
}

/// Per-artifact outcomes, in discovery order. Every discovered input has
/// exactly one entry whether it succeeded or not.
#[derive(Debug)]
pub struct BatchReport<T = ArtifactSummary> {
    pub outcomes: Vec<ArtifactOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> impl Iterator<Item = (&Path, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|t| (o.input.as_path(), t)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Path, &FlattenError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.input.as_path(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Lists regular files directly under `dir` whose extension is one of
/// `extensions`, sorted by path.
pub fn discover(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| FlattenError::from_io(dir, e))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| FlattenError::from_io(dir, e))?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.contains(&ext))
            .unwrap_or(false);
        if matches && path.is_file() {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// `<output_dir>/<input stem>.<extension>`
pub fn output_path(input: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{stem}.{extension}"))
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| FlattenError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Applies `convert` to every input and collects one outcome per input.
///
/// A failing input never stops the others; the result order matches `inputs`
/// no matter how the work was scheduled.
pub fn run_batch<T, F>(
    inputs: Vec<PathBuf>,
    num_threads: Option<usize>,
    convert: F,
) -> BatchReport<T>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Sync,
{
    let attempt = |input: PathBuf| {
        let result = convert(&input);
        ArtifactOutcome { input, result }
    };

    let mut builder = ThreadPoolBuilder::new();
    if let Some(n) = num_threads {
        builder = builder.num_threads(n);
    }

    let outcomes: Vec<ArtifactOutcome<T>> = match builder.build() {
        Ok(pool) => pool.install(|| inputs.into_par_iter().map(attempt).collect()),
        Err(e) => {
            warn!(error = %e, "could not start worker pool, processing sequentially");
            inputs.into_iter().map(attempt).collect()
        }
    };

    BatchReport { outcomes }
}

/// Parse -> flatten -> build -> normalize -> write for one input file.
pub fn convert_file(
    input: &Path,
    output: &Path,
    compression: Compression,
) -> Result<ArtifactSummary> {
    let records = read_records(input)?;
    let rows = flatten(&records);
    let mut table = Table::build(rows);
    let serialized_columns = normalize(&mut table);
    write_table(&table, output, compression)?;

    Ok(ArtifactSummary {
        output: output.to_path_buf(),
        rows: table.num_rows(),
        columns: table.num_columns(),
        serialized_columns,
    })
}

/// Converts every matching file in `input_dir` into a parquet file of the
/// same base name in `output_dir`, which is created when missing.
///
/// Only an unreadable input directory or an uncreatable output directory
/// fails the whole run; anything else is recorded against its artifact.
pub fn run(input_dir: &Path, output_dir: &Path, options: &PipelineOptions) -> Result<BatchReport> {
    let inputs = discover(input_dir, &[options.input_extension.as_str()])?;
    ensure_dir(output_dir)?;

    info!(
        inputs = inputs.len(),
        input_dir = %input_dir.display(),
        output_dir = %output_dir.display(),
        "flattening batch"
    );

    let report = run_batch(inputs, options.num_threads, |input| {
        let output = output_path(input, output_dir, OUTPUT_EXTENSION);
        convert_file(input, &output, options.compression)
    });

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => info!(
                input = %outcome.input.display(),
                output = %summary.output.display(),
                rows = summary.rows,
                columns = summary.columns,
                serialized = summary.serialized_columns.len(),
                "flattened"
            ),
            Err(e) => error!(input = %outcome.input.display(), kind = e.kind(), "{e}"),
        }
    }
    log_summary("flatten", &report);

    Ok(report)
}

pub(crate) fn log_summary<T>(stage: &str, report: &BatchReport<T>) {
    let failed = report.failed().count();
    if failed == 0 {
        info!(stage, total = report.len(), "batch complete");
    } else {
        warn!(stage, total = report.len(), failed, "batch complete with failures");
    }
}
