use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs;
use std::path::{Path, PathBuf};

use crate::staging::{batch_file_path, write_batch, ProductRecord, StagedBatch};

const CODE_COL: &str = "code";
const PRODUCT_NAME_COL: &str = "product_name";
const INGREDIENTS_COL: &str = "ingredients_text";
const NUTRISCORE_COL: &str = "nutriscore_grade";

/// Rows whose ingredient text is this short carry no usable signal.
pub const MIN_INGREDIENTS_CHARS: usize = 20;

/// Header positions of the retained columns. Columns absent from the source
/// schema stay `None` and their values stage as empty strings.
struct ColumnLayout {
    code: Option<usize>,
    product_name: Option<usize>,
    ingredients_text: Option<usize>,
    nutriscore_grade: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &StringRecord) -> Self {
        let position = |name: &str| headers.iter().position(|h| h == name);
        Self {
            code: position(CODE_COL),
            product_name: position(PRODUCT_NAME_COL),
            ingredients_text: position(INGREDIENTS_COL),
            nutriscore_grade: position(NUTRISCORE_COL),
        }
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_malformed: usize,
    pub rows_dropped: usize,
    pub records_kept: usize,
    pub batch_files: Vec<PathBuf>,
}

impl IngestReport {
    pub fn files_written(&self) -> usize {
        self.batch_files.len()
    }
}

/// Filter rule for one row. The upstream export writes the literal string
/// "nan" for missing values, so it counts as absent.
pub fn keep_record(product_name: &str, ingredients_text: &str) -> bool {
    if product_name.is_empty() || product_name == "nan" {
        return false;
    }
    if ingredients_text.is_empty() || ingredients_text == "nan" {
        return false;
    }
    ingredients_text.chars().count() > MIN_INGREDIENTS_CHARS
}

/// Makes sure `staging_dir` exists and is empty. Wiping previous batches is
/// destructive, so it only happens under `reset`.
pub fn prepare_staging_dir(staging_dir: &Path, reset: bool) -> Result<()> {
    if staging_dir.exists() {
        let occupied = fs::read_dir(staging_dir)
            .with_context(|| format!("Failed to inspect staging directory {:?}", staging_dir))?
            .next()
            .is_some();
        if occupied {
            if !reset {
                bail!(
                    "Staging directory {:?} already holds batches; pass --reset to discard them",
                    staging_dir
                );
            }
            fs::remove_dir_all(staging_dir)
                .with_context(|| format!("Failed to clear staging directory {:?}", staging_dir))?;
        }
    }
    fs::create_dir_all(staging_dir)
        .with_context(|| format!("Failed to create staging directory {:?}", staging_dir))?;
    Ok(())
}

fn field(record: &StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn flush_batch(
    batch: &mut StagedBatch,
    staging_dir: &Path,
    report: &mut IngestReport,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let path = batch_file_path(staging_dir, report.files_written());
    write_batch(&path, batch)?;
    println!(
        "Batch {} written -> {} products kept.",
        report.files_written(),
        batch.len()
    );
    report.batch_files.push(path);
    report.records_kept += batch.len();
    *batch = StagedBatch::default();
    Ok(())
}

/// Streams the raw tab-separated export, keeps the four known columns, drops
/// rows without a usable name or ingredient list, and stages the survivors in
/// batches of `batch_size` source rows. Malformed rows are skipped, an
/// unreadable source file is fatal.
pub fn normalize_source(
    csv_path: &Path,
    staging_dir: &Path,
    batch_size: usize,
    reset: bool,
) -> Result<IngestReport> {
    if !csv_path.exists() {
        bail!("Raw product file not found at: {:?}", csv_path);
    }
    let batch_size = batch_size.max(1);
    prepare_staging_dir(staging_dir, reset)?;

    println!("Reading raw product file: {:?}", csv_path);
    let file = fs::File::open(csv_path)
        .with_context(|| format!("Failed to open raw product file at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let layout = ColumnLayout::from_headers(&headers);

    let mut report = IngestReport::default();
    let mut batch = StagedBatch::default();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(_) => {
                // Rows with a broken field count or encoding are skipped, the
                // reader continues with the next row.
                report.rows_malformed += 1;
                continue;
            }
        };
        report.rows_read += 1;

        let product_name = field(&record, layout.product_name);
        let ingredients_text = field(&record, layout.ingredients_text);
        if keep_record(&product_name, &ingredients_text) {
            batch.push(ProductRecord {
                code: field(&record, layout.code),
                product_name,
                ingredients_text,
                nutriscore_grade: field(&record, layout.nutriscore_grade),
            });
        } else {
            report.rows_dropped += 1;
        }

        if report.rows_read % batch_size == 0 {
            flush_batch(&mut batch, staging_dir, &mut report)?;
        }
    }
    flush_batch(&mut batch, staging_dir, &mut report)?;

    println!(
        "Done. {} products staged in {:?} ({} files).",
        report.records_kept,
        staging_dir,
        report.files_written()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{list_batch_files, read_batch};
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_source(lines: &[&str]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "code\tproduct_name\tbrand\tingredients_text\tnutriscore_grade"
        )?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_keep_record_rules() {
        assert!(keep_record(
            "TestSoda",
            "water, sugar, salt, flavoring agent"
        ));
        // 20 chars or fewer is dropped
        assert!(!keep_record("X", "salt"));
        assert!(!keep_record("X", "exactly twenty chars"));
        assert!(!keep_record("", "water, sugar, salt, flavoring agent"));
        assert!(!keep_record("nan", "water, sugar, salt, flavoring agent"));
        assert!(!keep_record("TestSoda", "nan"));
        assert!(!keep_record("TestSoda", ""));
    }

    #[test]
    fn test_normalize_source_filters_and_stages() -> Result<()> {
        let source = write_source(&[
            "001\tTestSoda\tAcme\twater, sugar, salt, flavoring agent\tc",
            "002\tX\tAcme\tsalt\te",
            "003\t\tAcme\twater, sugar, salt, flavoring agent\tb",
            "004\tnan\tAcme\twater, sugar, salt, flavoring agent\tb",
            "005\tBiscuit\tAcme\twheat flour, butter, sugar, eggs, salt\ta",
            "short\tline",
        ])?;
        let staging = TempDir::new()?;

        let report = normalize_source(source.path(), staging.path(), 100, false)?;
        assert_eq!(report.rows_read, 5);
        assert_eq!(report.rows_malformed, 1);
        assert_eq!(report.rows_dropped, 3);
        assert_eq!(report.records_kept, 2);
        assert_eq!(report.files_written(), 1);

        let files = list_batch_files(staging.path())?;
        assert_eq!(files.len(), 1);
        let batch = read_batch(&files[0])?;
        let names: Vec<String> = batch.product_names.clone();
        assert_eq!(names, vec!["TestSoda", "Biscuit"]);
        assert_eq!(batch.ingredients_texts[0], "water, sugar, salt, flavoring agent");
        Ok(())
    }

    #[test]
    fn test_normalize_source_splits_batches_and_skips_empty_ones() -> Result<()> {
        let source = write_source(&[
            "001\tA\tAcme\twater, sugar, salt, flavoring agent\tc",
            "002\tB\tAcme\twheat flour, butter, sugar, eggs, salt\ta",
            // Second window filters to nothing, so no second file appears.
            "003\tC\tAcme\tsalt\te",
            "004\tD\tAcme\tnan\te",
        ])?;
        let staging = TempDir::new()?;

        let report = normalize_source(source.path(), staging.path(), 2, false)?;
        assert_eq!(report.files_written(), 1);
        assert_eq!(report.records_kept, 2);
        assert_eq!(list_batch_files(staging.path())?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_normalize_source_tolerates_missing_columns() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "product_name\tingredients_text")?;
        writeln!(file, "TestSoda\twater, sugar, salt, flavoring agent")?;
        file.flush()?;
        let staging = TempDir::new()?;

        let report = normalize_source(file.path(), staging.path(), 100, false)?;
        assert_eq!(report.records_kept, 1);
        let batch = read_batch(&list_batch_files(staging.path())?[0])?;
        assert_eq!(batch.codes[0], "");
        assert_eq!(batch.nutriscore_grades[0], "");
        Ok(())
    }

    #[test]
    fn test_occupied_staging_dir_requires_reset() -> Result<()> {
        let source = write_source(&["001\tA\tAcme\twater, sugar, salt, flavoring agent\tc"])?;
        let staging = TempDir::new()?;
        std::fs::write(staging.path().join("part_00000.bin"), b"old")?;

        let result = normalize_source(source.path(), staging.path(), 100, false);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("pass --reset"));

        // With reset the old content is gone and the run succeeds.
        let report = normalize_source(source.path(), staging.path(), 100, true)?;
        assert_eq!(report.records_kept, 1);
        let files = list_batch_files(staging.path())?;
        assert_eq!(files.len(), 1);
        assert!(read_batch(&files[0]).is_ok());
        Ok(())
    }

    #[test]
    fn test_missing_source_file_is_fatal() {
        let staging = TempDir::new().unwrap();
        let result = normalize_source(
            Path::new("this_file_does_not_exist.csv"),
            staging.path(),
            100,
            false,
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Raw product file not found"));
    }
}
