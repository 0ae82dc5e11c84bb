use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BATCH_FILE_PREFIX: &str = "part_";
const BATCH_FILE_EXTENSION: &str = "bin";

/// One cleaned product row. Built by the normalizer, read back by the
/// indexer, and rehydrated from the search engine's `_source` at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub ingredients_text: String,
    #[serde(default)]
    pub nutriscore_grade: String,
}

/// Column-major batch: one vector per field, all the same length. Whole
/// batches are written and read as a unit, never updated in place.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StagedBatch {
    pub codes: Vec<String>,
    pub product_names: Vec<String>,
    pub ingredients_texts: Vec<String>,
    pub nutriscore_grades: Vec<String>,
}

impl StagedBatch {
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn push(&mut self, record: ProductRecord) {
        self.codes.push(record.code);
        self.product_names.push(record.product_name);
        self.ingredients_texts.push(record.ingredients_text);
        self.nutriscore_grades.push(record.nutriscore_grade);
    }

    /// Row view over the columns.
    pub fn records(&self) -> impl Iterator<Item = ProductRecord> + '_ {
        (0..self.len()).map(move |i| ProductRecord {
            code: self.codes[i].clone(),
            product_name: self.product_names[i].clone(),
            ingredients_text: self.ingredients_texts[i].clone(),
            nutriscore_grade: self.nutriscore_grades[i].clone(),
        })
    }
}

pub fn batch_file_path(staging_dir: &Path, batch_index: usize) -> PathBuf {
    staging_dir.join(format!(
        "{}{:05}.{}",
        BATCH_FILE_PREFIX, batch_index, BATCH_FILE_EXTENSION
    ))
}

pub fn write_batch(path: &Path, batch: &StagedBatch) -> Result<()> {
    let bytes = bincode::serialize(batch)
        .with_context(|| format!("Failed to encode staged batch for {:?}", path))?;
    fs::write(path, bytes).with_context(|| format!("Failed to write staged batch {:?}", path))?;
    Ok(())
}

pub fn read_batch(path: &Path) -> Result<StagedBatch> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read staged batch {:?}", path))?;
    bincode::deserialize(&bytes)
        .with_context(|| format!("Failed to decode staged batch {:?}", path))
}

/// All staged batch files under `staging_dir`, sorted by file name so batches
/// are processed in the order they were written.
pub fn list_batch_files(staging_dir: &Path) -> Result<Vec<PathBuf>> {
    if !staging_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let entries = fs::read_dir(staging_dir)
        .with_context(|| format!("Failed to list staging directory {:?}", staging_dir))?;
    for entry in entries {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if name.starts_with(BATCH_FILE_PREFIX) && name.ends_with(BATCH_FILE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(suffix: &str) -> ProductRecord {
        ProductRecord {
            code: format!("300012{}", suffix),
            product_name: format!("Product {}", suffix),
            ingredients_text: format!("water, sugar, salt, flavoring agent {}", suffix),
            nutriscore_grade: "c".to_string(),
        }
    }

    #[test]
    fn test_push_keeps_columns_aligned() {
        let mut batch = StagedBatch::default();
        batch.push(sample_record("a"));
        batch.push(sample_record("b"));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.codes.len(), batch.nutriscore_grades.len());
        assert_eq!(batch.product_names[1], "Product b");
    }

    #[test]
    fn test_batch_round_trip_preserves_all_fields() -> Result<()> {
        let dir = TempDir::new()?;
        let mut batch = StagedBatch::default();
        batch.push(sample_record("a"));
        batch.push(sample_record("b"));

        let path = batch_file_path(dir.path(), 0);
        write_batch(&path, &batch)?;
        let reloaded = read_batch(&path)?;

        let original: Vec<ProductRecord> = batch.records().collect();
        let restored: Vec<ProductRecord> = reloaded.records().collect();
        assert_eq!(original, restored);
        Ok(())
    }

    #[test]
    fn test_list_batch_files_sorted_and_filtered() -> Result<()> {
        let dir = TempDir::new()?;
        let batch = StagedBatch::default();
        write_batch(&batch_file_path(dir.path(), 2), &batch)?;
        write_batch(&batch_file_path(dir.path(), 0), &batch)?;
        write_batch(&batch_file_path(dir.path(), 1), &batch)?;
        fs::write(dir.path().join("notes.txt"), b"ignore me")?;

        let files = list_batch_files(dir.path())?;
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], batch_file_path(dir.path(), 0));
        assert_eq!(files[2], batch_file_path(dir.path(), 2));
        Ok(())
    }

    #[test]
    fn test_list_batch_files_missing_dir_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let missing = dir.path().join("never_created");
        assert!(list_batch_files(&missing)?.is_empty());
        Ok(())
    }
}
