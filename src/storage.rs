//! Persistence of intermediate tables through polars.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::frame::DataFrame;
use polars::prelude::*;
use polars_io::parquet::ParquetWriter;

use crate::error::Result;

/// Merged and imputed (date, borough) table.
pub const SILVER_LAYER: &str = "silver";
/// Featured and labelled table, as used for the split.
pub const GOLD_LAYER: &str = "gold";
pub const TABLE_NAME: &str = "admissions";

pub async fn read_parquet<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

pub async fn write_csv<P: AsRef<Path>>(path: P, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}

pub async fn write_parquet<P: AsRef<Path>>(path: P, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    ParquetWriter::new(&mut file).finish(df)?;
    Ok(())
}

/// Writes `frame` as `<root>/<layer>/admissions.{parquet,csv}` and returns
/// the parquet path.
pub async fn write_layer(root: &Path, layer: &str, frame: &DataFrame) -> Result<PathBuf> {
    let dir = root.join(layer);
    fs::create_dir_all(&dir)?;
    let mut df = frame.clone();

    let parquet_path = dir.join(format!("{}.parquet", TABLE_NAME));
    write_parquet(&parquet_path, &mut df).await?;
    write_csv(dir.join(format!("{}.csv", TABLE_NAME)), &mut df).await?;

    log::info!("{} layer written: {} rows x {} columns", layer, df.height(), df.width());
    Ok(parquet_path)
}
