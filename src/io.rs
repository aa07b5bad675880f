use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use polars::prelude::{KeyValueMetadata, ParquetReader, ParquetWriter, SerReader};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{IoError, PhrasecastError, PhrasecastResult},
    store::frame::FrameCodec,
};

const BUFFER_SIZE: usize = 128 * 1024;

// ================================================================================================
// Tables
// ================================================================================================

/// String key/value pairs kept in the Parquet footer of a table file.
///
/// They are written and renamed together with the rows, so state stored here
/// can never disagree with the table it describes.
pub type TableMetadata = BTreeMap<String, String>;

/// Loads a persisted table.
///
/// Returns `Ok(None)` when no file exists at `path`. A file that exists but
/// cannot be decoded is a [`IoError::CorruptTable`]; nothing is substituted.
pub fn load_table<T: FrameCodec>(path: &Path) -> PhrasecastResult<Option<T>> {
    Ok(load_table_with_metadata(path)?.map(|(table, _)| table))
}

/// Loads a persisted table together with its footer metadata.
#[tracing::instrument(skip_all, fields(table = T::TABLE, path = %path.display()))]
pub fn load_table_with_metadata<T: FrameCodec>(path: &Path) -> PhrasecastResult<Option<(T, TableMetadata)>> {
    let Some(file) = open_existing(path)? else {
        tracing::debug!("No persisted table found");
        return Ok(None);
    };

    let mut reader = ParquetReader::new(BufReader::with_capacity(BUFFER_SIZE, file));
    let metadata: TableMetadata = reader
        .get_metadata()
        .map_err(|e| corrupt(T::TABLE, path, e))?
        .key_value_metadata()
        .iter()
        .flatten()
        .filter_map(|kv| kv.value.clone().map(|value| (kv.key.clone(), value)))
        .collect();
    let df = reader.finish().map_err(|e| corrupt(T::TABLE, path, e))?;
    let table = T::from_frame(&df).map_err(|e| corrupt(T::TABLE, path, e))?;

    tracing::debug!(rows = df.height(), "Loaded persisted table");
    Ok(Some((table, metadata)))
}

/// Persists a table, replacing any previous file atomically.
pub fn save_table<T: FrameCodec>(table: &T, path: &Path) -> PhrasecastResult<()> {
    save_table_with_metadata(table, &TableMetadata::new(), path)
}

/// Persists a table and its footer metadata with a single atomic replace.
#[tracing::instrument(skip_all, fields(table = T::TABLE, path = %path.display()))]
pub fn save_table_with_metadata<T: FrameCodec>(
    table: &T,
    metadata: &TableMetadata,
    path: &Path,
) -> PhrasecastResult<()> {
    let mut df = table.to_frame()?;
    let key_values = (!metadata.is_empty()).then(|| {
        KeyValueMetadata::from_static(
            metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    });
    atomic_write(T::TABLE, path, |writer| {
        ParquetWriter::new(writer)
            .with_key_value_metadata(key_values)
            .finish(&mut df)
            .map(|_| ())
            .map_err(|e| e.to_string())
    })?;

    tracing::debug!(rows = df.height(), "Saved table");
    Ok(())
}

// ================================================================================================
// Postcard Blobs
// ================================================================================================

/// Reads a postcard-encoded value, `Ok(None)` when the file is absent.
pub fn load_postcard<T: DeserializeOwned>(table: &str, path: &Path) -> PhrasecastResult<Option<T>> {
    let Some(mut file) = open_existing(path)? else {
        return Ok(None);
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| corrupt(table, path, e))?;

    postcard::from_bytes(&data)
        .map(Some)
        .map_err(|e| corrupt(table, path, e))
}

pub fn save_postcard<T: Serialize>(value: &T, table: &str, path: &Path) -> PhrasecastResult<()> {
    let bytes = postcard::to_stdvec(value).map_err(|e| write_failed(table, path, e))?;
    atomic_write(table, path, |writer| {
        writer.write_all(&bytes).map_err(|e| e.to_string())
    })
}

// ================================================================================================
// Helpers
// ================================================================================================

fn open_existing(path: &Path) -> PhrasecastResult<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IoError::Io(e).into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// Writes into a sibling temp file, flushes, then renames over `path`.
///
/// On any failure the temp file is removed and `path` is left as it was.
fn atomic_write<F>(table: &str, path: &Path, write: F) -> PhrasecastResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), String>,
{
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            IoError::FileSystem(format!("Failed to create directory {}: {e}", dir.display()))
        })?;
    }

    let tmp = temp_path(path);
    let result = File::create(&tmp)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
            write(&mut writer)?;
            writer.flush().map_err(|e| e.to_string())?;
            writer
                .into_inner()
                .map_err(|e| e.to_string())?
                .sync_all()
                .map_err(|e| e.to_string())
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| e.to_string()));

    result.map_err(|reason| {
        let _ = fs::remove_file(&tmp);
        tracing::error!(table, path = %path.display(), %reason, "Write failed");
        write_failed(table, path, reason)
    })
}

fn corrupt(table: &str, path: &Path, reason: impl ToString) -> PhrasecastError {
    IoError::CorruptTable {
        table: table.to_string(),
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

fn write_failed(table: &str, path: &Path, reason: impl ToString) -> PhrasecastError {
    IoError::WriteFailed {
        table: table.to_string(),
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}
