use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use memmap2::Mmap;
use serde::de::DeserializeOwned;

use crate::error::{ReportError, ReportResult};

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

pub fn open_maybe_gz(path: &Path) -> ReportResult<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_gz(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Decodes a JSON artifact. Plain files are memory-mapped, `.gz` files are
/// decompressed in memory first.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> ReportResult<T> {
    let json_err = |source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    };
    if is_gz(path) {
        let mut buf = Vec::new();
        MultiGzDecoder::new(File::open(path)?).read_to_end(&mut buf)?;
        return serde_json::from_slice(&buf).map_err(json_err);
    }
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(ReportError::Parse(format!("{} is empty", path.display())));
    }
    let mmap = unsafe { Mmap::map(&file)? };
    serde_json::from_slice(&mmap[..]).map_err(json_err)
}

pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
