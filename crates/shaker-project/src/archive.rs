//! Zip archives of a project folder

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::store::EXTENSION;
use crate::{Error, Result};

pub const TEMP_FOLDER: &str = ".shaker_temp";

/// `<parent>/.shaker_temp/<stem>_unzip/`
pub fn extraction_folder(archive: &Path) -> PathBuf {
    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    let stem = archive
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    parent.join(TEMP_FOLDER).join(format!("{}_unzip", stem))
}

pub fn unzip(archive: &Path, destination: &Path) -> Result<()> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    std::fs::create_dir_all(destination)?;
    for ix in 0..zip.len() {
        let mut entry = zip.by_index(ix)?;
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                log::warn!("skipping unsafe archive entry `{}`", entry.name());
                continue;
            }
        };
        let path = destination.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        std::io::copy(&mut entry, &mut file)?;
    }
    log::trace!("unpacked {} entries to {}", zip.len(), destination.display());
    Ok(())
}

fn sorted_entries(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(folder)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

/// Archive-internal name, always `/`-separated
fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Zip the content of `folder` (not the folder itself) into `archive`.
/// Entries are written in path order.
pub fn zip_folder(folder: &Path, archive: &Path) -> Result<()> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut stack = sorted_entries(folder)?;
    stack.reverse();
    let mut n = 0;
    while let Some(path) = stack.pop() {
        let name = entry_name(folder, &path);
        if path.is_dir() {
            writer.add_directory(name, options)?;
            let mut children = sorted_entries(&path)?;
            children.reverse();
            stack.extend(children);
        } else {
            writer.start_file(name, options)?;
            std::io::copy(&mut File::open(&path)?, &mut writer)?;
            n += 1;
        }
    }
    writer.finish()?;
    log::trace!("zipped {} files into {}", n, archive.display());
    Ok(())
}

/// First object store under `folder`, searched breadth first
pub fn find_store(folder: &Path) -> Result<PathBuf> {
    let mut queue = std::collections::VecDeque::from([folder.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        for path in sorted_entries(&dir)? {
            if path.is_dir() {
                queue.push_back(path);
            } else if path.extension().map_or(false, |ext| ext == EXTENSION) {
                return Ok(path);
            }
        }
    }
    Err(Error::MissingStore(folder.to_path_buf()))
}
