// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Path traversal over the FAT library's one-directory-at-a-time API.

use embedded_sdmmc::{BlockDevice, Directory, Error, TimeSource, Volume};

/// Open the directory at a `/`-separated path, closing each intermediate
/// handle along the way so at most two are ever held.
pub(crate) fn open_dir_at<'a, D, T, const MD: usize, const MF: usize, const MV: usize>(
    volume: &'a mut Volume<D, T, MD, MF, MV>,
    path: &str,
) -> Result<Directory<'a, D, T, MD, MF, MV>, Error<D::Error>>
where
    D: BlockDevice,
    T: TimeSource,
{
    let mut dir = volume.open_root_dir()?;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        dir.change_dir(segment)?;
    }
    Ok(dir)
}

/// Split a full path into its directory part and final segment.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(at) => (&path[..at], &path[at + 1..]),
        None => ("", path),
    }
}
