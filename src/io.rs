use std::{
    fs::File,
    os::unix::fs::FileExt,
    path::Path,
};

use crate::{
    deps::log::debug,
    error::Error,
};


/// Read `count` consecutive u64 words from `file` starting at the `index`-th
/// word. Offsets are in words, not bytes, matching the record layout of
/// /proc/self/pagemap and /proc/kpageflags. Reads are positional so
/// concurrent readers never race on a shared cursor. A short read is an
/// error.
pub fn read_u64_slice_at(
    file: &File,
    count: usize,
    index: u64,
) -> Result<Vec<u64>, Error> {
    const WORD: usize = std::mem::size_of::<u64>();

    let mut buf = vec![0u8; WORD * count];
    file.read_exact_at(&mut buf, index * WORD as u64)?;

    let mut words = Vec::with_capacity(count);
    for chunk in buf.chunks_exact(WORD) {
        let mut raw = [0u8; WORD];
        raw.copy_from_slice(chunk);
        words.push(u64::from_ne_bytes(raw));
    }

    Ok(words)
}


/// Read the single u64 word at the `index`-th record of `file`.
pub fn read_u64_at(
    file: &File,
    index: u64,
) -> Result<u64, Error> {
    let mut buf = 0u64.to_ne_bytes();
    let word_len = buf.len() as u64;
    file.read_exact_at(&mut buf, index * word_len)?;
    Ok(u64::from_ne_bytes(buf))
}


pub fn open_readonly(path: &Path) -> Result<File, std::io::Error> {
    debug!("opening file: {:?}", path);
    std::fs::File::open(&path)
}
