//! File-backed, memory-mapped arrays of little-endian `u64`.
//!
//! These back the mutable construction-time structures (word segments and
//! documents store). An array belongs to the thread that is building it; once
//! written it is flushed and handed on by path.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{MmapMut, MmapOptions};

use crate::error::{PilumError, Result};

const WORD: usize = 8;

#[derive(Debug)]
pub struct LongArray {
    path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    len: usize,
}

impl LongArray {
    /// Create (or overwrite) a zero-filled array of `len` longs at `path`.
    pub fn create<P: AsRef<Path>>(path: P, len: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| {
                PilumError::storage(format!("Failed to create {}: {e}", path.display()))
            })?;
        file.set_len((len * WORD) as u64)?;

        let mmap = Self::map(&file, &path, len)?;
        Ok(LongArray {
            path,
            file,
            mmap,
            len,
        })
    }

    /// Open an existing array for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PilumError::storage(format!("Failed to open {}: {e}", path.display())))?;

        let bytes = file.metadata()?.len() as usize;
        if bytes % WORD != 0 {
            return Err(PilumError::corruption(format!(
                "{} has size {bytes}, not a multiple of {WORD}",
                path.display()
            )));
        }
        let len = bytes / WORD;
        let mmap = Self::map(&file, &path, len)?;

        Ok(LongArray {
            path,
            file,
            mmap,
            len,
        })
    }

    fn map(file: &File, path: &Path, len: usize) -> Result<Option<MmapMut>> {
        if len == 0 {
            return Ok(None);
        }
        let mmap = unsafe {
            MmapOptions::new().map_mut(file).map_err(|e| {
                PilumError::storage(format!("Failed to mmap file {}: {e}", path.display()))
            })?
        };
        Ok(Some(mmap))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing file in bytes.
    pub fn byte_size(&self) -> u64 {
        (self.len * WORD) as u64
    }

    fn bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(m) => &m[..],
            None => &[],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.mmap {
            Some(m) => &mut m[..],
            None => &mut [],
        }
    }

    /// Read the long at `index`. Panics when out of bounds.
    pub fn get(&self, index: usize) -> u64 {
        LittleEndian::read_u64(&self.bytes()[index * WORD..(index + 1) * WORD])
    }

    /// Write the long at `index`. Panics when out of bounds.
    pub fn set(&mut self, index: usize, value: u64) {
        LittleEndian::write_u64(
            &mut self.bytes_mut()[index * WORD..(index + 1) * WORD],
            value,
        );
    }

    /// Copy `src[src_start..src_end]` into `self` starting at `dst_start` as a
    /// single range transfer.
    pub fn transfer_from(
        &mut self,
        src: &LongArray,
        src_start: usize,
        src_end: usize,
        dst_start: usize,
    ) -> Result<()> {
        if src_end < src_start || src_end > src.len {
            return Err(PilumError::invariant(format!(
                "transfer source range {src_start}..{src_end} outside 0..{}",
                src.len
            )));
        }
        let count = src_end - src_start;
        if dst_start + count > self.len {
            return Err(PilumError::invariant(format!(
                "transfer of {count} longs at {dst_start} overruns destination of {}",
                self.len
            )));
        }
        if count == 0 {
            return Ok(());
        }
        let from = &src.bytes()[src_start * WORD..src_end * WORD];
        self.bytes_mut()[dst_start * WORD..(dst_start + count) * WORD].copy_from_slice(from);
        Ok(())
    }

    /// Sort the records of `record_size` longs in `[start, end)` by their
    /// first long. The range must hold a whole number of records.
    ///
    /// Sorts in place on the mapped region with a heapsort, so no record is
    /// copied off the map.
    pub fn sort_records(&mut self, start: usize, end: usize, record_size: usize) -> Result<()> {
        if record_size == 0 || start > end || end > self.len {
            return Err(PilumError::invariant(format!(
                "cannot sort range {start}..{end} of {} in records of {record_size}",
                self.len
            )));
        }
        if (end - start) % record_size != 0 {
            return Err(PilumError::invariant(format!(
                "range {start}..{end} is not a multiple of record size {record_size}"
            )));
        }
        let n = (end - start) / record_size;
        if n < 2 {
            return Ok(());
        }
        let mut records = Records {
            bytes: &mut self.bytes_mut()[start * WORD..end * WORD],
            width: record_size * WORD,
        };
        for root in (0..n / 2).rev() {
            records.sift_down(root, n);
        }
        for last in (1..n).rev() {
            records.swap(0, last);
            records.sift_down(0, last);
        }
        Ok(())
    }

    /// Shrink the array to `new_len` longs, truncating the backing file.
    pub fn truncate(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.len {
            return Err(PilumError::invariant(format!(
                "cannot truncate {} from {} to larger size {new_len}",
                self.path.display(),
                self.len
            )));
        }
        self.flush()?;
        self.mmap = None;
        self.file.set_len((new_len * WORD) as u64)?;
        self.len = new_len;
        self.mmap = Self::map(&self.file, &self.path, new_len)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        if let Some(m) = &self.mmap {
            m.flush()?;
        }
        Ok(())
    }

    /// Iterate over all values in order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Flush, unmap and remove the backing file.
    pub fn delete(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

/// Fixed-width records over a byte region, keyed by their first long.
struct Records<'a> {
    bytes: &'a mut [u8],
    width: usize,
}

impl Records<'_> {
    #[inline]
    fn key(&self, i: usize) -> u64 {
        LittleEndian::read_u64(&self.bytes[i * self.width..])
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let width = self.width;
        let (left, right) = self.bytes.split_at_mut(hi * width);
        left[lo * width..(lo + 1) * width].swap_with_slice(&mut right[..width]);
    }

    fn sift_down(&mut self, mut root: usize, n: usize) {
        loop {
            let mut child = 2 * root + 1;
            if child >= n {
                return;
            }
            if child + 1 < n && self.key(child + 1) > self.key(child) {
                child += 1;
            }
            if self.key(root) >= self.key(child) {
                return;
            }
            self.swap(root, child);
            root = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_set_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.dat");

        let mut array = LongArray::create(&path, 4).unwrap();
        array.set(0, 10);
        array.set(3, u64::MAX);
        array.flush().unwrap();
        drop(array);

        let array = LongArray::open(&path).unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![10, 0, 0, u64::MAX]);
    }

    #[test]
    fn test_transfer_and_truncate() {
        let dir = tempdir().unwrap();
        let mut src = LongArray::create(dir.path().join("src.dat"), 5).unwrap();
        for i in 0..5 {
            src.set(i, i as u64 * 100);
        }

        let mut dst = LongArray::create(dir.path().join("dst.dat"), 8).unwrap();
        dst.transfer_from(&src, 1, 4, 2).unwrap();
        assert_eq!(dst.get(2), 100);
        assert_eq!(dst.get(4), 300);
        assert!(dst.transfer_from(&src, 0, 5, 6).is_err());

        dst.truncate(5).unwrap();
        assert_eq!(dst.len(), 5);
        assert_eq!(
            std::fs::metadata(dir.path().join("dst.dat")).unwrap().len(),
            40
        );
        assert!(dst.truncate(6).is_err());
    }

    #[test]
    fn test_sort_records() {
        let dir = tempdir().unwrap();
        let mut array = LongArray::create(dir.path().join("r.dat"), 6).unwrap();
        for (i, v) in [9u64, 90, 1, 10, 5, 50].into_iter().enumerate() {
            array.set(i, v);
        }
        array.sort_records(0, 6, 2).unwrap();
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![1, 10, 5, 50, 9, 90]);
    }

    #[test]
    fn test_sort_records_spanning_pages() {
        let dir = tempdir().unwrap();
        let records = 3000;
        let mut array = LongArray::create(dir.path().join("big.dat"), 2 + records * 2).unwrap();
        array.set(0, 77);
        array.set(1, 66);
        for i in 0..records {
            // A permutation of 0..records, with duplicate-free keys.
            let key = (i as u64 * 1237) % records as u64;
            array.set(2 + i * 2, key);
            array.set(2 + i * 2 + 1, key * 3 + 1);
        }

        array.sort_records(2, 2 + records * 2, 2).unwrap();
        assert_eq!(array.get(0), 77);
        assert_eq!(array.get(1), 66);
        for i in 0..records {
            let key = array.get(2 + i * 2);
            assert_eq!(key, i as u64);
            assert_eq!(array.get(2 + i * 2 + 1), key * 3 + 1);
        }

        assert!(array.sort_records(0, 3, 2).is_err());
        assert!(array.sort_records(0, array.len() + 2, 2).is_err());
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.dat");
        let array = LongArray::create(&path, 2).unwrap();
        array.delete().unwrap();
        assert!(!path.exists());
    }
}
