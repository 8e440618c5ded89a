//! Database files.
//!
//! A database file is a header followed by every record:
//!
//! ```text
//! magic "CABINET\0" | kind u8 | opts u8 | reserved [u8; 6] | count u64
//! count x ( ksiz u32 | vnum u32 | key | vnum x ( vsiz u32 | value ) )
//! ```
//!
//! All integers are little-endian. The whole file is rewritten on every flush.

use crate::ecode::*;
use crate::store::Record;
use fs2::FileExt;
use std::ffi::c_int;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"CABINET\0";
const HEADER_SIZE: usize = 24;

/// The structure stored in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FileKind {
    Hash = 1,
    Tree = 2,
}

/// An open database file, locked according to its open mode.
#[derive(Debug)]
pub(crate) struct DbFile {
    file: File,
    writable: bool,
    sync: bool,
    locked: bool,
}

impl DbFile {
    /// Opens a database file according to a `*DBO*` mode bitmask.
    ///
    /// Returns the file together with the records it holds. A file created or
    /// truncated by this call is written out empty immediately.
    pub(crate) fn open(
        path: &Path,
        omode: c_int,
        kind: FileKind,
    ) -> Result<(Self, Vec<Record>, u8), c_int> {
        let writable = omode & crate::BDBOWRITER != 0;
        let create = writable && omode & crate::BDBOCREAT != 0;
        let truncate = writable && omode & crate::BDBOTRUNC != 0;

        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(create)
            .truncate(false)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TCENOFILE,
                io::ErrorKind::PermissionDenied => TCENOPERM,
                _ => TCEOPEN,
            })?;

        let mut db = Self {
            file,
            writable,
            sync: omode & crate::BDBOTSYNC != 0,
            locked: false,
        };
        if omode & crate::BDBONOLCK == 0 {
            db.lock(omode & crate::BDBOLCKNB != 0)?;
        }

        let len = db.file.metadata().map_err(|_| TCESTAT)?.len();
        if truncate || len == 0 {
            if !writable {
                return Err(TCEMETA);
            }
            db.write(kind, 0, &[])?;
            return Ok((db, Vec::new(), 0));
        }

        let mut raw = Vec::with_capacity(len as usize);
        db.file.read_to_end(&mut raw).map_err(|_| TCEREAD)?;
        let (opts, records) = decode(&raw, kind)?;
        Ok((db, records, opts))
    }

    fn lock(&mut self, nonblocking: bool) -> Result<(), c_int> {
        let result = match (self.writable, nonblocking) {
            (true, true) => FileExt::try_lock_exclusive(&self.file),
            (true, false) => FileExt::lock_exclusive(&self.file),
            (false, true) => FileExt::try_lock_shared(&self.file),
            (false, false) => FileExt::lock_shared(&self.file),
        };
        result.map_err(|_| TCELOCK)?;
        self.locked = true;
        Ok(())
    }

    pub(crate) fn writable(&self) -> bool {
        self.writable
    }

    /// Whether every transaction commit must reach the disk.
    pub(crate) fn tsync(&self) -> bool {
        self.sync
    }

    /// Rewrites the file with the given records.
    pub(crate) fn write(&mut self, kind: FileKind, opts: u8, records: &[Record]) -> Result<(), c_int> {
        let raw = encode(kind, opts, records);
        self.file.set_len(0).map_err(|_| TCETRUNC)?;
        self.file.seek(SeekFrom::Start(0)).map_err(|_| TCESEEK)?;
        self.file.write_all(&raw).map_err(|_| TCEWRITE)?;
        self.file.flush().map_err(|_| TCEWRITE)?;
        if self.sync {
            self.file.sync_all().map_err(|_| TCESYNC)?;
        }
        Ok(())
    }

    /// Forces written data to the disk.
    pub(crate) fn sync_all(&self) -> Result<(), c_int> {
        self.file.sync_all().map_err(|_| TCESYNC)
    }

    /// Current size of the file on disk.
    pub(crate) fn size(&self) -> Result<u64, c_int> {
        Ok(self.file.metadata().map_err(|_| TCESTAT)?.len())
    }
}

impl Drop for DbFile {
    fn drop(&mut self) {
        if self.locked {
            let _ = FileExt::unlock(&self.file);
        }
    }
}

/// Writes the records to a new file at `path`.
pub(crate) fn copy_to(path: &Path, kind: FileKind, opts: u8, records: &[Record]) -> Result<(), c_int> {
    let raw = encode(kind, opts, records);
    let mut file = File::create(path).map_err(|_| TCEOPEN)?;
    file.write_all(&raw).map_err(|_| TCEWRITE)?;
    file.sync_all().map_err(|_| TCESYNC)
}

/// Number of bytes the records occupy once written.
pub(crate) fn encoded_size(records: &[Record]) -> u64 {
    let body: usize = records
        .iter()
        .map(|r| 8 + r.key.len() + r.vals.iter().map(|v| 4 + v.len()).sum::<usize>())
        .sum();
    (HEADER_SIZE + body) as u64
}

fn encode(kind: FileKind, opts: u8, records: &[Record]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(encoded_size(records) as usize);
    raw.extend_from_slice(MAGIC);
    raw.push(kind as u8);
    raw.push(opts);
    raw.extend_from_slice(&[0; 6]);
    raw.extend_from_slice(&(records.len() as u64).to_le_bytes());
    for record in records {
        raw.extend_from_slice(&(record.key.len() as u32).to_le_bytes());
        raw.extend_from_slice(&(record.vals.len() as u32).to_le_bytes());
        raw.extend_from_slice(&record.key);
        for val in &record.vals {
            raw.extend_from_slice(&(val.len() as u32).to_le_bytes());
            raw.extend_from_slice(val);
        }
    }
    raw
}

fn decode(raw: &[u8], kind: FileKind) -> Result<(u8, Vec<Record>), c_int> {
    if raw.len() < HEADER_SIZE || &raw[..8] != MAGIC || raw[8] != kind as u8 {
        return Err(TCEMETA);
    }
    let opts = raw[9];
    let count = u64::from_le_bytes(raw[16..24].try_into().map_err(|_| TCEMETA)?);

    let mut reader = Reader { raw, pos: HEADER_SIZE };
    let mut records = Vec::new();
    for _ in 0..count {
        let ksiz = reader.u32()? as usize;
        let vnum = reader.u32()? as usize;
        let key = reader.bytes(ksiz)?.to_vec();
        let mut vals = Vec::with_capacity(vnum.min(1024));
        for _ in 0..vnum {
            let vsiz = reader.u32()? as usize;
            vals.push(reader.bytes(vsiz)?.to_vec());
        }
        records.push(Record { key, vals });
    }
    Ok((opts, records))
}

struct Reader<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8], c_int> {
        let end = self.pos.checked_add(len).ok_or(TCERHEAD)?;
        let out = self.raw.get(self.pos..end).ok_or(TCERHEAD)?;
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, c_int> {
        let raw = self.bytes(4)?;
        Ok(u32::from_le_bytes(raw.try_into().map_err(|_| TCERHEAD)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BDBOCREAT, BDBOLCKNB, BDBOREADER, BDBOWRITER};
    use tempfile::TempDir;

    fn record(key: &[u8], vals: &[&[u8]]) -> Record {
        Record {
            key: key.to_vec(),
            vals: vals.iter().map(|v| v.to_vec()).collect(),
        }
    }

    #[test]
    fn missing_file_without_create() {
        let dir = TempDir::new().unwrap();
        let err = DbFile::open(&dir.path().join("none.tcb"), BDBOREADER, FileKind::Tree).unwrap_err();
        assert_eq!(err, TCENOFILE);
    }

    #[test]
    fn write_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.tcb");
        let records = vec![record(b"a", &[b"1", b"2"]), record(b"b\0", &[b""])];

        {
            let (mut db, loaded, _) =
                DbFile::open(&path, BDBOWRITER | BDBOCREAT, FileKind::Tree).unwrap();
            assert!(loaded.is_empty());
            db.write(FileKind::Tree, 3, &records).unwrap();
            assert_eq!(db.size().unwrap(), encoded_size(&records));
        }

        let (_db, loaded, opts) = DbFile::open(&path, BDBOREADER, FileKind::Tree).unwrap();
        assert_eq!(opts, 3);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].vals, vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(loaded[1].key, b"b\0".to_vec());
    }

    #[test]
    fn wrong_kind_is_meta_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.tch");
        drop(DbFile::open(&path, BDBOWRITER | BDBOCREAT, FileKind::Hash).unwrap());

        let err = DbFile::open(&path, BDBOREADER, FileKind::Tree).unwrap_err();
        assert_eq!(err, TCEMETA);
    }

    #[test]
    fn truncated_record_is_header_error() {
        let mut raw = encode(FileKind::Hash, 0, &[record(b"key", &[b"value"])]);
        raw.truncate(raw.len() - 2);
        assert_eq!(decode(&raw, FileKind::Hash).unwrap_err(), TCERHEAD);
    }

    #[test]
    fn nonblocking_lock_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.tcb");
        let (_held, _, _) = DbFile::open(&path, BDBOWRITER | BDBOCREAT, FileKind::Tree).unwrap();

        let err = DbFile::open(&path, BDBOWRITER | BDBOLCKNB, FileKind::Tree).unwrap_err();
        assert_eq!(err, TCELOCK);
    }
}
