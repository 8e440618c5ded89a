//! Open modes and tuning parameters.
//!
//! Unset numeric parameters map to the engine's "use default" sentinel (-1)
//! and unset options to `0xff`, never to zero.

use std::ffi::c_int;

/// A flag for opening a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open as a reader.
    Reader,
    /// Open as a writer.
    Writer,
    /// Create the file if it does not exist.
    Create,
    /// Truncate the file.
    Truncate,
    /// Open without file locking.
    NoLock,
    /// Fail instead of waiting for a file lock.
    LockNonBlocking,
    /// Synchronize every transaction.
    TransactionSync,
}

impl OpenMode {
    /// The engine bit for this flag.
    pub const fn bit(self) -> c_int {
        match self {
            OpenMode::Reader => cabinet_sys::BDBOREADER,
            OpenMode::Writer => cabinet_sys::BDBOWRITER,
            OpenMode::Create => cabinet_sys::BDBOCREAT,
            OpenMode::Truncate => cabinet_sys::BDBOTRUNC,
            OpenMode::NoLock => cabinet_sys::BDBONOLCK,
            OpenMode::LockNonBlocking => cabinet_sys::BDBOLCKNB,
            OpenMode::TransactionSync => cabinet_sys::BDBOTSYNC,
        }
    }

    /// Folds flags into a bitmask. No flags means [`OpenMode::Reader`].
    pub fn fold(modes: &[OpenMode]) -> c_int {
        if modes.is_empty() {
            return OpenMode::Reader.bit();
        }
        modes.iter().fold(0, |mask, mode| mask | mode.bit())
    }

    /// Writer that creates the file when missing.
    pub const WRITE_CREATE: &'static [OpenMode] = &[OpenMode::Writer, OpenMode::Create];
}

/// A storage option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuneOpt {
    /// Allow the database to grow past 2GB.
    Large,
    /// Compress with Deflate.
    Deflate,
    /// Compress with BZIP2.
    Bzip,
    /// Compress with TCBS.
    Tcbs,
}

impl TuneOpt {
    /// The engine bit for this option.
    pub const fn bit(self) -> u8 {
        match self {
            TuneOpt::Large => cabinet_sys::BDBTLARGE,
            TuneOpt::Deflate => cabinet_sys::BDBTDEFLATE,
            TuneOpt::Bzip => cabinet_sys::BDBTBZIP,
            TuneOpt::Tcbs => cabinet_sys::BDBTTCBS,
        }
    }

    /// Folds options into a bitmask. `None` keeps the current options.
    pub fn fold(opts: Option<&[TuneOpt]>) -> u8 {
        match opts {
            None => cabinet_sys::OPTS_UNCHANGED,
            Some(opts) => opts.iter().fold(0, |mask, opt| mask | opt.bit()),
        }
    }
}

/// Tuning parameters of a B-tree database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BdbTuning {
    /// Members per leaf page.
    pub lmemb: Option<i32>,
    /// Members per non-leaf page.
    pub nmemb: Option<i32>,
    /// Bucket array size.
    pub bnum: Option<i64>,
    /// Record alignment as a power of 2.
    pub apow: Option<i8>,
    /// Free block pool size as a power of 2.
    pub fpow: Option<i8>,
    /// Storage options; `None` keeps the current ones.
    pub opts: Option<Vec<TuneOpt>>,
}

impl BdbTuning {
    /// Creates tuning with every parameter at the engine default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets members per leaf page.
    #[must_use]
    pub fn lmemb(mut self, value: i32) -> Self {
        self.lmemb = Some(value);
        self
    }

    /// Sets members per non-leaf page.
    #[must_use]
    pub fn nmemb(mut self, value: i32) -> Self {
        self.nmemb = Some(value);
        self
    }

    /// Sets the bucket array size.
    #[must_use]
    pub fn bnum(mut self, value: i64) -> Self {
        self.bnum = Some(value);
        self
    }

    /// Sets the record alignment power.
    #[must_use]
    pub fn apow(mut self, value: i8) -> Self {
        self.apow = Some(value);
        self
    }

    /// Sets the free block pool power.
    #[must_use]
    pub fn fpow(mut self, value: i8) -> Self {
        self.fpow = Some(value);
        self
    }

    /// Sets the storage options.
    #[must_use]
    pub fn opts(mut self, opts: &[TuneOpt]) -> Self {
        self.opts = Some(opts.to_vec());
        self
    }

    /// The raw engine arguments: `(lmemb, nmemb, bnum, apow, fpow, opts)`.
    pub(crate) fn raw(&self) -> (i32, i32, i64, i8, i8, u8) {
        (
            self.lmemb.unwrap_or(-1),
            self.nmemb.unwrap_or(-1),
            self.bnum.unwrap_or(-1),
            self.apow.unwrap_or(-1),
            self.fpow.unwrap_or(-1),
            TuneOpt::fold(self.opts.as_deref()),
        )
    }
}

/// Tuning parameters of a hash database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdbTuning {
    /// Bucket array size.
    pub bnum: Option<i64>,
    /// Record alignment as a power of 2.
    pub apow: Option<i8>,
    /// Free block pool size as a power of 2.
    pub fpow: Option<i8>,
    /// Storage options; `None` keeps the current ones.
    pub opts: Option<Vec<TuneOpt>>,
}

impl HdbTuning {
    /// Creates tuning with every parameter at the engine default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bucket array size.
    #[must_use]
    pub fn bnum(mut self, value: i64) -> Self {
        self.bnum = Some(value);
        self
    }

    /// Sets the record alignment power.
    #[must_use]
    pub fn apow(mut self, value: i8) -> Self {
        self.apow = Some(value);
        self
    }

    /// Sets the free block pool power.
    #[must_use]
    pub fn fpow(mut self, value: i8) -> Self {
        self.fpow = Some(value);
        self
    }

    /// Sets the storage options.
    #[must_use]
    pub fn opts(mut self, opts: &[TuneOpt]) -> Self {
        self.opts = Some(opts.to_vec());
        self
    }

    /// The raw engine arguments: `(bnum, apow, fpow, opts)`.
    pub(crate) fn raw(&self) -> (i64, i8, i8, u8) {
        (
            self.bnum.unwrap_or(-1),
            self.apow.unwrap_or(-1),
            self.fpow.unwrap_or(-1),
            TuneOpt::fold(self.opts.as_deref()),
        )
    }
}

/// Node cache sizes of a B-tree database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BdbCache {
    /// Leaf nodes to cache.
    pub lcnum: Option<i32>,
    /// Non-leaf nodes to cache.
    pub ncnum: Option<i32>,
}

impl BdbCache {
    /// Creates cache settings at the engine default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the leaf node cache size.
    #[must_use]
    pub const fn lcnum(mut self, value: i32) -> Self {
        self.lcnum = Some(value);
        self
    }

    /// Sets the non-leaf node cache size.
    #[must_use]
    pub const fn ncnum(mut self, value: i32) -> Self {
        self.ncnum = Some(value);
        self
    }

    pub(crate) fn raw(&self) -> (i32, i32) {
        (self.lcnum.unwrap_or(-1), self.ncnum.unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mode_is_reader() {
        assert_eq!(OpenMode::fold(&[]), cabinet_sys::BDBOREADER);
        assert_eq!(OpenMode::fold(OpenMode::WRITE_CREATE), 2 | 4);
        assert_eq!(OpenMode::fold(&[OpenMode::Writer, OpenMode::LockNonBlocking]), 2 | 32);
    }

    #[test]
    fn opts_fold() {
        assert_eq!(TuneOpt::fold(None), 0xff);
        assert_eq!(TuneOpt::fold(Some(&[][..])), 0);
        assert_eq!(TuneOpt::fold(Some(&[TuneOpt::Large, TuneOpt::Bzip][..])), 1 | 4);
    }

    #[test]
    fn unset_tuning_is_sentinel() {
        assert_eq!(BdbTuning::new().raw(), (-1, -1, -1, -1, -1, 0xff));
        assert_eq!(HdbTuning::new().raw(), (-1, -1, -1, 0xff));
        assert_eq!(BdbCache::new().raw(), (-1, -1));
    }

    #[test]
    fn builder_pattern() {
        let tuning = BdbTuning::new().lmemb(64).bnum(1024).opts(&[TuneOpt::Deflate]);
        assert_eq!(tuning.raw(), (64, -1, 1024, -1, -1, 2));

        let cache = BdbCache::new().lcnum(10);
        assert_eq!(cache.raw(), (10, -1));
    }
}
