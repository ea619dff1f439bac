//! The book directory: sorted index over the record store, filesystem
//! reconciliation, and the incremental cover loader.
//!
//! Position `N` in the sorted index is the `N`th book shown in the UI.
//! The index is rebuilt in full by every [`BooksDirectory::refresh`] and
//! never persisted; only the record store survives restarts.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::book_id::generate_id;
use crate::covers::{self, CoverCache, Thumbnail, DEFAULT_THUMB_SLOTS};
use crate::ebook::{Dimensions, EbookSource, GrayBitmap};
use crate::filesystem::{self, FileSystem, FileSystemError};
use crate::record::{BookRecord, RecordError, VersionRecord, FILENAME_SIZE};
use crate::record_store::{RecordStore, StoreError};

/// Where cover pixels live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverPolicy {
    /// Cover embedded in the record at fixed maximum dimensions, computed
    /// once at ingestion (constrained-memory boards).
    Inline { max: Dimensions },
    /// Record carries no pixels; the background loader writes a per-book
    /// cover file named by id (boards with ample storage).
    SideFile,
}

impl CoverPolicy {
    /// Fixed pixel capacity reserved in each record.
    pub fn cover_capacity(&self) -> usize {
        match self {
            CoverPolicy::Inline { max } => max.pixel_count(),
            CoverPolicy::SideFile => 0,
        }
    }
}

/// Paths and device constraints for one directory instance.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Folder scanned for `.epub` files.
    pub books_folder: String,
    /// The directory database file.
    pub db_path: String,
    /// Folder holding per-book cover files (side-file policy).
    pub covers_folder: String,
    /// Physical screen bounds; covers never exceed them.
    pub screen: Dimensions,
    pub cover_policy: CoverPolicy,
    pub thumbnail_slots: usize,
}

impl DirectoryConfig {
    /// Conventional layout under a mount root: `<root>/books`,
    /// `<root>/books_dir.db`, `<root>/covers`.
    pub fn new(root: &str, screen: Dimensions, cover_policy: CoverPolicy) -> Self {
        Self {
            books_folder: filesystem::join_path(root, "books"),
            db_path: filesystem::join_path(root, "books_dir.db"),
            covers_folder: filesystem::join_path(root, "covers"),
            screen,
            cover_policy,
            thumbnail_slots: DEFAULT_THUMB_SLOTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    Store(StoreError),
    Fs(FileSystemError),
    Record(RecordError),
}

impl core::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DirectoryError::Store(err) => write!(f, "{}", err),
            DirectoryError::Fs(err) => write!(f, "{}", err),
            DirectoryError::Record(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DirectoryError {}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        DirectoryError::Store(err)
    }
}

impl From<FileSystemError> for DirectoryError {
    fn from(err: FileSystemError) -> Self {
        DirectoryError::Fs(err)
    }
}

impl From<RecordError> for DirectoryError {
    fn from(err: RecordError) -> Self {
        DirectoryError::Record(err)
    }
}

/// Blocking-message hook for operations that will take visible time.
/// The core only decides *when* to show something; rendering belongs to
/// the UI layer.
pub trait ProgressNotifier {
    fn show(&mut self, title: &str, body: &str);
    fn dismiss(&mut self);
}

/// Default notifier that shows nothing.
#[derive(Default)]
pub struct SilentProgress;

impl ProgressNotifier for SilentProgress {
    fn show(&mut self, _title: &str, _body: &str) {}
    fn dismiss(&mut self) {}
}

/// Result of one background-loader increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverStep {
    /// Every position has been processed; calling again is a no-op.
    Idle,
    /// This position's cover is now available on disk; redraw its tile.
    Updated(usize),
    /// One position was processed but nothing changed on disk (no cover,
    /// or extraction failed).
    NoChange(usize),
}

/// Sort key: one ordering character (`'a' + pin` or `'z'`) followed by the
/// title, tie-broken by id so identically-titled books keep one entry each.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    key: String,
    id: u32,
}

#[derive(Debug, Clone, Copy)]
struct IndexInfo {
    id: u32,
    db_index: usize,
}

const UNPINNED_TAG: char = 'z';
const MAX_PIN: u8 = 25;

/// The book directory. Owns its filesystem handle, e-book source, record
/// store, sorted index and cover cache — injected, not ambient.
pub struct BooksDirectory<FS: FileSystem, E: EbookSource> {
    fs: FS,
    epub: E,
    config: DirectoryConfig,
    store: RecordStore,
    sorted_index: BTreeMap<SortKey, IndexInfo>,
    pins: BTreeMap<u32, u8>,
    covers: CoverCache,
    progress: Box<dyn ProgressNotifier>,
    /// Scratch record for `get_book_data`; overwritten by the next call.
    scratch: Option<BookRecord>,
    loader_next: usize,
    loader_ready: Vec<bool>,
}

impl<FS: FileSystem, E: EbookSource> BooksDirectory<FS, E> {
    /// Open (or create) the directory database, validate its version
    /// record, and run an initial [`refresh`](Self::refresh).
    ///
    /// Returns the directory and, when `filter_filename` was supplied and
    /// found, that book's position in the sorted index.
    pub fn open(
        fs: FS,
        epub: E,
        config: DirectoryConfig,
        filter_filename: Option<&str>,
    ) -> Result<(Self, Option<usize>), DirectoryError> {
        let mut fs = fs;
        log::debug!("reading books directory: {}", config.db_path);

        let mut store = match RecordStore::open(&mut fs, &config.db_path) {
            Ok(store) => store,
            Err(err) => {
                log::info!("directory database unreadable ({}), creating fresh", err);
                RecordStore::create(&mut fs, &config.db_path)?
            }
        };

        let mut version_ok = false;
        if store.get_record_count() == 0 {
            store.add_record(&mut fs, &VersionRecord::current().encode())?;
            version_ok = true;
        } else if store.goto_first() && store.get_record_size() == VersionRecord::ENCODED_LEN {
            if let Ok(bytes) = store.get_record(VersionRecord::ENCODED_LEN) {
                if let Ok(version) = VersionRecord::decode(bytes) {
                    version_ok = version.is_current();
                }
            }
        }

        if !version_ok {
            log::info!("directory database has a wrong version, rebuilding");
            store = RecordStore::create(&mut fs, &config.db_path)?;
            store.add_record(&mut fs, &VersionRecord::current().encode())?;
        }

        let covers = CoverCache::new(&config.covers_folder, config.screen, config.thumbnail_slots);
        let mut dir = Self {
            fs,
            epub,
            store,
            covers,
            config,
            sorted_index: BTreeMap::new(),
            pins: BTreeMap::new(),
            progress: Box::new(SilentProgress),
            scratch: None,
            loader_next: 0,
            loader_ready: Vec::new(),
        };
        let matched = dir.refresh(filter_filename, false)?;
        Ok((dir, matched))
    }

    /// Replace the progress notifier used by long refreshes.
    pub fn set_progress_notifier(&mut self, progress: Box<dyn ProgressNotifier>) {
        self.progress = progress;
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn cover_capacity(&self) -> usize {
        self.config.cover_policy.cover_capacity()
    }

    fn record_len(&self) -> usize {
        BookRecord::encoded_len(self.cover_capacity())
    }

    fn order_tag(&self, id: u32) -> char {
        match self.pins.get(&id) {
            Some(&pos) if pos <= MAX_PIN => (b'a' + pos) as char,
            _ => UNPINNED_TAG,
        }
    }

    fn insert_index(&mut self, id: u32, title: &str, db_index: usize) {
        let key = SortKey {
            key: format!("{}{}", self.order_tag(id), title),
            id,
        };
        self.sorted_index.insert(key, IndexInfo { id, db_index });
    }

    fn index_has_id(&self, id: u32) -> bool {
        self.sorted_index.values().any(|info| info.id == id)
    }

    /// Synchronize the store and index with the filesystem: sweep stale
    /// records, compact if anything was deleted, then scan for new books.
    /// Returns the sorted position of
    /// `filter_filename` when found — callers use it to restore the "last
    /// read" selection after membership changes.
    ///
    /// `force_init` discards every record first, forcing a full rebuild.
    pub fn refresh(
        &mut self,
        filter_filename: Option<&str>,
        force_init: bool,
    ) -> Result<Option<usize>, DirectoryError> {
        log::debug!("refreshing directory content");

        self.loader_next = 0;
        self.loader_ready.clear();
        self.scratch = None;
        self.sorted_index.clear();

        let mut known_files: BTreeSet<String> = BTreeSet::new();

        if force_init {
            self.store.goto_first();
            while self.store.goto_next() {
                self.store.set_deleted(&mut self.fs)?;
            }
        } else if !self.sweep_existing_records(&mut known_files)? {
            // Unreadable records: start over from a clean slate.
            log::error!("directory records unreadable, recreating database");
            self.store = RecordStore::create(&mut self.fs, &self.config.db_path)?;
            self.store
                .add_record(&mut self.fs, &VersionRecord::current().encode())?;
            known_files.clear();
            self.sorted_index.clear();
        }

        if self.store.is_some_record_deleted() {
            self.compact()?;
        }

        if self.scan_books_folder(&known_files, force_init)? {
            self.progress.dismiss();
        }

        self.reset_cover_loader();

        let matched = filter_filename
            .map(generate_id_for_name)
            .and_then(|id| self.get_book_index(id));
        Ok(matched)
    }

    /// Walk all live records, dropping the ones whose file is gone or has
    /// changed size, indexing the rest. Returns `false` when record
    /// contents do not parse (schema drift / corruption).
    fn sweep_existing_records(
        &mut self,
        known_files: &mut BTreeSet<String>,
    ) -> Result<bool, DirectoryError> {
        let record_len = self.record_len();
        let capacity = self.cover_capacity();

        self.store.goto_first();
        while self.store.goto_next() {
            if self.store.is_deleted() {
                continue;
            }
            let record = {
                let bytes = match self.store.get_record(record_len) {
                    Ok(bytes) => bytes,
                    Err(StoreError::SizeMismatch { .. }) => return Ok(false),
                    Err(err) => return Err(err.into()),
                };
                match BookRecord::decode(bytes, capacity) {
                    Ok(record) => record,
                    Err(_) => return Ok(false),
                }
            };

            let path = filesystem::join_path(&self.config.books_folder, &record.filename);
            let stale = match self.fs.file_info(&path) {
                Ok(info) => info.is_directory || info.size as i64 != record.file_size,
                Err(_) => true,
            };
            if stale {
                log::debug!("book no longer available: {}", record.filename);
                self.store.set_deleted(&mut self.fs)?;
            } else {
                known_files.insert(record.filename.clone());
                let db_index = self.store.get_current_idx();
                self.insert_index(record.id, &record.title, db_index);
            }
        }
        Ok(true)
    }

    /// Rewrite the store without its deleted records: fresh temp file,
    /// copy live records (rebuilding the index as we go), then swap it in
    /// with remove + rename so a crash mid-pass leaves the original file
    /// intact.
    fn compact(&mut self) -> Result<(), DirectoryError> {
        log::debug!("compacting directory database");

        let path = self.config.db_path.clone();
        let tmp = format!("{}.new", path);
        let capacity = self.cover_capacity();

        let mut new_store = RecordStore::create(&mut self.fs, &tmp)?;
        self.sorted_index.clear();

        if !self.store.goto_first() {
            return Err(StoreError::Corrupt("empty store during compaction").into());
        }
        loop {
            if !self.store.is_deleted() {
                let size = self.store.get_record_size();
                let data = self.store.get_record(size)?.to_vec();
                new_store.add_record(&mut self.fs, &data)?;
                let new_index = new_store.get_record_count() - 1;
                if new_index > 0 {
                    let record = BookRecord::decode(&data, capacity)?;
                    self.insert_index(record.id, &record.title, new_index);
                }
            }
            if !self.store.goto_next() {
                break;
            }
        }
        drop(new_store);

        self.fs.remove(&path)?;
        self.fs.rename(&tmp, &path)?;
        self.store = RecordStore::open(&mut self.fs, &path)?;
        Ok(())
    }

    /// Ingest every e-book file not already known. Returns whether the
    /// progress message was shown.
    fn scan_books_folder(
        &mut self,
        known_files: &BTreeSet<String>,
        force_init: bool,
    ) -> Result<bool, DirectoryError> {
        log::debug!("scanning book folder {}", self.config.books_folder);

        let entries = match self.fs.list_files(&self.config.books_folder) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!(
                    "book folder {} unreadable: {}",
                    self.config.books_folder,
                    err
                );
                return Ok(false);
            }
        };

        let mut shown = false;
        for entry in entries {
            if entry.is_directory || !filesystem::is_ebook_name(&entry.name) {
                continue;
            }
            if known_files.contains(&entry.name) {
                continue;
            }
            if entry.name.len() >= FILENAME_SIZE {
                log::warn!("skipping book with over-long filename: {}", entry.name);
                continue;
            }

            if !shown {
                shown = true;
                if force_init {
                    self.progress.show(
                        "E-books metadata retrieval",
                        "System parameters changed, requiring metadata retrieval. \
                         It will take a few seconds for each e-book.",
                    );
                } else {
                    self.progress.show(
                        "New e-books metadata retrieval",
                        "New e-books have been found. Please wait while we retrieve \
                         some metadata. It will take a few seconds for each e-book.",
                    );
                }
            }

            self.ingest_book(&entry.name)?;
        }
        Ok(shown)
    }

    /// Add one new book to the store and index. Per-book extraction
    /// failures produce best-effort defaults; only store I/O is fatal.
    fn ingest_book(&mut self, name: &str) -> Result<(), DirectoryError> {
        let path = filesystem::join_path(&self.config.books_folder, name);

        // The file may have vanished between enumeration and now.
        let file_size = match self.fs.file_info(&path) {
            Ok(info) => info.size as i64,
            Err(err) => {
                log::warn!("cannot stat {}: {}, skipping", path, err);
                return Ok(());
            }
        };

        let id = generate_id_for_name(name);
        if self.index_has_id(id) {
            // Different filename hashing to an existing id; never let two
            // books share side state.
            log::error!("id collision on {} (id {:08x}), skipping book", name, id);
            return Ok(());
        }

        log::debug!("new book found: {}", name);

        let mut record = BookRecord::new(id, name, file_size);
        let opened = self.epub.open(&path);
        if opened {
            if let Some(title) = self.epub.title() {
                record.title = title;
            }
            if let Some(author) = self.epub.author() {
                record.author = author;
            }
            if let Some(description) = self.epub.description() {
                record.description = description;
            }
        } else {
            log::warn!("cannot open {}, keeping defaults", path);
        }
        if record.title.is_empty() {
            record.title = filesystem::file_stem(name).to_string();
        }

        if let CoverPolicy::Inline { max } = self.config.cover_policy {
            let decode_max = Dimensions::new(
                max.width.saturating_mul(2),
                max.height.saturating_mul(2),
            );
            let cover = if opened {
                self.epub
                    .load_cover(decode_max)
                    .filter(GrayBitmap::is_well_formed)
            } else {
                None
            };
            let cover = match cover {
                Some(img) => covers::resize_nearest(&img, covers::fit_within(img.dim, max)),
                None => covers::default_cover(max),
            };
            record.cover_width = cover.dim.width;
            record.cover_height = cover.dim.height;
            record.cover_bitmap = cover.pixels;
        }
        if opened {
            self.epub.close();
        }

        let bytes = record.encode(self.cover_capacity())?;
        self.store.add_record(&mut self.fs, &bytes)?;
        let db_index = self.store.get_record_count() - 1;
        self.insert_index(record.id, &record.title, db_index);
        Ok(())
    }

    /// Number of live books.
    pub fn get_book_count(&self) -> usize {
        self.sorted_index.len()
    }

    fn info_at(&self, position: usize) -> Option<IndexInfo> {
        self.sorted_index.values().nth(position).copied()
    }

    fn load_record(&mut self, db_index: usize) -> Option<&BookRecord> {
        if !self.store.set_current_idx(db_index) {
            log::error!("db index out of range: {}", db_index);
            return None;
        }
        let capacity = self.cover_capacity();
        let record = {
            let bytes = match self.store.get_record(self.record_len()) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::error!("unable to get record at index {}: {}", db_index, err);
                    return None;
                }
            };
            BookRecord::decode(bytes, capacity).ok()?
        };
        self.scratch = Some(record);
        self.scratch.as_ref()
    }

    /// Record for the book at `position` in sorted order. The returned
    /// borrow points at an internal scratch record and is overwritten by
    /// the next lookup.
    pub fn get_book_data(&mut self, position: usize) -> Option<&BookRecord> {
        let info = self.info_at(position)?;
        self.load_record(info.db_index)
    }

    /// Direct physical lookup by store index, bypassing sort order.
    pub fn get_book_data_from_db_index(&mut self, db_index: usize) -> Option<&BookRecord> {
        self.load_record(db_index)
    }

    /// Id of the book at `position`.
    pub fn get_book_id(&self, position: usize) -> Option<u32> {
        self.info_at(position).map(|info| info.id)
    }

    /// Sorted position of the book with `id`.
    pub fn get_book_index(&self, id: u32) -> Option<usize> {
        self.sorted_index
            .values()
            .position(|info| info.id == id)
    }

    /// Pin the book with `id` to ordering slot `pos` (0–25), or unpin with
    /// `None`. Relocates only that book's index entry. An id no longer in
    /// the index is a stale external reference: its pin is forgotten, no
    /// error.
    pub fn set_track_order(&mut self, id: u32, pos: Option<u8>) {
        match pos {
            Some(p) if p <= MAX_PIN => {
                self.pins.insert(id, p);
            }
            _ => {
                self.pins.remove(&id);
            }
        }

        let found = self
            .sorted_index
            .iter()
            .find(|(_, info)| info.id == id)
            .map(|(key, info)| (key.clone(), *info));

        match found {
            Some((old_key, info)) => {
                let tag = self.order_tag(id);
                if old_key.key.starts_with(tag) {
                    return;
                }
                let mut key = old_key.clone();
                key.key.replace_range(0..1, tag.encode_utf8(&mut [0u8; 4]));
                self.sorted_index.remove(&old_key);
                self.sorted_index.insert(key, info);
            }
            None => {
                log::debug!("set_track_order: id {:08x} not in index, forgetting pin", id);
                self.pins.remove(&id);
            }
        }
    }

    // ---- covers ----------------------------------------------------------

    /// Thumbnail for the book with `id`, fitting within `max`; LRU-cached.
    pub fn get_cover_thumbnail(&mut self, id: u32, max: Dimensions) -> Option<Thumbnail<'_>> {
        self.covers.get_cover_thumbnail(&mut self.fs, id, max)
    }

    /// Full screen-bounded cover for the book with `id` (side-file policy).
    pub fn get_full_cover(&mut self, id: u32) -> Option<GrayBitmap> {
        self.covers.get_full_cover(&mut self.fs, id)
    }

    pub fn cover_cache(&mut self) -> &mut CoverCache {
        &mut self.covers
    }

    fn reset_cover_loader(&mut self) {
        self.loader_next = 0;
        let count = self.get_book_count();
        // Inline covers were produced at ingestion; nothing left to do.
        let ready = matches!(self.config.cover_policy, CoverPolicy::Inline { .. });
        self.loader_ready.clear();
        self.loader_ready.resize(count, ready);
    }

    /// Positions the loader has not finished yet.
    pub fn pending_cover_count(&self) -> usize {
        self.loader_ready.iter().filter(|ready| !**ready).count()
    }

    /// Perform at most one book's worth of cover work: decode, resize to
    /// the screen bounds and persist a single pending cover. Safe to call
    /// from an idle loop until it reports [`CoverStep::Idle`].
    pub fn process_next_cover(&mut self) -> CoverStep {
        let count = self.get_book_count();

        let position = loop {
            if self.loader_next >= count {
                return CoverStep::Idle;
            }
            let position = self.loader_next;
            self.loader_next += 1;
            if !self.loader_ready.get(position).copied().unwrap_or(true) {
                break position;
            }
        };
        self.loader_ready[position] = true;

        let (id, filename) = {
            let Some(record) = self.get_book_data(position) else {
                return CoverStep::NoChange(position);
            };
            (record.id, record.filename.clone())
        };

        // Already on disk from an earlier run: just report the tile.
        if self.covers.has_cover(&mut self.fs, id) {
            return CoverStep::Updated(position);
        }

        let path = filesystem::join_path(&self.config.books_folder, &filename);
        if !self.epub.open(&path) {
            log::warn!("cover loader cannot open {}", path);
            return CoverStep::NoChange(position);
        }

        let screen = self.config.screen;
        let decode_max = Dimensions::new(
            screen.width.saturating_mul(2),
            screen.height.saturating_mul(2),
        );
        let cover = self.epub.load_cover(decode_max);
        self.epub.close();

        let Some(cover) = cover.filter(GrayBitmap::is_well_formed) else {
            // No usable cover in the container; not an error.
            return CoverStep::NoChange(position);
        };

        let fitted = covers::resize_nearest(&cover, covers::fit_within(cover.dim, screen));
        match self.covers.write_cover_file(&mut self.fs, id, &fitted) {
            Ok(()) => CoverStep::Updated(position),
            Err(err) => {
                log::error!("cannot write cover for {:08x}: {}", id, err);
                CoverStep::NoChange(position)
            }
        }
    }
}

fn generate_id_for_name(name: &str) -> u32 {
    generate_id(name.as_bytes())
}
