//! Background cover loader and thumbnail cache scenarios.

use inkshelf_core::book_id::generate_id;
use inkshelf_core::{
    BooksDirectory, CoverPolicy, CoverStep, Dimensions, DirectoryConfig, EbookSource, FileSystem,
    GrayBitmap, MockEbookSource, MockFileSystem,
};

const SCREEN: Dimensions = Dimensions::new(480, 800);

type Dir = BooksDirectory<MockFileSystem, MockEbookSource>;

fn config() -> DirectoryConfig {
    DirectoryConfig::new("/sd", SCREEN, CoverPolicy::SideFile)
}

fn setup() -> (MockFileSystem, MockEbookSource) {
    let mut fs = MockFileSystem::new();
    fs.add_directory("/sd");
    fs.add_directory("/sd/books");
    (fs, MockEbookSource::new())
}

fn add_book(
    fs: &mut MockFileSystem,
    epub: &mut MockEbookSource,
    name: &str,
    title: &str,
    cover: Option<GrayBitmap>,
) {
    let path = format!("/sd/books/{}", name);
    fs.add_file(&path, &[0u8; 64]);
    epub.add_book(&path, Some(title), None, None, cover);
}

fn cover_file(id: u32) -> String {
    format!("/sd/covers/{:08x}.cvr", id)
}

fn drain_loader(dir: &mut Dir) -> Vec<CoverStep> {
    let mut steps = Vec::new();
    loop {
        match dir.process_next_cover() {
            CoverStep::Idle => return steps,
            step => steps.push(step),
        }
    }
}

#[test]
fn loader_processes_each_book_once() {
    let (mut fs, mut epub) = setup();
    let cover = GrayBitmap::filled(Dimensions::new(200, 320), 0x55);
    add_book(&mut fs, &mut epub, "a.epub", "A", Some(cover.clone()));
    add_book(&mut fs, &mut epub, "b.epub", "B", None);
    add_book(&mut fs, &mut epub, "c.epub", "C", Some(cover));

    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config(), None).unwrap();
    assert_eq!(dir.pending_cover_count(), 3);

    let steps = drain_loader(&mut dir);
    assert_eq!(
        steps,
        [
            CoverStep::Updated(0),
            CoverStep::NoChange(1),
            CoverStep::Updated(2)
        ]
    );
    assert_eq!(dir.pending_cover_count(), 0);
    assert_eq!(dir.process_next_cover(), CoverStep::Idle);

    assert!(fs.exists(&cover_file(generate_id(b"a.epub"))));
    assert!(!fs.exists(&cover_file(generate_id(b"b.epub"))));
    assert!(fs.exists(&cover_file(generate_id(b"c.epub"))));
}

#[test]
fn existing_cover_files_skip_extraction() {
    let (mut fs, mut epub) = setup();
    let cover = GrayBitmap::filled(Dimensions::new(100, 160), 0x33);
    add_book(&mut fs, &mut epub, "a.epub", "A", Some(cover.clone()));
    add_book(&mut fs, &mut epub, "b.epub", "B", Some(cover));

    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config(), None).unwrap();
    drain_loader(&mut dir);
    let opens_after_first_pass = epub.open_count();

    // A refresh rearms the loader, but covers are already on disk.
    dir.refresh(None, false).unwrap();
    assert_eq!(dir.pending_cover_count(), 2);
    let steps = drain_loader(&mut dir);
    assert_eq!(steps, [CoverStep::Updated(0), CoverStep::Updated(1)]);
    assert_eq!(
        epub.open_count(),
        opens_after_first_pass,
        "covers on disk must not reopen containers"
    );
}

#[test]
fn written_covers_fit_the_screen() {
    let (mut fs, mut epub) = setup();
    // Much larger than the screen in both dimensions.
    let cover = GrayBitmap::filled(Dimensions::new(2000, 2600), 0x70);
    add_book(&mut fs, &mut epub, "big.epub", "Big", Some(cover));

    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config(), None).unwrap();
    drain_loader(&mut dir);

    let id = generate_id(b"big.epub");
    let full = dir.get_full_cover(id).expect("cover should be readable");
    assert!(full.dim.width <= SCREEN.width);
    assert!(full.dim.height <= SCREEN.height);
    assert!(full.dim.width > 0 && full.dim.height > 0);
}

#[test]
fn thumbnails_come_from_cache_after_first_load() {
    let (mut fs, mut epub) = setup();
    let cover = GrayBitmap::filled(Dimensions::new(240, 400), 0x44);
    add_book(&mut fs, &mut epub, "a.epub", "A", Some(cover));

    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config(), None).unwrap();
    drain_loader(&mut dir);

    let id = generate_id(b"a.epub");
    let max = Dimensions::new(90, 150);
    {
        let thumb = dir.get_cover_thumbnail(id, max).expect("thumbnail");
        assert!(thumb.dim.width <= max.width && thumb.dim.height <= max.height);
    }
    assert_eq!(dir.cover_cache().disk_load_count(), 1);

    dir.get_cover_thumbnail(id, max).expect("thumbnail");
    assert_eq!(
        dir.cover_cache().disk_load_count(),
        1,
        "repeat request must be served from the cache"
    );

    // Unknown book has no thumbnail.
    assert!(dir.get_cover_thumbnail(0xdead_beef, max).is_none());
}

#[test]
fn inline_policy_embeds_covers_at_ingestion() {
    let (mut fs, mut epub) = setup();
    let max = Dimensions::new(60, 80);
    let cover = GrayBitmap::filled(Dimensions::new(300, 400), 0x10);
    add_book(&mut fs, &mut epub, "a.epub", "A", Some(cover));
    add_book(&mut fs, &mut epub, "b.epub", "B", None);

    let config = DirectoryConfig::new("/sd", SCREEN, CoverPolicy::Inline { max });
    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config, None).unwrap();

    // Nothing deferred: inline covers were computed while ingesting.
    assert_eq!(dir.pending_cover_count(), 0);
    assert_eq!(dir.process_next_cover(), CoverStep::Idle);

    let rec = dir.get_book_data(0).unwrap();
    assert!(rec.cover_width > 0 && rec.cover_width <= max.width);
    assert!(rec.cover_height > 0 && rec.cover_height <= max.height);
    assert_eq!(
        rec.cover_bitmap.len(),
        rec.cover_width as usize * rec.cover_height as usize
    );

    // Book without a cover gets the placeholder, not an empty bitmap.
    let rec = dir.get_book_data(1).unwrap();
    assert!(rec.cover_width > 0 && rec.cover_height > 0);
    assert!(!rec.cover_bitmap.is_empty());

    // No side files under the inline policy.
    assert!(!fs.exists(&cover_file(generate_id(b"a.epub"))));
}

/// Source whose cover bitmaps declare dimensions that do not match their
/// pixel buffer.
#[derive(Clone, Default)]
struct TornBitmapSource;

impl EbookSource for TornBitmapSource {
    fn open(&mut self, _path: &str) -> bool {
        true
    }
    fn title(&self) -> Option<String> {
        Some("Torn".to_string())
    }
    fn author(&self) -> Option<String> {
        None
    }
    fn description(&self) -> Option<String> {
        None
    }
    fn load_cover(&mut self, _max: Dimensions) -> Option<GrayBitmap> {
        Some(GrayBitmap {
            dim: Dimensions::new(100, 100),
            pixels: vec![0u8; 10],
        })
    }
    fn close(&mut self) {}
}

#[test]
fn mismatched_collaborator_bitmaps_are_dropped() {
    let (mut fs, _) = setup();
    fs.add_file("/sd/books/torn.epub", &[0u8; 64]);

    let (mut dir, _) =
        BooksDirectory::open(fs.clone(), TornBitmapSource, config(), None).unwrap();
    assert_eq!(dir.process_next_cover(), CoverStep::NoChange(0));
    assert_eq!(dir.process_next_cover(), CoverStep::Idle);
    assert!(!fs.exists(&cover_file(generate_id(b"torn.epub"))));

    // Under the inline policy ingestion falls back to the placeholder.
    let max = Dimensions::new(40, 60);
    let mut fs = MockFileSystem::new();
    fs.add_directory("/sd");
    fs.add_directory("/sd/books");
    fs.add_file("/sd/books/torn.epub", &[0u8; 64]);
    let config = DirectoryConfig::new("/sd", SCREEN, CoverPolicy::Inline { max });
    let (mut dir, _) = BooksDirectory::open(fs, TornBitmapSource, config, None).unwrap();
    let rec = dir.get_book_data(0).unwrap();
    assert_eq!(rec.cover_width, 40);
    assert_eq!(rec.cover_height, 60);
    assert_eq!(rec.cover_bitmap.len(), 40 * 60);
}

#[test]
fn inline_covers_survive_reopen() {
    let (mut fs, mut epub) = setup();
    let max = Dimensions::new(60, 80);
    let cover = GrayBitmap::filled(Dimensions::new(120, 160), 0x22);
    add_book(&mut fs, &mut epub, "a.epub", "A", Some(cover));

    let config = DirectoryConfig::new("/sd", SCREEN, CoverPolicy::Inline { max });
    let (dir, _) = Dir::open(fs.clone(), epub.clone(), config.clone(), None).unwrap();
    drop(dir);
    assert_eq!(epub.open_count(), 1);

    let (mut dir, _) = Dir::open(fs.clone(), epub.clone(), config, None).unwrap();
    assert_eq!(epub.open_count(), 1, "reopen reads covers from the database");
    let rec = dir.get_book_data(0).unwrap();
    assert_eq!(rec.cover_width, 60);
    assert_eq!(rec.cover_height, 80);
    assert!(rec.cover_bitmap.iter().all(|&p| p == 0x22));
}
