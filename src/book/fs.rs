//! Filesystem and zip collaborators
//!
//! [`FsArchiveOpener`] classifies paths on disk and inside `.zip`/`.cbz`
//! archives, including archives nested in other archives. [`FsBookFactory`]
//! builds [`FolderBook`]s listing the image pages of a directory or archive.
//!
//! Archives are read fully into memory, once per listing; nested archives are
//! extracted from their parent's buffer.

use super::{
    ArchiveEntryOpener, ArchiveEntryView, Book, BookCreateSetting, BookError, BookFactory, CODEC_EXTENSIONS,
    ContentListener, EntryKind, ViewContents,
};
use crate::address::{QueryAddress, QueryScheme, ResolvedBookAddress};
use crate::config::ArchiveRecursionMode;
use crate::hub::CancellationToken;
use crate::load::StartPageSpec;
use crate::memento::{SessionMemento, SortMode};
use log::debug;
use moka::sync::Cache;
use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use zip::ZipArchive;

/// Extensions opened as archives
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];

/// Extensions listed as pages
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "heic", "heif", "hif", "avif",
];

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_archive_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_image_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), BookError> {
    cancel.check().map_err(|_| BookError::Canceled)
}

/// Zip archive over shared in-memory bytes; clones share the buffer
type Zip = ZipArchive<Cursor<Arc<[u8]>>>;

fn open_zip(bytes: Vec<u8>) -> Result<Zip, BookError> {
    Ok(ZipArchive::new(Cursor::new(Arc::<[u8]>::from(bytes)))?)
}

fn open_nested(parent: &Zip, entry: &str) -> Result<Zip, BookError> {
    let mut parent = parent.clone();
    let mut file = parent.by_name(entry)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    open_zip(bytes)
}

/// Something that holds pages
///
/// Archives are read once; every directory listed inside one shares it.
#[derive(Debug, Clone)]
enum Container {
    Directory(PathBuf),
    /// Archive file on disk, not read yet
    ArchiveFile(PathBuf),
    /// Archive stored inside `parent`, not extracted yet
    NestedArchive { parent: Zip, entry: String },
    /// Directory `prefix` inside an opened archive (empty for the archive root)
    Archive { archive: Zip, prefix: String },
}

#[derive(Debug)]
struct Child {
    name: String,
    kind: EntryKind,
    container: Option<Container>,
}

impl Container {
    fn children(&self, cancel: &CancellationToken) -> Result<Vec<Child>, BookError> {
        checkpoint(cancel)?;
        match self {
            Self::Directory(path) => {
                let mut children = Vec::new();
                for entry in fs::read_dir(path)? {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let entry_path = entry.path();
                    if entry.file_type()?.is_dir() {
                        children.push(Child {
                            name,
                            kind: EntryKind::Directory,
                            container: Some(Self::Directory(entry_path)),
                        });
                    } else if is_archive_name(&name) {
                        children.push(Child {
                            name,
                            kind: EntryKind::Archive,
                            container: Some(Self::ArchiveFile(entry_path)),
                        });
                    } else if is_image_name(&name) {
                        children.push(Child {
                            name,
                            kind: EntryKind::Page,
                            container: None,
                        });
                    }
                }
                children.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(children)
            }
            Self::ArchiveFile(path) => Ok(archive_children(&open_zip(fs::read(path)?)?, "")),
            Self::NestedArchive { parent, entry } => Ok(archive_children(&open_nested(parent, entry)?, "")),
            Self::Archive { archive, prefix } => Ok(archive_children(archive, prefix)),
        }
    }
}

fn archive_children(archive: &Zip, prefix: &str) -> Vec<Child> {
    let base = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
    let mut seen_dirs = BTreeSet::new();
    let mut children = Vec::new();
    for full_name in archive.file_names() {
        let Some(rest) = full_name.strip_prefix(base.as_str()) else {
            continue;
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            continue;
        }
        let is_dir_entry = full_name.ends_with('/');
        match rest.split_once('/') {
            Some((dir, _)) => {
                if seen_dirs.insert(dir.to_string()) {
                    children.push(archive_dir_child(archive, &base, dir));
                }
            }
            None if is_dir_entry => {
                if seen_dirs.insert(rest.to_string()) {
                    children.push(archive_dir_child(archive, &base, rest));
                }
            }
            None if is_archive_name(rest) => children.push(Child {
                name: rest.to_string(),
                kind: EntryKind::Archive,
                container: Some(Container::NestedArchive {
                    parent: archive.clone(),
                    entry: format!("{base}{rest}"),
                }),
            }),
            None if is_image_name(rest) => children.push(Child {
                name: rest.to_string(),
                kind: EntryKind::Page,
                container: None,
            }),
            None => {}
        }
    }
    children
}

fn archive_dir_child(archive: &Zip, base: &str, dir: &str) -> Child {
    Child {
        name: dir.to_string(),
        kind: EntryKind::Directory,
        container: Some(Container::Archive {
            archive: archive.clone(),
            prefix: format!("{base}{dir}"),
        }),
    }
}

/// An entry view plus the container behind it (for books)
#[derive(Debug)]
struct Located {
    view: ArchiveEntryView,
    container: Option<Container>,
}

fn locate(address: &QueryAddress, cancel: &CancellationToken) -> Result<Located, BookError> {
    checkpoint(cancel)?;
    if !address.scheme().is_file_like() {
        return Err(BookError::NotFound(address.to_string()));
    }
    let path = PathBuf::from(address.path());

    if let Ok(metadata) = fs::metadata(&path) {
        let (kind, container) = if metadata.is_dir() {
            (EntryKind::Directory, Some(Container::Directory(path)))
        } else if is_archive_name(address.path()) {
            (EntryKind::Archive, Some(Container::ArchiveFile(path)))
        } else {
            (EntryKind::Page, None)
        };
        return Ok(Located {
            view: ArchiveEntryView {
                address: address.clone(),
                kind,
                is_file_system: true,
                archive_chain: Vec::new(),
            },
            container,
        });
    }

    let archive_path = path
        .ancestors()
        .skip(1)
        .find(|ancestor| ancestor.is_file() && ancestor.to_str().is_some_and(is_archive_name))
        .ok_or_else(|| BookError::NotFound(address.to_string()))?;
    let archive_address = QueryAddress::file(archive_path.to_string_lossy());
    let inner = address
        .path()
        .strip_prefix(archive_address.path())
        .map(|rest| rest.trim_start_matches('/'))
        .ok_or_else(|| BookError::NotFound(address.to_string()))?;

    let archive = open_zip(fs::read(archive_path)?)?;
    locate_inner(
        address,
        archive,
        &archive_address,
        inner,
        vec![archive_address.clone()],
        cancel,
    )
}

fn locate_inner(
    address: &QueryAddress,
    archive: Zip,
    archive_address: &QueryAddress,
    inner: &str,
    chain: Vec<QueryAddress>,
    cancel: &CancellationToken,
) -> Result<Located, BookError> {
    checkpoint(cancel)?;
    let names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
    let dir_prefix = format!("{inner}/");

    let found = |kind, container| {
        Ok(Located {
            view: ArchiveEntryView {
                address: address.clone(),
                kind,
                is_file_system: false,
                archive_chain: chain.clone(),
            },
            container,
        })
    };

    if names.contains(inner) {
        if is_archive_name(inner) {
            let container = Container::NestedArchive {
                parent: archive.clone(),
                entry: inner.to_string(),
            };
            return found(EntryKind::Archive, Some(container));
        }
        return found(EntryKind::Page, None);
    }
    if names.iter().any(|name| name.starts_with(&dir_prefix)) {
        let container = Container::Archive {
            archive: archive.clone(),
            prefix: inner.to_string(),
        };
        return found(EntryKind::Directory, Some(container));
    }

    let components: Vec<&str> = inner.split('/').collect();
    for split in 1..components.len() {
        let candidate = components[..split].join("/");
        if names.contains(&candidate) && is_archive_name(&candidate) {
            let nested_address = archive_address.join(&candidate);
            let rest = components[split..].join("/");
            let mut chain = chain.clone();
            chain.push(nested_address.clone());
            let nested = open_nested(&archive, &candidate)?;
            return locate_inner(address, nested, &nested_address, &rest, chain, cancel);
        }
    }
    Err(BookError::NotFound(address.to_string()))
}

/// Archive-entry opener over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArchiveOpener;

impl FsArchiveOpener {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ArchiveEntryOpener for FsArchiveOpener {
    fn open(&self, address: &QueryAddress, cancel: &CancellationToken) -> Result<ArchiveEntryView, BookError> {
        let located = locate(address, cancel)?;
        checkpoint(cancel)?;
        Ok(located.view)
    }
}

const LISTING_CACHE_CAPACITY: u64 = 64;
const LISTING_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListingKey {
    address: QueryAddress,
    is_recursive_folder: bool,
    recursion_mode: ArchiveRecursionMode,
}

/// Unsorted pages and shape of a container
#[derive(Debug)]
struct Listing {
    pages: Vec<String>,
    sub_folder_count: usize,
    is_inner_archive: bool,
}

/// Builds [`FolderBook`]s from directories and archives
///
/// Container listings are cached per address and recursion setting;
/// `BookCreateSetting::ignore_cache` forces a fresh listing.
#[derive(Clone)]
pub struct FsBookFactory {
    platform_codecs: bool,
    listings: Cache<ListingKey, Arc<Listing>>,
}

impl FsBookFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            platform_codecs: false,
            listings: Cache::builder()
                .time_to_live(LISTING_CACHE_TTL)
                .max_capacity(LISTING_CACHE_CAPACITY)
                .build(),
        }
    }

    /// Treat HEIF-family images as decodable
    #[must_use]
    pub fn with_platform_codecs(mut self, available: bool) -> Self {
        self.platform_codecs = available;
        self
    }

    fn listing(
        &self,
        address: &QueryAddress,
        setting: &BookCreateSetting,
        cancel: &CancellationToken,
    ) -> Result<Arc<Listing>, BookError> {
        let key = ListingKey {
            address: address.clone(),
            is_recursive_folder: setting.is_recursive_folder,
            recursion_mode: setting.recursion_mode,
        };
        if !setting.ignore_cache
            && let Some(listing) = self.listings.get(&key)
        {
            debug!("listing of {address} served from cache");
            return Ok(listing);
        }

        let located = locate(address, cancel)?;
        let container = located
            .container
            .ok_or_else(|| BookError::NotFound(format!("{address} is not a folder or archive")))?;
        let children = container.children(cancel)?;
        let sub_folder_count = children
            .iter()
            .filter(|child| matches!(child.kind, EntryKind::Directory | EntryKind::Archive))
            .count();
        let mut pages = Vec::new();
        collect_pages(children, "", setting, &mut pages, cancel)?;

        let listing = Arc::new(Listing {
            pages,
            sub_folder_count,
            is_inner_archive: !located.view.archive_chain.is_empty(),
        });
        self.listings.insert(key, Arc::clone(&listing));
        Ok(listing)
    }
}

impl Default for FsBookFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FsBookFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBookFactory")
            .field("platform_codecs", &self.platform_codecs)
            .field("cached_listings", &self.listings.entry_count())
            .finish()
    }
}

impl BookFactory for FsBookFactory {
    fn construct(
        &self,
        address: &ResolvedBookAddress,
        setting: &BookCreateSetting,
        memento: &SessionMemento,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Book>, BookError> {
        let book_address = &address.address;
        if book_address.scheme() == QueryScheme::Pagemark {
            return Err(BookError::NotFound(book_address.to_string()));
        }
        let listing = self.listing(book_address, setting, cancel)?;
        let mut pages = listing.pages.clone();
        sort_pages(&mut pages, setting.sort_mode);

        let mut memento = memento.clone();
        if matches!(setting.start_page, StartPageSpec::Named { reset_last: true, .. }) {
            memento.page.clear();
        }
        let start_index = start_index(&pages, &setting.start_page, &memento.page);
        if let Some(start) = pages.get(start_index)
            && let Some(extension) = extension_of(start)
            && CODEC_EXTENSIONS.contains(&extension.as_str())
            && !self.platform_codecs
        {
            return Err(BookError::UnsupportedImage {
                path: book_address.join(start).to_string(),
                extension,
            });
        }

        debug!(
            "built book {book_address}: {} pages, {} sub-folders",
            pages.len(),
            listing.sub_folder_count
        );
        memento.path = book_address.to_string();
        memento.is_recursive_folder = setting.is_recursive_folder;
        memento.sort_mode = setting.sort_mode;

        Ok(Box::new(FolderBook {
            path: book_address.clone(),
            pages,
            sub_folder_count: listing.sub_folder_count,
            is_recursive_folder: setting.is_recursive_folder,
            is_inner_archive: listing.is_inner_archive,
            start_index,
            memento,
            state: Mutex::new(FolderBookState::default()),
        }))
    }
}

fn collect_pages(
    children: Vec<Child>,
    prefix: &str,
    setting: &BookCreateSetting,
    pages: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<(), BookError> {
    for child in children {
        let name = format!("{prefix}{}", child.name);
        let descend = setting.is_recursive_folder
            && match child.kind {
                EntryKind::Directory => true,
                EntryKind::Archive => setting.recursion_mode == ArchiveRecursionMode::IncludeSubArchives,
                EntryKind::Page => false,
            };
        match (child.kind, child.container) {
            (EntryKind::Page, _) => pages.push(name),
            (_, Some(container)) if descend => {
                let grandchildren = container.children(cancel)?;
                collect_pages(grandchildren, &format!("{name}/"), setting, pages, cancel)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn sort_pages(pages: &mut [String], mode: SortMode) {
    match mode {
        SortMode::FileName => pages.sort_by_key(|page| page.to_lowercase()),
        SortMode::FileNameDescending => {
            pages.sort_by_key(|page| page.to_lowercase());
            pages.reverse();
        }
        SortMode::Entry => {}
    }
}

/// Index of the start page
///
/// A named entry that is missing falls back to `remembered`, the page the
/// book was last left at, unless `reset_last` is set.
fn start_index(pages: &[String], start: &StartPageSpec, remembered: &str) -> usize {
    let position = |name: &str| {
        pages
            .iter()
            .position(|page| page == name)
            .or_else(|| pages.iter().position(|page| page.eq_ignore_ascii_case(name)))
    };
    match start {
        StartPageSpec::First => 0,
        StartPageSpec::Last => pages.len().saturating_sub(1),
        StartPageSpec::Named { name, reset_last } => position(name)
            .or_else(|| (!reset_last && !remembered.is_empty()).then(|| position(remembered)).flatten())
            .unwrap_or(0),
    }
}

#[derive(Default)]
struct FolderBookState {
    index: usize,
    started: bool,
    disposed: bool,
    listener: Option<ContentListener>,
}

/// Book over the pages of a directory or archive
pub struct FolderBook {
    path: QueryAddress,
    pages: Vec<String>,
    sub_folder_count: usize,
    is_recursive_folder: bool,
    is_inner_archive: bool,
    start_index: usize,
    memento: SessionMemento,
    state: Mutex<FolderBookState>,
}

impl FolderBook {
    fn lock(&self) -> MutexGuard<'_, FolderBookState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn show(&self, index: usize, is_page_terminated: bool) -> Option<ViewContents> {
        let listener = {
            let mut state = self.lock();
            if state.disposed || self.pages.is_empty() {
                return None;
            }
            state.index = index;
            state.listener.clone()
        };
        let contents = ViewContents {
            page: self.pages.get(index).cloned(),
            index,
            all_ready: true,
            is_page_terminated,
        };
        if let Some(listener) = listener {
            listener(&contents);
        }
        Some(contents)
    }
}

impl Book for FolderBook {
    fn path(&self) -> &QueryAddress {
        &self.path
    }

    fn pages(&self) -> Vec<String> {
        self.pages.clone()
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn is_recursive_folder(&self) -> bool {
        self.is_recursive_folder
    }

    fn sub_folder_count(&self) -> usize {
        self.sub_folder_count
    }

    fn is_inner_archive(&self) -> bool {
        self.is_inner_archive
    }

    fn set_content_listener(&self, listener: ContentListener) {
        self.lock().listener = Some(listener);
    }

    fn start(&self) {
        {
            let mut state = self.lock();
            if state.started || state.disposed {
                return;
            }
            state.started = true;
        }
        self.show(self.start_index, false);
    }

    fn current_page(&self) -> Option<String> {
        let index = self.lock().index;
        self.pages.get(index).cloned()
    }

    fn move_to(&self, index: usize) -> Option<ViewContents> {
        if !self.lock().started {
            return None;
        }
        let last = self.pages.len().checked_sub(1)?;
        self.show(index.min(last), index > last)
    }

    fn memento(&self) -> SessionMemento {
        let mut memento = self.memento.clone();
        memento.page = self.current_page().unwrap_or_default();
        memento
    }

    fn dispose(&self) {
        let mut state = self.lock();
        state.disposed = true;
        state.listener = None;
    }
}
