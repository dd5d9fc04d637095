//! Remote storage boundary.
//!
//! The driver only talks to [`RemoteStore`]; `drive::DriveClient` is the
//! Google Drive implementation. Listing is paginated by the store and
//! flattened lazily by [`FolderListing`].

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Zero when the provider reports no size (e.g. native Google documents)
    pub size_bytes: u64,
}

impl FileDescriptor {
    pub fn is_image(&self) -> bool {
        self.mime_type.to_lowercase().starts_with("image/")
    }
}

/// A single page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<FileDescriptor>,
    pub next_page_token: Option<String>,
}

/// Operations the folder driver needs from a storage provider.
pub trait RemoteStore {
    /// Display name of the folder; fails if it does not exist or is not a folder.
    fn folder_name(&self, folder_id: &str) -> Result<String>;

    /// Fetch one page of the folder's direct, non-trashed children.
    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FilePage>;

    fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Replace a file's content, optionally renaming it.
    fn update(
        &self,
        file_id: &str,
        bytes: &[u8],
        mime_type: &str,
        new_name: Option<&str>,
    ) -> Result<()>;

    /// Create a new file in `folder_id`, returning its id.
    fn create(&self, folder_id: &str, name: &str, bytes: &[u8], mime_type: &str)
        -> Result<String>;
}

/// Lazy iterator over every file in a folder, fetching pages on demand.
///
/// Yields at most one error, after which the listing is exhausted.
pub struct FolderListing<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    folder_id: String,
    buffered: std::vec::IntoIter<FileDescriptor>,
    next_page: Option<String>,
    started: bool,
    done: bool,
}

impl<'a, S: RemoteStore + ?Sized> FolderListing<'a, S> {
    pub fn new(store: &'a S, folder_id: &str) -> Self {
        Self {
            store,
            folder_id: folder_id.to_string(),
            buffered: Vec::new().into_iter(),
            next_page: None,
            started: false,
            done: false,
        }
    }

    fn fetch_next_page(&mut self) -> Result<()> {
        let page = self
            .store
            .list_page(&self.folder_id, self.next_page.as_deref())?;
        self.started = true;
        self.next_page = page.next_page_token.filter(|token| !token.is_empty());
        self.buffered = page.files.into_iter();
        Ok(())
    }
}

impl<S: RemoteStore + ?Sized> Iterator for FolderListing<'_, S> {
    type Item = Result<FileDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.buffered.next() {
                return Some(Ok(file));
            }
            if self.done || (self.started && self.next_page.is_none()) {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
