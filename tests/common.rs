#![allow(dead_code)]

use drive_squeeze::error::{Result, SqueezeError};
use drive_squeeze::store::{FileDescriptor, FilePage, RemoteStore};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

/// Seeded RGB noise, the worst case for JPEG size.
pub fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb(rng.gen()))
}

pub fn encode(pixels: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(pixels.clone())
        .write_to(&mut cursor, format)
        .unwrap();
    cursor.into_inner()
}

pub fn descriptor(id: &str, name: &str, mime_type: &str, size_bytes: u64) -> FileDescriptor {
    FileDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        size_bytes,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_id: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub folder_id: String,
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// In-memory stand-in for a Drive folder.
#[derive(Default)]
pub struct FakeStore {
    pub folder: Option<String>,
    pub pages: Vec<Vec<FileDescriptor>>,
    pub contents: HashMap<String, Vec<u8>>,
    pub broken_downloads: Vec<String>,
    pub auth_fails_on: Option<String>,
    pub updates: RefCell<Vec<Upload>>,
    pub creates: RefCell<Vec<Created>>,
    pub downloads: RefCell<Vec<String>>,
}

impl FakeStore {
    pub fn with_folder(name: &str) -> Self {
        Self {
            folder: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Add a file on the last page, recording its real size.
    pub fn add(&mut self, id: &str, name: &str, mime_type: &str, bytes: Vec<u8>) {
        let file = descriptor(id, name, mime_type, bytes.len() as u64);
        self.contents.insert(id.to_string(), bytes);
        match self.pages.last_mut() {
            Some(page) => page.push(file),
            None => self.pages.push(vec![file]),
        }
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
    }
}

impl RemoteStore for FakeStore {
    fn folder_name(&self, folder_id: &str) -> Result<String> {
        self.folder
            .clone()
            .ok_or_else(|| SqueezeError::FolderNotFound(folder_id.to_string()))
    }

    fn list_page(&self, _folder_id: &str, page_token: Option<&str>) -> Result<FilePage> {
        let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let files = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(FilePage {
            files,
            next_page_token,
        })
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.downloads.borrow_mut().push(file_id.to_string());
        if self.auth_fails_on.as_deref() == Some(file_id) {
            return Err(SqueezeError::Auth("token revoked".to_string()));
        }
        if self.broken_downloads.iter().any(|id| id == file_id) {
            return Err(SqueezeError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        self.contents.get(file_id).cloned().ok_or(SqueezeError::Api {
            status: 404,
            message: format!("File not found: {}", file_id),
        })
    }

    fn update(
        &self,
        file_id: &str,
        bytes: &[u8],
        mime_type: &str,
        new_name: Option<&str>,
    ) -> Result<()> {
        self.updates.borrow_mut().push(Upload {
            file_id: file_id.to_string(),
            bytes: bytes.to_vec(),
            mime_type: mime_type.to_string(),
            new_name: new_name.map(str::to_string),
        });
        Ok(())
    }

    fn create(
        &self,
        folder_id: &str,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String> {
        let mut creates = self.creates.borrow_mut();
        creates.push(Created {
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            bytes: bytes.to_vec(),
            mime_type: mime_type.to_string(),
        });
        Ok(format!("new-{}", creates.len()))
    }
}
