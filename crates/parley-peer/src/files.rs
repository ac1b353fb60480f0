use std::collections::HashMap;

use bytes::Bytes;
use parley_shared::{FileAnnounce, FileId};
use tracing::debug;

/// One file, either authored locally or received from a peer.
#[derive(Debug, Clone)]
pub struct FileRecord {
    id: FileId,
    name: String,
    size: u64,
    content: Option<Bytes>,
}

impl FileRecord {
    /// A locally loaded file, ready to be shared.
    pub fn local(name: impl Into<String>, content: Bytes) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            size: content.len() as u64,
            content: Some(content),
        }
    }

    /// An empty placeholder for a remote file that is being fetched.
    pub fn remote(announce: &FileAnnounce) -> Self {
        Self {
            id: announce.uuid,
            name: announce.name.clone(),
            size: announce.size,
            content: None,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.content.is_some()
    }

    /// Store received content. A zero-length file is still a complete file.
    pub fn set_content(&mut self, content: Bytes) {
        self.content = Some(content);
    }

    pub fn announce(&self) -> FileAnnounce {
        FileAnnounce {
            uuid: self.id,
            name: self.name.clone(),
            size: self.size,
        }
    }
}

/// The local participant's files.
#[derive(Debug, Default)]
pub struct FileSet {
    files: HashMap<FileId, FileRecord>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same ID.
    pub fn insert(&mut self, record: FileRecord) -> FileId {
        let id = record.id();
        if self.files.insert(id, record).is_some() {
            debug!(file = %id, "Replaced existing file record");
        }
        id
    }

    pub fn get(&self, id: &FileId) -> Option<&FileRecord> {
        self.files.get(id)
    }

    pub fn get_mut(&mut self, id: &FileId) -> Option<&mut FileRecord> {
        self.files.get_mut(id)
    }

    pub fn remove(&mut self, id: &FileId) -> Option<FileRecord> {
        self.files.remove(id)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.files.contains_key(id)
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.files.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
