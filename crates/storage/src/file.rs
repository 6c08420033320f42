//! Single-file store layout.
//!
//! ## File Format
//!
//! ```text
//! [header: 64 bytes][record region][...free space]
//! ```
//!
//! Header:
//!
//! ```text
//! [magic: 8]["MICASTOR"]
//! [format_version: u32 le]
//! [flags: u32 le]
//! [version: u64 le]          commit counter of the last published version
//! [top_ref: u64 le]          group root node
//! [logical_end: u64 le]      end of the logical address space
//! [region_end: u64 le]       end of the valid record region
//! [codec_tag: 8]             codec id, padded/truncated
//! [reserved: 4]
//! [crc32: u32 le]            over bytes 0..60
//! ```
//!
//! The record region is an append-only log of node records:
//!
//! ```text
//! [kind: u8][addr: u64 le][len: u32 le][payload: len bytes][crc32: u32 le]
//! ```
//!
//! kind 1 = node (payload is the codec-encoded node image), kind 2 = free
//! (no payload). A commit appends its records and fsyncs before the header
//! is rewritten, so a crash mid-commit leaves the previous version intact:
//! the stale header simply ignores the torn tail beyond `region_end`.
//!
//! Compaction is explicit (`compact`), rewriting only live nodes into a
//! fresh file and atomically renaming it into place. Node addresses are
//! preserved, so refs stay valid across compaction.

use crate::alloc::{Arena, CommitSet};
use crate::codec::StorageCodec;
use byteorder::{ByteOrder, LittleEndian};
use mica_core::{Error, Ref, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const MAGIC: &[u8; 8] = b"MICASTOR";
const FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 64;

const RECORD_NODE: u8 = 1;
const RECORD_FREE: u8 = 2;

/// Fixed overhead of a record around its payload
const RECORD_OVERHEAD: usize = 1 + 8 + 4 + 4;

/// How eagerly commits reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync data and header on every commit
    #[default]
    Strict,
    /// Leave flushing to the OS; fsync only on close/compaction
    Relaxed,
}

/// Values recovered from a store file on open
#[derive(Debug, Clone, Copy)]
pub struct OpenOutcome {
    /// Commit counter of the recovered version
    pub version: u64,
    /// Group root ref of the recovered version
    pub top_ref: Ref,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    version: u64,
    top_ref: u64,
    logical_end: u64,
    region_end: u64,
    codec_tag: [u8; 8],
}

impl Header {
    fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut buf[8..12], FORMAT_VERSION);
        LittleEndian::write_u32(&mut buf[12..16], 0);
        LittleEndian::write_u64(&mut buf[16..24], self.version);
        LittleEndian::write_u64(&mut buf[24..32], self.top_ref);
        LittleEndian::write_u64(&mut buf[32..40], self.logical_end);
        LittleEndian::write_u64(&mut buf[40..48], self.region_end);
        buf[48..56].copy_from_slice(&self.codec_tag);
        let crc = crc32fast::hash(&buf[0..60]);
        LittleEndian::write_u32(&mut buf[60..64], crc);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(Error::Corruption("file shorter than header".to_string()));
        }
        if &buf[0..8] != MAGIC {
            return Err(Error::Corruption("bad magic; not a mica store".to_string()));
        }
        let format = LittleEndian::read_u32(&buf[8..12]);
        if format != FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported format version {format}"
            )));
        }
        let crc = crc32fast::hash(&buf[0..60]);
        if crc != LittleEndian::read_u32(&buf[60..64]) {
            return Err(Error::Corruption("header checksum mismatch".to_string()));
        }
        let mut codec_tag = [0u8; 8];
        codec_tag.copy_from_slice(&buf[48..56]);
        Ok(Header {
            version: LittleEndian::read_u64(&buf[16..24]),
            top_ref: LittleEndian::read_u64(&buf[24..32]),
            logical_end: LittleEndian::read_u64(&buf[32..40]),
            region_end: LittleEndian::read_u64(&buf[40..48]),
            codec_tag,
        })
    }
}

fn codec_tag(codec: &dyn StorageCodec) -> [u8; 8] {
    let mut tag = [0u8; 8];
    let id = codec.codec_id().as_bytes();
    let n = id.len().min(8);
    tag[..n].copy_from_slice(&id[..n]);
    tag
}

fn encode_record(kind: u8, addr: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_OVERHEAD + payload.len());
    buf.push(kind);
    let mut addr_buf = [0u8; 8];
    LittleEndian::write_u64(&mut addr_buf, addr);
    buf.extend_from_slice(&addr_buf);
    let mut len_buf = [0u8; 4];
    LittleEndian::write_u32(&mut len_buf, payload.len() as u32);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf);
    let mut crc_buf = [0u8; 4];
    LittleEndian::write_u32(&mut crc_buf, crc);
    buf.extend_from_slice(&crc_buf);
    buf
}

struct FileState {
    file: File,
    region_end: u64,
}

/// Backing file for one open store
pub struct FileStore {
    path: PathBuf,
    codec: Arc<dyn StorageCodec>,
    durability: DurabilityMode,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("codec", &self.codec.codec_id())
            .field("durability", &self.durability)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Create a fresh store file (fails if one already exists)
    pub fn create(
        path: &Path,
        codec: Arc<dyn StorageCodec>,
        durability: DurabilityMode,
    ) -> Result<FileStore> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let header = Header {
            version: 0,
            top_ref: 0,
            logical_end: FILE_HEADER_SIZE as u64,
            region_end: FILE_HEADER_SIZE as u64,
            codec_tag: codec_tag(codec.as_ref()),
        };
        file.write_all(&header.encode())?;
        file.sync_all()?;
        info!(path = %path.display(), "created store file");
        Ok(FileStore {
            path: path.to_path_buf(),
            codec,
            durability,
            state: Mutex::new(FileState {
                file,
                region_end: FILE_HEADER_SIZE as u64,
            }),
        })
    }

    /// Open an existing store file, loading every live node into `arena`.
    ///
    /// Validates the header (magic, format version, CRC, codec tag) before
    /// touching the record region, then replays node/free records in append
    /// order so later records shadow earlier ones.
    pub fn open(
        path: &Path,
        codec: Arc<dyn StorageCodec>,
        durability: DurabilityMode,
        arena: &Arena,
    ) -> Result<(FileStore, OpenOutcome)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // Read-only map for parsing; all writes go through the File handle.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        let header = Header::decode(&map)?;
        if header.codec_tag != codec_tag(codec.as_ref()) {
            return Err(Error::Corruption(format!(
                "store was created with codec '{}', opened with '{}'",
                String::from_utf8_lossy(&header.codec_tag),
                codec.codec_id()
            )));
        }
        if header.region_end as usize > map.len() {
            return Err(Error::Corruption(
                "record region extends past end of file".to_string(),
            ));
        }

        let mut at = FILE_HEADER_SIZE;
        let end = header.region_end as usize;
        while at < end {
            if at + RECORD_OVERHEAD - 4 > end {
                return Err(Error::Corruption(format!("record truncated at {at}")));
            }
            let kind = map[at];
            let addr = LittleEndian::read_u64(&map[at + 1..]);
            let len = LittleEndian::read_u32(&map[at + 9..]) as usize;
            let body_end = at + 13 + len;
            if body_end + 4 > end {
                return Err(Error::Corruption(format!("record truncated at {at}")));
            }
            let crc = crc32fast::hash(&map[at..body_end]);
            if crc != LittleEndian::read_u32(&map[body_end..]) {
                return Err(Error::Corruption(format!(
                    "record checksum mismatch at {at}"
                )));
            }
            match kind {
                RECORD_NODE => {
                    let bytes = codec.decode(&map[at + 13..body_end])?;
                    arena.load_node(addr, bytes);
                }
                RECORD_FREE => arena.drop_node(addr),
                other => {
                    return Err(Error::Corruption(format!(
                        "unknown record kind {other} at {at}"
                    )))
                }
            }
            at = body_end + 4;
        }
        drop(map);

        debug!(
            path = %path.display(),
            version = header.version,
            nodes = arena.node_count(),
            "opened store file"
        );
        Ok((
            FileStore {
                path: path.to_path_buf(),
                codec,
                durability,
                state: Mutex::new(FileState {
                    file,
                    region_end: header.region_end,
                }),
            },
            OpenOutcome {
                version: header.version,
                top_ref: Ref(header.top_ref),
            },
        ))
    }

    /// Append one commit's records and publish the new header.
    ///
    /// Records are flushed (and under `Strict`, synced) before the header
    /// flips to the new version, so readers of a crashed file recover the
    /// previous version rather than a partial one.
    pub fn append_commit(
        &self,
        commit: &CommitSet,
        version: u64,
        top_ref: Ref,
        logical_end: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let mut region = Vec::new();
        for (addr, bytes) in &commit.new_nodes {
            let payload = self.codec.encode(bytes)?;
            region.extend_from_slice(&encode_record(RECORD_NODE, *addr, &payload));
        }
        for addr in &commit.freed {
            region.extend_from_slice(&encode_record(RECORD_FREE, *addr, &[]));
        }

        let at = state.region_end;
        state.file.seek(SeekFrom::Start(at))?;
        state.file.write_all(&region)?;
        state.file.flush()?;
        if self.durability == DurabilityMode::Strict {
            state.file.sync_data()?;
        }

        let region_end = state.region_end + region.len() as u64;
        let header = Header {
            version,
            top_ref: top_ref.0,
            logical_end,
            region_end,
            codec_tag: codec_tag(self.codec.as_ref()),
        };
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&header.encode())?;
        state.file.flush()?;
        if self.durability == DurabilityMode::Strict {
            state.file.sync_data()?;
        }
        state.region_end = region_end;
        Ok(())
    }

    /// Rewrite the file with only live nodes, dropping shadowed records.
    ///
    /// Explicit maintenance; never triggered automatically. Node addresses
    /// are preserved, so open refs remain valid.
    pub fn compact(&self, arena: &Arena, version: u64, top_ref: Ref) -> Result<()> {
        let mut state = self.state.lock();
        let tmp_path = self.path.with_extension("compact-tmp");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut region = Vec::new();
        for (addr, bytes) in arena.live_nodes() {
            let payload = self.codec.encode(&bytes)?;
            region.extend_from_slice(&encode_record(RECORD_NODE, addr, &payload));
        }
        let region_end = FILE_HEADER_SIZE as u64 + region.len() as u64;
        let header = Header {
            version,
            top_ref: top_ref.0,
            logical_end: arena.logical_end(),
            region_end,
            codec_tag: codec_tag(self.codec.as_ref()),
        };
        tmp.write_all(&header.encode())?;
        tmp.write_all(&region)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.sync_all()?;
        state.file = file;
        state.region_end = region_end;
        info!(path = %self.path.display(), bytes = region_end, "store compacted");
        Ok(())
    }

    /// Write a zstd-compressed backup of the current file contents
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let state = self.state.lock();
        let mut src = File::open(&self.path)?;
        let out = File::create(dest)?;
        zstd::stream::copy_encode(&mut src, out, 0)
            .map_err(|e| Error::FileAccess(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        drop(state);
        Ok(())
    }

    /// Flush and sync everything outstanding
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::WriteArena;
    use crate::codec::{AesGcmCodec, IdentityCodec};
    use mica_core::{NodeStore, NodeStoreMut};

    fn identity() -> Arc<dyn StorageCodec> {
        Arc::new(IdentityCodec)
    }

    #[test]
    fn test_create_and_reopen_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let arena = Arc::new(Arena::new(1 << 20));
        let (_fs, outcome) =
            FileStore::open(&path, identity(), DurabilityMode::Strict, &arena).unwrap();
        assert_eq!(outcome.version, 0);
        assert!(outcome.top_ref.is_null());
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let arena = Arc::new(Arena::new(1 << 20));
        let fs = FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![1, 2, 3, 4]).unwrap();
        let commit = w.into_commit();
        fs.append_commit(&commit, 1, r, arena.logical_end()).unwrap();
        arena.publish(commit, 1);

        let arena2 = Arena::new(1 << 20);
        let (_fs2, outcome) =
            FileStore::open(&path, identity(), DurabilityMode::Strict, &arena2).unwrap();
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.top_ref, r);
        assert_eq!(&arena2.node(r).unwrap()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_free_records_shadow_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let arena = Arc::new(Arena::new(1 << 20));
        let fs = FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let mut w = WriteArena::new(Arc::clone(&arena));
        let a = w.put_node(vec![1]).unwrap();
        let b = w.put_node(vec![2]).unwrap();
        let commit = w.into_commit();
        fs.append_commit(&commit, 1, b, arena.logical_end()).unwrap();
        arena.publish(commit, 1);

        let mut w = WriteArena::new(Arc::clone(&arena));
        w.free_node(a).unwrap();
        let commit = w.into_commit();
        fs.append_commit(&commit, 2, b, arena.logical_end()).unwrap();
        arena.publish(commit, 2);

        let arena2 = Arena::new(1 << 20);
        let (_fs2, _) =
            FileStore::open(&path, identity(), DurabilityMode::Strict, &arena2).unwrap();
        assert!(arena2.node(a).is_err());
        assert!(arena2.node(b).is_ok());
    }

    #[test]
    fn test_debug_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let fs = FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();
        let dump = format!("{fs:?}");
        assert!(dump.contains("FileStore"));
        assert!(dump.contains("identity"));
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let arena = Arc::new(Arena::new(1 << 20));
        let err = FileStore::open(&path, identity(), DurabilityMode::Strict, &arena).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_codec_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let arena = Arc::new(Arena::new(1 << 20));
        let encrypted: Arc<dyn StorageCodec> = Arc::new(AesGcmCodec::new(&[1u8; 32]));
        let err =
            FileStore::open(&path, encrypted, DurabilityMode::Strict, &arena).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_encrypted_round_trip_and_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let codec: Arc<dyn StorageCodec> = Arc::new(AesGcmCodec::new(&[9u8; 32]));
        let arena = Arc::new(Arena::new(1 << 20));
        let fs = FileStore::create(&path, Arc::clone(&codec), DurabilityMode::Strict).unwrap();

        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(b"secret node".to_vec()).unwrap();
        let commit = w.into_commit();
        fs.append_commit(&commit, 1, r, arena.logical_end()).unwrap();
        arena.publish(commit, 1);

        let arena2 = Arena::new(1 << 20);
        let (_fs2, _) =
            FileStore::open(&path, codec, DurabilityMode::Strict, &arena2).unwrap();
        assert_eq!(&arena2.node(r).unwrap()[..], b"secret node");

        // Same codec id, different key: pages fail authentication
        let wrong: Arc<dyn StorageCodec> = Arc::new(AesGcmCodec::new(&[8u8; 32]));
        let arena3 = Arena::new(1 << 20);
        let err =
            FileStore::open(&path, wrong, DurabilityMode::Strict, &arena3).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_compact_preserves_nodes_and_shrinks_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let arena = Arc::new(Arena::new(1 << 20));
        let fs = FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        // Several generations of the same node leave shadowed records
        let mut last = Ref::NULL;
        for gen in 0u8..10 {
            let mut w = WriteArena::new(Arc::clone(&arena));
            if !last.is_null() {
                last = w.write_node(last, vec![gen; 32]).unwrap();
            } else {
                last = w.put_node(vec![gen; 32]).unwrap();
            }
            let commit = w.into_commit();
            fs.append_commit(&commit, u64::from(gen) + 1, last, arena.logical_end())
                .unwrap();
            arena.publish(commit, u64::from(gen) + 1);
        }
        arena.reclaim(u64::MAX);
        let before = std::fs::metadata(&path).unwrap().len();
        fs.compact(&arena, 10, last).unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before);

        let arena2 = Arena::new(1 << 20);
        let (_fs2, outcome) =
            FileStore::open(&path, identity(), DurabilityMode::Strict, &arena2).unwrap();
        assert_eq!(outcome.version, 10);
        assert_eq!(&arena2.node(last).unwrap()[..], &[9u8; 32]);
    }

    #[test]
    fn test_backup_is_compressed_and_smaller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mica");
        let arena = Arc::new(Arena::new(1 << 20));
        let fs = FileStore::create(&path, identity(), DurabilityMode::Strict).unwrap();

        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![0u8; 4096]).unwrap();
        let commit = w.into_commit();
        fs.append_commit(&commit, 1, r, arena.logical_end()).unwrap();
        arena.publish(commit, 1);

        let backup = dir.path().join("store.bak.zst");
        fs.backup_to(&backup).unwrap();
        assert!(
            std::fs::metadata(&backup).unwrap().len()
                < std::fs::metadata(&path).unwrap().len()
        );
    }
}
