//! Persistent vector store: an in-memory index backed by an append-only log.
//!
//! # Log format
//!
//! ```text
//! header:  b"TVLG" | version: u32
//! record:  body_len: u32 | body
//! body:    op: u8 | id | topicId | questionId | item_type: u8 | dim: u32 | dim x f32
//! string:  len: u16 | utf-8 bytes
//! ```
//!
//! All integers and floats are little-endian. Records are replayed in order
//! on open, so a later upsert of an id overrides earlier ones. A record cut
//! short by a crash is dropped and the file truncated back to the last
//! complete record. A failed append is cut back the same way before the
//! error is returned, so later records never follow a torn one.

use super::index::VectorIndex;
use super::manifest::{FORMAT_VERSION, Manifest};
use super::predicate::Predicate;
use super::{Page, StoreError, StoreResult, VectorStore};
use crate::types::{ItemMetadata, ItemType, MetadataFilter, SearchResult, StoredVector};
use crate::vector::VectorDimension;
use memmap2::MmapOptions;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const LOG_FILE: &str = "vectors.log";

const MAGIC_BYTES: &[u8; 4] = b"TVLG";
const HEADER_SIZE: usize = 8;
const OP_UPSERT: u8 = 1;

struct Inner {
    index: VectorIndex,
    manifest: Manifest,
    /// Length of the log up to the end of the last complete record
    log_len: u64,
}

/// Outcome of `PersistentVectorStore::compact`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CompactReport {
    pub records: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Vector store persisted under a directory as `vectors.log` + `manifest.json`.
pub struct PersistentVectorStore {
    dir: PathBuf,
    log_path: PathBuf,
    inner: RwLock<Inner>,
}

impl PersistentVectorStore {
    /// Open or create a store in `dir` for vectors produced by `model`.
    pub fn open(dir: impl AsRef<Path>, model: &str) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let stored = Manifest::load(&dir)?;
        let created = stored.is_none();
        let mut manifest = match stored {
            Some(manifest) => {
                if manifest.model != model {
                    warn!(
                        stored = %manifest.model,
                        configured = model,
                        "store was built with a different embedding model"
                    );
                }
                manifest
            }
            None => Manifest::new(model),
        };

        let log_path = dir.join(LOG_FILE);
        let dimension = manifest.dimension.and_then(|d| VectorDimension::new(d).ok());
        let mut index = VectorIndex::with_dimension(dimension);
        let mut log_len = 0u64;
        let mut truncated = false;

        if log_path.exists() {
            let file = File::open(&log_path)?;
            let file_len = file.metadata()?.len() as usize;
            if file_len > 0 {
                // SAFETY: the log is only written through this store, which
                // is not yet shared, and the map is dropped before any write.
                let mmap = unsafe { MmapOptions::new().map(&file)? };
                let valid_len = replay(&mmap, &log_path, &mut index)?;
                drop(mmap);

                if valid_len < file_len {
                    warn!(
                        path = %log_path.display(),
                        dropped_bytes = file_len - valid_len,
                        "ignoring truncated record at end of vector log"
                    );
                    OpenOptions::new()
                        .write(true)
                        .open(&log_path)?
                        .set_len(valid_len as u64)?;
                    truncated = true;
                }
                log_len = valid_len as u64;
            }
        }

        // Read-only opens leave an up-to-date manifest untouched
        let count = index.len();
        let dimension = index.dimension().map(|d| d.get());
        if created || truncated || manifest.count != count || manifest.dimension != dimension {
            manifest.touch(count, dimension);
            manifest.save(&dir)?;
        }
        info!(
            path = %dir.display(),
            count = index.len(),
            "opened vector store"
        );

        Ok(Self {
            dir,
            log_path,
            inner: RwLock::new(Inner {
                index,
                manifest,
                log_len,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> Manifest {
        self.inner.read().manifest.clone()
    }

    /// Rewrite the log so it holds exactly one record per live id.
    pub fn compact(&self) -> StoreResult<CompactReport> {
        let mut inner = self.inner.write();
        let bytes_before = fs::metadata(&self.log_path).map(|m| m.len()).unwrap_or(0);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_header(&mut writer)?;
            let mut record = Vec::new();
            for entry in inner.index.iter() {
                record.clear();
                encode_record(&mut record, &entry.id, &entry.embedding, &entry.metadata)?;
                writer.write_all(&record)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.log_path).map_err(|e| StoreError::Io(e.error))?;

        let report = CompactReport {
            records: inner.index.len(),
            bytes_before,
            bytes_after: fs::metadata(&self.log_path)?.len(),
        };
        inner.log_len = report.bytes_after;
        info!(
            records = report.records,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "compacted vector log"
        );
        Ok(report)
    }

    /// Append encoded records at `log_len`, advancing it on success.
    ///
    /// Bytes past `log_len` are left over from an earlier failed write and
    /// are cut off first. On error the file is cut back to `log_len` again.
    fn append(&self, log_len: &mut u64, records: &[u8]) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.log_path)?;

        let file_len = file.metadata()?.len();
        if file_len < *log_len {
            return Err(StoreError::Corrupted {
                path: self.log_path.clone(),
                offset: file_len as usize,
                reason: format!("log shrank below {log_len} bytes while open"),
            });
        }
        if file_len > *log_len {
            warn!(
                path = %self.log_path.display(),
                dropped_bytes = file_len - *log_len,
                "dropping incomplete bytes at end of vector log"
            );
            file.set_len(*log_len)?;
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + records.len());
        if *log_len == 0 {
            write_header(&mut bytes)?;
        }
        bytes.extend_from_slice(records);

        let written = file
            .seek(SeekFrom::Start(*log_len))
            .and_then(|_| file.write_all(&bytes))
            .and_then(|()| file.flush());
        if let Err(e) = written {
            warn!(
                path = %self.log_path.display(),
                error = %e,
                "append failed, cutting vector log back to last record"
            );
            if let Err(rollback) = file.set_len(*log_len) {
                warn!(error = %rollback, "failed to cut back vector log");
            }
            return Err(e.into());
        }

        *log_len += bytes.len() as u64;
        Ok(())
    }
}

impl VectorStore for PersistentVectorStore {
    fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ItemMetadata],
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.index.check(ids, vectors, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut records = Vec::new();
        for ((id, vector), metadata) in ids.iter().zip(vectors).zip(metadatas) {
            encode_record(&mut records, id, vector, metadata)?;
        }
        self.append(&mut inner.log_len, &records)?;

        for ((id, vector), metadata) in ids.iter().zip(vectors).zip(metadatas) {
            inner.index.apply(id.clone(), vector.clone(), metadata.clone());
        }

        let count = inner.index.len();
        let dimension = inner.index.dimension().map(|d| d.get());
        inner.manifest.touch(count, dimension);
        inner.manifest.save(&self.dir)?;

        debug!(upserted = ids.len(), total = count, "appended to vector log");
        Ok(())
    }

    fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<SearchResult>> {
        self.inner
            .read()
            .index
            .query(vector, k, &Predicate::from(filter))
    }

    fn get(&self, filter: &MetadataFilter, page: Page) -> StoreResult<Vec<StoredVector>> {
        Ok(self.inner.read().index.get(&Predicate::from(filter), page))
    }

    fn count(&self) -> usize {
        self.inner.read().index.len()
    }

    fn dimension(&self) -> Option<VectorDimension> {
        self.inner.read().index.dimension()
    }
}

fn write_header(writer: &mut impl Write) -> std::io::Result<()> {
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())
}

fn put_str(buf: &mut Vec<u8>, field: &'static str, value: &str) -> StoreResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| StoreError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

fn encode_record(
    buf: &mut Vec<u8>,
    id: &str,
    vector: &[f32],
    metadata: &ItemMetadata,
) -> StoreResult<()> {
    let mut body = Vec::with_capacity(16 + id.len() + vector.len() * 4);
    body.push(OP_UPSERT);
    put_str(&mut body, "id", id)?;
    put_str(&mut body, "topicId", &metadata.topic_id)?;
    put_str(&mut body, "questionId", &metadata.question_id)?;
    body.push(metadata.item_type.to_tag());
    body.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in vector {
        body.extend_from_slice(&value.to_le_bytes());
    }

    let len = u32::try_from(body.len()).map_err(|_| StoreError::FieldTooLong {
        field: "record",
        len: body.len(),
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(())
}

/// Bounds-checked reader over one record body.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(format!("record body ends after {} bytes", self.bytes.len())),
        }
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String, String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid utf-8: {e}"))
    }
}

fn decode_body(body: &[u8]) -> Result<(String, Vec<f32>, ItemMetadata), String> {
    let mut reader = Reader {
        bytes: body,
        pos: 0,
    };
    let op = reader.u8()?;
    if op != OP_UPSERT {
        return Err(format!("unknown operation {op}"));
    }
    let id = reader.string()?;
    let topic_id = reader.string()?;
    let question_id = reader.string()?;
    let tag = reader.u8()?;
    let item_type = ItemType::from_tag(tag).ok_or_else(|| format!("unknown item type {tag}"))?;
    let dim = reader.u32()? as usize;
    let raw = reader.take(dim.checked_mul(4).ok_or("dimension overflow")?)?;
    if reader.pos != body.len() {
        return Err("trailing bytes after vector".to_string());
    }

    let vector = raw
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let metadata = ItemMetadata {
        topic_id,
        question_id,
        item_type,
    };
    Ok((id, vector, metadata))
}

/// Replays the log into `index`. Returns the length of the readable prefix.
fn replay(bytes: &[u8], path: &Path, index: &mut VectorIndex) -> StoreResult<usize> {
    if bytes.len() < HEADER_SIZE {
        // Crashed while writing the header
        return Ok(0);
    }
    if &bytes[0..4] != MAGIC_BYTES {
        return Err(StoreError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: "invalid magic bytes".to_string(),
        });
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version > FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let corrupted = |offset: usize, reason: String| StoreError::Corrupted {
        path: path.to_path_buf(),
        offset,
        reason,
    };

    let mut offset = HEADER_SIZE;
    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < 4 {
            break;
        }
        let len = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        if remaining - 4 < len {
            break;
        }

        let body = &bytes[offset + 4..offset + 4 + len];
        let (id, vector, metadata) = decode_body(body).map_err(|reason| corrupted(offset, reason))?;
        index
            .check(
                std::slice::from_ref(&id),
                std::slice::from_ref(&vector),
                std::slice::from_ref(&metadata),
            )
            .map_err(|e| corrupted(offset, e.to_string()))?;
        index.apply(id, vector, metadata);

        offset += 4 + len;
    }
    Ok(offset)
}
