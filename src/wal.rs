use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event as `[u32 len][bincode payload][u32 crc32]`.
fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the file ended first.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next record. `Ok(None)` on a clean end, a truncated tail,
/// a CRC mismatch or an undecodable payload: replay stops there.
fn decode_record(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

/// Append-only write-ahead log of ledger events.
///
/// One record per committed operation. A record torn by a crash is detected
/// through the length prefix and CRC and dropped on replay, so an operation is
/// either fully durable or absent.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// Set when a rollback could not restore the file. Appends are refused.
    poisoned: bool,
    /// Fail the next `flush_sync` after the bytes reach the file.
    #[cfg(test)]
    pub(crate) fail_next_sync: bool,
}

/// Position to roll back to if a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalMark {
    len: u64,
    appends: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            poisoned: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append and fsync a single event. Production code batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without flushing. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::other("fsync failed"));
        }
        self.writer.get_ref().sync_all()
    }

    /// Current end of the log. The write buffer is empty between batches.
    pub fn mark(&self) -> io::Result<WalMark> {
        if self.poisoned {
            return Err(io::Error::other("WAL is poisoned by a failed rollback"));
        }
        Ok(WalMark {
            len: self.writer.get_ref().metadata()?.len(),
            appends: self.appends_since_compact,
        })
    }

    /// Drop everything written or buffered since `mark`.
    pub fn rollback(&mut self, mark: WalMark) -> io::Result<()> {
        let restored = (|| -> io::Result<File> {
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(mark.len)?;
            file.sync_all()?;
            OpenOptions::new().append(true).open(&self.path)
        })();
        let file = match restored {
            Ok(file) => file,
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        };
        // Swap without flushing: the old buffer holds the failed batch.
        let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (_file, _unflushed) = old.into_parts();
        self.appends_since_compact = mark.appends;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events` via a temp file and an atomic rename.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_record(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        // The snapshot supersedes whatever a failed rollback left behind.
        self.poisoned = false;
        Ok(())
    }

    /// Replay all intact events from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = decode_record(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChamberStatus;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("chamberd_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn facility(name: &str) -> Event {
        Event::FacilityRegistered {
            id: Ulid::new(),
            name: name.into(),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            facility("North"),
            Event::ChamberStatusChanged {
                id: Ulid::new(),
                status: ChamberStatus::Maintenance,
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = facility("North");

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap(); // length says 9, only 2 bytes follow
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn failed_sync_rolls_back_to_mark() {
        let path = tmp_path("rollback.wal");
        let kept = facility("North");
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();

        let mark = wal.mark().unwrap();
        wal.append_buffered(&facility("South")).unwrap();
        wal.append_buffered(&facility("East")).unwrap();
        wal.fail_next_sync = true;
        assert!(wal.flush_sync().is_err());
        // The failed batch reached the file before the sync failed.
        assert_eq!(Wal::replay(&path).unwrap().len(), 3);

        wal.rollback(mark).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept.clone()]);
        assert_eq!(wal.appends_since_compact(), 1);

        let next = facility("West");
        wal.append(&next).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, next]);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        let good = facility("North");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&facility("South")).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn compact_replaces_history() {
        let path = tmp_path("compact.wal");
        let chamber = Ulid::new();
        let mut wal = Wal::open(&path).unwrap();
        for i in 0..20 {
            let status = if i % 2 == 0 {
                ChamberStatus::Maintenance
            } else {
                ChamberStatus::Available
            };
            wal.append(&Event::ChamberStatusChanged { id: chamber, status }).unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        let snapshot = vec![facility("North")];
        wal.compact(&snapshot).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let next = Event::BookingConfirmed { id: Ulid::new() };
        wal.append(&next).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![snapshot[0].clone(), next]);
    }

    #[test]
    fn buffered_appends_are_durable_after_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|i| facility(&format!("F{i}"))).collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
