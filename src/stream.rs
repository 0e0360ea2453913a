use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Where archive bytes come from. The codec only ever sees a [`ByteStream`];
/// this is the one place the three input shapes are told apart.
pub enum ByteSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Reader(Box<dyn Read>),
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> ByteSource {
        ByteSource::Bytes(bytes)
    }
}

impl From<PathBuf> for ByteSource {
    fn from(path: PathBuf) -> ByteSource {
        ByteSource::Path(path)
    }
}

enum Backing {
    Mem(Cursor<Vec<u8>>),
    File(File),
    Raw(Box<dyn Read>),
}

/// Sequential reader over an archive with a small pushback buffer, so the
/// delimiter scanner can return the bytes it overread past a field boundary.
pub struct ByteStream {
    backing: Backing,
    lookback: Vec<u8>,
    pos: u64,
}

impl ByteStream {
    pub fn new(source: ByteSource) -> io::Result<ByteStream> {
        let backing = match source {
            ByteSource::Path(p) => Backing::File(File::open(p)?),
            ByteSource::Bytes(b) => Backing::Mem(Cursor::new(b)),
            ByteSource::Reader(r) => Backing::Raw(r),
        };
        Ok(ByteStream {
            backing,
            lookback: Vec::new(),
            pos: 0,
        })
    }

    /// Read up to `n` bytes. A short result means end of stream.
    pub fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        let mut filled = self.take_lookback(&mut out);
        while filled < n {
            match self.backing_read(&mut out[filled..])? {
                0 => break,
                got => filled += got,
            }
        }
        out.truncate(filled);
        self.pos += filled as u64;
        Ok(out)
    }

    /// Advance `n` bytes without surfacing them. Seekable backings seek;
    /// raw readers read and discard.
    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let buffered = (self.lookback.len() as u64).min(n) as usize;
        self.lookback.drain(..buffered);
        self.pos += buffered as u64;

        let mut rest = n - buffered as u64;
        match &mut self.backing {
            Backing::Mem(c) => {
                c.seek(SeekFrom::Current(rest as i64))?;
                self.pos += rest;
            }
            Backing::File(f) => {
                f.seek(SeekFrom::Current(rest as i64))?;
                self.pos += rest;
            }
            Backing::Raw(r) => {
                let mut sink = [0u8; 4096];
                while rest > 0 {
                    let want = rest.min(sink.len() as u64) as usize;
                    let got = r.read(&mut sink[..want])?;
                    if got == 0 {
                        break;
                    }
                    rest -= got as u64;
                    self.pos += got as u64;
                }
            }
        }
        Ok(())
    }

    /// Reposition a seekable stream. Raw readers only honor forward motion
    /// relative to the current position.
    pub fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Mem(c) => Self::seek_backing(c, &mut self.lookback, &mut self.pos, to),
            Backing::File(f) => Self::seek_backing(f, &mut self.lookback, &mut self.pos, to),
            Backing::Raw(_) => match to {
                SeekFrom::Current(delta) if delta >= 0 => {
                    self.skip(delta as u64)?;
                    Ok(self.pos)
                }
                _ => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "seek on a non-seekable source",
                )),
            },
        }
    }

    /// Logical position: bytes handed out so far, pushback included.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Return overread bytes to the front of the stream. The next `read`
    /// serves them before touching the backing.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.lookback.splice(..0, bytes.iter().copied());
        self.pos -= bytes.len() as u64;
    }

    fn take_lookback(&mut self, out: &mut [u8]) -> usize {
        let take = self.lookback.len().min(out.len());
        out[..take].copy_from_slice(&self.lookback[..take]);
        self.lookback.drain(..take);
        take
    }

    fn backing_read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::Mem(c) => c.read(out),
            Backing::File(f) => f.read(out),
            Backing::Raw(r) => r.read(out),
        }
    }

    fn seek_backing<S: Seek>(
        backing: &mut S,
        lookback: &mut Vec<u8>,
        pos: &mut u64,
        to: SeekFrom,
    ) -> io::Result<u64> {
        let target = match to {
            SeekFrom::Current(delta) => {
                let abs = (*pos as i64)
                    .checked_add(delta)
                    .filter(|v| *v >= 0)
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "seek before stream start")
                    })?;
                backing.seek(SeekFrom::Start(abs as u64))?
            }
            absolute => backing.seek(absolute)?,
        };
        lookback.clear();
        *pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod test_byte_stream {
    use super::*;

    #[test]
    fn reads_are_short_only_at_eof() {
        let mut s = ByteStream::new(ByteSource::Bytes(vec![1, 2, 3, 4, 5])).unwrap();
        assert_eq!(s.read(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(s.read(4).unwrap(), vec![4, 5]);
        assert_eq!(s.read(4).unwrap(), Vec::<u8>::new());
        assert_eq!(s.tell(), 5);
    }

    #[test]
    fn unread_feeds_the_next_read() {
        let mut s = ByteStream::new(ByteSource::Bytes(vec![1, 2, 3, 4])).unwrap();
        let chunk = s.read(4).unwrap();
        s.unread(&chunk[2..]);
        assert_eq!(s.tell(), 2);
        assert_eq!(s.read(2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn skip_drains_lookback_first() {
        let mut s = ByteStream::new(ByteSource::Bytes(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let chunk = s.read(4).unwrap();
        s.unread(&chunk[1..]);
        s.skip(4).unwrap();
        assert_eq!(s.read(2).unwrap(), vec![6]);
    }

    #[test]
    fn raw_reader_skips_by_discarding() {
        let inner: Box<dyn std::io::Read> = Box::new(Cursor::new(vec![9u8; 10000]));
        let mut s = ByteStream::new(ByteSource::Reader(inner)).unwrap();
        s.skip(9999).unwrap();
        assert_eq!(s.read(2).unwrap(), vec![9]);
        assert_eq!(s.tell(), 10000);
    }

    #[test]
    fn raw_reader_rejects_backward_seek() {
        let inner: Box<dyn std::io::Read> = Box::new(Cursor::new(vec![0u8; 4]));
        let mut s = ByteStream::new(ByteSource::Reader(inner)).unwrap();
        assert!(s.seek(SeekFrom::Start(0)).is_err());
        assert!(s.seek(SeekFrom::Current(2)).is_ok());
    }

    #[test]
    fn seek_clears_pushback() {
        let mut s = ByteStream::new(ByteSource::Bytes((0u8..32).collect())).unwrap();
        let chunk = s.read(8).unwrap();
        s.unread(&chunk[4..]);
        s.seek(SeekFrom::Start(16)).unwrap();
        assert_eq!(s.read(2).unwrap(), vec![16, 17]);
        assert_eq!(s.tell(), 18);
    }
}
