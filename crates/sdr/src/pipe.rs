// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Errors from the named pipe reader. All of them are terminal.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to make {} non-blocking: {source}", path.display())]
    NonBlocking { path: PathBuf, source: io::Error },

    #[error("poll failed: {0}")]
    Poll(io::Error),

    #[error("read from {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("pipe index {index} out of range ({count} pipes)")]
    NoSuchPipe { index: usize, count: usize },
}

/// Result of one non-blocking read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes copied into the buffer
    Data(usize),
    /// The pipe is open but nothing has been written
    NoData,
    /// The writer has gone. Returned by the read that saw end of file and by
    /// every read after it.
    Closed,
}

/// Owned descriptor of one pipe. Dropping the file closes it.
enum PipeHandle {
    Open(File),
    Closed,
}

struct Pipe {
    path: PathBuf,
    handle: PipeHandle,
    /// Readable or hung up at the last wait
    ready: bool,
}

/// Non-blocking reader over a set of named pipes with a single blocking wait
pub struct NamedPipeMultiplexer {
    pipes: Vec<Pipe>,
}

impl NamedPipeMultiplexer {
    /// Open every path for reading.
    ///
    /// Opening a FIFO blocks until a writer attaches, so the writers must
    /// open their ends in the same order. Once open, each descriptor is
    /// switched to non-blocking mode.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self, PipeError> {
        let mut pipes = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref().to_path_buf();
            log::debug!("opening {} (waits for a writer)", path.display());
            let file = File::open(&path).map_err(|source| PipeError::Open {
                path: path.clone(),
                source,
            })?;
            set_nonblocking(&file).map_err(|source| PipeError::NonBlocking {
                path: path.clone(),
                source,
            })?;
            pipes.push(Pipe {
                path,
                handle: PipeHandle::Open(file),
                ready: false,
            });
        }
        log::info!("opened {} named pipes", pipes.len());
        Ok(Self { pipes })
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.pipes.get(index).map(|p| p.path.as_path())
    }

    /// Block until at least one open pipe is readable or hung up.
    ///
    /// Returns immediately when every pipe is closed. A signal interrupting
    /// the wait also returns early, with no pipe marked ready.
    pub fn wait_for_samples(&mut self) -> Result<(), PipeError> {
        let mut fds = Vec::with_capacity(self.pipes.len());
        let mut owners = Vec::with_capacity(self.pipes.len());
        for (i, pipe) in self.pipes.iter_mut().enumerate() {
            pipe.ready = false;
            if let PipeHandle::Open(file) = &pipe.handle {
                fds.push(libc::pollfd {
                    fd: file.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
                owners.push(i);
            }
        }
        if fds.is_empty() {
            return Ok(());
        }

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(PipeError::Poll(err));
        }

        let wake = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        for (fd, &i) in fds.iter().zip(&owners) {
            self.pipes[i].ready = fd.revents & wake != 0;
        }
        Ok(())
    }

    /// One non-blocking read from pipe `index` into `buf`
    pub fn read_samples(&mut self, index: usize, buf: &mut [u8]) -> Result<ReadOutcome, PipeError> {
        let count = self.pipes.len();
        let pipe = self
            .pipes
            .get_mut(index)
            .ok_or(PipeError::NoSuchPipe { index, count })?;

        let file = match &mut pipe.handle {
            PipeHandle::Open(file) => file,
            PipeHandle::Closed => return Ok(ReadOutcome::Closed),
        };

        match file.read(buf) {
            Ok(0) if !buf.is_empty() => {
                log::info!("{}: writer closed", pipe.path.display());
                pipe.handle = PipeHandle::Closed;
                pipe.ready = false;
                Ok(ReadOutcome::Closed)
            }
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                pipe.ready = false;
                Ok(ReadOutcome::NoData)
            }
            Err(source) => Err(PipeError::Read {
                path: pipe.path.clone(),
                source,
            }),
        }
    }

    /// Bytes waiting in pipe `index`, 0 for a closed pipe
    pub fn bytes_available(&self, index: usize) -> Result<usize, PipeError> {
        let pipe = self.pipes.get(index).ok_or(PipeError::NoSuchPipe {
            index,
            count: self.pipes.len(),
        })?;
        let file = match &pipe.handle {
            PipeHandle::Open(file) => file,
            PipeHandle::Closed => return Ok(0),
        };
        let mut available: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), libc::FIONREAD, &mut available) };
        if rc < 0 {
            return Err(PipeError::Read {
                path: pipe.path.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(available.max(0) as usize)
    }

    pub fn pipe_closed(&self, index: usize) -> bool {
        self.pipes
            .get(index)
            .map_or(true, |p| matches!(p.handle, PipeHandle::Closed))
    }

    pub fn all_pipes_closed(&self) -> bool {
        (0..self.pipes.len()).all(|i| self.pipe_closed(i))
    }

    /// Whether pipe `index` was readable at the last wait and has not been
    /// drained since
    pub fn is_ready(&self, index: usize) -> bool {
        self.pipes.get(index).map_or(false, |p| p.ready)
    }

    pub fn open_count(&self) -> usize {
        self.pipes
            .iter()
            .filter(|p| matches!(p.handle, PipeHandle::Open(_)))
            .count()
    }
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::ffi::OsStrExt;
    use std::thread;

    fn make_fifo(path: &Path) {
        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo {} failed", path.display());
    }

    /// Open writers in order on another thread while the reader opens
    fn open_with_writers(paths: &[PathBuf]) -> (NamedPipeMultiplexer, Vec<File>) {
        let writer_paths = paths.to_vec();
        let writers = thread::spawn(move || {
            writer_paths
                .iter()
                .map(|p| OpenOptions::new().write(true).open(p).unwrap())
                .collect::<Vec<File>>()
        });
        let mux = NamedPipeMultiplexer::open(paths).unwrap();
        (mux, writers.join().unwrap())
    }

    fn fifos(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("band{}.fifo", i));
                make_fifo(&path);
                path
            })
            .collect()
    }

    #[test]
    fn test_idle_pipe_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fifos(dir.path(), 3);
        let (mut mux, mut writers) = open_with_writers(&paths);
        assert_eq!(mux.len(), 3);

        writers[0].write_all(&[1, 2, 3, 4]).unwrap();
        writers[1].write_all(&[5, 6, 7, 8]).unwrap();
        mux.wait_for_samples().unwrap();
        assert!(mux.is_ready(0));
        assert!(!mux.is_ready(2));
        assert_eq!(mux.bytes_available(1).unwrap(), 4);
        assert_eq!(mux.bytes_available(2).unwrap(), 0);

        let mut buf = [0u8; 16];
        assert_eq!(mux.read_samples(2, &mut buf).unwrap(), ReadOutcome::NoData);
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::NoData);
        assert!(!mux.is_ready(0));
    }

    #[test]
    fn test_writer_close_closes_pipe_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fifos(dir.path(), 2);
        let (mut mux, mut writers) = open_with_writers(&paths);

        writers.remove(0);
        mux.wait_for_samples().unwrap();
        assert!(mux.is_ready(0));
        assert!(!mux.pipe_closed(0));

        let mut buf = [0u8; 8];
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Closed);
        assert!(mux.pipe_closed(0));
        assert!(!mux.all_pipes_closed());
        assert_eq!(mux.open_count(), 1);
        // Stays closed without touching the descriptor again
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Closed);

        drop(writers);
        mux.wait_for_samples().unwrap();
        assert_eq!(mux.read_samples(1, &mut buf).unwrap(), ReadOutcome::Closed);
        assert!(mux.all_pipes_closed());
        // Nothing left to wait for
        mux.wait_for_samples().unwrap();
    }

    #[test]
    fn test_data_before_close_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fifos(dir.path(), 1);
        let (mut mux, mut writers) = open_with_writers(&paths);

        writers[0].write_all(&[9; 6]).unwrap();
        drop(writers);
        mux.wait_for_samples().unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Data(2));
        assert_eq!(mux.read_samples(0, &mut buf).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_bad_index() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fifos(dir.path(), 1);
        let (mut mux, _writers) = open_with_writers(&paths);
        let mut buf = [0u8; 4];
        assert!(matches!(
            mux.read_samples(5, &mut buf),
            Err(PipeError::NoSuchPipe { index: 5, count: 1 })
        ));
        assert!(mux.pipe_closed(5));
    }
}
