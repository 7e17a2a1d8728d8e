//! In-memory port for unit tests.

use {
    crate::{error::Result, port::Port},
    std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::{Arc, Mutex, MutexGuard},
        time::Duration,
    },
};

/// Observable state shared between a [`MockPort`] and the test body.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    /// Results of successive reads; an empty chunk is one timed-out wait.
    pub reads: VecDeque<io::Result<Vec<u8>>>,
    /// Everything written so far.
    pub written: Vec<u8>,
    /// Accept at most this many bytes per write call.
    pub write_limit: Option<usize>,
    pub timeout: Duration,
    pub baud_rate: u32,
    /// Every timeout passed to `set_timeout`, in order.
    pub timeouts_set: Vec<Duration>,
    pub clears: usize,
    pub closed: bool,
}

/// Port double answering reads from a script of chunks.
pub(crate) struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                baud_rate,
                timeout,
                ..MockState::default()
            })),
        }
    }

    /// Queue a chunk for a single read call.
    pub fn push_read(&self, chunk: &[u8]) {
        self.state().reads.push_back(Ok(chunk.to_vec()));
    }

    /// Queue a failed read.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.state()
            .reads
            .push_back(Err(io::Error::new(kind, "scripted read error")));
    }

    /// Shared handle for inspecting the port after it has been moved.
    pub fn handle(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let Some(next) = state.reads.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };
        let mut chunk = next?;
        if chunk.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            let rest = chunk.split_off(n);
            state.reads.push_front(Ok(rest));
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let n = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.timeout = timeout;
        state.timeouts_set.push(timeout);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.state().timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.state().baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.state().baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.state().clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}
