//! Append-only session log file

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::epoch_secs;

/// Thread-safe session log writer.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<BufWriter<File>>>,
    path: PathBuf,
    session: Uuid,
}

impl SessionLog {
    /// Create `<dir>/<name>-<session>.log`, creating `dir` if needed.
    pub fn create(dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let session = Uuid::new_v4();
        let path = dir.join(format!("{name}-{session}.log"));
        let mut file = BufWriter::new(File::create(&path)?);
        writeln!(file, "# session {session} start {:.3}", epoch_secs())?;
        file.flush()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
            path,
            session,
        })
    }

    /// Append one `time,event,detail` line.
    pub fn record(&self, event: &str, detail: impl fmt::Display) -> io::Result<()> {
        let mut file = self.inner.lock();
        writeln!(file, "{:.3},{event},{detail}", epoch_secs())?;
        file.flush()
    }

    /// Log file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session
    }
}

impl fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
