//! Local simulation process owned by a client.
//!
//! # Process Cleanup Safety
//! `ServerProcess` owns the child and kills it on drop, so a client that
//! goes out of scope (normal return, `?` propagation or panic unwinding)
//! never leaves an orphaned simulation behind. The kill is forcible; the
//! simulation gets no chance to shut down gracefully.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

/// A launched simulation executable listening on `port`.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    executable: PathBuf,
    port: u16,
}

impl ServerProcess {
    /// Launch `executable --port {port}`.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the executable cannot be started.
    pub fn launch(executable: &Path, port: u16) -> std::io::Result<Self> {
        info!("Launching simulation: {} --port {}", executable.display(), port);

        let child = Command::new(executable)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .spawn()?;

        debug!("Simulation started with pid {}", child.id());

        Ok(Self {
            child,
            executable: executable.to_path_buf(),
            port,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Whether the process has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the process if still running and reap it.
    pub fn kill(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Simulation pid {} already exited: {}", self.child.id(), status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Error polling simulation pid {}: {}", self.child.id(), e),
        }

        info!("Killing simulation pid {}", self.child.id());
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill simulation pid {}: {}", self.child.id(), e);
        }
        // Reap to avoid a zombie
        let _ = self.child.wait();
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.kill();
    }
}
