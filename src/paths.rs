// src/paths.rs

//! Run-id generation, run-directory layout, and tail-reads of log files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::Local;
use rand::Rng;

/// Layout of a single run's on-disk directory.
///
/// All paths are relative to `<home>/runs/<run_id>/`.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
}

impl RunPaths {
    pub fn new(home: &Path, run_id: &str) -> Self {
        Self {
            root: home.join("runs").join(run_id),
        }
    }

    pub fn plan_file(&self) -> PathBuf {
        self.root.join("plan.yaml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn state_tmp_file(&self) -> PathBuf {
        self.root.join("state.json.tmp")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn cancel_marker(&self) -> PathBuf {
        self.root.join("cancel.request")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn stdout_log(&self, task_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{task_id}.out.log"))
    }

    pub fn stderr_log(&self, task_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{task_id}.err.log"))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn task_artifacts_dir(&self, task_id: &str) -> PathBuf {
        self.artifacts_dir().join(task_id)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.join("report")
    }

    pub fn final_report(&self) -> PathBuf {
        self.report_dir().join("final_report.md")
    }
}

/// Generate a fresh run id: `YYYYMMDD_HHMMSS_<6-hex>` in local time.
pub fn generate_run_id() -> String {
    let now = Local::now();
    let entropy: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{}_{:06x}", now.format("%Y%m%d_%H%M%S"), entropy & 0xFFFFFF)
}

/// Read the last `n` lines of `path`, tolerant of files that don't exist
/// (returns an empty vec) and crash-safe against concurrent appenders since
/// appends never rewrite previously-written bytes.
///
/// Reads backwards in fixed-size chunks rather than loading the whole file,
/// so this stays cheap even for multi-gigabyte task logs.
pub fn tail_lines(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    if n == 0 || !path.exists() {
        return Ok(Vec::new());
    }

    const CHUNK: usize = 64 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut pos = file_len;
    let mut newline_count: usize = 0;
    let mut buf = Vec::new();

    while pos > 0 && newline_count <= n {
        let read_len = CHUNK.min(pos as usize) as u64;
        pos -= read_len;
        file.seek(SeekFrom::Start(pos))?;

        let mut chunk = vec![0u8; read_len as usize];
        file.read_exact(&mut chunk)?;

        newline_count += chunk.iter().filter(|&&b| b == b'\n').count();

        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.len() > n {
        let start = lines.len() - n;
        lines = lines[start..].to_vec();
    }

    Ok(lines.into_iter().map(str::to_string).collect())
}
