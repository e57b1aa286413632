use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use preappend_core::{AccessMode, BufferedFile, OpenOptions};

use super::BufferArgs;

/// Mode used for `--create` when `--mode` is not given
const DEFAULT_MODE: u32 = 0o644;

#[derive(ClapArgs)]
pub struct Args {
    /// File to write
    pub file: PathBuf,

    /// Create the file if it does not exist
    #[arg(long)]
    pub create: bool,

    /// Permission bits for a created file, in octal
    #[arg(long, value_name = "OCTAL", value_parser = parse_mode, requires = "create")]
    pub mode: Option<u32>,

    /// Truncate the file on the first flush
    #[arg(long)]
    pub truncate: bool,

    /// Seek to the end of the file before the first flush
    #[arg(long)]
    pub append: bool,

    /// Insert written data in front of the file's existing content
    #[arg(long)]
    pub preappend: bool,

    /// Write TEXT and flush; repeat to insert several blocks in order
    /// (reads stdin when omitted)
    #[arg(long, value_name = "TEXT")]
    pub data: Vec<String>,

    #[command(flatten)]
    pub buffer: BufferArgs,
}

impl Args {
    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new()
            .with_access(AccessMode::WriteOnly)
            .with_buffer_capacity(self.buffer.buffer_size);
        if self.create {
            options = options.with_create(self.mode.unwrap_or(DEFAULT_MODE));
        }
        if self.truncate {
            options = options.with_truncate();
        }
        if self.append {
            options = options.with_append();
        }
        if self.preappend {
            options = options.with_preappend();
        }
        options
    }
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode = u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{s}': {e}"))?;
    if mode > 0o7777 {
        return Err(format!("mode '{s}' is out of range"));
    }
    Ok(mode)
}

#[instrument(level = "info", name = "cmd::write", skip_all, fields(file = %args.file.display()))]
pub fn execute(args: &Args) -> Result<()> {
    let mut file = args
        .open_options()
        .open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    let written = if args.data.is_empty() {
        copy_stdin(&mut file)?
    } else {
        let mut written = 0;
        for block in &args.data {
            written += file.write(block.as_bytes())?;
            file.flush()?;
            debug!(len = block.len(), cursor = ?file.insertion_cursor(), "Flushed block");
        }
        written
    };

    let stats = file.stats();
    file.close()
        .with_context(|| format!("Failed to close {}", args.file.display()))?;

    info!(
        bytes = written,
        flushes = stats.flushes,
        insertions = stats.insertions,
        "Wrote {written} bytes"
    );
    Ok(())
}

fn copy_stdin(file: &mut BufferedFile) -> Result<usize> {
    let mut stdin = io::stdin().lock();
    let mut chunk = vec![0u8; file.capacity()];
    let mut written = 0;

    loop {
        let n = match stdin.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read stdin"),
        };
        written += file.write(&chunk[..n])?;
    }

    Ok(written)
}
