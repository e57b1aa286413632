use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, instrument};

use preappend_core::OpenOptions;

use super::BufferArgs;

#[derive(ClapArgs)]
pub struct Args {
    /// File to read
    pub file: PathBuf,

    #[command(flatten)]
    pub buffer: BufferArgs,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(file = %args.file.display()))]
pub fn execute(args: &Args) -> Result<()> {
    let mut file = OpenOptions::new()
        .with_buffer_capacity(args.buffer.buffer_size)
        .open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    let mut stdout = io::stdout().lock();
    let mut chunk = vec![0u8; file.capacity()];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        stdout.write_all(&chunk[..n])?;
        total += n as u64;
    }
    stdout.flush()?;

    file.close()?;
    debug!(bytes = total, "Read complete");
    Ok(())
}
