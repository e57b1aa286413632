pub mod cat;
pub mod write;

use clap::Args as ClapArgs;
use preappend_core::BUFFER_SIZE;

/// Buffer sizing shared by every command that opens a file
#[derive(ClapArgs, Clone, Debug)]
pub struct BufferArgs {
    /// Capacity of the handle's write and read buffers, in bytes
    #[arg(
        long,
        value_name = "BYTES",
        env = "PREAPPEND_BUFFER_SIZE",
        default_value_t = BUFFER_SIZE,
        value_parser = parse_buffer_size
    )]
    pub buffer_size: usize,
}

fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|e| format!("invalid buffer size '{s}': {e}"))?;
    if size == 0 {
        return Err("buffer size must be at least 1 byte".to_string());
    }
    Ok(size)
}
