use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// CLI logging: silent unless `--verbose`, then debug and up on stderr.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    install(Level::DEBUG);
    Ok(())
}

/// Server logging is always on.
pub fn init_server(verbose: bool) -> Result<()> {
    install(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn install(level: Level) {
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
