use anyhow::Result;

fn main() -> Result<()> {
    // One event loop thread: command execution, store mutation and log
    // writes all run here, so no locking is needed around the store.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, kestrel_server::run())
}
