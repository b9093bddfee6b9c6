use crate::app::{AppContext, HarvestOptions, Result};
use crate::config::format_duration;
use crate::stream::run_stream;

pub async fn harvest(ctx: &AppContext, options: HarvestOptions) -> Result<()> {
    let harvester = ctx.harvester(options)?;
    println!("Harvesting {} seeds...", harvester.queue_len());

    let stats = harvester.run().await?;
    println!("Harvest complete: {}", stats);
    Ok(())
}

pub async fn stream(ctx: &AppContext, name: &str) -> Result<()> {
    let (mut session, client) = ctx.stream_session(name)?;
    println!(
        "Capturing stream {} into a new file every {} (Ctrl-C to stop)...",
        name,
        format_duration(session.config().rotate_every)
    );

    let stats = run_stream(&mut session, &client).await?;
    println!("Stream closed: {}", stats);
    Ok(())
}

pub fn show_state(ctx: &AppContext) -> Result<()> {
    let store = ctx.state_store(true, false)?;
    let snapshot = store.snapshot();

    if snapshot.is_empty() {
        println!("No stored state");
        return Ok(());
    }

    let mut current = None;
    for (namespace, key, value) in snapshot.entries() {
        if current != Some(namespace) {
            println!("[{}]", namespace);
            current = Some(namespace);
        }
        println!("  {} = {}", key, value);
    }
    Ok(())
}
