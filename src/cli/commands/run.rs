//! run command - Process every recipe and publish the updates

use anyhow::Result;

use super::{runtime, Session};
use crate::engine::{cancel_on_shutdown, cancellation, Orchestrator};

/// Run the orchestrator over the session's recipes.
///
/// Returns `Ok` whatever the per-recipe outcomes; they are logged and
/// summarised instead.
pub fn run(session: Session) -> Result<()> {
    let Session { ctx, sources, .. } = session;

    if sources.is_empty() {
        tracing::info!("Recipe list is empty; nothing to do");
        return Ok(());
    }

    let rt = runtime()?;
    let summary = rt.block_on(async {
        let (handle, token) = cancellation();
        let watcher = cancel_on_shutdown(handle, ctx.settings.run_timeout);
        let summary = Orchestrator::new(ctx).run(&sources, token).await;
        watcher.abort();
        summary
    });

    summary.log();
    Ok(())
}
