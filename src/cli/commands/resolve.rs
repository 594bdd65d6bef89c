//! resolve command - Show which file each recipe entry resolves to

use anyhow::Result;

use super::{runtime, Session};
use crate::engine::Orchestrator;

/// Print `entry<TAB>recipe<TAB>path`, or the lookup failure, per entry.
pub fn resolve(session: Session) -> Result<()> {
    let rt = runtime()?;
    let resolutions = rt.block_on(Orchestrator::new(session.ctx).resolve(&session.sources));

    let lines: Vec<String> = resolutions
        .iter()
        .map(|r| match &r.result {
            Ok((name, path)) => format!("{}\t{}\t{}", r.source, name, path.display()),
            Err(e) => format!("{}\t-\t{}", r.source, e),
        })
        .collect();

    // Printed in quiet mode too; only log lines are suppressed
    for line in &lines {
        println!("{}", line);
    }

    let unresolved = resolutions.iter().filter(|r| r.result.is_err()).count();
    if unresolved > 0 {
        tracing::warn!(unresolved, "Some recipe entries do not resolve");
    }
    Ok(())
}
