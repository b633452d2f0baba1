//! `pod upgrade`: re-resolve, ignoring the lock for some or all
//! packages.

use pod_core::error::PodResult;

use super::CommandContext;

pub async fn execute(packages: Vec<String>, ctx: &CommandContext) -> PodResult<()> {
    let entrypoint = ctx.entrypoint()?;
    let upgrade_all = packages.is_empty();
    if upgrade_all {
        ctx.output.info(&format!(
            "Upgrading all dependencies of {}...",
            entrypoint.root().pubspec.name
        ));
    } else {
        ctx.output
            .info(&format!("Upgrading {}...", packages.join(", ")));
    }

    let report = entrypoint.acquire_dependencies(&packages, upgrade_all).await?;
    for line in report.lines() {
        ctx.output.line(&line);
    }
    if report.changed() == 0 {
        ctx.output.success("Everything is already up to date.");
    } else {
        ctx.output
            .success(&format!("Upgraded, {} changed.", report.changed()));
    }
    Ok(())
}
