//! `pod get`: resolve and materialize the project's dependencies.

use pod_core::error::PodResult;

use super::CommandContext;

pub async fn execute(ctx: &CommandContext) -> PodResult<()> {
    let entrypoint = ctx.entrypoint()?;
    ctx.output.info(&format!(
        "Resolving dependencies of {}...",
        entrypoint.root().pubspec.name
    ));

    let report = entrypoint.acquire_dependencies(&[], false).await?;
    for line in report.lines() {
        ctx.output.line(&line);
    }
    if report.changed() == 0 {
        ctx.output.success("Got dependencies, nothing changed.");
    } else {
        ctx.output
            .success(&format!("Got dependencies, {} changed.", report.changed()));
    }
    Ok(())
}
