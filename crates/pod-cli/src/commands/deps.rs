//! `pod deps`: print the solved dependency graph.

use pod_core::error::PodResult;

use super::CommandContext;

pub async fn execute(ctx: &CommandContext) -> PodResult<()> {
    let entrypoint = ctx.entrypoint()?;
    entrypoint.ensure_up_to_date().await?;

    let graph = entrypoint.load_package_graph().await?;
    let root_name = entrypoint.root().pubspec.name.clone();

    for member in graph.transitive_dependencies(&root_name)? {
        let deps = graph.direct_dependencies(&member.pubspec.name)?;
        let dep_names: Vec<&str> = deps.iter().map(|d| d.pubspec.name.as_str()).collect();
        if dep_names.is_empty() {
            ctx.output
                .line(&format!("{} {}", member.pubspec.name, member.id.version));
        } else {
            ctx.output.line(&format!(
                "{} {} -> {}",
                member.pubspec.name,
                member.id.version,
                dep_names.join(", ")
            ));
        }
    }
    Ok(())
}
