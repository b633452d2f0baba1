//! The backtracking version solver.
//!
//! Search state is a stack of frames, one per decided package. Each
//! undecided package has a dependency cell collecting the constraints
//! contributed by the packages that require it, keyed by depender so a
//! contribution can be withdrawn exactly when its depender's decision
//! is undone. Conflicts first advance the deepest decision; when a
//! cell's candidates run out, the search unwinds to the deepest
//! decision implicated in the failure and everything above it is
//! discarded.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use pod_core::error::{PodError, PodResult};
use pod_core::lockfile::LockFile;
use pod_core::manifest::Dependency;
use pod_core::package::{Package, PackageId, PackageRef};
use pod_core::version::{Version, VersionConstraint};
use pod_source::PackageProvider;
use tracing::{debug, trace};

/// A satisfying assignment plus how hard it was to find
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// The chosen id for every non-root package, ordered by name
    pub packages: Vec<PackageId>,
    /// Number of assignments attempted, counting backtracks
    pub attempted: u64,
}

/// Solve the root package's dependency graph.
///
/// The previous lockfile steers candidate order: a locked version that
/// still satisfies its cell is tried first unless its package is listed
/// in `use_latest` or `upgrade_all` is set.
pub async fn solve<P: PackageProvider>(
    provider: &P,
    root: &Package,
    lockfile: &LockFile,
    use_latest: &[String],
    upgrade_all: bool,
    sdk_version: &Version,
) -> PodResult<SolveResult> {
    Solver {
        provider,
        root,
        lockfile,
        use_latest: use_latest.iter().cloned().collect(),
        upgrade_all,
        sdk: sdk_version,
        cells: BTreeMap::new(),
        frames: Vec::new(),
        selected: HashMap::new(),
        conflict_stamp: HashMap::new(),
        clock: 0,
        attempted: 1,
        last_conflict: None,
    }
    .run()
    .await
}

/// One constraint contribution to a cell
struct Constrainer {
    constraint: VersionConstraint,
    depender_version: Option<Version>,
}

/// The per-package search state for an undecided (or decided) package
struct Cell {
    target: PackageRef,
    /// Incoming constraints keyed by depender name
    constrainers: BTreeMap<String, Constrainer>,
}

/// One decision in progress: a package and its ordered candidates
struct Frame {
    name: String,
    candidates: Vec<Version>,
    index: usize,
    /// Dependency names this frame's chosen candidate constrained
    applied: Vec<String>,
    /// Packages implicated in this frame's failed candidates
    causes: BTreeSet<String>,
}

/// Details of the most recent genuine conflict, kept for error
/// reporting when the whole search fails
struct ConflictRecord {
    package: String,
    constraint: VersionConstraint,
    chain: Vec<String>,
}

struct Solver<'a, P> {
    provider: &'a P,
    root: &'a Package,
    lockfile: &'a LockFile,
    use_latest: HashSet<String>,
    upgrade_all: bool,
    sdk: &'a Version,
    cells: BTreeMap<String, Cell>,
    frames: Vec<Frame>,
    /// name -> index of the frame that decided it
    selected: HashMap<String, usize>,
    conflict_stamp: HashMap<String, u64>,
    clock: u64,
    attempted: u64,
    last_conflict: Option<ConflictRecord>,
}

impl<P: PackageProvider> Solver<'_, P> {
    async fn run(mut self) -> PodResult<SolveResult> {
        self.check_root_sdk()?;
        self.add_root_dependencies()?;

        loop {
            let Some((name, candidates)) = self.next_cell().await? else {
                break;
            };
            trace!(package = %name, candidates = candidates.len(), "deciding");
            self.frames.push(Frame {
                name,
                candidates,
                index: 0,
                applied: Vec::new(),
                causes: BTreeSet::new(),
            });
            loop {
                if self.try_assign().await? {
                    break;
                }
                let failed = self
                    .frames
                    .last()
                    .map(|f| f.name.clone())
                    .ok_or_else(|| PodError::internal("no frame to unwind"))?;
                if !self.backjump(&failed) {
                    return Err(self.failure(&failed));
                }
            }
        }

        let mut packages: BTreeMap<String, PackageId> = BTreeMap::new();
        for (name, &index) in &self.selected {
            let cell = &self.cells[name];
            let version = self.frames[index].candidates[self.frames[index].index].clone();
            packages.insert(name.clone(), cell.target.at_version(version));
        }
        debug!(
            packages = packages.len(),
            attempted = self.attempted,
            "solve succeeded"
        );
        Ok(SolveResult {
            packages: packages.into_values().collect(),
            attempted: self.attempted,
        })
    }

    fn check_root_sdk(&self) -> PodResult<()> {
        if let Some(constraint) = &self.root.pubspec.sdk_constraint {
            if !constraint.allows(self.sdk) {
                return Err(PodError::SdkMismatch {
                    package: self.root.pubspec.name.clone(),
                    version: self.root.pubspec.pseudo_version().to_string(),
                    constraint: constraint.to_string(),
                    active: self.sdk.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Seed cells from the root's dependencies and dev dependencies.
    /// Transitive dev dependencies are never consulted.
    fn add_root_dependencies(&mut self) -> PodResult<()> {
        let root_name = self.root.pubspec.name.clone();
        let root_version = self.root.pubspec.version.clone();
        let deps: Vec<Dependency> = self
            .root
            .pubspec
            .dependencies
            .iter()
            .chain(self.root.pubspec.dev_dependencies.iter())
            .cloned()
            .collect();
        for dep in deps {
            if let Some(cell) = self.cells.get(dep.name()) {
                if cell.target.description != dep.target.description {
                    return Err(self.source_mismatch(&dep, &root_name));
                }
            }
            self.cells
                .entry(dep.name().to_string())
                .or_insert_with(|| Cell {
                    target: dep.target.clone(),
                    constrainers: BTreeMap::new(),
                })
                .constrainers
                .insert(
                    root_name.clone(),
                    Constrainer {
                        constraint: dep.constraint.clone(),
                        depender_version: root_version.clone(),
                    },
                );
        }
        Ok(())
    }

    /// The intersection of every constraint on a cell
    fn cell_constraint(&self, name: &str) -> VersionConstraint {
        self.cells[name]
            .constrainers
            .values()
            .fold(VersionConstraint::Any, |acc, c| {
                acc.intersect(&c.constraint)
            })
    }

    /// Pick the next undecided cell: empty candidate sets first to fail
    /// fast, then forced singletons, then the most recent conflict
    /// participant with the fewest candidates. Name order breaks ties
    /// so the search is deterministic.
    async fn next_cell(&mut self) -> PodResult<Option<(String, Vec<Version>)>> {
        let undecided: Vec<String> = self
            .cells
            .keys()
            .filter(|name| !self.selected.contains_key(*name))
            .cloned()
            .collect();

        let mut singleton: Option<(String, Vec<Version>)> = None;
        let mut best: Option<(u64, usize, String, Vec<Version>)> = None;
        for name in undecided {
            let candidates = self.allowed_candidates(&name).await?;
            if candidates.is_empty() {
                return Ok(Some((name, candidates)));
            }
            if candidates.len() == 1 {
                if singleton.is_none() {
                    singleton = Some((name, candidates));
                }
                continue;
            }
            let stamp = self.conflict_stamp.get(&name).copied().unwrap_or(0);
            let better = match &best {
                None => true,
                Some((best_stamp, best_count, _, _)) => {
                    stamp > *best_stamp || (stamp == *best_stamp && candidates.len() < *best_count)
                }
            };
            if better {
                best = Some((stamp, candidates.len(), name, candidates));
            }
        }
        if let Some(pick) = singleton {
            return Ok(Some(pick));
        }
        Ok(best.map(|(_, _, name, candidates)| (name, candidates)))
    }

    /// Candidate versions for a cell: everything the current constraint
    /// allows, newest first, with the still-valid locked version (if
    /// any, and not upgraded past) promoted to the front.
    async fn allowed_candidates(&self, name: &str) -> PodResult<Vec<Version>> {
        let cell = &self.cells[name];
        let constraint = self.cell_constraint(name);
        let mut candidates: Vec<Version> = self
            .provider
            .versions(&cell.target)
            .await?
            .into_iter()
            .filter(|v| constraint.allows(v))
            .collect();
        candidates.sort_by(|a, b| b.cmp(a));
        candidates.dedup();

        if !self.upgrade_all && !self.use_latest.contains(name) {
            if let Some(locked) = self.lockfile.get(name) {
                if locked.description == cell.target.description {
                    if let Some(position) =
                        candidates.iter().position(|v| *v == locked.version)
                    {
                        let locked_version = candidates.remove(position);
                        candidates.insert(0, locked_version);
                    }
                }
            }
        }
        Ok(candidates)
    }

    /// Try candidates of the top frame until one fits or they run out
    async fn try_assign(&mut self) -> PodResult<bool> {
        loop {
            let (name, candidate) = {
                let frame = self
                    .frames
                    .last()
                    .ok_or_else(|| PodError::internal("no frame to assign"))?;
                match frame.candidates.get(frame.index) {
                    Some(version) => (frame.name.clone(), version.clone()),
                    None => return Ok(false),
                }
            };

            // Constraints may have tightened since the candidate list
            // was computed.
            if !self.cell_constraint(&name).allows(&candidate) {
                self.advance();
                continue;
            }

            let id = self.cells[&name].target.at_version(candidate.clone());
            let pubspec = self.provider.describe(&id).await?;

            if let Some(sdk_constraint) = &pubspec.sdk_constraint {
                if !sdk_constraint.allows(self.sdk) {
                    debug!(package = %id, constraint = %sdk_constraint, "candidate needs a different SDK");
                    self.stamp(&name);
                    self.advance();
                    continue;
                }
            }

            match self.apply_dependencies(&name, &candidate, &pubspec.dependencies) {
                Ok(applied) => {
                    let index = self.frames.len() - 1;
                    self.frames[index].applied = applied;
                    self.selected.insert(name.clone(), index);
                    trace!(package = %id, "assigned");
                    return Ok(true);
                }
                Err(causes) => {
                    let index = self.frames.len() - 1;
                    self.frames[index].causes.extend(causes);
                    self.attempted += 1;
                    self.advance();
                }
            }
        }
    }

    /// Propagate a candidate's dependencies into the cells. On success
    /// returns the constrained names; on conflict everything is rolled
    /// back and the implicated package names are returned.
    fn apply_dependencies(
        &mut self,
        depender: &str,
        depender_version: &Version,
        deps: &[Dependency],
    ) -> Result<Vec<String>, Vec<String>> {
        let mut applied: Vec<String> = Vec::new();
        let mut conflict: Option<Vec<String>> = None;

        for dep in deps {
            let dep_name = dep.name().to_string();

            if self.cells.contains_key(&dep_name) {
                let dependers: Vec<String> =
                    self.cells[&dep_name].constrainers.keys().cloned().collect();
                if self.cells[&dep_name].target.description != dep.target.description {
                    debug!(package = %dep_name, depender, "source mismatch");
                    let mut causes = dependers;
                    causes.push(dep_name.clone());
                    conflict = Some(causes);
                    break;
                }
                let narrowed = self.cell_constraint(&dep_name).intersect(&dep.constraint);
                if narrowed.is_empty() {
                    debug!(package = %dep_name, depender, "constraints are disjoint");
                    self.record_conflict(&dep_name, Some((depender, depender_version, dep)));
                    conflict = Some(dependers);
                    break;
                }
                if let Some(&decided) = self.selected.get(&dep_name) {
                    let chosen =
                        self.frames[decided].candidates[self.frames[decided].index].clone();
                    if !narrowed.allows(&chosen) {
                        debug!(package = %dep_name, depender, chosen = %chosen, "conflicts with a decided version");
                        self.record_conflict(&dep_name, Some((depender, depender_version, dep)));
                        let mut causes = dependers;
                        causes.push(dep_name.clone());
                        conflict = Some(causes);
                        break;
                    }
                }
            }

            self.cells
                .entry(dep_name.clone())
                .or_insert_with(|| Cell {
                    target: dep.target.clone(),
                    constrainers: BTreeMap::new(),
                })
                .constrainers
                .insert(
                    depender.to_string(),
                    Constrainer {
                        constraint: dep.constraint.clone(),
                        depender_version: Some(depender_version.clone()),
                    },
                );
            applied.push(dep_name);
        }

        match conflict {
            None => Ok(applied),
            Some(causes) => {
                for dep_name in &applied {
                    self.withdraw(depender, dep_name);
                }
                self.stamp(depender);
                for cause in &causes {
                    self.stamp(cause);
                }
                Err(causes)
            }
        }
    }

    /// Remove one depender's contribution to a cell, dropping the cell
    /// when nothing requires it anymore
    fn withdraw(&mut self, depender: &str, dep_name: &str) {
        if let Some(cell) = self.cells.get_mut(dep_name) {
            cell.constrainers.remove(depender);
            if cell.constrainers.is_empty() {
                self.cells.remove(dep_name);
            }
        }
    }

    fn advance(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.index += 1;
        }
    }

    fn stamp(&mut self, name: &str) {
        self.clock += 1;
        self.conflict_stamp.insert(name.to_string(), self.clock);
    }

    /// Unwind to the deepest decision whose removal could resolve the
    /// failure of `failed`. Returns false when no such decision exists.
    fn backjump(&mut self, failed: &str) -> bool {
        let (no_candidates, causes) = {
            let frame = self.frames.last().expect("backjump requires a frame");
            (frame.candidates.is_empty(), frame.causes.clone())
        };

        // A cell shut out by the bare constraint set (rather than by
        // every candidate failing downstream) is worth reporting.
        if no_candidates || self.cells[failed].constrainers.len() >= 2 {
            self.record_conflict(failed, None);
        }

        let mut implicated: BTreeSet<String> = causes;
        implicated.extend(self.cells[failed].constrainers.keys().cloned());

        let target = implicated
            .iter()
            .filter_map(|name| self.selected.get(name).copied())
            .max();
        let Some(target) = target else {
            return false;
        };

        // Discard every decision above the target.
        while self.frames.len() > target + 1 {
            let popped = self
                .frames
                .pop()
                .expect("frame stack shrank unexpectedly");
            if self.selected.remove(&popped.name).is_some() {
                for dep_name in &popped.applied {
                    self.withdraw(&popped.name, dep_name);
                }
            }
        }

        // Undo the target's own choice and move past it.
        let name = self.frames[target].name.clone();
        let applied = std::mem::take(&mut self.frames[target].applied);
        for dep_name in &applied {
            self.withdraw(&name, dep_name);
        }
        self.selected.remove(&name);
        self.frames[target].index += 1;
        self.attempted += 1;
        debug!(unwound_to = %name, attempted = self.attempted, "backtracking");
        true
    }

    /// Remember the chain of requirements behind a conflict on `name`,
    /// optionally including the dependency edge that just fired
    fn record_conflict(
        &mut self,
        name: &str,
        incoming: Option<(&str, &Version, &Dependency)>,
    ) {
        let cell = &self.cells[name];
        let mut constraint = self.cell_constraint(name);
        let mut chain: Vec<String> = cell
            .constrainers
            .iter()
            .map(|(depender, c)| describe_edge(depender, c.depender_version.as_ref(), name, &c.constraint))
            .collect();
        if let Some((depender, version, dep)) = incoming {
            constraint = constraint.intersect(&dep.constraint);
            chain.push(describe_edge(
                depender,
                Some(version),
                name,
                &dep.constraint,
            ));
        }
        self.last_conflict = Some(ConflictRecord {
            package: name.to_string(),
            constraint,
            chain,
        });
    }

    /// The error for an unsolvable graph: the most recent genuine
    /// conflict when one was recorded, otherwise the exhausted cell.
    fn failure(&mut self, failed: &str) -> PodError {
        if let Some(record) = self.last_conflict.take() {
            return PodError::NoVersionAvailable {
                package: record.package,
                constraint: record.constraint.to_string(),
                chain: record.chain,
            };
        }
        let cell = &self.cells[failed];
        let chain = cell
            .constrainers
            .iter()
            .map(|(depender, c)| {
                describe_edge(depender, c.depender_version.as_ref(), failed, &c.constraint)
            })
            .collect();
        PodError::NoVersionAvailable {
            package: failed.to_string(),
            constraint: self.cell_constraint(failed).to_string(),
            chain,
        }
    }

    fn source_mismatch(&self, dep: &Dependency, depender: &str) -> PodError {
        let cell = &self.cells[dep.name()];
        let existing_depender = cell
            .constrainers
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| self.root.pubspec.name.clone());
        PodError::SourceMismatch {
            package: dep.name().to_string(),
            existing: cell.target.source_name().to_string(),
            existing_depender,
            conflicting: dep.target.source_name().to_string(),
            conflicting_depender: depender.to_string(),
        }
    }
}

fn describe_edge(
    depender: &str,
    depender_version: Option<&Version>,
    name: &str,
    constraint: &VersionConstraint,
) -> String {
    match depender_version {
        Some(version) => format!("{depender} {version} depends on {name} {constraint}"),
        None => format!("{depender} depends on {name} {constraint}"),
    }
}

#[cfg(test)]
mod tests;
