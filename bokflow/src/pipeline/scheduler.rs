//! Turns requested stage names into an execution plan.

use super::ExecutionPlan;
use crate::errors::{BokflowError, CycleError};
use crate::registry::StageRegistry;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};
use tracing::{debug, warn};

/// Computes execution plans against a registry.
///
/// Planning is pure: the same request against the same registry always
/// yields the same plan.
#[derive(Debug, Clone, Copy)]
pub struct StageScheduler<'a> {
    registry: &'a StageRegistry,
}

impl<'a> StageScheduler<'a> {
    /// Creates a scheduler for a registry.
    #[must_use]
    pub fn new(registry: &'a StageRegistry) -> Self {
        Self { registry }
    }

    /// Plans the requested stages and everything they depend on.
    ///
    /// Group names are expanded and duplicates collapse. Among stages that
    /// are ready at the same time, the one declared first runs first.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` for an unknown name and `CycleError` if
    /// the needed stages cannot be ordered.
    pub fn plan<S: AsRef<str>>(&self, requested: &[S]) -> Result<ExecutionPlan, BokflowError> {
        let closure = self.closure(requested)?;
        let order = self.topological_order(&closure)?;
        let warnings = self.soft_warnings(&closure);

        debug!(requested = requested.len(), planned = order.len(), "Planned stages");
        let stages = order
            .into_iter()
            .map(|i| self.registry.stages()[i].name.clone())
            .collect::<Vec<_>>();
        Ok(ExecutionPlan::from_stages(stages).with_warnings(warnings))
    }

    /// Declaration indices of the requested stages and all of their direct
    /// predecessors, transitively.
    fn closure<S: AsRef<str>>(&self, requested: &[S]) -> Result<BTreeSet<usize>, BokflowError> {
        let mut closure = BTreeSet::new();
        let mut pending = Vec::new();
        for name in requested {
            pending.extend(self.registry.expand(name.as_ref())?);
        }

        while let Some(name) = pending.pop() {
            let def = self.registry.stage(&name)?;
            let Some(index) = self.registry.declaration_index(&def.name) else {
                continue;
            };
            if closure.insert(index) {
                pending.extend(def.predecessors.iter().cloned());
            }
        }
        Ok(closure)
    }

    /// Predecessors of a stage restricted to the closure. Soft predecessors
    /// only count when they are planned anyway.
    fn edges(&self, index: usize, closure: &BTreeSet<usize>) -> Vec<usize> {
        let def = &self.registry.stages()[index];
        def.predecessors
            .iter()
            .chain(&def.soft_predecessors)
            .filter_map(|name| self.registry.declaration_index(name))
            .filter(|i| closure.contains(i))
            .collect()
    }

    /// Kahn's algorithm, picking the lowest declaration index among ready
    /// stages.
    fn topological_order(&self, closure: &BTreeSet<usize>) -> Result<Vec<usize>, CycleError> {
        let n = self.registry.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for &index in closure {
            for pred in self.edges(index, closure) {
                in_degree[index] += 1;
                dependents[pred].push(index);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = closure
            .iter()
            .copied()
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(closure.len());

        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < closure.len() {
            let placed: HashSet<usize> = order.iter().copied().collect();
            let remaining: BTreeSet<usize> = closure
                .iter()
                .copied()
                .filter(|i| !placed.contains(i))
                .collect();
            return Err(self.find_cycle(&remaining));
        }
        Ok(order)
    }

    /// Finds one cycle among stages Kahn's algorithm could not place.
    fn find_cycle(&self, remaining: &BTreeSet<usize>) -> CycleError {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();

        for &start in remaining {
            if let Some(cycle) =
                self.dfs_cycle(start, remaining, &mut visited, &mut on_path, &mut path)
            {
                return CycleError::new(cycle);
            }
        }
        // Every unplaced stage sits on or behind a cycle, so the search
        // above always finds one.
        CycleError::new(
            remaining
                .iter()
                .map(|&i| self.registry.stages()[i].name.clone())
                .collect(),
        )
    }

    fn dfs_cycle(
        &self,
        node: usize,
        remaining: &BTreeSet<usize>,
        visited: &mut HashSet<usize>,
        on_path: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        if on_path.contains(&node) {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&i| self.registry.stages()[i].name.clone())
                .collect();
            cycle.push(self.registry.stages()[node].name.clone());
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }

        on_path.insert(node);
        path.push(node);
        for pred in self.edges(node, remaining) {
            if let Some(cycle) = self.dfs_cycle(pred, remaining, visited, on_path, path) {
                return Some(cycle);
            }
        }
        path.pop();
        on_path.remove(&node);
        None
    }

    /// Notes stages planned without one of their soft predecessors.
    fn soft_warnings(&self, closure: &BTreeSet<usize>) -> Vec<String> {
        let mut warnings = Vec::new();
        for &index in closure {
            let def = &self.registry.stages()[index];
            for soft in &def.soft_predecessors {
                let planned = self
                    .registry
                    .declaration_index(soft)
                    .is_some_and(|i| closure.contains(&i));
                if !planned {
                    warn!(
                        stage = %def.name,
                        missing = %soft,
                        "Stage planned without '{soft}'; existing '{soft}' products will be used if present"
                    );
                    warnings.push(format!(
                        "'{}' is planned without '{soft}'; existing '{soft}' products will be used if present",
                        def.name
                    ));
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        StageDef, GROUP_ALL, GROUP_SCIENCE, STAGE_BADPIX, STAGE_BIAS2D, STAGE_CATALOG,
        STAGE_FLAT2D, STAGE_FRINGE, STAGE_ILLUM, STAGE_OSCAN, STAGE_PROC1, STAGE_PROC2,
        STAGE_SKYFLAT, STAGE_SKYFLAT_FRINGE, STAGE_SKYFLAT_ILLUM, STAGE_WCS,
    };
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_respects_dependencies(registry: &StageRegistry, plan: &ExecutionPlan) {
        for (i, stage) in plan.stages().iter().enumerate() {
            for pred in registry.dependencies(stage).unwrap() {
                let at = plan.position(pred).expect("predecessor planned");
                assert!(at < i, "{pred} must precede {stage}");
            }
        }
    }

    #[test]
    fn test_full_pipeline_order() {
        let registry = StageRegistry::standard();
        let plan = StageScheduler::new(&registry).plan(&[GROUP_ALL]).unwrap();

        assert_eq!(
            plan.stages(),
            &[
                STAGE_BADPIX,
                STAGE_OSCAN,
                STAGE_BIAS2D,
                STAGE_FLAT2D,
                STAGE_PROC1,
                STAGE_ILLUM,
                STAGE_SKYFLAT_ILLUM,
                STAGE_FRINGE,
                STAGE_SKYFLAT_FRINGE,
                STAGE_SKYFLAT,
                STAGE_PROC2,
                STAGE_WCS,
                STAGE_CATALOG,
            ]
        );
        assert!(plan.warnings().is_empty());
        plan.validate(&registry).unwrap();
    }

    #[test]
    fn test_sky_flat_derivation_order() {
        let registry = StageRegistry::standard();
        let plan = StageScheduler::new(&registry).plan(&[STAGE_SKYFLAT]).unwrap();
        let pos = |s: &str| plan.position(s).unwrap();

        assert!(pos(STAGE_PROC1) < pos(STAGE_ILLUM));
        assert!(pos(STAGE_ILLUM) < pos(STAGE_SKYFLAT_ILLUM));
        assert!(pos(STAGE_SKYFLAT_ILLUM) < pos(STAGE_FRINGE));
        assert!(pos(STAGE_FRINGE) < pos(STAGE_SKYFLAT_FRINGE));
        assert!(pos(STAGE_SKYFLAT_FRINGE) < pos(STAGE_SKYFLAT));
        assert!(!plan.contains(STAGE_PROC2));
    }

    #[test]
    fn test_closure_pulls_in_predecessors() {
        let registry = StageRegistry::standard();
        let plan = StageScheduler::new(&registry).plan(&[STAGE_PROC2]).unwrap();
        assert_eq!(plan.len(), 10);
        assert!(!plan.contains(STAGE_BADPIX));
        assert_respects_dependencies(&registry, &plan);
    }

    #[test]
    fn test_missing_bad_pixel_mask_is_a_warning() {
        let registry = StageRegistry::standard();
        let plan = StageScheduler::new(&registry).plan(&[STAGE_PROC1]).unwrap();
        assert_eq!(plan.stages(), &[STAGE_OSCAN, STAGE_BIAS2D, STAGE_FLAT2D, STAGE_PROC1]);
        assert_eq!(plan.warnings().len(), 1);
        assert!(plan.warnings()[0].contains(STAGE_BADPIX));

        let plan = StageScheduler::new(&registry)
            .plan(&[STAGE_PROC1, STAGE_BADPIX])
            .unwrap();
        assert!(plan.warnings().is_empty());
        assert!(plan.position(STAGE_BADPIX) < plan.position(STAGE_PROC1));
    }

    #[test]
    fn test_duplicates_collapse() {
        let registry = StageRegistry::standard();
        let plan = StageScheduler::new(&registry)
            .plan(&[GROUP_SCIENCE, STAGE_WCS, STAGE_PROC2, GROUP_SCIENCE])
            .unwrap();
        let unique: HashSet<&String> = plan.stages().iter().collect();
        assert_eq!(unique.len(), plan.len());
    }

    #[test]
    fn test_unknown_name_rejected() {
        let registry = StageRegistry::standard();
        let err = StageScheduler::new(&registry)
            .plan(&["proc3"])
            .unwrap_err();
        assert!(matches!(err, BokflowError::UnknownStage(e) if e.name == "proc3"));
    }

    #[test]
    fn test_random_subsets_are_topologically_sorted() {
        let registry = StageRegistry::standard();
        let scheduler = StageScheduler::new(&registry);
        let names: Vec<&str> = registry.stages().iter().map(|s| s.name.as_str()).collect();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let subset: Vec<&str> = names.iter().copied().filter(|_| rng.gen_bool(0.3)).collect();
            let plan = scheduler.plan(&subset).unwrap();

            for requested in &subset {
                assert!(plan.contains(requested));
            }
            assert_respects_dependencies(&registry, &plan);
            plan.validate(&registry).unwrap();

            let mut reversed = subset.clone();
            reversed.reverse();
            assert_eq!(scheduler.plan(&reversed).unwrap(), plan);
        }
    }

    #[test]
    fn test_cycle_reported_with_path() {
        let registry = StageRegistry::from_defs(vec![
            StageDef::new("a", "x"),
            StageDef::new("b", "y").after(["a", "d"]),
            StageDef::new("c", "z").after(["b"]),
            StageDef::new("d", "w").after(["c"]),
            StageDef::new("e", "v").after(["d"]),
        ])
        .unwrap();

        let err = StageScheduler::new(&registry).plan(&["e"]).unwrap_err();
        let cycle = match err {
            BokflowError::Cycle(cycle) => cycle,
            other => panic!("expected a cycle error, got {other}"),
        };
        assert_eq!(cycle.cycle_path.first(), cycle.cycle_path.last());
        let members: HashSet<&str> = cycle.cycle_path.iter().map(String::as_str).collect();
        assert_eq!(members, HashSet::from(["b", "c", "d"]));
    }

    #[test]
    fn test_acyclic_part_of_cyclic_registry_still_plans() {
        let registry = StageRegistry::from_defs(vec![
            StageDef::new("a", "x"),
            StageDef::new("b", "y").after(["c"]),
            StageDef::new("c", "z").after(["b"]),
        ])
        .unwrap();
        let plan = StageScheduler::new(&registry).plan(&["a"]).unwrap();
        assert_eq!(plan.stages(), &["a"]);
    }
}
