//! The stage catalog.
//!
//! The registry holds every stage definition in declaration order, the
//! direct dependency edges between them, named groups, and the sky-flat
//! derivation sequence that owns the scratch tree.

mod stage;
mod standard;

pub use stage::{Granularity, StageDef, StageFlags};
pub use standard::{
    GROUP_ALL, GROUP_CALIB, GROUP_FULL, GROUP_SCIENCE, GROUP_SKYFLAT_SEQ, STAGE_BADPIX,
    STAGE_BIAS2D, STAGE_CATALOG, STAGE_FLAT2D, STAGE_FRINGE, STAGE_ILLUM, STAGE_OSCAN,
    STAGE_PROC1, STAGE_PROC2, STAGE_SKYFLAT, STAGE_SKYFLAT_FRINGE, STAGE_SKYFLAT_ILLUM,
    STAGE_WCS,
};

use crate::errors::{RegistryError, UnknownStageError};
use std::collections::{HashMap, HashSet};

/// A static catalog of named stages.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    /// Definitions in declaration order.
    stages: Vec<StageDef>,
    /// Name to declaration index.
    index: HashMap<String, usize>,
    /// Named groups, in declaration order.
    groups: Vec<(String, Vec<String>)>,
    /// Stages sharing the scratch tree, in order.
    derivation: Vec<String>,
}

impl StageRegistry {
    /// Builds a registry from definitions in declaration order.
    ///
    /// Cycles are not rejected here; the scheduler reports them.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names, undeclared predecessors, or a
    /// scratch-producing stage (there is no derivation sequence).
    pub fn from_defs(defs: Vec<StageDef>) -> Result<Self, RegistryError> {
        Self::from_parts(defs, Vec::new(), Vec::new())
    }

    /// Builds a registry with named groups and a derivation sequence whose
    /// stages may share scratch products.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names, undeclared stages, or a scratch
    /// product that escapes the derivation sequence.
    pub fn from_parts(
        defs: Vec<StageDef>,
        groups: Vec<(String, Vec<String>)>,
        derivation: Vec<String>,
    ) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(defs.len());
        for def in &defs {
            if !seen.insert(def.name.as_str()) {
                return Err(RegistryError::DuplicateStage(def.name.clone()));
            }
        }
        let registry = Self::assemble(defs, groups, derivation);
        registry.validate()?;
        Ok(registry)
    }

    fn assemble(
        defs: Vec<StageDef>,
        groups: Vec<(String, Vec<String>)>,
        derivation: Vec<String>,
    ) -> Self {
        let index = defs
            .iter()
            .enumerate()
            .map(|(i, def)| (def.name.clone(), i))
            .collect();
        Self {
            stages: defs,
            index,
            groups,
            derivation,
        }
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for def in &self.stages {
            for dep in def
                .predecessors
                .iter()
                .chain(&def.soft_predecessors)
                .chain(&def.inputs)
            {
                if !self.index.contains_key(dep) {
                    return Err(RegistryError::UndeclaredDependency {
                        stage: def.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        for (group, members) in &self.groups {
            for member in members {
                if !self.index.contains_key(member) {
                    return Err(RegistryError::UndeclaredGroupMember {
                        group: group.clone(),
                        stage: member.clone(),
                    });
                }
            }
        }
        for member in &self.derivation {
            if !self.index.contains_key(member) {
                return Err(RegistryError::UndeclaredGroupMember {
                    group: "derivation sequence".to_string(),
                    stage: member.clone(),
                });
            }
        }

        let derivation: HashSet<&str> = self.derivation.iter().map(String::as_str).collect();
        for def in &self.stages {
            if def.is_scratch() && !derivation.contains(def.name.as_str()) {
                return Err(RegistryError::ScratchLeak {
                    stage: def.name.clone(),
                    producer: def.name.clone(),
                });
            }
            for input in &def.inputs {
                let producer = &self.stages[self.index[input]];
                if producer.is_scratch() && !derivation.contains(def.name.as_str()) {
                    return Err(RegistryError::ScratchLeak {
                        stage: def.name.clone(),
                        producer: producer.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns all stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the registry has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageDef> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Looks up a stage by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` if the stage is not defined.
    pub fn stage(&self, name: &str) -> Result<&StageDef, UnknownStageError> {
        self.get(name).ok_or_else(|| UnknownStageError::new(name))
    }

    /// Returns the direct predecessors of a stage (not the transitive
    /// closure).
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` if the stage is not defined.
    pub fn dependencies(&self, name: &str) -> Result<&[String], UnknownStageError> {
        self.stage(name).map(|def| def.predecessors.as_slice())
    }

    /// Returns the declaration index of a stage.
    #[must_use]
    pub fn declaration_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the members of a named group.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, members)| members.as_slice())
    }

    /// Returns the group names.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Expands a stage or group name into stage names.
    ///
    /// Stage names win over group names.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` if the name is neither.
    pub fn expand(&self, name: &str) -> Result<Vec<String>, UnknownStageError> {
        if self.index.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        self.group(name)
            .map(<[String]>::to_vec)
            .ok_or_else(|| UnknownStageError::new(name))
    }

    /// Returns the derivation sequence.
    #[must_use]
    pub fn derivation_sequence(&self) -> &[String] {
        &self.derivation
    }

    /// Returns true if `name` is the final stage of the derivation sequence.
    #[must_use]
    pub fn completes_derivation(&self, name: &str) -> bool {
        self.derivation.last().is_some_and(|last| last == name)
    }
}
