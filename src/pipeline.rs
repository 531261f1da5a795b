//! Lifecycle hook points and their ordered stage lists
//!
//! The solver is assembled from named stages. Plugins reorder the
//! computation by inserting their own stages relative to existing ones by
//! name, or by removing stages they replace.

use crate::context::Context;
use crate::error::{Error, Result};

/// One named unit of work run against the context
pub trait Stage: Send {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &mut Context) -> Result<()>;
}

/// Lifecycle phase of a simulation
///
/// ```text
/// Construct → Build → Initialise → Execute → Destroy
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Configuration, materials and stage lists are still editable
    Construct,
    /// The rank's mesh is partitioned and the ghost exchanges negotiated
    Build,
    /// Initial conditions or a checkpoint are being loaded
    Initialise,
    /// Timesteps are running
    Execute,
    /// The destroy hooks are running
    Destroy,
}

/// Points in the lifecycle where stage lists run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Once per run, at the end of the Build phase
    Build,
    /// Once per run, before the first step: element fields
    ElementInitialCondition,
    /// Once per run, after the element conditions: node fields
    NodeInitialCondition,
    /// Per step, inside the stress update: rheology branches
    Constitutive,
    /// Per step: the timestep pipeline
    Solve,
    /// Once, when the simulation is torn down
    Destroy,
}

impl HookPoint {
    pub const ALL: [HookPoint; 6] = [
        HookPoint::Build,
        HookPoint::ElementInitialCondition,
        HookPoint::NodeInitialCondition,
        HookPoint::Constitutive,
        HookPoint::Solve,
        HookPoint::Destroy,
    ];

    fn index(self) -> usize {
        match self {
            HookPoint::Build => 0,
            HookPoint::ElementInitialCondition => 1,
            HookPoint::NodeInitialCondition => 2,
            HookPoint::Constitutive => 3,
            HookPoint::Solve => 4,
            HookPoint::Destroy => 5,
        }
    }

    /// Phase during which the hook point's list runs
    pub fn phase(self) -> Phase {
        match self {
            HookPoint::Build => Phase::Build,
            HookPoint::ElementInitialCondition | HookPoint::NodeInitialCondition => Phase::Initialise,
            HookPoint::Constitutive | HookPoint::Solve => Phase::Execute,
            HookPoint::Destroy => Phase::Destroy,
        }
    }
}

/// Ordered list of stages with unique names
#[derive(Default)]
pub struct StageList {
    stages: Vec<Box<dyn Stage>>,
}

impl StageList {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    fn check_unique(&self, stage: &dyn Stage) -> Result<()> {
        if self.position(stage.name()).is_some() {
            return Err(Error::config(format!("stage '{}' is already registered", stage.name())));
        }
        Ok(())
    }

    fn position_of(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| Error::config(format!("no stage named '{}' (have: {})", name, self.names().join(", "))))
    }

    pub fn append(&mut self, stage: Box<dyn Stage>) -> Result<()> {
        self.check_unique(stage.as_ref())?;
        self.stages.push(stage);
        Ok(())
    }

    pub fn prepend(&mut self, stage: Box<dyn Stage>) -> Result<()> {
        self.check_unique(stage.as_ref())?;
        self.stages.insert(0, stage);
        Ok(())
    }

    pub fn insert_before(&mut self, name: &str, stage: Box<dyn Stage>) -> Result<()> {
        self.check_unique(stage.as_ref())?;
        let at = self.position_of(name)?;
        self.stages.insert(at, stage);
        Ok(())
    }

    pub fn insert_after(&mut self, name: &str, stage: Box<dyn Stage>) -> Result<()> {
        self.check_unique(stage.as_ref())?;
        let at = self.position_of(name)?;
        self.stages.insert(at + 1, stage);
        Ok(())
    }

    /// Remove a stage by name, returning it.
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn Stage>> {
        let at = self.position_of(name)?;
        Ok(self.stages.remove(at))
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn run_all(&mut self, ctx: &mut Context) -> Result<()> {
        for stage in self.stages.iter_mut() {
            log::trace!("stage {}", stage.name());
            stage.run(ctx)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Stage lists for every hook point
#[derive(Debug, Default)]
pub struct Pipeline {
    lists: [StageList; 6],
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, point: HookPoint) -> &StageList {
        &self.lists[point.index()]
    }

    pub fn list_mut(&mut self, point: HookPoint) -> &mut StageList {
        &mut self.lists[point.index()]
    }
}

/// Run every stage registered at `point`.
///
/// The list is detached from the context while it runs, so stages may not
/// edit the list they belong to.
pub fn run_hook(ctx: &mut Context, point: HookPoint) -> Result<()> {
    let mut list = std::mem::take(ctx.pipeline.list_mut(point));
    let result = list.run_all(ctx);
    *ctx.pipeline.list_mut(point) = list;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&mut self, _ctx: &mut Context) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ordering_operations() {
        let mut list = StageList::new();
        list.append(Box::new(Named("force"))).unwrap();
        list.prepend(Box::new(Named("strain_rate"))).unwrap();
        list.insert_after("strain_rate", Box::new(Named("stress"))).unwrap();
        list.insert_before("force", Box::new(Named("sync"))).unwrap();
        assert_eq!(list.names(), vec!["strain_rate", "stress", "sync", "force"]);

        let removed = list.remove("sync").unwrap();
        assert_eq!(removed.name(), "sync");
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_unknown_anchor_and_duplicates_rejected() {
        let mut list = StageList::new();
        list.append(Box::new(Named("a"))).unwrap();
        assert!(list.append(Box::new(Named("a"))).is_err());
        assert!(list.insert_after("missing", Box::new(Named("b"))).is_err());
        assert!(list.remove("missing").is_err());
    }
}
