//! Dependency planning for scenarios that reference cached output of others.
//!
//! A scenario lists the scenarios it needs in `scenario.toml` under `requires`.
//! Before a cache miss is evaluated, the planner walks those requirements
//! depth-first and returns every uncached scenario in the order it must run,
//! dependencies first. Cached scenarios are leaves: their own requirements
//! already ran when they were cached.

use std::collections::BTreeSet;

use crate::scenario::{ScenarioDir, ScenarioError};

/// Plans evaluation order over a scenario directory.
#[derive(Debug)]
pub struct Resolver<'a> {
    scenarios: &'a ScenarioDir,
}

impl<'a> Resolver<'a> {
    pub fn new(scenarios: &'a ScenarioDir) -> Self {
        Self { scenarios }
    }

    /// Uncached scenarios to evaluate for `name`, ending with `name` itself.
    ///
    /// `is_cached` reports names whose block is already available. Returns an
    /// empty plan when `name` is cached. A requirement cycle yields
    /// [`ScenarioError::DependencyCycle`] with the path that closes it.
    pub fn plan(
        &self,
        name: &str,
        is_cached: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, ScenarioError> {
        let mut walk = Walk {
            scenarios: self.scenarios,
            is_cached,
            in_progress: Vec::new(),
            done: BTreeSet::new(),
            order: Vec::new(),
        };
        walk.visit(name)?;
        Ok(walk.order)
    }
}

struct Walk<'a, 'f> {
    scenarios: &'a ScenarioDir,
    is_cached: &'f dyn Fn(&str) -> bool,
    in_progress: Vec<String>,
    done: BTreeSet<String>,
    order: Vec<String>,
}

impl Walk<'_, '_> {
    fn visit(&mut self, name: &str) -> Result<(), ScenarioError> {
        if self.done.contains(name) || (self.is_cached)(name) {
            return Ok(());
        }
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            let mut path = self.in_progress[start..].to_vec();
            path.push(name.to_string());
            return Err(ScenarioError::DependencyCycle { path });
        }

        let metadata = self.scenarios.metadata(name)?;
        self.in_progress.push(name.to_string());
        for dependency in &metadata.requires {
            self.visit(dependency)?;
        }
        self.in_progress.pop();

        self.done.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }
}
