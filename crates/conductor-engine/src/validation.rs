use std::collections::{HashMap, HashSet};

use conductor_core::{ExecutionMode, WorkflowDefinition};

use crate::registry::AgentRegistry;

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// Checks every invariant from the component design's validation report:
/// name/steps non-empty, agent ids resolve, step ids unique, dependency ids
/// intra-workflow and acyclic (Dependency mode only), retry policy and
/// timeouts well-formed.
pub fn validate_workflow(def: &WorkflowDefinition, registry: &AgentRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    if def.name.trim().is_empty() {
        report.push("workflow name must not be empty");
    }
    if def.steps.is_empty() {
        report.push("workflow must have at least one step");
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in &def.steps {
        if step.agent_id.trim().is_empty() {
            report.push(format!("step '{}' has an empty agentId", step.id));
        } else if !registry.is_registered(&step.agent_id) {
            report.push(format!(
                "step '{}' references unregistered agent '{}'",
                step.id, step.agent_id
            ));
        }

        if !seen_ids.insert(step.id.as_str()) {
            report.push(format!("duplicate step id '{}'", step.id));
        }

        if let Some(timeout) = step.timeout {
            if timeout.is_zero() {
                report.push(format!("step '{}' has a non-positive timeout", step.id));
            }
        }
    }

    let step_ids: HashSet<&str> = def.steps.iter().map(|s| s.id.as_str()).collect();
    for step in &def.steps {
        for dep in &step.dependencies {
            if !step_ids.contains(dep.as_str()) {
                report.push(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ));
            }
        }
    }

    if def.execution_mode == ExecutionMode::Dependency {
        if let Some(cycle_step) = find_cycle(def) {
            report.push(format!(
                "dependency graph has a cycle involving step '{}'",
                cycle_step
            ));
        }
    }

    let policy = def.effective_retry_policy();
    if !policy.is_valid() {
        report.push("retry policy must have maxAttempts >= 1 and maxDelay >= delay");
    }

    report
}

/// Depth-first cycle detection over the dependency graph. Returns the id of
/// a step found to be part of a cycle, if any.
fn find_cycle(def: &WorkflowDefinition) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let by_id: HashMap<&str, &conductor_core::WorkflowStep> =
        def.steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a conductor_core::WorkflowStep>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Option<&'a str> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(id),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(step) = by_id.get(id) {
            for dep in &step.dependencies {
                if let Some(found) = visit(dep.as_str(), by_id, marks) {
                    return Some(found);
                }
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    for step in &def.steps {
        if let Some(found) = visit(step.id.as_str(), &by_id, &mut marks) {
            return Some(found.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::testing::FixedResponseAgent;
    use conductor_core::{ExecutionMode, WorkflowDefinition, WorkflowStep};
    use std::sync::Arc;

    fn registry_with(ids: &[&str]) -> AgentRegistry {
        let registry = AgentRegistry::new();
        for id in ids {
            registry
                .register_agent(Arc::new(FixedResponseAgent::new(*id, "-done")))
                .unwrap();
        }
        registry
    }

    #[test]
    fn empty_steps_is_invalid() {
        let registry = registry_with(&[]);
        let def = WorkflowDefinition::new("w1", "empty", ExecutionMode::Sequential, vec![]);
        let report = validate_workflow(&def, &registry);
        assert!(!report.is_valid());
    }

    #[test]
    fn unresolved_agent_is_invalid() {
        let registry = registry_with(&[]);
        let def = WorkflowDefinition::new(
            "w1",
            "missing agent",
            ExecutionMode::Sequential,
            vec![WorkflowStep::new("s1", "step one", "nope", "x")],
        );
        let report = validate_workflow(&def, &registry);
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("nope")));
    }

    #[test]
    fn acyclic_dependency_graph_is_valid() {
        let registry = registry_with(&["a1"]);
        let steps = vec![
            WorkflowStep::new("a", "a", "a1", "x"),
            WorkflowStep::new("b", "b", "a1", "x").with_dependencies(["a".to_string()]),
        ];
        let def = WorkflowDefinition::new("w1", "dep", ExecutionMode::Dependency, steps);
        let report = validate_workflow(&def, &registry);
        assert!(report.is_valid());
    }

    #[test]
    fn cyclic_dependency_graph_is_invalid() {
        let registry = registry_with(&["a1"]);
        let steps = vec![
            WorkflowStep::new("a", "a", "a1", "x").with_dependencies(["b".to_string()]),
            WorkflowStep::new("b", "b", "a1", "x").with_dependencies(["a".to_string()]),
        ];
        let def = WorkflowDefinition::new("w1", "cycle", ExecutionMode::Dependency, steps);
        let report = validate_workflow(&def, &registry);
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("cycle")));
    }
}
