//! Dependency ordering and tag selection over deployment tasks.

use std::collections::{BTreeSet, HashMap};

use super::tasks::DeploymentTask;
use crate::errors::{EndaomentError, Result};

fn index_by_name(tasks: &[DeploymentTask]) -> Result<HashMap<&'static str, usize>> {
    let mut index = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.name, i).is_some() {
            return Err(EndaomentError::TaskGraph(format!("duplicate task {}", task.name)));
        }
    }
    Ok(index)
}

fn unknown_prerequisite(task: &str, dependency: &str) -> EndaomentError {
    EndaomentError::TaskGraph(format!("{task} depends on unknown task {dependency}"))
}

/// Kahn's algorithm. Among ready tasks the earliest declared runs first, so
/// an already ordered list comes back unchanged.
pub fn topological_order(tasks: &[DeploymentTask]) -> Result<Vec<&DeploymentTask>> {
    let index = index_by_name(tasks)?;
    let mut pending = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];

    for (i, task) in tasks.iter().enumerate() {
        for dependency in &task.dependencies {
            let &d = index
                .get(dependency)
                .ok_or_else(|| unknown_prerequisite(task.name, dependency))?;
            pending[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..tasks.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(i) = ready.pop_first() {
        order.push(&tasks[i]);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < tasks.len() {
        let stuck: Vec<&str> = tasks
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] > 0)
            .map(|(_, t)| t.name)
            .collect();
        return Err(EndaomentError::TaskGraph(format!(
            "dependency cycle among {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// The tagged tasks plus their transitive prerequisites, in declaration
/// order. No tags selects everything.
pub fn closure(tasks: &[DeploymentTask], tags: &[String]) -> Result<Vec<DeploymentTask>> {
    if tags.is_empty() {
        return Ok(tasks.to_vec());
    }
    let index = index_by_name(tasks)?;
    let mut selected = vec![false; tasks.len()];
    let mut stack = Vec::new();

    for tag in tags {
        let &i = index
            .get(tag.as_str())
            .ok_or_else(|| EndaomentError::TaskGraph(format!("unknown task tag {tag}")))?;
        stack.push(i);
    }

    while let Some(i) = stack.pop() {
        if std::mem::replace(&mut selected[i], true) {
            continue;
        }
        for dependency in &tasks[i].dependencies {
            let &d = index
                .get(dependency)
                .ok_or_else(|| unknown_prerequisite(tasks[i].name, dependency))?;
            stack.push(d);
        }
    }

    Ok(tasks
        .iter()
        .zip(selected)
        .filter(|(_, keep)| *keep)
        .map(|(task, _)| task.clone())
        .collect())
}
