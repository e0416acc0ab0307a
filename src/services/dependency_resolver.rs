//! Task dependency graph queries: cycle detection, topological order,
//! ready-set computation, transitive dependents.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Task, TaskStatus};

/// Service for resolving task dependencies and detecting cycles.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                // Cycle found; trim the path down to the cycle itself
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Detect a circular dependency in a set of tasks. Returns the
    /// offending cycle path if one exists.
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph
                .entry(task.id)
                .or_default()
                .extend(task.dependencies.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut ids: Vec<Uuid> = graph.keys().copied().collect();
        ids.sort_unstable();
        for task_id in ids {
            if !visited.contains(&task_id)
                && detect_cycle_util(task_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Validate that the set is acyclic and every dependency resolves to
    /// a task in the set.
    pub fn validate(&self, tasks: &[Task]) -> CoreResult<()> {
        let known: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        for task in tasks {
            for dep_id in &task.dependencies {
                if !known.contains(dep_id) {
                    return Err(CoreError::InvalidDependency(format!(
                        "task {} depends on unknown task {}",
                        task.id, dep_id
                    )));
                }
            }
        }
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(CoreError::CyclicDependency(cycle));
        }
        Ok(())
    }

    /// Kahn's algorithm. Returns tasks in dependency order (dependencies
    /// before dependents).
    pub fn topological_order(&self, tasks: &[Task]) -> CoreResult<Vec<Task>> {
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(CoreError::CyclicDependency(cycle));
        }

        let mut task_map: HashMap<Uuid, Task> = tasks.iter().map(|t| (t.id, t.clone())).collect();
        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for task in tasks {
            in_degree.entry(task.id).or_insert(0);
            for &dep_id in &task.dependencies {
                graph.entry(dep_id).or_default().push(task.id);
                *in_degree.entry(task.id).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<Uuid> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted = Vec::new();

        while let Some(node_id) = queue.pop() {
            if let Some(task) = task_map.remove(&node_id) {
                sorted.push(task);
            }

            if let Some(neighbors) = graph.get(&node_id) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(&neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(neighbor);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            return Err(CoreError::Internal(
                "topological sort failed: cycle or dangling dependency".to_string(),
            ));
        }

        Ok(sorted)
    }

    /// Subset of tasks that are queued with every dependency completed,
    /// in descending priority then ascending creation order.
    pub fn ready(&self, tasks: &[Task]) -> Vec<Task> {
        let status_by_id: HashMap<Uuid, TaskStatus> =
            tasks.iter().map(|t| (t.id, t.status)).collect();

        let mut ready: Vec<Task> = tasks
            .iter()
            .filter(|task| {
                task.status == TaskStatus::Queued
                    && task.dependencies.iter().all(|dep| {
                        status_by_id.get(dep) == Some(&TaskStatus::Completed)
                    })
            })
            .cloned()
            .collect();

        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        ready
    }

    /// Transitive set of tasks blocked by `task_id` (everything that
    /// depends on it directly or through other tasks). Uses a memoized
    /// reverse-edge traversal.
    pub fn dependents(&self, task_id: Uuid, tasks: &[Task]) -> HashSet<Uuid> {
        let mut reverse: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            for &dep_id in &task.dependencies {
                reverse.entry(dep_id).or_default().push(task.id);
            }
        }

        let mut memo: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        dependents_util(task_id, &reverse, &mut memo)
    }

    /// Longest dependency chain below a task (0 = no dependencies).
    pub fn dependency_depth(&self, task: &Task, all_tasks: &[Task]) -> CoreResult<u32> {
        let task_map: HashMap<Uuid, &Task> = all_tasks.iter().map(|t| (t.id, t)).collect();
        let mut visited = HashSet::new();
        depth_util(task, &task_map, &mut visited)
    }
}

// Standalone helper for memoized dependents traversal
fn dependents_util(
    node: Uuid,
    reverse: &HashMap<Uuid, Vec<Uuid>>,
    memo: &mut HashMap<Uuid, HashSet<Uuid>>,
) -> HashSet<Uuid> {
    if let Some(cached) = memo.get(&node) {
        return cached.clone();
    }

    let mut result = HashSet::new();
    if let Some(children) = reverse.get(&node) {
        for &child in children {
            if result.insert(child) {
                result.extend(dependents_util(child, reverse, memo));
            }
        }
    }

    memo.insert(node, result.clone());
    result
}

// Standalone helper for depth calculation
fn depth_util(
    task: &Task,
    task_map: &HashMap<Uuid, &Task>,
    visited: &mut HashSet<Uuid>,
) -> CoreResult<u32> {
    if visited.contains(&task.id) {
        return Err(CoreError::CyclicDependency(vec![task.id]));
    }

    visited.insert(task.id);

    let mut max_depth = 0;
    for dep_id in &task.dependencies {
        if let Some(&dep_task) = task_map.get(dep_id) {
            let depth = depth_util(dep_task, task_map, visited)? + 1;
            max_depth = max_depth.max(depth);
        }
    }

    visited.remove(&task.id);
    Ok(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_deps(goal_id: Uuid, deps: &[Uuid]) -> Task {
        let mut task = Task::new(goal_id, "test task");
        task.dependencies = deps.to_vec();
        task
    }

    #[test]
    fn test_detect_cycle_none() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let a = task_with_deps(goal_id, &[]);
        let b = task_with_deps(goal_id, &[a.id]);
        assert!(resolver.detect_cycle(&[a, b]).is_none());
    }

    #[test]
    fn test_detect_cycle_two_nodes() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let mut a = task_with_deps(goal_id, &[]);
        let mut b = task_with_deps(goal_id, &[]);
        a.dependencies = vec![b.id];
        b.dependencies = vec![a.id];

        let cycle = resolver.detect_cycle(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&a.id));
        assert!(cycle.contains(&b.id));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let task = task_with_deps(goal_id, &[Uuid::new_v4()]);
        assert!(matches!(
            resolver.validate(&[task]),
            Err(CoreError::InvalidDependency(_))
        ));
    }

    #[test]
    fn test_topological_order_chain() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let a = task_with_deps(goal_id, &[]);
        let b = task_with_deps(goal_id, &[a.id]);
        let c = task_with_deps(goal_id, &[b.id]);

        let sorted = resolver
            .topological_order(&[c.clone(), a.clone(), b.clone()])
            .unwrap();
        assert_eq!(sorted[0].id, a.id);
        assert_eq!(sorted[1].id, b.id);
        assert_eq!(sorted[2].id, c.id);
    }

    #[test]
    fn test_topological_order_rejects_cycle() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let mut a = task_with_deps(goal_id, &[]);
        let mut b = task_with_deps(goal_id, &[]);
        a.dependencies = vec![b.id];
        b.dependencies = vec![a.id];
        assert!(matches!(
            resolver.topological_order(&[a, b]),
            Err(CoreError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_ready_requires_completed_dependencies() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let mut done = task_with_deps(goal_id, &[]);
        done.force_status(TaskStatus::Completed, "test setup");
        let mut pending = task_with_deps(goal_id, &[]);
        pending.force_status(TaskStatus::InProgress, "test setup");

        let ready_child = task_with_deps(goal_id, &[done.id]);
        let waiting_child = task_with_deps(goal_id, &[pending.id]);

        let ready = resolver.ready(&[
            done.clone(),
            pending.clone(),
            ready_child.clone(),
            waiting_child.clone(),
        ]);
        let ids: Vec<Uuid> = ready.iter().map(|t| t.id).collect();
        assert!(ids.contains(&ready_child.id));
        assert!(!ids.contains(&waiting_child.id));
        // Terminal and running tasks are never ready
        assert!(!ids.contains(&done.id));
        assert!(!ids.contains(&pending.id));
    }

    #[test]
    fn test_ready_ordering_stable() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let mut first = task_with_deps(goal_id, &[]);
        first.priority = 5;
        let mut second = task_with_deps(goal_id, &[]);
        second.priority = 5;
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let mut urgent = task_with_deps(goal_id, &[]);
        urgent.priority = 9;
        urgent.created_at = first.created_at + chrono::Duration::seconds(2);

        let ready = resolver.ready(&[second.clone(), urgent.clone(), first.clone()]);
        let ids: Vec<Uuid> = ready.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![urgent.id, first.id, second.id]);
    }

    #[test]
    fn test_dependents_transitive() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let root = task_with_deps(goal_id, &[]);
        let mid = task_with_deps(goal_id, &[root.id]);
        let leaf = task_with_deps(goal_id, &[mid.id]);
        let unrelated = task_with_deps(goal_id, &[]);

        let tasks = [root.clone(), mid.clone(), leaf.clone(), unrelated.clone()];
        let dependents = resolver.dependents(root.id, &tasks);
        assert!(dependents.contains(&mid.id));
        assert!(dependents.contains(&leaf.id));
        assert!(!dependents.contains(&unrelated.id));
        assert!(!dependents.contains(&root.id));
    }

    #[test]
    fn test_dependency_depth() {
        let resolver = DependencyResolver::new();
        let goal_id = Uuid::new_v4();
        let a = task_with_deps(goal_id, &[]);
        let b = task_with_deps(goal_id, &[a.id]);
        let c = task_with_deps(goal_id, &[b.id]);

        let all = [a.clone(), b.clone(), c.clone()];
        assert_eq!(resolver.dependency_depth(&a, &all).unwrap(), 0);
        assert_eq!(resolver.dependency_depth(&b, &all).unwrap(), 1);
        assert_eq!(resolver.dependency_depth(&c, &all).unwrap(), 2);
    }
}
