use std::collections::{BTreeMap, BTreeSet};

use crate::tools::{CapabilityKind, ToolDescriptor};

/// Returns a cycle in the capability dependency graph as a closed path
/// (`[a, b, a]`), or `None` if the graph is acyclic. Dependencies on kinds no
/// registered tool provides cannot form a cycle and are ignored.
pub fn find_cycle(descriptors: &[ToolDescriptor]) -> Option<Vec<CapabilityKind>> {
    let mut edges: BTreeMap<&CapabilityKind, BTreeSet<&CapabilityKind>> = BTreeMap::new();
    for descriptor in descriptors {
        edges.entry(&descriptor.kind).or_default();
    }
    for descriptor in descriptors {
        for dep in &descriptor.dependencies {
            if edges.contains_key(dep) {
                edges.entry(&descriptor.kind).or_default().insert(dep);
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a CapabilityKind,
        edges: &BTreeMap<&'a CapabilityKind, BTreeSet<&'a CapabilityKind>>,
        marks: &mut BTreeMap<&'a CapabilityKind, Mark>,
        stack: &mut Vec<&'a CapabilityKind>,
    ) -> Option<Vec<CapabilityKind>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|k| *k == node).unwrap_or(0);
                let mut cycle: Vec<CapabilityKind> =
                    stack[start..].iter().map(|k| (*k).clone()).collect();
                cycle.push(node.clone());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(deps) = edges.get(node) {
            for dep in deps.iter().copied() {
                if let Some(cycle) = visit(dep, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    for node in edges.keys().copied() {
        if let Some(cycle) = visit(node, &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// Groups `items` into tiers: an item lands in the first tier after all of
/// its dependencies. Input order is preserved inside each tier. Returns
/// `None` if the items contain a cycle.
pub fn layer<T, K, D>(items: Vec<T>, key: K, deps: D) -> Option<Vec<Vec<T>>>
where
    K: Fn(&T) -> CapabilityKind,
    D: Fn(&T) -> BTreeSet<CapabilityKind>,
{
    let present: BTreeSet<CapabilityKind> = items.iter().map(&key).collect();
    let mut placed: BTreeSet<CapabilityKind> = BTreeSet::new();
    let mut remaining = items;
    let mut tiers = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<T>, Vec<T>) = remaining.into_iter().partition(|item| {
            deps(item)
                .iter()
                .filter(|dep| present.contains(*dep))
                .all(|dep| placed.contains(dep))
        });
        if ready.is_empty() {
            return None;
        }
        placed.extend(ready.iter().map(&key));
        tiers.push(ready);
        remaining = blocked;
    }

    Some(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, kind: CapabilityKind, deps: &[CapabilityKind]) -> ToolDescriptor {
        let mut builder = ToolDescriptor::builder(name, kind);
        for dep in deps {
            builder = builder.depends_on(dep.clone());
        }
        builder.build()
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let descriptors = vec![
            tool("s", CapabilityKind::Search, &[]),
            tool("a", CapabilityKind::Analyze, &[]),
            tool(
                "y",
                CapabilityKind::Synthesize,
                &[CapabilityKind::Search, CapabilityKind::Analyze],
            ),
            tool("v", CapabilityKind::Validate, &[CapabilityKind::Synthesize]),
        ];
        assert!(find_cycle(&descriptors).is_none());
    }

    #[test]
    fn detects_two_node_cycle() {
        let descriptors = vec![
            tool("a", CapabilityKind::Analyze, &[CapabilityKind::Validate]),
            tool("v", CapabilityKind::Validate, &[CapabilityKind::Analyze]),
        ];
        let cycle = find_cycle(&descriptors).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn detects_self_dependency() {
        let descriptors = vec![tool("s", CapabilityKind::Search, &[CapabilityKind::Search])];
        assert_eq!(
            find_cycle(&descriptors).unwrap(),
            vec![CapabilityKind::Search, CapabilityKind::Search]
        );
    }

    #[test]
    fn layers_respect_dependencies_and_order() {
        let descriptors = vec![
            tool("v", CapabilityKind::Validate, &[CapabilityKind::Synthesize]),
            tool("s", CapabilityKind::Search, &[]),
            tool(
                "y",
                CapabilityKind::Synthesize,
                &[CapabilityKind::Search, CapabilityKind::Analyze],
            ),
            tool("a", CapabilityKind::Analyze, &[]),
        ];
        let tiers = layer(descriptors, |d| d.kind.clone(), |d| d.dependencies.clone()).unwrap();
        let names: Vec<Vec<&str>> = tiers
            .iter()
            .map(|tier| tier.iter().map(|d| d.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["s", "a"], vec!["y"], vec!["v"]]);
    }
}
