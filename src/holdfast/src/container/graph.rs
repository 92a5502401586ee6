use std::collections::{HashMap, HashSet};

/// Interned index of an instance name within one holder store.
///
/// The reverse-dependency index is kept over these indices instead of
/// string keys, so adjacency updates and the destruction-ordering pass
/// never rehash names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NameId(u32);

impl NameId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub(crate) struct NameArena {
    names: Vec<String>,
    ids: HashMap<String, NameId>,
}

impl NameArena {
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(id) = self.ids.get(name) {
            *id
        } else {
            let id = NameId(self.names.len() as u32);
            self.names.push(name.to_string());
            self.ids.insert(name.to_string(), id);
            id
        }
    }

    pub fn lookup(&self, name: &str) -> Option<NameId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: NameId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Reverse-dependency adjacency: `dependents[dep]` is the set of holders
/// whose `deps` contain `dep`. Every mutation happens in the same critical
/// section as the corresponding `deps` update on the holder itself.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    dependents: Vec<HashSet<NameId>>,
}

impl DependencyGraph {
    /// Grows the adjacency storage to cover every interned id.
    pub fn ensure(&mut self, len: usize) {
        if self.dependents.len() < len {
            self.dependents.resize_with(len, HashSet::new);
        }
    }

    pub fn add_edge(&mut self, dep: NameId, dependent: NameId) {
        self.dependents[dep.index()].insert(dependent);
    }

    pub fn remove_edge(&mut self, dep: NameId, dependent: NameId) {
        self.dependents[dep.index()].remove(&dependent);
    }

    pub fn dependents(&self, dep: NameId) -> impl Iterator<Item = NameId> + '_ {
        self.dependents[dep.index()].iter().copied()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// The result of planning a destruction pass: holders in the order they
/// must be destroyed (every holder before anything it depends on), plus
/// any dependency cycles encountered along the way.
pub(crate) struct DestructionPlan {
    pub order: Vec<NameId>,
    pub cycles: Vec<Vec<NameId>>,
}

/// Computes a dependents-first destruction order via a tri-color
/// depth-first pass over the reverse-dependency edges.
///
/// `roots` picks the starting set: the transitive dependents of a single
/// invalidated holder, or every live holder for a full clear. Edges
/// leading outside `live` are ignored. A grey revisit marks a dependency
/// cycle; the cycle is reported and the offending edge skipped, so the
/// resulting order is always total over the reachable set.
pub(crate) fn destruction_order(
    graph: &DependencyGraph,
    live: &HashSet<NameId>,
    roots: impl Iterator<Item = NameId>,
) -> DestructionPlan {
    let mut colors: HashMap<NameId, Color> = HashMap::with_capacity(live.len());
    let mut plan = DestructionPlan {
        order: Vec::new(),
        cycles: Vec::new(),
    };
    let mut path = Vec::new();

    for root in roots {
        if live.contains(&root) && color_of(&colors, root) == Color::White {
            visit(graph, live, root, &mut colors, &mut path, &mut plan);
        }
    }
    plan
}

fn color_of(colors: &HashMap<NameId, Color>, id: NameId) -> Color {
    colors.get(&id).copied().unwrap_or(Color::White)
}

fn visit(
    graph: &DependencyGraph,
    live: &HashSet<NameId>,
    id: NameId,
    colors: &mut HashMap<NameId, Color>,
    path: &mut Vec<NameId>,
    plan: &mut DestructionPlan,
) {
    colors.insert(id, Color::Grey);
    path.push(id);
    for dependent in graph.dependents(id) {
        if !live.contains(&dependent) {
            continue;
        }
        match color_of(colors, dependent) {
            Color::White => visit(graph, live, dependent, colors, path, plan),
            Color::Grey => {
                let start = path
                    .iter()
                    .position(|&p| p == dependent)
                    .unwrap_or(path.len() - 1);
                plan.cycles.push(path[start..].to_vec());
            }
            Color::Black => {}
        }
    }
    path.pop();
    colors.insert(id, Color::Black);
    plan.order.push(id);
}
