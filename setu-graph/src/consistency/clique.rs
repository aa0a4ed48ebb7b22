//! Maximum-clique search over the consistency graph.
//!
//! Vertices are arena indices; `adjacency[v]` holds the neighbors of `v`.
//! Only the vertices listed in `vertices` take part in the search, so
//! tombstoned arena slots are simply left out by the caller.

use std::collections::BTreeSet;

/// Exact maximum clique (Bron–Kerbosch with pivoting and a size bound).
///
/// Ties are broken deterministically: the first maximum clique found in
/// ascending vertex order wins. Result is sorted.
pub fn maximum_clique(adjacency: &[BTreeSet<usize>], vertices: &[usize]) -> Vec<usize> {
    let candidates: BTreeSet<usize> = vertices.iter().copied().collect();
    let mut best = Vec::new();
    let mut current = Vec::new();
    bron_kerbosch(adjacency, &mut current, candidates, BTreeSet::new(), &mut best);
    best.sort_unstable();
    best
}

fn bron_kerbosch(
    adjacency: &[BTreeSet<usize>],
    current: &mut Vec<usize>,
    mut candidates: BTreeSet<usize>,
    mut excluded: BTreeSet<usize>,
    best: &mut Vec<usize>,
) {
    if candidates.is_empty() {
        if excluded.is_empty() && current.len() > best.len() {
            *best = current.clone();
        }
        return;
    }
    // Bound: even taking every candidate cannot beat the incumbent.
    if current.len() + candidates.len() <= best.len() {
        return;
    }

    let pivot = candidates
        .iter()
        .chain(excluded.iter())
        .copied()
        .max_by_key(|u| {
            let degree = candidates.intersection(&adjacency[*u]).count();
            // Prefer the lowest id on equal degree
            (degree, std::cmp::Reverse(*u))
        });
    let branch: Vec<usize> = match pivot {
        Some(u) => candidates.difference(&adjacency[u]).copied().collect(),
        None => candidates.iter().copied().collect(),
    };

    for v in branch {
        let neighbors = &adjacency[v];
        let next_candidates = candidates.intersection(neighbors).copied().collect();
        let next_excluded = excluded.intersection(neighbors).copied().collect();

        current.push(v);
        bron_kerbosch(adjacency, current, next_candidates, next_excluded, best);
        current.pop();

        candidates.remove(&v);
        excluded.insert(v);

        if current.len() + candidates.len() <= best.len() {
            return;
        }
    }
}

/// Greedy maximal clique.
///
/// Repeatedly adds the candidate with the most neighbors among the remaining
/// candidates, then restricts the candidates to its neighbors. Not guaranteed
/// maximum, but linear in the number of edges per step. Result is sorted.
pub fn greedy_clique(adjacency: &[BTreeSet<usize>], vertices: &[usize]) -> Vec<usize> {
    let mut candidates: BTreeSet<usize> = vertices.iter().copied().collect();
    let mut clique = Vec::new();

    while let Some(v) = candidates
        .iter()
        .copied()
        .max_by_key(|v| {
            let degree = candidates.intersection(&adjacency[*v]).count();
            (degree, std::cmp::Reverse(*v))
        })
    {
        clique.push(v);
        candidates = candidates.intersection(&adjacency[v]).copied().collect();
    }

    clique.sort_unstable();
    clique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, edges: &[(usize, usize)]) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); n];
        for &(a, b) in edges {
            adjacency[a].insert(b);
            adjacency[b].insert(a);
        }
        adjacency
    }

    fn is_clique(adjacency: &[BTreeSet<usize>], clique: &[usize]) -> bool {
        clique.iter().enumerate().all(|(i, a)| {
            clique[i + 1..].iter().all(|b| adjacency[*a].contains(b))
        })
    }

    #[test]
    fn test_empty() {
        assert!(maximum_clique(&[], &[]).is_empty());
        assert!(greedy_clique(&[], &[]).is_empty());
    }

    #[test]
    fn test_isolated_vertices_give_single_vertex() {
        let adjacency = graph(3, &[]);
        assert_eq!(maximum_clique(&adjacency, &[0, 1, 2]), vec![0]);
        assert_eq!(greedy_clique(&adjacency, &[0, 1, 2]).len(), 1);
    }

    #[test]
    fn test_triangle_plus_outlier() {
        let adjacency = graph(4, &[(0, 1), (1, 2), (0, 2)]);
        assert_eq!(maximum_clique(&adjacency, &[0, 1, 2, 3]), vec![0, 1, 2]);
        assert_eq!(greedy_clique(&adjacency, &[0, 1, 2, 3]), vec![0, 1, 2]);
    }

    #[test]
    fn test_exact_beats_greedy_trap() {
        // Vertex 0 has the highest degree but sits in no 4-clique.
        // {1, 2, 3, 4} is the maximum clique.
        let adjacency = graph(
            9,
            &[
                (0, 5),
                (0, 6),
                (0, 7),
                (0, 8),
                (0, 1),
                (1, 2),
                (1, 3),
                (1, 4),
                (2, 3),
                (2, 4),
                (3, 4),
            ],
        );
        let all: Vec<usize> = (0..9).collect();
        let exact = maximum_clique(&adjacency, &all);
        assert_eq!(exact, vec![1, 2, 3, 4]);

        let greedy = greedy_clique(&adjacency, &all);
        assert!(is_clique(&adjacency, &greedy));
        assert!(greedy.len() <= exact.len());
    }

    #[test]
    fn test_respects_vertex_subset() {
        let adjacency = graph(4, &[(0, 1), (1, 2), (0, 2), (2, 3)]);
        assert_eq!(maximum_clique(&adjacency, &[1, 2, 3]).len(), 2);
    }

    #[test]
    fn test_exact_finds_clique_in_dense_graph() {
        // Complete graph on 12 vertices minus a perfect matching: max clique 6.
        let n = 12;
        let mut edges = Vec::new();
        for a in 0..n {
            for b in (a + 1)..n {
                if !(a % 2 == 0 && b == a + 1) {
                    edges.push((a, b));
                }
            }
        }
        let adjacency = graph(n, &edges);
        let all: Vec<usize> = (0..n).collect();
        let clique = maximum_clique(&adjacency, &all);
        assert_eq!(clique.len(), 6);
        assert!(is_clique(&adjacency, &clique));
    }
}
