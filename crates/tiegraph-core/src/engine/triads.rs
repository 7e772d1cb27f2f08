//! Triadic enumeration of a directed graph (Batagelj–Mrvar).
//!
//! Every connected node triple is visited once through one of its edges and
//! classified into one of the 16 directed-triad isomorphism classes by a 6-bit
//! edge code. Cost is linear in the number of edges for the connected classes;
//! the dyadic classes (`012`, `102`) and the null class (`003`) also need the
//! non-neighbours of each dyad and are only computed when requested.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::adjacency::Adjacency;

/// Maps a 6-bit triad code to the 1-based index of its class in [`TriadType::ALL`].
const TRICODES: [u8; 64] = [
    1, 2, 2, 3, 2, 4, 6, 8, 2, 6, 5, 7, 3, 8, 7, 11, 2, 6, 4, 8, 5, 9, 9, 13, 6, 10, 9, 14, 7, 14,
    12, 15, 2, 5, 6, 7, 6, 9, 10, 14, 4, 9, 9, 12, 8, 13, 14, 15, 3, 7, 8, 11, 7, 12, 14, 15, 8,
    14, 13, 15, 11, 15, 15, 16,
];

/// The sixteen directed-triad isomorphism classes (MAN notation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum TriadType {
    T003,
    T012,
    T102,
    T021D,
    T021U,
    T021C,
    T111D,
    T111U,
    T030T,
    T030C,
    T201,
    T120D,
    T120U,
    T120C,
    T210,
    T300,
}

impl TriadType {
    pub const ALL: [TriadType; 16] = [
        TriadType::T003,
        TriadType::T012,
        TriadType::T102,
        TriadType::T021D,
        TriadType::T021U,
        TriadType::T021C,
        TriadType::T111D,
        TriadType::T111U,
        TriadType::T030T,
        TriadType::T030C,
        TriadType::T201,
        TriadType::T120D,
        TriadType::T120U,
        TriadType::T120C,
        TriadType::T210,
        TriadType::T300,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TriadType::T003 => "003",
            TriadType::T012 => "012",
            TriadType::T102 => "102",
            TriadType::T021D => "021D",
            TriadType::T021U => "021U",
            TriadType::T021C => "021C",
            TriadType::T111D => "111D",
            TriadType::T111U => "111U",
            TriadType::T030T => "030T",
            TriadType::T030C => "030C",
            TriadType::T201 => "201",
            TriadType::T120D => "120D",
            TriadType::T120U => "120U",
            TriadType::T120C => "120C",
            TriadType::T210 => "210",
            TriadType::T300 => "300",
        }
    }

    /// Looks a class up by its MAN name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    fn from_code(code: usize) -> Self {
        Self::ALL[TRICODES[code] as usize - 1]
    }
}

impl fmt::Display for TriadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classes that suggest an unbalanced, closable triangle.
pub const BALANCE_TRIADS: [TriadType; 7] = [
    TriadType::T021C,
    TriadType::T111D,
    TriadType::T111U,
    TriadType::T030C,
    TriadType::T201,
    TriadType::T120C,
    TriadType::T210,
];

/// Sorted node-index triples per requested class.
pub type TriadCensus = BTreeMap<TriadType, BTreeSet<[usize; 3]>>;

fn sorted_triple(a: usize, b: usize, c: usize) -> [usize; 3] {
    let mut t = [a, b, c];
    t.sort_unstable();
    t
}

fn tricode(graph: &Adjacency, v: usize, u: usize, w: usize) -> usize {
    [(v, u, 1), (u, v, 2), (v, w, 4), (w, v, 8), (u, w, 16), (w, u, 32)]
        .iter()
        .filter(|(a, b, _)| graph.has_edge(*a, *b))
        .map(|(_, _, bit)| bit)
        .sum()
}

/// Enumerates the triples of every class in `types`, given by MAN name.
///
/// Returns `None` if any name is not a triad class; callers must check.
pub fn triadic_enumeration(graph: &Adjacency, types: &[&str]) -> Option<TriadCensus> {
    let mut wanted = BTreeSet::new();
    for name in types {
        wanted.insert(TriadType::from_name(name)?);
    }
    Some(enumerate_types(graph, &wanted))
}

/// Typed variant of [`triadic_enumeration`].
pub fn enumerate_types(graph: &Adjacency, wanted: &BTreeSet<TriadType>) -> TriadCensus {
    let mut census: TriadCensus = wanted.iter().map(|t| (*t, BTreeSet::new())).collect();
    let n = graph.node_count();
    let want_dyadic = wanted.contains(&TriadType::T012) || wanted.contains(&TriadType::T102);

    for v in 0..n {
        let vnbrs = graph.neighbors(v);
        for &u in vnbrs.iter().filter(|&&u| u > v) {
            let mut around: BTreeSet<usize> = vnbrs.iter().copied().collect();
            around.extend(graph.neighbors(u).iter().copied());
            around.remove(&u);
            around.remove(&v);

            if want_dyadic {
                let mutual = graph.has_edge(u, v) && graph.has_edge(v, u);
                let class = if mutual {
                    TriadType::T102
                } else {
                    TriadType::T012
                };
                if let Some(set) = census.get_mut(&class) {
                    for w in (0..n).filter(|w| *w != u && *w != v && !around.contains(w)) {
                        set.insert(sorted_triple(u, v, w));
                    }
                }
            }

            for &w in &around {
                let class = TriadType::from_code(tricode(graph, v, u, w));
                let counted_here = u < w || (v < w && w < u && !graph.adjacent(v, w));
                if counted_here {
                    if let Some(set) = census.get_mut(&class) {
                        set.insert(sorted_triple(u, v, w));
                    }
                }
            }
        }
    }

    if wanted.contains(&TriadType::T003) {
        let connected: BTreeSet<TriadType> = TriadType::ALL[1..].iter().copied().collect();
        let full = if connected.is_subset(wanted) {
            census.clone()
        } else {
            enumerate_types(graph, &connected)
        };
        let seen: BTreeSet<[usize; 3]> = full
            .iter()
            .filter(|(t, _)| **t != TriadType::T003)
            .flat_map(|(_, s)| s.iter().copied())
            .collect();
        let mut null = BTreeSet::new();
        for a in 0..n {
            for b in a + 1..n {
                for c in b + 1..n {
                    if !seen.contains(&[a, b, c]) {
                        null.insert([a, b, c]);
                    }
                }
            }
        }
        census.insert(TriadType::T003, null);
    }
    census
}

/// Transitively missing edges inside a triple: `a → c` for every path
/// `a → b → c` within the triple that has no direct `a → c`.
pub fn missing_balance_edges(graph: &Adjacency, triple: [usize; 3]) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for &node in &triple {
        for &nbr in triple.iter().filter(|&&x| graph.has_edge(node, x)) {
            for &next in triple.iter().filter(|&&x| graph.has_edge(nbr, x)) {
                if next != node && !graph.has_edge(node, next) {
                    edges.push((node, next));
                }
            }
        }
    }
    edges
}
