//! Greedy fallback heuristics: farthest-first seeding, nearest-seed
//! clustering, nearest-neighbour ordering and a bounded 2-opt refinement.

use crate::domain::geo::haversine_m;

fn distance(points: &[(f64, f64)], a: usize, b: usize) -> f64 {
    haversine_m(points[a].0, points[a].1, points[b].0, points[b].1)
}

/// Pick up to `k` spread-out seed points, starting from the first point and
/// repeatedly taking the point farthest from every chosen seed.
pub fn farthest_first_seeds(points: &[(f64, f64)], k: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut seeds = vec![0];
    while seeds.len() < k && seeds.len() < points.len() {
        let mut best = None;
        let mut best_dist = -1.0;
        for i in 0..points.len() {
            if seeds.contains(&i) {
                continue;
            }
            let nearest = seeds
                .iter()
                .map(|&s| distance(points, i, s))
                .fold(f64::MAX, f64::min);
            if nearest > best_dist {
                best_dist = nearest;
                best = Some(i);
            }
        }
        match best {
            Some(i) => seeds.push(i),
            None => break,
        }
    }
    seeds
}

/// Assign every point to its nearest seed; returns one member list per seed.
pub fn cluster_by_nearest_seed(points: &[(f64, f64)], seeds: &[usize]) -> Vec<Vec<usize>> {
    let mut clusters = vec![Vec::new(); seeds.len()];
    for i in 0..points.len() {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (si, &seed) in seeds.iter().enumerate() {
            let d = distance(points, i, seed);
            if d < best_dist {
                best_dist = d;
                best = si;
            }
        }
        clusters[best].push(i);
    }
    clusters
}

/// Order a cluster by nearest neighbour starting from `start`.
pub fn nearest_neighbour_order(points: &[(f64, f64)], members: &[usize], start: usize) -> Vec<usize> {
    let mut order = vec![start];
    let mut used = vec![start];
    while order.len() < members.len() {
        let last = order[order.len() - 1];
        let mut best = None;
        let mut best_dist = f64::MAX;
        for &candidate in members {
            if used.contains(&candidate) {
                continue;
            }
            let d = distance(points, last, candidate);
            if d < best_dist {
                best_dist = d;
                best = Some(candidate);
            }
        }
        match best {
            Some(candidate) => {
                order.push(candidate);
                used.push(candidate);
            }
            None => break,
        }
    }
    order
}

/// Bounded 2-opt refinement of an order, keeping endpoints fixed.
pub fn improve_order_two_opt(points: &[(f64, f64)], order: &[usize], iterations: u32) -> Vec<usize> {
    let iterations = iterations.max(1);
    let mut best = order.to_vec();
    let mut best_dist = path_distance(points, &best);
    let n = order.len();
    for _ in 0..iterations {
        let mut improved = false;
        if n >= 4 {
            for i in 1..n - 2 {
                for k in i + 1..n - 1 {
                    let mut candidate = best.clone();
                    candidate[i..=k].reverse();
                    let d = path_distance(points, &candidate);
                    if d + 1e-3 < best_dist {
                        best = candidate;
                        best_dist = d;
                        improved = true;
                    }
                }
            }
        }
        if !improved {
            break;
        }
    }
    best
}

fn path_distance(points: &[(f64, f64)], order: &[usize]) -> f64 {
    order
        .windows(2)
        .map(|pair| distance(points, pair[0], pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn seeds_are_capped_by_point_count() {
        let points = vec![(0.0, 0.0), (0.0, 1.0)];
        assert_eq!(farthest_first_seeds(&points, 5).len(), 2);
        assert_eq!(farthest_first_seeds(&points, 1), vec![0]);
    }

    #[rstest]
    fn second_seed_is_the_farthest_point() {
        let points = vec![(0.0, 0.0), (0.0, 0.1), (0.0, 2.0)];
        assert_eq!(farthest_first_seeds(&points, 2), vec![0, 2]);
    }

    #[rstest]
    fn clustering_assigns_to_nearest_seed() {
        let points = vec![(0.0, 0.0), (0.0, 0.1), (0.0, 2.0), (0.0, 2.1)];
        let clusters = cluster_by_nearest_seed(&points, &[0, 2]);
        assert_eq!(clusters[0], vec![0, 1]);
        assert_eq!(clusters[1], vec![2, 3]);
    }

    #[rstest]
    fn nearest_neighbour_visits_every_member() {
        let points = vec![(0.0, 0.0), (0.0, 0.3), (0.0, 0.1), (0.0, 0.2)];
        let order = nearest_neighbour_order(&points, &[0, 1, 2, 3], 0);
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[rstest]
    fn two_opt_uncrosses_a_square() {
        // Corners of a square visited in a crossing order.
        let points = vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];
        let crossed = vec![0, 2, 1, 3];
        let improved = improve_order_two_opt(&points, &crossed, 3);
        let before = path_distance(&points, &crossed);
        let after = path_distance(&points, &improved);
        assert!(after < before, "expected {after} < {before}");
    }
}
