//! Archive Clustering
//!
//! K-means over index vectors with cosine assignment. Seeding picks a random
//! first centroid, then repeatedly the point least similar to every centroid
//! chosen so far.

use serde::Serialize;

use poema_core::text::{cosine_similarity, normalize};
use poema_core::{EntityId, RandomSource};

/// One group of archive entries
#[derive(Clone, Debug, Serialize)]
pub struct Cluster {
    /// Unit-length mean of the members
    pub centroid: Vec<f32>,

    /// Member ids, ascending
    pub members: Vec<EntityId>,

    /// Mean cosine of members to the centroid
    pub cohesion: f32,
}

/// Cluster `points` into at most `k` groups
///
/// `k` is clamped to the number of points; no points (or `k == 0`) gives
/// an empty result. Empty clusters are dropped from the output.
pub fn kmeans(
    points: &[(EntityId, &[f32])],
    k: usize,
    iterations: usize,
    rng: &mut dyn RandomSource,
) -> Vec<Cluster> {
    let n = points.len();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }

    let mut centroids = seed_centroids(points, k, rng);
    let mut assignments = vec![usize::MAX; n];

    for _ in 0..iterations.max(1) {
        // Assign each point to its most similar centroid
        let mut changed = false;
        for (i, (_, v)) in points.iter().enumerate() {
            let best = nearest(v, &centroids);
            if assignments[i] != best {
                assignments[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Recompute centroids (empty clusters keep theirs)
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let mut sum = vec![0.0f32; centroid.len()];
            let mut count = 0usize;
            for (i, (_, v)) in points.iter().enumerate() {
                if assignments[i] == c {
                    for (s, x) in sum.iter_mut().zip(v.iter()) {
                        *s += x;
                    }
                    count += 1;
                }
            }
            if count > 0 {
                normalize(&mut sum);
                *centroid = sum;
            }
        }
    }

    centroids
        .into_iter()
        .enumerate()
        .filter_map(|(c, centroid)| {
            let mut members = Vec::new();
            let mut similarity = 0.0f32;
            for (i, (id, v)) in points.iter().enumerate() {
                if assignments[i] == c {
                    members.push(*id);
                    similarity += cosine_similarity(v, &centroid);
                }
            }
            if members.is_empty() {
                return None;
            }
            members.sort();
            let cohesion = similarity / members.len() as f32;
            Some(Cluster { centroid, members, cohesion })
        })
        .collect()
}

/// Random first centroid, then farthest-first
fn seed_centroids(points: &[(EntityId, &[f32])], k: usize, rng: &mut dyn RandomSource) -> Vec<Vec<f32>> {
    let mut chosen = vec![rng.index(points.len())];

    while chosen.len() < k {
        let next = points
            .iter()
            .enumerate()
            .filter(|(i, _)| !chosen.contains(i))
            .map(|(i, (_, v))| {
                let closest = chosen
                    .iter()
                    .map(|&c| cosine_similarity(v, points[c].1))
                    .fold(f32::MIN, f32::max);
                (i, closest)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(i, _)| i);

        match next {
            Some(i) => chosen.push(i),
            None => break,
        }
    }

    chosen.into_iter().map(|i| points[i].1.to_vec()).collect()
}

/// Index of the most similar centroid (lowest index on ties)
fn nearest(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_sim = f32::MIN;
    for (c, centroid) in centroids.iter().enumerate() {
        let sim = cosine_similarity(v, centroid);
        if sim > best_sim {
            best = c;
            best_sim = sim;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::SeededRandom;

    #[test]
    fn test_separates_two_directions() {
        let a1: &[f32] = &[1.0, 0.0, 0.0];
        let a2: &[f32] = &[0.9, 0.1, 0.0];
        let b1: &[f32] = &[0.0, 0.0, 1.0];
        let b2: &[f32] = &[0.0, 0.1, 0.9];
        let points = vec![(EntityId(1), a1), (EntityId(2), b1), (EntityId(3), a2), (EntityId(4), b2)];

        let mut rng = SeededRandom::from_seed(3);
        let mut clusters = kmeans(&points, 2, 10, &mut rng);
        clusters.sort_by_key(|c| c.members[0]);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![EntityId(1), EntityId(3)]);
        assert_eq!(clusters[1].members, vec![EntityId(2), EntityId(4)]);
        assert!(clusters.iter().all(|c| c.cohesion > 0.9));
    }

    #[test]
    fn test_k_is_clamped() {
        let v: &[f32] = &[1.0, 0.0];
        let points = vec![(EntityId(7), v)];
        let mut rng = SeededRandom::from_seed(1);
        let clusters = kmeans(&points, 5, 10, &mut rng);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![EntityId(7)]);
    }

    #[test]
    fn test_empty_input() {
        let mut rng = SeededRandom::from_seed(1);
        assert!(kmeans(&[], 3, 10, &mut rng).is_empty());
    }
}
