//! Density-based clustering (DBSCAN) of geodetic points
//!
//! Distances are haversine meters. Inputs are one access point's
//! observation history, so the O(n²) neighbourhood scan is acceptable.

use std::collections::{BTreeMap, VecDeque};

use crate::algorithms::geodesy::distance_between;
use crate::core::GeoPoint;

/// Cluster id reserved for points classified as noise
pub const NOISE: i32 = -1;

/// Label of points not yet assigned to anything
const UNASSIGNED: i32 = 0;

/// Cluster id to indices of member points, in input order.
/// Real clusters are numbered densely from 1; `NOISE` collects the rest.
pub type Clusters = BTreeMap<i32, Vec<usize>>;

/// DBSCAN over `points` with neighbour radius `epsilon` (m) and minimum
/// neighbourhood size `min_points` (the point itself is not counted).
///
/// A point labelled noise before being reached from a later cluster's
/// expansion keeps the noise label: expansion only relabels points that
/// are still unassigned.
pub fn dbscan<P: GeoPoint>(points: &[P], epsilon: f64, min_points: usize) -> Clusters {
    let n = points.len();
    let mut labels = vec![UNASSIGNED; n];
    let mut visited = vec![false; n];
    let mut cluster_id = UNASSIGNED;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let neighbours = neighbours_of(points, i, epsilon);
        if neighbours.len() < min_points {
            labels[i] = NOISE;
            continue;
        }

        cluster_id += 1;
        labels[i] = cluster_id;
        expand_cluster(points, &mut labels, &mut visited, neighbours, cluster_id, epsilon, min_points);
    }

    let mut clusters = Clusters::new();
    for (index, label) in labels.into_iter().enumerate() {
        clusters.entry(label).or_default().push(index);
    }
    clusters
}

/// Indices of all other points within `epsilon` of `points[index]`
fn neighbours_of<P: GeoPoint>(points: &[P], index: usize, epsilon: f64) -> Vec<usize> {
    let point = &points[index];
    points
        .iter()
        .enumerate()
        .filter(|(j, candidate)| *j != index && distance_between(point, *candidate) <= epsilon)
        .map(|(j, _)| j)
        .collect()
}

fn expand_cluster<P: GeoPoint>(
    points: &[P],
    labels: &mut [i32],
    visited: &mut [bool],
    seeds: Vec<usize>,
    cluster_id: i32,
    epsilon: f64,
    min_points: usize,
) {
    let mut queue: VecDeque<usize> = seeds.into();

    while let Some(current) = queue.pop_front() {
        if !visited[current] {
            visited[current] = true;
            let neighbours = neighbours_of(points, current, epsilon);
            if neighbours.len() >= min_points {
                for neighbour in neighbours {
                    if !queue.contains(&neighbour) {
                        queue.push_back(neighbour);
                    }
                }
            }
        }

        if labels[current] == UNASSIGNED {
            labels[current] = cluster_id;
        }
    }
}
