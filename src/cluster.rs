//! DBSCAN over arbitrary pairwise distances, down to `min_samples = 1`.

use std::collections::VecDeque;

pub const NOISE: i32 = -1;

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// DBSCAN over `n` points. Neighbourhoods include the point itself and use
/// `distance <= eps`. Clusters are numbered from 0 in order of their first
/// core point; noise is labelled [`NOISE`].
pub fn dbscan<F>(n: usize, eps: f64, min_samples: usize, distance: F) -> Vec<i32>
where
    F: Fn(usize, usize) -> f64,
{
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| distance(i, j) <= eps).collect())
        .collect();
    let core: Vec<bool> = neighbours.iter().map(|n| n.len() >= min_samples).collect();

    let mut labels = vec![NOISE; n];
    let mut cluster = 0;
    for start in 0..n {
        if labels[start] != NOISE || !core[start] {
            continue;
        }
        labels[start] = cluster;
        let mut queue = VecDeque::from([start]);
        while let Some(p) = queue.pop_front() {
            if !core[p] {
                continue;
            }
            for &q in &neighbours[p] {
                if labels[q] == NOISE {
                    labels[q] = cluster;
                    queue.push_back(q);
                }
            }
        }
        cluster += 1;
    }
    labels
}

pub fn dbscan_features(rows: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i32> {
    dbscan(rows.len(), eps, min_samples, |i, j| euclidean(&rows[i], &rows[j]))
}

pub fn dbscan_precomputed(matrix: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i32> {
    dbscan(matrix.len(), eps, min_samples, |i, j| matrix[i][j])
}

#[cfg(test)]
mod test {
    use super::*;

    fn points(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn dbscan_two_groups_and_noise() {
        let rows = points(&[0.0, 0.1, 0.2, 10.0, 10.1, 10.2, 50.0]);
        let labels = dbscan_features(&rows, 0.5, 2);
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
    }

    #[test]
    fn dbscan_min_samples_one_has_no_noise() {
        let rows = points(&[0.0, 100.0, 200.0]);
        assert_eq!(dbscan_features(&rows, 0.5, 1), vec![0, 1, 2]);
    }

    #[test]
    fn dbscan_border_points_join_but_do_not_expand() {
        // 0.0 and 1.2 are border points of the cores 0.4 and 0.8
        let rows = points(&[0.0, 0.4, 0.8, 1.2, 2.0]);
        assert_eq!(dbscan_features(&rows, 0.5, 3), vec![0, 0, 0, 0, NOISE]);
    }

    #[test]
    fn dbscan_precomputed_matrix() {
        let matrix = vec![
            vec![0.0, 0.2, 1.0],
            vec![0.2, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        assert_eq!(dbscan_precomputed(&matrix, 0.5, 2), vec![0, 0, NOISE]);
    }
}
