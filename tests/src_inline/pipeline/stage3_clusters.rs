use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;

fn times(n: usize) -> Vec<f64> {
    (0..n).map(|i| -0.1 + i as f64 * 0.01).collect()
}

fn params(n_permutations: usize) -> ClusterTestParams {
    ClusterTestParams {
        n_permutations,
        ..ClusterTestParams::default()
    }
}

/// Subjects at chance everywhere except `[start, start + len)`.
fn block_samples(n_subjects: usize, n_times: usize, start: usize, len: usize) -> Vec<Vec<f64>> {
    (0..n_subjects)
        .map(|s| {
            (0..n_times)
                .map(|t| {
                    if (start..start + len).contains(&t) {
                        0.88 + 0.02 * s as f64
                    } else {
                        0.5
                    }
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_find_clusters_runs() {
    let t = [0.0, 3.0, 3.5, 1.0, 2.5, 2.5, 2.5];
    assert_eq!(find_clusters(&t, 2.0), vec![(1, 3), (4, 7)]);
    assert_eq!(find_clusters(&t, 2.5), vec![(1, 3)]);
    assert!(find_clusters(&t, 10.0).is_empty());
    assert!(find_clusters(&[], 0.0).is_empty());
}

#[test]
fn test_t_critical_matches_table() {
    let t = t_critical(0.05, 2).unwrap();
    assert!((t - 2.919986).abs() < 1e-4);
    let t = t_critical(0.05, 19).unwrap();
    assert!((t - 1.729133).abs() < 1e-4);
}

#[test]
fn test_block_above_chance_forms_one_significant_cluster() {
    let n_perm = 200;
    let samples = block_samples(3, 50, 20, 10);
    let mut rng = StdRng::seed_from_u64(42);
    let result = cluster_permutation_test(&samples, &times(50), &params(n_perm), &mut rng).unwrap();

    assert_eq!(result.clusters.len(), 1);
    let cluster = &result.clusters[0];
    assert_eq!((cluster.start, cluster.stop), (20, 30));
    assert_eq!(cluster.len(), 10);
    assert!(cluster.p_value <= 1.0 / (n_perm as f64 + 1.0));
    assert!(cluster.is_significant(result.p_threshold));
    assert_eq!(result.significant().count(), 1);
    assert_eq!(cluster.t_start, result.times[20]);
    assert_eq!(cluster.t_stop, result.times[29]);
}

#[test]
fn test_identical_subjects_block_is_significant() {
    let samples: Vec<Vec<f64>> = (0..3)
        .map(|_| {
            (0..50)
                .map(|t| if (10..20).contains(&t) { 0.9 } else { 0.5 })
                .collect()
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(1);
    let result = cluster_permutation_test(&samples, &times(50), &params(100), &mut rng).unwrap();
    assert_eq!(result.clusters.len(), 1);
    assert_eq!((result.clusters[0].start, result.clusters[0].stop), (10, 20));
    assert!(result.clusters[0].p_value <= 1.0 / 101.0);
    assert!(result.t_values[10..20].iter().all(|&t| t == f64::INFINITY));
    assert!(result.t_values[..10].iter().all(|&t| t == 0.0));
}

#[test]
fn test_chance_curves_have_no_clusters() {
    for n_perm in [1, 10, 1000] {
        let samples = vec![vec![0.5; 40]; 4];
        let mut rng = StdRng::seed_from_u64(7);
        let result =
            cluster_permutation_test(&samples, &times(40), &params(n_perm), &mut rng).unwrap();
        assert!(result.clusters.is_empty());
        assert!(result.t_values.iter().all(|&t| t == 0.0));
    }
}

#[test]
fn test_same_seed_is_idempotent() {
    let mut data_rng = StdRng::seed_from_u64(11);
    let samples: Vec<Vec<f64>> = (0..8)
        .map(|_| {
            (0..60)
                .map(|t| {
                    let signal = if (25..40).contains(&t) { 0.08 } else { 0.0 };
                    0.5 + signal + data_rng.random_range(-0.05..0.05)
                })
                .collect()
        })
        .collect();
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        cluster_permutation_test(&samples, &times(60), &params(300), &mut rng).unwrap()
    };
    let a = run(5);
    let b = run(5);
    assert_eq!(a, b);
    assert!(!a.clusters.is_empty());
}

#[test]
fn test_min_p_value_shrinks_with_permutations() {
    let mut previous = f64::INFINITY;
    for n_perm in [1, 10, 100, 1000, 10_000] {
        let p = params(n_perm).min_p_value();
        assert_eq!(p, 1.0 / (n_perm as f64 + 1.0));
        assert!(p < previous);
        previous = p;
    }
}

#[test]
fn test_extent_statistic_counts_points() {
    let samples = block_samples(3, 30, 5, 7);
    let p = ClusterTestParams {
        statistic: ClusterStatistic::Extent,
        ..params(50)
    };
    let mut rng = StdRng::seed_from_u64(2);
    let result = cluster_permutation_test(&samples, &times(30), &p, &mut rng).unwrap();
    assert_eq!(result.clusters.len(), 1);
    assert_eq!(result.clusters[0].mass, 7.0);
}

#[test]
fn test_explicit_threshold_is_used() {
    let samples = block_samples(3, 20, 5, 5);
    let p = ClusterTestParams {
        t_threshold: Some(1e6),
        ..params(20)
    };
    let mut rng = StdRng::seed_from_u64(3);
    let result = cluster_permutation_test(&samples, &times(20), &p, &mut rng).unwrap();
    assert_eq!(result.t_threshold, 1e6);
    assert!(result.clusters.is_empty());
}

#[test]
fn test_invalid_parameters_rejected() {
    let samples = block_samples(3, 10, 2, 3);
    let mut rng = StdRng::seed_from_u64(0);
    for bad in [
        params(0),
        ClusterTestParams {
            p_threshold: 0.0,
            ..params(10)
        },
        ClusterTestParams {
            p_threshold: 1.5,
            ..params(10)
        },
    ] {
        let err = cluster_permutation_test(&samples, &times(10), &bad, &mut rng).unwrap_err();
        assert!(matches!(err, ReportError::Configuration(_)));
    }
}

#[test]
fn test_needs_two_subjects() {
    let mut rng = StdRng::seed_from_u64(0);
    let err = cluster_permutation_test(&[vec![0.9; 10]], &times(10), &params(10), &mut rng)
        .unwrap_err();
    assert!(matches!(err, ReportError::Configuration(_)));
}

#[test]
fn test_single_time_point_has_no_clusters() {
    let mut rng = StdRng::seed_from_u64(0);
    let samples = vec![vec![0.9], vec![0.95], vec![0.85]];
    let result = cluster_permutation_test(&samples, &[0.0], &params(10), &mut rng).unwrap();
    assert!(result.clusters.is_empty());
    assert_eq!(result.t_values.len(), 1);
}

#[test]
fn test_row_length_mismatch() {
    let mut rng = StdRng::seed_from_u64(0);
    let samples = vec![vec![0.5; 10], vec![0.5; 9]];
    let err = cluster_permutation_test(&samples, &times(10), &params(10), &mut rng).unwrap_err();
    assert!(matches!(err, ReportError::ShapeMismatch(_)));
}
