//! End-to-end scenarios over the public index API.

use std::collections::HashSet;
use std::sync::Arc;

use expograph::analysis::{brute_force_knn, is_connected, recall_at_k, validate_graph};
use expograph::{
    ByteSpace, DEGIndex, DegError, FeatureVector, FloatSpace, SearchConfig, VertexFilter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_points(n: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn build(points: &[Vec<f32>], epv: usize) -> DEGIndex {
    let dims = points[0].len();
    let mut index = DEGIndex::new(Arc::new(FloatSpace::l2(dims)), epv).expect("index");
    for (label, p) in points.iter().enumerate() {
        index
            .add(label as u32, FeatureVector::from_f32s(p))
            .expect("add");
    }
    index
}

fn assert_regular(index: &DEGIndex) {
    let graph = index.graph();
    let issues = validate_graph(graph);
    assert!(issues.is_empty(), "graph issues: {issues:?}");
    let count = graph.vertex_count() as u32;
    for id in 0..count {
        let label = graph.label_of(id);
        assert_eq!(graph.id_of(label), Some(id));
        for (n, _) in graph.neighbors(id) {
            assert!(n < count, "neighbor id {n} out of range {count}");
        }
    }
}

// =============================================================================
// Small exact cases
// =============================================================================

#[test]
fn line_of_five_finds_closest() {
    let mut index = DEGIndex::new(Arc::new(FloatSpace::l2(1)), 2).unwrap();
    for i in 0..5u32 {
        index.add(i, FeatureVector::from_f32s(&[i as f32])).unwrap();
    }
    let graph = index.graph();
    for id in 0..5 {
        assert!(graph.degree(id) <= 2);
    }

    let query = FeatureVector::from_f32s(&[2.1]);
    let greedy = index.search(&[query.clone()], 1, 0.0, None, &[]).unwrap();
    assert_eq!(greedy.len(), 1);
    assert_eq!(greedy[0].label, 2);

    let hits = index.search(&[query], 2, 0.5, None, &[]).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].label, 2);
    assert_eq!(hits[1].label, 3);
    assert!(hits[0].distance <= hits[1].distance);
}

#[test]
fn remove_keeps_ids_dense() {
    let points = random_points(100, 8, 1);
    let mut index = build(&points, 8);
    assert!(index.remove(50));
    assert_eq!(index.len(), 99);
    assert!(!index.has_label(50));
    assert!(!index.remove(50));
    assert_regular(&index);
}

#[test]
fn filter_restricts_results() {
    init_tracing();
    let points = random_points(10, 4, 2);
    let mut index = build(&points, 4);
    let filter = VertexFilter::from_labels([1, 3, 5], 10);
    assert_eq!(filter.size(), 3);
    assert!((filter.inclusion_rate() - 0.3).abs() < 1e-6);

    let query = FeatureVector::from_f32s(&points[0]);
    let allowed: HashSet<u32> = [1, 3, 5].into_iter().collect();
    let hits = index
        .search(&[query.clone()], 10, 1.0, Some(&filter), &[1])
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().any(|h| h.label == 1));
    assert!(hits.iter().all(|h| allowed.contains(&h.label)));

    // force the exhaustive path
    index.set_search_config(SearchConfig {
        brute_force_rate: 0.5,
    });
    let scanned: HashSet<u32> = index
        .search(&[query], 10, 0.0, Some(&filter), &[])
        .unwrap()
        .into_iter()
        .map(|h| h.label)
        .collect();
    assert_eq!(scanned, allowed);
}

#[test]
fn filtered_walk_on_a_line_returns_admitted_labels() {
    init_tracing();
    let mut index = DEGIndex::new(Arc::new(FloatSpace::l2(1)), 2).unwrap();
    for i in 0..10u32 {
        index.add(i, FeatureVector::from_f32s(&[i as f32])).unwrap();
    }
    let filter = VertexFilter::from_labels([1, 3, 5], 10);
    let query = FeatureVector::from_f32s(&[2.0]);
    let hits = index
        .search(&[query], 3, 0.0, Some(&filter), &[1])
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| [1, 3, 5].contains(&h.label)));
    assert!([1, 3].contains(&hits[0].label));
    assert_eq!(hits[0].distance, 1.0);
}

#[test]
fn forbidden_labels_never_come_back() {
    let points = random_points(300, 8, 9);
    let index = build(&points, 8);
    let query = FeatureVector::from_f32s(&points[42]);
    let nearest: Vec<u32> = index
        .search(std::slice::from_ref(&query), 5, 0.2, None, &[42])
        .unwrap()
        .iter()
        .map(|h| h.label)
        .collect();
    assert_eq!(nearest[0], 42);

    let hits = index
        .search_excluding(&[query], 5, 0.2, None, &[42], &nearest[..3])
        .unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.iter().all(|h| !nearest[..3].contains(&h.label)));
}

// =============================================================================
// Larger builds
// =============================================================================

#[test]
fn degree_bound_holds_through_churn() {
    init_tracing();
    let points = random_points(300, 6, 3);
    let mut index = build(&points, 10);
    assert_regular(&index);
    assert!(is_connected(index.graph()));

    for label in (0..300u32).step_by(3) {
        assert!(index.remove(label));
        let graph = index.graph();
        for id in 0..graph.vertex_count() as u32 {
            assert!(graph.degree(id) <= 10);
        }
    }
    assert_eq!(index.len(), 200);
    assert_regular(&index);

    for label in (0..300u32).step_by(3) {
        index
            .add(label, FeatureVector::from_f32s(&points[label as usize]))
            .unwrap();
    }
    assert_eq!(index.len(), 300);
    assert_regular(&index);
}

#[test]
fn search_recall_on_random_data() {
    let points = random_points(1000, 8, 4);
    let index = build(&points, 16);
    let queries = random_points(20, 8, 5);

    let mut total = 0.0;
    for q in &queries {
        let q = FeatureVector::from_f32s(q);
        let truth = brute_force_knn(index.graph(), &q, 10);
        let found: Vec<u32> = index
            .search(std::slice::from_ref(&q), 10, 0.1, None, &[])
            .unwrap()
            .iter()
            .map(|h| h.label)
            .collect();
        total += recall_at_k(&truth, &found, 10);
    }
    let recall = total / queries.len() as f32;
    assert!(recall >= 0.85, "recall {recall}");
}

#[test]
fn improve_does_not_break_structure() {
    init_tracing();
    let points = random_points(200, 4, 6);
    let mut index = build(&points, 6);
    index.improve(100);
    assert_regular(&index);
}

#[test]
fn explore_returns_neighborhood() {
    let points = random_points(200, 4, 7);
    let index = build(&points, 8);
    let hits = index.explore(&[17], 8, 0.2, None).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.label != 17));
    let truth = brute_force_knn(index.graph(), index.feature(17).unwrap(), 9);
    let found: Vec<u32> = hits.iter().map(|h| h.label).collect();
    // truth includes the seed itself at distance 0
    assert!(recall_at_k(&truth[1..], &found, 8) >= 0.75);

    assert!(matches!(
        index.explore(&[9999], 8, 0.2, None),
        Err(DegError::SeedNotFound(_))
    ));
}

#[test]
fn byte_features() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut index = DEGIndex::new(Arc::new(ByteSpace::l2(16)), 6).unwrap();
    let points: Vec<Vec<u8>> = (0..150)
        .map(|_| (0..16).map(|_| rng.gen()).collect())
        .collect();
    for (label, p) in points.iter().enumerate() {
        index.add(label as u32, FeatureVector::from_u8s(p)).unwrap();
    }
    assert_regular(&index);
    let hits = index
        .search(&[FeatureVector::from_u8s(&points[42])], 10, 0.2, None, &[])
        .unwrap();
    assert_eq!(hits[0].label, 42);
    assert_eq!(hits[0].distance, 0.0);
}

#[test]
fn concurrent_readers() {
    let points = random_points(300, 4, 9);
    let index = Arc::new(build(&points, 8));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = Arc::clone(&index);
            let points = points.clone();
            std::thread::spawn(move || {
                let mut exact = 0;
                for label in (t..300).step_by(4) {
                    let q = FeatureVector::from_f32s(&points[label]);
                    let hits = index.search(&[q], 10, 0.2, None, &[]).unwrap();
                    if hits[0].label == label as u32 {
                        exact += 1;
                    }
                }
                exact
            })
        })
        .collect();
    let exact: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(exact >= 285, "{exact} of 300 found themselves");
}
