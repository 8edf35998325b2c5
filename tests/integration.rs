//! End-to-end pipeline tests: CSV inputs through loading, clustering,
//! validation, and dual-output persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use agrupar::prelude::*;

/// Makes the engine's phase logging visible under `RUST_LOG`.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes a store×feature CSV with `per_blob` stores around each of
/// `n_blobs` feature-space centers. Returns the path.
fn write_matrix_csv(
    dir: &tempfile::TempDir,
    name: &str,
    n_blobs: usize,
    per_blob: usize,
    n_features: usize,
    seed: u64,
) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..n_blobs)
        .map(|_| (0..n_features).map(|_| rng.gen_range(0.0..10.0)).collect())
        .collect();

    let path = dir.path().join(name);
    let mut file = fs::File::create(&path).unwrap();
    write!(file, "store_id").unwrap();
    for j in 0..n_features {
        write!(file, ",feat_{j:03}").unwrap();
    }
    writeln!(file).unwrap();

    for blob in 0..n_blobs {
        for i in 0..per_blob {
            let store = blob * per_blob + i;
            write!(file, "S{store:05}").unwrap();
            for value in &centers[blob] {
                let noise: f32 = rng.gen_range(-0.3..0.3);
                write!(file, ",{:.4}", value + noise).unwrap();
            }
            writeln!(file).unwrap();
        }
    }
    path
}

fn bounds_check(sizes: &BTreeMap<usize, usize>, min: usize, max: usize) {
    let oversized: Vec<_> = sizes.iter().filter(|&(_, &s)| s > max).collect();
    assert!(oversized.is_empty(), "oversized clusters: {oversized:?}");
    let undersized = sizes.values().filter(|&&s| s < min).count();
    assert!(undersized <= 1, "too many undersized clusters: {sizes:?}");
}

#[test]
fn end_to_end_csv_pipeline() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    // 260 stores x 12 features in 5 sales blobs; 260 % 50 != 0, so one
    // remainder cluster is legitimate.
    let norm = write_matrix_csv(&dir, "normalized.csv", 5, 52, 12, 7);
    let orig = write_matrix_csv(&dir, "original.csv", 5, 52, 12, 7);

    let inputs = MatrixLoader::new(&norm, &orig).load().unwrap();
    assert_eq!(inputs.normalized.n_stores(), 260);

    let engine = SegmentationEngine::new(SegmentationConfig::default().with_components(6));
    let outcome = engine.run(&inputs).unwrap();

    // Totality: every store labeled exactly once.
    assert_eq!(outcome.labels.len(), 260);
    assert!(outcome
        .assignments
        .records()
        .iter()
        .all(|r| r.cluster.is_some()));

    // ceil(260 / 50) initial clusters; merges may reduce but several must
    // survive the bounds.
    let sizes = outcome.assignments.cluster_sizes();
    assert!(sizes.len() >= 4, "sizes = {sizes:?}");
    bounds_check(&sizes, 30, 60);

    // Persist and verify the dual-output layout.
    let mut writer = OutputWriter::new(dir.path().join("out"), "2026Q3");
    engine.persist(&inputs, &outcome, &mut writer).unwrap();
    assert_eq!(writer.registry().len(), 3);

    for record in writer.registry() {
        let primary = fs::read_to_string(&record.path).unwrap();
        let period = fs::read_to_string(&record.period_path).unwrap();
        let latest = fs::read_to_string(&record.latest_path).unwrap();
        assert_eq!(primary, period, "{}: period copy differs", record.key);
        assert_eq!(primary, latest, "{}: latest copy differs", record.key);
    }

    // Legacy and canonical label columns carry identical values.
    let assignments = fs::read_to_string(
        dir.path().join("out").join("cluster_assignments_latest.csv"),
    )
    .unwrap();
    let mut lines = assignments.lines();
    assert_eq!(lines.next().unwrap(), "store_id,cluster,cluster_id");
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields[1], fields[2], "mismatch in {line}");
    }
}

#[test]
fn pipeline_is_deterministic() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let norm = write_matrix_csv(&dir, "normalized.csv", 3, 40, 8, 21);
    let orig = write_matrix_csv(&dir, "original.csv", 3, 40, 8, 21);
    let inputs = MatrixLoader::new(&norm, &orig).load().unwrap();

    let config = SegmentationConfig::default()
        .with_bounds(SizeBounds::new(20, 40, 50).unwrap())
        .with_components(4)
        .with_seed(99);
    let engine = SegmentationEngine::new(config);

    let first = engine.run(&inputs).unwrap();
    let second = engine.run(&inputs).unwrap();
    assert_eq!(first.labels, second.labels);
    assert_eq!(
        first.assignments.cluster_sizes(),
        second.assignments.cluster_sizes()
    );
}

#[test]
fn temperature_bands_stay_pure() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let norm = write_matrix_csv(&dir, "normalized.csv", 4, 30, 8, 3);
    let orig = write_matrix_csv(&dir, "original.csv", 4, 30, 8, 3);

    // Stores below S00060 are Cold, the rest Warm; uses the legacy
    // "store_code" header alias.
    let temp_path = dir.path().join("temperature.csv");
    let mut file = fs::File::create(&temp_path).unwrap();
    writeln!(file, "store_code,temperature_band").unwrap();
    for store in 0..120 {
        let band = if store < 60 { "Cold" } else { "Warm" };
        writeln!(file, "S{store:05},{band}").unwrap();
    }

    let inputs = MatrixLoader::new(&norm, &orig)
        .with_temperature(&temp_path)
        .load()
        .unwrap();
    assert!(inputs.has_temperature());

    let config = SegmentationConfig::default()
        .with_bounds(SizeBounds::new(15, 30, 40).unwrap())
        .with_min_stores(60)
        .with_components(4);
    let outcome = SegmentationEngine::new(config).run(&inputs).unwrap();
    assert!(outcome.regrouped);

    let bands = inputs.temperature.as_ref().unwrap();
    let mut cluster_band: BTreeMap<usize, &str> = BTreeMap::new();
    for (row, id) in inputs.normalized.store_ids().iter().enumerate() {
        let band = bands[id].as_str();
        if let Some(prev) = cluster_band.insert(outcome.labels[row], band) {
            assert_eq!(prev, band, "cluster {} mixes bands", outcome.labels[row]);
        }
    }
}

#[test]
fn missing_normalized_matrix_fails_fast() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let orig = write_matrix_csv(&dir, "original.csv", 2, 10, 4, 1);
    let err = MatrixLoader::new(dir.path().join("absent.csv"), &orig)
        .load()
        .unwrap_err();
    assert!(matches!(err, AgruparError::MissingInput { .. }));
}

/// Full-size scenario from the business requirements: 2,260 stores x
/// 1,000 features, target 50, bounds [30, 60]. Slow; run with
/// `cargo test -- --ignored`.
#[test]
#[ignore]
fn full_scale_scenario() {
    init_logs();
    let mut rng = StdRng::seed_from_u64(2260);
    let n_stores = 2260;
    let n_features = 1000;
    let n_blobs = 45;

    let centers: Vec<Vec<f32>> = (0..n_blobs)
        .map(|_| (0..n_features).map(|_| rng.gen_range(0.0..1.0)).collect())
        .collect();
    let mut ids = Vec::with_capacity(n_stores);
    let mut data = Vec::with_capacity(n_stores * n_features);
    for store in 0..n_stores {
        ids.push(format!("S{store:05}"));
        let center = &centers[store % n_blobs];
        for value in center {
            data.push(value + rng.gen_range(-0.05..0.05));
        }
    }
    let matrix = Matrix::from_vec(n_stores, n_features, data).unwrap();
    let names: Vec<String> = (0..n_features).map(|j| format!("feat_{j:04}")).collect();
    let frame = StoreFrame::new(ids, names, matrix).unwrap();
    let inputs = LoadedInputs {
        normalized: frame.clone(),
        original: frame,
        temperature: None,
    };

    let outcome = SegmentationEngine::new(SegmentationConfig::default())
        .run(&inputs)
        .unwrap();

    assert_eq!(outcome.labels.len(), n_stores);
    let sizes = outcome.assignments.cluster_sizes();
    assert!(sizes.len() >= 40, "only {} clusters", sizes.len());
    bounds_check(&sizes, 30, 60);
}
