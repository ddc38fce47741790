//! Benchmarks for cluster extraction and cross-validated training

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point3;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use memwave_core::config::{ClassifierConfig, ClusterConfig};
use memwave_core::types::{
    Electrode, ElectrodeType, Event, EventTable, FeatureMatrix, FeatureSet, FeatureShape, TaskPhase,
};
use memwave_native::classify::{ClassifierTrainer, CrossValidationPlan};
use memwave_native::cluster::{ClusterExtractor, SpectralPeaks};

/// Electrodes on a 5 mm grid with random peaks between 2 and 20 Hz
fn synthetic_montage(n: usize, rng: &mut ChaCha8Rng) -> (Vec<Electrode>, SpectralPeaks) {
    let side = (n as f64).sqrt().ceil() as usize;
    let electrodes = (0..n)
        .map(|i| {
            let (row, col) = (i / side, i % side);
            Electrode::new(
                format!("G{i}"),
                ElectrodeType::Grid,
                Point3::new(5.0 * col as f64 + 1.0, 5.0 * row as f64, 0.0),
            )
        })
        .collect();

    let freqs: Vec<f64> = (0..80).map(|i| 2.0 + 0.25 * f64::from(i)).collect();
    let flags = Array2::from_shape_fn((freqs.len(), n), |_| rng.gen_bool(0.04));
    let peaks = SpectralPeaks::new(freqs, flags).expect("valid peaks");
    (electrodes, peaks)
}

/// Two or three sessions of encoding events with one informative feature
fn synthetic_subject(sessions: u32, n_features: usize, rng: &mut ChaCha8Rng) -> FeatureSet {
    let per_session = 120;
    let n = sessions as usize * per_session;
    let mut events = Vec::with_capacity(n);
    let mut data = Array2::zeros((n, n_features));
    for i in 0..n {
        let recalled = rng.gen_bool(0.3);
        for j in 0..n_features {
            data[[i, j]] = rng.gen_range(-1.0..1.0) + if j == 0 && recalled { 1.0 } else { 0.0 };
        }
        events.push(Event {
            session: (i / per_session) as u32,
            list: ((i % per_session) / 12) as i32,
            phase: TaskPhase::Encoding,
            recalled,
            reaction_time: None,
            performance: None,
        });
    }
    let features = FeatureMatrix::new(data, FeatureShape::new(n_features, 1)).expect("valid features");
    FeatureSet::new(features, EventTable::new(events), vec![8.0; 1]).expect("valid set")
}

fn bench_cluster_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_extraction");
    let extractor = ClusterExtractor::new(ClusterConfig::default()).expect("default config");

    for n in [32, 64, 128] {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (electrodes, peaks) = synthetic_montage(n, &mut rng);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(extractor.run(black_box(&electrodes), black_box(&peaks))));
        });
    }

    group.finish();
}

fn bench_cross_validated_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validated_training");
    group.sample_size(10);

    for (sessions, c_values) in [(2, vec![7.2e-4]), (3, vec![1e-3, 1e-2, 1e-1, 1.0])] {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let set = synthetic_subject(sessions, 64, &mut rng);
        let trainer = ClassifierTrainer::new(ClassifierConfig {
            c_values: c_values.clone(),
            ..ClassifierConfig::default()
        })
        .expect("valid config");
        let plan = CrossValidationPlan::build(set.events(), &[TaskPhase::Encoding], &[TaskPhase::Encoding])
            .expect("plan");

        let label = format!("{sessions}sess_{}c", c_values.len());
        group.bench_function(label, |b| {
            b.iter(|| black_box(trainer.train(black_box(&set), &plan)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cluster_extraction, bench_cross_validated_training);

criterion_main!(benches);
