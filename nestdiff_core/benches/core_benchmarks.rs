use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nestdiff_common::{AppConfig, NoiseConfig, TreeSnapshot};
use nestdiff_core::{diff_snapshots, FileClassifier, SnapshotScanner};
use std::fs;
use std::io::Write as IoWrite;
use std::path::Path;
use tempfile::TempDir;

// Helper to create test directory structure
fn create_test_tree(root: &Path, depth: usize, files_per_dir: usize, file_size: usize) {
    if depth == 0 {
        return;
    }

    for i in 0..files_per_dir {
        let file_path = root.join(format!("file_{}.txt", i));
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(&vec![b'x'; file_size]).unwrap();
    }

    if depth > 1 {
        for i in 0..3 {
            let dir_path = root.join(format!("subdir_{}", i));
            fs::create_dir(&dir_path).unwrap();
            create_test_tree(&dir_path, depth - 1, files_per_dir, file_size);
        }
    }
}

// Snapshot where every tenth file changed size and every twentieth is new
fn snapshot_pair(count: usize) -> (TreeSnapshot, TreeSnapshot) {
    let old: TreeSnapshot = (0..count)
        .map(|i| (format!("sources/pkg_{}/File{}.java", i % 50, i), 1024))
        .collect();
    let new: TreeSnapshot = (0..count)
        .map(|i| {
            let size = if i % 10 == 0 { 2048 } else { 1024 };
            let name = if i % 20 == 0 {
                format!("sources/pkg_{}/New{}.java", i % 50, i)
            } else {
                format!("sources/pkg_{}/File{}.java", i % 50, i)
            };
            (name, size)
        })
        .collect();
    (old, new)
}

fn bench_snapshot(c: &mut Criterion) {
    c.bench_function("snapshot_medium_tree_100_files", |b| {
        let temp = TempDir::new().unwrap();
        create_test_tree(temp.path(), 2, 25, 1024);
        let scanner = SnapshotScanner::new(&AppConfig::default());

        b.iter(|| {
            let snapshot = scanner.snapshot(black_box(temp.path())).unwrap();
            black_box(snapshot);
        });
    });
}

fn bench_diff_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_snapshots");

    for count in [100, 1_000, 10_000] {
        let (old, new) = snapshot_pair(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let changes = diff_snapshots(black_box(Some(&old)), black_box(&new));
                black_box(changes);
            });
        });
    }

    group.finish();
}

fn bench_classifier(c: &mut Criterion) {
    let classifier = FileClassifier::new(&NoiseConfig::default()).unwrap();
    let paths = [
        "sources/androidx/core/app/NotificationCompat.java",
        "sources/com/winlator/MainActivity.java",
        "resources/res/layout/main.xml",
        "lib/arm64-v8a/libwinlator.so",
        "resources/META-INF/MANIFEST.MF",
    ];

    c.bench_function("classifier_is_noise", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(classifier.is_noise(black_box(path)));
            }
        });
    });
}

criterion_group!(benches, bench_snapshot, bench_diff_snapshots, bench_classifier);
criterion_main!(benches);
