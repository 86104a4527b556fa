use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use ambex_logging::AsyncCsvLogger;

/// Column layout of the high-frequency movement log, which fills rows at
/// headset frame rate and must never block on the disk.
fn movement_columns() -> Vec<String> {
    let mut columns: Vec<String> = ["ParticipantID", "MeasurementID", "SystemClockTimestampMs"]
        .map(String::from)
        .to_vec();
    for prefix in ["Head", "NeckBase", "DominantPalmCenter", "ActiveTarget"] {
        for suffix in [
            "PositionX",
            "PositionY",
            "PositionZ",
            "QuaternionX",
            "QuaternionY",
            "QuaternionZ",
            "QuaternionW",
        ] {
            columns.push(format!("{prefix}{suffix}"));
        }
    }
    columns
}

fn prepare_logger() -> AsyncCsvLogger {
    let dir = std::env::temp_dir().join(format!("ambex-bench-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bench_rows.csv");
    let _ = std::fs::remove_file(&path);
    let mut logger = AsyncCsvLogger::new(path).unwrap();
    logger.add_columns(movement_columns()).unwrap();
    logger.initialise().unwrap();
    logger
}

pub fn bench_fill_and_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_and_queue");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));

    group.bench_function("movement_row", |b| {
        let mut logger = prepare_logger();
        let columns = movement_columns();
        let mut frame = 0i64;
        b.iter(|| {
            frame += 1;
            for (i, column) in columns.iter().enumerate() {
                logger
                    .set_column_value(column, black_box(frame as f64 + i as f64 * 0.25))
                    .unwrap();
            }
            logger.log_and_clear().unwrap();
            // keep the queue bounded so memory stays flat across samples
            if frame % 4096 == 0 {
                logger.clear_unsaved_data();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fill_and_queue);
criterion_main!(benches);
