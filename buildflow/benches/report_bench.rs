//! Benchmarks for report aggregation.

use buildflow::core::StepType;
use buildflow::report::Report;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn filled_report(configs: usize, items: usize) -> Report {
    let report = Report::new();
    for step in StepType::ALL {
        for config_index in 0..configs {
            for item_index in 0..items {
                let slot = report.new_report(step, config_index, item_index);
                let mut result = slot.lock();
                result.add_log("Copied 120 files");
                if config_index % 7 == 0 {
                    result.set_failed("Destination failed: HTTP 503");
                }
            }
        }
    }
    report
}

fn report_benchmark(c: &mut Criterion) {
    let report = filled_report(32, 4);

    c.bench_function("report_successful", |b| b.iter(|| black_box(report.successful())));
    c.bench_function("report_failures", |b| b.iter(|| black_box(report.failures().len())));
    c.bench_function("report_snapshot", |b| b.iter(|| black_box(report.snapshot().steps.len())));
}

criterion_group!(benches, report_benchmark);
criterion_main!(benches);
