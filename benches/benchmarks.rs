//! Benchmark suite for taskboard hot paths.
//!
//! This module provides performance benchmarks for:
//! - Plan parsing (checkbox extraction from large plans)
//! - Plan rewriting (marking every item complete)
//! - Fuzzy matching (todo text against plan titles)
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Save baseline for comparison
//! cargo bench -- --save-baseline main
//!
//! # Compare against baseline
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use taskboard::matcher::{find_best_match, score};
use taskboard::plan::{complete_all, parse_checkboxes};

/// Build a plan with `items` checkbox lines, every third one checked and
/// every fifth one nested.
fn make_plan(items: usize) -> String {
    let mut plan = String::from("# Implementation Plan\n\n");
    for i in 0..items {
        let indent = if i % 5 == 4 { "  " } else { "" };
        let marker = if i % 3 == 0 { 'x' } else { ' ' };
        plan.push_str(&format!(
            "{indent}- [{marker}] **Step {i} implement module {i}**: wire it up and cover it with tests\n"
        ));
    }
    plan
}

fn make_titles(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("Step {i} implement module {i}"))
        .collect()
}

// ============================================================================
// Plan Benchmarks
// ============================================================================

fn bench_parse_checkboxes(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_checkboxes");

    for size in [10, 100, 500] {
        let plan = make_plan(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &plan, |b, plan| {
            b.iter(|| parse_checkboxes(black_box(plan)));
        });
    }

    group.finish();
}

fn bench_complete_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("complete_all");

    for size in [100, 500] {
        let plan = make_plan(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &plan, |b, plan| {
            b.iter(|| complete_all(black_box(plan)));
        });
    }

    group.finish();
}

// ============================================================================
// Matcher Benchmarks
// ============================================================================

fn bench_score(c: &mut Criterion) {
    c.bench_function("matcher_score", |b| {
        b.iter(|| {
            score(
                black_box("implement the module 42 wiring"),
                black_box("Step 42 implement module 42"),
            )
        });
    });
}

fn bench_find_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_best_match");

    for size in [10, 100, 500] {
        let titles = make_titles(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &titles, |b, titles| {
            b.iter(|| find_best_match(black_box("step 7 implement modul 7"), titles));
        });
    }

    group.finish();
}

criterion_group!(plan_benches, bench_parse_checkboxes, bench_complete_all);
criterion_group!(matcher_benches, bench_score, bench_find_best_match);
criterion_main!(plan_benches, matcher_benches);
