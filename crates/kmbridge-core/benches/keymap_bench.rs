//! Criterion benchmarks for key code translation.
//!
//! Measures the latency of every resolution path (raw integer, prefixed
//! string, bare name with alias) and the VK↔HID cross tables.  Key lookups
//! sit on the hot path of trigger and hotkey polling, so each should stay
//! well under a microsecond.
//!
//! Run with:
//! ```bash
//! cargo bench --package kmbridge-core --bench keymap_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kmbridge_core::keymap::{KeyMapper, KeyRef};

// ── Representative inputs ─────────────────────────────────────────────────────

/// Inputs in every spelling callers use.
fn bench_inputs() -> Vec<(&'static str, KeyRef)> {
    vec![
        ("int", KeyRef::from(0x41)),
        ("vk_prefixed", KeyRef::from("VK_SHIFT")),
        ("hid_prefixed", KeyRef::from("HID:0x04")),
        ("name", KeyRef::from("A")),
        ("alias", KeyRef::from("ctrl")),
        ("function", KeyRef::from("F12")),
        ("unknown", KeyRef::from("NOT_A_KEY")),
    ]
}

/// VK codes covering letters, digits, modifiers, arrows and an unmapped code.
const BENCH_VK_CODES: &[u32] = &[
    0x41, // 'A'
    0x5A, // 'Z'
    0x0D, // VK_RETURN
    0x1B, // VK_ESCAPE
    0x70, // VK_F1
    0xA0, // VK_LSHIFT
    0x25, // VK_LEFT
    0x31, // '1'
    0xFF, // No mapping
];

// ── Benchmarks: resolution ────────────────────────────────────────────────────

fn bench_to_vk(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_to_vk");
    for (label, key) in bench_inputs() {
        group.bench_with_input(BenchmarkId::new("to_vk", label), &key, |b, key| {
            b.iter(|| KeyMapper::to_vk(black_box(key)))
        });
    }
    group.finish();
}

fn bench_to_hid(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_to_hid");
    for (label, key) in bench_inputs() {
        group.bench_with_input(BenchmarkId::new("to_hid", label), &key, |b, key| {
            b.iter(|| KeyMapper::to_hid(black_box(key)))
        });
    }
    group.finish();
}

fn bench_to_symbolic_token(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_token");
    let key = KeyRef::from("esc");
    group.bench_function("to_symbolic_token_alias", |b| {
        b.iter(|| KeyMapper::to_symbolic_token(black_box(&key)))
    });
    group.finish();
}

// ── Benchmarks: cross tables ──────────────────────────────────────────────────

fn bench_cross_tables(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_cross");

    group.bench_function("vk_to_hid_batch", |b| {
        b.iter(|| {
            BENCH_VK_CODES
                .iter()
                .map(|&vk| KeyMapper::vk_to_hid(black_box(vk)))
                .collect::<Vec<_>>()
        })
    });

    // HID→VK is a linear scan; the last table entry is the worst case.
    group.bench_with_input(BenchmarkId::new("hid_to_vk", "KeyA"), &0x04u32, |b, &hid| {
        b.iter(|| KeyMapper::hid_to_vk(black_box(hid)))
    });
    group.bench_with_input(BenchmarkId::new("hid_to_vk", "F24"), &0x73u32, |b, &hid| {
        b.iter(|| KeyMapper::hid_to_vk(black_box(hid)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_to_vk,
    bench_to_hid,
    bench_to_symbolic_token,
    bench_cross_tables,
);
criterion_main!(benches);
