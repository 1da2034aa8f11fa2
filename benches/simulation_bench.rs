//! Performance benchmarks for the pulsim simulation core.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench simulation_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pulsim::cells::{io, sfq};
use pulsim::circuit::{Circuit, SourceSchedule};
use pulsim::config::SimulationParams;
use pulsim::event::EventTarget;
use pulsim::parallel::run_batch;
use pulsim::queue::EventQueue;
use pulsim::registry::{create_default_library, CellParams};
use pulsim::types::{CellId, WireId};
use pulsim::Simulator;

// ============================================================================
// Benchmark Circuits
// ============================================================================

/// A source feeding `length` JTLs into a sink.
fn jtl_chain(length: usize, pulses: usize) -> Circuit {
    let mut c = Circuit::new();
    let src = c.add_source("in", io::periodic(0, 100, pulses)).unwrap();
    let q = c.output(src, "q").unwrap();
    let end = sfq::jtl_chain(&mut c, q, length).unwrap();
    let sink = c.add_sink("out").unwrap();
    c.connect(end, c.input(sink, "a").unwrap()).unwrap();
    c.mark_sink(sink).unwrap();
    c
}

/// A source fanned out to `leaves` sinks through a splitter tree.
fn splitter_tree(leaves: usize, pulses: usize) -> Circuit {
    let mut c = Circuit::new();
    let src = c.add_source("in", io::periodic(0, 100, pulses)).unwrap();
    let q = c.output(src, "q").unwrap();
    for (i, port) in sfq::split(&mut c, q, leaves).unwrap().into_iter().enumerate() {
        let sink = c.add_sink(&format!("out{}", i)).unwrap();
        c.connect(port, c.input(sink, "a").unwrap()).unwrap();
        c.mark_sink(sink).unwrap();
    }
    c
}

/// Toggle flip-flops in series: a ripple counter of `bits` stages.
fn ripple_counter(bits: usize, pulses: usize) -> Circuit {
    let library = create_default_library();
    let mut c = Circuit::new();
    let src = c.add_source("in", io::periodic(0, 200, pulses)).unwrap();
    let mut port = c.output(src, "q").unwrap();
    for i in 0..bits {
        let t = library
            .instantiate(&mut c, "TFF", &format!("t{}", i), &CellParams::new())
            .unwrap();
        c.connect(port, c.input(t, "a").unwrap()).unwrap();
        port = c.output(t, "q").unwrap();
    }
    let sink = c.add_sink("out").unwrap();
    c.connect(port, c.input(sink, "a").unwrap()).unwrap();
    c
}

// ============================================================================
// Simulator Benchmarks
// ============================================================================

fn bench_jtl_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("jtl_chain");

    for length in [10, 100, 1000].iter() {
        let circuit = jtl_chain(*length, 10);
        group.throughput(Throughput::Elements((*length * 10) as u64));
        group.bench_with_input(BenchmarkId::new("cells", length), &circuit, |b, circuit| {
            b.iter(|| {
                let trace = Simulator::new(circuit).run(None).unwrap();
                black_box(trace.stats.events_processed)
            });
        });
    }

    group.finish();
}

fn bench_splitter_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("splitter_tree");

    for leaves in [8, 64, 512].iter() {
        let circuit = splitter_tree(*leaves, 10);
        group.throughput(Throughput::Elements((*leaves * 10) as u64));
        group.bench_with_input(BenchmarkId::new("leaves", leaves), &circuit, |b, circuit| {
            b.iter(|| {
                let trace = Simulator::new(circuit).run(None).unwrap();
                black_box(trace.pulse_count())
            });
        });
    }

    group.finish();
}

fn bench_ripple_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("ripple_counter");

    for pulses in [100, 1000, 10000].iter() {
        let circuit = ripple_counter(8, *pulses);
        group.throughput(Throughput::Elements(*pulses as u64));
        group.bench_with_input(BenchmarkId::new("pulses", pulses), &circuit, |b, circuit| {
            b.iter(|| {
                let trace = Simulator::new(circuit).run(None).unwrap();
                black_box(trace.stats.final_time)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Batch Benchmarks
// ============================================================================

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let circuit = jtl_chain(100, 10);
    let src = circuit.cell_by_name("in").unwrap();
    let schedules: Vec<_> = (0..32)
        .map(|i| SourceSchedule::new().with(src, io::periodic(i, 100, 10)))
        .collect();
    let params = SimulationParams::default();

    group.throughput(Throughput::Elements(schedules.len() as u64));
    group.bench_function(
        if cfg!(feature = "parallel") { "parallel" } else { "sequential" },
        |b| {
            b.iter(|| black_box(run_batch(&circuit, &schedules, &params).len()));
        },
    );

    group.finish();
}

// ============================================================================
// Event Queue Benchmarks
// ============================================================================

fn bench_event_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue");

    for num_events in [1000, 10000, 100000].iter() {
        group.throughput(Throughput::Elements(*num_events as u64));

        group.bench_with_input(
            BenchmarkId::new("schedule_pop", num_events),
            num_events,
            |b, &n| {
                b.iter(|| {
                    let mut queue = EventQueue::new();
                    for i in 0..n {
                        // scatter times so the heap does real work
                        let time = (i as u64).wrapping_mul(7919) % (n as u64);
                        queue.schedule(time, EventTarget::Observe { wire: WireId(i % 16) });
                    }
                    let mut last = 0;
                    while let Some(e) = queue.pop() {
                        last = e.time;
                    }
                    black_box(last)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("same_instant", num_events),
            num_events,
            |b, &n| {
                b.iter(|| {
                    let mut queue = EventQueue::new();
                    for i in 0..n {
                        queue.schedule(0, EventTarget::Evaluate { cell: CellId(i % 16) });
                    }
                    black_box(queue.drain_ordered().len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_jtl_chain,
    bench_splitter_tree,
    bench_ripple_counter,
    bench_batch,
    bench_event_queue,
);

criterion_main!(benches);
