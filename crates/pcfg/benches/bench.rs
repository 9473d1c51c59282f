use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pcfg::{
    Function, GenerateOptions, Generator, Grammar, GuessGenerator, Mapping, PcfgQueue,
    Replacement, Section,
};
use std::{io, sync::Arc};

// Structures popped per benchmark iteration.
const STRUCTURES: usize = 4096;

/// A section of `n` ranked literal values with geometrically falling
/// probabilities, `per` values sharing each rank.
fn ranked(kind: &str, name: &str, n: usize, per: usize) -> Section {
    let replacements = (0..n)
        .map(|rank| {
            let probability = 0.5_f64.powi(rank as i32 + 1);
            let values = (0..per).map(|v| format!("{name}{rank}_{v}"));
            Replacement::terminal(probability, Function::Copy, values)
        })
        .collect();
    Section::new(kind, name, replacements)
}

/// `START -> D1 D2 | D2 S1 D1 | S1 D1 D1 D1`, wide enough that the
/// frontier grows into the thousands.
fn synthetic_grammar() -> Arc<Grammar> {
    let start = Section::new(
        "START",
        "Grammar",
        vec![
            Replacement::structural(0.5, Function::Transparent, ["D1D2"], [0, 1]),
            Replacement::structural(0.3, Function::Transparent, ["D2S1D1"], [1, 2, 0]),
            Replacement::structural(0.2, Function::Transparent, ["S1D1D1D1"], [2, 0, 0, 0]),
        ],
    );
    let sections = vec![
        ranked("BASE_D", "1", 40, 1),
        ranked("BASE_D", "2", 60, 4),
        ranked("BASE_S", "1", 20, 2),
        start,
    ];
    Arc::new(Grammar::from_parts("bench", sections, Mapping::default()).unwrap())
}

fn benchmark_queue(c: &mut Criterion) {
    let grammar = synthetic_grammar();
    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(STRUCTURES as u64));

    group.bench_function(format!("pop/{STRUCTURES}"), |b| {
        b.iter(|| {
            let mut queue = PcfgQueue::new(Arc::clone(&grammar)).unwrap();
            for _ in 0..STRUCTURES {
                black_box(queue.next().unwrap());
            }
        });
    });
    group.finish();
}

fn benchmark_expansion(c: &mut Criterion) {
    let grammar = synthetic_grammar();
    let mut queue = PcfgQueue::new(Arc::clone(&grammar)).unwrap();
    let trees: Vec<_> = (0..64)
        .filter_map(|_| queue.next().unwrap())
        .map(|item| item.tree)
        .collect();
    let total: u64 = trees
        .iter()
        .map(|t| GuessGenerator::new(&grammar, t).unwrap().guess_count())
        .sum();

    let mut group = c.benchmark_group("expansion");
    group.throughput(Throughput::Elements(total));
    group.bench_function("write_to/sink", |b| {
        b.iter(|| {
            for tree in &trees {
                let mut guesses = GuessGenerator::new(&grammar, tree).unwrap();
                black_box(guesses.write_to(&mut io::sink()).unwrap());
            }
        });
    });
    group.finish();
}

fn benchmark_local_run(c: &mut Criterion) {
    let grammar = synthetic_grammar();
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    let options = GenerateOptions {
        workers,
        max_guesses: 100_000,
    };

    let mut group = c.benchmark_group("generator");
    group.throughput(Throughput::Elements(options.max_guesses));
    group.sample_size(20);
    group.bench_function(format!("run/{workers}-workers"), |b| {
        b.iter(|| {
            let mut generator = Generator::new(Arc::clone(&grammar)).unwrap();
            black_box(generator.run(&options, |_| io::sink()).unwrap());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_queue,
    benchmark_expansion,
    benchmark_local_run
);
criterion_main!(benches);
