use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vcf_engine::{Engine, Filter, Genotype, OutputMode, Region, VarType, Variant};

const GENOTYPES: [&str; 6] = ["0/0", "0/1", "1/1", "./.", "0|1", "1/2"];

fn synthetic(n_records: usize, n_samples: usize) -> Engine {
    let samples: Vec<String> = (0..n_samples).map(|i| format!("sample{}", i)).collect();
    let records = (0..n_records)
        .map(|i| {
            let (reference, alts): (&str, &[&str]) = match i % 4 {
                0 => ("A", &["T"]),
                1 => ("AT", &["A"]),
                2 => ("G", &["C", "T"]),
                _ => ("C", &["<DEL>"]),
            };
            let genotypes = (0..n_samples)
                .map(|s| {
                    let gt: Genotype = GENOTYPES[(i + s) % GENOTYPES.len()].parse().unwrap();
                    if (i * s) % 7 == 0 {
                        gt.with_filter_tags(["DP5"])
                    } else {
                        gt
                    }
                })
                .collect();
            Variant::new("1", 100 + 10 * i as u64, reference, alts.iter().copied())
                .with_genotypes(genotypes)
        })
        .collect();
    Engine::from_records(records, samples).unwrap()
}

fn benchmark_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    for &n in &[1_000usize, 10_000] {
        let engine = synthetic(n, 32);
        let region = Region::new("1", 1_000, 50_000).unwrap();
        group.bench_with_input(BenchmarkId::new("region", n), &engine, |b, engine| {
            b.iter(|| engine.filter_region(black_box(&region)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("filter_tags", n), &engine, |b, engine| {
            b.iter(|| engine.filter_tags(["DP5"]).unwrap())
        });
        let combined = Filter::new()
            .region(region.clone())
            .vartypes([VarType::Snp, VarType::Indel])
            .max_alleles(1);
        group.bench_with_input(BenchmarkId::new("combined", n), &engine, |b, engine| {
            b.iter(|| engine.filter(black_box(&combined)).unwrap())
        });
    }
}

fn benchmark_matrices(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let engine = synthetic(5_000, 64);
    for mode in [OutputMode::Raw, OutputMode::Summary] {
        group.bench_with_input(
            BenchmarkId::new(mode.to_string(), 5_000),
            &engine,
            |b, engine| b.iter(|| engine.extract(black_box(mode)).unwrap()),
        );
    }
}

criterion_group!(benches, benchmark_filters, benchmark_matrices);
criterion_main!(benches);
