use std::sync::atomic::AtomicBool;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use fwlocate::catalog::BlockCatalog;
use fwlocate::catalog::author::describe_block;
use fwlocate::scanner::{BlockMatch, BlockScanner, FoundSet, MatchSink};

fn filler(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// `count` absent blocks spread over `sizes` distinct lengths.
fn catalog(count: usize, sizes: &[usize]) -> BlockCatalog {
    BlockCatalog::new(
        (0..count)
            .map(|idx| {
                let data = filler(sizes[idx % sizes.len()], 1000 + idx as u64);
                describe_block(&format!("block{idx}.bin"), &data[..]).expect("describe")
            })
            .collect(),
    )
}

struct Discard;

impl MatchSink for Discard {
    fn accept(&mut self, _hit: &BlockMatch<'_>) -> bool {
        true
    }
}

fn scan(catalog: &BlockCatalog, data: &[u8]) {
    let cancel = AtomicBool::new(false);
    let mut found = FoundSet::new(catalog.len());
    let mut scanner = BlockScanner::new(catalog, 64 * 1024);
    scanner
        .scan(data, &mut found, &cancel, &mut Discard)
        .expect("scan");
}

fn bench_throughput(c: &mut Criterion) {
    let data = filler(8 * 1024 * 1024, 7);
    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for sizes in [vec![4096usize], vec![512, 4096, 65536], vec![256, 1024, 4096, 16384, 65536, 262144]] {
        let catalog = catalog(40, &sizes);
        group.bench_with_input(
            BenchmarkId::new("distinct_sizes", sizes.len()),
            &catalog,
            |b, catalog| b.iter(|| scan(catalog, &data)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
