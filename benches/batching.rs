use arg_bilstm::{
    mappings::{Casing, Mapping},
    pipelines::token_classification::{
        batcher::{bucket_by_length, Batch, CharacterLookup, TokenBatcher},
        Indexed, SentenceRecord,
    },
};
use burn::{backend::NdArray, data::dataloader::batcher::Batcher};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn corpus(size: usize) -> Vec<SentenceRecord> {
    let mut rng = StdRng::seed_from_u64(11);

    (0..size)
        .map(|_| {
            let length = rng.gen_range(1..60);

            SentenceRecord {
                raw_tokens: (0..length).map(|i| format!("word{i}")).collect(),
                tokens: (0..length).map(|_| rng.gen_range(0..5_000)).collect(),
                casing: vec![4; length],
                ..Default::default()
            }
        })
        .collect()
}

fn bucketing(c: &mut Criterion) {
    let records = corpus(10_000);
    let lengths: Vec<usize> = records.iter().map(SentenceRecord::len).collect();

    c.bench_function("bucket 10k sentences", |b| {
        let mut rng = StdRng::seed_from_u64(0);
        b.iter(|| bucket_by_length(black_box(&lengths), 32, Some(&mut rng)))
    });
}

fn padding(c: &mut Criterion) {
    let records = corpus(512);
    let lengths: Vec<usize> = records.iter().map(SentenceRecord::len).collect();
    let buckets = bucket_by_length(&lengths, 32, None);

    let tokens: Mapping = (0..5_000).map(|i| (format!("w{i}"), i)).collect();
    let batcher = TokenBatcher::<NdArray>::new(
        tokens,
        Casing::mapping(),
        Some(CharacterLookup::new(Mapping::characters(), 25)),
        Default::default(),
    );

    c.bench_function("pad buckets with characters", |b| {
        b.iter(|| {
            for bucket in &buckets {
                let items = bucket
                    .iter()
                    .map(|&i| Indexed::new(i, records[i].clone()))
                    .collect();
                let batch: Batch<NdArray> = batcher.batch(items);
                black_box(batch);
            }
        })
    });
}

criterion_group!(benches, bucketing, padding);
criterion_main!(benches);
