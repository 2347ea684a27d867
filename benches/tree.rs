use criterion::{criterion_group, criterion_main, Criterion};
use mvb_tree::{
    coding::{Codec, I32Codec},
    Config, MemoryPageStore, MvConfig,
};
use std::sync::Arc;

/// Pads values so leaves and inner nodes hold the same entry count.
struct PaddedI32Codec(usize);

impl Codec<i32> for PaddedI32Codec {
    fn encode_into(
        &self,
        item: &i32,
        writer: &mut dyn std::io::Write,
    ) -> Result<(), mvb_tree::coding::EncodeError> {
        I32Codec.encode_into(item, writer)
    }

    fn decode_from(
        &self,
        reader: &mut dyn std::io::Read,
    ) -> Result<i32, mvb_tree::coding::DecodeError> {
        I32Codec.decode_from(reader)
    }

    fn max_size(&self) -> usize {
        self.0
    }
}

fn bplus_tree(c: &mut Criterion) {
    c.bench_function("b+tree insert 1k", |b| {
        b.iter(|| {
            let mut tree = mvb_tree::BPlusTree::new(
                Config::new(4_096),
                MemoryPageStore::new(),
                Arc::new(I32Codec),
                Arc::new(PaddedI32Codec(12)),
                Arc::new(|v: &i32| *v),
            )
            .expect("layout must fit");

            for key in 0..1_000 {
                tree.insert((key * 7) % 1_000).expect("unique keys");
            }

            tree
        });
    });

    c.bench_function("b+tree scan 1k", |b| {
        let mut tree = mvb_tree::BPlusTree::new(
            Config::new(4_096),
            MemoryPageStore::new(),
            Arc::new(I32Codec),
            Arc::new(PaddedI32Codec(12)),
            Arc::new(|v: &i32| *v),
        )
        .expect("layout must fit");

        for key in 0..1_000 {
            tree.insert((key * 7) % 1_000).expect("unique keys");
        }

        b.iter(|| {
            tree.scan(0, 1_000)
                .collect::<mvb_tree::Result<Vec<_>>>()
                .expect("scan")
        });
    });
}

fn mv_tree(c: &mut Criterion) {
    let open = || {
        mvb_tree::MvTree::new(
            MvConfig::new(4_096, i32::MIN),
            MemoryPageStore::new(),
            MemoryPageStore::new(),
            Arc::new(I32Codec),
            Arc::new(PaddedI32Codec(28)),
            Arc::new(|v: &i32| *v),
        )
        .expect("layout must fit")
    };

    c.bench_function("mv-tree versioned insert 1k", |b| {
        b.iter(|| {
            let mut tree = open();

            for version in 0..1_000_u64 {
                let key = i32::try_from((version * 7) % 1_000).expect("fits");
                tree.insert(version + 1, key).expect("insert");
            }

            tree
        });
    });

    c.bench_function("mv-tree time travel 1k", |b| {
        let mut tree = open();

        for version in 0..1_000_u64 {
            let key = i32::try_from((version * 7) % 1_000).expect("fits");
            tree.insert(version + 1, key).expect("insert");
        }
        for version in 0..500_u64 {
            let key = i32::try_from((version * 13) % 1_000).expect("fits");
            tree.remove(1_000 + version, &key).expect("remove");
        }

        b.iter(|| {
            tree.range_period(0, 1_000, 1, 1_500)
                .collect::<mvb_tree::Result<Vec<_>>>()
                .expect("time travel")
        });
    });
}

criterion_group!(benches, bplus_tree, mv_tree);
criterion_main!(benches);
