// Copyright (C) 2021 Quentin Kniep <hello@quentinkniep.com>
// Distributed under terms of the MIT license.

use criterion::*;

use hypertree_mss::ots::OtsKey;
use hypertree_mss::params::Params;

fn ots_keygen(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    c.bench_function("OTS (hashlen=24, otsbits=6) - derive", |b| {
        b.iter(|| OtsKey::new(&params, b"bench-levelsalt-0000000", &[7u8; 24], 0).unwrap())
    });
}

fn ots_pubkey(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    c.bench_function("OTS (hashlen=24, otsbits=6) - pubkey", |b| {
        b.iter_batched(
            || OtsKey::new(&params, b"bench-levelsalt-0000000", &[7u8; 24], 0).unwrap(),
            |mut key| key.pubkey().to_vec(),
            BatchSize::SmallInput,
        )
    });
}

fn ots_sign(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    let key = OtsKey::new(&params, b"bench-levelsalt-0000000", &[7u8; 24], 0).unwrap();
    let digest = [9u8; 24];
    c.bench_function("OTS (hashlen=24, otsbits=6) - sign_hash", |b| {
        b.iter(|| key.sign_hash(&digest).unwrap())
    });
}

criterion_group!(benches, ots_keygen, ots_pubkey, ots_sign);
criterion_main!(benches);
