// Copyright (C) 2021 Quentin Kniep <hello@quentinkniep.com>
// Distributed under terms of the MIT license.

use criterion::*;

use hypertree_mss::{verify_data, Params, SigningKey};

fn signing_key_keygen(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    c.bench_function("SigningKey (heights=[2,3,4]) - keygen at idx 0", |b| {
        b.iter(|| SigningKey::new(params.clone(), vec![5u8; 24], 0).unwrap())
    });
}

fn signing_key_sign(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    c.bench_function("SigningKey (heights=[2,3,4]) - sign_data, uncompressed", |b| {
        b.iter_batched(
            || SigningKey::new(params.clone(), vec![6u8; 24], 0).unwrap(),
            |mut key| key.sign_data(b"benchmark message", false).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn signing_key_sign_compressed(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    c.bench_function("SigningKey (heights=[2,3,4]) - sign_data, compressed", |b| {
        b.iter_batched(
            || SigningKey::new(params.clone(), vec![7u8; 24], 1).unwrap(),
            |mut key| key.sign_data(b"benchmark message", true).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn signing_key_verify(c: &mut Criterion) {
    let params = Params::new(24, 6, vec![2, 3, 4]).unwrap();
    let mut key = SigningKey::new(params.clone(), vec![8u8; 24], 0).unwrap();
    let sig = key.sign_data(b"benchmark message", false).unwrap();
    c.bench_function("verify_data (heights=[2,3,4])", |b| {
        b.iter(|| verify_data(&sig, b"benchmark message", &params).unwrap())
    });
}

criterion_group!(
    benches,
    signing_key_keygen,
    signing_key_sign,
    signing_key_sign_compressed,
    signing_key_verify
);
criterion_main!(benches);
