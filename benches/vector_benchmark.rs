// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arena_hamt::{Arena, ArenaConfig, Vector};

const ITEM_COUNT: u32 = 4000;

fn push(c: &mut Criterion) {
    c.bench_function("Vector bulk push", |b| {
        b.iter(|| {
            let mut arena = Arena::new(ArenaConfig::default());
            let mut v = Vector::empty();
            for i in 0..black_box(ITEM_COUNT) {
                v = v.push(&mut arena, black_box(i as f64)).unwrap();
            }
            black_box(v);
        })
    });
}

fn get(c: &mut Criterion) {
    let mut arena = Arena::new(ArenaConfig::default());
    let mut v = Vector::empty();
    for i in 0..ITEM_COUNT {
        v = v.push(&mut arena, i as f64).unwrap();
    }

    c.bench_function("Vector sequential get", |b| {
        b.iter(|| {
            let mut sum = 0.0f64;
            for i in 0..black_box(ITEM_COUNT) {
                sum += v.get(&arena, i).unwrap();
            }
            black_box(sum);
        })
    });
}

fn set(c: &mut Criterion) {
    let mut arena = Arena::new(ArenaConfig::default());
    let mut v = Vector::empty();
    for i in 0..ITEM_COUNT {
        v = v.push(&mut arena, i as f64).unwrap();
    }

    c.bench_function("Vector sequential set", |b| {
        b.iter(|| {
            let mut cur = v;
            for i in 0..black_box(ITEM_COUNT) {
                cur = cur.set(&mut arena, i, black_box(i as f64) * 2.0).unwrap();
            }
            black_box(cur);
        })
    });
}

fn pop(c: &mut Criterion) {
    let mut arena = Arena::new(ArenaConfig::default());
    let mut v = Vector::empty();
    for i in 0..ITEM_COUNT {
        v = v.push(&mut arena, i as f64).unwrap();
    }

    c.bench_function("Vector draining pop", |b| {
        b.iter(|| {
            let mut cur = v;
            for _ in 0..black_box(ITEM_COUNT) {
                let (next, popped) = cur.pop(&mut arena).unwrap();
                cur = next;
                black_box(popped);
            }
            black_box(cur);
        })
    });
}

criterion_group!(benches, push, get, set, pop);
criterion_main!(benches);
