//! Streaming CBC codec benchmarks.
//!
//! Measures record encryption and decryption at typical invoice sizes and at
//! the chunk size the store streams with.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fcinvoice_keyvault::crypto::{decrypt_to_vec, encrypt_to_vec, CbcEncryptor};
use fcinvoice_keyvault::{IV_LEN, KEY_LEN};

const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];
const IV: [u8; IV_LEN] = [0x24; IV_LEN];

fn bench_one_shot(c: &mut Criterion) {
    let mut group = c.benchmark_group("cbc/one_shot");

    for size in [512usize, 4 * 1024, 64 * 1024] {
        let plaintext = vec![0x5au8; size];
        let ciphertext = encrypt_to_vec(&KEY, &IV, &plaintext).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, pt| {
            b.iter(|| encrypt_to_vec(&KEY, &IV, black_box(pt)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &ciphertext, |b, ct| {
            b.iter(|| decrypt_to_vec(&KEY, &IV, black_box(ct)).unwrap());
        });
    }

    group.finish();
}

fn bench_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("cbc/chunked");
    let plaintext = vec![0x5au8; 256 * 1024];
    group.throughput(Throughput::Bytes(plaintext.len() as u64));

    for chunk in [1000usize, 64 * 1024] {
        group.bench_with_input(BenchmarkId::new("encrypt", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut out = Vec::with_capacity(plaintext.len() + 16);
                let mut enc = CbcEncryptor::new(&KEY, &IV);
                for piece in plaintext.chunks(chunk) {
                    enc.update(black_box(piece), &mut out);
                }
                enc.finish(&mut out).unwrap();
                out
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_one_shot, bench_chunked);
criterion_main!(benches);
