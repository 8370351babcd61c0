use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serialring::Ring;
use std::sync::Arc;
use std::thread;

const TOTAL_BYTES: usize = 8 * 1024 * 1024;
const CHUNK: usize = 4096;

fn bench_spsc_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(TOTAL_BYTES as u64));

    group.bench_function("spsc_byte_stream", |b| {
        b.iter(|| {
            let ring = Arc::new(Ring::new(64 * 1024).unwrap());
            let producer_ring = Arc::clone(&ring);

            let producer = thread::spawn(move || {
                let chunk = [0x5Au8; CHUNK];
                let mut sent = 0usize;
                while sent < TOTAL_BYTES {
                    let want = CHUNK.min(TOTAL_BYTES - sent);
                    let n = producer_ring.write(&chunk[..want]);
                    sent += n;
                    if n == 0 {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut buf = [0u8; CHUNK];
            let mut received = 0usize;
            while received < TOTAL_BYTES {
                let n = ring.read(&mut buf);
                received += n;
                if n == 0 {
                    std::hint::spin_loop();
                } else {
                    black_box(&buf[..n]);
                }
            }

            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_region_pump(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(TOTAL_BYTES as u64));

    // The worker's access pattern: produce through free_regions +
    // advance_tail, consume through used_regions + advance_head.
    group.bench_function("region_pump", |b| {
        b.iter(|| {
            let ring = Ring::new(64 * 1024).unwrap();
            let mut moved = 0usize;

            while moved < TOTAL_BYTES {
                let [(p0, n0), (_, _)] = ring.free_regions();
                if n0 > 0 {
                    // SAFETY: single-threaded here; the span is free.
                    unsafe { std::ptr::write_bytes(p0, 0xA5, n0) };
                    ring.advance_tail(n0);
                }

                let [(q0, m0), (_, _)] = ring.used_regions();
                if m0 > 0 {
                    // SAFETY: single-threaded here; the span is used.
                    black_box(unsafe { std::slice::from_raw_parts(q0, m0) });
                    ring.advance_head(m0);
                    moved += m0;
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spsc_bytes, bench_region_pump);
criterion_main!(benches);
