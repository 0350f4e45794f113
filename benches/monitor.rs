use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use semmon::{Bank, Monitor, SemKey, SemaphoreSet};

const PING: usize = 0;
const PONG: usize = 1;

fn bench_semaphore(c: &mut Criterion) {
    let mut group = c.benchmark_group("semaphore");
    group.throughput(Throughput::Elements(1));

    let set = SemaphoreSet::create(SemKey::private(), &[1]).unwrap();
    group.bench_function("wait_signal_uncontended", |b| {
        b.iter(|| {
            set.wait(0).unwrap();
            set.signal(0).unwrap();
        });
    });

    group.finish();
}

fn bench_monitor(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitor");
    group.throughput(Throughput::Elements(1));

    let monitor = Monitor::create(SemKey::private(), 1, 0u64).unwrap();
    group.bench_function("enter_leave_uncontended", |b| {
        b.iter(|| {
            let mut guard = monitor.enter();
            *guard += 1;
        });
    });

    group.bench_function("signal_without_waiters", |b| {
        b.iter(|| {
            let mut guard = monitor.enter();
            guard.cond_signal(0);
        });
    });

    // Each round trip is two Hoare hand-offs between two threads.
    group.bench_function("ping_pong_handoff", |b| {
        b.iter_custom(|iters| {
            let monitor = Arc::new(Monitor::create(SemKey::private(), 2, 0u64).unwrap());

            let ponger = {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    let mut turn = monitor.enter();
                    for _ in 0..iters {
                        if *turn % 2 == 0 {
                            turn.cond_wait(PING);
                        }
                        *turn += 1;
                        turn.cond_signal(PONG);
                    }
                })
            };

            let started = std::time::Instant::now();
            let mut turn = monitor.enter();
            for _ in 0..iters {
                *turn += 1;
                turn.cond_signal(PING);
                if *turn % 2 == 1 {
                    turn.cond_wait(PONG);
                }
            }
            drop(turn);
            let elapsed = started.elapsed();

            ponger.join().unwrap();
            elapsed
        });
    });

    group.finish();
}

fn bench_bank(c: &mut Criterion) {
    let mut group = c.benchmark_group("bank");
    group.throughput(Throughput::Elements(2));

    let bank = Bank::open(SemKey::private(), 0).unwrap();
    group.bench_function("deposit_then_withdraw", |b| {
        b.iter(|| {
            bank.deposit("bench", 10).unwrap();
            bank.withdraw("bench", 10).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_semaphore, bench_monitor, bench_bank);
criterion_main!(benches);
