use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use stockhold_core::{ItemId, LocationId, SystemClock};
use stockhold_inventory::{
    InventoryService, InventoryStores, ManualExpiryScheduler, NullPublisher, ReservationPolicy,
    StockSettings,
};

fn service(items: usize, quantity: i64) -> Arc<InventoryService> {
    let service = InventoryService::new(
        InventoryStores::in_memory(),
        Arc::new(ManualExpiryScheduler::new()),
        Arc::new(NullPublisher),
        Arc::new(SystemClock),
        ReservationPolicy::default(),
    );
    for i in 0..items {
        service
            .create_item(
                &ItemId::new(format!("SKU-{i}")),
                &LocationId::new("WH-1"),
                &StockSettings::new(quantity),
            )
            .unwrap();
    }
    Arc::new(service)
}

fn bench_reserve_cancel_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_cancel_latency");
    group.sample_size(1000);

    let svc = service(1, i64::MAX / 4);
    let item = ItemId::new("SKU-0");

    group.bench_function("reserve_then_cancel", |b| {
        b.iter(|| {
            let id = svc
                .reserve(&item, black_box(1), Utc::now() + Duration::minutes(5))
                .unwrap();
            black_box(svc.cancel(id).unwrap());
        });
    });

    group.bench_function("reserve_then_confirm", |b| {
        b.iter(|| {
            let id = svc
                .reserve(&item, black_box(1), Utc::now() + Duration::minutes(5))
                .unwrap();
            black_box(svc.confirm(id).unwrap());
        });
    });

    group.finish();
}

/// Threads hammering one item (fully serialized) versus one item each (no contention).
fn bench_contended_reservations(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_reservations");
    let per_thread = 200;

    for threads in [1usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * per_thread) as u64));

        for (label, items) in [("same_item", 1usize), ("distinct_items", threads)] {
            group.bench_with_input(BenchmarkId::new(label, threads), &threads, |b, &threads| {
                let svc = service(items, i64::MAX / 4);
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let svc = svc.clone();
                            let item = ItemId::new(format!("SKU-{}", t % items));
                            thread::spawn(move || {
                                for _ in 0..per_thread {
                                    let id = svc
                                        .reserve(&item, 1, Utc::now() + Duration::minutes(5))
                                        .unwrap();
                                    svc.cancel(id).unwrap();
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_reserve_cancel_latency, bench_contended_reservations);
criterion_main!(benches);
