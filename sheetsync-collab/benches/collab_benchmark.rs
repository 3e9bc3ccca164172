use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sheetsync_collab::broadcast::BroadcastHub;
use sheetsync_collab::protocol::{CellEdit, ChannelMessage};
use sheetsync_collab::storage::{RocksStore, StoreConfig};
use sheetsync_core::{GridService, SheetService};
use std::sync::Arc;
use uuid::Uuid;

fn sample_edit() -> CellEdit {
    CellEdit {
        sheet_id: Uuid::new_v4(),
        grid_id: Uuid::new_v4(),
        row_id: Uuid::new_v4(),
        column_id: Uuid::new_v4(),
        content: "=SUM(B2:B40)".into(),
    }
}

fn bench_cell_update_encode(c: &mut Criterion) {
    let sender = Uuid::new_v4();
    let payload = sample_edit().encode().unwrap();

    c.bench_function("cell_update_encode", |b| {
        b.iter(|| {
            let msg = ChannelMessage::cell_content_updated(
                black_box(sender),
                black_box(payload.clone()),
            );
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_cell_update_decode(c: &mut Criterion) {
    let msg = ChannelMessage::cell_content_updated(Uuid::new_v4(), sample_edit().encode().unwrap());
    let encoded = msg.encode().unwrap();

    c.bench_function("cell_update_decode", |b| {
        b.iter(|| {
            let decoded = ChannelMessage::decode(black_box(&encoded)).unwrap();
            black_box(decoded.cell_edit().unwrap());
        })
    });
}

fn bench_fan_out_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let hub = BroadcastHub::new(1024);
    let mut receivers: Vec<_> = rt.block_on(async {
        let mut rxs = Vec::new();
        for _ in 0..100 {
            rxs.push(hub.subscribe(Uuid::new_v4()).await);
        }
        rxs
    });
    let frame = Arc::new(
        ChannelMessage::cell_content_updated(Uuid::new_v4(), sample_edit().encode().unwrap())
            .encode()
            .unwrap(),
    );
    let sender = Uuid::new_v4();

    c.bench_function("fan_out_100_subscribers", |b| {
        b.iter(|| {
            let delivered = rt.block_on(hub.broadcast_from(sender, frame.clone()));
            for rx in receivers.iter_mut() {
                let _ = rx.try_recv();
            }
            black_box(delivered);
        })
    });
}

fn bench_rocks_cell_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap());
    let owner = Uuid::new_v4();
    let sheet_id = SheetService::new(store.clone()).create(owner).unwrap();
    let grids = GridService::new(store.clone());
    let grid = grids.create_grid(sheet_id, owner, "Bench").unwrap();
    let row = grids.add_row(grid.id, 0).unwrap();
    let col = grids.add_column(grid.id, 0).unwrap();

    c.bench_function("rocks_cell_write", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(grids.write_cell(grid.id, row.id, col.id, n.to_string(), owner).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_cell_update_encode,
    bench_cell_update_decode,
    bench_fan_out_100,
    bench_rocks_cell_write,
);
criterion_main!(benches);
