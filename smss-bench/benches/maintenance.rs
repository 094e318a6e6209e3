//! SMSS Benchmark Suite
//!
//! Targets:
//!   proximity_200_bases_1000_tents ... < 5ms
//!   full_pass_in_memory .............. < 50ms

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracing::Span;

use smss_core::clans::ExclusionSet;
use smss_core::maintenance::run_with_store;
use smss_core::persistence::SqliteStore;
use smss_core::proximity::match_by_proximity;
use smss_core::types::{AccountId, Base, EntityId, OwnerId, Position, Tent, STEAM64_OFFSET};
use smss_core::{ClanId, SmssConfig};

const SCHEMA: &str = "
    CREATE TABLE Structures (
        StructureID  INTEGER PRIMARY KEY,
        AccountID    INTEGER NOT NULL,
        ClassName    TEXT NOT NULL,
        PosX         REAL NOT NULL,
        PosY         REAL NOT NULL,
        AbandonTimer INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE Vehicles (
        VehicleID    INTEGER PRIMARY KEY,
        PosX         REAL NOT NULL,
        PosY         REAL NOT NULL,
        AbandonTimer INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE ClanMembers (ClanID INTEGER NOT NULL, AccountID INTEGER NOT NULL);
    CREATE TABLE Characters (
        CharacterID  INTEGER PRIMARY KEY,
        AccountID    INTEGER NOT NULL,
        GameServerID INTEGER NOT NULL
    );
    CREATE TABLE ServerAccountData (AccountID INTEGER PRIMARY KEY, Guide00 TEXT, Guide01 TEXT);
";

/// Deterministic scatter over a 2km square.
fn scatter(i: i64) -> Position {
    let x = ((i * 7919) % 2000) as f64;
    let y = ((i * 104_729) % 2000) as f64;
    Position::new(x, y)
}

fn make_bases(n: i64) -> Vec<Base> {
    (0..n)
        .map(|i| Base {
            owner: OwnerId::from_account(AccountId(i % 50)),
            position: scatter(i),
        })
        .collect()
}

fn make_tents(n: i64) -> Vec<Tent> {
    (0..n)
        .map(|i| Tent {
            id: EntityId(i),
            position: scatter(i + 10_000),
        })
        .collect()
}

/// Benchmark: proximity matching, 200 bases against 1000 tents.
fn bench_proximity(c: &mut Criterion) {
    let bases = make_bases(200);
    let tents = make_tents(1000);
    let exclusion: ExclusionSet = (0..10).map(|a| OwnerId::from_account(AccountId(a))).collect();

    c.bench_function("proximity_200_bases_1000_tents", |b| {
        b.iter(|| {
            let matched = match_by_proximity(black_box(&bases), black_box(&exclusion), black_box(&tents));
            black_box(matched);
        });
    });
}

fn populated_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open");
    store.execute_batch(SCHEMA).expect("schema");
    let mut sql = String::from("BEGIN;");
    for i in 0..500i64 {
        let p = scatter(i);
        sql.push_str(&format!(
            "INSERT INTO Structures (AccountID, ClassName, PosX, PosY) VALUES ({}, 'PlotSign', {}, {});",
            i % 50,
            p.x,
            p.y
        ));
    }
    for i in 0..2000i64 {
        let p = scatter(i + 10_000);
        let class = if i % 3 == 0 { "tent_small" } else { "wall_wood" };
        sql.push_str(&format!(
            "INSERT INTO Structures (AccountID, ClassName, PosX, PosY) VALUES ({}, '{class}', {}, {});",
            i % 50,
            p.x,
            p.y
        ));
    }
    for i in 0..300i64 {
        let p = scatter(i + 20_000);
        sql.push_str(&format!("INSERT INTO Vehicles (PosX, PosY) VALUES ({}, {});", p.x, p.y));
    }
    for account in 0..20i64 {
        sql.push_str(&format!("INSERT INTO ClanMembers (ClanID, AccountID) VALUES ({}, {account});", account % 4));
    }
    sql.push_str("COMMIT;");
    store.execute_batch(&sql).expect("populate");
    store
}

/// Benchmark: full maintenance pass over an in-memory database.
fn bench_full_pass(c: &mut Criterion) {
    let store = populated_store();
    let config = SmssConfig {
        reset_base_owner_ids: (0..10).map(|a| OwnerId(STEAM64_OFFSET + a)).collect(),
        reset_tent_clan_ids: vec![ClanId(1), ClanId(2)],
        reset_vehicle_clan_ids: vec![ClanId(3)],
        quick_vehicle_despawn: Some(1),
        ..SmssConfig::default()
    };
    let span = Span::none();

    c.bench_function("full_pass_in_memory", |b| {
        b.iter(|| {
            let report = run_with_store(black_box(&store), black_box(&config), &span);
            black_box(report);
        });
    });
}

criterion_group!(benches, bench_proximity, bench_full_pass);
criterion_main!(benches);
