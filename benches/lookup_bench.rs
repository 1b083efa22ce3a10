use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geoql::resolver::parse_path;
use geoql::{address, ipmask, Database, Engine, GeoFunction};
use rand::Rng;
use rayon::prelude::*;
use std::hint::black_box;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{asn_record, city_record, MmdbWriter};

/// City database with `count` /24 networks under 10.0.0.0/8
fn city_database(count: u32, record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, record_size).database_type("GeoLite2-City");
    for i in 0..count {
        let cidr = format!("10.{}.{}.0/24", (i >> 8) & 0xFF, i & 0xFF);
        let city = format!("City {}", i);
        writer.insert(
            &cidr,
            &city_record(
                "Europe",
                "Germany",
                "DE",
                Some("Land Berlin"),
                Some(city.as_str()),
                Some("10115"),
                "Europe/Berlin",
            ),
        );
    }
    writer.build()
}

fn asn_database(count: u32) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, 24).database_type("GeoLite2-ASN");
    for i in 0..count {
        let cidr = format!("10.{}.{}.0/24", (i >> 8) & 0xFF, i & 0xFF);
        writer.insert(&cidr, &asn_record(64512 + i, "BENCH-NET"));
    }
    writer.build()
}

fn random_addresses(count: usize, networks: u32) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let i = rng.random_range(0..networks * 2);
            format!("10.{}.{}.{}", (i >> 8) & 0xFF, i & 0xFF, rng.random_range(0..=255u8))
        })
        .collect()
}

fn bench_tree_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_lookup");
    let addresses = random_addresses(1000, 10_000);
    let parsed: Vec<_> = addresses
        .iter()
        .map(|a| address::parse_any(a).unwrap())
        .collect();

    group.throughput(Throughput::Elements(parsed.len() as u64));
    for record_size in [24u16, 28, 32] {
        let db = Database::from_bytes(city_database(10_000, record_size)).unwrap();
        group.bench_with_input(
            BenchmarkId::new("record_size", record_size),
            &parsed,
            |b, parsed| {
                b.iter(|| {
                    for bits in parsed {
                        black_box(db.lookup(bits).unwrap());
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_field_resolution(c: &mut Criterion) {
    let db = Database::from_bytes(city_database(1_000, 28)).unwrap();
    let entry = db.lookup_str("10.0.1.1").unwrap().unwrap();
    let mut group = c.benchmark_group("field_resolution");

    for path in ["country.names.en", "subdivisions.0.names.en", "location.time_zone"] {
        let selectors = parse_path(path);
        group.bench_with_input(BenchmarkId::from_parameter(path), &selectors, |b, s| {
            b.iter(|| black_box(entry.get(s).unwrap()));
        });
    }
    group.bench_function("decode_record", |b| {
        b.iter(|| black_box(entry.decode().unwrap()));
    });
    group.finish();
}

fn bench_functions(c: &mut Criterion) {
    let engine = Engine::from_databases(
        Database::from_bytes(asn_database(10_000)).unwrap(),
        Database::from_bytes(city_database(10_000, 28)).unwrap(),
    );
    let addresses = random_addresses(1000, 10_000);
    let mut group = c.benchmark_group("functions");
    group.throughput(Throughput::Elements(addresses.len() as u64));

    group.bench_function("country", |b| {
        b.iter(|| {
            for ip in &addresses {
                black_box(engine.call(GeoFunction::Country, Some(ip.as_str())).ok());
            }
        });
    });
    group.bench_function("geoip", |b| {
        b.iter(|| {
            for ip in &addresses {
                black_box(engine.geoip(Some(ip.as_str())).ok());
            }
        });
    });
    group.bench_function("geoip_parallel", |b| {
        b.iter(|| {
            let lines: Vec<_> = addresses
                .par_iter()
                .map(|ip| engine.geoip(Some(ip.as_str())).ok())
                .collect();
            black_box(lines)
        });
    });
    group.bench_function("ipmask", |b| {
        b.iter(|| {
            for ip in &addresses {
                black_box(ipmask(Some(ip.as_str()), Some(24)).ok());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_tree_lookup,
    bench_field_resolution,
    bench_functions
);
criterion_main!(benches);
