//! PDX serialization/deserialization throughput benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdx_core::serialization::modified_utf8;
use pdx_core::{
    InMemoryTypeService, PdxReader, PdxSerializable, PdxSerializer, PdxWriter, Result,
    TypeRegistry, TypeService,
};

#[derive(Debug, Default)]
struct Quote {
    symbol: Option<String>,
    bid: f64,
    ask: f64,
    volume: i64,
    venue: Option<String>,
    history: Option<Vec<f64>>,
}

impl PdxSerializable for Quote {
    fn class_name(&self) -> &str {
        "bench.Quote"
    }

    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
        writer.write_string("symbol", self.symbol.as_deref())?;
        writer.write_double("bid", self.bid)?;
        writer.write_double("ask", self.ask)?;
        writer.write_long("volume", self.volume)?;
        writer.write_string("venue", self.venue.as_deref())?;
        writer.write_double_array("history", self.history.as_deref())
    }

    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
        self.symbol = reader.read_string("symbol")?;
        self.bid = reader.read_double("bid")?;
        self.ask = reader.read_double("ask")?;
        self.volume = reader.read_long("volume")?;
        self.venue = reader.read_string("venue")?;
        self.history = reader.read_double_array("history")?;
        Ok(())
    }
}

fn serializer() -> PdxSerializer {
    let service: Arc<dyn TypeService> = Arc::new(InMemoryTypeService::new());
    PdxSerializer::new(Arc::new(TypeRegistry::new(service).unwrap()))
}

fn quote(history_len: usize) -> Quote {
    Quote {
        symbol: Some("ACME".to_string()),
        bid: 101.25,
        ask: 101.5,
        volume: 1_000_000,
        venue: Some("XNYS".to_string()),
        history: Some((0..history_len).map(|i| i as f64 * 0.25).collect()),
    }
}

fn bench_pdx_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdx_serialize");
    let serializer = serializer();

    for history_len in [0usize, 64, 4096] {
        let value = quote(history_len);
        let size = serializer.serialize(&value).unwrap().len();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(history_len),
            &value,
            |b, value| b.iter(|| black_box(serializer.serialize(black_box(value)).unwrap())),
        );
    }

    group.finish();
}

fn bench_pdx_deserialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdx_deserialize");
    let serializer = serializer();

    for history_len in [0usize, 64, 4096] {
        let bytes = serializer.serialize(&quote(history_len)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(history_len),
            &bytes,
            |b, bytes| b.iter(|| black_box(serializer.deserialize_as::<Quote>(bytes).unwrap())),
        );
    }

    group.finish();
}

fn bench_instance_field_access(c: &mut Criterion) {
    let serializer = serializer();
    let bytes = serializer.serialize(&quote(64)).unwrap();
    let instance = serializer.deserialize(&bytes).unwrap().into_instance().unwrap();

    c.bench_function("pdx_instance_get_field", |b| {
        b.iter(|| black_box(instance.get_field(black_box("venue")).unwrap()))
    });
    c.bench_function("pdx_instance_hash_code", |b| {
        b.iter(|| black_box(instance.hash_code()))
    });
}

fn bench_modified_utf8(c: &mut Criterion) {
    let mut group = c.benchmark_group("modified_utf8");
    let ascii = "a".repeat(1024);
    let mixed = "héllo wörld \u{1F600} ".repeat(64);

    for (name, text) in [("ascii", &ascii), ("mixed", &mixed)] {
        let encoded = modified_utf8::encode(text);
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", name), text, |b, text| {
            b.iter(|| black_box(modified_utf8::encode(black_box(text))))
        });
        group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, encoded| {
            b.iter(|| black_box(modified_utf8::decode(black_box(encoded)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pdx_serialization,
    bench_pdx_deserialization,
    bench_instance_field_access,
    bench_modified_utf8
);
criterion_main!(benches);
