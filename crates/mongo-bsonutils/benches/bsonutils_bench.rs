use criterion::{criterion_group, criterion_main, Criterion};
use mongo_bsonutils::{document, marshal, parse_document, unmarshal, BsonStruct, Codec, CodecOptions, ObjectId, Value};
use std::collections::HashMap;

#[derive(BsonStruct, Default)]
struct Audit {
    created_on: i64,
    updated_on: i64,
}

#[derive(BsonStruct, Default)]
struct Product {
    #[bson("_id,omitempty")]
    id: ObjectId,
    name: String,
    price: f64,
    #[bson("stock,minsize")]
    stock: i64,
    tags: Vec<String>,
    #[bson(",inline")]
    audit: Audit,
    #[bson(",inline")]
    extra: HashMap<String, Value>,
}

fn sample() -> Product {
    Product {
        id: ObjectId::new(),
        name: "Miku".to_string(),
        price: 99.5,
        stock: 16,
        tags: vec!["a".to_string(), "b".to_string()],
        audit: Audit {
            created_on: 1_700_000_000_000,
            updated_on: 0,
        },
        extra: HashMap::new(),
    }
}

fn bench_struct_marshal(c: &mut Criterion) {
    let product = sample();
    c.bench_function("struct_marshal", |b| b.iter(|| marshal(&product)));
}

fn bench_struct_marshal_omit_empty(c: &mut Criterion) {
    let product = sample();
    let codec = Codec::new(CodecOptions::default().with_default_omit_empty(true));
    c.bench_function("struct_marshal_omit_empty", |b| b.iter(|| codec.marshal(&product)));
}

fn bench_struct_unmarshal(c: &mut Criterion) {
    let encoded = marshal(&sample()).unwrap();
    c.bench_function("struct_unmarshal", |b| {
        b.iter(|| {
            let mut product = Product::default();
            unmarshal(&encoded, &mut product).map(|_| product)
        })
    });
}

fn bench_document_parse(c: &mut Criterion) {
    let encoded = marshal(&document! {
        "name" => "Miku",
        "age" => 16i64,
        "active" => true,
        "score" => 99.5,
        "address" => document! { "street" => "123 Main St", "city" => "Tokyo" },
    })
    .unwrap();
    c.bench_function("document_parse", |b| b.iter(|| parse_document(&encoded, 100)));
}

criterion_group!(
    benches,
    bench_struct_marshal,
    bench_struct_marshal_omit_empty,
    bench_struct_unmarshal,
    bench_document_parse,
);

criterion_main!(benches);
