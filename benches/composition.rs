//! Composition pipeline benchmarks
//!
//! Measures the three stages separately over a synthetic catalog:
//! resolution (graph search + validation), lowering (flattening), and
//! execution (cache-hit requests against a live engine).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use weft::{
    lower, resolve, Catalog, CompositionEngine, Contract, FactoryRegistry, ImportRequirement,
    Instance, PartDeclaration, PartFactory, ScopeTree, TolerancePolicy,
};

struct Plugin;
struct Hub {
    plugins: Vec<Arc<Plugin>>,
}

const PLUGINS: usize = 100;

fn synthetic_catalog() -> Catalog {
    let mut parts: Vec<PartDeclaration> = (0..PLUGINS)
        .map(|i| {
            PartDeclaration::builder(format!("bench::Plugin{:03}", i).as_str())
                .export(Contract::new("plugin"))
                .constructor([])
                .shared()
                .build()
                .unwrap()
        })
        .collect();
    parts.push(
        PartDeclaration::builder("bench::Hub")
            .export(Contract::new("hub"))
            .constructor([ImportRequirement::many(Contract::new("plugin"))])
            .shared()
            .build()
            .unwrap(),
    );
    Catalog::from_parts(parts)
}

fn registry() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    for i in 0..PLUGINS {
        registry.register(
            format!("bench::Plugin{:03}", i).as_str(),
            PartFactory::constructing(|_| Ok(Arc::new(Plugin) as Instance)),
        );
    }
    registry.register(
        "bench::Hub",
        PartFactory::constructing(|args| {
            Ok(Arc::new(Hub {
                plugins: args[0].many()?,
            }) as Instance)
        }),
    );
    registry
}

fn bench_resolve(c: &mut Criterion) {
    let catalog = synthetic_catalog();
    let tree = ScopeTree::new();
    c.bench_function("resolve_100_plugins", |b| {
        b.iter(|| {
            let resolution = resolve(black_box(&catalog), &tree);
            assert!(resolution.is_clean());
            resolution
        })
    });
}

fn bench_lower(c: &mut Criterion) {
    let graph = resolve(&synthetic_catalog(), &ScopeTree::new())
        .into_graph(TolerancePolicy::Strict)
        .unwrap();
    c.bench_function("lower_100_plugins", |b| {
        b.iter(|| lower(black_box(&graph)).unwrap())
    });
}

fn bench_execute(c: &mut Criterion) {
    let graph = resolve(&synthetic_catalog(), &ScopeTree::new())
        .into_graph(TolerancePolicy::Strict)
        .unwrap();
    let plan = lower(&graph).unwrap();
    let engine = CompositionEngine::new(plan, &registry()).unwrap();
    // Warm the cache; steady-state requests are what plans are for
    let warm: Arc<Hub> = engine.get(&Contract::new("hub")).unwrap();
    assert_eq!(warm.plugins.len(), PLUGINS);

    c.bench_function("get_cached_hub", |b| {
        b.iter(|| {
            let hub: Arc<Hub> = engine.get(black_box(&Contract::new("hub"))).unwrap();
            hub
        })
    });
}

criterion_group!(benches, bench_resolve, bench_lower, bench_execute);
criterion_main!(benches);
