//! Cycle policy tests
//!
//! A mutual eager dependency is rejected with the full cycle path;
//! replacing one edge with a deferred access makes the same shape legal,
//! and the deferred accessor observes the identical scoped instance.

use std::sync::Arc;
use weft::{
    Catalog, ComposeError, Composer, CompositionError, Contract, Deferred, ImportRequirement,
    Instance, PartDeclaration, PartFactory, PartId, ScopeTree, TolerancePolicy,
};

fn eager_pair() -> Vec<PartDeclaration> {
    vec![
        PartDeclaration::builder("cycle::A")
            .export(Contract::new("a"))
            .constructor([ImportRequirement::one(Contract::new("b"))])
            .shared()
            .build()
            .unwrap(),
        PartDeclaration::builder("cycle::B")
            .export(Contract::new("b"))
            .constructor([ImportRequirement::one(Contract::new("a"))])
            .shared()
            .build()
            .unwrap(),
    ]
}

#[test]
fn test_mutual_eager_dependency_is_rejected() {
    let resolution = weft::resolve(&Catalog::from_parts(eager_pair()), &ScopeTree::new());
    assert_eq!(resolution.errors.len(), 1);
    match resolution.errors.iter().next().unwrap() {
        CompositionError::IllegalEagerCycle { path } => {
            assert_eq!(
                path.0,
                vec![PartId::named("cycle::A"), PartId::named("cycle::B")]
            );
        }
        other => panic!("wrong error: {other}"),
    }

    // Degraded mode prunes the whole cycle rather than executing it
    let graph = resolution.into_graph(TolerancePolicy::Degraded).unwrap();
    assert!(graph.is_empty());
}

#[test]
fn test_compose_surfaces_cycle_error() {
    let result = Composer::new()
        .part(eager_pair().remove(0))
        .part(eager_pair().remove(1))
        .factory("cycle::A", PartFactory::constructing(|_| unreachable!()))
        .factory("cycle::B", PartFactory::constructing(|_| unreachable!()))
        .compose();
    assert!(matches!(result, Err(ComposeError::Resolution(_))));
}

struct A {
    b: Deferred<B>,
}
struct B {
    a: Arc<A>,
}

#[test]
fn test_deferring_one_edge_legalizes_the_cycle() {
    let engine = Composer::new()
        .part(
            PartDeclaration::builder("cycle::A")
                .export(Contract::new("a"))
                .constructor([ImportRequirement::one(Contract::new("b")).deferred()])
                .shared()
                .build()
                .unwrap(),
        )
        .part(
            PartDeclaration::builder("cycle::B")
                .export(Contract::new("b"))
                .constructor([ImportRequirement::one(Contract::new("a"))])
                .shared()
                .build()
                .unwrap(),
        )
        .factory(
            "cycle::A",
            PartFactory::constructing(|args| {
                Ok(Arc::new(A {
                    b: args[0].deferred()?,
                }) as Instance)
            }),
        )
        .factory(
            "cycle::B",
            PartFactory::constructing(|args| {
                Ok(Arc::new(B { a: args[0].one()? }) as Instance)
            }),
        )
        .compose()
        .unwrap();

    let b: Arc<B> = engine.get(&Contract::new("b")).unwrap();

    // The deferred back edge resolves to the scope-cached instance:
    // identical whether invoked through the cycle or fetched directly.
    let through_cycle = b.a.b.get().unwrap();
    assert!(Arc::ptr_eq(&b, &through_cycle));

    let direct: Arc<B> = engine.get(&Contract::new("b")).unwrap();
    assert!(Arc::ptr_eq(&b, &direct));

    // One construction each, despite the logical cycle
    assert_eq!(engine.metrics().constructions, 2);
}

#[test]
fn test_three_part_cycle_reports_full_path() {
    let parts = vec![
        PartDeclaration::builder("ring::A")
            .export(Contract::new("a"))
            .constructor([ImportRequirement::one(Contract::new("b"))])
            .build()
            .unwrap(),
        PartDeclaration::builder("ring::B")
            .export(Contract::new("b"))
            .constructor([ImportRequirement::one(Contract::new("c"))])
            .build()
            .unwrap(),
        PartDeclaration::builder("ring::C")
            .export(Contract::new("c"))
            .constructor([ImportRequirement::one(Contract::new("a"))])
            .build()
            .unwrap(),
    ];
    let resolution = weft::resolve(&Catalog::from_parts(parts), &ScopeTree::new());
    let first_error = resolution.errors.iter().next().unwrap();
    match first_error {
        CompositionError::IllegalEagerCycle { path } => {
            assert_eq!(path.0.len(), 3);
            let rendered = path.to_string();
            assert!(rendered.contains("ring::A"));
            assert!(rendered.contains("ring::B"));
            assert!(rendered.contains("ring::C"));
        }
        other => panic!("wrong error: {other}"),
    }
}
