//! Tolerance policy tests
//!
//! A configuration with outstanding resolution errors must not silently
//! produce a usable engine; degraded mode is an explicit opt-in that
//! executes only the satisfiable subset.

use std::sync::Arc;
use weft::{
    ComposeError, Composer, Contract, ImportRequirement, Instance, PartDeclaration, PartFactory,
    TolerancePolicy,
};

struct Healthy;
struct Broken;

fn parts() -> Vec<PartDeclaration> {
    vec![
        PartDeclaration::builder("app::Healthy")
            .export(Contract::new("healthy"))
            .constructor([])
            .shared()
            .build()
            .unwrap(),
        // Unsatisfiable: nothing exports "missing"
        PartDeclaration::builder("app::Broken")
            .export(Contract::new("broken"))
            .constructor([ImportRequirement::one(Contract::new("missing"))])
            .shared()
            .build()
            .unwrap(),
    ]
}

fn composer() -> Composer {
    let mut composer = Composer::new();
    for part in parts() {
        composer = composer.part(part);
    }
    composer
        .factory(
            "app::Healthy",
            PartFactory::constructing(|_| Ok(Arc::new(Healthy) as Instance)),
        )
        .factory(
            "app::Broken",
            PartFactory::constructing(|_| Ok(Arc::new(Broken) as Instance)),
        )
}

#[test]
fn test_strict_mode_refuses_errored_composition() {
    match composer().compose() {
        Err(ComposeError::Resolution(report)) => {
            assert_eq!(report.len(), 1);
            assert!(report.to_string().contains("missing"));
        }
        other => panic!("expected resolution failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_degraded_mode_serves_satisfiable_subset() {
    let engine = composer()
        .tolerance(TolerancePolicy::Degraded)
        .compose()
        .unwrap();

    // The healthy part still composes
    let _healthy: Arc<Healthy> = engine.get(&Contract::new("healthy")).unwrap();

    // The broken part is gone, not half-wired
    assert!(engine.get::<Broken>(&Contract::new("broken")).is_err());
    assert_eq!(engine.plan().len(), 1);
}

#[test]
fn test_degraded_mode_factories_for_pruned_parts_are_unused() {
    // A registry missing the pruned part's factory still links, because
    // the pruned node is not in the plan at all.
    let engine = Composer::new()
        .part(parts().remove(0))
        .part(parts().remove(1))
        .factory(
            "app::Healthy",
            PartFactory::constructing(|_| Ok(Arc::new(Healthy) as Instance)),
        )
        .tolerance(TolerancePolicy::Degraded)
        .compose()
        .unwrap();

    let _healthy: Arc<Healthy> = engine.get(&Contract::new("healthy")).unwrap();
}
