// tests/fragments.rs

//! Fragment attachment scenarios: version selection, capability
//! multiplication across hosts, and cascading removal of losing fragments.

mod common;

use common::*;
use interlink::{Error, Resolver, namespace};

#[test]
fn test_highest_fragment_version_wins() {
    let the_host = host("host", "1.0.0").build();
    let f1 = export_package(fragment_of("frag", "1.0.0", "host"), "fp", "1.0.0", &[]).build();
    let f2 = export_package(fragment_of("frag", "2.0.0", "host"), "fp", "2.0.0", &[]).build();
    let app = import_package(resource("app", "1.0.0"), "fp", None).build();

    let mut ctx = TestContext::new();
    ctx.mandate(&the_host);
    ctx.offer(&f1);
    ctx.offer(&f2);
    ctx.mandate(&app);

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    // Only the v2 fragment attaches; its capability is served by the host.
    let app_wires = wires_of(&wire_map, &app);
    assert_eq!(app_wires.len(), 1);
    assert_eq!(app_wires[0].provider(), &the_host);
    assert_eq!(app_wires[0].capability(), &f2.capabilities()[0]);

    let f2_wires = wires_of(&wire_map, &f2);
    assert_eq!(f2_wires.len(), 1);
    assert_eq!(f2_wires[0].provider(), &the_host);
    assert_eq!(f2_wires[0].requirement().namespace(), namespace::HOST);

    assert!(!wire_map.contains_key(&f1));
}

#[test]
fn test_fragment_multiplies_across_hosts() {
    // Both hosts advertise the same attachment kind, so one fragment
    // matches either of them.
    let pluggable_host = |name: &str| {
        resource(name, "1.0.0")
            .capability(namespace::HOST)
            .attribute(namespace::HOST, name)
            .attribute("kind", "pluggable")
            .done()
            .build()
    };
    let host_a = pluggable_host("host-a");
    let host_b = pluggable_host("host-b");
    let frag = export_package(
        resource("frag", "1.0.0")
            .requirement(namespace::HOST)
            .directive(interlink::directive::FILTER, "(kind=pluggable)")
            .done(),
        "fp",
        "1.0.0",
        &[],
    )
    .build();
    let app = import_package(resource("app", "1.0.0"), "fp", None).build();

    let mut ctx = TestContext::new();
    ctx.mandate(&host_a);
    ctx.mandate(&host_b);
    ctx.offer(&frag);
    ctx.mandate(&app);

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    // The fragment is wired to both hosts, and the app sees the capability
    // through the first host.
    let frag_wires = wires_of(&wire_map, &frag);
    assert_eq!(frag_wires.len(), 2);
    assert_eq!(frag_wires[0].provider(), &host_a);
    assert_eq!(frag_wires[1].provider(), &host_b);

    let app_wires = wires_of(&wire_map, &app);
    assert_eq!(app_wires.len(), 1);
    assert_eq!(app_wires[0].provider(), &host_a);
    assert_eq!(app_wires[0].capability(), &frag.capabilities()[0]);
}

#[test]
fn test_cascading_fragment_removal_fails_mandatory_dependent() {
    // The losing fragment is the only provider of fp1, and app mandates it.
    let the_host = host("host", "1.0.0").build();
    let f1 = export_package(fragment_of("frag", "1.0.0", "host"), "fp1", "1.0.0", &[]).build();
    let f2 = export_package(fragment_of("frag", "2.0.0", "host"), "fp2", "2.0.0", &[]).build();
    let app = import_package(resource("app", "1.0.0"), "fp1", None).build();

    let mut ctx = TestContext::new();
    ctx.mandate(&the_host);
    ctx.offer(&f1);
    ctx.offer(&f2);
    ctx.mandate(&app);

    let err = Resolver::new().resolve(&ctx).unwrap_err();
    let Error::MissingRequirement { requirement, cause } = &err else {
        panic!("expected missing requirement, got {err}");
    };
    assert_eq!(requirement.resource(), app);
    let cause = cause.as_deref().expect("cause preserved");
    assert!(matches!(cause, Error::FragmentNotSelected { .. }));
    assert!(err.to_string().contains("caused by"));
}

#[test]
fn test_fragment_without_populated_host_is_skipped() {
    // No host in the universe: the optional fragment fails to populate and
    // the rest of the resolve is unaffected.
    let orphan = export_package(fragment_of("orphan", "1.0.0", "host"), "fp", "1.0.0", &[]).build();
    let base = export_package(resource("base", "1.0.0"), "q", "1.0.0", &[]).build();
    let app = import_package(resource("app", "1.0.0"), "q", None).build();

    let mut ctx = TestContext::new();
    ctx.register(&base);
    ctx.offer(&orphan);
    ctx.mandate(&app);

    let wire_map = Resolver::new().resolve(&ctx).unwrap();
    assert!(wire_map.contains_key(&app));
    assert!(!wire_map.contains_key(&orphan));
}
