//! Solver scenario tests.
//!
//! Each test builds a small package universe, compiles it, and checks the
//! solved assignment node by node. Candidate ordering mirrors the cost
//! vector, so these tests pin down both satisfiability and optimality.

use std::path::PathBuf;

use strata_spec::{
    AbstractSpec, DepRequest, DepTypes, SpecSnapshot, VariantConstraint, VariantValue, Version,
    VersionConstraint,
};

use crate::compile::{Compiler, ForbiddenEdgeSet, Problem};
use crate::config::{ConcretizerConfig, ExternalEntry, PackageSettings, SourceKind};
use crate::error::ConcretizeError;
use crate::facts::{
    DependencyCondition, FactProvider, MemoryRepository, PackageFacts, VariantDef,
};
use crate::reuse::ReusableSpec;

use super::assignment::Assignment;
use super::rounds::solve_in_rounds;
use super::solver::Solver;

fn ver(s: &str) -> VersionConstraint {
    VersionConstraint::parse(s).unwrap()
}

fn root(s: &str) -> AbstractSpec {
    AbstractSpec::named(s)
}

fn universe(packages: Vec<PackageFacts>) -> FactProvider {
    let mut repo = MemoryRepository::new("builtin");
    for facts in packages {
        repo.add(facts);
    }
    FactProvider::single(repo)
}

fn compile(provider: &FactProvider, config: &ConcretizerConfig, roots: Vec<AbstractSpec>) -> Problem {
    Compiler::new(provider, config)
        .compile(&roots, Vec::new())
        .unwrap()
}

fn solve(problem: &Problem) -> Assignment {
    Solver::new(problem).solve().unwrap().0
}

fn version_of<'a>(assignment: &'a Assignment, name: &str) -> &'a str {
    assignment.find_node(name).unwrap().version.as_str()
}

fn variant_of(assignment: &Assignment, name: &str, variant: &str) -> VariantValue {
    assignment
        .find_node(name)
        .unwrap()
        .variants
        .get(variant)
        .unwrap()
        .clone()
}

#[test]
fn test_simple_chain_picks_newest_versions() {
    let provider = universe(vec![
        PackageFacts::new("hdf5")
            .version("1.12")
            .version("1.10")
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("zlib").version("1.3").version("1.2"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("hdf5")]);

    let assignment = solve(&problem);
    assert_eq!(assignment.nodes.len(), 2);
    assert_eq!(version_of(&assignment, "hdf5"), "1.12");
    assert_eq!(version_of(&assignment, "zlib"), "1.3");
    assert_eq!(assignment.edges.len(), 1);
    assert_eq!(assignment.edges[0].deptypes, DepTypes::DEFAULT);
}

#[test]
fn test_all_arch_components_concretized() {
    let provider = universe(vec![PackageFacts::new("zlib").version("1.3")]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("zlib")]);

    let assignment = solve(&problem);
    let node = assignment.find_node("zlib").unwrap();
    assert!(node.arch.is_complete());
    assert_eq!(node.arch, config.host_arch);
}

#[test]
fn test_preferred_version_beats_newest() {
    let provider = universe(vec![PackageFacts::new("python")
        .version("3.13")
        .preferred_version("3.12")
        .version("3.11")]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("python")]);

    assert_eq!(version_of(&solve(&problem), "python"), "3.12");
}

#[test]
fn test_version_constraint_overrides_preference() {
    let provider = universe(vec![PackageFacts::new("python")
        .version("3.13")
        .preferred_version("3.12")]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("python").with_version(ver("3.13:"))],
    );

    assert_eq!(version_of(&solve(&problem), "python"), "3.13");
}

#[test]
fn test_deprecated_version_only_when_forced() {
    let provider = universe(vec![PackageFacts::new("openssl")
        .version("3.0")
        .deprecated_version("1.1")]);
    let config = ConcretizerConfig::default();

    let free = compile(&provider, &config, vec![root("openssl")]);
    let solved = solve(&free);
    assert_eq!(version_of(&solved, "openssl"), "3.0");
    assert!(!solved.find_node("openssl").unwrap().deprecated);

    let forced = compile(
        &provider,
        &config,
        vec![root("openssl").with_version(ver("1.1"))],
    );
    let solved = solve(&forced);
    assert_eq!(version_of(&solved, "openssl"), "1.1");
    assert!(solved.find_node("openssl").unwrap().deprecated);
}

#[test]
fn test_older_version_wins_when_newest_drags_in_deprecated_dep() {
    // app@2.0 pulls a dependency whose only release is deprecated; the
    // deprecated count outranks version preference, so app@1.0 with no
    // dependencies is the cheaper assignment.
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("2.0")
            .version("1.0")
            .depends_on(
                DependencyCondition::on("legacy")
                    .when(AbstractSpec::anonymous().with_version(ver("2.0:"))),
            ),
        PackageFacts::new("legacy").deprecated_version("0.9"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("app")]);

    let (assignment, stats) = Solver::new(&problem).solve().unwrap();
    assert_eq!(version_of(&assignment, "app"), "1.0");
    assert!(assignment.find_node("legacy").is_none());
    assert_eq!(stats.cost.0[1], 0);
}

#[test]
fn test_backtracks_to_older_version_over_dependency_conflict() {
    // app@2.0 needs lib@:1.0, which does not exist; app@1.0 accepts lib@2.0.
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("2.0")
            .version("1.0")
            .depends_on(
                DependencyCondition::on("lib")
                    .when(AbstractSpec::anonymous().with_version(ver("2.0:")))
                    .constrained(AbstractSpec::named("lib").with_version(ver(":1.0"))),
            )
            .depends_on(
                DependencyCondition::on("lib")
                    .when(AbstractSpec::anonymous().with_version(ver(":1.9"))),
            ),
        PackageFacts::new("lib").version("2.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("app")]);

    let assignment = solve(&problem);
    assert_eq!(version_of(&assignment, "app"), "1.0");
    assert_eq!(version_of(&assignment, "lib"), "2.0");
}

#[test]
fn test_unsatisfiable_version_reports_conflict() {
    let provider = universe(vec![PackageFacts::new("zlib").version("1.3")]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("zlib").with_version(ver("2.0:"))],
    );

    let err = Solver::new(&problem).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
    assert!(err.to_string().contains("zlib"));
}

#[test]
fn test_default_variants_chosen() {
    let provider = universe(vec![PackageFacts::new("hdf5")
        .version("1.12")
        .variant(VariantDef::boolean("mpi", false))
        .variant(VariantDef::one_of(
            "build_type",
            "Release",
            ["Debug", "Release"],
        ))]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("hdf5")]);

    let assignment = solve(&problem);
    assert_eq!(variant_of(&assignment, "hdf5", "mpi"), VariantValue::Bool(false));
    assert_eq!(
        variant_of(&assignment, "hdf5", "build_type"),
        VariantValue::Single("Release".into())
    );
}

#[test]
fn test_requested_variant_value_honored() {
    let provider = universe(vec![PackageFacts::new("hdf5")
        .version("1.12")
        .variant(VariantDef::boolean("mpi", false))]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("hdf5").with_variant(VariantConstraint::enabled("mpi"))],
    );

    let assignment = solve(&problem);
    assert_eq!(variant_of(&assignment, "hdf5", "mpi"), VariantValue::Bool(true));
}

#[test]
fn test_requested_variant_backtracks_to_supporting_version() {
    // debug support exists only up to 2.0; requesting +debug must pull the
    // solved version down from the newest 3.0.
    let provider = universe(vec![PackageFacts::new("gdbm")
        .version("3.0")
        .version("2.0")
        .variant(
            VariantDef::boolean("debug", false)
                .when(AbstractSpec::anonymous().with_version(ver(":2.0"))),
        )]);
    let config = ConcretizerConfig::default();

    let free = compile(&provider, &config, vec![root("gdbm")]);
    assert_eq!(version_of(&solve(&free), "gdbm"), "3.0");

    let debug = compile(
        &provider,
        &config,
        vec![root("gdbm").with_variant(VariantConstraint::enabled("debug"))],
    );
    let assignment = solve(&debug);
    assert_eq!(version_of(&assignment, "gdbm"), "2.0");
    assert_eq!(
        variant_of(&assignment, "gdbm", "debug"),
        VariantValue::Bool(true)
    );
}

#[test]
fn test_conditional_variant_absent_below_version_guard() {
    let provider = universe(vec![PackageFacts::new("hdf5")
        .version("1.12")
        .version("1.8")
        .variant(
            VariantDef::boolean("mpi", false)
                .when(AbstractSpec::anonymous().with_version(ver("1.10:"))),
        )]);
    let config = ConcretizerConfig::default();

    let new = compile(
        &provider,
        &config,
        vec![root("hdf5").with_version(ver("1.12"))],
    );
    assert!(solve(&new).find_node("hdf5").unwrap().variants.contains_key("mpi"));

    let old = compile(
        &provider,
        &config,
        vec![root("hdf5").with_version(ver("1.8"))],
    );
    assert!(solve(&old).find_node("hdf5").unwrap().variants.is_empty());

    // Requesting the variant below the guard is an error, not a silent drop.
    let bad = compile(
        &provider,
        &config,
        vec![root("hdf5")
            .with_version(ver("1.8"))
            .with_variant(VariantConstraint::enabled("mpi"))],
    );
    let err = Solver::new(&bad).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
}

#[test]
fn test_variant_propagation_reaches_dependencies() {
    let provider = universe(vec![
        PackageFacts::new("trilinos")
            .version("14.0")
            .variant(VariantDef::boolean("shared", false))
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("zlib")
            .version("1.3")
            .variant(VariantDef::boolean("shared", false)),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("trilinos").with_variant(VariantConstraint::enabled("shared").propagated())],
    );

    let assignment = solve(&problem);
    assert_eq!(
        variant_of(&assignment, "trilinos", "shared"),
        VariantValue::Bool(true)
    );
    // Propagation constrains dependencies that declare the variant too.
    assert_eq!(
        variant_of(&assignment, "zlib", "shared"),
        VariantValue::Bool(true)
    );
}

#[test]
fn test_propagation_skips_packages_without_the_variant() {
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .variant(VariantDef::boolean("debug", false))
            .depends_on(DependencyCondition::on("tool")),
        PackageFacts::new("tool").version("2.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("app").with_variant(VariantConstraint::enabled("debug").propagated())],
    );

    let assignment = solve(&problem);
    assert!(assignment.find_node("tool").unwrap().variants.is_empty());
}

#[test]
fn test_conflict_rule_forces_backtrack() {
    // hwloc@2.0 conflicts with +cuda; the solver falls back to 1.9.
    let provider = universe(vec![PackageFacts::new("hwloc")
        .version("2.0")
        .version("1.9")
        .variant(VariantDef::boolean("cuda", false))
        .conflict(
            AbstractSpec::anonymous().with_version(ver("2.0:")),
            AbstractSpec::anonymous().with_variant(VariantConstraint::enabled("cuda")),
        )]);
    let config = ConcretizerConfig::default();

    let plain = compile(&provider, &config, vec![root("hwloc")]);
    assert_eq!(version_of(&solve(&plain), "hwloc"), "2.0");

    let cuda = compile(
        &provider,
        &config,
        vec![root("hwloc").with_variant(VariantConstraint::enabled("cuda"))],
    );
    let assignment = solve(&cuda);
    assert_eq!(version_of(&assignment, "hwloc"), "1.9");
    assert_eq!(variant_of(&assignment, "hwloc", "cuda"), VariantValue::Bool(true));
}

#[test]
fn test_virtual_resolved_to_configured_provider() {
    let provider = universe(vec![
        PackageFacts::new("hdf5")
            .version("1.12")
            .depends_on(DependencyCondition::on("mpi")),
        PackageFacts::new("openmpi").version("4.1").provides("mpi"),
        PackageFacts::new("mpich").version("4.0").provides("mpi"),
    ]);
    let mut config = ConcretizerConfig::default();
    config
        .providers
        .insert("mpi".to_string(), vec!["mpich".to_string()]);
    let problem = compile(&provider, &config, vec![root("hdf5")]);

    let assignment = solve(&problem);
    assert!(assignment.find_node("mpich").is_some());
    assert!(assignment.find_node("openmpi").is_none());

    let edge = assignment
        .edges_from(assignment.roots[0])
        .next()
        .unwrap();
    assert!(edge.virtuals.contains("mpi"));
}

#[test]
fn test_user_hint_forces_virtual_provider() {
    let provider = universe(vec![
        PackageFacts::new("hdf5")
            .version("1.12")
            .depends_on(DependencyCondition::on("mpi")),
        PackageFacts::new("openmpi").version("4.1").provides("mpi"),
        PackageFacts::new("mpich").version("4.0").provides("mpi"),
    ]);
    let mut config = ConcretizerConfig::default();
    config
        .providers
        .insert("mpi".to_string(), vec!["mpich".to_string()]);
    let problem = compile(
        &provider,
        &config,
        vec![root("hdf5").with_dependency(DepRequest::on(AbstractSpec::named("openmpi")))],
    );

    // The explicit dependency request overrides the configured preference.
    let assignment = solve(&problem);
    assert!(assignment.find_node("openmpi").is_some());
    assert!(assignment.find_node("mpich").is_none());
}

#[test]
fn test_user_pin_against_declared_dependency_constraint() {
    // y declares z@:2.0; a compatible pin narrows the choice, a pin
    // outside the declared range is a hard conflict.
    let provider = universe(vec![
        PackageFacts::new("y").version("1.0").depends_on(
            DependencyCondition::on("z")
                .constrained(AbstractSpec::named("z").with_version(ver(":2.0"))),
        ),
        PackageFacts::new("z").version("3.0").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();

    let narrowed = compile(
        &provider,
        &config,
        vec![root("y").with_dependency(DepRequest::on(
            AbstractSpec::named("z").with_version(ver("1.0")),
        ))],
    );
    let assignment = solve(&narrowed);
    assert_eq!(version_of(&assignment, "z"), "1.0");
    assert_eq!(assignment.edges.len(), 1);

    let pinned_out = compile(
        &provider,
        &config,
        vec![root("y").with_dependency(DepRequest::on(
            AbstractSpec::named("z").with_version(ver("3.0")),
        ))],
    );
    let err = Solver::new(&pinned_out).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
    assert!(err.to_string().contains('z'));
}

#[test]
fn test_conditional_provider_rejected_outside_guard() {
    // intel-mpi only provides mpi from 2019 on; an older request must fall
    // through to the other provider.
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .depends_on(DependencyCondition::on("mpi")),
        PackageFacts::new("intel-mpi")
            .version("2017")
            .provides_when("mpi", AbstractSpec::anonymous().with_version(ver("2019:"))),
        PackageFacts::new("mpich").version("4.0").provides("mpi"),
    ]);
    let mut config = ConcretizerConfig::default();
    config
        .providers
        .insert("mpi".to_string(), vec!["intel-mpi".to_string(), "mpich".to_string()]);
    let problem = compile(&provider, &config, vec![root("app")]);

    let assignment = solve(&problem);
    assert!(assignment.find_node("mpich").is_some());
    assert!(assignment.find_node("intel-mpi").is_none());
}

#[test]
fn test_unify_conflict_between_roots_cites_shared_package() {
    let provider = universe(vec![
        PackageFacts::new("p").version("1.0").depends_on(
            DependencyCondition::on("r").constrained(
                AbstractSpec::named("r").with_variant(VariantConstraint::enabled("shared")),
            ),
        ),
        PackageFacts::new("q").version("1.0").depends_on(
            DependencyCondition::on("r").constrained(
                AbstractSpec::named("r").with_variant(VariantConstraint::disabled("shared")),
            ),
        ),
        PackageFacts::new("r")
            .version("1.0")
            .variant(VariantDef::boolean("shared", true)),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("p"), root("q")]);

    let err = Solver::new(&problem).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
    assert!(err.to_string().contains('r'));
}

#[test]
fn test_disjoint_deptypes_allow_distinct_nodes() {
    // app runs tool@2 at runtime; lib needs tool@1 only to build. The two
    // requests never overlap in phase, so two tool nodes are legal.
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .depends_on(DependencyCondition::on("lib"))
            .depends_on(
                DependencyCondition::on("tool")
                    .constrained(AbstractSpec::named("tool").with_version(ver("2.0")))
                    .deptypes(DepTypes::RUN),
            ),
        PackageFacts::new("lib").version("1.0").depends_on(
            DependencyCondition::on("tool")
                .constrained(AbstractSpec::named("tool").with_version(ver("1.0")))
                .deptypes(DepTypes::BUILD),
        ),
        PackageFacts::new("tool").version("2.0").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("app")]);

    let assignment = solve(&problem);
    let tools: Vec<&str> = assignment
        .nodes
        .iter()
        .filter(|n| n.name == "tool")
        .map(|n| n.version.as_str())
        .collect();
    assert_eq!(tools.len(), 2);
    assert!(tools.contains(&"2.0"));
    assert!(tools.contains(&"1.0"));
}

#[test]
fn test_overlapping_deptypes_forbid_distinct_nodes() {
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .depends_on(DependencyCondition::on("lib"))
            .depends_on(
                DependencyCondition::on("tool")
                    .constrained(AbstractSpec::named("tool").with_version(ver("2.0"))),
            ),
        PackageFacts::new("lib").version("1.0").depends_on(
            DependencyCondition::on("tool")
                .constrained(AbstractSpec::named("tool").with_version(ver("1.0"))),
        ),
        PackageFacts::new("tool").version("2.0").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("app")]);

    let err = Solver::new(&problem).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
}

#[test]
fn test_shared_dependency_unifies_to_one_node() {
    let provider = universe(vec![
        PackageFacts::new("a")
            .version("1.0")
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("b")
            .version("1.0")
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("zlib").version("1.3"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("a"), root("b")]);

    let assignment = solve(&problem);
    let zlibs = assignment.nodes.iter().filter(|n| n.name == "zlib").count();
    assert_eq!(zlibs, 1);
    assert_eq!(assignment.edges.len(), 2);
}

#[test]
fn test_reuse_candidate_substituted_as_leaf() {
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .depends_on(DependencyCondition::on("zlib")),
        // Reused zlib would pull in extra deps if expanded fresh.
        PackageFacts::new("zlib")
            .version("1.3")
            .depends_on(DependencyCondition::on("pkgconf")),
        PackageFacts::new("pkgconf").version("2.0"),
    ]);
    let config = ConcretizerConfig::default();
    let reused = ReusableSpec {
        snapshot: SpecSnapshot::new("zlib")
            .with_version(Version::parse("1.3").unwrap())
            .with_arch(config.host_arch.clone()),
        hash: "abcd1234".to_string(),
        provenance: SourceKind::Local,
        external: false,
        prefix: Some(PathBuf::from("/opt/store/zlib-1.3")),
        modules: Vec::new(),
        libc: None,
    };
    let problem = Compiler::new(&provider, &config)
        .compile(&[root("app")], vec![reused])
        .unwrap();

    let (assignment, stats) = Solver::new(&problem).solve().unwrap();
    let zlib = assignment.find_node("zlib").unwrap();
    assert!(zlib.reused);
    assert_eq!(zlib.reuse_hash.as_deref(), Some("abcd1234"));
    // The reused node is a substitution; its recipe deps are not re-expanded.
    assert!(assignment.find_node("pkgconf").is_none());
    assert_eq!(stats.reused_nodes, 1);
    assert_eq!(stats.fresh_nodes, 1);
}

#[test]
fn test_reuse_skipped_when_constraints_exclude_it() {
    let provider = universe(vec![PackageFacts::new("zlib").version("1.3").version("1.2")]);
    let config = ConcretizerConfig::default();
    let reused = ReusableSpec {
        snapshot: SpecSnapshot::new("zlib")
            .with_version(Version::parse("1.2").unwrap())
            .with_arch(config.host_arch.clone()),
        hash: "old00000".to_string(),
        provenance: SourceKind::Local,
        external: false,
        prefix: None,
        modules: Vec::new(),
        libc: None,
    };
    let problem = Compiler::new(&provider, &config)
        .compile(&[root("zlib").with_version(ver("1.3:"))], vec![reused])
        .unwrap();

    let assignment = solve(&problem);
    let zlib = assignment.find_node("zlib").unwrap();
    assert!(!zlib.reused);
    assert_eq!(zlib.version.as_str(), "1.3");
}

#[test]
fn test_unbuildable_package_resolves_to_external() {
    let provider = universe(vec![PackageFacts::new("openssl").version("3.0").version("1.1")]);
    let mut config = ConcretizerConfig::default();
    config.packages.insert(
        "openssl".to_string(),
        PackageSettings {
            buildable: false,
            externals: vec![ExternalEntry {
                spec: AbstractSpec::named("openssl").with_version(ver("1.1")),
                prefix: PathBuf::from("/usr"),
                modules: Vec::new(),
            }],
            ..PackageSettings::default()
        },
    );
    let problem = compile(&provider, &config, vec![root("openssl")]);

    let assignment = solve(&problem);
    let openssl = assignment.find_node("openssl").unwrap();
    assert_eq!(openssl.version.as_str(), "1.1");
    assert_eq!(openssl.external.as_deref(), Some(std::path::Path::new("/usr")));
}

#[test]
fn test_unbuildable_package_without_match_fails() {
    let provider = universe(vec![PackageFacts::new("openssl").version("3.0")]);
    let mut config = ConcretizerConfig::default();
    config.packages.insert(
        "openssl".to_string(),
        PackageSettings {
            buildable: false,
            ..PackageSettings::default()
        },
    );
    let problem = compile(&provider, &config, vec![root("openssl")]);

    let err = Solver::new(&problem).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
    assert!(err.to_string().contains("not buildable"));
}

#[test]
fn test_configured_requirement_narrows_versions() {
    let provider = universe(vec![PackageFacts::new("zlib").version("1.3").version("1.2")]);
    let mut config = ConcretizerConfig::default();
    config.packages.insert(
        "zlib".to_string(),
        PackageSettings {
            require: vec![AbstractSpec::anonymous().with_version(ver(":1.2"))],
            ..PackageSettings::default()
        },
    );
    let problem = compile(&provider, &config, vec![root("zlib")]);

    assert_eq!(version_of(&solve(&problem), "zlib"), "1.2");
}

#[test]
fn test_configured_preference_reorders_versions() {
    let provider = universe(vec![PackageFacts::new("gcc")
        .version("14.1")
        .version("13.2")
        .version("12.3")]);
    let mut config = ConcretizerConfig::default();
    config.packages.insert(
        "gcc".to_string(),
        PackageSettings {
            prefer: vec![AbstractSpec::anonymous().with_version(ver("13.2"))],
            ..PackageSettings::default()
        },
    );
    let problem = compile(&provider, &config, vec![root("gcc")]);

    // Soft preference, so it wins by ordering, not by exclusion.
    assert_eq!(version_of(&solve(&problem), "gcc"), "13.2");

    let pinned = compile(&provider, &config, vec![root("gcc").with_version(ver("14.1"))]);
    assert_eq!(version_of(&solve(&pinned), "gcc"), "14.1");
}

#[test]
fn test_checksum_mode_skips_unverifiable_versions() {
    let mut with_sum = PackageFacts::new("zlib").version("1.3").version("1.2");
    with_sum.versions[1].sha256 = Some("00".repeat(32));
    let provider = universe(vec![with_sum]);

    let mut config = ConcretizerConfig::default();
    config.checksum = true;
    let problem = compile(&provider, &config, vec![root("zlib")]);

    // 1.3 has no checksum, so 1.2 is the newest usable release.
    assert_eq!(version_of(&solve(&problem), "zlib"), "1.2");
}

#[test]
fn test_forbidden_edge_set_blocks_cyclic_assignment() {
    let provider = universe(vec![
        PackageFacts::new("a")
            .version("1.0")
            .depends_on(DependencyCondition::on("b").deptypes(DepTypes::LINK)),
        PackageFacts::new("b")
            .version("1.0")
            .depends_on(DependencyCondition::on("a").deptypes(DepTypes::RUN)),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("a")]);

    // Without the forbidden set the cycle solves fine at this layer.
    assert!(Solver::new(&problem).solve().is_ok());

    let forbidden = problem.with_forbidden(vec![ForbiddenEdgeSet {
        edges: vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ],
    }]);
    let err = Solver::new(&forbidden).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
}

#[test]
fn test_budget_exhaustion_is_a_timeout() {
    let provider = universe(vec![
        PackageFacts::new("app")
            .version("1.0")
            .depends_on(DependencyCondition::on("lib")),
        PackageFacts::new("lib").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("app")]);

    let err = Solver::new(&problem).with_budget(1).solve().unwrap_err();
    assert!(matches!(err, ConcretizeError::SolverTimeout { .. }));
}

#[test]
fn test_deterministic_assignments() {
    let provider = universe(vec![
        PackageFacts::new("hdf5")
            .version("1.12")
            .variant(VariantDef::boolean("mpi", true))
            .depends_on(DependencyCondition::on("mpi").when(
                AbstractSpec::anonymous().with_variant(VariantConstraint::enabled("mpi")),
            ))
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("openmpi").version("4.1").provides("mpi"),
        PackageFacts::new("mpich").version("4.0").provides("mpi"),
        PackageFacts::new("zlib").version("1.3"),
    ]);
    let mut config = ConcretizerConfig::default();
    config
        .providers
        .insert("mpi".to_string(), vec!["openmpi".to_string()]);
    let problem = compile(&provider, &config, vec![root("hdf5")]);

    let first = solve(&problem);
    for _ in 0..5 {
        assert_eq!(solve(&problem).canonical_bytes(), first.canonical_bytes());
    }
}

#[test]
fn test_conditional_dependency_follows_own_attributes() {
    // msmpi only below 2.0; the chosen 3.0 must not pull it in.
    let provider = universe(vec![
        PackageFacts::new("lib")
            .version("3.0")
            .version("1.5")
            .depends_on(
                DependencyCondition::on("legacy-shim")
                    .when(AbstractSpec::anonymous().with_version(ver(":2.0"))),
            ),
        PackageFacts::new("legacy-shim").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();

    let new = compile(&provider, &config, vec![root("lib")]);
    assert!(solve(&new).find_node("legacy-shim").is_none());

    let old = compile(&provider, &config, vec![root("lib").with_version(ver("1.5"))]);
    assert!(solve(&old).find_node("legacy-shim").is_some());
}

#[test]
fn test_variant_conditioned_dependency() {
    let provider = universe(vec![
        PackageFacts::new("hdf5")
            .version("1.12")
            .variant(VariantDef::boolean("mpi", false))
            .depends_on(DependencyCondition::on("mpich").when(
                AbstractSpec::anonymous().with_variant(VariantConstraint::enabled("mpi")),
            )),
        PackageFacts::new("mpich").version("4.0"),
    ]);
    let config = ConcretizerConfig::default();

    let plain = compile(&provider, &config, vec![root("hdf5")]);
    assert!(solve(&plain).find_node("mpich").is_none());

    let mpi = compile(
        &provider,
        &config,
        vec![root("hdf5").with_variant(VariantConstraint::enabled("mpi"))],
    );
    assert!(solve(&mpi).find_node("mpich").is_some());
}

#[test]
fn test_rounds_coalesce_on_shared_dependencies() {
    let provider = universe(vec![
        PackageFacts::new("a")
            .version("1.0")
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("b")
            .version("1.0")
            .depends_on(DependencyCondition::on("zlib")),
        PackageFacts::new("zlib").version("1.3"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(&provider, &config, vec![root("a"), root("b")]);

    let outcome = solve_in_rounds(&problem, 10_000).unwrap();
    assert_eq!(outcome.solved.len(), 2);
    assert_eq!(outcome.rounds, 1);

    // The second root's zlib node was substituted from the first solution.
    let second = &outcome.solved[1].assignment;
    assert!(second.find_node("zlib").unwrap().reused);
}

#[test]
fn test_rounds_surface_unsolvable_roots() {
    let provider = universe(vec![
        PackageFacts::new("good").version("1.0"),
        PackageFacts::new("bad").version("1.0"),
    ]);
    let config = ConcretizerConfig::default();
    let problem = compile(
        &provider,
        &config,
        vec![root("good"), root("bad").with_version(ver("9.9:"))],
    );

    let err = solve_in_rounds(&problem, 10_000).unwrap_err();
    match err {
        ConcretizeError::OutputDoesNotSatisfyInput { unsolved } => {
            // The stalled root and its cause travel with the error.
            assert_eq!(unsolved.len(), 1);
            assert!(unsolved[0].contains("bad"));
        }
        other => panic!("expected a no-progress error, got {other}"),
    }
}

#[test]
fn test_infinity_version_not_chosen_unless_requested() {
    let provider = universe(vec![PackageFacts::new("llvm").version("main").version("18.1")]);
    let config = ConcretizerConfig::default();

    // `main` compares above every release but ranks after them as a
    // candidate.
    let free = compile(&provider, &config, vec![root("llvm")]);
    assert_eq!(version_of(&solve(&free), "llvm"), "18.1");

    let tracking = compile(
        &provider,
        &config,
        vec![root("llvm").with_version(ver("18.1:"))],
    );
    // An open upper bound admits main, but the release still wins.
    assert_eq!(version_of(&solve(&tracking), "llvm"), "18.1");

    let pinned = compile(&provider, &config, vec![root("llvm").with_version(ver("main"))]);
    assert_eq!(version_of(&solve(&pinned), "llvm"), "main");
}
