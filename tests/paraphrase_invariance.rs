//! Different phrasings of the same instruction must compile to the same
//! package: same derived id, same operations, same diff.

mod helpers;

use attacca::host::ProjectHost;
use attacca::pipeline::Compiler;

use helpers::{demo_project, ready};

const PHRASINGS: &[&str] = &[
    "make the chorus brighter",
    "brighten the chorus",
    "boost the brightness of the chorus",
    "increase the brightness of the chorus",
];

#[test]
fn brightness_phrasings_compile_to_one_package() {
    let host = demo_project();
    let mut packages = Vec::new();
    for phrasing in PHRASINGS {
        let mut compiler = Compiler::new().unwrap();
        let edit = ready(compiler.compile(&host, phrasing).unwrap());
        packages.push((phrasing, edit.package));
    }
    let (_, first) = &packages[0];
    for (phrasing, package) in &packages[1..] {
        assert_eq!(package.id, first.id, "{:?} compiled differently", phrasing);
        assert_eq!(package.operations, first.operations, "{:?}", phrasing);
        assert_eq!(package.diff, first.diff, "{:?}", phrasing);
        assert_eq!(package.inverse, first.inverse, "{:?}", phrasing);
    }
}

#[test]
fn compilation_is_deterministic_across_runs() {
    let host = demo_project();
    let compile = || {
        let mut compiler = Compiler::new().unwrap();
        ready(compiler.compile(&host, "make the chorus sparser").unwrap()).package
    };
    let first = compile();
    let second = compile();
    assert_eq!(first.id, second.id);
    assert_eq!(first.diff, second.diff);
    assert_eq!(first.explanation, second.explanation);
}

#[test]
fn synonym_verbs_share_a_reading() {
    let host = demo_project();
    let mut quieter = Compiler::new().unwrap();
    let mut lowered = Compiler::new().unwrap();
    let a = ready(quieter.compile(&host, "make the chorus quieter").unwrap());
    let b = ready(lowered.compile(&host, "reduce the loudness of the chorus").unwrap());
    assert_eq!(a.package.id, b.package.id);
    assert_eq!(a.package.diff, b.package.diff);
}
