use crate::render::{Event, Renderer};
use crate::*;
use std::collections::HashSet;

fn processor() -> Processor {
    Processor::new(CompileOptions::default(), Box::new(MemoryLoader::new()))
}

/// Every relation's source finishes before its target starts
fn assert_topological(schedule: &Schedule, trace: &[Event]) {
    for relation in schedule.relations() {
        let finish = trace.iter().position(|e| *e == Event::Finish(relation.source));
        let start = trace.iter().position(|e| *e == Event::Start(relation.target));
        match (finish, start) {
            (Some(finish), Some(start)) => assert!(finish < start, "{:?} out of order", relation),
            other => panic!("{:?} never ran: {:?}", relation, other),
        }
    }
}

#[test]
fn test_documents_render_in_dependency_order() {
    let docs = [
        "@section{Intro}{Hello.}@subsection{More}{Text.}",
        "@list{@item{a}@item{b @enum{@item{c}@item{d}}}}after",
        "@table{1 2}{@row{@tab x@br y @tab z}@row{@span{2} wide}}",
        "@dlist{@item{term} one @item{longer term} two}",
        "@contents{2 3}@chapter{A}{a}@section{B}{b}",
    ];
    for doc in docs {
        let mut p = processor();
        let schedule = p.schedule("doc.lp", doc).unwrap();
        let (_, trace) = Renderer::new(&schedule, false).render();
        assert_topological(&schedule, &trace);

        let started: Vec<ContextId> = trace
            .iter()
            .filter_map(|e| match e {
                Event::Start(id) => Some(*id),
                Event::Finish(_) => None,
            })
            .collect();
        let unique: HashSet<ContextId> = started.iter().copied().collect();
        assert_eq!(started.len(), unique.len(), "context started twice in {doc:?}");
        assert_eq!(unique.len(), schedule.len(), "context never started in {doc:?}");
    }
}

#[test]
fn test_schedule_root_is_page_wide() {
    let options = CompileOptions {
        width: 40,
        ..CompileOptions::default()
    };
    let mut p = Processor::new(options, Box::new(MemoryLoader::new()));
    let schedule = p.schedule("doc.lp", "@list{@item{a}}").unwrap();
    let root = schedule.root().unwrap();
    assert_eq!(schedule.context(root).left, 0);
    assert_eq!(schedule.context(root).right, 40);
    for relation in schedule.relations() {
        assert_ne!(relation.target, root);
    }
}

#[test]
fn test_stage_dumps() {
    let mut p = processor();
    let shards = p.parse_only("doc.lp", "@section{Intro}{Body}").unwrap();
    let dump = shard::dump(shards, shards.root()).to_string();
    assert!(dump.contains(r#""command":"section""#));

    let gems = p.grind_only("doc.lp", "@section{Intro}{Body}").unwrap();
    let dump = gem::dump(gems, gems.root()).to_string();
    assert!(dump.contains(r#""type":"title3""#));
    assert!(dump.contains(r#""text":"Intro""#));
}

#[test]
fn test_unknown_command_is_reported() {
    let mut p = processor();
    let out = p.compile("doc.lp", "one\n@zap two").unwrap();
    assert_eq!(out, "one @zap two\n");
    let diagnostics = p.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(diagnostics[0].location, Location::new("doc.lp", 2));

    p.compile("doc.lp", "clean").unwrap();
    assert!(p.diagnostics().is_empty());
}

#[test]
fn test_missing_required_file_fails() {
    let err = processor().compile("doc.lp", "@require{gone.lp}").unwrap_err();
    assert!(matches!(err, DocError::RequireFailed { ref path, .. } if path == "gone.lp"));
    assert_eq!(err.location().line, 1);
}

#[test]
fn test_unbalanced_input_fails() {
    let err = processor().compile("doc.lp", "a }").unwrap_err();
    assert!(matches!(err, DocError::UnbalancedBlock { .. }));
}

#[test]
fn test_prelude_can_be_disabled() {
    let options = CompileOptions {
        prelude: false,
        ..CompileOptions::default()
    };
    let mut p = Processor::new(options, Box::new(MemoryLoader::new()));
    let out = p.compile("doc.lp", "@caps{quiet}").unwrap();
    assert_eq!(out, "quiet\n");
    assert_eq!(processor().compile("doc.lp", "@caps{quiet}").unwrap(), "QUIET\n");
}
