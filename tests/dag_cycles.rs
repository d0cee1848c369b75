use planrunner::dag::DagGraph;
use planrunner::errors::PlanRunnerError;
use planrunner_test_utils::{PlanSpecBuilder, TaskSpecBuilder};

#[test]
fn builds_topological_order_for_a_linear_chain() {
    let plan = PlanSpecBuilder::new("chain")
        .with_task(TaskSpecBuilder::new("a", &["true"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c", &["true"]).depends_on("b").build())
        .build();

    let dag = DagGraph::build(&plan).expect("acyclic plan");
    let order = dag.topological_order();

    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
}

#[test]
fn rejects_a_direct_cycle() {
    let plan = PlanSpecBuilder::new("cycle")
        .with_task(TaskSpecBuilder::new("a", &["true"]).depends_on("b").build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .build();

    let err = DagGraph::build(&plan).unwrap_err();
    assert!(matches!(err, PlanRunnerError::Plan(_)));
}

#[test]
fn rejects_a_cycle_spanning_more_than_two_nodes() {
    let plan = PlanSpecBuilder::new("triangle")
        .with_task(TaskSpecBuilder::new("a", &["true"]).depends_on("c").build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c", &["true"]).depends_on("b").build())
        .build();

    let err = DagGraph::build(&plan).unwrap_err();
    match err {
        PlanRunnerError::Plan(msg) => {
            assert!(msg.contains('a') && msg.contains('b') && msg.contains('c'));
        }
        other => panic!("expected PlanError, got {other:?}"),
    }
}

#[test]
fn topological_order_is_deterministic_across_builds() {
    let build_plan = || {
        PlanSpecBuilder::new("fanout")
            .with_task(TaskSpecBuilder::new("root", &["true"]).build())
            .with_task(TaskSpecBuilder::new("left", &["true"]).depends_on("root").build())
            .with_task(TaskSpecBuilder::new("right", &["true"]).depends_on("root").build())
            .with_task(
                TaskSpecBuilder::new("mid", &["true"])
                    .depends_on("root")
                    .build(),
            )
            .with_task(
                TaskSpecBuilder::new("join", &["true"])
                    .depends_on("left")
                    .depends_on("right")
                    .depends_on("mid")
                    .build(),
            )
            .build()
    };

    let first = DagGraph::build(&build_plan()).unwrap().topological_order();
    let second = DagGraph::build(&build_plan()).unwrap().topological_order();
    assert_eq!(first, second);
}

#[test]
fn reports_dependents_and_dependencies() {
    let plan = PlanSpecBuilder::new("fanout")
        .with_task(TaskSpecBuilder::new("a", &["true"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c", &["true"]).depends_on("a").build())
        .build();

    let dag = DagGraph::build(&plan).unwrap();
    let mut dependents = dag.dependents_of("a").to_vec();
    dependents.sort();
    assert_eq!(dependents, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(dag.dependencies_of("b"), &["a".to_string()]);
}
