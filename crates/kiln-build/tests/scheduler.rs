//! Worker pool behaviour over in-process workers.

mod common;

use std::time::Duration;

use common::{Project, eventually};
use kiln_build::{BuildError, SchedulerState};

fn scripts(project: &Project, names: &[(&str, &str)]) {
    for (name, code) in names {
        project.write(&format!("src/{name}"), code);
    }
}

#[tokio::test]
async fn pool_terminates_after_idle_window() {
    let project = Project::new();
    scripts(
        &project,
        &[
            ("a.js", "module.exports = 1;"),
            ("b.js", "module.exports = 2;"),
            ("c.js", "module.exports = 3;"),
            ("d.js", "module.exports = 4;"),
            ("e.js", "module.exports = 5;"),
        ],
    );
    let (builder, transport) = project.builder();
    assert_eq!(builder.scheduler().state(), SchedulerState::Idle);

    let report = builder.build_all().await.unwrap();
    assert_eq!(report.compiled, 5);
    assert_eq!(report.crashed, 0);
    assert_eq!(builder.scheduler().state(), SchedulerState::Draining);
    assert!(project.dist("e.js").is_file());

    tokio::time::timeout(
        Duration::from_secs(5),
        builder.scheduler().wait_for(SchedulerState::Terminated),
    )
    .await
    .expect("pool did not retire")
    .unwrap();
    assert_eq!(transport.live_workers(), 0);
}

#[tokio::test]
async fn retired_pool_serves_the_next_run() {
    let project = Project::new();
    scripts(&project, &[("a.js", "1"), ("b.js", "2")]);
    let (builder, _transport) = project.builder();

    builder.build_all().await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        builder.scheduler().wait_for(SchedulerState::Terminated),
    )
    .await
    .unwrap()
    .unwrap();

    project.write("src/a.js", "11");
    let report = builder.build_file(&project.src("a.js")).await.unwrap();
    assert_eq!(report.units, vec![project.src("a.js")]);
    assert_eq!(std::fs::read_to_string(project.dist("a.js")).unwrap(), "11");
}

#[tokio::test]
async fn compile_error_stops_the_run() {
    let project = Project::new();
    scripts(
        &project,
        &[
            ("a_fail.js", "// @fail"),
            ("b.js", "// @slow"),
            ("c.js", "// @slow"),
            ("d.js", "// @slow"),
            ("e.js", "// @slow"),
            ("f.js", "// @slow"),
        ],
    );
    let (builder, transport) = project.builder();

    match builder.build_all().await {
        Err(BuildError::Compile { unit, diagnostic }) => {
            assert_eq!(unit, project.src("a_fail.js"));
            assert_eq!(diagnostic, "scripted failure");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
    assert_eq!(builder.scheduler().state(), SchedulerState::Terminated);
    assert!(eventually(Duration::from_secs(5), || transport.live_workers() == 0).await);
    assert!(project.outputs().len() < 6);

    // The failure is reported once; the next run starts a fresh pool.
    project.write("src/a_fail.js", "// fixed");
    let report = builder.build_all().await.unwrap();
    assert_eq!(report.compiled, 6);
}

#[tokio::test]
async fn crashed_worker_completes_its_unit() {
    let project = Project::new();
    scripts(
        &project,
        &[
            ("a.js", "// @panic"),
            ("b.js", "1"),
            ("c.js", "2"),
            ("d.js", "3"),
        ],
    );
    let (builder, _transport) = project.builder();

    let report = builder.build_all().await.unwrap();
    assert_eq!(report.crashed, 1);
    assert_eq!(report.compiled, 3);
    assert_eq!(report.total(), 4);
    assert!(!project.dist("a.js").exists());
    assert!(project.dist("d.js").is_file());
}

#[tokio::test]
async fn concurrent_runs_are_served_in_order() {
    let project = Project::new();
    scripts(&project, &[("a.js", "// @slow"), ("b.js", "2"), ("c.js", "3")]);
    let (builder, _transport) = project.builder();
    let scheduler = builder.scheduler();

    let (first, second) = tokio::join!(
        scheduler.run(vec![project.src("a.js"), project.src("b.js")]),
        scheduler.run(vec![project.src("c.js")]),
    );
    assert_eq!(first.unwrap().outcomes.len(), 2);
    let second = second.unwrap();
    assert_eq!(second.outcomes.len(), 1);
    assert_eq!(second.outcomes[0].unit, project.src("c.js"));
}

#[tokio::test]
async fn duplicate_tasks_compile_once() {
    let project = Project::new();
    scripts(&project, &[("a.js", "1")]);
    let (builder, _transport) = project.builder();

    let run = builder
        .scheduler()
        .run(vec![project.src("a.js"), project.src("a.js")])
        .await
        .unwrap();
    assert_eq!(run.outcomes.len(), 1);
}

#[tokio::test]
async fn shutdown_stops_live_workers() {
    let project = Project::new();
    scripts(&project, &[("a.js", "1"), ("b.js", "2")]);
    let (builder, transport) = project.builder();

    builder.build_all().await.unwrap();
    assert!(transport.live_workers() > 0);
    builder.shutdown(Duration::from_secs(2)).await;
    assert!(eventually(Duration::from_secs(5), || transport.live_workers() == 0).await);
}
