use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::{Arg, Command, value_parser};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trellis_engine::prelude::*;
use trellis_engine::store::MemoryStore;
use trellis_engine::timetrack::EntrySpec;
use trellis_engine::types::ProjectId;

struct AllowAll;

impl PermissionOracle for AllowAll {
    fn may_set_status(&self, _actor: UserId, _task: &Task, _to: TaskStatus) -> bool {
        true
    }
}

fn demo_collaborators() -> (Arc<MemoryStore>, Arc<EventLog>, Collaborators) {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventLog::new());
    let collaborators = Collaborators {
        tasks: Arc::clone(&store) as Arc<dyn TaskStore>,
        entries: Arc::clone(&store) as Arc<dyn TimeEntryStore>,
        calendar: Arc::new(WeekdayCalendar::standard()),
        clock: Arc::new(SystemClock),
        permissions: Arc::new(AllowAll),
        sink: Arc::clone(&events) as Arc<dyn EventSink>,
    };
    (store, events, collaborators)
}

fn run_schedule_demo(chain_len: usize) -> Result<()> {
    let (store, events, collaborators) = demo_collaborators();
    let engine = WorkflowEngine::new(collaborators);

    let workspace = WorkspaceId::new();
    let project = ProjectId::new();
    let actor = UserId::new();

    let mut chain = Vec::new();
    for i in 0..chain_len {
        let mut task = Task::new(workspace, project, format!("step {}", i + 1));
        task.duration_estimate_min = Some(8 * 60);
        store.insert_task(task.clone());
        chain.push(task);
    }

    for pair in chain.windows(2) {
        engine.add_link(DependencyLink {
            source: pair[0].id,
            target: pair[1].id,
            link_type: LinkType::FinishToStart,
        })?;
    }

    let kickoff = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    engine.set_schedule(
        chain[0].id,
        ScheduleUpdate {
            start_date: Some(kickoff),
            due_date: None,
            duration_estimate_min: Some(8 * 60),
            pinned_start: true,
        },
    )?;

    println!("Schedule after forward pass:");
    for task in &chain {
        let task = store.load_task(task.id)?;
        println!(
            "  {:<10} {:?}  start={:?}  due={:?}",
            task.title, task.status, task.start_date, task.due_date
        );
    }

    println!("\nCompleting the chain head...");
    engine.transition_task(
        chain[0].id,
        TaskStatus::InProgress,
        TransitionRequest::UserRequested { actor },
    )?;

    println!("\nEvents emitted ({}):", events.len());
    for event in events.snapshot() {
        println!("  {}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn run_timer_demo() -> Result<()> {
    let (_, events, collaborators) = demo_collaborators();
    let engine = WorkflowEngine::new(collaborators);

    let workspace = WorkspaceId::new();
    let user = UserId::new();

    let entry = engine.start_timer(user, workspace, EntrySpec::default())?;
    println!("Started timer {}", entry.id);

    match engine.start_timer(user, workspace, EntrySpec::default()) {
        Err(EngineError::Time(TimeError::TimerAlreadyRunning(_))) => {
            println!("Second start rejected: timer already running");
        }
        other => println!("Unexpected: {other:?}"),
    }

    let closed = engine.stop_timer(user)?;
    println!("Stopped after {}s", closed.duration_secs);

    let nine = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    engine.create_manual_entry(
        user,
        workspace,
        nine,
        nine + Duration::hours(1),
        EntrySpec {
            billable: true,
            ..EntrySpec::default()
        },
    )?;
    match engine.create_manual_entry(
        user,
        workspace,
        nine + Duration::minutes(30),
        nine + Duration::minutes(90),
        EntrySpec::default(),
    ) {
        Err(EngineError::Time(TimeError::OverlappingEntry { .. })) => {
            println!("Overlapping manual entry rejected");
        }
        other => println!("Unexpected: {other:?}"),
    }

    let summary = engine.summarize_user(user, None, GroupBy::Day)?;
    println!(
        "Summary: total={}s billable={}s non-billable={}s",
        summary.overall.total_secs, summary.overall.billable_secs,
        summary.overall.non_billable_secs
    );

    println!("\nEvents emitted ({}):", events.len());
    for event in events.snapshot() {
        println!("  {}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Command::new("trellis")
        .version(trellis_engine::VERSION)
        .about("Trellis workflow engine demo harness")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("schedule")
                .about("Run the dependency-chain scheduling demo")
                .arg(
                    Arg::new("tasks")
                        .long("tasks")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Length of the finish-to-start chain"),
                ),
        )
        .subcommand(Command::new("timers").about("Run the time-tracking demo"));

    match cli.get_matches().subcommand() {
        Some(("schedule", args)) => {
            let tasks = *args.get_one::<usize>("tasks").unwrap();
            run_schedule_demo(tasks.max(2))
        }
        Some(("timers", _)) => run_timer_demo(),
        _ => unreachable!("arg_required_else_help"),
    }
}
