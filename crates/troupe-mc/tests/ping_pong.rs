//! End-to-end: two machines exchange events under several strategies.

use std::sync::Arc;
use troupe_machine::{Event, MachineContext, MachineDecl, StateDecl, Value};
use troupe_mc::{Config, IterationDriver, Runtime, StrategyKind};

fn pong_decl() -> Arc<MachineDecl> {
    MachineDecl::new(
        "Pong",
        vec![StateDecl::new("Serving").on(
            "Ping",
            |ctx: &mut dyn MachineContext, event: &Event| {
                let requester = event.payload.as_id().expect("ping carries the sender id");
                ctx.send(requester, Event::new("Pong"))
            },
        )],
    )
}

fn ping_decl() -> Arc<MachineDecl> {
    MachineDecl::new(
        "Ping",
        vec![StateDecl::new("Playing")
            .on_entry(|ctx: &mut dyn MachineContext| {
                let pong = ctx.create(pong_decl(), Some("Pong".to_string()))?;
                ctx.send(pong, Event::with_payload("Ping", Value::Id(ctx.self_id())))
            })
            .on("Pong", |_ctx: &mut dyn MachineContext, _event: &Event| Ok(()))],
    )
}

#[test]
fn hundred_random_iterations_terminate_cleanly() {
    let config = Config {
        num_iterations: 100,
        strategy: StrategyKind::Random,
        seed: Some(7),
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(|rt: &Arc<Runtime>| {
        rt.create_machine(ping_decl(), Some("Ping".to_string()))?;
        Ok(())
    });
    assert_eq!(report.num_bugs, 0, "bugs: {:?}", report.bug_reports);
    assert_eq!(report.num_explored_unfair_schedules, 100);
    assert_eq!(report.num_explored_fair_schedules, 0);
}

#[test]
fn dfs_exhausts_the_schedule_space() {
    let config = Config {
        num_iterations: 10_000,
        strategy: StrategyKind::Dfs,
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(|rt: &Arc<Runtime>| {
        rt.create_machine(ping_decl(), Some("Ping".to_string()))?;
        Ok(())
    });
    assert_eq!(report.num_bugs, 0, "bugs: {:?}", report.bug_reports);
    // The tree of a two-machine exchange is small and finite: the strategy
    // finished long before the iteration budget.
    assert!(report.num_explored_unfair_schedules >= 2);
    assert!(report.num_explored_unfair_schedules < 10_000);
}

#[test]
fn combo_iterations_count_as_fair_schedules() {
    let config = Config {
        num_iterations: 20,
        strategy: StrategyKind::Combo,
        seed: Some(3),
        safety_prefix_bound: 3,
        max_fair_steps: 10_000,
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(|rt: &Arc<Runtime>| {
        rt.create_machine(ping_decl(), Some("Ping".to_string()))?;
        Ok(())
    });
    assert_eq!(report.num_bugs, 0, "bugs: {:?}", report.bug_reports);
    assert_eq!(report.num_explored_fair_schedules, 20);
    assert_eq!(report.num_explored_unfair_schedules, 0);
    assert!(report.min_explored_fair_steps >= 0);
    assert!(report.max_explored_fair_steps >= report.min_explored_fair_steps);
    assert!(report.total_explored_fair_steps > 0);
}

#[test]
fn priority_and_delay_bounded_strategies_stay_clean() {
    for strategy in [StrategyKind::PriorityBounded, StrategyKind::DelayBounded] {
        let config = Config {
            num_iterations: 25,
            strategy,
            seed: Some(11),
            ..Config::default()
        };
        let mut driver = IterationDriver::new(config);
        let report = driver.run(|rt: &Arc<Runtime>| {
            rt.create_machine(ping_decl(), Some("Ping".to_string()))?;
            Ok(())
        });
        assert_eq!(report.num_bugs, 0, "bugs: {:?}", report.bug_reports);
        assert_eq!(report.num_explored_unfair_schedules, 25);
    }
}

#[test]
fn at_most_one_machine_is_active_at_any_moment() {
    use troupe_mc::strategy::{shared, RandomStrategy};

    let config = Arc::new(Config {
        seed: Some(5),
        ..Config::default()
    });
    let rt = Runtime::new(
        config,
        shared(Box::new(RandomStrategy::new(5, 0))),
        Arc::new(parking_lot::Mutex::new(None)),
        Arc::new(parking_lot::Mutex::new(None)),
        None,
    );
    rt.create_machine(ping_decl(), Some("Ping".to_string()))
        .unwrap();
    // Sample the records while the exploration runs. The turn holder is the
    // machine that is both active and enabled; teardown force-activates
    // disabled records to unpark them, which must not count.
    for _ in 0..500 {
        let active = rt
            .scheduler()
            .machine_infos()
            .iter()
            .filter(|info| info.is_active() && info.is_enabled())
            .count();
        assert!(active <= 1, "two machines active at once");
        if !rt.scheduler().is_running() {
            break;
        }
    }
    rt.wait().unwrap();
    assert!(rt.bug_report().is_none());
}

#[test]
fn trace_records_every_handoff_and_choice() {
    // A single machine whose entry draws two booleans and one integer: the
    // trace must contain exactly those choices plus one grant per
    // scheduling point that picked a machine.
    let decl = MachineDecl::new(
        "Chooser",
        vec![StateDecl::new("Init").on_entry(|ctx: &mut dyn MachineContext| {
            ctx.random_bool(2)?;
            ctx.random_bool(2)?;
            ctx.random_int(4)?;
            Ok(())
        })],
    );
    let config = Config {
        num_iterations: 1,
        strategy: StrategyKind::Random,
        seed: Some(2),
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(move |rt: &Arc<Runtime>| {
        rt.create_machine(decl.clone(), None)?;
        Ok(())
    });
    assert_eq!(report.num_bugs, 0, "bugs: {:?}", report.bug_reports);
    let trace = driver.last_trace().expect("one iteration ran");
    assert_eq!(trace.nondet_choices(), 3);
    // The bootstrap machine starts without a grant; the only recorded grant
    // is the scheduling point after its entry body.
    assert_eq!(trace.schedule_choices(), 1);
}
