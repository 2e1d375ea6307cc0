#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use troupe_machine::{Event, MachineContext, MachineDecl, StateDecl, Value};
use troupe_mc::{Config, IterationDriver, Runtime, StrategyKind};

fn ping_decl() -> Arc<MachineDecl> {
    MachineDecl::new(
        "Ping",
        vec![StateDecl::new("Playing")
            .on_entry(|ctx: &mut dyn MachineContext| {
                let pong = ctx.create(
                    MachineDecl::new(
                        "Pong",
                        vec![StateDecl::new("Serving").on(
                            "Ping",
                            |ctx: &mut dyn MachineContext, event: &Event| {
                                if let Some(requester) = event.payload.as_id() {
                                    if ctx.random_bool(2)? {
                                        ctx.send(requester, Event::new("Pong"))?;
                                    }
                                }
                                Ok(())
                            },
                        )],
                    ),
                    None,
                )?;
                ctx.send(pong, Event::with_payload("Ping", Value::Id(ctx.self_id())))
            })
            .on("Pong", |_ctx: &mut dyn MachineContext, _event: &Event| Ok(()))],
    )
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 10 {
        return;
    }
    let seed = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let strategy = match data[8] % 6 {
        0 => StrategyKind::Random,
        1 => StrategyKind::Dfs,
        2 => StrategyKind::Iddfs,
        3 => StrategyKind::PriorityBounded,
        4 => StrategyKind::DelayBounded,
        _ => StrategyKind::Combo,
    };
    let config = Config {
        num_iterations: (data[9] % 8 + 1) as usize,
        strategy,
        seed: Some(seed),
        max_fair_steps: 128,
        max_unfair_steps: 64,
        safety_prefix_bound: 8,
        ..Config::default()
    };
    let mut driver = IterationDriver::new(config);
    let report = driver.run(|rt: &Arc<Runtime>| {
        rt.create_machine(ping_decl(), Some("Ping".to_string()))?;
        Ok(())
    });
    // The program has no bugs; whatever the schedule, none may be reported.
    assert_eq!(report.num_bugs, 0, "false positive: {:?}", report.bug_reports);
});
