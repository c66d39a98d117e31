//! Wanderer
//!
//! This example drives two actors with a manual clock and the in-memory router.
//!
//! Key concepts:
//! - States and substates named with the `state_ids!` macro
//! - Substate timers that stop on their own when the substate changes
//! - Broadcasting to every actor of a type
//! - Pushing a temporary behavior that pops itself when done
//!
//! Run with: cargo run --example wanderer

use actorstack::builder::ManagerBuilder;
use actorstack::config::EngineConfig;
use actorstack::core::{
    ActorId, ActorType, Event, Hook, Layer, MessageName, QueueId, StateId, SubstateId, Value,
};
use actorstack::env::{ActorRecord, ManualClock};
use actorstack::machine::{Behavior, Context};
use actorstack::manager::StateMachineManager;
use actorstack::scheduling::{pump, Message, MessageRouter};
use actorstack::state_ids;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

state_ids! {
    enum Step: SubstateId {
        Look,
        Walk,
    }
}

state_ids! {
    enum Watch: StateId {
        Idle,
        Alarmed,
    }
}

const WANDERER: ActorType = ActorType(1);
const WATCHER: ActorType = ActorType(2);

/// Seconds per simulated frame.
const STEP: f32 = 0.25;

const TICK: MessageName = MessageName("tick");
const THREAT: MessageName = MessageName("threat");
const SPOTTED: MessageName = MessageName("spotted");

/// Alternates between looking around and walking until a threat shows up.
struct Wander;

impl Behavior for Wander {
    fn name(&self) -> &str {
        "wander"
    }

    fn dispatch(
        &mut self,
        ctx: &mut Context<'_>,
        event: Event,
        msg: Option<&Message>,
        layer: Layer,
    ) -> bool {
        match (layer, event) {
            (Layer::State(_) | Layer::Substate(..), Event::Probe) => {
                ctx.responds_to(Hook::Enter);
                true
            }
            (Layer::State(_), Event::Enter) => ctx.change_substate(Step::Look).is_ok(),
            (Layer::Substate(_, step), Event::Enter) => {
                let name = Step::try_from(step).map_or("?", |s| s.name());
                println!("  [{:>4.1}s] wanderer: {name}", ctx.now());
                ctx.set_timer_substate(TICK, 1.0, Value::Unset);
                true
            }
            (Layer::Substate(_, step), Event::Message) if is(msg, TICK) => {
                let next = if step == Step::Look {
                    Step::Walk
                } else {
                    Step::Look
                };
                ctx.change_substate(next).is_ok()
            }
            (Layer::Global, Event::Message) if is(msg, THREAT) => {
                println!("  [{:>4.1}s] wanderer: threat! fleeing", ctx.now());
                ctx.push_machine(Box::new(Flee)).is_ok()
            }
            _ => false,
        }
    }
}

/// Runs for a short while, then hands control back.
struct Flee;

impl Behavior for Flee {
    fn name(&self) -> &str {
        "flee"
    }

    fn dispatch(
        &mut self,
        ctx: &mut Context<'_>,
        event: Event,
        _msg: Option<&Message>,
        layer: Layer,
    ) -> bool {
        match (layer, event) {
            (Layer::State(_), Event::Probe) => {
                ctx.responds_to(Hook::Update);
                true
            }
            (Layer::State(_), Event::Update) if ctx.time_in_state() >= 1.5 => {
                println!("  [{:>4.1}s] wanderer: safe again", ctx.now());
                ctx.pop_machine().is_ok()
            }
            (Layer::State(_), Event::Update) => true,
            _ => false,
        }
    }
}

/// Warns every wanderer once it spots something, then stays alarmed.
struct Watchtower;

impl Behavior for Watchtower {
    fn name(&self) -> &str {
        "watchtower"
    }

    fn dispatch(
        &mut self,
        ctx: &mut Context<'_>,
        event: Event,
        msg: Option<&Message>,
        layer: Layer,
    ) -> bool {
        match (layer, event) {
            (Layer::State(s), Event::Message) if s == Watch::Idle && is(msg, SPOTTED) => {
                println!("  [{:>4.1}s] watcher: raising the alarm", ctx.now());
                ctx.broadcast_now(THREAT, WANDERER, Value::Unset);
                ctx.change_state(Watch::Alarmed).is_ok()
            }
            _ => false,
        }
    }
}

fn is(msg: Option<&Message>, name: MessageName) -> bool {
    msg.is_some_and(|m| m.name == name)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Wanderer Example ===\n");

    let clock = Rc::new(ManualClock::new());
    let config = EngineConfig::default();
    let router = Rc::new(RefCell::new(MessageRouter::new(clock.clone(), &config)));

    let spawn = |id: ActorId, kind: ActorType, behavior: Box<dyn Behavior>| {
        ManagerBuilder::new()
            .actor(Rc::new(ActorRecord::with_type(id, kind)))
            .scheduler(router.clone())
            .clock(clock.clone())
            .config(config.clone())
            .initial(QueueId(0), behavior)
            .build()
    };

    let wanderer = ActorId(1);
    let watcher = ActorId(2);
    let mut world: HashMap<ActorId, StateMachineManager> = HashMap::new();
    world.insert(wanderer, spawn(wanderer, WANDERER, Box::new(Wander))?);
    world.insert(watcher, spawn(watcher, WATCHER, Box::new(Watchtower))?);

    for frame in 0..32 {
        if frame == 12 {
            let sighting = Message::new(SPOTTED, watcher, watcher, Value::Unset);
            if let Some(manager) = world.get_mut(&watcher) {
                manager.send_msg(&sighting)?;
            }
        }

        for manager in world.values_mut() {
            manager.update()?;
        }
        pump(&router, &mut world)?;
        clock.advance(STEP);
    }

    println!();
    for (id, manager) in [(wanderer, "wanderer"), (watcher, "watcher")] {
        if let Some(active) = world.get(&id).and_then(|m| m.active(QueueId(0))) {
            println!(
                "{manager}: behavior={} state={:?} substate={:?}",
                active.name(),
                active.state(),
                active.substate()
            );
        }
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
