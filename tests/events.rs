//! Integration tests for subscriber ordering, fault isolation and cancellation.

use std::{
    sync::{Arc, Mutex},
    thread,
};

use hostpatch::prelude::*;

fn recorder(
    calls: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
) -> impl Fn(&mut AddingTarget) + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |_| calls.lock().unwrap().push(name)
}

#[test]
fn test_each_handler_runs_once_in_order_despite_faults() {
    let _ = env_logger::builder().is_test(true).try_init();

    let bus = EventBus::new();
    let calls = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe_named("a", recorder(&calls, "a"));
    bus.subscribe_fallible("broken", |_: &mut AddingTarget| {
        Err(Error::Handler("always fails".to_string()))
    });
    bus.subscribe_named("b", recorder(&calls, "b"));
    bus.subscribe_named("panicking", |_: &mut AddingTarget| panic!("boom"));
    bus.subscribe_named("c", recorder(&calls, "c"));

    let mut ev = AddingTarget::new(PlayerId(1), PlayerId(2), 5.0);
    assert!(bus.publish(&mut ev));
    assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_cancellation_is_monotonic_for_well_behaved_handlers() {
    let bus = EventBus::new();
    bus.subscribe(|ev: &mut TogglingFlashlight| ev.deny());
    bus.subscribe(|ev: &mut TogglingFlashlight| {
        // Well-behaved handlers only ever deny
        if ev.new_state() {
            ev.deny();
        }
    });
    bus.subscribe(|ev: &mut TogglingFlashlight| ev.set_new_state(!ev.new_state()));

    let mut ev = TogglingFlashlight::new(PlayerId(4), ItemSerial(1), true);
    assert!(!bus.publish(&mut ev));
    assert!(!ev.is_allowed());
    assert!(!ev.new_state());
}

#[test]
fn test_flag_is_last_write_wins() {
    let bus = EventBus::new();
    bus.subscribe(|ev: &mut UnlockingGenerator| ev.deny());
    bus.subscribe(|ev: &mut UnlockingGenerator| ev.set_allowed(true));

    let mut ev = UnlockingGenerator::new(PlayerId(9), GeneratorId(2));
    assert!(bus.publish(&mut ev));
}

#[test]
fn test_output_fields_flow_back_to_publisher() {
    let bus = EventBus::new();
    bus.subscribe(|ev: &mut AddingTarget| {
        ev.set_enrage_time_to_add(ev.enrage_time_to_add() * 2.0);
    });

    let mut ev = AddingTarget::new(PlayerId(1), PlayerId(2), 3.0);
    assert!(bus.publish(&mut ev));
    assert_eq!(ev.enrage_time_to_add(), 6.0);
    assert_eq!(ev.target(), PlayerId(2));
}

#[test]
fn test_concurrent_subscription_and_publication() {
    let bus = Arc::new(EventBus::new());
    let total = Arc::new(Mutex::new(0usize));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let bus = Arc::clone(&bus);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                for _ in 0..25 {
                    let total = Arc::clone(&total);
                    bus.subscribe(move |_: &mut GainingLevel| *total.lock().unwrap() += 1);
                }
            })
        })
        .collect();

    let reader = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            for level in 0..50 {
                let mut ev = GainingLevel::new(PlayerId(1), level);
                bus.publish(&mut ev);
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(bus.subscriber_count::<GainingLevel>(), 100);
    *total.lock().unwrap() = 0;
    bus.publish(&mut GainingLevel::new(PlayerId(1), 1));
    assert_eq!(*total.lock().unwrap(), 100);
}
