//! State machine, program store, jumps, globals and the yield slot

use corokit::{Coroutine, State, Var};

use super::{collect, drain};

#[test]
fn new_coroutine_starts_created() {
    let co: Coroutine<i32> = Coroutine::new();
    assert_eq!(co.state(), State::Created);
    assert_eq!(co.len(), 0);
    assert!(co.is_empty());
}

#[test]
fn append_returns_dense_indices() {
    let co: Coroutine<i32> = Coroutine::new();
    assert_eq!(co.append(|_| Ok(())), 0);
    assert_eq!(co.append(|_| Ok(())), 1);
    assert_eq!(co.append_labeled("top", |_| Ok(())), 2);
    assert_eq!(co.len(), 3);
    assert_eq!(co.resolve("top"), Some(2));
}

#[test]
fn labels_are_last_write_wins() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append_labeled("loop", |_| Ok(()));
    co.append_labeled("loop", |_| Ok(()));
    assert_eq!(co.resolve("loop"), Some(1));
    assert_eq!(co.resolve("missing"), None);
}

#[test]
fn jump_clamps_to_program_bounds() {
    let co: Coroutine<i32> = Coroutine::new();
    let hit = Var::new(Vec::new());
    for n in 0..3 {
        let hit = hit.clone();
        co.append(move |_| {
            hit.update(|h| h.push(n));
            Ok(())
        });
    }
    co.start();

    co.jump(usize::MAX);
    assert_eq!(co.pc(), 2);
    drain(&co);
    // Only the clamped target executed.
    assert_eq!(hit.get(), vec![2]);
    assert!(co.is_stopped());
}

#[test]
fn jump_on_empty_program_stays_at_zero() {
    let co: Coroutine<i32> = Coroutine::new();
    co.jump(usize::MAX);
    assert_eq!(co.pc(), 0);
    assert!(matches!(co.exec(), Ok(false)));
}

#[test]
fn unknown_label_jump_is_a_noop() {
    let co: Coroutine<i32> = Coroutine::new();
    let hit = Var::new(Vec::new());
    for n in 0..2 {
        let hit = hit.clone();
        co.append(move |_| {
            hit.update(|h| h.push(n));
            Ok(())
        });
    }
    co.start();
    co.jump_label("nowhere");
    assert_eq!(co.pc(), 0);
    drain(&co);
    assert_eq!(hit.get(), vec![0, 1]);
}

#[test]
fn label_jump_skips_forward() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append(|co| {
        co.jump_label("end");
        Ok(())
    });
    co.append(|co| {
        co.yield_value(1);
        Ok(())
    });
    co.append_labeled("end", |_| Ok(()));
    co.start();
    assert_eq!(collect(&co), Vec::<i32>::new());
}

#[test]
fn globals_round_trip() {
    let co: Coroutine<i32> = Coroutine::new();
    co.set_value("count", 7);
    assert_eq!(co.get_value("count"), Some(7));
    co.set_value("count", 8);
    assert_eq!(co.get_value("count"), Some(8));
    assert_eq!(co.get_value("other"), None);
}

#[test]
fn clear_drops_program_and_globals() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append(|_| Ok(()));
    co.append_labeled("mark", |_| Ok(()));
    co.set_value("count", 1);
    co.clear();
    assert!(co.is_empty());
    assert_eq!(co.resolve("mark"), None);
    assert_eq!(co.get_value("count"), None);
}

#[test]
fn yield_suspends_and_take_consumes_once() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append(|co| {
        co.yield_value(42);
        Ok(())
    });
    co.start();
    drain(&co);

    assert!(co.is_yielding());
    assert_eq!(co.take_yield_value(), Some(42));
    // Second read without an intervening advance: nothing pending.
    assert_eq!(co.take_yield_value(), None);
}

#[test]
fn exec_reports_no_progress_while_suspended() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append(|co| {
        co.yield_value(1);
        Ok(())
    });
    co.append(|_| Ok(()));
    co.start();

    assert!(matches!(co.exec(), Ok(false)));
    assert!(co.is_yielding());
    assert_eq!(co.take_yield_value(), Some(1));
    // Resume: the remaining step runs and the program ends.
    drain(&co);
    assert!(co.is_stopped());
}

#[test]
fn stop_is_terminal_for_exec() {
    let co: Coroutine<i32> = Coroutine::new();
    co.append(|co| {
        co.yield_value(1);
        Ok(())
    });
    co.start();
    co.stop();
    assert_eq!(co.state(), State::Stopped);
    assert!(matches!(co.exec(), Ok(false)));
    assert!(co.is_stopped());
}

#[test]
fn reset_replays_the_identical_sequence() {
    let co: Coroutine<i32> = Coroutine::new();
    let i = Var::new(0);
    let (init_i, cond_i, step_i, body_i) = (i.clone(), i.clone(), i.clone(), i.clone());
    co.for_loop(
        move |_| {
            init_i.set(0);
            Ok(())
        },
        move || cond_i.get() < 4,
        move |_| {
            step_i.update(|v| *v += 1);
            Ok(())
        },
    )
    .run(move |co| {
        co.yield_value(body_i.get() * 10);
        Ok(())
    });
    co.start();

    let first = collect(&co);
    assert_eq!(first, vec![0, 10, 20, 30]);
    assert!(co.is_stopped());

    co.reset();
    assert_eq!(co.state(), State::Created);
    co.start();
    let second = collect(&co);
    assert_eq!(second, first);
}

#[test]
fn with_builds_inline() {
    let co = Coroutine::with(|co| {
        co.append(|co| {
            co.yield_value(5);
            Ok(())
        });
    });
    co.start();
    assert_eq!(collect(&co), vec![5]);
}

#[test]
fn display_prefers_the_debug_name() {
    let co: Coroutine<i32> = Coroutine::new();
    assert!(co.to_string().starts_with("coroutine-"));
    co.set_name("pump");
    assert_eq!(co.to_string(), "pump");
    assert_eq!(co.name().as_deref(), Some("pump"));
}
