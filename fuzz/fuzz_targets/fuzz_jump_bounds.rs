#![no_main]

use corokit::Coroutine;
use libfuzzer_sys::fuzz_target;

const MAX_EXECS: usize = 4096;

/// Program counters must stay inside `[0, max(0, len - 1)]` under any mix
/// of appends, direct jumps, label jumps and advances.
fuzz_target!(|data: &[u8]| {
    let co: Coroutine<u8> = Coroutine::new();
    let mut execs = 0usize;

    for chunk in data.chunks(2) {
        let op = chunk[0] % 6;
        let arg = chunk.get(1).copied().unwrap_or(0);

        match op {
            0 => {
                co.append(|_| Ok(()));
            }
            1 => {
                co.append(move |co| {
                    co.yield_value(arg);
                    Ok(())
                });
            }
            2 => {
                // Steps that jump somewhere arbitrary while running.
                co.append(move |co| {
                    co.jump(arg as usize);
                    Ok(())
                });
            }
            3 => {
                co.jump(arg as usize * 257);
            }
            4 => {
                co.append_labeled(&format!("l{}", arg % 8), |_| Ok(()));
                co.jump_label(&format!("l{}", arg % 4));
            }
            _ => {
                if execs < MAX_EXECS {
                    execs += 1;
                    let _ = co.exec();
                    let _ = co.take_yield_value();
                }
            }
        }

        // The invariant: jumps never leave the program bounds. The natural
        // increment may sit one past the end, which is the stop position.
        let len = co.len();
        assert!(co.pc() <= len);
        if op == 3 || op == 4 {
            assert!(co.pc() == 0 || co.pc() < len);
        }
    }
});
