use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Barrier,
    },
    thread,
    time::Duration,
};

use xdp_lwf::{driver, BindingState, LwfOptions};

use crate::{unbound, SERVICE};

const PROCESSORS: usize = 4;

#[test]
fn stop_waits_for_in_flight_operations() {
    let (_, binding) = unbound(LwfOptions::default(), PROCESSORS);
    driver::start(&binding, &crate::driver(), SERVICE).unwrap();
    let binding = &binding;

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        s.spawn(move || {
            let active = binding.enter().unwrap();
            entered_tx.send(()).unwrap();

            release_rx.recv().unwrap();
            active.increment(1, 10);
        });

        entered_rx.recv().unwrap();
        let stopper = s.spawn(|| driver::stop(binding));

        while binding.state() != BindingState::Stopping {
            thread::yield_now();
        }

        // New entries are refused while the in-flight one holds the binding up.
        assert!(binding.enter().is_none());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(binding.state(), BindingState::Stopping);
        assert!(!stopper.is_finished());

        release_tx.send(()).unwrap();
        stopper.join().unwrap();
    });

    assert_eq!(binding.state(), BindingState::Unbound);
    assert_eq!(binding.last_snapshot().unwrap().total, 10);
}

#[test]
fn stop_drains_concurrent_increments() {
    const PER_PROCESSOR: u64 = 250;

    let (_, binding) = unbound(LwfOptions::default(), PROCESSORS);
    driver::start(&binding, &crate::driver(), SERVICE).unwrap();

    let applied = AtomicU64::new(0);
    let entered = Barrier::new(PROCESSORS + 1);
    let released = Barrier::new(PROCESSORS + 1);

    thread::scope(|s| {
        for processor in 0..PROCESSORS {
            let (binding, applied) = (&binding, &applied);
            let (entered, released) = (&entered, &released);

            s.spawn(move || {
                let active = binding.enter().unwrap();
                entered.wait();
                released.wait();

                // Every update lands while the stop is already waiting on this guard.
                for _ in 0..PER_PROCESSOR {
                    active.increment(processor, 1);
                    applied.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                }
            });
        }

        entered.wait();
        let stopper = s.spawn(|| driver::stop(&binding));

        while binding.state() != BindingState::Stopping {
            thread::yield_now();
        }

        assert!(binding.enter().is_none());
        assert!(!stopper.is_finished());

        released.wait();
        stopper.join().unwrap();
    });

    let snapshot = binding.last_snapshot().unwrap();

    assert_eq!(applied.load(Ordering::Relaxed), PER_PROCESSOR * PROCESSORS as u64);
    assert_eq!(snapshot.total, 1000);
    assert_eq!(snapshot.per_processor, vec![PER_PROCESSOR; PROCESSORS]);
    assert_eq!(binding.state(), BindingState::Unbound);
    assert!(binding.enter().is_none());
}

#[test]
fn all_updates_land_without_a_stop() {
    const PER_PROCESSOR: u64 = 250;

    let (_, binding) = unbound(LwfOptions::default(), PROCESSORS);
    driver::start(&binding, &crate::driver(), SERVICE).unwrap();

    thread::scope(|s| {
        for processor in 0..PROCESSORS {
            let binding = &binding;

            s.spawn(move || {
                for _ in 0..PER_PROCESSOR {
                    binding.enter().unwrap().increment(processor, 1);
                }
            });
        }
    });

    assert_eq!(binding.aggregate(), Some(PER_PROCESSOR * PROCESSORS as u64));
    assert!(binding.instances().iter().all(|instance| instance.processed == PER_PROCESSOR));

    driver::stop(&binding);
    assert_eq!(binding.last_snapshot().unwrap().total, 1000);
}
