use rwfair::{LockState, Policy, RawRwLock, RwLock};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// Spin until `cond` holds, failing the test if it takes unreasonably long.
fn wait_for<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(1));
    }
}

fn check_mutual_exclusion(policy: Policy) {
    let lock = RawRwLock::new(policy);
    let readers_inside = AtomicUsize::new(0);
    let writers_inside = AtomicUsize::new(0);

    thread::scope(|s| {
        for i in 0..8 {
            let lock = &lock;
            let readers_inside = &readers_inside;
            let writers_inside = &writers_inside;

            s.spawn(move || {
                for n in 0..500 {
                    if (i + n) % 4 == 0 {
                        lock.acquire_write();
                        assert_eq!(writers_inside.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers_inside.load(Ordering::SeqCst), 0);

                        let state = lock.state();
                        assert!(state.writer);
                        assert_eq!(state.readers, 0);

                        thread::yield_now();
                        writers_inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release_write();
                    } else {
                        lock.acquire_read();
                        readers_inside.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers_inside.load(Ordering::SeqCst), 0);
                        assert!(!lock.state().writer);

                        thread::yield_now();
                        readers_inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release_read();
                    }
                }
            });
        }
    });

    assert!(lock.state().is_idle());
    assert_eq!(lock.state().waiting_writers, 0);
}

#[test]
fn mutual_exclusion_with_reader_preference() {
    check_mutual_exclusion(Policy::ReaderPreference);
}

#[test]
fn mutual_exclusion_with_writer_preference() {
    check_mutual_exclusion(Policy::WriterPreference);
}

#[test]
fn waiting_writer_holds_back_new_readers() {
    let lock = RawRwLock::writer_preference();
    let order = Mutex::new(Vec::new());
    let second_reader_in = AtomicBool::new(false);

    // first reader
    lock.acquire_read();

    thread::scope(|s| {
        let writer = s.spawn(|| {
            lock.acquire_write();
            order.lock().unwrap().push("writer");
            lock.release_write();
        });

        wait_for(|| lock.state().waiting_writers == 1);

        let reader = s.spawn(|| {
            lock.acquire_read();
            second_reader_in.store(true, Ordering::SeqCst);
            order.lock().unwrap().push("reader");
            lock.release_read();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!second_reader_in.load(Ordering::SeqCst));
        assert_eq!(
            lock.state(),
            LockState {
                readers: 1,
                writer: false,
                waiting_writers: 1
            }
        );

        lock.release_read();

        writer.join().unwrap();
        reader.join().unwrap();
    });

    assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
    assert!(lock.state().is_idle());
}

#[test]
fn waiting_writer_does_not_hold_back_readers_under_reader_preference() {
    let lock = RawRwLock::reader_preference();
    let writer_done = AtomicBool::new(false);

    lock.acquire_read();

    thread::scope(|s| {
        let writer = s.spawn(|| {
            lock.acquire_write();
            writer_done.store(true, Ordering::SeqCst);
            lock.release_write();
        });

        wait_for(|| lock.state().waiting_writers == 1);

        // gets in and out while the first reader is still inside
        s.spawn(|| {
            lock.acquire_read();
            lock.release_read();
        })
        .join()
        .unwrap();

        assert!(!writer_done.load(Ordering::SeqCst));
        assert_eq!(lock.state().waiting_writers, 1);

        lock.release_read();
        writer.join().unwrap();
    });

    assert!(writer_done.load(Ordering::SeqCst));
    assert!(lock.state().is_idle());
}

#[test]
fn releasing_writer_wakes_every_waiting_reader() {
    for policy in [Policy::ReaderPreference, Policy::WriterPreference] {
        let lock = RawRwLock::new(policy);
        let all_inside = Barrier::new(3);
        let admitted = AtomicUsize::new(0);

        lock.acquire_write();

        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    lock.acquire_read();
                    admitted.fetch_add(1, Ordering::SeqCst);
                    // only passes if all three readers hold the lock at once
                    all_inside.wait();
                    lock.release_read();
                });
            }

            thread::sleep(Duration::from_millis(20));
            assert_eq!(admitted.load(Ordering::SeqCst), 0);

            lock.release_write();
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 3);
        assert!(lock.state().is_idle());
    }
}

#[test]
fn writers_take_turns() {
    let lock = RawRwLock::writer_preference();
    let finished = AtomicUsize::new(0);

    lock.acquire_write();

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                lock.acquire_write();
                finished.fetch_add(1, Ordering::SeqCst);
                lock.release_write();
            });
        }

        wait_for(|| lock.state().waiting_writers == 2);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        lock.release_write();
    });

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert!(lock.state().is_idle());
}

#[test]
fn guarded_value_sees_every_write() {
    let lock = RwLock::new(0u64, Policy::WriterPreference);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1000 {
                    *lock.write() += 1;
                    let seen = *lock.read();
                    assert!(seen >= 1);
                }
            });
        }
    });

    assert_eq!(lock.into_inner(), 4000);
}
