#[cfg(test)]
pub mod job_tests {
    use super::super::*;
    use crate::interface::{self, Coordinator, Errno, JobEntry};
    use std::thread;

    #[test]
    pub fn ut_job_many_workers() {
        setup_logging();
        let coordinator = Coordinator::new();
        let runner = coordinator.spawn();

        let results: Vec<i32> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let coordinator = coordinator.clone();
                    s.spawn(move || {
                        (0..50)
                            .map(|j| {
                                let value = i * 1000 + j;
                                coordinator.run_job(Box::new(move |entry: JobEntry| entry.finish(value)))
                            })
                            .sum::<i32>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // every worker got back exactly its own values
        for (i, sum) in results.into_iter().enumerate() {
            let i = i as i32;
            assert_eq!(sum, (0..50).map(|j| i * 1000 + j).sum::<i32>());
        }
        runner.shutdown();
    }

    #[test]
    pub fn ut_job_completes_from_elsewhere() {
        setup_logging();
        let coordinator = Coordinator::new();
        let runner = coordinator.spawn();

        // the job returns at once; a later callback reports the result, like a
        // host completion would
        let poster = coordinator.clone();
        let result = coordinator.run_job(Box::new(move |entry: JobEntry| {
            let again = poster.clone();
            thread::spawn(move || {
                thread::sleep(interface::RustDuration::from_millis(20));
                again.post(move || entry.finish(99));
            });
        }));
        assert_eq!(result, 99);
        runner.shutdown();
    }

    #[test]
    pub fn ut_job_dropped_entry() {
        let coordinator = Coordinator::new();
        let runner = coordinator.spawn();
        let result = coordinator.run_job(Box::new(|entry: JobEntry| {
            let _ = entry.id();
        }));
        assert_eq!(result, Errno::EIO.as_retval());
        runner.shutdown();
    }

    #[test]
    pub fn ut_job_refused_on_coordinator_thread() {
        let coordinator = Coordinator::new();
        assert!(!coordinator.is_coordinator_thread());
        // pumping claims this thread even with nothing queued
        assert!(!coordinator.do_work());
        assert!(coordinator.is_coordinator_thread());
        assert_eq!(
            coordinator.run_job(Box::new(|entry: JobEntry| entry.finish(0))),
            Errno::EDEADLK.as_retval()
        );
        assert_eq!(coordinator.pending(), 0);
    }

    #[test]
    pub fn ut_job_submit_order() {
        let coordinator = Coordinator::new();
        let order = interface::RustRfc::new(interface::Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            coordinator.submit(Box::new(move |entry: JobEntry| {
                order.lock().push(i);
                entry.finish(0);
            }));
        }
        let tail = order.clone();
        coordinator.post(move || tail.lock().push(5));
        assert_eq!(coordinator.pending(), 6);

        while coordinator.do_work() {}
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(coordinator.pending(), 0);
    }

    #[test]
    pub fn ut_job_shutdown() {
        let coordinator = Coordinator::new();
        let ran = interface::RustRfc::new(interface::RustAtomicBool::new(false));
        let flag = ran.clone();
        let waiter = {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                coordinator.run_job(Box::new(move |entry: JobEntry| {
                    flag.store(true, interface::RustAtomicOrdering::SeqCst);
                    entry.finish(0);
                }))
            })
        };
        while coordinator.pending() == 0 {
            thread::yield_now();
        }
        coordinator.shutdown();
        assert_eq!(waiter.join().unwrap(), Errno::EIO.as_retval());
        assert!(!ran.load(interface::RustAtomicOrdering::SeqCst));
        assert!(!coordinator.wait_and_do_work());
    }
}
