//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "test"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Cross-thread freeze isolation checks for the tag memory."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;

use fieldsim_memory::TagMemory;

#[test]
fn writes_from_other_threads_stay_shadowed_until_thaw() {
    let memory = Arc::new(TagMemory::new());
    memory.register_internal_analog("x", 1.0);

    memory.freeze().unwrap();

    let writer = {
        let memory = memory.clone();
        thread::spawn(move || {
            memory.update_analog("x", 2.0).unwrap();
        })
    };
    writer.join().unwrap();

    assert_eq!(memory.analog_value("x"), Ok(1.0));

    memory.unfreeze().unwrap();
    assert_eq!(memory.analog_value("x"), Ok(2.0));
}

#[test]
fn exclusive_lock_groups_writes_against_concurrent_drains() {
    let memory = Arc::new(TagMemory::new());
    memory.register_external_analog("a", "io-a");
    memory.register_external_analog("b", "io-b");
    memory.add_analog_module("io-a", "dev-a");
    memory.add_analog_module("io-b", "dev-b");
    memory.add_analog_device("dev-a");
    memory.add_analog_device("dev-b");

    // Writer batches two updates under the exclusive lock; the drain below
    // takes the same lock, so it sees both updates or neither.
    let writer = {
        let memory = memory.clone();
        thread::spawn(move || {
            let _batch = memory.exclusive();
            memory.update_analog("a", 1.0).unwrap();
            thread::yield_now();
            memory.update_analog("b", 2.0).unwrap();
        })
    };

    writer.join().unwrap();

    let mut seen = Vec::new();
    {
        let _batch = memory.exclusive();
        memory
            .drain_analog_outputs(|device, value| -> Result<(), ()> {
                seen.push((device.to_owned(), value));
                Ok(())
            })
            .unwrap();
    }

    seen.sort_by(|l, r| l.0.cmp(&r.0));
    assert_eq!(seen, vec![("dev-a".to_owned(), 1.0), ("dev-b".to_owned(), 2.0)]);
}
