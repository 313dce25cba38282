mod mock_hw;

use std::thread;
use std::time::Duration;

use eci::commands;
use eci::config::Config;
use eci::dispatcher::EventListener;
use eci::lifecycle::{Core, Lifecycle};
use eci::packet::EventRecord;
use mock_hw::{perform_block_read, perform_block_write, shared_pin};

/// Parse a block-read stream `[size, tagged_cmd, subcmd, ...payload]` and
/// build whatever response frame the simulated EC would send back.
fn build_response(read: &[u8]) -> Vec<u8> {
    let tagged_cmd = read[1];
    let subcmd = read[2];
    let (_, cmd) = eci::packet::split_tagged_command(tagged_cmd);

    if cmd == commands::CONTROL && subcmd == commands::CONTROL_GET_FIRMWARE_VERSION {
        vec![tagged_cmd, 0x06, subcmd, 0x00, 0x02, 0x00, 0x05, 0x00]
    } else {
        // Every other request in these tests (event-report enable/disable,
        // suspend, power-down) just needs a clean ack.
        vec![tagged_cmd, 0x02, subcmd, 0x00]
    }
}

/// Spin up the simulated EC on a background thread: answer exactly
/// `expected_requests` block-reads, retrying past synthesized no-ops.
fn spawn_ec_responder(core: std::sync::Arc<Core>, expected_requests: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut answered = 0;
        let mut guard_iterations = 0;
        while answered < expected_requests && guard_iterations < 1000 {
            guard_iterations += 1;
            let read = perform_block_read(&core, 0x8a);
            let tagged_cmd = read[1];
            let (_, cmd) = eci::packet::split_tagged_command(tagged_cmd);
            let is_no_op = cmd == commands::CONTROL
                && read.get(2).copied() == Some(commands::CONTROL_NO_OP);
            if is_no_op {
                thread::sleep(Duration::from_millis(2));
                continue;
            }
            let response = build_response(&read);
            perform_block_write(&core, 0x8a, &response);
            answered += 1;
        }
        assert_eq!(answered, expected_requests, "EC simulator ran out of polls");
    })
}

#[test]
fn probe_completes_when_ec_answers_the_handshake() {
    let pin = shared_pin();
    let core = Core::new(Config::default(), pin);
    let responder = spawn_ec_responder(core.clone(), 2); // firmware version + enable events

    let lifecycle = Lifecycle::probe(core).expect("EC simulator should satisfy the handshake");
    responder.join().unwrap();
    lifecycle.shutdown().unwrap();
}

#[test]
fn suspend_then_resume_round_trip() {
    let pin = shared_pin();
    let core = Core::new(Config::default(), pin);
    let responder = spawn_ec_responder(core.clone(), 2);
    let lifecycle = Lifecycle::probe(core).unwrap();
    responder.join().unwrap();

    let core_for_suspend = lifecycle.core();
    let responder = spawn_ec_responder(core_for_suspend, 2); // disable events + AP_SUSPEND
    lifecycle.suspend().unwrap();
    responder.join().unwrap();

    let core_for_resume = lifecycle.core();
    let responder = spawn_ec_responder(core_for_resume, 1); // enable events
    lifecycle.resume().unwrap();
    responder.join().unwrap();

    lifecycle.shutdown().unwrap();
}

struct CollectingListener {
    seen: std::sync::Mutex<Vec<EventRecord>>,
}

impl EventListener for CollectingListener {
    fn event_type(&self) -> Option<u8> {
        None
    }
    fn on_event(&self, record: &EventRecord) {
        self.seen.lock().unwrap().push(record.clone());
    }
}

#[test]
fn unsolicited_event_reaches_registered_listener() {
    let pin = shared_pin();
    let core = Core::new(Config::default(), pin);
    let responder = spawn_ec_responder(core.clone(), 2);
    let lifecycle = Lifecycle::probe(core).unwrap();
    responder.join().unwrap();

    let listener = std::sync::Arc::new(CollectingListener {
        seen: std::sync::Mutex::new(Vec::new()),
    });
    let core = lifecycle.core();
    core.add_event_listener(listener.clone());

    // EC writes an unsolicited fixed-2-byte keyboard event.
    perform_block_write(&core, 0x8a, &[0x85, 0x1C]);

    let mut waited = 0;
    while listener.seen.lock().unwrap().is_empty() && waited < 200 {
        thread::sleep(Duration::from_millis(5));
        waited += 1;
    }
    let seen = listener.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, 0x05);
    assert_eq!(&seen[0].payload[..], &[0x1C]);
    drop(seen);

    lifecycle.shutdown().unwrap();
}

#[test]
fn response_reordering_resolves_to_the_right_caller() {
    let pin = shared_pin();
    let core = Core::new(Config::default(), pin);
    let responder = spawn_ec_responder(core.clone(), 2);
    let lifecycle = Lifecycle::probe(core).unwrap();
    responder.join().unwrap();

    let core_a = lifecycle.core();
    let core_b = lifecycle.core();

    // Two distinct requests, answered out of submission order by a single
    // EC simulator thread that always answers whichever block-read it is
    // polled for next — since both callers enqueue before either is polled,
    // the EC effectively answers B's poll before A's.
    let t1 = thread::spawn(move || {
        let mut buf = [0u8; 1];
        core_a.submit(commands::CONTROL, 0x20, &[0xAA], &mut buf)
    });
    thread::sleep(Duration::from_millis(5));
    let t2 = thread::spawn(move || {
        let mut buf = [0u8; 1];
        core_b.submit(commands::CONTROL, 0x21, &[0xBB], &mut buf)
    });

    let core_for_ec = lifecycle.core();
    let ec = thread::spawn(move || {
        for _ in 0..2 {
            let read = perform_block_read(&core_for_ec, 0x8a);
            let tagged_cmd = read[1];
            let subcmd = read[2];
            // Echo the subcommand byte back as a one-byte payload so each
            // caller can tell its own response apart.
            let response = vec![tagged_cmd, 0x03, subcmd, 0x00, subcmd];
            perform_block_write(&core_for_ec, 0x8a, &response);
        }
    });

    let r1 = t1.join().unwrap();
    let r2 = t2.join().unwrap();
    ec.join().unwrap();

    assert!(r1.is_ok());
    assert!(r2.is_ok());

    lifecycle.shutdown().unwrap();
}
