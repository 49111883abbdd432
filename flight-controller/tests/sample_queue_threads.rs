use std::thread;

use flight_core::util::sample_queue;

const RECORDS: u32 = 20_000;

#[test]
fn records_cross_threads_in_order() {
    let (mut producer, mut consumer) = sample_queue::create::<u32>(64).unwrap();

    let writer = thread::spawn(move || {
        let mut spilled = 0_u32;
        for value in 0..RECORDS {
            while producer.try_push(value).is_err() {
                spilled += 1;
                thread::yield_now();
            }
        }
        spilled
    });

    let mut expected = 0;
    while expected < RECORDS {
        match consumer.try_pop() {
            Some(value) => {
                assert_eq!(value, expected);
                expected += 1;
            }
            None => thread::yield_now(),
        }
    }

    writer.join().unwrap();
    assert!(consumer.is_empty());
}

#[test]
fn bulk_writes_and_reads_wrap_around() {
    let (mut producer, mut consumer) = sample_queue::create::<u16>(10).unwrap();

    let writer = thread::spawn(move || {
        let mut next = 0_u16;
        while next < 1000 {
            let batch: Vec<u16> = (next..next.saturating_add(7).min(1000)).collect();
            next += producer.write_data(&batch) as u16;
            thread::yield_now();
        }
    });

    let mut received = Vec::new();
    let mut buffer = [0_u16; 4];
    while received.len() < 1000 {
        let count = consumer.read_data(&mut buffer);
        received.extend_from_slice(&buffer[..count]);
        if count == 0 {
            thread::yield_now();
        }
    }

    writer.join().unwrap();
    assert!(received.iter().copied().eq(0..1000));
}
