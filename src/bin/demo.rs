//! End-to-end demo: lays out a control block, a thread registry, and the
//! two global fallback rings in this process, runs a few producer threads
//! through the real capture path, then drains everything to a file.
//!
//! ```bash
//! cargo run --release --bin ada-demo -- /tmp/ada-demo.trace
//! ```

use ada::{
    default_hb_timeout_ns, registry_segment_len, AgentState, CaptureContext, Clock, ControlSegment,
    DetailEvent, DrainConfig, DrainScheduler, FramedFileWriter, GlobalRing, GlobalRings, IndexEvent,
    MonotonicClock, RegistryConfig, Segment, ThreadRegistry, Writer,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

const PRODUCER_THREADS: u64 = 4;
const CALLS_PER_THREAD: u64 = 1_000;

// Scaled down from the production defaults (64 threads, 32 MiB global
// rings) to something that maps and tears down instantly for a demo run.
const DEMO_CAPACITY: u32 = 8;
const DEMO_INDEX_RING_CAPACITY: u32 = 256;
const DEMO_DETAIL_RING_CAPACITY: u32 = 128;
const DEMO_GLOBAL_INDEX_CAPACITY: u32 = 1024;
const DEMO_GLOBAL_DETAIL_CAPACITY: u32 = 256;

fn ctx() -> CaptureContext {
    CaptureContext {
        registers: [0; 8],
        frame_pointer: 0,
        stack_pointer: 0,
        link_register: 0,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = log::set_max_level(log::LevelFilter::Info);

    let trace_path = std::env::args().nth(1).unwrap_or_else(|| "/tmp/ada-demo.trace".to_string());
    let name_prefix = format!("ada_demo_{}", std::process::id());

    let config = RegistryConfig::new(DEMO_CAPACITY, DEMO_INDEX_RING_CAPACITY, DEMO_DETAIL_RING_CAPACITY);

    let producer_control = ControlSegment::create(Segment::create(
        &format!("{name_prefix}_control"),
        ada::CONTROL_BLOCK_SIZE,
    )?)?;

    let registry_len = registry_segment_len(&config);
    let producer_registry =
        ThreadRegistry::create(Segment::create(&format!("{name_prefix}_registry"), registry_len)?, config)?;

    let index_len = GlobalRing::<IndexEvent>::total_bytes(DEMO_GLOBAL_INDEX_CAPACITY);
    let mut index_segment = Segment::create(&format!("{name_prefix}_index"), index_len)?;
    let producer_index = GlobalRing::create(index_segment.as_mut_slice(), DEMO_GLOBAL_INDEX_CAPACITY)?;

    let detail_len = GlobalRing::<DetailEvent>::total_bytes(DEMO_GLOBAL_DETAIL_CAPACITY);
    let mut detail_segment = Segment::create(&format!("{name_prefix}_detail"), detail_len)?;
    let producer_detail = GlobalRing::create(detail_segment.as_mut_slice(), DEMO_GLOBAL_DETAIL_CAPACITY)?;

    // the drain attaches its own independent view of every segment the
    // producer just created, exactly as a separate controller process would.
    let drain_control =
        ControlSegment::attach(Segment::open(&format!("{name_prefix}_control"), ada::CONTROL_BLOCK_SIZE)?)?;
    let drain_registry =
        ThreadRegistry::attach(Segment::open(&format!("{name_prefix}_registry"), registry_len)?, config)?;
    let mut drain_index_segment = Segment::open(&format!("{name_prefix}_index"), index_len)?;
    let drain_index = GlobalRing::attach(drain_index_segment.as_mut_slice())?;
    let mut drain_detail_segment = Segment::open(&format!("{name_prefix}_detail"), detail_len)?;
    let drain_detail = GlobalRing::attach(drain_detail_segment.as_mut_slice())?;

    // stamp a fresh heartbeat and mark the registry ready so the first
    // mode tick promotes straight past GLOBAL_ONLY.
    let block = producer_control.block();
    block.registry_ready.store(1, Ordering::Release);
    block.registry_epoch.store(1, Ordering::Release);
    block.drain_heartbeat_ns.store(MonotonicClock.now_ns(), Ordering::Release);

    let producer = Arc::new(AgentState {
        control: producer_control,
        registry: Some(producer_registry),
        global: GlobalRings {
            index: producer_index,
            detail: producer_detail,
        },
        clock: Box::new(MonotonicClock),
        hb_timeout_ns: default_hb_timeout_ns(),
    });

    let handles: Vec<_> = (0..PRODUCER_THREADS)
        .map(|tid| {
            let producer = Arc::clone(&producer);
            thread::spawn(move || {
                for call_id in 0..CALLS_PER_THREAD {
                    let function_id = tid * CALLS_PER_THREAD + call_id;
                    producer.on_call(&ctx(), function_id);
                    producer.on_return(&ctx(), function_id);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("producer thread panicked");
    }

    producer.registry.as_ref().expect("registry was attached above").request_shutdown();

    let writer: Box<dyn Writer> = Box::new(FramedFileWriter::create(&trace_path)?);
    let mut scheduler = DrainScheduler::new(
        drain_control,
        drain_registry,
        GlobalRings {
            index: drain_index,
            detail: drain_detail,
        },
        writer,
        DrainConfig::default(),
    );
    scheduler.tick();

    let counters = scheduler.counters();
    println!(
        "drained {} events ({} bytes) into {trace_path}, {} rings returned, {} writer errors",
        counters.events_drained, counters.bytes_written, counters.rings_returned, counters.writer_errors
    );

    // these rings are only readable through the raw pointers GlobalRing
    // already holds into them; unmapping here would pull the rug out from
    // under the scheduler above, same tradeoff the producer side makes in
    // `ada_agent::init::attach_producer_state`.
    std::mem::forget(index_segment);
    std::mem::forget(detail_segment);
    std::mem::forget(drain_index_segment);
    std::mem::forget(drain_detail_segment);

    Ok(())
}
