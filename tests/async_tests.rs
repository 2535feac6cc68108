//! Background decoding, coalescing and the per-frame drain.
//!
//! Tests for:
//! - One decode per key no matter how many requests
//! - Callback order and shared results
//! - Nothing becomes resident before drain
//! - Failures reaching every waiting callback
//! - Drain budget
//! - Sync loads of keys that are already loading
//! - Shutdown with requests in flight
//! - Requests after every worker has exited

mod common;

use std::thread;
use std::time::Duration;

use common::*;
use texturette::{CacheKey, Config, DecodeError, Error};

// ============================================================================
// Coalescing
// ============================================================================

#[test]
fn concurrent_requests_share_one_decode() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    cache.get_or_load_async("tex/a.png", record(&seen, 1));
    assert!(cache.is_pending("tex/a.png"));
    assert_eq!(cache.pending_count(), 1);

    gate.send(()).unwrap();
    drain_until_idle(&mut cache);

    assert_eq!(decoder.calls_for("tex/a.png"), 1);
    assert_eq!(gpu.uploads(), 1);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    let (tag_a, key_a, first) = &seen[0];
    let (tag_b, key_b, second) = &seen[1];
    assert_eq!((*tag_a, *tag_b), (0, 1));
    assert_eq!(key_a.as_str(), "tex/a.png");
    assert_eq!(key_a, key_b);

    let first = first.as_ref().unwrap();
    let second = second.as_ref().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.handle(), second.handle());
    assert_eq!(cache.holders("tex/a.png"), Some(2));
}

#[test]
fn callbacks_run_in_request_order() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    for tag in 0..8 {
        cache.get_or_load_async("tex/a.png", record(&seen, tag));
    }
    gate.send(()).unwrap();
    drain_until_idle(&mut cache);

    let tags = seen.borrow().iter().map(|(tag, ..)| *tag).collect::<Vec<_>>();
    assert_eq!(tags, (0..8).collect::<Vec<_>>());
    assert_eq!(decoder.calls(), 1);
    assert_eq!(cache.holders("tex/a.png"), Some(8));
}

#[test]
fn distinct_keys_decode_separately() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    cache.get_or_load_async("tex/b.png", record(&seen, 1));
    drain_until_idle(&mut cache);

    assert_eq!(decoder.calls(), 2);
    assert_eq!(cache.len(), 2);
    assert!(seen.borrow().iter().all(|(.., result)| result.is_ok()));
}

// ============================================================================
// Drain
// ============================================================================

#[test]
fn nothing_is_resident_before_drain() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    thread::sleep(Duration::from_millis(50));

    assert!(!cache.contains("tex/a.png"));
    assert!(seen.borrow().is_empty());
    assert_eq!(gpu.uploads(), 0);

    drain_until_idle(&mut cache);
    assert!(cache.contains("tex/a.png"));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn cached_keys_call_back_immediately() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    let texture = cache.get_or_load("tex/a.png").unwrap();
    cache.get_or_load_async("tex/a.png", record(&seen, 0));

    assert_eq!(cache.pending_count(), 0);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].2.as_ref().unwrap(), &texture);
    assert_eq!(cache.holders("tex/a.png"), Some(2));
    assert_eq!(decoder.calls(), 1);
}

#[test]
fn drain_budget_limits_each_drain() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache_with(
        Config::default().with_workers(3).with_drain_budget(1),
        &gpu,
        &decoder,
    );
    let seen = seen();

    for (tag, key) in ["tex/a.png", "tex/b.png", "tex/c.png"].into_iter().enumerate() {
        cache.get_or_load_async(key, record(&seen, tag));
    }

    let mut drained = 0;
    for _ in 0..5000 {
        let processed = cache.drain();
        assert!(processed <= 1, "drain processed {processed} decodes");
        drained += processed;
        if drained == 3 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(drained, 3);
    assert_eq!(cache.len(), 3);
    assert_eq!(seen.borrow().len(), 3);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn decode_failure_reaches_every_callback() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    decoder.fail("tex/bad.png");
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/bad.png", record(&seen, 0));
    cache.get_or_load_async("tex/bad.png", record(&seen, 1));
    gate.send(()).unwrap();
    drain_until_idle(&mut cache);

    let outcomes = seen.borrow();
    assert_eq!(outcomes.len(), 2);
    for (_, key, result) in outcomes.iter() {
        assert_eq!(key.as_str(), "tex/bad.png");
        assert!(matches!(
            result,
            Err(Error::Decode(DecodeError::Malformed(_)))
        ));
    }
    assert!(!cache.contains("tex/bad.png"));
    assert!(!cache.is_pending("tex/bad.png"));
    assert_eq!(gpu.uploads(), 0);
}

#[test]
fn failed_async_loads_can_be_retried() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    decoder.fail("tex/bad.png");
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/bad.png", record(&seen, 0));
    drain_until_idle(&mut cache);
    decoder.succeed("tex/bad.png");
    cache.get_or_load_async("tex/bad.png", record(&seen, 1));
    drain_until_idle(&mut cache);

    let seen = seen.borrow();
    assert!(seen[0].2.is_err());
    assert!(seen[1].2.is_ok());
    assert_eq!(decoder.calls_for("tex/bad.png"), 2);
}

#[test]
fn upload_failure_reaches_the_callback() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    gpu.reject("tex/a.png");
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    drain_until_idle(&mut cache);

    assert!(matches!(seen.borrow()[0].2, Err(Error::Upload(_))));
    assert!(!cache.contains("tex/a.png"));
}

#[test]
fn decoder_panics_become_errors() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache_with(Config::default().with_workers(1), &gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/panic.png", record(&seen, 0));
    drain_until_idle(&mut cache);
    cache.get_or_load_async("tex/a.png", record(&seen, 1));
    drain_until_idle(&mut cache);

    let seen = seen.borrow();
    match &seen[0].2 {
        Err(Error::Decode(DecodeError::Panicked(message))) => {
            assert!(message.contains("decoder exploded"), "{message}")
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(seen[1].2.is_ok(), "the worker survives a panicking decode");
}

// ============================================================================
// Mixing sync and async
// ============================================================================

#[test]
fn sync_load_waits_for_a_pending_decode() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        gate.send(()).unwrap();
    });
    let texture = cache.get_or_load("tex/a.png").unwrap();
    opener.join().unwrap();

    assert_eq!(decoder.calls_for("tex/a.png"), 1);
    assert_eq!(gpu.uploads(), 1);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].2.as_ref().unwrap(), &texture);
    assert_eq!(cache.holders("tex/a.png"), Some(2));
    assert_eq!(cache.pending_count(), 0);
}

#[test]
fn pixels_added_while_decoding_win() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    let added = cache.add_pixels("tex/a.png", white_pixels()).unwrap();
    gate.send(()).unwrap();
    drain_until_idle(&mut cache);

    assert_eq!(seen.borrow()[0].2.as_ref().unwrap(), &added);
    assert_eq!(gpu.uploads(), 1);
    assert_eq!(cache.holders("tex/a.png"), Some(2));
    assert_eq!(cache.recipe("tex/a.png").map(|r| r.kind()), Some("pixels"));
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn shutdown_fails_requests_in_flight() {
    let gpu = MockUploader::default();
    let (decoder, gate) = CountingDecoder::gated();
    let mut cache = cache(&gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/a.png", record(&seen, 0));
    cache.get_or_load_async("tex/b.png", record(&seen, 1));
    drop(gate);
    cache.shutdown();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    let mut keys = seen
        .iter()
        .map(|(_, key, result)| {
            assert!(matches!(result, Err(Error::ShutDown)));
            key.clone()
        })
        .collect::<Vec<_>>();
    keys.sort();
    assert_eq!(keys, [CacheKey::path("tex/a.png"), CacheKey::path("tex/b.png")]);
    assert_eq!(gpu.uploads(), 0);
}

// ============================================================================
// Dead workers
// ============================================================================

#[test]
fn requests_fail_once_every_worker_is_gone() {
    let gpu = MockUploader::default();
    let decoder = CountingDecoder::new();
    let mut cache = cache_with(Config::default().with_workers(1), &gpu, &decoder);
    let seen = seen();

    cache.get_or_load_async("tex/crash.png", record(&seen, 0));
    drain_until_idle(&mut cache);
    cache.get_or_load_async("tex/a.png", record(&seen, 1));

    assert_eq!(cache.pending_count(), 0);
    assert!(!cache.contains("tex/a.png"));
    assert!(cache.get_or_load("tex/b.png").is_ok());

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    for (_, _, result) in seen.iter() {
        assert!(matches!(
            result,
            Err(Error::Decode(DecodeError::WorkerGone))
        ));
    }
    assert_eq!(decoder.calls_for("tex/a.png"), 0);
}
