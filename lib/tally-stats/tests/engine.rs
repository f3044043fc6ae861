use std::{thread, time::Duration};

use tally_context::TagContext;
use tally_stats::{
    data::{AggregationData, WindowData},
    export::{MetricType, PointValue},
    time::{ManualClock, Timestamp},
    Aggregation, CollectionState, Measure, MetricProducer, Registration, RegistrationError, StatsConfiguration,
    StatsEngine, TagTuple, View, Window,
};

fn engine_at(secs: i64) -> (StatsEngine, ManualClock) {
    let clock = ManualClock::new(Timestamp::from_secs(secs));
    let config = StatsConfiguration::with_defaults().with_queue_capacity(1 << 16);
    let engine = StatsEngine::with_clock(&config, clock.clone()).expect("engine should start");
    (engine, clock)
}

fn region(value: &str) -> TagContext {
    TagContext::builder().put("region", value).build()
}

fn tuple(value: &str) -> TagTuple {
    TagTuple::new([Some(value)])
}

fn requests() -> Measure {
    Measure::int64("requests", "Requests served", "1").unwrap()
}

fn requests_by_region(aggregation: Aggregation) -> View {
    View::builder("requests_by_region", &requests(), aggregation)
        .columns(["region"])
        .build()
        .unwrap()
}

#[test]
fn end_to_end_sum_by_region() {
    let (engine, _clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Sum)).unwrap();

    engine.new_measure_map().put_i64(&measure, 5).record(&region("us"));
    engine.new_measure_map().put_i64(&measure, 3).record(&region("eu"));
    engine.new_measure_map().put_i64(&measure, -1).record(&region("us"));
    engine.flush();

    let data = engine.get_view("requests_by_region").unwrap();
    assert_eq!(data.data().len(), 2);
    assert_eq!(data.get(&tuple("us")), Some(&AggregationData::SumLong(5)));
    assert_eq!(data.get(&tuple("eu")), Some(&AggregationData::SumLong(3)));

    engine.shutdown();
}

#[test]
fn identical_registration_keeps_data() {
    let (engine, clock) = engine_at(10);
    let measure = requests();

    assert_eq!(
        engine.register_view(requests_by_region(Aggregation::Count)),
        Ok(Registration::Registered)
    );
    engine.new_measure_map().put_i64(&measure, 1).record(&region("us"));
    engine.flush();

    clock.advance(Duration::from_secs(5));
    assert_eq!(
        engine.register_view(requests_by_region(Aggregation::Count)),
        Ok(Registration::AlreadyRegistered)
    );

    let data = engine.get_view("requests_by_region").unwrap();
    assert_eq!(data.get(&tuple("us")), Some(&AggregationData::Count(1)));
    assert_eq!(
        data.window(),
        WindowData::Cumulative {
            start: Timestamp::from_secs(10),
            end: Timestamp::from_secs(15),
        }
    );
}

#[test]
fn conflicting_registration_is_rejected() {
    let (engine, _clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Sum)).unwrap();
    engine.new_measure_map().put_i64(&measure, 7).record(&region("us"));

    let result = engine.register_view(requests_by_region(Aggregation::Mean));
    assert!(matches!(result, Err(RegistrationError::ConflictingView { ref name }) if name == "requests_by_region"));

    engine.flush();
    let data = engine.get_view("requests_by_region").unwrap();
    assert_eq!(data.view().aggregation(), &Aggregation::Sum);
    assert_eq!(data.get(&tuple("us")), Some(&AggregationData::SumLong(7)));
}

#[test]
fn negative_value_drops_whole_batch() {
    let (engine, _clock) = engine_at(10);
    let bytes = Measure::int64("bytes", "Bytes sent", "By").unwrap();
    let requests = requests();

    engine
        .register_view(View::builder("bytes_sum", &bytes, Aggregation::Sum).build().unwrap())
        .unwrap();
    engine
        .register_view(View::builder("requests_count", &requests, Aggregation::Count).build().unwrap())
        .unwrap();

    engine
        .new_measure_map()
        .put_i64(&bytes, -10)
        .put_i64(&requests, 1)
        .record(&TagContext::empty());
    engine.flush();

    assert!(engine.get_view("bytes_sum").unwrap().data().is_empty());
    assert!(engine.get_view("requests_count").unwrap().data().is_empty());
}

#[test]
fn negative_values_allowed_for_mean_and_last_value() {
    let (engine, _clock) = engine_at(10);
    let temperature = Measure::float64("temperature", "Outside temperature", "C").unwrap();

    engine
        .register_view(View::builder("temperature_mean", &temperature, Aggregation::Mean).build().unwrap())
        .unwrap();
    engine
        .register_view(View::builder("temperature_last", &temperature, Aggregation::LastValue).build().unwrap())
        .unwrap();

    for value in [-4.0, -2.0] {
        engine.new_measure_map().put_f64(&temperature, value).record(&TagContext::empty());
    }
    engine.flush();

    let empty = TagTuple::default();
    assert_eq!(
        engine.get_view("temperature_mean").unwrap().get(&empty),
        Some(&AggregationData::Mean { mean: -3.0, count: 2 })
    );
    assert_eq!(
        engine.get_view("temperature_last").unwrap().get(&empty),
        Some(&AggregationData::LastValueDouble(-2.0))
    );
}

#[test]
fn recording_unregistered_measure_is_ignored() {
    let (engine, _clock) = engine_at(10);
    let unregistered = Measure::float64("unregistered", "", "1").unwrap();

    engine.new_measure_map().put_f64(&unregistered, 1.0).record(&TagContext::empty());
    engine.flush();

    assert!(engine.get_view("unregistered").is_none());
    assert!(engine.exportable_views().is_empty());
}

#[test]
fn last_value_follows_enqueue_order() {
    let (engine, _clock) = engine_at(10);
    let measure = Measure::int64("sequence", "", "1").unwrap();
    engine
        .register_view(
            View::builder("sequence_by_producer", &measure, Aggregation::LastValue)
                .columns(["producer"])
                .build()
                .unwrap(),
        )
        .unwrap();

    thread::scope(|scope| {
        for producer in 0..4 {
            let recorder = engine.recorder();
            let measure = measure.clone();
            scope.spawn(move || {
                let tags = TagContext::builder().put("producer", producer.to_string()).build();
                for value in 1..=500 {
                    recorder.new_measure_map().put_i64(&measure, value).record(&tags);
                }
            });
        }
    });
    engine.flush();

    let data = engine.get_view("sequence_by_producer").unwrap();
    assert_eq!(data.data().len(), 4);
    for (tuple, value) in data.data() {
        assert_eq!(value, &AggregationData::LastValueLong(500), "unexpected last value for {}", tuple);
    }
}

#[test]
fn concurrent_producers_are_all_counted() {
    let (engine, _clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Count)).unwrap();

    thread::scope(|scope| {
        for _ in 0..8 {
            let recorder = engine.recorder();
            let measure = &measure;
            scope.spawn(move || {
                let tags = region("us");
                for _ in 0..1000 {
                    recorder.new_measure_map().put_i64(measure, 1).record(&tags);
                }
            });
        }
    });
    engine.flush();

    let data = engine.get_view("requests_by_region").unwrap();
    assert_eq!(data.get(&tuple("us")), Some(&AggregationData::Count(8000)));
}

#[test]
fn disable_clears_and_enable_resumes() {
    let (engine, clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Sum)).unwrap();

    engine.new_measure_map().put_i64(&measure, 5).record(&region("us"));
    engine.flush();

    assert!(engine.set_state(CollectionState::Disabled));
    assert!(!engine.set_state(CollectionState::Disabled));
    assert_eq!(engine.state(), CollectionState::Disabled);

    // Recorded while disabled: dropped.
    engine.new_measure_map().put_i64(&measure, 100).record(&region("us"));
    engine.flush();

    let data = engine.get_view("requests_by_region").unwrap();
    assert!(data.data().is_empty());
    assert_eq!(
        data.window(),
        WindowData::Cumulative {
            start: Timestamp::ZERO,
            end: Timestamp::ZERO,
        }
    );

    // Registration still works while disabled.
    let other = View::builder("requests_total", &measure, Aggregation::Sum).build().unwrap();
    assert_eq!(engine.register_view(other), Ok(Registration::Registered));

    clock.set(Timestamp::from_secs(30));
    assert!(engine.set_state(CollectionState::Enabled));

    engine.new_measure_map().put_i64(&measure, 2).record(&region("eu"));
    engine.flush();

    clock.set(Timestamp::from_secs(31));
    let data = engine.get_view("requests_by_region").unwrap();
    assert_eq!(data.data().len(), 1);
    assert_eq!(data.get(&tuple("eu")), Some(&AggregationData::SumLong(2)));
    assert_eq!(
        data.window(),
        WindowData::Cumulative {
            start: Timestamp::from_secs(30),
            end: Timestamp::from_secs(31),
        }
    );
}

#[test]
fn starting_disabled() {
    let config = StatsConfiguration::with_defaults().with_collection_enabled(false);
    let engine = StatsEngine::with_clock(&config, ManualClock::new(Timestamp::from_secs(1))).unwrap();
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Count)).unwrap();

    engine.new_measure_map().put_i64(&measure, 1).record(&region("us"));
    engine.flush();

    assert_eq!(engine.state(), CollectionState::Disabled);
    assert!(engine.get_view("requests_by_region").unwrap().data().is_empty());
}

#[test]
fn interval_view_through_engine() {
    let (engine, clock) = engine_at(30);
    let measure = Measure::float64("latency", "", "ms").unwrap();
    engine
        .register_view(
            View::builder("latency_10s", &measure, Aggregation::Sum)
                .window(Window::Interval(Duration::from_secs(10)))
                .build()
                .unwrap(),
        )
        .unwrap();

    for (second, value) in [(31, 20.0), (32, -1.0), (33, 1.0), (34, -5.0), (35, 5.0)] {
        clock.set(Timestamp::from_secs(second));
        engine.new_measure_map().put_f64(&measure, value).record(&TagContext::empty());
        engine.flush();
    }

    clock.set(Timestamp::from_secs(41));
    let data = engine.get_view("latency_10s").unwrap();
    assert_eq!(data.window(), WindowData::Interval { end: Timestamp::from_secs(41) });
    match data.get(&TagTuple::default()) {
        Some(AggregationData::SumDouble(sum)) => assert!((sum - (19.0 * 0.6 + 1.0)).abs() < 1e-9, "sum was {}", sum),
        other => panic!("unexpected data: {:?}", other),
    }

    // Interval views are not exported as metrics.
    assert!(engine.exportable_views().is_empty());
    assert!(engine.metric_producer().metrics().is_empty());
}

#[test]
fn metric_producer_exports_cumulative_views() {
    let (engine, _clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Sum)).unwrap();
    engine
        .register_view(
            View::builder("requests_interval", &measure, Aggregation::Sum)
                .window(Window::Interval(Duration::from_secs(60)))
                .build()
                .unwrap(),
        )
        .unwrap();

    let producer = engine.metric_producer();
    assert!(producer.metrics().is_empty());

    engine.new_measure_map().put_i64(&measure, 4).record(&region("us"));
    engine.flush();

    let metrics = producer.metrics();
    assert_eq!(metrics.len(), 1);
    let metric = &metrics[0];
    assert_eq!(metric.descriptor.name, "requests_by_region");
    assert_eq!(metric.descriptor.metric_type, MetricType::CumulativeInt64);
    assert_eq!(metric.time_series.len(), 1);
    assert_eq!(metric.time_series[0].label_values, vec![Some("us".to_string())]);
    assert_eq!(metric.time_series[0].points[0].value, PointValue::Int64(4));
    assert_eq!(metric.time_series[0].start_timestamp, Some(Timestamp::from_secs(10)));

    engine.set_state(CollectionState::Disabled);
    assert!(producer.metrics().is_empty());
}

#[test]
fn shutdown_drains_pending_batches() {
    let (engine, _clock) = engine_at(10);
    let measure = requests();
    engine.register_view(requests_by_region(Aggregation::Count)).unwrap();
    let producer = engine.metric_producer();
    let recorder = engine.recorder();

    for _ in 0..100 {
        recorder.new_measure_map().put_i64(&measure, 1).record(&region("us"));
    }
    engine.shutdown();

    let metrics = producer.metrics();
    assert_eq!(metrics[0].time_series[0].points[0].value, PointValue::Int64(100));

    // The worker is gone: further recording is dropped without blocking, and flushing returns immediately.
    recorder.new_measure_map().put_i64(&measure, 1).record(&region("us"));
    recorder.flush();
    let metrics = producer.metrics();
    assert_eq!(metrics[0].time_series[0].points[0].value, PointValue::Int64(100));
}

#[test]
fn exemplars_carry_attachments() {
    let (engine, _clock) = engine_at(10);
    let latency = Measure::float64("latency", "", "ms").unwrap();
    engine
        .register_view(
            View::builder("latency_dist", &latency, Aggregation::distribution(vec![10.0, 100.0]).unwrap())
                .build()
                .unwrap(),
        )
        .unwrap();

    engine
        .new_measure_map()
        .put_f64(&latency, 42.0)
        .put_attachment("trace_id", "abc123")
        .record(&TagContext::empty());
    engine.new_measure_map().put_f64(&latency, 5.0).record(&TagContext::empty());
    engine.flush();

    let data = engine.get_view("latency_dist").unwrap();
    let Some(AggregationData::Distribution(dist)) = data.get(&TagTuple::default()) else {
        panic!("expected distribution data");
    };
    assert_eq!(dist.count(), 2);
    assert_eq!(dist.bucket_counts(), &[1, 1, 0]);
    assert!(dist.exemplars()[0].is_none());
    let exemplar = dist.exemplars()[1].as_ref().expect("should have exemplar");
    assert_eq!(exemplar.value(), 42.0);
    assert_eq!(exemplar.timestamp(), Timestamp::from_secs(10));
    assert_eq!(exemplar.attachments().get("trace_id").map(String::as_str), Some("abc123"));
}

#[test]
fn recorder_handles_are_shareable() {
    fn assert_send_sync<T: Send + Sync>(_: &T) {}

    let (engine, _clock) = engine_at(10);
    assert_send_sync(&engine);
    assert_send_sync(&engine.recorder());
    assert_send_sync(&engine.metric_producer());
}
