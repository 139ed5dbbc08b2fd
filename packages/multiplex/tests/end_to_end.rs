use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use pretty_assertions::assert_eq;
use switchy_multiplex::{
    Capacity, ConsumerPool, Error, OutputConfig, Pipeline, PipelineConfig, ProducerPool,
    TransformPool,
};

const MESSAGES: usize = 100_000;
const PRODUCERS: usize = 5;

#[test_log::test]
fn pipeline_delivers_every_message_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let mismatched = Arc::new(AtomicUsize::new(0));

    Pipeline::<String>::new(PipelineConfig::new(PRODUCERS, 5, 5))
        .produce(OutputConfig::new(2, Capacity::Bounded(2)), |_worker, out| {
            for _ in 0..MESSAGES / PRODUCERS {
                out.send("hello".to_string()).unwrap();
            }
        })
        .unwrap()
        .process(OutputConfig::new(2, Capacity::Bounded(2)), |data: String, out| {
            out.send(format!("{data} world")).unwrap();
        })
        .unwrap()
        .consume_and_wait({
            let count = count.clone();
            let mismatched = mismatched.clone();
            move |message: String| {
                if message != "hello world" {
                    log::error!("unexpected message: {message}");
                    mismatched.fetch_add(1, Ordering::SeqCst);
                }
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    assert_eq!(mismatched.load(Ordering::SeqCst), 0);
    assert_eq!(count.load(Ordering::SeqCst), MESSAGES);
}

#[test_log::test]
fn pools_wired_by_hand_match_the_builder() {
    let producers = ProducerPool::new(10, OutputConfig::new(5, Capacity::Unbuffered)).unwrap();
    let transforms = TransformPool::new(10, OutputConfig::new(5, Capacity::Bounded(5))).unwrap();
    let consumers = ConsumerPool::new(10).unwrap();

    let total = Arc::new(AtomicUsize::new(0));

    let raw = producers
        .start(|worker, out| {
            for i in 0..100 {
                out.send(worker * 100 + i).unwrap();
            }
        })
        .unwrap();
    let doubled = transforms
        .start(raw, |value: usize, out| {
            out.send(value * 2).unwrap();
        })
        .unwrap();
    consumers
        .start(doubled, {
            let total = total.clone();
            move |value| {
                total.fetch_add(value, Ordering::SeqCst);
            }
        })
        .unwrap();

    consumers.wait().unwrap();
    producers.wait().unwrap();
    transforms.wait().unwrap();

    assert!(producers.is_finished());
    assert!(transforms.is_finished());
    assert_eq!(total.load(Ordering::SeqCst), (0..1_000).sum::<usize>() * 2);
}

#[test_log::test]
fn consuming_an_unstarted_pipeline_is_an_error() {
    let result = Pipeline::<String>::new(PipelineConfig::default()).consume(|_| {});
    assert!(matches!(result, Err(Error::NotStarted)));
}
