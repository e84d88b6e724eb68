//! Behavioural tests for the event dispatcher.
//!
//! Each test drives a [`Receiver`] with hand-built events and checks the
//! intents it returns.

use amqp_receiver::{
    Delivery,
    DeliveryId,
    EndpointKind,
    EndpointState,
    Event,
    Intent,
    Notice,
    Receiver,
    ReceiverConfig,
    RemoteError,
    message::Message,
};
use amqp_receiver_testing::{LoggerHandle, logger};
use bytes::Bytes;
use rstest::{fixture, rstest};
use serial_test::serial;

fn config(count: u64, window: u32) -> ReceiverConfig {
    ReceiverConfig::default()
        .with_count(count)
        .with_credit_window(window)
}

fn open(config: &ReceiverConfig) -> Receiver {
    let mut receiver = Receiver::new(config).expect("valid config");
    receiver.handle(Event::ConnectionInit);
    for kind in EndpointKind::ALL {
        assert!(receiver.handle(Event::RemoteOpened(kind)).is_empty());
    }
    receiver
}

#[fixture]
fn unbounded() -> Receiver {
    // Open receiver with the default window and no message target
    open(&config(0, 100))
}

fn text(id: u32, body: &str) -> Delivery {
    Delivery::complete(id, Message::text(body).to_bytes().freeze())
}

fn ready(delivery: Delivery, link_credit: u32) -> Event {
    Event::DeliveryReady {
        delivery,
        link_credit,
    }
}

fn position(intents: &[Intent], wanted: &Intent) -> usize {
    intents
        .iter()
        .position(|intent| intent == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} missing from {intents:?}"))
}

#[test]
fn connection_init_opens_endpoints_before_granting_credit() {
    let mut receiver = Receiver::new(&config(1, 100)).expect("valid config");
    let intents = receiver.handle(Event::ConnectionInit);
    assert_eq!(
        intents,
        vec![
            Intent::OpenConnection {
                container_id: "ReceiveExample".into(),
                hostname: "localhost".into(),
            },
            Intent::CreateSession,
            Intent::OpenSession,
            Intent::CreateReceiver {
                name: "MyReceiver".into(),
            },
            Intent::SetSource {
                address: "examples".into(),
            },
            Intent::OpenLink,
            Intent::Flow { credit: 100 },
        ]
    );
}

#[rstest]
fn second_connection_init_is_ignored(mut unbounded: Receiver) {
    assert!(unbounded.handle(Event::ConnectionInit).is_empty());
    assert_eq!(
        unbounded.context().endpoints().state(EndpointKind::Link),
        EndpointState::Open
    );
}

#[rstest]
fn text_message_is_reported_then_settled(mut unbounded: Receiver) {
    let intents = unbounded.handle(ready(text(0, "hello"), 99));
    let id = DeliveryId::new(0);
    assert_eq!(
        intents,
        vec![
            Intent::Recv {
                delivery: id,
                max_bytes: 512,
            },
            Intent::Report(Notice::Message("hello".into())),
            Intent::Accept { delivery: id },
            Intent::Advance { delivery: id },
            Intent::Settle { delivery: id },
        ]
    );
}

#[rstest]
#[case::amqp_value_map(Message::with_body(amqp_receiver::message::Body::Value(
    amqp_receiver::types::AmqpValue::Map(Vec::new())
)))]
#[case::empty_body(Message::new())]
#[case::data_body(Message::with_body(amqp_receiver::message::Body::Data(vec![
    Bytes::from_static(b"raw")
])))]
fn non_string_bodies_are_reported_as_received(mut unbounded: Receiver, #[case] message: Message) {
    let delivery = Delivery::complete(0, message.to_bytes().freeze());
    let intents = unbounded.handle(ready(delivery, 99));
    assert!(intents.contains(&Intent::Report(Notice::Received)));
    assert!(intents.contains(&Intent::Settle {
        delivery: DeliveryId::new(0)
    }));
}

#[rstest]
fn every_delivery_is_advanced_then_settled_once(mut unbounded: Receiver) {
    for id in 0..20 {
        let intents = unbounded.handle(ready(text(id, "payload"), 90));
        let delivery = DeliveryId::new(id);
        let advance = Intent::Advance { delivery };
        let settle = Intent::Settle { delivery };
        assert_eq!(intents.iter().filter(|i| **i == advance).count(), 1);
        assert_eq!(intents.iter().filter(|i| **i == settle).count(), 1);
        assert!(position(&intents, &advance) < position(&intents, &settle));
        let recv = intents
            .iter()
            .position(|intent| matches!(intent, Intent::Recv { .. }))
            .expect("payload read");
        assert!(recv < position(&intents, &advance));
    }
    assert_eq!(unbounded.summary().deliveries_settled, 20);
}

#[rstest]
fn garbage_payload_still_settles_and_replenishes(mut unbounded: Receiver) {
    let delivery = Delivery::complete(0, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
    let intents = unbounded.handle(ready(delivery, 10));
    let id = DeliveryId::new(0);
    assert_eq!(
        intents,
        vec![
            Intent::Recv {
                delivery: id,
                max_bytes: 512,
            },
            Intent::Report(Notice::Received),
            Intent::Accept { delivery: id },
            Intent::Advance { delivery: id },
            Intent::Settle { delivery: id },
            Intent::Flow { credit: 100 },
        ]
    );
    assert_eq!(unbounded.summary().decode_failures, 1);
}

#[rstest]
fn partial_delivery_produces_nothing(mut unbounded: Receiver) {
    let intents = unbounded.handle(ready(text(0, "half").partial(), 99));
    assert!(intents.is_empty());
    assert_eq!(unbounded.summary().deliveries_settled, 0);
}

#[rstest]
fn unreadable_delivery_produces_nothing(mut unbounded: Receiver) {
    let mut delivery = text(0, "not yet");
    delivery.readable = false;
    assert!(unbounded.handle(ready(delivery, 99)).is_empty());
}

#[rstest]
fn presettled_delivery_is_not_accepted(mut unbounded: Receiver) {
    let intents = unbounded.handle(ready(text(4, "fire and forget").presettled(), 99));
    let delivery = DeliveryId::new(4);
    assert!(!intents.contains(&Intent::Accept { delivery }));
    assert!(
        position(&intents, &Intent::Advance { delivery })
            < position(&intents, &Intent::Settle { delivery })
    );
}

#[rstest]
fn duplicate_delivery_is_ignored(mut unbounded: Receiver) {
    assert!(!unbounded.handle(ready(text(7, "once"), 99)).is_empty());
    assert!(unbounded.handle(ready(text(7, "once"), 99)).is_empty());
    assert!(unbounded.handle(ready(text(6, "older"), 99)).is_empty());
    assert!(!unbounded.handle(ready(text(8, "newer"), 99)).is_empty());
    assert_eq!(unbounded.summary().deliveries_settled, 2);
}

#[rstest]
fn delivery_ids_wrap_around(mut unbounded: Receiver) {
    assert!(!unbounded.handle(ready(text(u32::MAX, "last"), 99)).is_empty());
    assert!(!unbounded.handle(ready(text(0, "wrapped"), 98)).is_empty());
}

#[test]
fn delivery_before_link_opens_is_ignored() {
    let mut receiver = Receiver::new(&config(1, 10)).expect("valid config");
    assert!(receiver.handle(ready(text(0, "early"), 9)).is_empty());
}

#[test]
fn credit_refills_only_below_half_window() {
    let mut receiver = open(&config(0, 10));
    let mut flows = Vec::new();
    for (id, link_credit) in (0..6).zip((4..10).rev()) {
        let intents = receiver.handle(ready(text(id, "m"), link_credit));
        flows.extend(
            intents
                .into_iter()
                .filter(|intent| matches!(intent, Intent::Flow { .. })),
        );
        if id == 2 {
            // three deliveries leave seven outstanding, above the threshold
            assert!(flows.is_empty());
        }
    }
    assert_eq!(flows, vec![Intent::Flow { credit: 10 }]);
}

#[test]
fn window_of_one_never_starves() {
    let mut receiver = open(&config(0, 1));
    for id in 0..5 {
        let intents = receiver.handle(ready(text(id, "one at a time"), 0));
        assert_eq!(intents.last(), Some(&Intent::Flow { credit: 1 }));
    }
}

#[test]
fn target_count_triggers_close_sequence_once() {
    let mut receiver = open(&config(3, 100));
    assert!(!receiver.handle(ready(text(0, "a"), 99)).iter().any(Intent::is_close));
    assert!(!receiver.handle(ready(text(1, "b"), 98)).iter().any(Intent::is_close));

    let intents = receiver.handle(ready(text(2, "c"), 97));
    let closes: Vec<_> = intents.into_iter().filter(Intent::is_close).collect();
    assert_eq!(
        closes,
        vec![
            Intent::CloseLink,
            Intent::CloseSession,
            Intent::CloseConnection
        ]
    );
    assert!(receiver.context().shutdown_requested());

    assert!(receiver.handle(ready(text(3, "d"), 96)).is_empty());
    assert_eq!(receiver.summary().deliveries_settled, 3);
}

#[test]
fn close_sequence_follows_final_settlement() {
    let mut receiver = open(&config(1, 100));
    let intents = receiver.handle(ready(text(0, "only"), 99));
    let settle = position(&intents, &Intent::Settle {
        delivery: DeliveryId::new(0),
    });
    assert!(settle < position(&intents, &Intent::CloseLink));
}

#[rstest]
fn unbounded_mode_closes_only_on_interrupt(mut unbounded: Receiver) {
    for id in 0..250 {
        let intents = unbounded.handle(ready(text(id, "more"), 60));
        assert!(!intents.iter().any(Intent::is_close));
    }
    assert_eq!(
        unbounded.handle(Event::Interrupt),
        vec![
            Intent::CloseLink,
            Intent::CloseSession,
            Intent::CloseConnection
        ]
    );
}

#[rstest]
fn second_interrupt_emits_nothing(mut unbounded: Receiver) {
    assert_eq!(unbounded.handle(Event::Interrupt).len(), 3);
    assert!(unbounded.handle(Event::Interrupt).is_empty());
}

#[test]
fn interrupt_before_connecting_finishes_receiver() {
    let mut receiver = Receiver::new(&config(1, 10)).expect("valid config");
    assert!(receiver.handle(Event::Interrupt).is_empty());
    assert!(receiver.is_finished());
    assert!(receiver.handle(Event::ConnectionInit).is_empty());
}

#[rstest]
fn peer_confirmations_finish_receiver(mut unbounded: Receiver) {
    unbounded.handle(Event::Interrupt);
    for kind in [EndpointKind::Link, EndpointKind::Session] {
        assert!(
            unbounded
                .handle(Event::RemoteClosed { kind, error: None })
                .is_empty()
        );
        assert!(!unbounded.is_finished());
    }
    unbounded.handle(Event::RemoteClosed {
        kind: EndpointKind::Connection,
        error: None,
    });
    assert!(unbounded.is_finished());
}

#[rstest]
fn remote_link_close_closes_every_endpoint(mut unbounded: Receiver) {
    let intents = unbounded.handle(Event::RemoteClosed {
        kind: EndpointKind::Link,
        error: None,
    });
    assert_eq!(
        intents,
        vec![
            Intent::CloseLink,
            Intent::CloseSession,
            Intent::CloseConnection
        ]
    );
    assert!(unbounded.context().shutdown_requested());
    assert!(unbounded.handle(ready(text(0, "late"), 99)).is_empty());
}

#[rstest]
fn remote_connection_close_is_answered_with_close(mut unbounded: Receiver) {
    let intents = unbounded.handle(Event::RemoteClosed {
        kind: EndpointKind::Connection,
        error: None,
    });
    assert_eq!(intents, vec![Intent::CloseConnection]);
    assert_eq!(
        unbounded.context().endpoints().state(EndpointKind::Link),
        EndpointState::Closed
    );
}

#[rstest]
fn transport_closed_releases_state(mut unbounded: Receiver) {
    unbounded.handle(ready(text(0, "before"), 99));
    assert!(unbounded.handle(Event::TransportClosed).is_empty());
    assert!(unbounded.is_finished());
    for kind in EndpointKind::ALL {
        assert_eq!(
            unbounded.context().endpoints().state(kind),
            EndpointState::Closed
        );
    }
}

#[rstest]
fn unrelated_events_are_ignored(mut unbounded: Receiver) {
    assert!(unbounded.handle(Event::Other("flow")).is_empty());
}

#[test]
fn oversized_payload_is_truncated_and_settled() {
    let config = config(0, 100).with_max_read_bytes(16);
    let mut receiver = open(&config);
    let payload = Message::text("x".repeat(100)).to_bytes().freeze();
    let pending = payload.len();
    let intents = receiver.handle(ready(Delivery::complete(0, payload), 99));
    let id = DeliveryId::new(0);
    assert_eq!(
        intents,
        vec![
            Intent::Recv {
                delivery: id,
                max_bytes: 16,
            },
            Intent::Report(Notice::Truncated {
                delivery: id,
                read: 16,
                pending,
            }),
            Intent::Report(Notice::Received),
            Intent::Accept { delivery: id },
            Intent::Advance { delivery: id },
            Intent::Settle { delivery: id },
        ]
    );
    assert_eq!(receiver.summary().truncated, 1);
}

#[test]
fn payload_exactly_filling_buffer_is_not_truncated() {
    let payload = Message::text("fits").to_bytes().freeze();
    let config = config(0, 100).with_max_read_bytes(payload.len());
    let mut receiver = open(&config);
    let intents = receiver.handle(ready(Delivery::complete(0, payload), 99));
    assert!(intents.contains(&Intent::Report(Notice::Message("fits".into()))));
    assert_eq!(receiver.summary().truncated, 0);
}

#[test]
fn quiet_mode_skips_reading_and_reporting() {
    let config = config(0, 100).with_quiet(true);
    let mut receiver = open(&config);
    let id = DeliveryId::new(0);
    assert_eq!(
        receiver.handle(ready(text(0, "hush"), 99)),
        vec![
            Intent::Accept { delivery: id },
            Intent::Advance { delivery: id },
            Intent::Settle { delivery: id },
        ]
    );
}

#[rstest]
#[serial]
fn remote_close_error_is_logged(mut logger: LoggerHandle) {
    let mut receiver = open(&config(0, 100));
    receiver.handle(Event::RemoteClosed {
        kind: EndpointKind::Session,
        error: Some(RemoteError {
            condition: "amqp:resource-limit-exceeded".into(),
            description: Some("too many links".into()),
        }),
    });
    assert!(logger.contains("amqp:resource-limit-exceeded: too many links"));
}

#[rstest]
#[serial]
fn target_reached_is_logged(mut logger: LoggerHandle) {
    let mut receiver = open(&config(1, 100));
    receiver.handle(ready(text(0, "done"), 99));
    assert!(logger.contains("message target reached"));
}

#[rstest]
#[serial]
fn truncation_is_logged(mut logger: LoggerHandle) {
    let mut receiver = open(&config(0, 100).with_max_read_bytes(4));
    receiver.handle(ready(text(0, "longer than four"), 99));
    assert!(logger.contains("payload truncated: id=0"));
}

#[rstest]
#[serial]
fn ignored_event_is_logged_by_name(mut logger: LoggerHandle, mut unbounded: Receiver) {
    assert!(unbounded.handle(Event::Other("disposition")).is_empty());
    assert!(logger.contains("ignoring event: kind=disposition"));
}
