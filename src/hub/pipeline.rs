use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handlers::{HandlerOutcome, Handlers};
use crate::actuation::{RfDispatcher, SocketCommandIntent};
use crate::decode::{DecodeError, DecodedEvent};
use crate::mqtt::Message;
use crate::persistence::{
    PersistenceError, PersistenceSink, ProbeSightingRow, RawMessageRow, RfTransmissionRow,
    RoomReadingRow,
};
use crate::routing::{HandlerRef, TopicRouter};
use crate::state::{StateStore, StateUpdate};

/// What happened to one message
#[derive(Debug)]
pub struct ProcessReport {
    pub handler: HandlerRef,
    pub raw_persisted: bool,
    pub decoded_persisted: bool,
    pub intent: Option<SocketCommandIntent>,
    pub decode_error: Option<DecodeError>,
    /// Detached RF task; the loop itself never awaits it
    pub transmission: Option<JoinHandle<()>>,
}

impl ProcessReport {
    fn new(handler: HandlerRef) -> Self {
        Self {
            handler,
            raw_persisted: false,
            decoded_persisted: false,
            intent: None,
            decode_error: None,
            transmission: None,
        }
    }
}

/// Route → record raw → handle → record decoded → apply state → actuate.
///
/// Owns the [`StateStore`]; messages are processed one at a time, so the
/// store needs no locking.
pub struct MessagePipeline {
    router: TopicRouter,
    handlers: Handlers,
    state: StateStore,
    sink: Arc<dyn PersistenceSink>,
    dispatcher: RfDispatcher,
}

impl MessagePipeline {
    pub fn new(
        router: TopicRouter,
        handlers: Handlers,
        sink: Arc<dyn PersistenceSink>,
        dispatcher: RfDispatcher,
    ) -> Self {
        Self {
            router,
            handlers,
            state: StateStore::new(),
            sink,
            dispatcher,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub async fn process(&mut self, message: &Message) -> ProcessReport {
        let handler = self.router.route(message.topic());
        let mut report = ProcessReport::new(handler);

        match handler {
            HandlerRef::Discard => {
                debug!("Discarded message on '{}'", message.topic());
                return report;
            }
            HandlerRef::Unrouted => info!("No route for topic '{}'", message.topic()),
            _ => debug!("{} -> {}", message, handler),
        }

        report.raw_persisted = self.record_raw(message).await;

        let HandlerOutcome {
            decoded,
            intent,
            state_update,
            error,
        } = self.handlers.handle(handler, message, &self.state);

        if let Some(e) = &error {
            warn!(
                "Could not decode payload on '{}' ({}): {}",
                message.topic(),
                handler,
                e
            );
        }
        report.decode_error = error;

        if let Some(decoded) = decoded {
            for warning in &decoded.warnings {
                warn!("Payload on '{}' patched: {}", message.topic(), warning);
            }
            report.decoded_persisted = self.record_decoded(message, &decoded.event).await;
        }

        if let Some(update) = state_update {
            self.apply(handler, update);
        }

        if let Some(intent) = intent {
            info!("Issuing {}", intent);
            report.transmission = Some(self.dispatcher.dispatch(intent));
            report.intent = Some(intent);
        }

        report
    }

    async fn record_raw(&self, message: &Message) -> bool {
        let row = RawMessageRow {
            time: message.received_at().naive_local(),
            topic: message.topic().to_string(),
            payload: message.payload_text().into_owned(),
        };
        log_write("raw message", message, self.sink.append_raw_message(row).await)
    }

    /// Only room readings, RF transmissions and probe sightings have a table
    async fn record_decoded(&self, message: &Message, event: &DecodedEvent) -> bool {
        let time = message.received_at().naive_local();
        let result = match event {
            DecodedEvent::RoomReading(reading) => {
                self.sink
                    .append_room_reading(RoomReadingRow {
                        time,
                        temperature: reading.temperature,
                        humidity: reading.humidity,
                        pressure: reading.pressure,
                        brightness: reading.brightness,
                    })
                    .await
            }
            DecodedEvent::RfTransmission(rf) => {
                self.sink
                    .append_rf_transmission(RfTransmissionRow {
                        time,
                        decimal: rf.decimal,
                        bits: rf.bits,
                        binary: rf.binary.clone(),
                        pulse_length: rf.pulse_length,
                        protocol: rf.protocol,
                    })
                    .await
            }
            DecodedEvent::ProbeSighting(probe) => {
                self.sink
                    .append_probe_sighting(ProbeSightingRow {
                        time: probe.time.unwrap_or(time),
                        mac: probe.mac.clone(),
                        vendor: probe.vendor.clone(),
                        ssid: probe.ssid.clone(),
                        ssid_uppercase: probe.ssid_uppercase.clone(),
                        rssi: probe.rssi,
                    })
                    .await
            }
            _ => return false,
        };
        log_write("decoded row", message, result)
    }

    fn apply(&mut self, handler: HandlerRef, update: StateUpdate) {
        if update.key.owner() != handler {
            error!(
                "{} tried to write '{}', owned by {}; ignored",
                handler,
                update.key,
                update.key.owner()
            );
            return;
        }
        debug!("State '{}' = {}", update.key, update.value);
        self.state.apply(update);
    }
}

fn log_write(what: &str, message: &Message, result: Result<(), PersistenceError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(
                "Failed to persist {} for '{}': {}",
                what,
                message.topic(),
                e
            );
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::actuation::rf::tests::RecordingTransmitter;
    use crate::actuation::SocketController;
    use crate::config::HubConfig;
    use crate::decode::SocketAction;
    use crate::persistence::MemorySink;
    use crate::state::{StateKey, StateValue};
    use chrono::NaiveDate;
    use rumqttc::QoS;

    pub(crate) struct Fixture {
        pub pipeline: MessagePipeline,
        pub sink: Arc<MemorySink>,
        pub radio: RecordingTransmitter,
    }

    pub(crate) fn fixture() -> Fixture {
        let config = HubConfig::default();
        let sink = Arc::new(MemorySink::new());
        let radio = RecordingTransmitter::default();
        let controller = SocketController::new(&config.actuation.sockets, Box::new(radio.clone()));
        let pipeline = MessagePipeline::new(
            TopicRouter::from_topics(&config.topics).unwrap(),
            Handlers::new(&config),
            sink.clone(),
            RfDispatcher::new(Arc::new(controller)),
        );
        Fixture {
            pipeline,
            sink,
            radio,
        }
    }

    pub(crate) fn message(topic: &str, payload: &str) -> Message {
        Message::received(topic, payload.as_bytes().to_vec(), QoS::AtMostOnce)
    }

    async fn finish(mut report: ProcessReport) -> ProcessReport {
        if let Some(task) = report.transmission.take() {
            task.await.unwrap();
        }
        report
    }

    #[tokio::test]
    async fn room_reading_with_numeric_strings() {
        let mut f = fixture();
        let report = f
            .pipeline
            .process(&message(
                "room/data",
                r#"{"temperature":"21.5","humidity":"40","pressure":"1012"}"#,
            ))
            .await;

        assert!(report.raw_persisted && report.decoded_persisted);
        let rows = f.sink.room_readings().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 21.5);
        assert_eq!(rows[0].humidity, 40.0);
        assert_eq!(rows[0].pressure, 1012.0);
        assert_eq!(rows[0].brightness, 0.0);
    }

    #[tokio::test]
    async fn room_reading_with_bad_field_is_still_stored() {
        let mut f = fixture();
        f.pipeline
            .process(&message(
                "room/data",
                r#"{"temperature":"hot","humidity":40,"pressure":1012}"#,
            ))
            .await;
        let rows = f.sink.room_readings().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn low_battery_switches_tablet_socket_on() {
        let mut f = fixture();
        let report = finish(
            f.pipeline
                .process(&message("tablet/shield/battery", "\"15\""))
                .await,
        )
        .await;

        let intent = report.intent.unwrap();
        assert_eq!(intent.socket_id, 2);
        assert_eq!(intent.action, SocketAction::On);
        assert_eq!(f.sink.raw_messages().await.len(), 1);
        assert_eq!(*f.radio.sent.lock().unwrap(), vec![1134929]);
    }

    #[tokio::test]
    async fn probe_sighting_keeps_exact_fields() {
        let mut f = fixture();
        f.pipeline
            .process(&message(
                "mqtt/probes",
                r#"{"time":"2021-01-01T00:00:00","macaddress":"AA:BB:CC:DD:EE:FF","make":"Acme","ssid":"net","uppercaseSSID":"NET","rssi":-70}"#,
            ))
            .await;

        let rows = f.sink.probe_sightings().await;
        assert_eq!(
            rows,
            vec![ProbeSightingRow {
                time: NaiveDate::from_ymd_opt(2021, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                mac: "AA:BB:CC:DD:EE:FF".to_string(),
                vendor: "Acme".to_string(),
                ssid: "net".to_string(),
                ssid_uppercase: "NET".to_string(),
                rssi: -70,
            }]
        );
    }

    #[tokio::test]
    async fn probe_without_time_uses_receive_time() {
        let mut f = fixture();
        let msg = message(
            "mqtt/probes",
            r#"{"macaddress":"AA","make":"Acme","ssid":"net","rssi":-70}"#,
        );
        f.pipeline.process(&msg).await;
        let rows = f.sink.probe_sightings().await;
        assert_eq!(rows[0].time, msg.received_at().naive_local());
    }

    #[tokio::test]
    async fn socket_command_for_known_and_unknown_ids() {
        let mut f = fixture();
        let known = finish(
            f.pipeline
                .process(&message("room/control/command/socket/2", "\"on\""))
                .await,
        )
        .await;
        assert_eq!(
            known.intent.map(|i| (i.socket_id, i.action)),
            Some((2, SocketAction::On))
        );

        let unknown = f
            .pipeline
            .process(&message("room/control/command/socket/99", "\"on\""))
            .await;
        assert!(unknown.intent.is_none());
        assert!(unknown.transmission.is_none());
        assert_eq!(*f.radio.sent.lock().unwrap(), vec![1134929]);
    }

    #[tokio::test]
    async fn discard_topic_leaves_no_trace() {
        let mut f = fixture();
        let report = f.pipeline.process(&message("trash", "noise")).await;
        assert_eq!(report.handler, HandlerRef::Discard);
        assert!(!report.raw_persisted);
        assert!(f.sink.raw_messages().await.is_empty());
    }

    #[tokio::test]
    async fn unrouted_topic_is_stored_raw() {
        let mut f = fixture();
        let report = f
            .pipeline
            .process(&message("garage/door", "open"))
            .await;
        assert_eq!(report.handler, HandlerRef::Unrouted);
        let raw = f.sink.raw_messages().await;
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].topic, "garage/door");
        assert_eq!(raw[0].payload, "open");
    }

    #[tokio::test]
    async fn legacy_nan_skips_derived_row_only() {
        let mut f = fixture();
        let report = f
            .pipeline
            .process(&message("room/data", "temperature=nan,humidity=40,pressure=1000"))
            .await;
        assert!(report.raw_persisted);
        assert!(!report.decoded_persisted);
        assert_eq!(
            report.decode_error,
            Some(DecodeError::NotANumber("temperature".to_string()))
        );
        assert_eq!(f.sink.raw_messages().await.len(), 1);
        assert!(f.sink.room_readings().await.is_empty());
    }

    #[tokio::test]
    async fn charging_tokens_track_latest_state() {
        let mut f = fixture();
        for (payload, expected) in [("charging", true), ("discharging", false), ("charging", true)]
        {
            let report = f
                .pipeline
                .process(&message("tablet/shield/battery", payload))
                .await;
            assert!(report.intent.is_none());
            assert_eq!(
                f.pipeline.state().get(StateKey::IsCharging),
                &StateValue::Bool(expected)
            );
        }
    }

    #[tokio::test]
    async fn computer_control_respects_reported_status() {
        let mut f = fixture();
        f.pipeline
            .process(&message("room/computer/status", "on"))
            .await;
        let skipped = f
            .pipeline
            .process(&message("room/control/computer", "on"))
            .await;
        assert!(skipped.intent.is_none());

        let off = finish(
            f.pipeline
                .process(&message("room/control/computer", "off"))
                .await,
        )
        .await;
        assert_eq!(
            off.intent.map(|i| (i.socket_id, i.action)),
            Some((1, SocketAction::Off))
        );
        assert_eq!(*f.radio.sent.lock().unwrap(), vec![1131860]);
    }

    #[tokio::test]
    async fn rf_transmission_is_stored() {
        let mut f = fixture();
        f.pipeline
            .process(&message(
                "rf/received",
                r#"{"decimal":1131857,"bits":24,"pulselength":350,"protocol":1}"#,
            ))
            .await;
        let rows = f.sink.rf_transmissions().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decimal, 1131857);
        assert_eq!(rows[0].binary.len(), 24);
    }

    #[tokio::test]
    async fn oversized_rf_bit_count_is_stored_as_zero() {
        let mut f = fixture();
        let report = f
            .pipeline
            .process(&message("rf/received", r#"{"decimal":1,"bits":70000}"#))
            .await;
        assert!(report.raw_persisted && report.decoded_persisted);
        let rows = f.sink.rf_transmissions().await;
        assert_eq!(rows[0].bits, 0);
        assert_eq!(rows[0].binary, "1");
    }

    #[tokio::test]
    async fn persistence_failure_does_not_stop_processing() {
        let mut f = fixture();
        f.sink.set_failing(true);
        let report = finish(
            f.pipeline
                .process(&message("tablet/shield/battery", "90"))
                .await,
        )
        .await;
        assert!(!report.raw_persisted);
        assert_eq!(report.intent.map(|i| i.action), Some(SocketAction::Off));

        f.sink.set_failing(false);
        let report = f
            .pipeline
            .process(&message("room/data", r#"{"temperature":20,"humidity":40,"pressure":1000}"#))
            .await;
        assert!(report.raw_persisted && report.decoded_persisted);
    }

    #[tokio::test]
    async fn routing_is_stable_across_repeats() {
        let mut f = fixture();
        let first = f.pipeline.process(&message("mqtt/probes", "{}")).await;
        let second = f.pipeline.process(&message("mqtt/probes", "{}")).await;
        assert_eq!(first.handler, second.handler);
        assert_eq!(f.sink.raw_messages().await.len(), 2);
    }
}
