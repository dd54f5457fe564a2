//! Control transport driving a live engine
//!
//! The engine runs on mock devices; the control surface talks to it through
//! the framed transport, either over an in-memory pipe or the real local
//! endpoint.

use autoaudio_core::domain::events::event_channel;
use autoaudio_core::domain::mock::MockBackend;
use autoaudio_core::domain::protocol::{ControlIntent, StatusSnapshot};
use autoaudio_core::domain::routing::{EngineOptions, RoutingEngine};
use autoaudio_core::domain::selector::FilterSet;
use autoaudio_infra::ipc::{
    read_message, serve_connection, write_frame, write_message, IpcClient, SessionEnd,
};
use autoaudio_tests::*;

#[tokio::test]
async fn test_session_drives_engine_until_disconnect() {
    let catalog = desk_catalog();
    catalog.add_output(USB_HEADSET);
    let backend = MockBackend::new();
    let (events, rx) = event_channel();
    let engine = RoutingEngine::new(
        catalog,
        backend.clone(),
        events.clone(),
        FilterSet::default(),
        EngineOptions::default(),
    );
    let snapshots = engine.subscribe();
    let (client, server) = tokio::io::duplex(64 * 1024);

    let surface = async move {
        let mut client = IpcClient::new(client);

        let initial = client.recv().await.unwrap().expect("initial snapshot");
        assert_eq!(initial.input, CABLE);
        assert_eq!(initial.primary, HEADPHONES);
        assert_eq!(initial.outputs, vec![SPEAKERS, HEADPHONES, USB_HEADSET]);

        let info = client.device_info().await.unwrap().expect("device info");
        assert_eq!(info, initial);

        client
            .send(&ControlIntent::FilterChanged {
                primary_filter: "USB".to_string(),
            })
            .await
            .unwrap();
        let switched = client.recv().await.unwrap().expect("snapshot after filter change");
        assert_eq!(switched.primary, USB_HEADSET);
        assert_eq!(switched.primary_filter, "USB");

        client.send(&ControlIntent::SetBoost { enabled: true }).await.unwrap();
        let boosted = client.recv().await.unwrap().expect("snapshot after boost");
        assert!(boosted.boost);
        assert_eq!(boosted.primary, USB_HEADSET);
    };

    let session = serve_connection(server, &events, snapshots);
    let (_, end, _) = tokio::join!(engine.run(rx), session, surface);

    // The surface went away without asking; that still stops the engine.
    assert_eq!(end, SessionEnd::Disconnected);
    assert_eq!(backend.live_inputs(), 0);
    assert_eq!(backend.live_outputs(), 0);
    assert!(events.is_closed());
}

#[tokio::test]
async fn test_malformed_messages_do_not_end_the_session() {
    let backend = MockBackend::new();
    let (events, rx) = event_channel();
    let engine = RoutingEngine::new(
        desk_catalog(),
        backend.clone(),
        events.clone(),
        FilterSet::default(),
        EngineOptions::default(),
    );
    let snapshots = engine.subscribe();
    let (mut client, server) = tokio::io::duplex(64 * 1024);

    let surface = async move {
        let initial: StatusSnapshot = read_message(&mut client).await.unwrap().unwrap();
        assert!(!initial.boost);

        write_frame(&mut client, b"{\"command\":").await.unwrap();
        write_frame(&mut client, br#"{"command":"reboot"}"#).await.unwrap();
        write_frame(&mut client, br#"{"command":"set_boost"}"#).await.unwrap();
        write_message(&mut client, &ControlIntent::SetBoost { enabled: true })
            .await
            .unwrap();

        let boosted: StatusSnapshot = read_message(&mut client).await.unwrap().unwrap();
        assert!(boosted.boost);

        write_message(&mut client, &ControlIntent::Shutdown).await.unwrap();
        let after: Option<StatusSnapshot> = read_message(&mut client).await.unwrap();
        assert!(after.is_none());
    };

    let session = serve_connection(server, &events, snapshots);
    let (_, end, _) = tokio::join!(engine.run(rx), session, surface);

    assert_eq!(end, SessionEnd::Shutdown);
    assert_eq!(backend.live_outputs(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_endpoint_round_trip() {
    use autoaudio_infra::ipc::{serve, ControlListener};

    let name = format!("autoaudio-it-{}", std::process::id());
    let listener = ControlListener::bind(&name).unwrap();

    let backend = MockBackend::new();
    let (events, rx) = event_channel();
    let engine = RoutingEngine::new(
        desk_catalog(),
        backend.clone(),
        events.clone(),
        FilterSet::default(),
        EngineOptions::default(),
    );
    let server = tokio::spawn(serve(listener, events, engine.snapshot_feed()));

    let surface = async {
        let mut client = IpcClient::connect(&name).await.unwrap();
        let info = client.device_info().await.unwrap().expect("device info");
        assert_eq!(info.fallback, SPEAKERS);
        client.send(&ControlIntent::Shutdown).await.unwrap();
    };

    tokio::join!(engine.run(rx), surface);
    server.abort();

    assert_eq!(backend.close_order().len(), 2);
}
