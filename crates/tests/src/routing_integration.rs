//! End-to-end routing scenarios
//!
//! The engine runs against the in-memory catalog and backend, so every
//! scenario exercises selection, stream swaps, the pump and snapshots
//! together.

use autoaudio_core::domain::audio::Direction;
use autoaudio_core::domain::events::event_channel;
use autoaudio_core::domain::mock::{MockBackend, MockCatalog};
use autoaudio_core::domain::protocol::{ControlIntent, NO_DEVICE, PRIMARY_NOT_CONNECTED};
use autoaudio_core::domain::routing::{EngineOptions, EnginePhase, RoutingEngine};
use autoaudio_core::domain::selector::FilterSet;
use autoaudio_tests::*;
use proptest::prelude::*;

// ============================================================================
// STARTUP AND SELECTION
// ============================================================================

#[test]
fn test_startup_routes_cable_to_primary() {
    let mut rig = Rig::new(desk_catalog());
    let snapshot = rig.start();

    assert_eq!(rig.engine.phase(), EnginePhase::Running);
    assert_eq!(snapshot.input, CABLE);
    assert_eq!(snapshot.primary, HEADPHONES);
    assert_eq!(snapshot.fallback, SPEAKERS);
    assert_eq!(snapshot.inputs, vec![MICROPHONE, CABLE]);
    assert_eq!(snapshot.outputs, vec![SPEAKERS, HEADPHONES]);
    assert_eq!(rig.capturing_from().as_deref(), Some(CABLE));
    assert_eq!(rig.playing_on().as_deref(), Some(HEADPHONES));
}

#[test]
fn test_reevaluation_without_changes_is_idempotent() {
    let mut rig = Rig::new(desk_catalog());
    let first = rig.start();
    let opened = rig.backend.opened();

    let second = rig.catalog_changed();
    let third = rig.catalog_changed();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(rig.backend.opened(), opened);
}

#[test]
fn test_nothing_matches_leaves_everything_unresolved() {
    let catalog = desk_catalog();
    let mut rig = Rig::with_options(
        catalog,
        FilterSet::new("Focusrite", "AirPods", "Monitor"),
        EngineOptions::default(),
    );
    let snapshot = rig.start();

    assert_eq!(snapshot.input, NO_DEVICE);
    assert_eq!(snapshot.fallback, NO_DEVICE);
    assert_eq!(snapshot.primary, "");
    assert!(!snapshot.primary_connected());
    assert!(rig.backend.opened().is_empty());

    // Nothing to pump from, nothing breaks.
    rig.capture(&square_block(256, 1000));
    assert!(rig.backend.played().is_empty());
}

#[test]
fn test_empty_catalog() {
    let mut rig = Rig::new(MockCatalog::new());
    let snapshot = rig.start();

    assert!(snapshot.inputs.is_empty());
    assert!(snapshot.outputs.is_empty());
    assert_eq!(snapshot.input, NO_DEVICE);
    assert!(rig.playing_on().is_none());
}

// ============================================================================
// FAILOVER
// ============================================================================

#[test]
fn test_headphones_unplugged_and_replugged() {
    let catalog = desk_catalog();
    let mut rig = Rig::new(catalog.clone());
    rig.start();

    assert_eq!(unplug(&catalog, HEADPHONES), 1);
    let snapshot = rig.catalog_changed();
    assert_eq!(snapshot.primary, "");
    assert_eq!(rig.playing_on().as_deref(), Some(SPEAKERS));

    catalog.add_output(HEADPHONES);
    let snapshot = rig.catalog_changed();
    assert_eq!(snapshot.primary, HEADPHONES);
    assert_eq!(rig.playing_on().as_deref(), Some(HEADPHONES));

    assert_eq!(rig.backend.max_live_outputs(), 1);
}

#[test]
fn test_fallback_unplugged_while_primary_plays() {
    let catalog = desk_catalog();
    let mut rig = Rig::new(catalog.clone());
    rig.start();
    let outputs_opened = rig.backend.open_count(Direction::Output);

    assert_eq!(unplug(&catalog, SPEAKERS), 1);
    let snapshot = rig.catalog_changed();

    assert_eq!(snapshot.fallback, NO_DEVICE);
    assert_eq!(snapshot.primary, HEADPHONES);
    assert_eq!(rig.backend.open_count(Direction::Output), outputs_opened);
}

#[test]
fn test_everything_unplugged_closes_output() {
    let catalog = desk_catalog();
    let mut rig = Rig::new(catalog.clone());
    rig.start();

    unplug(&catalog, HEADPHONES);
    unplug(&catalog, SPEAKERS);
    let snapshot = rig.catalog_changed();

    assert_eq!(snapshot.primary, "");
    assert_eq!(snapshot.fallback, NO_DEVICE);
    assert!(rig.playing_on().is_none());
    assert_eq!(rig.backend.live_outputs(), 0);

    // Audio still flows in and is discarded.
    rig.capture(&square_block(1024, 500));
    assert_eq!(rig.engine.streams().stats().discarded, 1);
}

#[test]
fn test_primary_fault_rebuilds_without_catalog_event() {
    let mut rig = Rig::new(desk_catalog());
    rig.start();

    assert!(rig.backend.fault_latest(Direction::Output, "device invalidated"));
    rig.settle();

    assert_eq!(rig.playing_on().as_deref(), Some(HEADPHONES));
    assert_eq!(rig.backend.open_count(Direction::Output), 2);
    assert_eq!(rig.backend.live_outputs(), 1);
}

#[derive(Debug, Clone)]
enum Hotplug {
    Plug(usize),
    Unplug(usize),
    Fault,
}

const OUTPUT_NAMES: [&str; 3] = [SPEAKERS, HEADPHONES, USB_HEADSET];

fn hotplug() -> impl Strategy<Value = Hotplug> {
    prop_oneof![
        (0..OUTPUT_NAMES.len()).prop_map(Hotplug::Plug),
        (0..OUTPUT_NAMES.len()).prop_map(Hotplug::Unplug),
        Just(Hotplug::Fault),
    ]
}

proptest! {
    #[test]
    fn prop_one_output_follows_the_filters(steps in prop::collection::vec(hotplug(), 1..40)) {
        let catalog = desk_catalog();
        let mut rig = Rig::new(catalog.clone());
        rig.start();

        for step in steps {
            match step {
                Hotplug::Plug(i) => {
                    catalog.add_output(OUTPUT_NAMES[i]);
                }
                Hotplug::Unplug(i) => {
                    unplug(&catalog, OUTPUT_NAMES[i]);
                }
                Hotplug::Fault => {
                    rig.backend.fault_latest(Direction::Output, "device invalidated");
                }
            }
            let snapshot = rig.catalog_changed();

            prop_assert!(rig.backend.live_outputs() <= 1);
            let expected = if snapshot.primary_connected() {
                Some(snapshot.primary.clone())
            } else if snapshot.fallback != NO_DEVICE {
                Some(snapshot.fallback.clone())
            } else {
                None
            };
            prop_assert_eq!(rig.playing_on(), expected);
        }
        prop_assert_eq!(rig.backend.max_live_outputs(), 1);
    }
}

// ============================================================================
// CONTROL INTENTS
// ============================================================================

#[test]
fn test_filter_changed_to_usb_headset() {
    let catalog = desk_catalog();
    catalog.add_output(USB_HEADSET);
    let mut rig = Rig::new(catalog);
    rig.start();

    let intent =
        ControlIntent::from_json(br#"{"command":"filter_changed","primary_filter":"USB"}"#)
            .expect("valid intent");
    let snapshot = rig.control(intent);

    assert_eq!(snapshot.primary, USB_HEADSET);
    assert_eq!(snapshot.primary_filter, "USB");
    assert_eq!(rig.playing_on().as_deref(), Some(USB_HEADSET));
    assert_eq!(rig.backend.max_live_outputs(), 1);
}

#[test]
fn test_ui_change_from_picker() {
    let mut rig = Rig::new(desk_catalog());
    rig.start();

    let snapshot = rig.control(ControlIntent::UiChange {
        input: MICROPHONE.to_string(),
        primary: PRIMARY_NOT_CONNECTED.to_string(),
        fallback: SPEAKERS.to_string(),
    });

    assert_eq!(snapshot.input, MICROPHONE);
    assert_eq!(snapshot.primary, HEADPHONES);
    assert_eq!(snapshot.primary_filter, "Headphones");
    assert_eq!(rig.capturing_from().as_deref(), Some(MICROPHONE));
}

#[test]
fn test_boost_toggle_keeps_streams() {
    let frames = 64;
    let mut rig = Rig::with_options(
        desk_catalog(),
        FilterSet::default(),
        EngineOptions {
            block_frames: frames,
            ..EngineOptions::default()
        },
    );
    rig.start();
    let opened = rig.backend.opened();

    let snapshot = rig.control(ControlIntent::SetBoost { enabled: true });
    assert!(snapshot.boost);
    rig.capture(&square_block(frames, 1000));

    let snapshot = rig.control(ControlIntent::SetBoost { enabled: false });
    assert!(!snapshot.boost);
    rig.capture(&square_block(frames, 1000));

    let played = rig.backend.played();
    assert_eq!(played.len(), frames * 4);
    assert_eq!(played[0], 3160);
    assert_eq!(played[frames * 2], 1000);
    assert_eq!(rig.backend.opened(), opened);
    assert!(rig.backend.close_order().is_empty());
}

#[test]
fn test_boost_from_startup_options() {
    let mut rig = Rig::with_options(
        desk_catalog(),
        FilterSet::default(),
        EngineOptions {
            block_frames: 16,
            boost: true,
            ..EngineOptions::default()
        },
    );
    assert!(rig.start().boost);

    rig.capture(&square_block(16, 20000));
    // Peak 20000 is above the floor: scaled up to full range.
    assert_eq!(rig.backend.played()[0], 32767);
}

#[test]
fn test_get_device_info_resends_snapshot() {
    let mut rig = Rig::new(desk_catalog());
    let first = rig.start();
    let opened = rig.backend.opened();

    let again = rig.control(ControlIntent::GetDeviceInfo);

    assert_eq!(first, again);
    assert_eq!(rig.backend.opened(), opened);
}

#[test]
fn test_shutdown_closes_input_first() {
    let mut rig = Rig::new(desk_catalog());
    rig.start();

    rig.control(ControlIntent::Shutdown);

    assert_eq!(rig.engine.phase(), EnginePhase::Stopped);
    assert_eq!(
        rig.backend.close_order(),
        vec![Direction::Input, Direction::Output]
    );
    assert_eq!(rig.backend.live_inputs(), 0);
    assert_eq!(rig.backend.live_outputs(), 0);
}

// ============================================================================
// EVENT LOOP
// ============================================================================

#[tokio::test]
async fn test_event_loop_runs_until_shutdown() {
    let catalog = desk_catalog();
    let backend = MockBackend::new();
    let (events, rx) = event_channel();
    let engine = RoutingEngine::new(
        catalog.clone(),
        backend.clone(),
        events.clone(),
        FilterSet::default(),
        EngineOptions::default(),
    );
    let mut snapshots = engine.subscribe();

    catalog.add_output(USB_HEADSET);
    events.control(ControlIntent::FilterChanged {
        primary_filter: "USB".to_string(),
    });
    events.control(ControlIntent::Shutdown);
    engine.run(rx).await;

    let initial = snapshots.recv().await.expect("initial snapshot");
    assert_eq!(initial.primary, HEADPHONES);
    let after_filter = snapshots.recv().await.expect("snapshot after filter change");
    assert_eq!(after_filter.primary, USB_HEADSET);
    assert_eq!(backend.live_outputs(), 0);
    assert!(events.is_closed());
}
