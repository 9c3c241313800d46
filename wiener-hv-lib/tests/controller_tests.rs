//! Tests for setpoint application and measurement reads

mod common;

use common::*;
use wiener_hv_lib::{SwitchState, VoltageController};

fn controller(device: FakeCrate) -> VoltageController<FakeCrate> {
    VoltageController::new(device, HvConfig::default())
}

#[tokio::test]
async fn test_switch_on_unless_literal_zero() {
    let hv = controller(three_channel_crate());
    let targets = vec![
        VoltageSetting::new("0", "1500"),
        VoltageSetting::new("1", "0"),
        VoltageSetting::new("2", "0.0"),
    ];

    let report = hv.set_voltages(&targets).await;
    assert!(report.is_complete());

    let switches: Vec<(ChannelId, WriteValue)> = hv
        .device()
        .writes()
        .into_iter()
        .filter(|(parameter, _, _)| *parameter == Parameter::Switch)
        .map(|(_, channel, value)| (channel, value))
        .collect();
    assert_eq!(
        switches,
        vec![
            (ChannelId::from("0"), WriteValue::Integer(1)),
            (ChannelId::from("1"), WriteValue::Integer(0)),
            (ChannelId::from("2"), WriteValue::Integer(1)),
        ],
        "Only the literal \"0\" should switch a channel off"
    );
    assert_eq!(report.channels[1].switch, SwitchState::Off);
    assert_eq!(report.channels[2].switch, SwitchState::On);
}

#[tokio::test]
async fn test_ramp_rate_written_before_voltage_for_every_channel() {
    let hv = controller(three_channel_crate());
    let targets = vec![VoltageSetting::new("2", "700"), VoltageSetting::new("0", "0")];

    hv.set_voltages(&targets).await;

    let writes = hv.device().writes();
    let expected = vec![
        (Parameter::RiseRate, ChannelId::from("2"), WriteValue::Float("100".into())),
        (Parameter::TargetVoltage, ChannelId::from("2"), WriteValue::Float("700".into())),
        (Parameter::Switch, ChannelId::from("2"), WriteValue::Integer(1)),
        (Parameter::RiseRate, ChannelId::from("0"), WriteValue::Float("100".into())),
        (Parameter::TargetVoltage, ChannelId::from("0"), WriteValue::Float("0".into())),
        (Parameter::Switch, ChannelId::from("0"), WriteValue::Integer(0)),
    ];
    assert_eq!(writes, expected);
}

#[tokio::test]
async fn test_configured_ramp_rate_is_used() {
    let config = HvConfig {
        ramp_rate: "25".to_string(),
        ..HvConfig::default()
    };
    let hv = VoltageController::new(three_channel_crate(), config);

    hv.set_voltages(&[VoltageSetting::new("1", "300")]).await;

    assert_eq!(hv.device().value(Parameter::RiseRate, "1").as_deref(), Some("25"));
}

#[tokio::test]
async fn test_failed_write_does_not_abort_batch() {
    let device = three_channel_crate().fail_write(Parameter::TargetVoltage, "1");
    let hv = controller(device);
    let targets = vec![
        VoltageSetting::new("0", "100"),
        VoltageSetting::new("1", "200"),
        VoltageSetting::new("2", "300"),
    ];

    let report = hv.set_voltages(&targets).await;

    // All nine writes are still attempted.
    assert_eq!(hv.device().writes().len(), 9);
    assert!(!report.is_complete());
    assert_eq!(report.failure_count(), 1);

    let failed: Vec<&ChannelId> = report.failed_channels().map(|c| &c.channel).collect();
    assert_eq!(failed, vec![&ChannelId::from("1")]);
    let failure = &report.channels[1].failures[0];
    assert_eq!(failure.parameter, Parameter::TargetVoltage);
    assert!(failure.error.is_recoverable());

    // The switch write for the failing channel still went out.
    assert_eq!(hv.device().value(Parameter::Switch, "1").as_deref(), Some("1"));
    assert_eq!(hv.device().value(Parameter::TargetVoltage, "2").as_deref(), Some("300"));
}

#[tokio::test]
async fn test_full_read_enumerates_names_then_measurement() {
    let hv = controller(three_channel_crate());

    let voltages = hv.read_voltages(None).await.expect("full read succeeds");

    assert_eq!(
        hv.device().calls(),
        vec![Call::Enumerate(Parameter::Name), Call::Enumerate(Parameter::SenseVoltage)]
    );
    let channels: Vec<&str> = voltages.iter().map(|r| r.channel.as_str()).collect();
    assert_eq!(channels, vec!["0", "1", "2"]);
    assert_eq!(voltages[1].value, 1200.1);
}

#[tokio::test]
async fn test_scoped_read_preserves_caller_order() {
    let hv = controller(three_channel_crate());
    let wanted = vec![ChannelId::from("2"), ChannelId::from("0")];

    let currents = hv.read_currents(Some(wanted.as_slice())).await.unwrap();

    assert_eq!(
        hv.device().calls(),
        vec![
            Call::Read(Parameter::Current, ChannelId::from("2")),
            Call::Read(Parameter::Current, ChannelId::from("0")),
        ]
    );
    assert_eq!(currents[0].channel.as_str(), "2");
    assert_eq!(currents[0].value, 0.0009);
    assert_eq!(currents[1].value, 0.0021);
}

#[tokio::test]
async fn test_scoped_and_full_reads_agree() {
    let hv = controller(three_channel_crate());

    let all_ids = hv.channels().await.unwrap();
    let scoped = hv.read_voltages(Some(all_ids.as_slice())).await.unwrap();
    let full = hv.read_voltages(None).await.unwrap();

    assert_eq!(scoped, full);
}

#[tokio::test]
async fn test_full_read_matches_values_by_channel_not_position() {
    let device = three_channel_crate().reverse_walk(Parameter::SenseVoltage);
    let hv = controller(device);

    let voltages = hv.read_voltages(None).await.unwrap();

    let pairs: Vec<(&str, f64)> = voltages.iter().map(|r| (r.channel.as_str(), r.value)).collect();
    assert_eq!(pairs, vec![("0", 1499.8), ("1", 1200.1), ("2", 899.9)]);
}

#[tokio::test]
async fn test_unreadable_channels_are_skipped() {
    let device = three_channel_crate().fail_read(Parameter::SenseVoltage, "1");
    device.set_value(Parameter::SenseVoltage, "2", "n/a");
    let hv = controller(device);

    let scoped = hv
        .read_voltages(Some(&[ChannelId::from("0"), ChannelId::from("1")][..]))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].channel.as_str(), "0");

    let full = hv.read_voltages(None).await.unwrap();
    let channels: Vec<&str> = full.iter().map(|r| r.channel.as_str()).collect();
    assert_eq!(channels, vec!["0", "1"], "Unparseable value for channel 2 should be skipped");
}

#[tokio::test]
async fn test_failed_walk_is_an_error() {
    let hv = controller(three_channel_crate().fail_walk(Parameter::Name));

    match hv.read_currents(None).await {
        Err(HvError::DeviceCommunication { operation, .. }) => assert_eq!(operation, "walk outputName"),
        other => panic!("Expected DeviceCommunication error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_read_voltage_parses_single_channel() {
    let hv = controller(three_channel_crate());
    assert_eq!(hv.read_voltage(&ChannelId::from("2")).await.unwrap(), 899.9);

    hv.device().set_value(Parameter::SenseVoltage, "2", "garbage");
    assert!(matches!(
        hv.read_voltage(&ChannelId::from("2")).await,
        Err(HvError::DeviceCommunication { .. })
    ));
}

#[tokio::test]
async fn test_set_defaults_snapshots_setpoints() {
    let dir = tempfile::tempdir().unwrap();
    let hv = VoltageController::new(three_channel_crate(), test_config(dir.path()));

    let saved = hv.set_defaults().await.unwrap();

    let contents = std::fs::read_to_string(dir.path().join("HVDefaults.txt")).unwrap();
    assert_eq!(contents, "0 1500\n1 1200.5\n2 900\n");
    assert_eq!(saved.len(), 3);
    assert!(hv.device().writes().is_empty(), "Snapshotting defaults must not touch the crate");
}

#[tokio::test]
async fn test_set_last_used_snapshots_setpoints() {
    let dir = tempfile::tempdir().unwrap();
    let hv = VoltageController::new(three_channel_crate(), test_config(dir.path()));
    hv.device().set_value(Parameter::TargetVoltage, "1", "1100");

    let saved = hv.set_last_used().await.unwrap();

    let contents = std::fs::read_to_string(dir.path().join("LastUsedHVSettings.txt")).unwrap();
    assert_eq!(contents, "0 1500\n1 1100\n2 900\n");
    assert_eq!(saved[1], VoltageSetting::new("1", "1100"));
    assert!(!dir.path().join("HVDefaults.txt").exists());
    assert!(hv.device().writes().is_empty(), "Snapshotting settings must not touch the crate");
}

#[tokio::test]
async fn test_voltages_to_file_arbitrary_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beam-test.txt");
    let hv = controller(three_channel_crate());

    hv.voltages_to_file(&path).await.unwrap();

    let loaded = wiener_hv_lib::store::load(&path).unwrap();
    assert_eq!(loaded[1], VoltageSetting::new("1", "1200.5"));
}
