//! Common test utilities: a scripted in-memory crate implementing `DeviceChannel`.

// Allow dead code since this is a shared module used across multiple test
// files - not all items are used in every test file
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

pub use wiener_hv_lib::config::{HvConfig, PollConfig, StorePaths};
pub use wiener_hv_lib::{ChannelId, DeviceChannel, HvError, Parameter, VoltageSetting, WriteValue};

/// Every call the fake crate received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Enumerate(Parameter),
    Read(Parameter, ChannelId),
    Write(Parameter, ChannelId, WriteValue),
}

#[derive(Default)]
struct State {
    order: Vec<ChannelId>,
    values: HashMap<(Parameter, ChannelId), String>,
    scripted_reads: HashMap<(Parameter, ChannelId), VecDeque<String>>,
    failing_writes: HashSet<(Parameter, ChannelId)>,
    failing_reads: HashSet<(Parameter, ChannelId)>,
    failing_walks: HashSet<Parameter>,
    reversed_walks: HashSet<Parameter>,
    calls: Vec<Call>,
}

/// In-memory crate. Writes to `outputVoltage` update the stored setpoint.
pub struct FakeCrate {
    state: Mutex<State>,
}

impl FakeCrate {
    /// Build from `(channel, setpoint, sense voltage, current)` rows.
    pub fn new(rows: &[(&str, &str, &str, &str)]) -> Self {
        let mut state = State::default();
        for &(channel, setpoint, sense, current) in rows {
            let id = ChannelId::from(channel);
            state.order.push(id.clone());
            state.values.insert((Parameter::Name, id.clone()), format!("U{}", channel));
            state.values.insert((Parameter::TargetVoltage, id.clone()), setpoint.to_string());
            state.values.insert((Parameter::SenseVoltage, id.clone()), sense.to_string());
            state.values.insert((Parameter::Current, id.clone()), current.to_string());
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Successive single-channel reads of `parameter` return `values` in turn;
    /// the last value repeats once the script is exhausted.
    pub fn script_reads(self, parameter: Parameter, channel: &str, values: &[&str]) -> Self {
        self.state.lock().unwrap().scripted_reads.insert(
            (parameter, ChannelId::from(channel)),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn fail_write(self, parameter: Parameter, channel: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_writes
            .insert((parameter, ChannelId::from(channel)));
        self
    }

    pub fn fail_read(self, parameter: Parameter, channel: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_reads
            .insert((parameter, ChannelId::from(channel)));
        self
    }

    pub fn fail_walk(self, parameter: Parameter) -> Self {
        self.state.lock().unwrap().failing_walks.insert(parameter);
        self
    }

    /// Walks of `parameter` come back in reverse channel order.
    pub fn reverse_walk(self, parameter: Parameter) -> Self {
        self.state.lock().unwrap().reversed_walks.insert(parameter);
        self
    }

    pub fn set_value(&self, parameter: Parameter, channel: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert((parameter, ChannelId::from(channel)), value.to_string());
    }

    pub fn value(&self, parameter: Parameter, channel: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .values
            .get(&(parameter, ChannelId::from(channel)))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<(Parameter, ChannelId, WriteValue)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(parameter, channel, value) => Some((parameter, channel, value)),
                _ => None,
            })
            .collect()
    }

    pub fn read_count(&self, parameter: Parameter, channel: &str) -> usize {
        let channel = ChannelId::from(channel);
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Read(p, c) if *p == parameter && *c == channel))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

fn device_error(operation: String) -> HvError {
    HvError::DeviceCommunication {
        operation,
        message: "simulated failure".to_string(),
    }
}

#[async_trait]
impl DeviceChannel for FakeCrate {
    async fn enumerate(&self, parameter: Parameter) -> wiener_hv_lib::Result<Vec<(ChannelId, String)>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Enumerate(parameter));
        if state.failing_walks.contains(&parameter) {
            return Err(device_error(format!("walk {}", parameter)));
        }
        let mut objects: Vec<(ChannelId, String)> = state
            .order
            .iter()
            .filter_map(|channel| {
                state
                    .values
                    .get(&(parameter, channel.clone()))
                    .map(|value| (channel.clone(), value.clone()))
            })
            .collect();
        if state.reversed_walks.contains(&parameter) {
            objects.reverse();
        }
        Ok(objects)
    }

    async fn read(&self, parameter: Parameter, channel: &ChannelId) -> wiener_hv_lib::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Read(parameter, channel.clone()));
        let key = (parameter, channel.clone());
        if state.failing_reads.contains(&key) {
            return Err(device_error(format!("get {}", parameter.for_channel(channel))));
        }
        if let Some(script) = state.scripted_reads.get_mut(&key) {
            let value = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
            if let Some(value) = value {
                return Ok(value);
            }
        }
        state
            .values
            .get(&key)
            .cloned()
            .ok_or_else(|| device_error(format!("get {}", parameter.for_channel(channel))))
    }

    async fn write(&self, parameter: Parameter, channel: &ChannelId, value: WriteValue) -> wiener_hv_lib::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Write(parameter, channel.clone(), value.clone()));
        if state.failing_writes.contains(&(parameter, channel.clone())) {
            return Err(device_error(format!("set {}", parameter.for_channel(channel))));
        }
        state.values.insert((parameter, channel.clone()), value.to_string());
        Ok(())
    }
}

/// Three channels with the last one (`2`) as the watched channel during shutdown.
pub fn three_channel_crate() -> FakeCrate {
    FakeCrate::new(&[
        ("0", "1500", "1499.8", "0.0021"),
        ("1", "1200.5", "1200.1", "0.0017"),
        ("2", "900", "899.9", "0.0009"),
    ])
}

/// A config whose stores live in `dir` and whose poll loop is fast.
pub fn test_config(dir: &std::path::Path) -> HvConfig {
    HvConfig {
        stores: StorePaths::in_dir(dir),
        poll: PollConfig {
            interval: std::time::Duration::from_millis(1),
            ..PollConfig::default()
        },
        ..HvConfig::default()
    }
}
