// ── Snapshot / delta / event projection ──
//
// Integration hosts poll a coordinator-style view: an immutable snapshot
// plus "what changed since last time". The adapter is a pure function over
// state; the supervisor-side registration wrapper (client.rs) adds the
// initial-emission seed and the suppress-empty rule.

use serde::Serialize;
use serde_json::{Value, json};

use envy_proto::OptionScalar;

use crate::state::{ButtonKind, EnvyState};

/// Immutable, comparison-friendly view of [`EnvyState`].
///
/// Mappings flatten to key-sorted pair sequences, nested records to
/// fixed-arity rows, so two snapshots compare with plain equality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvySnapshot {
    pub synced: bool,
    pub version: Option<String>,
    pub is_on: Option<bool>,
    pub standby: Option<bool>,
    pub signal_present: Option<bool>,
    pub mac_address: Option<String>,
    pub active_profile_group: Option<String>,
    pub active_profile_index: Option<i64>,
    pub current_menu: Option<String>,
    pub aspect_ratio_mode: Option<String>,
    pub incoming_signal: Option<[String; 9]>,
    pub outgoing_signal: Option<[String; 8]>,
    pub aspect_ratio: Option<(String, f64, i64, String)>,
    pub masking_ratio: Option<(String, f64, i64)>,
    pub tone_map_enabled: Option<bool>,
    pub temperatures: Option<[i64; 4]>,

    pub settings_pages: Vec<(String, String)>,
    pub config_pages: Vec<(String, String)>,
    pub profile_groups: Vec<(String, String)>,
    pub profiles: Vec<(String, String)>,
    pub options: Vec<(String, String, OptionScalar, OptionScalar)>,

    pub last_system_action: Option<String>,
    pub last_button_event: Option<(ButtonKind, String)>,
    pub last_inherit_option_path: Option<String>,
    pub last_inherit_option_effective: Option<OptionScalar>,

    pub last_uploaded_3dlut: Option<String>,
    pub last_renamed_3dlut: Option<(String, String)>,
    pub last_deleted_3dlut: Option<String>,
    pub last_store_settings: Option<(String, String)>,
    pub last_restore_settings: Option<String>,

    pub temporary_reset_count: u64,
    pub display_changed_count: u64,
    pub settings_upload_count: u64,
}

/// One changed field between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDelta {
    pub field: &'static str,
    pub old: Value,
    pub new: Value,
}

/// High-level semantic event derived from a snapshot pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterEvent {
    pub kind: &'static str,
    pub payload: Value,
}

/// Build an immutable snapshot from runtime state.
pub fn snapshot_from_state(state: &EnvyState) -> EnvySnapshot {
    let incoming_signal = state.incoming_signal.as_ref().map(|signal| {
        [
            signal.resolution.clone(),
            signal.frame_rate.clone(),
            signal.signal_type.clone(),
            signal.color_space.clone(),
            signal.bit_depth.clone(),
            signal.hdr_mode.clone(),
            signal.colorimetry.clone(),
            signal.black_levels.clone(),
            signal.aspect_ratio.clone(),
        ]
    });
    let outgoing_signal = state.outgoing_signal.as_ref().map(|signal| {
        [
            signal.resolution.clone(),
            signal.frame_rate.clone(),
            signal.signal_type.clone(),
            signal.color_space.clone(),
            signal.bit_depth.clone(),
            signal.hdr_mode.clone(),
            signal.colorimetry.clone(),
            signal.black_levels.clone(),
        ]
    });
    let aspect_ratio = state.aspect_ratio.as_ref().map(|ratio| {
        (ratio.resolution.clone(), ratio.decimal_ratio, ratio.integer_ratio, ratio.name.clone())
    });
    let masking_ratio = state
        .masking_ratio
        .as_ref()
        .map(|ratio| (ratio.resolution.clone(), ratio.decimal_ratio, ratio.integer_ratio));
    let temperatures = state
        .temperatures
        .as_ref()
        .map(|temps| [temps.gpu, temps.hdmi_input, temps.cpu, temps.mainboard]);

    let options = state
        .options
        .iter()
        .map(|(id, option)| {
            (
                id.clone(),
                option.option_type.clone(),
                option.current_value.clone(),
                option.effective_value.clone(),
            )
        })
        .collect();

    EnvySnapshot {
        synced: state.synced(),
        version: state.version.clone(),
        is_on: state.is_on,
        standby: state.standby,
        signal_present: state.signal_present,
        mac_address: state.mac_address.clone(),
        active_profile_group: state.active_profile_group.clone(),
        active_profile_index: state.active_profile_index,
        current_menu: state.current_menu.clone(),
        aspect_ratio_mode: state.aspect_ratio_mode.clone(),
        incoming_signal,
        outgoing_signal,
        aspect_ratio,
        masking_ratio,
        tone_map_enabled: state.tone_map_enabled,
        temperatures,
        settings_pages: pairs(&state.settings_pages),
        config_pages: pairs(&state.config_pages),
        profile_groups: pairs(&state.profile_groups),
        profiles: pairs(&state.profiles),
        options,
        last_system_action: state.last_system_action.clone(),
        last_button_event: state.last_button_event.clone(),
        last_inherit_option_path: state
            .last_inherit_option
            .as_ref()
            .map(|inherit| inherit.option_id_path.clone()),
        last_inherit_option_effective: state
            .last_inherit_option
            .as_ref()
            .map(|inherit| inherit.effective_value.clone()),
        last_uploaded_3dlut: state.last_uploaded_3dlut.clone(),
        last_renamed_3dlut: state.last_renamed_3dlut.clone(),
        last_deleted_3dlut: state.last_deleted_3dlut.clone(),
        last_store_settings: state.last_store_settings.clone(),
        last_restore_settings: state.last_restore_settings.clone(),
        temporary_reset_count: state.temporary_reset_count,
        display_changed_count: state.display_changed_count,
        settings_upload_count: state.settings_upload_count,
    }
}

fn pairs(map: &std::collections::BTreeMap<String, String>) -> Vec<(String, String)> {
    map.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
}

/// Track snapshots and expose stable deltas/events for coordinators.
#[derive(Debug, Default)]
pub struct EnvyStateAdapter {
    last_snapshot: Option<EnvySnapshot>,
}

impl EnvyStateAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot retained from the previous `update`, if any.
    pub fn last_snapshot(&self) -> Option<&EnvySnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Project `state` and report what changed since the previous call.
    ///
    /// The first call retains the snapshot and reports no deltas or events.
    pub fn update(&mut self, state: &EnvyState) -> (EnvySnapshot, Vec<StateDelta>, Vec<AdapterEvent>) {
        let snapshot = snapshot_from_state(state);
        let previous = self.last_snapshot.replace(snapshot.clone());

        let Some(previous) = previous else {
            return (snapshot, Vec::new(), Vec::new());
        };

        let deltas = build_deltas(&previous, &snapshot);
        let events = build_events(&previous, &snapshot);
        (snapshot, deltas, events)
    }
}

fn to_json(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn build_deltas(previous: &EnvySnapshot, current: &EnvySnapshot) -> Vec<StateDelta> {
    macro_rules! diff_fields {
        ($($field:ident),* $(,)?) => {{
            let mut deltas = Vec::new();
            $(
                if previous.$field != current.$field {
                    deltas.push(StateDelta {
                        field: stringify!($field),
                        old: to_json(&previous.$field),
                        new: to_json(&current.$field),
                    });
                }
            )*
            deltas
        }};
    }

    diff_fields!(
        synced,
        version,
        is_on,
        standby,
        signal_present,
        mac_address,
        active_profile_group,
        active_profile_index,
        current_menu,
        aspect_ratio_mode,
        incoming_signal,
        outgoing_signal,
        aspect_ratio,
        masking_ratio,
        tone_map_enabled,
        temperatures,
        settings_pages,
        config_pages,
        profile_groups,
        profiles,
        options,
        last_system_action,
        last_button_event,
        last_inherit_option_path,
        last_inherit_option_effective,
        last_uploaded_3dlut,
        last_renamed_3dlut,
        last_deleted_3dlut,
        last_store_settings,
        last_restore_settings,
        temporary_reset_count,
        display_changed_count,
        settings_upload_count,
    )
}

/// Fires only on a strict increase -- never on reset to zero or decrease.
fn counter_event(kind: &'static str, old: u64, new: u64) -> Option<AdapterEvent> {
    (new > old).then(|| AdapterEvent {
        kind,
        payload: json!({ "count": new, "increment": new - old }),
    })
}

/// Fires only when the new value is non-null and differs from the old.
fn change_event<T: Serialize + PartialEq>(
    kind: &'static str,
    old: Option<&T>,
    new: Option<&T>,
    payload_key: &str,
) -> Option<AdapterEvent> {
    match new {
        Some(value) if old != new => {
            Some(AdapterEvent { kind, payload: json!({ payload_key: to_json(value) }) })
        }
        _ => None,
    }
}

fn build_events(previous: &EnvySnapshot, current: &EnvySnapshot) -> Vec<AdapterEvent> {
    [
        counter_event(
            "temporary_reset",
            previous.temporary_reset_count,
            current.temporary_reset_count,
        ),
        counter_event(
            "display_changed",
            previous.display_changed_count,
            current.display_changed_count,
        ),
        counter_event(
            "settings_uploaded",
            previous.settings_upload_count,
            current.settings_upload_count,
        ),
        change_event(
            "system_action",
            previous.last_system_action.as_ref(),
            current.last_system_action.as_ref(),
            "action",
        ),
        change_event(
            "button",
            previous.last_button_event.as_ref(),
            current.last_button_event.as_ref(),
            "button",
        ),
        change_event(
            "option_inherited",
            previous.last_inherit_option_path.as_ref(),
            current.last_inherit_option_path.as_ref(),
            "path",
        ),
        change_event(
            "lut_uploaded",
            previous.last_uploaded_3dlut.as_ref(),
            current.last_uploaded_3dlut.as_ref(),
            "filename",
        ),
        change_event(
            "lut_renamed",
            previous.last_renamed_3dlut.as_ref(),
            current.last_renamed_3dlut.as_ref(),
            "rename",
        ),
        change_event(
            "lut_deleted",
            previous.last_deleted_3dlut.as_ref(),
            current.last_deleted_3dlut.as_ref(),
            "filename",
        ),
        change_event(
            "settings_stored",
            previous.last_store_settings.as_ref(),
            current.last_store_settings.as_ref(),
            "store",
        ),
        change_event(
            "settings_restored",
            previous.last_restore_settings.as_ref(),
            current.last_restore_settings.as_ref(),
            "target",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use envy_proto::parse_message;
    use pretty_assertions::assert_eq;

    use super::*;

    fn base_state() -> EnvyState {
        let mut state = EnvyState::new();
        state.apply(&parse_message("WELCOME to Envy v1.1.3"));
        state
    }

    #[test]
    fn snapshot_projects_scalars_and_sorted_mappings() {
        let mut state = base_state();
        state.apply(&parse_message(
            "IncomingSignalInfo 3840x2160 23.976p 2D 422 10bit HDR10 2020 TV 16:9",
        ));
        state.apply(&parse_message(r#"SettingPage zPage "Last""#));
        state.apply(&parse_message(r#"SettingPage aPage "First""#));

        let snapshot = snapshot_from_state(&state);
        assert!(snapshot.synced);
        assert_eq!(snapshot.version.as_deref(), Some("1.1.3"));
        assert_eq!(snapshot.signal_present, Some(true));
        assert_eq!(snapshot.temperatures, None);
        assert!(snapshot.options.is_empty());
        assert_eq!(
            snapshot.settings_pages,
            vec![("aPage".into(), "First".into()), ("zPage".into(), "Last".into())]
        );
        assert_eq!(
            snapshot.incoming_signal.as_ref().map(|signal| signal[5].as_str()),
            Some("HDR10")
        );
    }

    #[test]
    fn equal_snapshots_produce_no_deltas() {
        let state = base_state();
        let mut adapter = EnvyStateAdapter::new();

        let (first, deltas, events) = adapter.update(&state);
        assert!(first.synced);
        assert!(deltas.is_empty());
        assert!(events.is_empty());

        let (_, deltas, events) = adapter.update(&state);
        assert!(deltas.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn deltas_and_events_track_changes() {
        let mut adapter = EnvyStateAdapter::new();
        let mut state = base_state();
        adapter.update(&state);

        state.apply(&parse_message("KeyPress MENU"));
        state.apply(&parse_message("ChangeOption INTEGER hdrNits 120 121"));
        state.apply(&parse_message("ResetTemporary"));
        state.apply(&parse_message("DisplayChanged"));
        state.apply(&parse_message("ToneMapOn"));
        state.apply(&parse_message(r#"StoreSettings Installer "Installer Settings""#));

        let (_, deltas, events) = adapter.update(&state);
        let changed: Vec<&str> = deltas.iter().map(|delta| delta.field).collect();
        let kinds: Vec<&str> = events.iter().map(|event| event.kind).collect();

        for field in [
            "last_button_event",
            "options",
            "temporary_reset_count",
            "display_changed_count",
            "tone_map_enabled",
            "last_store_settings",
        ] {
            assert!(changed.contains(&field), "missing delta for {field}: {changed:?}");
        }
        for kind in ["button", "temporary_reset", "display_changed", "settings_stored"] {
            assert!(kinds.contains(&kind), "missing event {kind}: {kinds:?}");
        }
    }

    #[test]
    fn counter_events_carry_count_and_increment() {
        let mut adapter = EnvyStateAdapter::new();
        let mut state = base_state();
        state.apply(&parse_message("ResetTemporary"));
        adapter.update(&state);

        state.apply(&parse_message("ResetTemporary"));
        state.apply(&parse_message("ResetTemporary"));
        let (_, _, events) = adapter.update(&state);

        let reset = events
            .iter()
            .find(|event| event.kind == "temporary_reset")
            .expect("temporary_reset event");
        assert_eq!(reset.payload, json!({ "count": 3, "increment": 2 }));
    }

    #[test]
    fn counter_reset_to_zero_fires_no_event() {
        let mut adapter = EnvyStateAdapter::new();
        let mut state = base_state();
        state.apply(&parse_message("ResetTemporary"));
        adapter.update(&state);

        // Reconnect resets runtime values; the count drops back to zero.
        state.reset_runtime_values();
        let (_, deltas, events) = adapter.update(&state);

        assert!(deltas.iter().any(|delta| delta.field == "temporary_reset_count"));
        assert!(events.iter().all(|event| event.kind != "temporary_reset"));
    }

    #[test]
    fn change_event_requires_non_null_new_value() {
        let mut adapter = EnvyStateAdapter::new();
        let mut state = base_state();
        state.apply(&parse_message("Hotplug"));
        adapter.update(&state);

        state.reset_runtime_values();
        let (_, _, events) = adapter.update(&state);
        assert!(events.iter().all(|event| event.kind != "system_action"));
    }

    #[test]
    fn inherit_option_projects_path_and_effective_value() {
        let mut adapter = EnvyStateAdapter::new();
        let mut state = base_state();
        adapter.update(&state);

        state.apply(&parse_message(r"InheritOption INTEGER temporary\hdrNits 120"));
        let (snapshot, _, events) = adapter.update(&state);

        assert_eq!(snapshot.last_inherit_option_path.as_deref(), Some(r"temporary\hdrNits"));
        assert_eq!(snapshot.last_inherit_option_effective, Some(OptionScalar::Int(120)));
        let inherited = events
            .iter()
            .find(|event| event.kind == "option_inherited")
            .expect("option_inherited event");
        assert_eq!(inherited.payload, json!({ "path": r"temporary\hdrNits" }));
    }
}
