// ── Canonical device state ──
//
// A single mutable projection of everything observed on the current
// connection, updated by folding each inbound message. The supervisor owns
// it exclusively; only the listen loop calls `apply`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use envy_proto::{
    AspectRatioInfo, ChangeOption, IncomingSignalInfo, InheritOption, MaskingRatioInfo, Message,
    OptionItem, OutgoingSignalInfo, Temperatures,
};

/// How a remote button event arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonKind {
    Press,
    Hold,
}

/// Canonical runtime state of one Envy connection.
///
/// All values are per-connection: `reset_runtime_values` restores everything
/// (counters included) to initial on every connect and disconnect.
///
/// Note on `profiles` keys: enumerated `Profile` items key by the
/// device-supplied `profile_id` verbatim, while `CreateProfile` /
/// `RenameProfile` / `DeleteProfile` notifications synthesize
/// `"{group}_{index}"`. The device has been observed using both spellings;
/// the two key spaces are deliberately not unified here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvyState {
    pub version: Option<String>,
    pub is_on: Option<bool>,
    pub standby: Option<bool>,
    pub mac_address: Option<String>,

    pub active_profile_group: Option<String>,
    pub active_profile_index: Option<i64>,

    pub incoming_signal: Option<IncomingSignalInfo>,
    pub outgoing_signal: Option<OutgoingSignalInfo>,
    pub aspect_ratio: Option<AspectRatioInfo>,
    pub masking_ratio: Option<MaskingRatioInfo>,
    pub temperatures: Option<Temperatures>,
    pub signal_present: Option<bool>,
    pub current_menu: Option<String>,
    pub aspect_ratio_mode: Option<String>,
    pub last_button_event: Option<(ButtonKind, String)>,
    pub settings_pages: BTreeMap<String, String>,
    pub config_pages: BTreeMap<String, String>,
    pub profile_groups: BTreeMap<String, String>,
    pub profiles: BTreeMap<String, String>,
    pub options: BTreeMap<String, OptionItem>,
    pub tone_map_enabled: Option<bool>,

    pub last_option_change: Option<ChangeOption>,
    pub last_inherit_option: Option<InheritOption>,
    pub last_uploaded_3dlut: Option<String>,
    pub last_renamed_3dlut: Option<(String, String)>,
    pub last_deleted_3dlut: Option<String>,
    pub settings_upload_count: u64,
    pub last_store_settings: Option<(String, String)>,
    pub last_restore_settings: Option<String>,
    pub temporary_reset_count: u64,
    pub display_changed_count: u64,
    pub firmware_update_pending: bool,
    pub last_missing_heartbeat: bool,
    pub last_system_action: Option<String>,

    seen_welcome: bool,
}

impl EnvyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `Welcome` has been observed on the current connection.
    pub fn synced(&self) -> bool {
        self.seen_welcome
    }

    /// Restore every runtime value (counters included) to initial.
    pub fn reset_runtime_values(&mut self) {
        *self = Self::default();
    }

    /// Fold one inbound message into the state.
    ///
    /// Messages with no state effect (`Ok`, `Error`, enumeration end
    /// markers, `Unknown`) are no-ops.
    pub fn apply(&mut self, message: &Message) {
        match message {
            Message::Welcome { version } => {
                self.version = Some(version.clone());
                self.seen_welcome = true;
                self.is_on = Some(true);
                self.standby = Some(false);
            }
            Message::Standby => {
                self.is_on = Some(false);
                self.standby = Some(true);
            }
            Message::PowerOff => {
                self.is_on = Some(false);
                self.standby = Some(false);
            }
            Message::Restart => self.last_system_action = Some("Restart".into()),
            Message::ReloadSoftware => self.last_system_action = Some("ReloadSoftware".into()),
            Message::NoSignal => self.signal_present = Some(false),
            Message::OpenMenu { menu } => self.current_menu = Some(menu.clone()),
            Message::CloseMenu => self.current_menu = None,
            Message::KeyPress { button } => {
                self.last_button_event = Some((ButtonKind::Press, button.clone()));
            }
            Message::KeyHold { button } => {
                self.last_button_event = Some((ButtonKind::Hold, button.clone()));
            }
            Message::SetAspectRatioMode { mode } => self.aspect_ratio_mode = Some(mode.clone()),
            Message::MacAddress { mac } => self.mac_address = Some(mac.clone()),
            Message::Temperatures(temperatures) => {
                self.temperatures = Some(temperatures.clone());
            }
            Message::IncomingSignalInfo(info) => {
                self.incoming_signal = Some(info.clone());
                self.signal_present = Some(true);
            }
            Message::OutgoingSignalInfo(info) => self.outgoing_signal = Some(info.clone()),
            Message::AspectRatio(info) => self.aspect_ratio = Some(info.clone()),
            Message::MaskingRatio(info) => self.masking_ratio = Some(info.clone()),
            Message::ActiveProfile { profile_group, profile_index }
            | Message::ActivateProfile { profile_group, profile_index } => {
                self.active_profile_group = Some(profile_group.clone());
                self.active_profile_index = Some(*profile_index);
            }
            Message::CreateProfileGroup { group_id, name }
            | Message::RenameProfileGroup { group_id, name } => {
                self.profile_groups.insert(group_id.clone(), name.clone());
            }
            Message::ProfileGroup(item) => {
                self.profile_groups.insert(item.group_id.clone(), item.name.clone());
            }
            Message::DeleteProfileGroup { group_id } => {
                self.profile_groups.remove(group_id);
            }
            Message::Profile(item) => {
                self.profiles.insert(item.profile_id.clone(), item.name.clone());
            }
            Message::CreateProfile { profile_group, profile_index, name }
            | Message::RenameProfile { profile_group, profile_index, name } => {
                self.profiles.insert(format!("{profile_group}_{profile_index}"), name.clone());
            }
            Message::DeleteProfile { profile_group, profile_index } => {
                self.profiles.remove(&format!("{profile_group}_{profile_index}"));
            }
            Message::SettingPage(item) => {
                self.settings_pages.insert(item.page_id.clone(), item.name.clone());
            }
            Message::ConfigPage(item) => {
                self.config_pages.insert(item.page_id.clone(), item.name.clone());
            }
            Message::Option(item) => {
                self.options.insert(item.option_id.clone(), item.clone());
            }
            Message::ChangeOption(change) => {
                self.last_option_change = Some(change.clone());
                self.options.insert(
                    change.option_id_path.clone(),
                    OptionItem {
                        option_type: change.option_type.clone(),
                        option_id: change.option_id_path.clone(),
                        current_value: change.current_value.clone(),
                        effective_value: change.effective_value.clone(),
                    },
                );
            }
            Message::InheritOption(inherit) => self.last_inherit_option = Some(inherit.clone()),
            Message::ResetTemporary => self.temporary_reset_count += 1,
            Message::Upload3DLutFile { filename } => {
                self.last_uploaded_3dlut = Some(filename.clone());
            }
            Message::Rename3DLutFile { old_filename, new_filename } => {
                self.last_renamed_3dlut = Some((old_filename.clone(), new_filename.clone()));
            }
            Message::Delete3DLutFile { filename } => {
                self.last_deleted_3dlut = Some(filename.clone());
            }
            Message::UploadSettingsFile => self.settings_upload_count += 1,
            Message::StoreSettings { target, storage_name } => {
                self.last_store_settings = Some((target.clone(), storage_name.clone()));
            }
            Message::RestoreSettings { target } => {
                self.last_restore_settings = Some(target.clone());
            }
            Message::Toggle { option } => {
                self.last_system_action = Some(format!("Toggle:{option}"));
            }
            Message::ToneMapOn => self.tone_map_enabled = Some(true),
            Message::ToneMapOff => self.tone_map_enabled = Some(false),
            Message::DisplayChanged => self.display_changed_count += 1,
            Message::RefreshLicenseInfo => {
                self.last_system_action = Some("RefreshLicenseInfo".into());
            }
            Message::Force1080p60Output => {
                self.last_system_action = Some("Force1080p60Output".into());
            }
            Message::Hotplug => self.last_system_action = Some("Hotplug".into()),
            Message::FirmwareUpdate => self.firmware_update_pending = true,
            Message::MissingHeartbeat => self.last_missing_heartbeat = true,
            Message::AddProfileToPage { .. } => {
                self.last_system_action = Some("AddProfileToPage".into());
            }
            Message::RemoveProfileFromPage { .. } => {
                self.last_system_action = Some("RemoveProfileFromPage".into());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use envy_proto::{OptionScalar, parse_message};

    use super::*;

    fn apply_line(state: &mut EnvyState, line: &str) {
        state.apply(&parse_message(line));
    }

    #[test]
    fn welcome_establishes_sync_and_power_state() {
        let mut state = EnvyState::new();
        assert!(!state.synced());

        apply_line(&mut state, "WELCOME to Envy v1.1.3");
        assert!(state.synced());
        assert_eq!(state.version.as_deref(), Some("1.1.3"));
        assert_eq!(state.is_on, Some(true));
        assert_eq!(state.standby, Some(false));

        apply_line(&mut state, "Standby");
        assert_eq!(state.is_on, Some(false));
        assert_eq!(state.standby, Some(true));

        apply_line(&mut state, "PowerOff");
        assert_eq!(state.is_on, Some(false));
        assert_eq!(state.standby, Some(false));
    }

    #[test]
    fn signal_and_profile_updates() {
        let mut state = EnvyState::new();

        apply_line(
            &mut state,
            "IncomingSignalInfo 3840x2160 23.976p 2D 422 10bit HDR10 2020 TV 16:9",
        );
        assert_eq!(state.signal_present, Some(true));
        assert!(state.incoming_signal.is_some());

        apply_line(&mut state, "NoSignal");
        assert_eq!(state.signal_present, Some(false));

        apply_line(&mut state, "ActiveProfile SOURCE 2");
        assert_eq!(state.active_profile_group.as_deref(), Some("SOURCE"));
        assert_eq!(state.active_profile_index, Some(2));

        apply_line(&mut state, r#"AspectRatio 3840:1600 2.400 240 "Panavision 70""#);
        assert_eq!(
            state.aspect_ratio.as_ref().map(|a| a.name.as_str()),
            Some("Panavision 70")
        );
    }

    #[test]
    fn mapping_upserts_and_profile_key_synthesis() {
        let mut state = EnvyState::new();

        apply_line(&mut state, r#"ProfileGroup customProfileGroup1 "Ambient Light""#);
        apply_line(&mut state, r#"Profile sourceProfiles_profile2 "Panasonic""#);
        apply_line(&mut state, r#"CreateProfile displayProfiles 2 "Night Mode""#);
        assert_eq!(state.profile_groups.get("customProfileGroup1").map(String::as_str), Some("Ambient Light"));
        assert_eq!(state.profiles.get("sourceProfiles_profile2").map(String::as_str), Some("Panasonic"));
        assert_eq!(state.profiles.get("displayProfiles_2").map(String::as_str), Some("Night Mode"));

        apply_line(&mut state, "DeleteProfile displayProfiles 2");
        assert!(!state.profiles.contains_key("displayProfiles_2"));
        assert!(state.profiles.contains_key("sourceProfiles_profile2"));

        apply_line(&mut state, "DeleteProfileGroup customProfileGroup1");
        assert!(state.profile_groups.is_empty());
    }

    #[test]
    fn options_and_activity_traces() {
        let mut state = EnvyState::new();

        apply_line(&mut state, "Option INTEGER hdrHighlightRecovery 2 3");
        assert_eq!(
            state.options.get("hdrHighlightRecovery").map(|o| o.effective_value.clone()),
            Some(OptionScalar::Int(3))
        );

        apply_line(&mut state, r"ChangeOption INTEGER temporary\hdrNits 121 121");
        assert!(state.last_option_change.is_some());
        assert_eq!(
            state.options.get(r"temporary\hdrNits").map(|o| o.current_value.clone()),
            Some(OptionScalar::Int(121))
        );

        apply_line(&mut state, "OpenMenu Settings");
        assert_eq!(state.current_menu.as_deref(), Some("Settings"));
        apply_line(&mut state, "CloseMenu");
        assert_eq!(state.current_menu, None);

        apply_line(&mut state, "KeyPress MENU");
        assert_eq!(state.last_button_event, Some((ButtonKind::Press, "MENU".into())));

        apply_line(&mut state, "ToneMapOn");
        assert_eq!(state.tone_map_enabled, Some(true));

        apply_line(&mut state, r#"Upload3DLUTFile "BT.2020.3dlut""#);
        assert_eq!(state.last_uploaded_3dlut.as_deref(), Some("BT.2020.3dlut"));

        apply_line(&mut state, r#"Rename3DLUTFile "BT.2020.3dlut" "BT.2021.3dlut""#);
        assert_eq!(
            state.last_renamed_3dlut,
            Some(("BT.2020.3dlut".into(), "BT.2021.3dlut".into()))
        );

        apply_line(&mut state, r#"StoreSettings Installer "Installer Settings""#);
        assert_eq!(
            state.last_store_settings,
            Some(("Installer".into(), "Installer Settings".into()))
        );

        apply_line(&mut state, "Hotplug");
        assert_eq!(state.last_system_action.as_deref(), Some("Hotplug"));
        apply_line(&mut state, "Toggle ToneMap");
        assert_eq!(state.last_system_action.as_deref(), Some("Toggle:ToneMap"));
    }

    #[test]
    fn counters_and_flags() {
        let mut state = EnvyState::new();

        apply_line(&mut state, "ResetTemporary");
        apply_line(&mut state, "ResetTemporary");
        apply_line(&mut state, "DisplayChanged");
        apply_line(&mut state, "UploadSettingsFile");
        apply_line(&mut state, "FirmwareUpdate");
        apply_line(&mut state, "MissingHeartbeat");

        assert_eq!(state.temporary_reset_count, 2);
        assert_eq!(state.display_changed_count, 1);
        assert_eq!(state.settings_upload_count, 1);
        assert!(state.firmware_update_pending);
        assert!(state.last_missing_heartbeat);
    }

    #[test]
    fn reset_restores_every_runtime_value() {
        let mut state = EnvyState::new();
        apply_line(&mut state, "WELCOME to Envy v1.1.3");
        apply_line(&mut state, "MacAddress 01-02-03-04-05-06");
        apply_line(&mut state, "ResetTemporary");
        apply_line(&mut state, r#"SettingPage hdrSettings "HDR Settings""#);

        state.reset_runtime_values();
        assert_eq!(state, EnvyState::new());
        assert!(!state.synced());
        assert_eq!(state.temporary_reset_count, 0);
    }

    #[test]
    fn acks_and_unknown_lines_do_not_touch_state() {
        let mut state = EnvyState::new();
        let before = state.clone();
        apply_line(&mut state, "OK");
        apply_line(&mut state, r#"ERROR "invalid command""#);
        apply_line(&mut state, "SomeFutureVerb 1 2 3");
        apply_line(&mut state, "ProfileGroup.");
        assert_eq!(state, before);
    }
}
