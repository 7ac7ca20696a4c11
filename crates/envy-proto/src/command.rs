// ── Command rendering ──
//
// Builds outbound command lines byte-for-byte as the device expects them:
// `VERB ARG ARG ...`, single-space separated, arguments quoted only when
// they contain a space and are not already quoted. Line framing (CRLF) is
// the transport's job, not the builder's.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Menu names accepted by `OpenMenu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
pub enum MenuName {
    Info,
    Settings,
    Configuration,
    Profiles,
    TestPatterns,
}

/// Remote control buttons accepted by `KeyPress`/`KeyHold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RemoteButton {
    Power,
    Info,
    Menu,
    Left,
    Right,
    Up,
    Down,
    Ok,
    Input,
    Settings,
    Back,
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Cyan,
}

/// Aspect ratio modes accepted by `SetAspectRatioMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
pub enum AspectRatioMode {
    Auto,
    Hold,
    #[strum(serialize = "4:3")]
    Ratio4x3,
    #[strum(serialize = "16:9")]
    Ratio16x9,
    #[strum(serialize = "1.85:1")]
    Ratio185,
    #[strum(serialize = "2.00:1")]
    Ratio200,
    #[strum(serialize = "2.20:1")]
    Ratio220,
    #[strum(serialize = "2.35:1")]
    Ratio235,
    #[strum(serialize = "2.40:1")]
    Ratio240,
    #[strum(serialize = "2.55:1")]
    Ratio255,
    #[strum(serialize = "2.76:1")]
    Ratio276,
}

/// One command argument: text (quoted on demand) or a decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandArg {
    Text(String),
    Int(i64),
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CommandArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for CommandArg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

/// A value for `ChangeOption`. Booleans render as `YES`/`NO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

fn render_option_value(value: &OptionValue) -> CommandArg {
    match value {
        OptionValue::Text(text) => CommandArg::Text(text.clone()),
        OptionValue::Int(number) => CommandArg::Int(*number),
        OptionValue::Bool(true) => CommandArg::Text("YES".into()),
        OptionValue::Bool(false) => CommandArg::Text("NO".into()),
    }
}

/// Quote a command parameter only when required by protocol syntax.
pub fn quote_if_needed(value: &str) -> String {
    if value.contains(' ') && !(value.starts_with('"') && value.ends_with('"')) {
        format!("\"{value}\"")
    } else {
        value.to_owned()
    }
}

/// Build one protocol command line without its CRLF terminator.
pub fn build_command(command: &str, args: &[CommandArg]) -> String {
    let mut rendered = String::from(command);
    for arg in args {
        rendered.push(' ');
        match arg {
            CommandArg::Int(number) => rendered.push_str(&number.to_string()),
            CommandArg::Text(text) => rendered.push_str(&quote_if_needed(text)),
        }
    }
    rendered
}

pub fn heartbeat() -> String {
    build_command("Heartbeat", &[])
}

pub fn bye() -> String {
    build_command("Bye", &[])
}

pub fn power_off() -> String {
    build_command("PowerOff", &[])
}

pub fn standby() -> String {
    build_command("Standby", &[])
}

pub fn restart() -> String {
    build_command("Restart", &[])
}

pub fn reload_software() -> String {
    build_command("ReloadSoftware", &[])
}

pub fn open_menu(menu: &str) -> String {
    build_command("OpenMenu", &[menu.into()])
}

pub fn close_menu() -> String {
    build_command("CloseMenu", &[])
}

pub fn key_press(button: &str) -> String {
    build_command("KeyPress", &[button.into()])
}

pub fn key_hold(button: &str) -> String {
    build_command("KeyHold", &[button.into()])
}

pub fn display_alert_window(text: &str) -> String {
    build_command("DisplayAlertWindow", &[text.into()])
}

pub fn close_alert_window() -> String {
    build_command("CloseAlertWindow", &[])
}

pub fn display_message(timeout_seconds: i64, text: &str) -> String {
    build_command("DisplayMessage", &[timeout_seconds.into(), text.into()])
}

/// The unit description is always quoted, even when it has no spaces.
pub fn display_audio_volume(min: i64, current: i64, max: i64, unit: &str) -> String {
    let unit = if unit.starts_with('"') && unit.ends_with('"') {
        unit.to_owned()
    } else {
        format!("\"{unit}\"")
    };
    build_command("DisplayAudioVolume", &[min.into(), current.into(), max.into(), unit.into()])
}

pub fn display_audio_mute() -> String {
    build_command("DisplayAudioMute", &[])
}

pub fn close_audio_mute() -> String {
    build_command("CloseAudioMute", &[])
}

pub fn set_aspect_ratio_mode(mode: &str) -> String {
    build_command("SetAspectRatioMode", &[mode.into()])
}

pub fn get_incoming_signal_info() -> String {
    build_command("GetIncomingSignalInfo", &[])
}

pub fn get_outgoing_signal_info() -> String {
    build_command("GetOutgoingSignalInfo", &[])
}

pub fn get_aspect_ratio() -> String {
    build_command("GetAspectRatio", &[])
}

pub fn get_masking_ratio() -> String {
    build_command("GetMaskingRatio", &[])
}

pub fn get_temperatures() -> String {
    build_command("GetTemperatures", &[])
}

pub fn get_mac_address() -> String {
    build_command("GetMacAddress", &[])
}

pub fn create_profile_group(name: &str) -> String {
    build_command("CreateProfileGroup", &[name.into()])
}

pub fn rename_profile_group(group_id: &str, name: &str) -> String {
    build_command("RenameProfileGroup", &[group_id.into(), name.into()])
}

pub fn delete_profile_group(group_id: &str) -> String {
    build_command("DeleteProfileGroup", &[group_id.into()])
}

pub fn enum_profile_groups() -> String {
    build_command("EnumProfileGroups", &[])
}

pub fn create_profile(profile_group: &str, name: &str) -> String {
    build_command("CreateProfile", &[profile_group.into(), name.into()])
}

pub fn rename_profile(profile_group: &str, profile_index: i64, name: &str) -> String {
    build_command("RenameProfile", &[profile_group.into(), profile_index.into(), name.into()])
}

pub fn delete_profile(profile_group: &str, profile_index: i64) -> String {
    build_command("DeleteProfile", &[profile_group.into(), profile_index.into()])
}

pub fn add_profile_to_page(full_profile_id: &str, page_id: &str) -> String {
    build_command("AddProfileToPage", &[full_profile_id.into(), page_id.into()])
}

pub fn remove_profile_from_page(full_profile_id: &str, page_id: &str) -> String {
    build_command("RemoveProfileFromPage", &[full_profile_id.into(), page_id.into()])
}

pub fn activate_profile(profile_group: &str, profile_index: i64) -> String {
    build_command("ActivateProfile", &[profile_group.into(), profile_index.into()])
}

pub fn get_active_profile(profile_group: &str) -> String {
    build_command("GetActiveProfile", &[profile_group.into()])
}

pub fn enum_profiles(profile_group: &str) -> String {
    build_command("EnumProfiles", &[profile_group.into()])
}

pub fn enum_setting_pages() -> String {
    build_command("EnumSettingPages", &[])
}

pub fn enum_config_pages() -> String {
    build_command("EnumConfigPages", &[])
}

pub fn enum_options(page_or_path: &str) -> String {
    build_command("EnumOptions", &[page_or_path.into()])
}

pub fn query_option(option_id_or_path: &str) -> String {
    build_command("QueryOption", &[option_id_or_path.into()])
}

pub fn change_option(option_id_path: &str, value: impl Into<OptionValue>) -> String {
    build_command("ChangeOption", &[option_id_path.into(), render_option_value(&value.into())])
}

pub fn toggle_option(option_name: &str) -> String {
    build_command("Toggle", &[option_name.into()])
}

pub fn tone_map_on() -> String {
    build_command("ToneMapOn", &[])
}

pub fn tone_map_off() -> String {
    build_command("ToneMapOff", &[])
}

pub fn hotplug() -> String {
    build_command("Hotplug", &[])
}

pub fn refresh_license_info() -> String {
    build_command("RefreshLicenseInfo", &[])
}

pub fn force_1080p60_output() -> String {
    build_command("Force1080p60Output", &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_space_bearing_unquoted_text() {
        assert_eq!(quote_if_needed("plain"), "plain");
        assert_eq!(quote_if_needed("two words"), "\"two words\"");
        assert_eq!(quote_if_needed("\"already quoted\""), "\"already quoted\"");
    }

    #[test]
    fn renders_documented_command_lines() {
        assert_eq!(display_message(3, "Hello world"), "DisplayMessage 3 \"Hello world\"");
        assert_eq!(change_option(r"temporary\hdrNits", 121), r"ChangeOption temporary\hdrNits 121");
        assert_eq!(toggle_option("ToneMap"), "Toggle ToneMap");
        assert_eq!(open_menu(MenuName::Settings.as_ref()), "OpenMenu Settings");
        assert_eq!(key_press(RemoteButton::Menu.as_ref()), "KeyPress MENU");
        assert_eq!(activate_profile("SOURCE", 2), "ActivateProfile SOURCE 2");
        assert_eq!(enum_profiles("displayProfiles"), "EnumProfiles displayProfiles");
    }

    #[test]
    fn booleans_render_as_yes_no() {
        assert_eq!(change_option("path", true), "ChangeOption path YES");
        assert_eq!(change_option("path", false), "ChangeOption path NO");
    }

    #[test]
    fn audio_volume_unit_is_always_quoted() {
        assert_eq!(display_audio_volume(0, 45, 100, "dB"), "DisplayAudioVolume 0 45 100 \"dB\"");
        assert_eq!(
            display_audio_volume(0, 45, 100, "\"dB\""),
            "DisplayAudioVolume 0 45 100 \"dB\""
        );
    }

    #[test]
    fn protocol_token_spellings_are_stable() {
        assert_eq!(RemoteButton::Power.as_ref(), "POWER");
        assert_eq!(RemoteButton::Magenta.as_ref(), "MAGENTA");
        assert_eq!(MenuName::TestPatterns.as_ref(), "TestPatterns");
        assert_eq!(AspectRatioMode::Auto.as_ref(), "Auto");
        assert_eq!(AspectRatioMode::Ratio235.as_ref(), "2.35:1");
    }
}
