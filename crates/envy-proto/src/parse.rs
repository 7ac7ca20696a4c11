// ── Line parser ──
//
// Tokenization: a line splits into double-quoted runs (quotes retained in
// the token) and whitespace-delimited runs. No escape processing exists in
// the protocol. The first token selects a shape parser; any arity or numeric
// failure degrades to `Message::Unknown` -- the parser never errors.

use std::sync::LazyLock;

use regex::Regex;

use crate::message::{
    AspectRatioInfo, ChangeOption, ConfigPageItem, IncomingSignalInfo, InheritOption,
    MaskingRatioInfo, Message, OptionItem, OptionScalar, OutgoingSignalInfo, ProfileGroupItem,
    ProfileItem, SettingPageItem, Temperatures,
};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|\S+"#).expect("token pattern is valid"));
static WELCOME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^WELCOME to Envy v(\S+)$").expect("welcome pattern is valid"));
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^ERROR\s+"?(.*?)"?$"#).expect("error pattern is valid"));
static MAC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f:-]{17}$").expect("mac pattern is valid"));

/// Parse one line from the Envy stream.
///
/// Total: every input maps to some [`Message`], with anything unrecognized
/// preserved verbatim in [`Message::Unknown`].
pub fn parse_message(line: &str) -> Message {
    let normalized = line.trim();
    if normalized.is_empty() {
        return Message::Unknown { raw: line.to_owned() };
    }
    if normalized.starts_with("WELCOME to Envy v") {
        return parse_welcome(normalized);
    }

    let tokens = tokens(normalized);
    let Some(&head) = tokens.first() else {
        return unknown(normalized);
    };

    match head {
        "OK" => Message::Ok,
        "ERROR" => parse_error(normalized),
        "Standby" => Message::Standby,
        "PowerOff" => Message::PowerOff,
        "Restart" => Message::Restart,
        "ReloadSoftware" => Message::ReloadSoftware,
        "NoSignal" => Message::NoSignal,
        "OpenMenu" => parse_open_menu(&tokens, normalized),
        "CloseMenu" => Message::CloseMenu,
        "KeyPress" | "KeyHold" => parse_key(&tokens, normalized),
        "SetAspectRatioMode" => parse_set_aspect_ratio_mode(&tokens, normalized),
        "ActivateProfile" | "ActiveProfile" => parse_profile_activation(&tokens, normalized),
        "CreateProfileGroup" | "RenameProfileGroup" => parse_profile_group_name(&tokens, normalized),
        "DeleteProfileGroup" => parse_delete_profile_group(&tokens, normalized),
        "CreateProfile" | "RenameProfile" | "DeleteProfile" => {
            parse_profile_change(&tokens, normalized)
        }
        "AddProfileToPage" | "RemoveProfileFromPage" => {
            parse_profile_page_link(&tokens, normalized)
        }
        "IncomingSignalInfo" => parse_incoming_signal(&tokens, normalized),
        "OutgoingSignalInfo" => parse_outgoing_signal(&tokens, normalized),
        "AspectRatio" => parse_aspect_ratio(&tokens, normalized),
        "MaskingRatio" => parse_masking_ratio(&tokens, normalized),
        "Temperatures" => parse_temperatures(&tokens, normalized),
        "MacAddress" => parse_mac(&tokens, normalized),
        "ChangeOption" => parse_change_option(&tokens, normalized),
        "InheritOption" => parse_inherit_option(&tokens, normalized),
        "ResetTemporary" => Message::ResetTemporary,
        "Upload3DLUTFile" => parse_upload_3dlut(&tokens, normalized),
        "Rename3DLUTFile" => parse_rename_3dlut(&tokens, normalized),
        "Delete3DLUTFile" => parse_delete_3dlut(&tokens, normalized),
        "UploadSettingsFile" => Message::UploadSettingsFile,
        "StoreSettings" => parse_store_settings(&tokens, normalized),
        "RestoreSettings" => parse_restore_settings(&tokens, normalized),
        "Toggle" if tokens.len() == 2 => Message::Toggle { option: tokens[1].to_owned() },
        "ToneMapOn" => Message::ToneMapOn,
        "ToneMapOff" => Message::ToneMapOff,
        "DisplayChanged" => Message::DisplayChanged,
        "RefreshLicenseInfo" => Message::RefreshLicenseInfo,
        "Force1080p60Output" => Message::Force1080p60Output,
        "Hotplug" => Message::Hotplug,
        "FirmwareUpdate" => Message::FirmwareUpdate,
        "MissingHeartbeat" => Message::MissingHeartbeat,
        // Enumeration families share a verb prefix with their end markers
        // (`ProfileGroup ...` vs the lone `ProfileGroup.`), so they dispatch
        // by prefix after every exact verb above has had its chance.
        _ if head.starts_with("ProfileGroup") => parse_profile_group(&tokens, normalized),
        _ if head.starts_with("Profile") => parse_profile(&tokens, normalized),
        _ if head.starts_with("SettingPage") => parse_setting_page(&tokens, normalized),
        _ if head.starts_with("ConfigPage") => parse_config_page(&tokens, normalized),
        _ if head.starts_with("Option") => parse_option(&tokens, normalized),
        _ => unknown(normalized),
    }
}

fn tokens(line: &str) -> Vec<&str> {
    TOKEN_RE.find_iter(line).map(|m| m.as_str()).collect()
}

/// Strip one layer of surrounding double quotes, if present.
fn unquote(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}

fn to_int(value: &str) -> Option<i64> {
    value.parse().ok()
}

fn unknown(line: &str) -> Message {
    Message::Unknown { raw: line.to_owned() }
}

/// Join the remaining tokens with single spaces, then unquote.
///
/// Preserves names containing whitespace when the device quotes them, and
/// tolerates unquoted multi-token names.
fn joined_name(tokens: &[&str]) -> String {
    unquote(&tokens.join(" ")).to_owned()
}

pub(crate) fn parse_option_scalar(option_type: &str, value: &str) -> OptionScalar {
    let raw = unquote(value);
    match option_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" => raw
            .parse::<i64>()
            .map_or_else(|_| OptionScalar::Text(raw.to_owned()), OptionScalar::Int),
        "FLOAT" | "DOUBLE" => raw
            .parse::<f64>()
            .map_or_else(|_| OptionScalar::Text(raw.to_owned()), OptionScalar::Float),
        "BOOLEAN" | "BOOL" => match raw.to_ascii_uppercase().as_str() {
            "YES" | "TRUE" | "ON" => OptionScalar::Bool(true),
            "NO" | "FALSE" | "OFF" => OptionScalar::Bool(false),
            _ => OptionScalar::Text(raw.to_owned()),
        },
        _ => OptionScalar::Text(raw.to_owned()),
    }
}

fn parse_welcome(line: &str) -> Message {
    match WELCOME_RE.captures(line) {
        Some(captures) => Message::Welcome { version: captures[1].to_owned() },
        None => unknown(line),
    }
}

fn parse_error(line: &str) -> Message {
    match ERROR_RE.captures(line) {
        Some(captures) => Message::Error { error: captures[1].to_owned() },
        None => unknown(line),
    }
}

fn parse_open_menu(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, menu] => Message::OpenMenu { menu: unquote(menu).to_owned() },
        _ => unknown(line),
    }
}

fn parse_key(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["KeyPress", button] => Message::KeyPress { button: (*button).to_owned() },
        ["KeyHold", button] => Message::KeyHold { button: (*button).to_owned() },
        _ => unknown(line),
    }
}

fn parse_set_aspect_ratio_mode(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, mode] => Message::SetAspectRatioMode { mode: (*mode).to_owned() },
        _ => unknown(line),
    }
}

fn parse_profile_activation(tokens: &[&str], line: &str) -> Message {
    let [verb, group, index] = tokens else {
        return unknown(line);
    };
    let Some(profile_index) = to_int(index) else {
        return unknown(line);
    };
    let profile_group = (*group).to_owned();
    if *verb == "ActivateProfile" {
        Message::ActivateProfile { profile_group, profile_index }
    } else {
        Message::ActiveProfile { profile_group, profile_index }
    }
}

fn parse_profile_group_name(tokens: &[&str], line: &str) -> Message {
    let [verb, group_id, name @ ..] = tokens else {
        return unknown(line);
    };
    if name.is_empty() {
        return unknown(line);
    }
    let group_id = (*group_id).to_owned();
    let name = joined_name(name);
    if *verb == "CreateProfileGroup" {
        Message::CreateProfileGroup { group_id, name }
    } else {
        Message::RenameProfileGroup { group_id, name }
    }
}

fn parse_delete_profile_group(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, group_id] => Message::DeleteProfileGroup { group_id: (*group_id).to_owned() },
        _ => unknown(line),
    }
}

fn parse_profile_change(tokens: &[&str], line: &str) -> Message {
    let [verb, group, index, name @ ..] = tokens else {
        return unknown(line);
    };
    let Some(profile_index) = to_int(index) else {
        return unknown(line);
    };
    let profile_group = (*group).to_owned();

    if *verb == "DeleteProfile" {
        return Message::DeleteProfile { profile_group, profile_index };
    }
    if name.is_empty() {
        return unknown(line);
    }
    let name = joined_name(name);
    if *verb == "CreateProfile" {
        Message::CreateProfile { profile_group, profile_index, name }
    } else {
        Message::RenameProfile { profile_group, profile_index, name }
    }
}

fn parse_profile_page_link(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["AddProfileToPage", profile_id, page_id] => Message::AddProfileToPage {
            profile_id: (*profile_id).to_owned(),
            page_id: (*page_id).to_owned(),
        },
        ["RemoveProfileFromPage", profile_id, page_id] => Message::RemoveProfileFromPage {
            profile_id: (*profile_id).to_owned(),
            page_id: (*page_id).to_owned(),
        },
        _ => unknown(line),
    }
}

fn parse_incoming_signal(tokens: &[&str], line: &str) -> Message {
    let [_, resolution, frame_rate, signal_type, color_space, bit_depth, hdr_mode, colorimetry, black_levels, aspect_ratio, ..] =
        tokens
    else {
        return unknown(line);
    };
    Message::IncomingSignalInfo(IncomingSignalInfo {
        resolution: (*resolution).to_owned(),
        frame_rate: (*frame_rate).to_owned(),
        signal_type: (*signal_type).to_owned(),
        color_space: (*color_space).to_owned(),
        bit_depth: (*bit_depth).to_owned(),
        hdr_mode: (*hdr_mode).to_owned(),
        colorimetry: (*colorimetry).to_owned(),
        black_levels: (*black_levels).to_owned(),
        aspect_ratio: (*aspect_ratio).to_owned(),
    })
}

fn parse_outgoing_signal(tokens: &[&str], line: &str) -> Message {
    let [_, resolution, frame_rate, signal_type, color_space, bit_depth, hdr_mode, colorimetry, black_levels, ..] =
        tokens
    else {
        return unknown(line);
    };
    Message::OutgoingSignalInfo(OutgoingSignalInfo {
        resolution: (*resolution).to_owned(),
        frame_rate: (*frame_rate).to_owned(),
        signal_type: (*signal_type).to_owned(),
        color_space: (*color_space).to_owned(),
        bit_depth: (*bit_depth).to_owned(),
        hdr_mode: (*hdr_mode).to_owned(),
        colorimetry: (*colorimetry).to_owned(),
        black_levels: (*black_levels).to_owned(),
    })
}

fn parse_aspect_ratio(tokens: &[&str], line: &str) -> Message {
    let [_, resolution, decimal, integer, name @ ..] = tokens else {
        return unknown(line);
    };
    if name.is_empty() {
        return unknown(line);
    }
    let Ok(decimal_ratio) = decimal.parse::<f64>() else {
        return unknown(line);
    };
    let Some(integer_ratio) = to_int(integer) else {
        return unknown(line);
    };
    Message::AspectRatio(AspectRatioInfo {
        resolution: (*resolution).to_owned(),
        decimal_ratio,
        integer_ratio,
        name: joined_name(name),
    })
}

fn parse_masking_ratio(tokens: &[&str], line: &str) -> Message {
    let [_, resolution, decimal, integer] = tokens else {
        return unknown(line);
    };
    let Ok(decimal_ratio) = decimal.parse::<f64>() else {
        return unknown(line);
    };
    let Some(integer_ratio) = to_int(integer) else {
        return unknown(line);
    };
    Message::MaskingRatio(MaskingRatioInfo {
        resolution: (*resolution).to_owned(),
        decimal_ratio,
        integer_ratio,
    })
}

fn parse_temperatures(tokens: &[&str], line: &str) -> Message {
    let [_, values @ ..] = tokens else {
        return unknown(line);
    };
    if values.len() < 4 {
        return unknown(line);
    }
    let Ok(parsed) = values.iter().map(|v| v.parse::<i64>()).collect::<Result<Vec<_>, _>>() else {
        return unknown(line);
    };
    let [gpu, hdmi_input, cpu, mainboard, extra @ ..] = parsed.as_slice() else {
        return unknown(line);
    };
    Message::Temperatures(Temperatures {
        gpu: *gpu,
        hdmi_input: *hdmi_input,
        cpu: *cpu,
        mainboard: *mainboard,
        extra: extra.to_vec(),
    })
}

fn parse_mac(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, mac] if MAC_RE.is_match(mac) => Message::MacAddress { mac: (*mac).to_owned() },
        _ => unknown(line),
    }
}

fn parse_profile_group(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["ProfileGroup."] => Message::ProfileGroupEnd,
        [_, group_id, name @ ..] if !name.is_empty() => {
            Message::ProfileGroup(ProfileGroupItem {
                group_id: (*group_id).to_owned(),
                name: joined_name(name),
            })
        }
        _ => unknown(line),
    }
}

fn parse_profile(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["Profile."] => Message::ProfileEnd,
        [_, profile_id, name @ ..] if !name.is_empty() => Message::Profile(ProfileItem {
            profile_id: (*profile_id).to_owned(),
            name: joined_name(name),
        }),
        _ => unknown(line),
    }
}

fn parse_setting_page(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["SettingPage."] => Message::SettingPageEnd,
        [_, page_id, name @ ..] if !name.is_empty() => Message::SettingPage(SettingPageItem {
            page_id: (*page_id).to_owned(),
            name: joined_name(name),
        }),
        _ => unknown(line),
    }
}

fn parse_config_page(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["ConfigPage."] => Message::ConfigPageEnd,
        [_, page_id, name @ ..] if !name.is_empty() => Message::ConfigPage(ConfigPageItem {
            page_id: (*page_id).to_owned(),
            name: joined_name(name),
        }),
        _ => unknown(line),
    }
}

fn parse_option(tokens: &[&str], line: &str) -> Message {
    match tokens {
        ["Option."] => Message::OptionEnd,
        [_, option_type, option_id, current, effective] => Message::Option(OptionItem {
            option_type: (*option_type).to_owned(),
            option_id: (*option_id).to_owned(),
            current_value: parse_option_scalar(option_type, current),
            effective_value: parse_option_scalar(option_type, effective),
        }),
        _ => unknown(line),
    }
}

fn parse_change_option(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, option_type, path, current, effective] => Message::ChangeOption(ChangeOption {
            option_type: (*option_type).to_owned(),
            option_id_path: (*path).to_owned(),
            current_value: parse_option_scalar(option_type, current),
            effective_value: parse_option_scalar(option_type, effective),
        }),
        _ => unknown(line),
    }
}

fn parse_inherit_option(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, option_type, path, effective] => Message::InheritOption(InheritOption {
            option_type: (*option_type).to_owned(),
            option_id_path: (*path).to_owned(),
            effective_value: parse_option_scalar(option_type, effective),
        }),
        _ => unknown(line),
    }
}

fn parse_upload_3dlut(tokens: &[&str], line: &str) -> Message {
    let [_, filename @ ..] = tokens else {
        return unknown(line);
    };
    if filename.is_empty() {
        return unknown(line);
    }
    Message::Upload3DLutFile { filename: joined_name(filename) }
}

fn parse_rename_3dlut(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, old, new] => Message::Rename3DLutFile {
            old_filename: unquote(old).to_owned(),
            new_filename: unquote(new).to_owned(),
        },
        _ => unknown(line),
    }
}

fn parse_delete_3dlut(tokens: &[&str], line: &str) -> Message {
    let [_, filename @ ..] = tokens else {
        return unknown(line);
    };
    if filename.is_empty() {
        return unknown(line);
    }
    Message::Delete3DLutFile { filename: joined_name(filename) }
}

fn parse_store_settings(tokens: &[&str], line: &str) -> Message {
    let [_, target, name @ ..] = tokens else {
        return unknown(line);
    };
    if name.is_empty() {
        return unknown(line);
    }
    Message::StoreSettings { target: (*target).to_owned(), storage_name: joined_name(name) }
}

fn parse_restore_settings(tokens: &[&str], line: &str) -> Message {
    match tokens {
        [_, target] => Message::RestoreSettings { target: (*target).to_owned() },
        _ => unknown(line),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::command::{CommandArg, build_command};

    #[test]
    fn parses_welcome_and_extracts_version() {
        let message = parse_message("WELCOME to Envy v1.0.1.0");
        assert_eq!(message, Message::Welcome { version: "1.0.1.0".into() });
    }

    #[test]
    fn welcome_with_trailing_garbage_is_unknown() {
        let message = parse_message("WELCOME to Envy v1.1.3 extra");
        assert!(matches!(message, Message::Unknown { .. }));
    }

    #[test]
    fn parses_ok_and_error() {
        assert_eq!(parse_message("OK"), Message::Ok);
        assert_eq!(
            parse_message(r#"ERROR "invalid command""#),
            Message::Error { error: "invalid command".into() }
        );
        assert_eq!(
            parse_message("ERROR no quotes here"),
            Message::Error { error: "no quotes here".into() }
        );
    }

    #[test]
    fn parses_bare_state_notifications() {
        assert_eq!(parse_message("Standby"), Message::Standby);
        assert_eq!(parse_message("PowerOff"), Message::PowerOff);
        assert_eq!(parse_message("NoSignal"), Message::NoSignal);
        assert_eq!(parse_message("ResetTemporary"), Message::ResetTemporary);
        assert_eq!(parse_message("FirmwareUpdate"), Message::FirmwareUpdate);
        assert_eq!(parse_message("MissingHeartbeat"), Message::MissingHeartbeat);
    }

    #[test]
    fn parses_incoming_and_outgoing_signal() {
        let incoming =
            parse_message("IncomingSignalInfo 3840x2160 23.976p 2D 422 10bit HDR10 2020 TV 16:9");
        let Message::IncomingSignalInfo(info) = incoming else {
            panic!("expected IncomingSignalInfo, got {incoming:?}");
        };
        assert_eq!(info.hdr_mode, "HDR10");
        assert_eq!(info.aspect_ratio, "16:9");

        let outgoing =
            parse_message("OutgoingSignalInfo 3840x2160 23.976p 2D RGB 12bit SDR 2020 TV");
        let Message::OutgoingSignalInfo(info) = outgoing else {
            panic!("expected OutgoingSignalInfo, got {outgoing:?}");
        };
        assert_eq!(info.hdr_mode, "SDR");
    }

    #[test]
    fn parses_aspect_and_masking_ratio() {
        let aspect = parse_message(r#"AspectRatio 3840:1600 2.400 240 "Panavision 70""#);
        let Message::AspectRatio(info) = aspect else {
            panic!("expected AspectRatio, got {aspect:?}");
        };
        assert_eq!(info.name, "Panavision 70");
        assert_eq!(info.integer_ratio, 240);

        let masking = parse_message("MaskingRatio 3840:1700 2.259 220");
        let Message::MaskingRatio(info) = masking else {
            panic!("expected MaskingRatio, got {masking:?}");
        };
        assert_eq!(info.integer_ratio, 220);
    }

    #[test]
    fn temperatures_allow_future_extra_values() {
        let message = parse_message("Temperatures 74 67 41 45 99");
        let Message::Temperatures(temps) = message else {
            panic!("expected Temperatures, got {message:?}");
        };
        assert_eq!(temps.gpu, 74);
        assert_eq!(temps.mainboard, 45);
        assert_eq!(temps.extra, vec![99]);
    }

    #[test]
    fn temperatures_reject_short_or_non_numeric_input() {
        assert!(matches!(parse_message("Temperatures 74 67 41"), Message::Unknown { .. }));
        assert!(matches!(parse_message("Temperatures 74 67 41 warm"), Message::Unknown { .. }));
    }

    #[test]
    fn mac_address_requires_exact_shape() {
        assert_eq!(
            parse_message("MacAddress 00:1A:2B:3C:4D:5E"),
            Message::MacAddress { mac: "00:1A:2B:3C:4D:5E".into() }
        );
        assert!(matches!(parse_message("MacAddress 00:1A:2B"), Message::Unknown { .. }));
        assert!(matches!(
            parse_message("MacAddress gg:1A:2B:3C:4D:5E"),
            Message::Unknown { .. }
        ));
    }

    #[test]
    fn parses_enumeration_items_and_end_markers() {
        assert_eq!(
            parse_message(r#"ProfileGroup customProfileGroup1 "Ambient Light""#),
            Message::ProfileGroup(ProfileGroupItem {
                group_id: "customProfileGroup1".into(),
                name: "Ambient Light".into(),
            })
        );
        assert_eq!(parse_message("ProfileGroup."), Message::ProfileGroupEnd);

        assert_eq!(
            parse_message(r#"Profile sourceProfiles_profile2 "Panasonic Blu-Ray Player""#),
            Message::Profile(ProfileItem {
                profile_id: "sourceProfiles_profile2".into(),
                name: "Panasonic Blu-Ray Player".into(),
            })
        );
        assert_eq!(parse_message("Profile."), Message::ProfileEnd);

        assert_eq!(
            parse_message(r#"SettingPage hdrSettings "hdr settings""#),
            Message::SettingPage(SettingPageItem {
                page_id: "hdrSettings".into(),
                name: "hdr settings".into(),
            })
        );
        assert_eq!(parse_message("SettingPage."), Message::SettingPageEnd);

        assert_eq!(
            parse_message(r#"ConfigPage displayConfig "display config""#),
            Message::ConfigPage(ConfigPageItem {
                page_id: "displayConfig".into(),
                name: "display config".into(),
            })
        );
        assert_eq!(parse_message("ConfigPage."), Message::ConfigPageEnd);
        assert_eq!(parse_message("Option."), Message::OptionEnd);
    }

    #[test]
    fn unquoted_multi_token_names_join_with_spaces() {
        assert_eq!(
            parse_message("CreateProfile displayProfiles 2 My New Profile"),
            Message::CreateProfile {
                profile_group: "displayProfiles".into(),
                profile_index: 2,
                name: "My New Profile".into(),
            }
        );
    }

    #[test]
    fn option_values_follow_the_declared_type() {
        let message = parse_message("Option INTEGER hdrNits 120 121");
        let Message::Option(option) = message else {
            panic!("expected Option, got {message:?}");
        };
        assert_eq!(option.current_value, OptionScalar::Int(120));
        assert_eq!(option.effective_value, OptionScalar::Int(121));

        let message = parse_message("Option FLOAT someFloat 1.25 2.50");
        let Message::Option(option) = message else {
            panic!("expected Option, got {message:?}");
        };
        assert_eq!(option.current_value, OptionScalar::Float(1.25));
        assert_eq!(option.effective_value, OptionScalar::Float(2.5));

        let message = parse_message("Option BOOLEAN someBool YES off");
        let Message::Option(option) = message else {
            panic!("expected Option, got {message:?}");
        };
        assert_eq!(option.current_value, OptionScalar::Bool(true));
        assert_eq!(option.effective_value, OptionScalar::Bool(false));

        let message = parse_message(r#"Option STRING hdrMode "toneMapMath" "toneMapMath""#);
        let Message::Option(option) = message else {
            panic!("expected Option, got {message:?}");
        };
        assert_eq!(option.current_value, OptionScalar::Text("toneMapMath".into()));
    }

    #[test]
    fn unparseable_typed_values_fall_back_to_text() {
        assert_eq!(
            parse_option_scalar("INTEGER", "notanumber"),
            OptionScalar::Text("notanumber".into())
        );
        assert_eq!(parse_option_scalar("FLOAT", "x.y"), OptionScalar::Text("x.y".into()));
        assert_eq!(parse_option_scalar("BOOLEAN", "maybe"), OptionScalar::Text("maybe".into()));
        assert_eq!(parse_option_scalar("ENUM", "\"profile\""), OptionScalar::Text("profile".into()));
    }

    #[test]
    fn parses_change_and_inherit_option() {
        assert_eq!(
            parse_message("ChangeOption INTEGER hdrHighlightRecovery 2 3"),
            Message::ChangeOption(ChangeOption {
                option_type: "INTEGER".into(),
                option_id_path: "hdrHighlightRecovery".into(),
                current_value: OptionScalar::Int(2),
                effective_value: OptionScalar::Int(3),
            })
        );
        assert_eq!(
            parse_message(r"InheritOption INTEGER temporary\hdrNits 120"),
            Message::InheritOption(InheritOption {
                option_type: "INTEGER".into(),
                option_id_path: r"temporary\hdrNits".into(),
                effective_value: OptionScalar::Int(120),
            })
        );
    }

    #[test]
    fn parses_misc_notifications() {
        assert_eq!(
            parse_message("ActiveProfile SOURCE 2"),
            Message::ActiveProfile { profile_group: "SOURCE".into(), profile_index: 2 }
        );
        assert_eq!(parse_message("KeyPress MENU"), Message::KeyPress { button: "MENU".into() });
        assert_eq!(parse_message("KeyHold POWER"), Message::KeyHold { button: "POWER".into() });
        assert_eq!(
            parse_message("SetAspectRatioMode Auto"),
            Message::SetAspectRatioMode { mode: "Auto".into() }
        );
        assert_eq!(parse_message("Toggle ToneMap"), Message::Toggle { option: "ToneMap".into() });
        assert_eq!(parse_message("Hotplug"), Message::Hotplug);
        assert_eq!(
            parse_message(r#"OpenMenu "Test Patterns""#),
            Message::OpenMenu { menu: "Test Patterns".into() }
        );
    }

    #[test]
    fn parses_lut_and_settings_notifications() {
        assert_eq!(
            parse_message(r#"Upload3DLUTFile "BT.2020.3dlut""#),
            Message::Upload3DLutFile { filename: "BT.2020.3dlut".into() }
        );
        assert_eq!(
            parse_message(r#"Rename3DLUTFile "BT.2020.3dlut" "BT.2021.3dlut""#),
            Message::Rename3DLutFile {
                old_filename: "BT.2020.3dlut".into(),
                new_filename: "BT.2021.3dlut".into(),
            }
        );
        assert_eq!(
            parse_message(r#"Delete3DLUTFile "BT.2021.3dlut""#),
            Message::Delete3DLutFile { filename: "BT.2021.3dlut".into() }
        );
        assert_eq!(parse_message("UploadSettingsFile"), Message::UploadSettingsFile);
        assert_eq!(
            parse_message(r#"StoreSettings Installer "Installer Settings""#),
            Message::StoreSettings {
                target: "Installer".into(),
                storage_name: "Installer Settings".into(),
            }
        );
        assert_eq!(
            parse_message("RestoreSettings Suggested"),
            Message::RestoreSettings { target: "Suggested".into() }
        );
    }

    #[test]
    fn never_fails_on_garbage() {
        for line in ["", "   ", "FutureVerb a b c", "ActivateProfile SOURCE notanumber"] {
            assert!(
                matches!(parse_message(line), Message::Unknown { .. }),
                "line {line:?} should parse to Unknown"
            );
        }
    }

    #[test]
    fn built_commands_reparse_to_the_same_verb_and_args() {
        let line = build_command(
            "DisplayMessage",
            &[CommandArg::Int(3), CommandArg::Text("Hello world".into())],
        );
        let parsed: Vec<String> = tokens(&line).iter().map(|t| unquote(t).to_owned()).collect();
        assert_eq!(parsed, vec!["DisplayMessage", "3", "Hello world"]);

        let line = build_command(
            "ChangeOption",
            &[CommandArg::Text(r"temporary\hdrNits".into()), CommandArg::Int(121)],
        );
        let parsed: Vec<String> = tokens(&line).iter().map(|t| unquote(t).to_owned()).collect();
        assert_eq!(parsed, vec!["ChangeOption", r"temporary\hdrNits", "121"]);
    }
}
