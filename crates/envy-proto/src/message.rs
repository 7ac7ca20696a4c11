// ── Protocol message model ──
//
// One `Message` variant per protocol verb. Compound payloads get named
// records so downstream state can hold them and enumeration collectors can
// return them typed.

use serde::{Deserialize, Serialize};

/// A typed option value, parsed according to the option's declared type tag.
///
/// The device declares each option's type in the message itself (`INTEGER`,
/// `FLOAT`, `BOOLEAN`, ...). Values that fail to parse under the declared
/// type fall back to [`OptionScalar::Text`] with the raw unquoted token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for OptionScalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for OptionScalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for OptionScalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Incoming HDMI signal description (nine columns as the device reports them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSignalInfo {
    pub resolution: String,
    pub frame_rate: String,
    pub signal_type: String,
    pub color_space: String,
    pub bit_depth: String,
    pub hdr_mode: String,
    pub colorimetry: String,
    pub black_levels: String,
    pub aspect_ratio: String,
}

/// Outgoing HDMI signal description (eight columns; no aspect ratio).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingSignalInfo {
    pub resolution: String,
    pub frame_rate: String,
    pub signal_type: String,
    pub color_space: String,
    pub bit_depth: String,
    pub hdr_mode: String,
    pub colorimetry: String,
    pub black_levels: String,
}

/// Detected content aspect ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioInfo {
    pub resolution: String,
    pub decimal_ratio: f64,
    pub integer_ratio: i64,
    pub name: String,
}

/// Active screen masking ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingRatioInfo {
    pub resolution: String,
    pub decimal_ratio: f64,
    pub integer_ratio: i64,
}

/// Hardware temperature readings in degrees Celsius.
///
/// The first four columns are fixed; newer firmware may append more, which
/// land in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperatures {
    pub gpu: i64,
    pub hdmi_input: i64,
    pub cpu: i64,
    pub mainboard: i64,
    pub extra: Vec<i64>,
}

/// One item of an `EnumProfileGroups` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileGroupItem {
    pub group_id: String,
    pub name: String,
}

/// One item of an `EnumProfiles` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileItem {
    pub profile_id: String,
    pub name: String,
}

/// One item of an `EnumSettingPages` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingPageItem {
    pub page_id: String,
    pub name: String,
}

/// One item of an `EnumConfigPages` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPageItem {
    pub page_id: String,
    pub name: String,
}

/// One item of an `EnumOptions`/`QueryOption` reply stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    pub option_type: String,
    pub option_id: String,
    pub current_value: OptionScalar,
    pub effective_value: OptionScalar,
}

/// Unsolicited notification that an option changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOption {
    pub option_type: String,
    pub option_id_path: String,
    pub current_value: OptionScalar,
    pub effective_value: OptionScalar,
}

/// Unsolicited notification that an option reverted to its inherited value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritOption {
    pub option_type: String,
    pub option_id_path: String,
    pub effective_value: OptionScalar,
}

/// One parsed line from the Envy stream.
///
/// Every line parses to exactly one variant; input the parser does not
/// recognize (new firmware verbs, malformed arguments, empty lines) becomes
/// [`Message::Unknown`] carrying the raw line for forensic logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Message {
    Welcome { version: String },
    Ok,
    Error { error: String },
    Standby,
    PowerOff,
    Restart,
    ReloadSoftware,
    NoSignal,
    OpenMenu { menu: String },
    CloseMenu,
    KeyPress { button: String },
    KeyHold { button: String },
    SetAspectRatioMode { mode: String },
    ActivateProfile { profile_group: String, profile_index: i64 },
    ActiveProfile { profile_group: String, profile_index: i64 },
    CreateProfileGroup { group_id: String, name: String },
    RenameProfileGroup { group_id: String, name: String },
    DeleteProfileGroup { group_id: String },
    CreateProfile { profile_group: String, profile_index: i64, name: String },
    RenameProfile { profile_group: String, profile_index: i64, name: String },
    DeleteProfile { profile_group: String, profile_index: i64 },
    AddProfileToPage { profile_id: String, page_id: String },
    RemoveProfileFromPage { profile_id: String, page_id: String },
    IncomingSignalInfo(IncomingSignalInfo),
    OutgoingSignalInfo(OutgoingSignalInfo),
    AspectRatio(AspectRatioInfo),
    MaskingRatio(MaskingRatioInfo),
    Temperatures(Temperatures),
    MacAddress { mac: String },
    ProfileGroup(ProfileGroupItem),
    ProfileGroupEnd,
    Profile(ProfileItem),
    ProfileEnd,
    SettingPage(SettingPageItem),
    SettingPageEnd,
    ConfigPage(ConfigPageItem),
    ConfigPageEnd,
    Option(OptionItem),
    OptionEnd,
    ChangeOption(ChangeOption),
    InheritOption(InheritOption),
    ResetTemporary,
    Upload3DLutFile { filename: String },
    Rename3DLutFile { old_filename: String, new_filename: String },
    Delete3DLutFile { filename: String },
    UploadSettingsFile,
    StoreSettings { target: String, storage_name: String },
    RestoreSettings { target: String },
    Toggle { option: String },
    ToneMapOn,
    ToneMapOff,
    DisplayChanged,
    RefreshLicenseInfo,
    Force1080p60Output,
    Hotplug,
    FirmwareUpdate,
    MissingHeartbeat,
    Unknown { raw: String },
}

impl Message {
    /// Whether this message is a command acknowledgement (`OK` or `ERROR`).
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ok | Self::Error { .. })
    }
}
