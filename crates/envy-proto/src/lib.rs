//! Protocol layer for madVR Envy IP control.
//!
//! The Envy speaks a line-oriented TCP protocol: one command or notification
//! per CRLF-terminated line, arguments separated by spaces, space-bearing
//! values double-quoted. This crate is the pure codec half of the stack --
//! [`parse_message`] turns one inbound line into a typed [`Message`] (never
//! failing; unrecognized input becomes [`Message::Unknown`]), and the
//! [`command`] module renders outbound command lines byte-for-byte the way
//! the device expects them.
//!
//! Nothing in here is async; the connection runtime lives in `envy-client`.

pub mod command;
mod message;
mod parse;

pub use command::{AspectRatioMode, CommandArg, MenuName, OptionValue, RemoteButton, build_command, quote_if_needed};
pub use message::{
    AspectRatioInfo, ChangeOption, ConfigPageItem, IncomingSignalInfo, InheritOption,
    MaskingRatioInfo, Message, OptionItem, OptionScalar, OutgoingSignalInfo, ProfileGroupItem,
    ProfileItem, SettingPageItem, Temperatures,
};
pub use parse::parse_message;
